//! Checkout form and its validator.
//!
//! Validation never fails as an operation: it yields a field → message map,
//! and an empty map means the form may be submitted. Single fields are
//! checked on blur; [`validate_submission`] checks everything at once and
//! adds the cross-field rules.

use crate::delivery::{self, SlotSelection};
use crate::types::{Address, AddressKind, ContactInfo, DeliveryMethod, PaymentMethod};
use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid regex"));

#[allow(clippy::expect_used)]
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 \-]*$").expect("Invalid regex"));

#[allow(clippy::expect_used)]
static POSTAL_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{6}$").expect("Invalid regex"));

/// Minimum number of digits in a phone number
pub const MIN_PHONE_DIGITS: usize = 10;

/// A line of an address form
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressField {
    /// Street
    Street,
    /// City
    City,
    /// State
    State,
    /// Postal code
    PostalCode,
    /// Country
    Country,
}

impl AddressField {
    /// All address lines in form order
    pub const ALL: [Self; 5] = [
        Self::Street,
        Self::City,
        Self::State,
        Self::PostalCode,
        Self::Country,
    ];

    const fn label(self) -> &'static str {
        match self {
            Self::Street => "Street",
            Self::City => "City",
            Self::State => "State",
            Self::PostalCode => "Postal code",
            Self::Country => "Country",
        }
    }

    fn get(self, address: &Address) -> &str {
        match self {
            Self::Street => &address.street,
            Self::City => &address.city,
            Self::State => &address.state,
            Self::PostalCode => &address.postal_code,
            Self::Country => &address.country,
        }
    }

    fn get_mut(self, address: &mut Address) -> &mut String {
        match self {
            Self::Street => &mut address.street,
            Self::City => &mut address.city,
            Self::State => &mut address.state,
            Self::PostalCode => &mut address.postal_code,
            Self::Country => &mut address.country,
        }
    }
}

/// Anything the validator can attach a message to
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    /// A shipping address line
    Shipping(AddressField),
    /// A billing address line
    Billing(AddressField),
    /// Guest email
    Email,
    /// Guest phone
    Phone,
    /// Delivery date
    DeliveryDate,
    /// Delivery window
    DeliveryTime,
    /// Payment method
    PaymentMethod,
    /// UPI handle
    Vpa,
    /// The cart as a whole
    Cart,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shipping(line) => write!(f, "shipping.{line:?}"),
            Self::Billing(line) => write!(f, "billing.{line:?}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Field → message map; empty means valid
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationErrors(BTreeMap<Field, String>);

impl ValidationErrors {
    /// `true` when nothing failed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of failing fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Message for `field`, if it failed
    #[must_use]
    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    /// `true` when `field` failed
    #[must_use]
    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    /// Records or clears the outcome for one field
    pub fn set(&mut self, field: Field, outcome: Option<String>) {
        match outcome {
            Some(message) => {
                self.0.insert(field, message);
            },
            None => {
                self.0.remove(&field);
            },
        }
    }

    /// Failing fields with their messages, in field order
    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(field, message)| (*field, message.as_str()))
    }
}

/// Everything the customer enters on the checkout page
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutForm {
    /// Shipping address
    pub shipping_address: Address,
    /// Billing address, used only when `use_same_address` is off
    pub billing_address: Address,
    /// Bill to the shipping address
    pub use_same_address: bool,
    /// Guest contact details
    pub contact: ContactInfo,
    /// Delivery date and window
    pub slot: SlotSelection,
    /// Delivery speed
    pub delivery_method: DeliveryMethod,
    /// Payment method
    pub payment_method: Option<PaymentMethod>,
}

impl Default for CheckoutForm {
    fn default() -> Self {
        Self {
            shipping_address: Address::blank(AddressKind::Shipping),
            billing_address: Address::blank(AddressKind::Billing),
            use_same_address: true,
            contact: ContactInfo::default(),
            slot: SlotSelection::default(),
            delivery_method: DeliveryMethod::Standard,
            payment_method: None,
        }
    }
}

impl CheckoutForm {
    /// Current text of a free-text field
    #[must_use]
    pub fn text(&self, field: Field) -> Option<&str> {
        match field {
            Field::Shipping(line) => Some(line.get(&self.shipping_address)),
            Field::Billing(line) => Some(line.get(&self.billing_address)),
            Field::Email => Some(self.contact.email.as_str()),
            Field::Phone => Some(self.contact.phone.as_str()),
            Field::Vpa => match &self.payment_method {
                Some(PaymentMethod::Upi { vpa }) => Some(vpa.as_str()),
                _ => None,
            },
            Field::DeliveryDate | Field::DeliveryTime | Field::PaymentMethod | Field::Cart => None,
        }
    }

    /// Sets a free-text field; returns `false` for fields that are not text
    pub fn set_text(&mut self, field: Field, value: String) -> bool {
        match field {
            Field::Shipping(line) => *line.get_mut(&mut self.shipping_address) = value,
            Field::Billing(line) => *line.get_mut(&mut self.billing_address) = value,
            Field::Email => self.contact.email = value,
            Field::Phone => self.contact.phone = value,
            Field::Vpa => match &mut self.payment_method {
                Some(PaymentMethod::Upi { vpa }) => *vpa = value,
                _ => return false,
            },
            Field::DeliveryDate | Field::DeliveryTime | Field::PaymentMethod | Field::Cart => {
                return false;
            },
        }
        true
    }
}

/// Facts from outside the form that submission rules depend on
#[derive(Clone, Copy, Debug)]
pub struct SubmissionContext {
    /// A customer is signed in (contact comes from the session)
    pub authenticated: bool,
    /// Number of cart lines
    pub cart_lines: usize,
    /// Today, for the delivery booking window
    pub today: NaiveDate,
}

fn required(label: &str, value: &str) -> Option<String> {
    value.trim().is_empty().then(|| format!("{label} is required"))
}

fn check_address_line(line: AddressField, address: &Address) -> Option<String> {
    let value = line.get(address);
    required(line.label(), value).or_else(|| {
        (line == AddressField::PostalCode && !POSTAL_CODE_RE.is_match(value.trim()))
            .then(|| "Postal code must be exactly 6 digits".to_string())
    })
}

fn check_email(value: &str) -> Option<String> {
    required("Email", value).or_else(|| {
        (!EMAIL_RE.is_match(value.trim())).then(|| "Please enter a valid email address".to_string())
    })
}

fn check_phone(value: &str) -> Option<String> {
    required("Phone", value).or_else(|| {
        let trimmed = value.trim();
        let digits = trimmed.chars().filter(char::is_ascii_digit).count();
        (!PHONE_RE.is_match(trimmed) || digits < MIN_PHONE_DIGITS)
            .then(|| format!("Phone number must have at least {MIN_PHONE_DIGITS} digits"))
    })
}

/// Validates one field as on blur.
///
/// Contact fields are only checked for guests, billing lines only when the
/// billing address is separate. Cross-field rules are left to submission.
#[must_use]
pub fn validate_field(field: Field, form: &CheckoutForm, authenticated: bool) -> Option<String> {
    match field {
        Field::Shipping(line) => check_address_line(line, &form.shipping_address),
        Field::Billing(line) if !form.use_same_address => {
            check_address_line(line, &form.billing_address)
        },
        Field::Email if !authenticated => check_email(&form.contact.email),
        Field::Phone if !authenticated => check_phone(&form.contact.phone),
        Field::Vpa => match &form.payment_method {
            Some(PaymentMethod::Upi { vpa }) => required("UPI ID", vpa),
            _ => None,
        },
        _ => None,
    }
}

/// Validates the whole form for submission.
#[must_use]
pub fn validate_submission(form: &CheckoutForm, context: &SubmissionContext) -> ValidationErrors {
    let mut errors = ValidationErrors::default();

    let fields = AddressField::ALL
        .into_iter()
        .flat_map(|line| [Field::Shipping(line), Field::Billing(line)])
        .chain([Field::Email, Field::Phone]);
    for field in fields {
        errors.set(field, validate_field(field, form, context.authenticated));
    }

    if context.cart_lines == 0 {
        errors.set(Field::Cart, Some("Your cart is empty".to_string()));
    }

    match (form.slot.date, form.slot.slot()) {
        (None, _) => {
            errors.set(Field::DeliveryDate, Some("Please select a delivery date".to_string()));
        },
        (Some(_), None) => {
            errors.set(Field::DeliveryTime, Some("Please select a delivery time".to_string()));
        },
        (Some(_), Some(slot)) => {
            if !delivery::is_bookable(&slot, context.today) {
                errors.set(
                    Field::DeliveryTime,
                    Some("The selected delivery slot is not available".to_string()),
                );
            }
        },
    }

    match &form.payment_method {
        None => {
            errors.set(Field::PaymentMethod, Some("Please select a payment method".to_string()));
        },
        Some(_) => errors.set(Field::Vpa, validate_field(Field::Vpa, form, context.authenticated)),
    }

    errors
}
