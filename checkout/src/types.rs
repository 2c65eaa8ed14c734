//! Domain types for checkout.
//!
//! Every amount is a [`Money`] value in integer minor units (paise). The
//! wire and storage representation of all records is camelCase JSON.

use crate::delivery::{DeliverySlot, TimeWindow};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

// ============================================================================
// Money Value Object (minor units to avoid floating point errors)
// ============================================================================

/// An amount of money in minor units (1/100 of the currency unit)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from minor units
    #[must_use]
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Creates a `Money` value from whole currency units
    #[must_use]
    pub const fn from_major(major: i64) -> Self {
        Self(major.saturating_mul(100))
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiplies by a quantity
    #[must_use]
    pub const fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(quantity as i64))
    }

    /// Applies a whole-number percentage, rounding half up to the nearest minor unit
    ///
    /// Negative amounts are clamped to zero first.
    #[must_use]
    pub const fn percent_round_half_up(self, percent: i64) -> Self {
        let base = if self.0 < 0 { 0 } else { self.0 };
        Self((base.saturating_mul(percent) + 50) / 100)
    }

    /// Subtraction that never goes below zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        let diff = self.0 - other.0;
        if diff < 0 { Self(0) } else { Self(diff) }
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Error parsing a decimal amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid amount '{0}': expected a non-negative decimal with at most two fraction digits")]
pub struct ParseMoneyError(pub String);

impl FromStr for Money {
    type Err = ParseMoneyError;

    /// Parses `"600"`, `"50.5"` or `"99.99"` in whole currency units
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseMoneyError(s.to_string());
        let trimmed = s.trim();
        let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));

        if whole.is_empty()
            || fraction.len() > 2
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        let major: i64 = whole.parse().map_err(|_| invalid())?;
        let minor: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        major
            .checked_mul(100)
            .and_then(|m| m.checked_add(minor))
            .map(Self)
            .ok_or_else(invalid)
    }
}

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque identifier issued by the payment provider for one payment attempt
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalPaymentId(String);

impl ExternalPaymentId {
    /// Wraps a provider identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalPaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-assigned order identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Wraps a server identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Cart
// ============================================================================

/// How often a subscription item is re-delivered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionInterval {
    /// Every month
    Monthly,
    /// Every three months
    Quarterly,
}

/// One line of the cart
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Product identifier
    pub product_id: String,
    /// Variant identifier (pack size)
    pub variant_id: Option<String>,
    /// Display name
    pub name: String,
    /// Display weight label, e.g. "250g"
    pub weight: Option<String>,
    /// Price of one unit
    pub unit_price: Money,
    /// Quantity, at least 1
    pub quantity: u32,
    /// Stock reported by the catalog (informational, never reserved)
    pub stock: u32,
    /// Set for subscribe-and-save items
    pub subscription: Option<SubscriptionInterval>,
}

impl CartItem {
    /// Creates a one-off cart line
    #[must_use]
    pub fn new(product_id: impl Into<String>, name: impl Into<String>, unit_price: Money, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id: None,
            name: name.into(),
            weight: None,
            unit_price,
            quantity: quantity.max(1),
            stock: quantity.max(1),
            subscription: None,
        }
    }

    /// Sets the variant identifier
    #[must_use]
    pub fn with_variant(mut self, variant_id: impl Into<String>) -> Self {
        self.variant_id = Some(variant_id.into());
        self
    }

    /// `unit_price × quantity`
    #[must_use]
    pub const fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }

    /// Product and variant together identify a cart line
    #[must_use]
    pub fn same_line(&self, product_id: &str, variant_id: Option<&str>) -> bool {
        self.product_id == product_id && self.variant_id.as_deref() == variant_id
    }
}

// ============================================================================
// Addresses and contact
// ============================================================================

/// Address type tag
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressKind {
    /// Where the parcel goes
    #[default]
    Shipping,
    /// Where the invoice goes
    Billing,
}

/// A postal address
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// Street and house number
    pub street: String,
    /// City
    pub city: String,
    /// State or province
    pub state: String,
    /// Six digit postal code
    pub postal_code: String,
    /// Country
    pub country: String,
    /// Shipping or billing
    #[serde(rename = "type")]
    pub kind: AddressKind,
    /// Default address of the customer
    pub is_default: bool,
}

impl Address {
    /// An empty address of the given kind, country preset to India
    #[must_use]
    pub fn blank(kind: AddressKind) -> Self {
        Self {
            country: "India".to_string(),
            kind,
            ..Self::default()
        }
    }

    /// Copy of this address re-tagged as `kind`
    #[must_use]
    pub fn retagged(&self, kind: AddressKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }
}

/// Contact details a guest enters at checkout
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    /// Email address
    pub email: String,
    /// Phone number
    pub phone: String,
}

/// The signed-in customer, when there is one
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSession {
    /// Account identifier
    pub user_id: String,
    /// Display name
    pub name: String,
    /// Account email
    pub email: String,
    /// Account phone
    pub phone: String,
}

/// Who pays, as handed to the payment gateway
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payer {
    /// Customer identifier, `None` for guests
    pub id: Option<String>,
    /// Name shown on the hosted page
    pub name: String,
    /// Email
    pub email: String,
    /// Phone
    pub phone: String,
}

// ============================================================================
// Payment and delivery choices
// ============================================================================

/// Payment method chosen at checkout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PaymentMethod {
    /// Pay the courier; no external confirmation
    CashOnDelivery,
    /// UPI collect through the hosted page
    Upi {
        /// Virtual payment address, e.g. `name@bank`
        vpa: String,
    },
    /// Card payment on the hosted page
    HostedCard,
}

impl PaymentMethod {
    /// `true` when payment completes on the hosted page after a redirect
    #[must_use]
    pub const fn requires_redirect(&self) -> bool {
        !matches!(self, Self::CashOnDelivery)
    }

    /// Short human readable label
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::CashOnDelivery => "Cash on Delivery",
            Self::Upi { .. } => "UPI",
            Self::HostedCard => "Card",
        }
    }
}

/// Delivery speed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryMethod {
    /// Regular delivery
    #[default]
    Standard,
    /// Priority delivery
    Express,
}

// ============================================================================
// Snapshot, draft and order
// ============================================================================

/// Durable record of everything needed to finish an order after a redirect
///
/// Written once right before the hosted payment page takes over, read on the
/// next mount, cleared after the order exists or the customer abandons.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSnapshot {
    /// Shipping address as entered
    pub shipping_address: Address,
    /// Billing address as entered (ignored when `use_same_address`)
    pub billing_address: Address,
    /// Bill to the shipping address
    pub use_same_address: bool,
    /// Guest email, `None` for signed-in customers
    pub guest_email: Option<String>,
    /// Guest phone, `None` for signed-in customers
    pub guest_phone: Option<String>,
    /// Chosen delivery date
    pub selected_date: Option<NaiveDate>,
    /// Chosen delivery window
    pub selected_time: Option<TimeWindow>,
    /// Chosen payment method
    pub payment_method: Option<PaymentMethod>,
    /// Chosen delivery speed
    #[serde(default)]
    pub delivery_method: DeliveryMethod,
    /// Total handed to the gateway when the payment was initialized
    pub authorized_total: Money,
}

impl CheckoutSnapshot {
    /// The billing address that applies
    #[must_use]
    pub fn effective_billing(&self) -> Address {
        if self.use_same_address {
            self.shipping_address.retagged(AddressKind::Billing)
        } else {
            self.billing_address.clone()
        }
    }

    /// Guest contact, if both fields were captured
    #[must_use]
    pub fn guest_contact(&self) -> Option<ContactInfo> {
        match (&self.guest_email, &self.guest_phone) {
            (Some(email), Some(phone)) => Some(ContactInfo {
                email: email.clone(),
                phone: phone.clone(),
            }),
            _ => None,
        }
    }

    /// Delivery slot, if both date and window were captured
    #[must_use]
    pub fn slot(&self) -> Option<DeliverySlot> {
        Some(DeliverySlot {
            date: self.selected_date?,
            window: self.selected_time?,
        })
    }
}

/// One ordered line: product, variant, quantity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftLineItem {
    /// Product identifier
    pub product_id: String,
    /// Variant identifier
    pub variant_id: Option<String>,
    /// Quantity
    pub quantity: u32,
    /// Unit price used for the totals
    pub unit_price: Money,
}

impl From<&CartItem> for DraftLineItem {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product_id.clone(),
            variant_id: item.variant_id.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
        }
    }
}

/// Everything the order service needs to create an order; never persisted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    /// Ordered lines
    pub items: Vec<DraftLineItem>,
    /// Sum of line totals
    pub subtotal: Money,
    /// Promo discount
    pub discount: Money,
    /// Shipping cost
    pub shipping_cost: Money,
    /// Tax
    pub tax: Money,
    /// Payable total
    pub total: Money,
    /// Shipping address
    pub shipping_address: Address,
    /// Billing address
    pub billing_address: Address,
    /// Delivery speed
    pub delivery_method: DeliveryMethod,
    /// Delivery slot
    pub delivery_slot: DeliverySlot,
    /// Payment method
    pub payment_method: PaymentMethod,
    /// Signed-in customer
    pub customer_id: Option<String>,
    /// Guest contact, only for unauthenticated checkouts
    pub guest_contact: Option<ContactInfo>,
    /// Verified provider identifier for redirect-based payments
    pub external_payment_id: Option<ExternalPaymentId>,
}

/// Fulfilment status of an order
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepted, not yet shipped
    #[default]
    Processing,
    /// Handed to the courier
    Shipped,
    /// Received by the customer
    Delivered,
    /// Cancelled
    Cancelled,
}

/// Authoritative order record returned by the order service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Server-assigned identifier
    pub id: OrderId,
    /// Ordered lines
    pub items: Vec<DraftLineItem>,
    /// Total charged
    pub total: Money,
    /// Status
    pub status: OrderStatus,
    /// Shipping address
    pub shipping_address: Address,
    /// Billing address
    pub billing_address: Address,
    /// Payment method
    pub payment_method: PaymentMethod,
    /// Provider identifier, when paid on the hosted page
    pub external_payment_id: Option<ExternalPaymentId>,
    /// Creation time on the server
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn money_parses_decimal_major_units() {
        assert_eq!("600".parse::<Money>().unwrap(), Money::from_minor(60_000));
        assert_eq!("50.5".parse::<Money>().unwrap(), Money::from_minor(5_050));
        assert_eq!("99.99".parse::<Money>().unwrap(), Money::from_minor(9_999));
        assert!("-1".parse::<Money>().is_err());
        assert!("1.234".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!(".5".parse::<Money>().is_err());
    }

    #[test]
    fn money_displays_two_fraction_digits() {
        assert_eq!(Money::from_minor(97_200).to_string(), "972.00");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
        assert_eq!(Money::from_minor(-150).to_string(), "-1.50");
    }

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(Money::from_minor(90_000).percent_round_half_up(8), Money::from_minor(7_200));
        // 8% of 0.07 = 0.0056 -> 0.01
        assert_eq!(Money::from_minor(7).percent_round_half_up(8), Money::from_minor(1));
        // 8% of 0.06 = 0.0048 -> 0.00
        assert_eq!(Money::from_minor(6).percent_round_half_up(8), Money::ZERO);
        assert_eq!(Money::from_minor(-500).percent_round_half_up(8), Money::ZERO);
    }

    #[test]
    fn payment_method_serializes_with_type_tag() {
        let upi = PaymentMethod::Upi { vpa: "asha@okbank".into() };
        let json = serde_json::to_value(&upi).unwrap();
        assert_eq!(json, serde_json::json!({"type": "upi", "vpa": "asha@okbank"}));
        assert!(upi.requires_redirect());
        assert!(!PaymentMethod::CashOnDelivery.requires_redirect());
    }

    #[test]
    fn same_address_bills_to_shipping() {
        let mut shipping = Address::blank(AddressKind::Shipping);
        shipping.street = "12 MG Road".into();
        let snapshot = CheckoutSnapshot {
            shipping_address: shipping,
            billing_address: Address::blank(AddressKind::Billing),
            use_same_address: true,
            guest_email: None,
            guest_phone: None,
            selected_date: None,
            selected_time: None,
            payment_method: None,
            delivery_method: DeliveryMethod::Standard,
            authorized_total: Money::ZERO,
        };

        let billing = snapshot.effective_billing();
        assert_eq!(billing.street, "12 MG Road");
        assert_eq!(billing.kind, AddressKind::Billing);
        assert!(snapshot.slot().is_none());
        assert!(snapshot.guest_contact().is_none());
    }
}
