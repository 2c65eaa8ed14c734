//! Persisted shopping cart.
//!
//! The cart lives in durable storage under [`CART_KEY`] so it survives the
//! round trip to the hosted payment page. Every mutation reads the stored
//! document, applies the change and writes the whole document back.

use crate::pricing::{self, PriceBreakdown, ShippingRule};
use crate::storage::{self, KeyValueStorage, StorageError};
use crate::types::{CartItem, DeliveryMethod, Money};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Storage key of the cart document
pub const CART_KEY: &str = "cart";

/// Stored cart: lines plus the applied promo
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartContents {
    /// Cart lines
    pub items: Vec<CartItem>,
    /// Applied promo code
    pub discount_code: Option<String>,
    /// Discount granted by the promo code
    #[serde(default)]
    pub discount: Money,
}

impl CartContents {
    /// `true` when there is nothing to order
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Price breakdown for a delivery method under `rule`
    #[must_use]
    pub fn price(&self, rule: &ShippingRule, method: DeliveryMethod) -> PriceBreakdown {
        pricing::compute_with_rule(&self.items, self.discount, rule, method)
    }
}

/// Cart backed by durable storage
#[derive(Clone)]
pub struct CartStore {
    storage: Arc<dyn KeyValueStorage>,
    // Serializes read-modify-write cycles within this process
    write_lock: Arc<Mutex<()>>,
}

impl CartStore {
    /// Cart over `storage`
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Current contents; an absent document is an empty cart
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the document cannot be read or decoded.
    pub fn contents(&self) -> Result<CartContents, StorageError> {
        Ok(storage::load_json(self.storage.as_ref(), CART_KEY)?.unwrap_or_default())
    }

    /// Adds a line, merging quantities with an existing line of the same product and variant
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the cart cannot be read or written.
    pub fn add_item(&self, item: CartItem) -> Result<CartContents, StorageError> {
        self.update(|cart| {
            match cart
                .items
                .iter_mut()
                .find(|line| line.same_line(&item.product_id, item.variant_id.as_deref()))
            {
                Some(line) => line.quantity = line.quantity.saturating_add(item.quantity),
                None => cart.items.push(item),
            }
        })
    }

    /// Removes a line
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the cart cannot be read or written.
    pub fn remove_item(
        &self,
        product_id: &str,
        variant_id: Option<&str>,
    ) -> Result<CartContents, StorageError> {
        self.update(|cart| cart.items.retain(|line| !line.same_line(product_id, variant_id)))
    }

    /// Sets the quantity of a line; zero removes it
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the cart cannot be read or written.
    pub fn update_quantity(
        &self,
        product_id: &str,
        variant_id: Option<&str>,
        quantity: u32,
    ) -> Result<CartContents, StorageError> {
        self.update(|cart| {
            if quantity == 0 {
                cart.items.retain(|line| !line.same_line(product_id, variant_id));
            } else if let Some(line) = cart
                .items
                .iter_mut()
                .find(|line| line.same_line(product_id, variant_id))
            {
                line.quantity = quantity;
            }
        })
    }

    /// Records a promo code and the discount it grants
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the cart cannot be read or written.
    pub fn apply_discount(
        &self,
        code: impl Into<String>,
        amount: Money,
    ) -> Result<CartContents, StorageError> {
        let code = code.into();
        self.update(|cart| {
            cart.discount_code = Some(code);
            cart.discount = amount;
        })
    }

    /// Empties the cart, promo included
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the document cannot be removed.
    pub fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.storage.remove(CART_KEY)?;
        tracing::info!("Cart cleared");
        Ok(())
    }

    fn update(&self, change: impl FnOnce(&mut CartContents)) -> Result<CartContents, StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cart = self.contents()?;
        change(&mut cart);
        storage::save_json(self.storage.as_ref(), CART_KEY, &cart)?;
        tracing::debug!(lines = cart.items.len(), "Cart updated");
        Ok(cart)
    }
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore").finish_non_exhaustive()
    }
}
