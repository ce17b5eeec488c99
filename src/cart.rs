//! Per-user shopping cart: lines, derived totals, and configured ceilings
//!
//! `Cart` holds the pure mutation logic so the invariants are testable
//! without a database; [`CartManager`] wraps it with the load-mutate-store
//! cycle against the shared session store (one row per user id, rewritten
//! whole, which gives the per-user atomicity the dialogue needs).

use crate::catalog::{MenuItem, MenuSnapshot};
use crate::config::CheckoutConfig;
use crate::db;
use crate::errors::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use tracing::debug;

/// How the order leaves the restaurant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryType {
    Delivery,
    Pickup,
}

impl DeliveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryType::Delivery => "delivery",
            DeliveryType::Pickup => "pickup",
        }
    }
}

/// How the user pays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
        }
    }
}

/// One distinct menu item and its quantity within a cart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub category: String,
    pub restaurant_id: Option<String>,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// A user's cart plus the checkout fields collected so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub user_id: i64,
    pub lines: Vec<CartLine>,
    pub delivery_type: Option<DeliveryType>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub delivery_time: Option<String>,
}

impl Cart {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            lines: Vec::new(),
            delivery_type: None,
            address: None,
            phone: None,
            payment_method: None,
            delivery_time: None,
        }
    }

    /// Subtotal over all lines
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Distinct restaurant ids present on the lines (unset ids ignored)
    pub fn distinct_restaurants(&self) -> BTreeSet<&str> {
        self.lines
            .iter()
            .filter_map(|line| line.restaurant_id.as_deref())
            .collect()
    }

    /// Add `quantity` units of a catalog item, merging into an existing line.
    ///
    /// Rejects with `CartLimitExceeded` when the distinct-line ceiling or the
    /// per-line quantity ceiling would be crossed; no partial mutation.
    pub fn add(&mut self, item: &MenuItem, quantity: u32, config: &CheckoutConfig) -> AppResult<()> {
        if quantity == 0 {
            return Err(AppError::Validation("quantity must be at least 1".to_string()));
        }

        if let Some(line) = self.lines.iter_mut().find(|l| l.item_id == item.id) {
            let new_quantity = line.quantity.saturating_add(quantity);
            if new_quantity > config.max_line_quantity {
                return Err(AppError::CartLimitExceeded(format!(
                    "max {} units per item",
                    config.max_line_quantity
                )));
            }
            line.quantity = new_quantity;
            return Ok(());
        }

        if self.lines.len() >= config.max_cart_lines {
            return Err(AppError::CartLimitExceeded(format!(
                "max {} distinct items",
                config.max_cart_lines
            )));
        }
        if quantity > config.max_line_quantity {
            return Err(AppError::CartLimitExceeded(format!(
                "max {} units per item",
                config.max_line_quantity
            )));
        }

        self.lines.push(CartLine {
            item_id: item.id.clone(),
            name: item.name.clone(),
            unit_price: item.price,
            quantity,
            category: item.category.clone(),
            restaurant_id: item.restaurant_id.clone(),
        });
        Ok(())
    }

    /// Remove `quantity` units; drops the line at zero. Absent items are a
    /// silent no-op, not an error.
    pub fn remove(&mut self, item_id: &str, quantity: u32) {
        if let Some(idx) = self.lines.iter().position(|l| l.item_id == item_id) {
            let line = &mut self.lines[idx];
            if line.quantity > quantity {
                line.quantity -= quantity;
            } else {
                self.lines.remove(idx);
            }
        }
    }

    /// Empty the lines unconditionally. Phone and address stay on file for
    /// the next order.
    pub fn clear_lines(&mut self) {
        self.lines.clear();
        self.delivery_type = None;
        self.payment_method = None;
        self.delivery_time = None;
    }
}

/// Read-only cart summary
#[derive(Debug, Clone, PartialEq)]
pub struct CartSummary {
    pub lines: Vec<CartLine>,
    pub subtotal: Decimal,
    pub is_empty: bool,
}

/// Load-mutate-store cart operations over the shared store
#[derive(Clone)]
pub struct CartManager {
    pool: SqlitePool,
    config: CheckoutConfig,
}

impl CartManager {
    pub fn new(pool: SqlitePool, config: CheckoutConfig) -> Self {
        Self { pool, config }
    }

    /// Add an item by id, resolved against the current catalog snapshot.
    ///
    /// An id the snapshot no longer carries (the menu changed while the
    /// keyboard was on screen) is `ItemNotFound`, not a silent skip.
    pub async fn add_item(
        &self,
        user_id: i64,
        menu: &MenuSnapshot,
        item_id: &str,
        quantity: u32,
    ) -> AppResult<Cart> {
        let Some(item) = menu.find(item_id) else {
            return Err(AppError::ItemNotFound(item_id.to_string()));
        };

        let mut cart = db::get_cart(&self.pool, user_id).await?;
        cart.add(item, quantity, &self.config)?;
        db::put_cart(&self.pool, &cart).await?;
        debug!(user_id = %user_id, item_id = %item.id, quantity = %quantity, "Item added to cart");
        Ok(cart)
    }

    /// Remove units of an item; no-op when the item is absent
    pub async fn remove_item(&self, user_id: i64, item_id: &str, quantity: u32) -> AppResult<Cart> {
        let mut cart = db::get_cart(&self.pool, user_id).await?;
        cart.remove(item_id, quantity);
        db::put_cart(&self.pool, &cart).await?;
        debug!(user_id = %user_id, item_id = %item_id, "Item removed from cart");
        Ok(cart)
    }

    /// Empty the cart unconditionally
    pub async fn clear(&self, user_id: i64) -> AppResult<()> {
        let mut cart = db::get_cart(&self.pool, user_id).await?;
        cart.clear_lines();
        db::put_cart(&self.pool, &cart).await?;
        debug!(user_id = %user_id, "Cart cleared");
        Ok(())
    }

    /// Pure read of the current lines and subtotal
    pub async fn summary(&self, user_id: i64) -> AppResult<CartSummary> {
        let cart = db::get_cart(&self.pool, user_id).await?;
        Ok(CartSummary {
            subtotal: cart.subtotal(),
            is_empty: cart.is_empty(),
            lines: cart.lines,
        })
    }
}
