//! Order assembly and submission
//!
//! Builds an immutable [`Order`] from a completed checkout cart, assigns it
//! a human-readable id, and drives the transactional hand-off to the store.
//! The order floor is re-checked here even though the dialogue already
//! checked it; the cart could have been edited between summary and confirm.

use crate::cart::{Cart, CartLine, DeliveryType, PaymentMethod};
use crate::checkout::compute_delivery_cost;
use crate::config::CheckoutConfig;
use crate::db::{self, SubmitOutcome};
use crate::errors::{error_logging, AppError, AppResult};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

/// Lifecycle of a placed order; advanced by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    Confirmed,
    Preparing,
    Ready,
    Delivering,
    Delivered,
    Cancelled,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Delivering => "delivering",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
        }
    }
}

/// A submitted order, immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub user_id: i64,
    pub lines: Vec<CartLine>,
    pub subtotal: Decimal,
    pub delivery_cost: Decimal,
    pub total: Decimal,
    pub phone: String,
    pub address: String,
    pub payment_method: PaymentMethod,
    pub delivery_type: DeliveryType,
    pub delivery_time: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Order id in the `ORD-{timestamp}-{4 digits}` shape operators read aloud
pub fn generate_order_id(now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::rng().random_range(1000..=9999);
    format!("ORD-{}-{}", now.format("%Y%m%d%H%M%S"), suffix)
}

/// Assemble an order from a cart that finished the checkout dialogue.
///
/// Every field the dialogue collects must be present; a missing one means
/// the dialogue was bypassed and is an error, not a default.
pub fn build_order(cart: &Cart, config: &CheckoutConfig) -> AppResult<Order> {
    if cart.is_empty() {
        return Err(AppError::Validation("cart is empty".to_string()));
    }

    let subtotal = cart.subtotal();
    if subtotal < config.min_order_amount {
        return Err(AppError::Validation(format!(
            "subtotal {} below order minimum {}",
            subtotal, config.min_order_amount
        )));
    }

    let phone = cart
        .phone
        .clone()
        .ok_or_else(|| AppError::Validation("phone not collected".to_string()))?;
    let delivery_type = cart
        .delivery_type
        .ok_or_else(|| AppError::Validation("delivery type not chosen".to_string()))?;
    let payment_method = cart
        .payment_method
        .ok_or_else(|| AppError::Validation("payment method not chosen".to_string()))?;

    let address = match delivery_type {
        DeliveryType::Pickup => config.pickup_address.clone(),
        DeliveryType::Delivery => cart
            .address
            .clone()
            .ok_or_else(|| AppError::Validation("address not collected".to_string()))?,
    };

    let delivery_cost = compute_delivery_cost(config, delivery_type, subtotal);
    let now = Utc::now();

    Ok(Order {
        order_id: generate_order_id(now),
        user_id: cart.user_id,
        lines: cart.lines.clone(),
        subtotal,
        delivery_cost,
        total: subtotal + delivery_cost,
        phone,
        address,
        payment_method,
        delivery_type,
        delivery_time: cart
            .delivery_time
            .clone()
            .unwrap_or_else(|| "Якнайшвидше".to_string()),
        status: OrderStatus::New,
        created_at: now,
    })
}

/// Outcome of a confirm tap
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementOutcome {
    Placed(Order),
    /// The token was already consumed; the earlier tap won
    AlreadySubmitted,
}

/// Drives order placement against the shared store
#[derive(Clone)]
pub struct OrderService {
    pool: SqlitePool,
    config: CheckoutConfig,
}

impl OrderService {
    pub fn new(pool: SqlitePool, config: CheckoutConfig) -> Self {
        Self { pool, config }
    }

    /// Place the order and clear the cart in one transaction.
    ///
    /// On storage failure the token survives, so the user can tap confirm
    /// again once the store recovers. `cart` reflects the cleared state only
    /// after a successful placement.
    pub async fn place_order(&self, cart: &mut Cart, token: &str) -> AppResult<PlacementOutcome> {
        let order = build_order(cart, &self.config)?;

        let mut cleared = cart.clone();
        cleared.clear_lines();

        match db::submit_order(&self.pool, token, &order, &cleared).await {
            Ok(SubmitOutcome::Saved) => {
                *cart = cleared;
                Ok(PlacementOutcome::Placed(order))
            }
            Ok(SubmitOutcome::TokenAlreadyUsed) => Ok(PlacementOutcome::AlreadySubmitted),
            Err(e) => {
                error_logging::log_order_error(&e, "place_order", cart.user_id, Some(&order.order_id));
                Err(e)
            }
        }
    }

    /// Recent orders for the user-facing history
    pub async fn history(&self, user_id: i64, limit: i64) -> AppResult<Vec<db::OrderSummaryRow>> {
        db::list_orders_by_user(&self.pool, user_id, limit).await
    }
}

/// Plain-text order card for the operator chat
pub fn operator_summary(order: &Order) -> String {
    let mut text = format!(
        "Нове замовлення {}\nКлієнт: {}\nТип: {}\nАдреса: {}\nОплата: {}\nЧас: {}\n\n",
        order.order_id,
        order.phone,
        match order.delivery_type {
            DeliveryType::Delivery => "доставка",
            DeliveryType::Pickup => "самовивіз",
        },
        order.address,
        match order.payment_method {
            PaymentMethod::Cash => "готівка",
            PaymentMethod::Card => "картка",
        },
        order.delivery_time,
    );
    for line in &order.lines {
        text.push_str(&format!(
            "• {} x{} = {:.2} грн\n",
            line.name,
            line.quantity,
            line.line_total().round_dp(2)
        ));
    }
    text.push_str(&format!(
        "\nСума: {:.2} грн\nДоставка: {:.2} грн\nРазом: {:.2} грн",
        order.subtotal.round_dp(2),
        order.delivery_cost.round_dp(2),
        order.total.round_dp(2)
    ));
    info!(order_id = %order.order_id, "Operator notification prepared");
    text
}
