//! Shared SQLite store: sessions, carts, and orders
//!
//! Sessions and carts are one JSON row per user id so every read-modify-write
//! is a single-row update, which is the only atomicity the dialogue needs.
//! The state must live here rather than in a process-local map: a deployment
//! may run several workers and successive webhook deliveries for the same
//! user can land on different processes.

use crate::cart::Cart;
use crate::checkout::{CheckoutSession, CheckoutState};
use crate::errors::AppResult;
use crate::order::Order;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

/// Initialize the database schema
pub async fn init_database_schema(pool: &SqlitePool) -> AppResult<()> {
    info!("Initializing database schema");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS sessions (
            user_id INTEGER PRIMARY KEY,
            state TEXT NOT NULL,
            confirm_token TEXT,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS carts (
            user_id INTEGER PRIMARY KEY,
            cart TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS orders (
            order_id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            lines TEXT NOT NULL,
            subtotal TEXT NOT NULL,
            delivery_cost TEXT NOT NULL,
            total TEXT NOT NULL,
            phone TEXT NOT NULL,
            address TEXT NOT NULL,
            payment_method TEXT NOT NULL,
            delivery_type TEXT NOT NULL,
            delivery_time TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS orders_user_id_idx ON orders(user_id)")
        .execute(pool)
        .await?;

    info!("Database schema initialized successfully");
    Ok(())
}

/// Get a user's checkout session; a missing row is an idle session
pub async fn get_session(pool: &SqlitePool, user_id: i64) -> AppResult<CheckoutSession> {
    let row = sqlx::query("SELECT state, confirm_token FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let state_json: String = row.get(0);
            let state: CheckoutState = serde_json::from_str(&state_json)?;
            Ok(CheckoutSession {
                user_id,
                state,
                confirm_token: row.get(1),
            })
        }
        None => Ok(CheckoutSession::idle(user_id)),
    }
}

/// Persist a user's checkout session (whole-row upsert)
pub async fn put_session(pool: &SqlitePool, session: &CheckoutSession) -> AppResult<()> {
    let state_json = serde_json::to_string(&session.state)?;
    sqlx::query(
        "INSERT INTO sessions (user_id, state, confirm_token, updated_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
             state = excluded.state,
             confirm_token = excluded.confirm_token,
             updated_at = excluded.updated_at",
    )
    .bind(session.user_id)
    .bind(&state_json)
    .bind(&session.confirm_token)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    debug!(user_id = %session.user_id, state = %state_json, "Session stored");
    Ok(())
}

/// Get a user's cart; a missing row is an empty cart
pub async fn get_cart(pool: &SqlitePool, user_id: i64) -> AppResult<Cart> {
    let row = sqlx::query("SELECT cart FROM carts WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let cart_json: String = row.get(0);
            Ok(serde_json::from_str(&cart_json)?)
        }
        None => Ok(Cart::new(user_id)),
    }
}

/// Persist a user's cart (whole-row upsert)
pub async fn put_cart(pool: &SqlitePool, cart: &Cart) -> AppResult<()> {
    let cart_json = serde_json::to_string(cart)?;
    sqlx::query(
        "INSERT INTO carts (user_id, cart, updated_at)
         VALUES (?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
             cart = excluded.cart,
             updated_at = excluded.updated_at",
    )
    .bind(cart.user_id)
    .bind(&cart_json)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Outcome of an order submission attempt
#[derive(Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Order row written, token consumed, session reset, cart cleared
    Saved,
    /// The confirmation token was already consumed; nothing was written
    TokenAlreadyUsed,
}

/// Submit an order in one transaction.
///
/// The confirmation token is consumed with a guarded UPDATE; when it no
/// longer matches (duplicate confirm callback) the transaction writes
/// nothing. On any write failure the transaction rolls back and the token
/// stays valid, so the user can retry from AwaitingConfirmation.
pub async fn submit_order(
    pool: &SqlitePool,
    token: &str,
    order: &Order,
    cleared_cart: &Cart,
) -> AppResult<SubmitOutcome> {
    let mut tx = pool.begin().await?;

    let consumed = sqlx::query(
        "UPDATE sessions SET confirm_token = NULL, state = ?, updated_at = ?
         WHERE user_id = ? AND confirm_token = ?",
    )
    .bind(serde_json::to_string(&CheckoutState::Idle)?)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(order.user_id)
    .bind(token)
    .execute(&mut *tx)
    .await?;

    if consumed.rows_affected() == 0 {
        debug!(user_id = %order.user_id, "Confirmation token already consumed");
        return Ok(SubmitOutcome::TokenAlreadyUsed);
    }

    sqlx::query(
        "INSERT INTO orders (order_id, user_id, lines, subtotal, delivery_cost, total,
                             phone, address, payment_method, delivery_type, delivery_time,
                             status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&order.order_id)
    .bind(order.user_id)
    .bind(serde_json::to_string(&order.lines)?)
    .bind(order.subtotal.to_string())
    .bind(order.delivery_cost.to_string())
    .bind(order.total.to_string())
    .bind(&order.phone)
    .bind(&order.address)
    .bind(order.payment_method.as_str())
    .bind(order.delivery_type.as_str())
    .bind(&order.delivery_time)
    .bind(order.status.as_str())
    .bind(order.created_at.to_rfc3339())
    .execute(&mut *tx)
    .await?;

    let cart_json = serde_json::to_string(cleared_cart)?;
    sqlx::query(
        "INSERT INTO carts (user_id, cart, updated_at)
         VALUES (?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
             cart = excluded.cart,
             updated_at = excluded.updated_at",
    )
    .bind(order.user_id)
    .bind(&cart_json)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(user_id = %order.user_id, order_id = %order.order_id, total = %order.total, "Order saved");
    Ok(SubmitOutcome::Saved)
}

/// Compact order row for the user-facing order history
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSummaryRow {
    pub order_id: String,
    pub total: String,
    pub status: String,
    pub created_at: String,
}

/// Most recent orders for a user, newest first
pub async fn list_orders_by_user(
    pool: &SqlitePool,
    user_id: i64,
    limit: i64,
) -> AppResult<Vec<OrderSummaryRow>> {
    let rows = sqlx::query(
        "SELECT order_id, total, status, created_at FROM orders
         WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| OrderSummaryRow {
            order_id: row.get(0),
            total: row.get(1),
            status: row.get(2),
            created_at: row.get(3),
        })
        .collect())
}

/// Advance an order's status (operator action); false when the id is unknown
pub async fn update_order_status(
    pool: &SqlitePool,
    order_id: &str,
    status: &str,
) -> AppResult<bool> {
    let result = sqlx::query("UPDATE orders SET status = ? WHERE order_id = ?")
        .bind(status)
        .bind(order_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
