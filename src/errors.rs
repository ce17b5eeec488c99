//! # Application Error Types
//!
//! This module defines the common error taxonomy used throughout the Hubsy
//! bot. Every variant is recoverable at the level of a single user turn:
//! nothing here should ever abort the process.

use std::fmt;

/// General application error type for consistent error handling
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration validation errors
    Config(String),
    /// Validation errors (phone, address, time slot input)
    Validation(String),
    /// A menu item id that is missing from the current catalog snapshot
    ItemNotFound(String),
    /// Cart ceilings exceeded (distinct lines or per-line quantity)
    CartLimitExceeded(String),
    /// Durable store write/read failures (orders, sessions, carts)
    Persistence(String),
    /// Menu/catalog read failures (Sheets API unreachable or malformed)
    CatalogUnavailable(String),
    /// Internal application errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Validation(msg) => write!(f, "[VALIDATION] {}", msg),
            AppError::ItemNotFound(msg) => write!(f, "[ITEM-NOT-FOUND] {}", msg),
            AppError::CartLimitExceeded(msg) => write!(f, "[CART-LIMIT] {}", msg),
            AppError::Persistence(msg) => write!(f, "[PERSISTENCE] {}", msg),
            AppError::CatalogUnavailable(msg) => write!(f, "[CATALOG] {}", msg),
            AppError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Standardized error logging utilities for consistent error reporting across the application
pub mod error_logging {
    use tracing::error;

    /// Log catalog read errors with sheet context
    pub fn log_catalog_error(error: &impl std::fmt::Display, operation: &str, sheet_id: &str) {
        error!(
            error = %error,
            operation = %operation,
            sheet_id = %sheet_id,
            "Catalog read failed"
        );
    }

    /// Log order processing errors with order-specific context
    pub fn log_order_error(
        error: &impl std::fmt::Display,
        operation: &str,
        user_id: i64,
        order_id: Option<&str>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            user_id = %user_id,
            order_id = ?order_id,
            "Order processing failed"
        );
    }

    /// Log network/communication errors with connection context
    pub fn log_network_error(
        error: &impl std::fmt::Display,
        operation: &str,
        endpoint: Option<&str>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            endpoint = ?endpoint,
            "Network operation failed"
        );
    }
}
