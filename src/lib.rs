//! # Hubsy Telegram Bot
//!
//! A Telegram bot for a restaurant: menu from Google Sheets, a per-user
//! cart, a guided checkout dialogue, SQLite order persistence, and optional
//! AI-backed recommendations for free-form messages.

pub mod bot;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod db;
pub mod errors;
pub mod geo;
pub mod localization;
pub mod order;
pub mod recommend;
pub mod validation;

// Re-export types for easier access
pub use cart::{Cart, CartLine, DeliveryType, PaymentMethod};
pub use checkout::{CheckoutEvent, CheckoutMachine, CheckoutSession, CheckoutState, StepOutcome};
pub use errors::{AppError, AppResult};
