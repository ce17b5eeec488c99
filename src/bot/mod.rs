//! Bot module for handling Telegram interactions
//!
//! Split into submodules:
//! - `command_handlers`: slash commands (/start, /menu, /cart, ...)
//! - `message_handler`: free-form text, dialogue input, search, AI fallback
//! - `callback_handler`: inline keyboard callbacks
//! - `ui_builder`: keyboards and message formatting

pub mod callback_handler;
pub mod command_handlers;
pub mod message_handler;
pub mod ui_builder;

use crate::cart::CartManager;
use crate::catalog::MenuCache;
use crate::checkout::CheckoutMachine;
use crate::config::AppConfig;
use crate::order::OrderService;
use crate::recommend::GeminiClient;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared dependencies every handler needs
pub struct Deps {
    pub config: AppConfig,
    pub pool: SqlitePool,
    pub menu: Arc<MenuCache>,
    pub carts: CartManager,
    pub machine: CheckoutMachine,
    pub orders: OrderService,
    pub recommender: Arc<GeminiClient>,
}

pub use callback_handler::callback_handler;
pub use message_handler::message_handler;
