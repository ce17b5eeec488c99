//! Callback query handler: inline keyboard taps
//!
//! Callback data is a short verb with an optional argument after a colon.
//! Catalog and cart taps are handled here directly; everything prefixed
//! `ck_` is translated into a checkout machine event and driven through the
//! same path text input takes.

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::MaybeInaccessibleMessage;
use tracing::{debug, error};

use crate::cart::{DeliveryType, PaymentMethod};
use crate::checkout::CheckoutEvent;
use crate::db;
use crate::errors::AppError;
use crate::localization::{t_args_lang, t_lang};

use super::message_handler::drive_checkout;
use super::ui_builder::{
    create_cart_keyboard, create_categories_keyboard, create_items_keyboard, format_cart,
    format_menu_items, format_order_history,
};
use super::Deps;

/// Entry point for all callback queries
pub async fn callback_handler(bot: Bot, q: CallbackQuery, deps: Arc<Deps>) -> Result<()> {
    let language_code = q.from.language_code.as_deref();

    let chat_id = match &q.message {
        Some(MaybeInaccessibleMessage::Regular(msg)) => msg.chat.id,
        _ => ChatId::from(q.from.id),
    };

    // Always acknowledge so the client stops its spinner.
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };

    if let Err(e) = handle_callback_inner(&bot, &deps, chat_id, data, language_code).await {
        error!(user_id = %chat_id, data = %data, error = %e, "Callback handling failed");
        bot.send_message(chat_id, t_lang("error-generic", language_code))
            .await?;
    }
    Ok(())
}

async fn handle_callback_inner(
    bot: &Bot,
    deps: &Deps,
    chat_id: ChatId,
    data: &str,
    language_code: Option<&str>,
) -> Result<()> {
    debug!(user_id = %chat_id, data = %data, "Handling callback");

    let (verb, arg) = match data.split_once(':') {
        Some((verb, arg)) => (verb, arg),
        None => (data, ""),
    };

    match verb {
        "menu" => show_categories(bot, deps, chat_id, language_code).await,
        "cat" => show_category(bot, deps, chat_id, arg, language_code).await,
        "add" => add_to_cart(bot, deps, chat_id, arg, 1, language_code).await,
        "cart_inc" => add_to_cart(bot, deps, chat_id, arg, 1, language_code).await,
        "cart_dec" => {
            deps.carts.remove_item(chat_id.0, arg, 1).await?;
            show_cart(bot, deps, chat_id, language_code).await
        }
        "cart_clear" => {
            deps.carts.clear(chat_id.0).await?;
            show_cart(bot, deps, chat_id, language_code).await
        }
        "cart_show" => show_cart(bot, deps, chat_id, language_code).await,
        "orders_show" => {
            let rows = deps.orders.history(chat_id.0, 10).await?;
            bot.send_message(chat_id, format_order_history(&rows, language_code))
                .await?;
            Ok(())
        }

        "ck_begin" => drive_checkout(bot, deps, chat_id, CheckoutEvent::Begin, language_code).await,
        "ck_phone_keep" => {
            drive_checkout(bot, deps, chat_id, CheckoutEvent::PhoneConfirmed, language_code).await
        }
        "ck_phone_change" => {
            drive_checkout(bot, deps, chat_id, CheckoutEvent::PhoneRejected, language_code).await
        }
        "ck_delivery" => {
            drive_checkout(
                bot,
                deps,
                chat_id,
                CheckoutEvent::DeliveryType(DeliveryType::Delivery),
                language_code,
            )
            .await
        }
        "ck_pickup" => {
            drive_checkout(
                bot,
                deps,
                chat_id,
                CheckoutEvent::DeliveryType(DeliveryType::Pickup),
                language_code,
            )
            .await
        }
        "ck_addr_keep" => {
            // Re-validate the saved address through the normal path; the
            // delivery zone may have changed since the last order.
            let cart = db::get_cart(&deps.pool, chat_id.0).await?;
            let Some(address) = cart.address else {
                return drive_checkout(bot, deps, chat_id, CheckoutEvent::EditAddress, language_code)
                    .await;
            };
            drive_checkout(bot, deps, chat_id, CheckoutEvent::Text(&address), language_code).await
        }
        "ck_pay_cash" => {
            drive_checkout(
                bot,
                deps,
                chat_id,
                CheckoutEvent::Payment(PaymentMethod::Cash),
                language_code,
            )
            .await
        }
        "ck_pay_card" => {
            drive_checkout(
                bot,
                deps,
                chat_id,
                CheckoutEvent::Payment(PaymentMethod::Card),
                language_code,
            )
            .await
        }
        "ck_time_asap" => {
            drive_checkout(
                bot,
                deps,
                chat_id,
                CheckoutEvent::TimeSlot("Якнайшвидше"),
                language_code,
            )
            .await
        }
        "ck_confirm" => {
            drive_checkout(bot, deps, chat_id, CheckoutEvent::Confirm(arg), language_code).await
        }
        "ck_edit_phone" => {
            drive_checkout(bot, deps, chat_id, CheckoutEvent::EditPhone, language_code).await
        }
        "ck_edit_address" => {
            drive_checkout(bot, deps, chat_id, CheckoutEvent::EditAddress, language_code).await
        }
        "ck_cancel" => {
            drive_checkout(bot, deps, chat_id, CheckoutEvent::Cancel, language_code).await
        }

        _ => {
            debug!(data = %data, "Unknown callback data ignored");
            Ok(())
        }
    }
}

async fn show_categories(
    bot: &Bot,
    deps: &Deps,
    chat_id: ChatId,
    language_code: Option<&str>,
) -> Result<()> {
    let snapshot = deps.menu.snapshot().await?;
    if snapshot.is_empty() {
        bot.send_message(chat_id, t_lang("menu-empty", language_code))
            .await?;
        return Ok(());
    }
    bot.send_message(chat_id, t_lang("menu-pick-category", language_code))
        .reply_markup(create_categories_keyboard(&snapshot.categories(), language_code))
        .await?;
    Ok(())
}

async fn show_category(
    bot: &Bot,
    deps: &Deps,
    chat_id: ChatId,
    category: &str,
    language_code: Option<&str>,
) -> Result<()> {
    let snapshot = deps.menu.snapshot().await?;
    let items = snapshot.by_category(category);
    if items.is_empty() {
        return show_categories(bot, deps, chat_id, language_code).await;
    }

    bot.send_message(chat_id, format_menu_items(&items))
        .reply_markup(create_items_keyboard(&items, language_code))
        .await?;
    Ok(())
}

async fn add_to_cart(
    bot: &Bot,
    deps: &Deps,
    chat_id: ChatId,
    item_id: &str,
    quantity: u32,
    language_code: Option<&str>,
) -> Result<()> {
    let snapshot = deps.menu.snapshot().await?;
    match deps.carts.add_item(chat_id.0, &snapshot, item_id, quantity).await {
        Ok(cart) => {
            let name = cart
                .lines
                .iter()
                .find(|line| line.item_id == item_id)
                .map(|line| line.name.as_str())
                .unwrap_or_default();
            bot.send_message(
                chat_id,
                t_args_lang("item-added", &[("name", name)], language_code),
            )
            .await?;
            show_cart(bot, deps, chat_id, language_code).await
        }
        Err(AppError::ItemNotFound(_)) => {
            // The menu changed while the keyboard was on screen.
            bot.send_message(chat_id, t_lang("item-gone", language_code))
                .await?;
            Ok(())
        }
        Err(AppError::CartLimitExceeded(_)) => {
            bot.send_message(chat_id, t_lang("cart-limit", language_code))
                .await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn show_cart(
    bot: &Bot,
    deps: &Deps,
    chat_id: ChatId,
    language_code: Option<&str>,
) -> Result<()> {
    let summary = deps.carts.summary(chat_id.0).await?;
    bot.send_message(chat_id, format_cart(&summary, language_code))
        .reply_markup(create_cart_keyboard(&summary, language_code))
        .await?;
    Ok(())
}
