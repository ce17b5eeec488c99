//! Message handler: commands, dialogue input, search, and the AI fallback
//!
//! Every incoming text lands here. Commands dispatch directly; anything else
//! is first offered to the checkout dialogue when one is active, then to
//! menu search, then to the recommender. The outer handler is the error
//! boundary: a failed turn answers with a generic message and leaves the
//! stored state untouched.

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{error, warn};

use crate::checkout::{CheckoutEvent, CheckoutState, Reply, StepOutcome};
use crate::db;
use crate::errors::AppError;
use crate::localization::{t_args_lang, t_lang};
use crate::order::{operator_summary, PlacementOutcome};
use crate::recommend::RecommendAction;

use super::command_handlers::{
    handle_cancel_command, handle_cart_command, handle_help_command, handle_menu_command,
    handle_orders_command, handle_start_command,
};
use super::ui_builder::{
    create_cart_keyboard, create_categories_keyboard, create_checkout_keyboard,
    create_items_keyboard, format_cart, format_menu_items,
};
use super::Deps;

/// Entry point for all incoming messages
pub async fn message_handler(bot: Bot, msg: Message, deps: Arc<Deps>) -> Result<()> {
    let language_code = msg
        .from
        .as_ref()
        .and_then(|user| user.language_code.as_deref());

    if let Err(e) = handle_message_inner(&bot, &msg, &deps, language_code).await {
        error!(user_id = %msg.chat.id, error = %e, "Message handling failed");
        bot.send_message(msg.chat.id, t_lang("error-generic", language_code))
            .await?;
    }
    Ok(())
}

async fn handle_message_inner(
    bot: &Bot,
    msg: &Message,
    deps: &Deps,
    language_code: Option<&str>,
) -> Result<()> {
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, t_lang("unsupported-message", language_code))
            .await?;
        return Ok(());
    };

    // "/menu@SomeBot" arrives in groups; the mention is noise here.
    let command = text
        .split_whitespace()
        .next()
        .map(|word| word.split('@').next().unwrap_or(word))
        .unwrap_or("");

    match command {
        "/start" => handle_start_command(bot, msg, deps, language_code).await,
        "/help" => handle_help_command(bot, msg, language_code).await,
        "/menu" => handle_menu_command(bot, msg, deps, language_code).await,
        "/cart" => handle_cart_command(bot, msg, deps, language_code).await,
        "/orders" => handle_orders_command(bot, msg, deps, language_code).await,
        "/cancel" => handle_cancel_command(bot, msg, deps, language_code).await,
        "/checkout" => {
            drive_checkout(bot, deps, msg.chat.id, CheckoutEvent::Begin, language_code).await
        }
        _ => handle_free_text(bot, msg, deps, text, language_code).await,
    }
}

/// Free-form text: dialogue input when a checkout is active, otherwise
/// search, otherwise the recommender.
async fn handle_free_text(
    bot: &Bot,
    msg: &Message,
    deps: &Deps,
    text: &str,
    language_code: Option<&str>,
) -> Result<()> {
    let user_id = msg.chat.id.0;
    let session = db::get_session(&deps.pool, user_id).await?;

    if session.state != CheckoutState::Idle {
        return drive_checkout(bot, deps, msg.chat.id, CheckoutEvent::Text(text), language_code)
            .await;
    }

    let snapshot = deps.menu.snapshot().await?;
    let found = snapshot.search(text);
    if !found.is_empty() {
        bot.send_message(msg.chat.id, format_menu_items(&found))
            .reply_markup(create_items_keyboard(&found, language_code))
            .await?;
        return Ok(());
    }

    if deps.recommender.enabled() {
        let summary = deps.carts.summary(user_id).await?;
        match deps.recommender.interpret(text, &snapshot, &summary).await {
            Ok(interpretation) => match interpretation.action {
                RecommendAction::Recommend => {
                    let items: Vec<_> = interpretation
                        .items
                        .iter()
                        .filter_map(|id| snapshot.find(id))
                        .collect();
                    let intro = if interpretation.message.is_empty() {
                        t_lang("recommend-intro", language_code)
                    } else {
                        interpretation.message
                    };
                    bot.send_message(msg.chat.id, format!("{}\n\n{}", intro, format_menu_items(&items)))
                        .reply_markup(create_items_keyboard(&items, language_code))
                        .await?;
                    return Ok(());
                }
                RecommendAction::AddToCart => {
                    for id in &interpretation.items {
                        if let Err(e) = deps.carts.add_item(user_id, &snapshot, id, 1).await {
                            warn!(user_id = %user_id, item_id = %id, error = %e, "Recommender add rejected");
                        }
                    }
                    let summary = deps.carts.summary(user_id).await?;
                    bot.send_message(msg.chat.id, format_cart(&summary, language_code))
                        .reply_markup(create_cart_keyboard(&summary, language_code))
                        .await?;
                    return Ok(());
                }
                RecommendAction::ShowMenu => {}
            },
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Recommender unavailable, falling back to menu");
            }
        }
    }

    bot.send_message(msg.chat.id, t_lang("freeform-fallback", language_code))
        .reply_markup(create_categories_keyboard(&snapshot.categories(), language_code))
        .await?;
    Ok(())
}

/// Load state, advance the checkout machine by one event, persist, render.
///
/// On submission the store transaction resets the session and cart itself,
/// so those are not rewritten here; a rewrite would resurrect the token.
pub(crate) async fn drive_checkout(
    bot: &Bot,
    deps: &Deps,
    chat_id: ChatId,
    event: CheckoutEvent<'_>,
    language_code: Option<&str>,
) -> Result<()> {
    let user_id = chat_id.0;
    let mut session = db::get_session(&deps.pool, user_id).await?;
    let mut cart = db::get_cart(&deps.pool, user_id).await?;

    match deps.machine.handle(&mut session, &mut cart, event).await? {
        StepOutcome::Reply(reply) => {
            db::put_session(&deps.pool, &session).await?;
            db::put_cart(&deps.pool, &cart).await?;
            send_checkout_reply(bot, chat_id, &reply, language_code).await
        }
        StepOutcome::Submit { token } => {
            match deps.orders.place_order(&mut cart, &token).await {
                Ok(PlacementOutcome::Placed(order)) => {
                    bot.send_message(
                        chat_id,
                        t_args_lang(
                            "order-accepted",
                            &[
                                ("order_id", order.order_id.as_str()),
                                ("total", &format!("{:.2}", order.total.round_dp(2))),
                            ],
                            language_code,
                        ),
                    )
                    .await?;

                    if let Some(operator_chat_id) = deps.config.bot.operator_chat_id {
                        if let Err(e) = bot
                            .send_message(ChatId(operator_chat_id), operator_summary(&order))
                            .await
                        {
                            warn!(order_id = %order.order_id, error = %e, "Operator notification failed");
                        }
                    }
                    Ok(())
                }
                Ok(PlacementOutcome::AlreadySubmitted) => {
                    bot.send_message(chat_id, t_lang("checkout-confirm-stale", language_code))
                        .await?;
                    Ok(())
                }
                Err(AppError::Validation(reason)) => {
                    // The cart stopped satisfying the order rules between
                    // summary and confirm; restart the dialogue cleanly.
                    warn!(user_id = %user_id, reason = %reason, "Order rejected at submission");
                    session.state = CheckoutState::Idle;
                    session.confirm_token = None;
                    db::put_session(&deps.pool, &session).await?;
                    bot.send_message(chat_id, t_lang("order-rejected", language_code))
                        .await?;
                    Ok(())
                }
                Err(e) => {
                    // Token survives; the user can tap confirm again.
                    error!(user_id = %user_id, error = %e, "Order placement failed");
                    bot.send_message(chat_id, t_lang("order-failed", language_code))
                        .await?;
                    Ok(())
                }
            }
        }
    }
}

async fn send_checkout_reply(
    bot: &Bot,
    chat_id: ChatId,
    reply: &Reply,
    language_code: Option<&str>,
) -> Result<()> {
    let args: Vec<(&str, &str)> = reply
        .args
        .iter()
        .map(|(key, value)| (*key, value.as_str()))
        .collect();
    let text = t_args_lang(reply.key, &args, language_code);

    let mut request = bot.send_message(chat_id, text);
    if !reply.options.is_empty() {
        request = request.reply_markup(create_checkout_keyboard(&reply.options, language_code));
    }
    request.await?;
    Ok(())
}
