//! Command Handlers module for processing bot commands

use anyhow::Result;
use chrono::{Local, Timelike};
use teloxide::prelude::*;
use tracing::debug;

use crate::checkout::{CheckoutEvent, StepOutcome};
use crate::db;
use crate::localization::{t_args_lang, t_lang};

use super::ui_builder::{
    create_cart_keyboard, create_categories_keyboard, create_main_menu_keyboard, format_cart,
    format_order_history,
};
use super::Deps;

fn greeting_key(hour: u32) -> &'static str {
    match hour {
        6..=11 => "greeting-morning",
        12..=17 => "greeting-day",
        _ => "greeting-evening",
    }
}

/// Handle the /start command
pub async fn handle_start_command(
    bot: &Bot,
    msg: &Message,
    deps: &Deps,
    language_code: Option<&str>,
) -> Result<()> {
    let hours = &deps.config.checkout;
    let now = Local::now();
    let hours_key = if (hours.open_hour..hours.close_hour).contains(&now.hour()) {
        "hours-open"
    } else {
        "hours-closed"
    };

    let name = msg
        .from
        .as_ref()
        .map(|user| user.first_name.clone())
        .unwrap_or_default();

    let welcome_message = format!(
        "{}\n\n{}\n{}\n\n{}",
        t_args_lang(greeting_key(now.hour()), &[("name", &name)], language_code),
        t_lang("welcome-description", language_code),
        t_args_lang(
            hours_key,
            &[
                ("from", &format!("{:02}:00", hours.open_hour)),
                ("until", &format!("{:02}:00", hours.close_hour)),
            ],
            language_code,
        ),
        t_lang("welcome-commands", language_code)
    );
    bot.send_message(msg.chat.id, welcome_message)
        .reply_markup(create_main_menu_keyboard(language_code))
        .await?;
    Ok(())
}

/// Handle the /help command
pub async fn handle_help_command(
    bot: &Bot,
    msg: &Message,
    language_code: Option<&str>,
) -> Result<()> {
    let help_message = vec![
        t_lang("help-title", language_code),
        t_lang("help-order", language_code),
        t_lang("help-commands", language_code),
        t_lang("help-freeform", language_code),
    ]
    .join("\n\n");
    bot.send_message(msg.chat.id, help_message).await?;
    Ok(())
}

/// Handle the /menu command: category overview
pub async fn handle_menu_command(
    bot: &Bot,
    msg: &Message,
    deps: &Deps,
    language_code: Option<&str>,
) -> Result<()> {
    debug!(user_id = %msg.chat.id, "Handling /menu command");

    let snapshot = match deps.menu.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            debug!(error = %e, "Menu unavailable");
            bot.send_message(msg.chat.id, t_lang("menu-unavailable", language_code))
                .await?;
            return Ok(());
        }
    };

    if snapshot.is_empty() {
        bot.send_message(msg.chat.id, t_lang("menu-empty", language_code))
            .await?;
        return Ok(());
    }

    let categories = snapshot.categories();
    bot.send_message(msg.chat.id, t_lang("menu-pick-category", language_code))
        .reply_markup(create_categories_keyboard(&categories, language_code))
        .await?;
    Ok(())
}

/// Handle the /cart command
pub async fn handle_cart_command(
    bot: &Bot,
    msg: &Message,
    deps: &Deps,
    language_code: Option<&str>,
) -> Result<()> {
    let user_id = msg.chat.id.0;
    let summary = deps.carts.summary(user_id).await?;

    bot.send_message(msg.chat.id, format_cart(&summary, language_code))
        .reply_markup(create_cart_keyboard(&summary, language_code))
        .await?;
    Ok(())
}

/// Handle the /orders command: recent order history
pub async fn handle_orders_command(
    bot: &Bot,
    msg: &Message,
    deps: &Deps,
    language_code: Option<&str>,
) -> Result<()> {
    let rows = deps.orders.history(msg.chat.id.0, 10).await?;
    bot.send_message(msg.chat.id, format_order_history(&rows, language_code))
        .await?;
    Ok(())
}

/// Handle the /cancel command: leave the checkout dialogue, keep the cart
pub async fn handle_cancel_command(
    bot: &Bot,
    msg: &Message,
    deps: &Deps,
    language_code: Option<&str>,
) -> Result<()> {
    let user_id = msg.chat.id.0;
    let mut session = db::get_session(&deps.pool, user_id).await?;
    let mut cart = db::get_cart(&deps.pool, user_id).await?;

    let outcome = deps
        .machine
        .handle(&mut session, &mut cart, CheckoutEvent::Cancel)
        .await?;
    db::put_session(&deps.pool, &session).await?;
    db::put_cart(&deps.pool, &cart).await?;

    if let StepOutcome::Reply(reply) = outcome {
        bot.send_message(msg.chat.id, t_lang(reply.key, language_code))
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_key_by_hour() {
        assert_eq!(greeting_key(7), "greeting-morning");
        assert_eq!(greeting_key(13), "greeting-day");
        assert_eq!(greeting_key(21), "greeting-evening");
        assert_eq!(greeting_key(3), "greeting-evening");
    }
}
