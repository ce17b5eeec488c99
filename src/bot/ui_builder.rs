//! UI Builder module for creating keyboards and formatting messages

use crate::cart::CartSummary;
use crate::catalog::MenuItem;
use crate::checkout::{format_amount, KeyboardOption};
use crate::db::OrderSummaryRow;
use crate::localization::{t_args_lang, t_lang};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

/// Top-level menu shown by /start
pub fn create_main_menu_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            t_lang("btn-menu", language_code),
            "menu",
        )],
        vec![
            InlineKeyboardButton::callback(t_lang("btn-cart", language_code), "cart_show"),
            InlineKeyboardButton::callback(t_lang("btn-orders", language_code), "orders_show"),
        ],
    ])
}

/// One button per menu category
pub fn create_categories_keyboard(
    categories: &[String],
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = categories
        .iter()
        .map(|category| {
            vec![InlineKeyboardButton::callback(
                category.clone(),
                format!("cat:{}", category),
            )]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback(
        t_lang("btn-cart", language_code),
        "cart_show",
    )]);
    InlineKeyboardMarkup::new(rows)
}

/// Add-to-cart buttons for the items of one category or a search result
pub fn create_items_keyboard(
    items: &[&MenuItem],
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = items
        .iter()
        .map(|item| {
            vec![InlineKeyboardButton::callback(
                format!("➕ {} — {} грн", item.name, format_amount(item.price)),
                format!("add:{}", item.id),
            )]
        })
        .collect();
    rows.push(vec![
        InlineKeyboardButton::callback(t_lang("btn-back-to-menu", language_code), "menu"),
        InlineKeyboardButton::callback(t_lang("btn-cart", language_code), "cart_show"),
    ]);
    InlineKeyboardMarkup::new(rows)
}

/// Quantity controls plus clear/checkout for the cart view
pub fn create_cart_keyboard(
    summary: &CartSummary,
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = summary
        .lines
        .iter()
        .map(|line| {
            vec![
                InlineKeyboardButton::callback("➖".to_string(), format!("cart_dec:{}", line.item_id)),
                InlineKeyboardButton::callback(
                    format!("{} x{}", line.name, line.quantity),
                    format!("cat:{}", line.category),
                ),
                InlineKeyboardButton::callback("➕".to_string(), format!("cart_inc:{}", line.item_id)),
            ]
        })
        .collect();

    if !summary.is_empty {
        rows.push(vec![
            InlineKeyboardButton::callback(t_lang("btn-cart-clear", language_code), "cart_clear"),
            InlineKeyboardButton::callback(t_lang("btn-checkout", language_code), "ck_begin"),
        ]);
    }
    rows.push(vec![InlineKeyboardButton::callback(
        t_lang("btn-back-to-menu", language_code),
        "menu",
    )]);
    InlineKeyboardMarkup::new(rows)
}

/// Keyboard for a checkout dialogue reply
pub fn create_checkout_keyboard(
    options: &[KeyboardOption],
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = options
        .iter()
        .map(|option| {
            vec![InlineKeyboardButton::callback(
                t_lang(option.key, language_code),
                option.callback.clone(),
            )]
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

/// Item card text for a category listing
pub fn format_menu_items(items: &[&MenuItem]) -> String {
    let mut text = String::new();
    for item in items {
        text.push_str(&format!("🍽 {} — {} грн\n", item.name, format_amount(item.price)));
        if !item.description.is_empty() {
            text.push_str(&format!("   {}\n", item.description));
        }
        if let Some(rating) = item.rating {
            text.push_str(&format!("   ⭐ {:.1}", rating));
            if let Some(cook_time) = &item.cook_time {
                text.push_str(&format!(" · ⏱ {}", cook_time));
            }
            text.push('\n');
        } else if let Some(cook_time) = &item.cook_time {
            text.push_str(&format!("   ⏱ {}\n", cook_time));
        }
        if let Some(allergens) = &item.allergens {
            text.push_str(&format!("   ⚠️ {}\n", allergens));
        }
        text.push('\n');
    }
    text
}

/// Cart contents with per-line and grand totals
pub fn format_cart(summary: &CartSummary, language_code: Option<&str>) -> String {
    if summary.is_empty {
        return t_lang("cart-empty", language_code);
    }

    let mut text = format!("🛒 {}\n\n", t_lang("cart-title", language_code));
    for line in &summary.lines {
        text.push_str(&format!(
            "• {} x{} = {} грн\n",
            line.name,
            line.quantity,
            format_amount(line.line_total())
        ));
    }
    text.push('\n');
    text.push_str(&t_args_lang(
        "cart-subtotal",
        &[("subtotal", &format_amount(summary.subtotal))],
        language_code,
    ));
    text
}

/// Order history, newest first
pub fn format_order_history(rows: &[OrderSummaryRow], language_code: Option<&str>) -> String {
    if rows.is_empty() {
        return t_lang("orders-empty", language_code);
    }

    let mut text = format!("📋 {}\n\n", t_lang("orders-title", language_code));
    for row in rows {
        let date = row.created_at.split('T').next().unwrap_or(&row.created_at);
        text.push_str(&format!(
            "• {} — {} грн — {} ({})\n",
            row.order_id,
            row.total,
            t_lang(&format!("order-status-{}", row.status), language_code),
            date
        ));
    }
    text
}
