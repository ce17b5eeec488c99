//! Tests for cart mutation rules and totals

use hubsy::cart::Cart;
use hubsy::catalog::MenuItem;
use hubsy::config::CheckoutConfig;
use hubsy::errors::AppError;
use rust_decimal::Decimal;

fn item(id: &str, price: i64, restaurant: &str) -> MenuItem {
    MenuItem {
        id: id.to_string(),
        name: format!("Страва {}", id),
        category: "Піца".to_string(),
        description: String::new(),
        price: Decimal::new(price, 0),
        restaurant_id: Some(restaurant.to_string()),
        active: true,
        rating: None,
        allergens: None,
        cook_time: None,
    }
}

#[test]
fn test_add_merges_into_existing_line() {
    let config = CheckoutConfig::default();
    let mut cart = Cart::new(1);

    cart.add(&item("P1", 180, "R1"), 1, &config).unwrap();
    cart.add(&item("P1", 180, "R1"), 2, &config).unwrap();

    assert_eq!(cart.lines.len(), 1);
    assert_eq!(cart.lines[0].quantity, 3);
    assert_eq!(cart.subtotal(), Decimal::new(540, 0));
}

#[test]
fn test_add_rejects_quantity_ceiling_without_partial_mutation() {
    let config = CheckoutConfig::default();
    let mut cart = Cart::new(1);
    cart.add(&item("P1", 180, "R1"), config.max_line_quantity, &config)
        .unwrap();

    let err = cart.add(&item("P1", 180, "R1"), 1, &config).unwrap_err();
    assert!(matches!(err, AppError::CartLimitExceeded(_)));
    assert_eq!(cart.lines[0].quantity, config.max_line_quantity);
}

#[test]
fn test_add_rejects_distinct_line_ceiling() {
    let config = CheckoutConfig::default();
    let mut cart = Cart::new(1);
    for i in 0..config.max_cart_lines {
        cart.add(&item(&format!("P{}", i), 100, "R1"), 1, &config)
            .unwrap();
    }

    let err = cart.add(&item("P999", 100, "R1"), 1, &config).unwrap_err();
    assert!(matches!(err, AppError::CartLimitExceeded(_)));
    assert_eq!(cart.lines.len(), config.max_cart_lines);
}

#[test]
fn test_add_rejects_zero_quantity() {
    let config = CheckoutConfig::default();
    let mut cart = Cart::new(1);
    assert!(cart.add(&item("P1", 180, "R1"), 0, &config).is_err());
    assert!(cart.is_empty());
}

#[test]
fn test_remove_decrements_and_drops_at_zero() {
    let config = CheckoutConfig::default();
    let mut cart = Cart::new(1);
    cart.add(&item("P1", 180, "R1"), 3, &config).unwrap();

    cart.remove("P1", 1);
    assert_eq!(cart.lines[0].quantity, 2);

    cart.remove("P1", 5);
    assert!(cart.is_empty());

    // Absent items are a silent no-op
    cart.remove("P1", 1);
    assert!(cart.is_empty());
}

#[test]
fn test_distinct_restaurants() {
    let config = CheckoutConfig::default();
    let mut cart = Cart::new(1);
    cart.add(&item("P1", 180, "R1"), 1, &config).unwrap();
    cart.add(&item("P2", 120, "R1"), 1, &config).unwrap();
    assert_eq!(cart.distinct_restaurants().len(), 1);

    cart.add(&item("S1", 90, "R2"), 1, &config).unwrap();
    assert_eq!(cart.distinct_restaurants().len(), 2);
}

#[test]
fn test_clear_lines_keeps_contact_details() {
    let config = CheckoutConfig::default();
    let mut cart = Cart::new(1);
    cart.add(&item("P1", 180, "R1"), 1, &config).unwrap();
    cart.phone = Some("+380671234567".to_string());
    cart.address = Some("вул. Шевченка 12".to_string());
    cart.delivery_time = Some("18:30".to_string());

    cart.clear_lines();

    assert!(cart.is_empty());
    assert_eq!(cart.phone.as_deref(), Some("+380671234567"));
    assert_eq!(cart.address.as_deref(), Some("вул. Шевченка 12"));
    assert_eq!(cart.delivery_time, None);
}

#[test]
fn test_cart_survives_json_round_trip() {
    let config = CheckoutConfig::default();
    let mut cart = Cart::new(42);
    cart.add(&item("P1", 185, "R1"), 2, &config).unwrap();
    cart.phone = Some("+380671234567".to_string());

    let json = serde_json::to_string(&cart).unwrap();
    let restored: Cart = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, cart);
    assert_eq!(restored.subtotal(), Decimal::new(370, 0));
}
