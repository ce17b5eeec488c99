//! Tests for the checkout dialogue state machine

use async_trait::async_trait;
use hubsy::cart::{Cart, DeliveryType, PaymentMethod};
use hubsy::catalog::MenuItem;
use hubsy::checkout::{
    CheckoutEvent, CheckoutMachine, CheckoutSession, CheckoutState, Reply, StepOutcome,
};
use hubsy::config::{CheckoutConfig, GeoConfig};
use hubsy::errors::AppResult;
use hubsy::geo::{GeoPoint, Geocoder};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Geocoder fixture answering with a fixed point
struct FixtureGeocoder {
    point: Option<GeoPoint>,
}

#[async_trait]
impl Geocoder for FixtureGeocoder {
    async fn locate(&self, _address: &str) -> AppResult<Option<GeoPoint>> {
        Ok(self.point)
    }
}

fn in_zone_machine() -> CheckoutMachine {
    let geo = GeoConfig::default();
    let point = GeoPoint {
        lat: geo.restaurant_lat,
        lon: geo.restaurant_lon,
    };
    CheckoutMachine::new(
        CheckoutConfig::default(),
        geo,
        Arc::new(FixtureGeocoder { point: Some(point) }),
    )
}

fn machine_with(point: Option<GeoPoint>) -> CheckoutMachine {
    CheckoutMachine::new(
        CheckoutConfig::default(),
        GeoConfig::default(),
        Arc::new(FixtureGeocoder { point }),
    )
}

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

fn cart_with_subtotal(amount: i64) -> Cart {
    let config = CheckoutConfig::default();
    let mut cart = Cart::new(7);
    cart.add(&item("P1", amount, "R1"), 1, &config).unwrap();
    cart
}

fn reply(outcome: StepOutcome) -> Reply {
    match outcome {
        StepOutcome::Reply(reply) => reply,
        StepOutcome::Submit { .. } => panic!("expected a reply, got a submission"),
    }
}

fn arg<'a>(reply: &'a Reply, key: &str) -> &'a str {
    reply
        .args
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or_else(|| panic!("missing arg {key} in {reply:?}"))
}

/// Begin the checkout and bring the dialogue past the phone sub-flow
async fn advance_past_phone(
    machine: &CheckoutMachine,
    session: &mut CheckoutSession,
    cart: &mut Cart,
) {
    machine
        .handle(session, cart, CheckoutEvent::Begin)
        .await
        .unwrap();
    machine
        .handle(session, cart, CheckoutEvent::Text("0671234567"))
        .await
        .unwrap();
    machine
        .handle(session, cart, CheckoutEvent::PhoneConfirmed)
        .await
        .unwrap();
    assert_eq!(session.state, CheckoutState::AwaitingDeliveryType);
}

/// Continue a dialogue that sits at AwaitingDeliveryType through pickup to
/// the summary
async fn advance_to_pickup_summary(
    machine: &CheckoutMachine,
    session: &mut CheckoutSession,
    cart: &mut Cart,
) -> Reply {
    machine
        .handle(
            session,
            cart,
            CheckoutEvent::DeliveryType(DeliveryType::Pickup),
        )
        .await
        .unwrap();
    machine
        .handle(session, cart, CheckoutEvent::Payment(PaymentMethod::Cash))
        .await
        .unwrap();
    reply(
        machine
            .handle(session, cart, CheckoutEvent::TimeSlot("Якнайшвидше"))
            .await
            .unwrap(),
    )
}

#[tokio::test]
async fn test_full_delivery_flow_reaches_submission() {
    let machine = in_zone_machine();
    let mut session = CheckoutSession::idle(7);
    let mut cart = cart_with_subtotal(250);

    let r = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::Begin)
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-ask-phone");
    assert_eq!(session.state, CheckoutState::AwaitingPhone);

    // An entered phone is echoed back for confirmation before locking in
    let r = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::Text("067 123 45 67"))
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-phone-confirm");
    assert_eq!(arg(&r, "phone"), "+380671234567");
    assert_eq!(cart.phone.as_deref(), Some("+380671234567"));

    let r = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::PhoneConfirmed)
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-ask-delivery-type");

    let r = reply(
        machine
            .handle(
                &mut session,
                &mut cart,
                CheckoutEvent::DeliveryType(DeliveryType::Delivery),
            )
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-ask-address");

    let r = reply(
        machine
            .handle(
                &mut session,
                &mut cart,
                CheckoutEvent::Text("вул. Шевченка 12, кв. 45"),
            )
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-ask-payment");
    assert_eq!(cart.address.as_deref(), Some("вул. Шевченка 12, кв. 45"));

    let r = reply(
        machine
            .handle(
                &mut session,
                &mut cart,
                CheckoutEvent::Payment(PaymentMethod::Cash),
            )
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-ask-time");

    let summary = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::Text("18:30"))
            .await
            .unwrap(),
    );
    assert_eq!(summary.key, "checkout-summary");
    assert_eq!(arg(&summary, "subtotal"), "250.00");
    assert_eq!(arg(&summary, "delivery_cost"), "50.00");
    assert_eq!(arg(&summary, "total"), "300.00");
    assert_eq!(session.state, CheckoutState::AwaitingConfirmation);

    let token = session.confirm_token.clone().expect("token minted");
    let outcome = machine
        .handle(&mut session, &mut cart, CheckoutEvent::Confirm(&token))
        .await
        .unwrap();
    assert_eq!(outcome, StepOutcome::Submit { token });
}

#[tokio::test]
async fn test_begin_rejects_cart_below_minimum_with_exact_shortfall() {
    let machine = in_zone_machine();
    let config = CheckoutConfig::default();
    let mut session = CheckoutSession::idle(7);
    let mut cart = cart_with_subtotal(180);

    let r = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::Begin)
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-min-order");
    assert_eq!(arg(&r, "minimum"), "200.00");
    assert_eq!(arg(&r, "shortfall"), "20.00");
    assert_eq!(session.state, CheckoutState::Idle);

    // Topping the cart up past the minimum lets checkout begin
    cart.add(&item("D1", 40, "R1"), 1, &config).unwrap();
    let r = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::Begin)
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-ask-phone");
    assert_eq!(session.state, CheckoutState::AwaitingPhone);
}

#[tokio::test]
async fn test_begin_rejects_empty_cart_and_mixed_restaurants() {
    let machine = in_zone_machine();
    let config = CheckoutConfig::default();

    let mut session = CheckoutSession::idle(7);
    let mut empty = Cart::new(7);
    let r = reply(
        machine
            .handle(&mut session, &mut empty, CheckoutEvent::Begin)
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-empty-cart");

    let mut mixed = Cart::new(7);
    mixed.add(&item("P1", 150, "R1"), 1, &config).unwrap();
    mixed.add(&item("S1", 150, "R2"), 1, &config).unwrap();
    let r = reply(
        machine
            .handle(&mut session, &mut mixed, CheckoutEvent::Begin)
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-multi-restaurant");
    assert_eq!(session.state, CheckoutState::Idle);
}

#[tokio::test]
async fn test_pickup_skips_address_and_costs_nothing() {
    let machine = in_zone_machine();
    let config = CheckoutConfig::default();
    let mut session = CheckoutSession::idle(7);
    let mut cart = cart_with_subtotal(250);

    advance_past_phone(&machine, &mut session, &mut cart).await;

    let r = reply(
        machine
            .handle(
                &mut session,
                &mut cart,
                CheckoutEvent::DeliveryType(DeliveryType::Pickup),
            )
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-ask-payment");

    machine
        .handle(
            &mut session,
            &mut cart,
            CheckoutEvent::Payment(PaymentMethod::Card),
        )
        .await
        .unwrap();
    let summary = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::TimeSlot("Якнайшвидше"))
            .await
            .unwrap(),
    );
    assert_eq!(arg(&summary, "delivery_cost"), "0.00");
    assert_eq!(arg(&summary, "total"), "250.00");
    assert_eq!(arg(&summary, "address"), config.pickup_address);
}

#[tokio::test]
async fn test_free_delivery_over_threshold() {
    let machine = in_zone_machine();
    let mut session = CheckoutSession::idle(7);
    let mut cart = cart_with_subtotal(320);

    advance_past_phone(&machine, &mut session, &mut cart).await;
    machine
        .handle(
            &mut session,
            &mut cart,
            CheckoutEvent::DeliveryType(DeliveryType::Delivery),
        )
        .await
        .unwrap();
    machine
        .handle(
            &mut session,
            &mut cart,
            CheckoutEvent::Text("вул. Шевченка 12, кв. 45"),
        )
        .await
        .unwrap();
    machine
        .handle(
            &mut session,
            &mut cart,
            CheckoutEvent::Payment(PaymentMethod::Cash),
        )
        .await
        .unwrap();
    let summary = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::TimeSlot("Якнайшвидше"))
            .await
            .unwrap(),
    );
    assert_eq!(arg(&summary, "delivery_cost"), "0.00");
    assert_eq!(arg(&summary, "total"), "320.00");
}

#[tokio::test]
async fn test_invalid_phone_reprompts_in_place() {
    let machine = in_zone_machine();
    let mut session = CheckoutSession::idle(7);
    let mut cart = cart_with_subtotal(250);

    machine
        .handle(&mut session, &mut cart, CheckoutEvent::Begin)
        .await
        .unwrap();
    let r = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::Text("12345"))
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "phone-invalid");
    assert_eq!(session.state, CheckoutState::AwaitingPhone);
    assert_eq!(cart.phone, None);
}

#[tokio::test]
async fn test_saved_phone_is_offered_for_reuse() {
    let machine = in_zone_machine();
    let mut session = CheckoutSession::idle(7);
    let mut cart = cart_with_subtotal(250);
    cart.phone = Some("+380671234567".to_string());

    let r = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::Begin)
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-phone-confirm");
    assert_eq!(arg(&r, "phone"), "+380671234567");

    let r = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::PhoneConfirmed)
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-ask-delivery-type");
}

#[tokio::test]
async fn test_rejected_phone_can_be_replaced() {
    let machine = in_zone_machine();
    let mut session = CheckoutSession::idle(7);
    let mut cart = cart_with_subtotal(250);
    cart.phone = Some("+380671234567".to_string());

    machine
        .handle(&mut session, &mut cart, CheckoutEvent::Begin)
        .await
        .unwrap();
    let r = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::PhoneRejected)
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-ask-phone");

    let r = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::Text("0509876543"))
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-phone-confirm");
    assert_eq!(cart.phone.as_deref(), Some("+380509876543"));
}

#[tokio::test]
async fn test_short_address_and_out_of_zone_are_rejected() {
    let geo = GeoConfig::default();
    // ~20 km north of the restaurant
    let far = GeoPoint {
        lat: geo.restaurant_lat + 0.18,
        lon: geo.restaurant_lon,
    };
    let machine = machine_with(Some(far));
    let mut session = CheckoutSession::idle(7);
    let mut cart = cart_with_subtotal(250);

    advance_past_phone(&machine, &mut session, &mut cart).await;
    machine
        .handle(
            &mut session,
            &mut cart,
            CheckoutEvent::DeliveryType(DeliveryType::Delivery),
        )
        .await
        .unwrap();

    let r = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::Text("12"))
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "address-too-short");

    let r = reply(
        machine
            .handle(
                &mut session,
                &mut cart,
                CheckoutEvent::Text("вул. Шевченка 12, кв. 45"),
            )
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "address-out-of-zone");
    assert_eq!(session.state, CheckoutState::AwaitingAddress);
    assert_eq!(cart.address, None);
}

#[tokio::test]
async fn test_unknown_address_is_reported() {
    let machine = machine_with(None);
    let mut session = CheckoutSession::idle(7);
    let mut cart = cart_with_subtotal(250);

    advance_past_phone(&machine, &mut session, &mut cart).await;
    machine
        .handle(
            &mut session,
            &mut cart,
            CheckoutEvent::DeliveryType(DeliveryType::Delivery),
        )
        .await
        .unwrap();

    let r = reply(
        machine
            .handle(
                &mut session,
                &mut cart,
                CheckoutEvent::Text("вигадана вулиця 99"),
            )
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "address-not-found");
    assert_eq!(session.state, CheckoutState::AwaitingAddress);
}

#[tokio::test]
async fn test_cancel_keeps_cart_and_resets_session() {
    let machine = in_zone_machine();
    let mut session = CheckoutSession::idle(7);
    let mut cart = cart_with_subtotal(250);

    advance_past_phone(&machine, &mut session, &mut cart).await;

    let r = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::Cancel)
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-cancelled");
    assert_eq!(session.state, CheckoutState::Idle);
    assert_eq!(session.confirm_token, None);
    assert!(!cart.is_empty());
    assert_eq!(cart.phone.as_deref(), Some("+380671234567"));
}

#[tokio::test]
async fn test_stale_confirm_token_is_ignored() {
    let machine = in_zone_machine();
    let mut session = CheckoutSession::idle(7);
    let mut cart = cart_with_subtotal(250);

    advance_past_phone(&machine, &mut session, &mut cart).await;
    advance_to_pickup_summary(&machine, &mut session, &mut cart).await;

    let real_token = session.confirm_token.clone().unwrap();
    let r = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::Confirm("wrong-token"))
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-confirm-stale");
    assert_eq!(session.confirm_token.as_deref(), Some(real_token.as_str()));
    assert_eq!(session.state, CheckoutState::AwaitingConfirmation);
}

#[tokio::test]
async fn test_confirm_revalidates_order_minimum() {
    let machine = in_zone_machine();
    let mut session = CheckoutSession::idle(7);
    let mut cart = cart_with_subtotal(250);

    advance_past_phone(&machine, &mut session, &mut cart).await;
    advance_to_pickup_summary(&machine, &mut session, &mut cart).await;

    // The cart shrank below the floor between summary and confirm
    cart.remove("P1", 1);
    let config = CheckoutConfig::default();
    cart.add(&item("S1", 90, "R1"), 1, &config).unwrap();

    let token = session.confirm_token.clone().unwrap();
    let r = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::Confirm(&token))
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-min-order");
    assert_eq!(session.state, CheckoutState::Idle);
    assert_eq!(session.confirm_token, None);
}

#[tokio::test]
async fn test_unexpected_events_reprompt_for_current_state() {
    let machine = in_zone_machine();
    let mut session = CheckoutSession::idle(7);
    let mut cart = cart_with_subtotal(250);

    machine
        .handle(&mut session, &mut cart, CheckoutEvent::Begin)
        .await
        .unwrap();

    // A payment tap while the dialogue waits for a phone number
    let r = reply(
        machine
            .handle(
                &mut session,
                &mut cart,
                CheckoutEvent::Payment(PaymentMethod::Card),
            )
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-ask-phone");
    assert_eq!(session.state, CheckoutState::AwaitingPhone);
    assert_eq!(cart.payment_method, None);
}

#[tokio::test]
async fn test_invalid_delivery_time_is_rejected() {
    let machine = in_zone_machine();
    let mut session = CheckoutSession::idle(7);
    let mut cart = cart_with_subtotal(250);

    advance_past_phone(&machine, &mut session, &mut cart).await;
    machine
        .handle(
            &mut session,
            &mut cart,
            CheckoutEvent::DeliveryType(DeliveryType::Pickup),
        )
        .await
        .unwrap();
    machine
        .handle(
            &mut session,
            &mut cart,
            CheckoutEvent::Payment(PaymentMethod::Cash),
        )
        .await
        .unwrap();

    let r = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::Text("23:30"))
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "time-outside-hours");
    assert_eq!(session.state, CheckoutState::AwaitingDeliveryTime);

    let r = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::Text("18:30"))
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-summary");
    assert_eq!(cart.delivery_time.as_deref(), Some("18:30"));
}

#[tokio::test]
async fn test_edit_from_confirmation_preserves_collected_fields() {
    let machine = in_zone_machine();
    let mut session = CheckoutSession::idle(7);
    let mut cart = cart_with_subtotal(250);

    advance_past_phone(&machine, &mut session, &mut cart).await;
    machine
        .handle(
            &mut session,
            &mut cart,
            CheckoutEvent::DeliveryType(DeliveryType::Delivery),
        )
        .await
        .unwrap();
    machine
        .handle(
            &mut session,
            &mut cart,
            CheckoutEvent::Text("вул. Шевченка 12, кв. 45"),
        )
        .await
        .unwrap();
    machine
        .handle(
            &mut session,
            &mut cart,
            CheckoutEvent::Payment(PaymentMethod::Cash),
        )
        .await
        .unwrap();
    machine
        .handle(&mut session, &mut cart, CheckoutEvent::TimeSlot("Якнайшвидше"))
        .await
        .unwrap();

    let r = reply(
        machine
            .handle(&mut session, &mut cart, CheckoutEvent::EditAddress)
            .await
            .unwrap(),
    );
    assert_eq!(r.key, "checkout-ask-address");
    assert_eq!(session.state, CheckoutState::AwaitingAddress);
    assert_eq!(session.confirm_token, None);
    // Everything already collected stays on the cart
    assert_eq!(cart.phone.as_deref(), Some("+380671234567"));
    assert_eq!(cart.payment_method, Some(PaymentMethod::Cash));
    assert_eq!(cart.delivery_time.as_deref(), Some("Якнайшвидше"));
}
