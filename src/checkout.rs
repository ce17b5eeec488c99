//! Checkout dialogue state machine
//!
//! The machine is deliberately free of Telegram and storage types: it takes
//! the current session and cart, an event, and answers with what to say next
//! (as a localization key plus arguments) or with a submission request. The
//! bot layer renders replies and persists the mutated session and cart; the
//! order module performs the actual submission.
//!
//! Confirmation is guarded by a one-shot token minted when the summary is
//! shown. The token travels through the confirm button's callback data and
//! is consumed transactionally at submission, so a double tap can never
//! produce two orders.

use crate::cart::{Cart, DeliveryType, PaymentMethod};
use crate::config::{CheckoutConfig, GeoConfig};
use crate::errors::AppResult;
use crate::geo::{within_delivery_zone, Geocoder};
use crate::validation::{validate_address, validate_phone};
use chrono::NaiveTime;
use rand::{distr::Alphanumeric, Rng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Where a user is in the checkout dialogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CheckoutState {
    #[default]
    Idle,
    AwaitingPhone,
    AwaitingPhoneConfirm,
    AwaitingDeliveryType,
    AwaitingAddress,
    AwaitingPaymentMethod,
    AwaitingDeliveryTime,
    AwaitingConfirmation,
}

/// One user's dialogue position plus the pending confirmation token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub user_id: i64,
    pub state: CheckoutState,
    pub confirm_token: Option<String>,
}

impl CheckoutSession {
    pub fn idle(user_id: i64) -> Self {
        Self {
            user_id,
            state: CheckoutState::Idle,
            confirm_token: None,
        }
    }
}

/// An input to the machine, already decoded from Telegram by the bot layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutEvent<'a> {
    /// /checkout command or the checkout button
    Begin,
    /// Free-form message text in the current state
    Text(&'a str),
    /// "Use the saved phone" button
    PhoneConfirmed,
    /// "Enter a different phone" button
    PhoneRejected,
    DeliveryType(DeliveryType),
    Payment(PaymentMethod),
    /// A predefined time slot button
    TimeSlot(&'a str),
    /// Confirm button; carries the token from the callback data
    Confirm(&'a str),
    EditPhone,
    EditAddress,
    Cancel,
}

/// A button the bot layer should render under the reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardOption {
    /// Localization key for the button label
    pub key: &'static str,
    /// Callback data the button carries
    pub callback: String,
}

impl KeyboardOption {
    fn new(key: &'static str, callback: impl Into<String>) -> Self {
        Self {
            key,
            callback: callback.into(),
        }
    }
}

/// What to send back to the user, presentation-neutral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub key: &'static str,
    pub args: Vec<(&'static str, String)>,
    pub options: Vec<KeyboardOption>,
}

impl Reply {
    fn plain(key: &'static str) -> Self {
        Self {
            key,
            args: Vec::new(),
            options: Vec::new(),
        }
    }

    fn with_args(key: &'static str, args: Vec<(&'static str, String)>) -> Self {
        Self {
            key,
            args,
            options: Vec::new(),
        }
    }

    fn options(mut self, options: Vec<KeyboardOption>) -> Self {
        self.options = options;
        self
    }
}

/// Result of one machine step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Say this, stay in the dialogue
    Reply(Reply),
    /// All fields collected and the token matched; submit the order
    Submit { token: String },
}

/// Delivery cost from the configured fee and free-delivery threshold
pub fn compute_delivery_cost(
    config: &CheckoutConfig,
    delivery_type: DeliveryType,
    subtotal: Decimal,
) -> Decimal {
    match delivery_type {
        DeliveryType::Pickup => Decimal::ZERO,
        DeliveryType::Delivery if subtotal >= config.free_delivery_threshold => Decimal::ZERO,
        DeliveryType::Delivery => config.delivery_fee,
    }
}

/// Render a money amount with two decimal places
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

const ASAP_SLOT: &str = "Якнайшвидше";

pub struct CheckoutMachine {
    checkout: CheckoutConfig,
    geo: GeoConfig,
    geocoder: Arc<dyn Geocoder>,
}

impl CheckoutMachine {
    pub fn new(checkout: CheckoutConfig, geo: GeoConfig, geocoder: Arc<dyn Geocoder>) -> Self {
        Self {
            checkout,
            geo,
            geocoder,
        }
    }

    /// Advance the dialogue by one event.
    ///
    /// Mutates `session` and `cart` in place; the caller persists both after
    /// a successful step. Inputs that make no sense in the current state
    /// re-prompt instead of erroring.
    pub async fn handle(
        &self,
        session: &mut CheckoutSession,
        cart: &mut Cart,
        event: CheckoutEvent<'_>,
    ) -> AppResult<StepOutcome> {
        // Cancel works from anywhere and keeps the cart lines.
        if event == CheckoutEvent::Cancel {
            session.state = CheckoutState::Idle;
            session.confirm_token = None;
            return Ok(StepOutcome::Reply(Reply::plain("checkout-cancelled")));
        }

        let reply = match (session.state, event) {
            (_, CheckoutEvent::Begin) => self.begin(session, cart),

            (CheckoutState::AwaitingPhone, CheckoutEvent::Text(text)) => {
                self.take_phone(session, cart, text)
            }

            (CheckoutState::AwaitingPhoneConfirm, CheckoutEvent::PhoneConfirmed) => {
                self.ask_delivery_type(session)
            }
            (CheckoutState::AwaitingPhoneConfirm, CheckoutEvent::PhoneRejected)
            | (CheckoutState::AwaitingPhoneConfirm, CheckoutEvent::EditPhone) => {
                session.state = CheckoutState::AwaitingPhone;
                Reply::plain("checkout-ask-phone")
            }
            (CheckoutState::AwaitingPhoneConfirm, CheckoutEvent::Text(text)) => {
                self.take_phone(session, cart, text)
            }

            (CheckoutState::AwaitingDeliveryType, CheckoutEvent::DeliveryType(kind)) => {
                cart.delivery_type = Some(kind);
                match kind {
                    DeliveryType::Pickup => self.ask_payment(session),
                    DeliveryType::Delivery => self.ask_address(session, cart),
                }
            }

            (CheckoutState::AwaitingAddress, CheckoutEvent::Text(text)) => {
                self.take_address(session, cart, text).await?
            }

            (CheckoutState::AwaitingPaymentMethod, CheckoutEvent::Payment(method)) => {
                cart.payment_method = Some(method);
                self.ask_time(session)
            }

            (CheckoutState::AwaitingDeliveryTime, CheckoutEvent::TimeSlot(slot)) => {
                cart.delivery_time = Some(slot.to_string());
                self.show_summary(session, cart)
            }
            (CheckoutState::AwaitingDeliveryTime, CheckoutEvent::Text(text)) => {
                match parse_delivery_time(text, self.checkout.open_hour, self.checkout.close_hour) {
                    Ok(time) => {
                        cart.delivery_time = Some(time);
                        self.show_summary(session, cart)
                    }
                    Err(key) => Reply::with_args(
                        key,
                        vec![("from", self.open_from()), ("until", self.open_until())],
                    ),
                }
            }

            (CheckoutState::AwaitingConfirmation, CheckoutEvent::Confirm(token)) => {
                return Ok(self.confirm(session, cart, token));
            }
            (CheckoutState::AwaitingConfirmation, CheckoutEvent::EditPhone) => {
                session.confirm_token = None;
                session.state = CheckoutState::AwaitingPhone;
                Reply::plain("checkout-ask-phone")
            }
            (CheckoutState::AwaitingConfirmation, CheckoutEvent::EditAddress) => {
                if cart.delivery_type == Some(DeliveryType::Delivery) {
                    session.confirm_token = None;
                    session.state = CheckoutState::AwaitingAddress;
                    Reply::plain("checkout-ask-address")
                } else {
                    self.reprompt(session, cart)
                }
            }

            // Everything else re-prompts for the current state.
            (_, other) => {
                debug!(user_id = %session.user_id, state = ?session.state, event = ?other, "Unexpected checkout event, re-prompting");
                self.reprompt(session, cart)
            }
        };

        Ok(StepOutcome::Reply(reply))
    }

    /// Entry gates: a checkout only starts from a viable cart
    fn begin(&self, session: &mut CheckoutSession, cart: &Cart) -> Reply {
        if cart.is_empty() {
            return Reply::plain("checkout-empty-cart");
        }

        let subtotal = cart.subtotal();
        if subtotal < self.checkout.min_order_amount {
            return Reply::with_args(
                "checkout-min-order",
                vec![
                    ("minimum", format_amount(self.checkout.min_order_amount)),
                    ("shortfall", format_amount(self.checkout.min_order_amount - subtotal)),
                ],
            );
        }

        if cart.distinct_restaurants().len() > 1 {
            return Reply::plain("checkout-multi-restaurant");
        }

        session.confirm_token = None;
        match &cart.phone {
            Some(phone) => {
                session.state = CheckoutState::AwaitingPhoneConfirm;
                Reply::with_args("checkout-phone-confirm", vec![("phone", phone.clone())])
                    .options(vec![
                        KeyboardOption::new("btn-phone-keep", "ck_phone_keep"),
                        KeyboardOption::new("btn-phone-change", "ck_phone_change"),
                    ])
            }
            None => {
                session.state = CheckoutState::AwaitingPhone;
                Reply::plain("checkout-ask-phone")
            }
        }
    }

    /// A parsed phone is shown back for a keep/change choice before it is
    /// locked in; typos in a phone number are expensive for the operator.
    fn take_phone(&self, session: &mut CheckoutSession, cart: &mut Cart, text: &str) -> Reply {
        match validate_phone(text) {
            Ok(phone) => {
                cart.phone = Some(phone.clone());
                session.state = CheckoutState::AwaitingPhoneConfirm;
                Reply::with_args("checkout-phone-confirm", vec![("phone", phone)]).options(vec![
                    KeyboardOption::new("btn-phone-keep", "ck_phone_keep"),
                    KeyboardOption::new("btn-phone-change", "ck_phone_change"),
                ])
            }
            Err(key) => Reply::plain(key),
        }
    }

    fn ask_delivery_type(&self, session: &mut CheckoutSession) -> Reply {
        session.state = CheckoutState::AwaitingDeliveryType;
        Reply::plain("checkout-ask-delivery-type").options(vec![
            KeyboardOption::new("btn-delivery", "ck_delivery"),
            KeyboardOption::new("btn-pickup", "ck_pickup"),
        ])
    }

    fn ask_address(&self, session: &mut CheckoutSession, cart: &Cart) -> Reply {
        session.state = CheckoutState::AwaitingAddress;
        match &cart.address {
            Some(address) => {
                Reply::with_args("checkout-address-saved", vec![("address", address.clone())])
                    .options(vec![KeyboardOption::new("btn-address-keep", "ck_addr_keep")])
            }
            None => Reply::plain("checkout-ask-address"),
        }
    }

    async fn take_address(
        &self,
        session: &mut CheckoutSession,
        cart: &mut Cart,
        text: &str,
    ) -> AppResult<Reply> {
        let address = match validate_address(text, self.checkout.min_address_length) {
            Ok(address) => address,
            Err(key) => return Ok(Reply::plain(key)),
        };

        let Some(point) = self.geocoder.locate(&address).await? else {
            return Ok(Reply::plain("address-not-found"));
        };

        if !within_delivery_zone(&self.geo, point) {
            return Ok(Reply::with_args(
                "address-out-of-zone",
                vec![("radius", format!("{}", self.geo.delivery_radius_km))],
            ));
        }

        cart.address = Some(address);
        Ok(self.ask_payment(session))
    }

    fn ask_payment(&self, session: &mut CheckoutSession) -> Reply {
        session.state = CheckoutState::AwaitingPaymentMethod;
        Reply::plain("checkout-ask-payment").options(vec![
            KeyboardOption::new("btn-pay-cash", "ck_pay_cash"),
            KeyboardOption::new("btn-pay-card", "ck_pay_card"),
        ])
    }

    fn ask_time(&self, session: &mut CheckoutSession) -> Reply {
        session.state = CheckoutState::AwaitingDeliveryTime;
        Reply::with_args(
            "checkout-ask-time",
            vec![("from", self.open_from()), ("until", self.open_until())],
        )
        .options(vec![KeyboardOption::new("btn-time-asap", "ck_time_asap")])
    }

    fn open_from(&self) -> String {
        format!("{:02}:00", self.checkout.open_hour)
    }

    fn open_until(&self) -> String {
        format!("{:02}:00", self.checkout.close_hour)
    }

    /// Mint the confirmation token and lay out the order summary
    fn show_summary(&self, session: &mut CheckoutSession, cart: &Cart) -> Reply {
        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        session.confirm_token = Some(token.clone());
        session.state = CheckoutState::AwaitingConfirmation;

        let delivery_type = cart.delivery_type.unwrap_or(DeliveryType::Delivery);
        let subtotal = cart.subtotal();
        let delivery_cost = compute_delivery_cost(&self.checkout, delivery_type, subtotal);
        let address = match delivery_type {
            DeliveryType::Pickup => self.checkout.pickup_address.clone(),
            DeliveryType::Delivery => cart.address.clone().unwrap_or_default(),
        };

        let mut options = vec![KeyboardOption::new(
            "btn-confirm",
            format!("ck_confirm:{}", token),
        )];
        options.push(KeyboardOption::new("btn-edit-phone", "ck_edit_phone"));
        if delivery_type == DeliveryType::Delivery {
            options.push(KeyboardOption::new("btn-edit-address", "ck_edit_address"));
        }
        options.push(KeyboardOption::new("btn-cancel", "ck_cancel"));

        Reply::with_args(
            "checkout-summary",
            vec![
                ("subtotal", format_amount(subtotal)),
                ("delivery_cost", format_amount(delivery_cost)),
                ("total", format_amount(subtotal + delivery_cost)),
                ("delivery_type", delivery_type.as_str().to_string()),
                ("address", address),
                ("phone", cart.phone.clone().unwrap_or_default()),
                (
                    "payment",
                    cart.payment_method
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default(),
                ),
                (
                    "time",
                    cart.delivery_time.clone().unwrap_or_else(|| ASAP_SLOT.to_string()),
                ),
            ],
        )
        .options(options)
    }

    /// Validate the token and the order floor one last time before handing
    /// off to submission. A stale token means the order already went through
    /// or the summary was superseded; nothing is submitted twice.
    fn confirm(&self, session: &mut CheckoutSession, cart: &Cart, token: &str) -> StepOutcome {
        if session.confirm_token.as_deref() != Some(token) {
            return StepOutcome::Reply(Reply::plain("checkout-confirm-stale"));
        }

        let subtotal = cart.subtotal();
        if subtotal < self.checkout.min_order_amount {
            session.state = CheckoutState::Idle;
            session.confirm_token = None;
            return StepOutcome::Reply(Reply::with_args(
                "checkout-min-order",
                vec![
                    ("minimum", format_amount(self.checkout.min_order_amount)),
                    ("shortfall", format_amount(self.checkout.min_order_amount - subtotal)),
                ],
            ));
        }

        StepOutcome::Submit {
            token: token.to_string(),
        }
    }

    /// Repeat the question for the current state
    fn reprompt(&self, session: &mut CheckoutSession, cart: &Cart) -> Reply {
        match session.state {
            CheckoutState::Idle => Reply::plain("checkout-not-started"),
            CheckoutState::AwaitingPhone => Reply::plain("checkout-ask-phone"),
            CheckoutState::AwaitingPhoneConfirm => {
                Reply::with_args(
                    "checkout-phone-confirm",
                    vec![("phone", cart.phone.clone().unwrap_or_default())],
                )
                .options(vec![
                    KeyboardOption::new("btn-phone-keep", "ck_phone_keep"),
                    KeyboardOption::new("btn-phone-change", "ck_phone_change"),
                ])
            }
            CheckoutState::AwaitingDeliveryType => {
                Reply::plain("checkout-ask-delivery-type").options(vec![
                    KeyboardOption::new("btn-delivery", "ck_delivery"),
                    KeyboardOption::new("btn-pickup", "ck_pickup"),
                ])
            }
            CheckoutState::AwaitingAddress => Reply::plain("checkout-ask-address"),
            CheckoutState::AwaitingPaymentMethod => {
                Reply::plain("checkout-ask-payment").options(vec![
                    KeyboardOption::new("btn-pay-cash", "ck_pay_cash"),
                    KeyboardOption::new("btn-pay-card", "ck_pay_card"),
                ])
            }
            CheckoutState::AwaitingDeliveryTime => Reply::with_args(
                "checkout-ask-time",
                vec![("from", self.open_from()), ("until", self.open_until())],
            )
            .options(vec![KeyboardOption::new("btn-time-asap", "ck_time_asap")]),
            CheckoutState::AwaitingConfirmation => Reply::plain("checkout-awaiting-confirmation"),
        }
    }
}

/// Parse a typed delivery time and keep it inside the configured hours
fn parse_delivery_time(text: &str, open_hour: u32, close_hour: u32) -> Result<String, &'static str> {
    let trimmed = text.trim();
    let Ok(time) = NaiveTime::parse_from_str(trimmed, "%H:%M") else {
        return Err("time-unparseable");
    };

    let (Some(open), Some(close)) = (
        NaiveTime::from_hms_opt(open_hour, 0, 0),
        NaiveTime::from_hms_opt(close_hour, 0, 0),
    ) else {
        return Err("time-outside-hours");
    };
    if time < open || time > close {
        return Err("time-outside-hours");
    }

    Ok(time.format("%H:%M").to_string())
}
