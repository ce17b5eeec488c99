//! User input validation for the checkout dialogue
//!
//! Validators return a localization key on rejection so the dialogue layer
//! can answer in the user's language without this module knowing about
//! message catalogs.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Ukrainian mobile numbers, with or without the country prefix:
    // +380XXXXXXXXX, 380XXXXXXXXX, 80XXXXXXXXX, 0XXXXXXXXX.
    static ref PHONE_RE: Regex = Regex::new(r"^\+?3?8?0\d{9}$").expect("phone regex");
}

/// Strip formatting noise (spaces, dashes, parentheses) from a phone entry
pub fn normalize_phone(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

/// Validate a phone entry and canonicalize it to `+380XXXXXXXXX`.
///
/// Returns the localization key of the rejection message on failure.
pub fn validate_phone(raw: &str) -> Result<String, &'static str> {
    let normalized = normalize_phone(raw);
    if normalized.is_empty() {
        return Err("phone-empty");
    }
    if !PHONE_RE.is_match(&normalized) {
        return Err("phone-invalid");
    }

    // The last ten digits are always 0XXXXXXXXX; rebuild the full form.
    let digits: String = normalized.chars().filter(char::is_ascii_digit).collect();
    let local = &digits[digits.len() - 10..];
    Ok(format!("+38{}", local))
}

/// Validate a delivery address before geocoding.
///
/// Length and a house number are checked here; whether the address exists
/// and falls inside the delivery zone is the geocoder's question.
pub fn validate_address(raw: &str, min_length: usize) -> Result<String, &'static str> {
    let trimmed = raw.trim();
    if trimmed.chars().count() < min_length {
        return Err("address-too-short");
    }
    if !trimmed.chars().any(|c| c.is_ascii_digit()) {
        return Err("address-no-number");
    }
    Ok(trimmed.to_string())
}
