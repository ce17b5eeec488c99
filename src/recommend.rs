//! Free-text understanding via the Gemini API
//!
//! When a message matches no command and no dialogue state, the text is sent
//! to Gemini together with the current menu so the model can map it to a
//! concrete action ("хочу щось гостре" -> recommend these two items). The
//! model is strictly advisory: its output is parsed defensively and any
//! failure degrades to showing the menu.

use crate::cart::CartSummary;
use crate::catalog::MenuSnapshot;
use crate::config::RecommenderConfig;
use crate::errors::{error_logging, AppError, AppResult};
use serde::Deserialize;
use tracing::{debug, warn};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// What the model decided the user wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendAction {
    /// Suggest the named items
    Recommend,
    /// Put the named items in the cart
    AddToCart,
    /// Could not map the text; show the menu
    ShowMenu,
}

/// A parsed, trusted-shape interpretation of the model's answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub action: RecommendAction,
    /// Menu item ids, already limited to ids that exist in the snapshot
    pub items: Vec<String>,
    /// Short text to relay to the user, may be empty
    pub message: String,
}

impl Interpretation {
    pub fn show_menu() -> Self {
        Self {
            action: RecommendAction::ShowMenu,
            items: Vec::new(),
            message: String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawInterpretation {
    #[serde(default)]
    action: String,
    #[serde(default)]
    items: Vec<String>,
    #[serde(default)]
    message: String,
}

/// Parse the model's free-form answer into an [`Interpretation`].
///
/// The model is asked for JSON but sometimes wraps it in prose or code
/// fences; the first balanced-looking object is extracted. Unknown actions
/// and unknown item ids are dropped rather than propagated.
pub fn parse_interpretation(raw: &str, menu: &MenuSnapshot) -> Interpretation {
    let Some(start) = raw.find('{') else {
        return Interpretation::show_menu();
    };
    let Some(end) = raw.rfind('}') else {
        return Interpretation::show_menu();
    };
    if end < start {
        return Interpretation::show_menu();
    }

    let Ok(parsed) = serde_json::from_str::<RawInterpretation>(&raw[start..=end]) else {
        warn!("Recommendation answer was not parseable JSON");
        return Interpretation::show_menu();
    };

    let action = match parsed.action.as_str() {
        "recommend" => RecommendAction::Recommend,
        "add_to_cart" => RecommendAction::AddToCart,
        _ => return Interpretation::show_menu(),
    };

    let items: Vec<String> = parsed
        .items
        .into_iter()
        .filter(|id| menu.find(id).is_some())
        .collect();

    if items.is_empty() {
        return Interpretation::show_menu();
    }

    Interpretation {
        action,
        items,
        message: parsed.message,
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Thin client over the Gemini generateContent endpoint
pub struct GeminiClient {
    http: reqwest::Client,
    config: RecommenderConfig,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, config: RecommenderConfig) -> Self {
        Self { http, config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled()
    }

    /// Ask the model what the user wants from the current menu
    pub async fn interpret(
        &self,
        text: &str,
        menu: &MenuSnapshot,
        cart: &CartSummary,
    ) -> AppResult<Interpretation> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Ok(Interpretation::show_menu());
        };

        let prompt = build_prompt(text, menu, cart);
        let url = format!(
            "{}/{}:generateContent",
            GEMINI_BASE_URL, self.config.model
        );

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.2 }
        });

        let response: GenerateResponse = self
            .http
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                error_logging::log_network_error(&e, "gemini_generate", Some(GEMINI_BASE_URL));
                AppError::Internal(format!("recommendation request failed: {}", e))
            })?
            .json()
            .await
            .map_err(|e| {
                error_logging::log_network_error(&e, "gemini_decode", Some(GEMINI_BASE_URL));
                AppError::Internal(format!("recommendation response malformed: {}", e))
            })?;

        let answer = response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .unwrap_or_default();

        debug!(answer_len = answer.len(), "Recommendation answer received");
        Ok(parse_interpretation(answer, menu))
    }
}

fn build_prompt(text: &str, menu: &MenuSnapshot, cart: &CartSummary) -> String {
    let mut prompt = String::from(
        "Ти помічник ресторану. Користувач написав повідомлення; підбери страви з меню.\n\
         Відповідай ЛИШЕ JSON без пояснень у форматі:\n\
         {\"action\": \"recommend\" | \"add_to_cart\" | \"show_menu\", \"items\": [\"id\"], \"message\": \"коротка відповідь\"}\n\n\
         Меню:\n",
    );
    for item in &menu.items {
        prompt.push_str(&format!(
            "- id={} | {} | {} | {:.2} грн\n",
            item.id, item.name, item.category, item.price
        ));
    }
    if !cart.is_empty {
        prompt.push_str("\nУ кошику вже є:\n");
        for line in &cart.lines {
            prompt.push_str(&format!("- {} x{}\n", line.name, line.quantity));
        }
    }
    prompt.push_str(&format!("\nПовідомлення користувача: {}\n", text));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MenuItem;
    use rust_decimal::Decimal;

    fn menu() -> MenuSnapshot {
        MenuSnapshot {
            items: vec![MenuItem {
                id: "P1".to_string(),
                name: "Піца Дияболо".to_string(),
                category: "Піца".to_string(),
                description: "Гостра".to_string(),
                price: Decimal::new(210, 0),
                restaurant_id: Some("R1".to_string()),
                active: true,
                rating: None,
                allergens: None,
                cook_time: None,
            }],
        }
    }

    #[test]
    fn test_parse_plain_json() {
        let parsed = parse_interpretation(
            r#"{"action": "recommend", "items": ["P1"], "message": "Спробуйте Дияболо"}"#,
            &menu(),
        );
        assert_eq!(parsed.action, RecommendAction::Recommend);
        assert_eq!(parsed.items, vec!["P1"]);
    }

    #[test]
    fn test_parse_json_wrapped_in_prose_and_fences() {
        let raw = "Ось відповідь:\n```json\n{\"action\": \"add_to_cart\", \"items\": [\"P1\"], \"message\": \"\"}\n```";
        let parsed = parse_interpretation(raw, &menu());
        assert_eq!(parsed.action, RecommendAction::AddToCart);
    }

    #[test]
    fn test_unknown_items_and_actions_fall_back_to_menu() {
        let unknown_item =
            parse_interpretation(r#"{"action": "recommend", "items": ["X9"]}"#, &menu());
        assert_eq!(unknown_item.action, RecommendAction::ShowMenu);

        let unknown_action =
            parse_interpretation(r#"{"action": "dance", "items": ["P1"]}"#, &menu());
        assert_eq!(unknown_action.action, RecommendAction::ShowMenu);

        let garbage = parse_interpretation("вибачте, не можу", &menu());
        assert_eq!(garbage.action, RecommendAction::ShowMenu);
    }
}
