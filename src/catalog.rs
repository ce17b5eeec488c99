//! Catalog access: the Google Sheets menu and its in-memory cache
//!
//! The spreadsheet is the single source of truth for the menu. Rows arrive as
//! loosely-typed string cells with Ukrainian column headers; this module is
//! the translation boundary that turns them into typed [`MenuItem`] values so
//! nothing downstream ever touches a raw row.

use crate::config::CatalogConfig;
use crate::errors::{error_logging, AppError, AppResult};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// Sheet column headers, as the restaurant maintains them.
const COL_ID: &str = "ID";
const COL_NAME: &str = "Назва Страви";
const COL_CATEGORY: &str = "Категорія";
const COL_DESCRIPTION: &str = "Опис";
const COL_PRICE: &str = "Ціна";
const COL_RESTAURANT: &str = "Ресторан";
const COL_ACTIVE: &str = "Активний";
const COL_RATING: &str = "Рейтинг";
const COL_ALLERGENS: &str = "Алергени";
const COL_COOK_TIME: &str = "Час приготування";

/// One menu entry, read-only from the core's point of view
#[derive(Debug, Clone, PartialEq)]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub price: Decimal,
    pub restaurant_id: Option<String>,
    pub active: bool,
    pub rating: Option<f32>,
    pub allergens: Option<String>,
    pub cook_time: Option<String>,
}

/// Immutable snapshot of the active menu at one refresh point
#[derive(Debug, Clone, Default)]
pub struct MenuSnapshot {
    pub items: Vec<MenuItem>,
}

impl MenuSnapshot {
    /// Look up an item by id
    pub fn find(&self, item_id: &str) -> Option<&MenuItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Categories in display order
    pub fn categories(&self) -> Vec<String> {
        let mut seen: BTreeMap<String, ()> = BTreeMap::new();
        for item in &self.items {
            seen.entry(item.category.clone()).or_insert(());
        }
        seen.into_keys().collect()
    }

    /// Items belonging to one category
    pub fn by_category(&self, category: &str) -> Vec<&MenuItem> {
        self.items
            .iter()
            .filter(|item| item.category == category)
            .collect()
    }

    /// Case-insensitive substring search over name and description
    pub fn search(&self, query: &str) -> Vec<&MenuItem> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.items
            .iter()
            .filter(|item| {
                item.name.to_lowercase().contains(&needle)
                    || item.description.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Parse a sheet price cell; the restaurant sometimes uses a comma decimal
fn parse_price(raw: &str) -> Option<Decimal> {
    raw.trim().replace(',', ".").parse::<Decimal>().ok()
}

/// Translate raw sheet rows (header row first) into menu items.
///
/// Rows missing an id, a name, or a parseable price are skipped with a
/// warning instead of failing the whole snapshot; the sheet is hand-edited
/// and a single bad row must not take the menu down.
pub fn parse_menu_rows(rows: &[Vec<String>]) -> MenuSnapshot {
    let Some((header, data)) = rows.split_first() else {
        return MenuSnapshot::default();
    };

    let col = |name: &str| header.iter().position(|h| h.trim() == name);
    let id_col = col(COL_ID);
    let name_col = col(COL_NAME);
    let category_col = col(COL_CATEGORY);
    let description_col = col(COL_DESCRIPTION);
    let price_col = col(COL_PRICE);
    let restaurant_col = col(COL_RESTAURANT);
    let active_col = col(COL_ACTIVE);
    let rating_col = col(COL_RATING);
    let allergens_col = col(COL_ALLERGENS);
    let cook_time_col = col(COL_COOK_TIME);

    let cell = |row: &[String], idx: Option<usize>| -> String {
        idx.and_then(|i| row.get(i))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    let mut items = Vec::new();
    for (row_no, row) in data.iter().enumerate() {
        let id = cell(row, id_col);
        let name = cell(row, name_col);
        let price_raw = cell(row, price_col);

        if id.is_empty() || name.is_empty() {
            continue;
        }

        let Some(price) = parse_price(&price_raw) else {
            warn!(row = row_no + 2, item_id = %id, price = %price_raw, "Skipping menu row with unparseable price");
            continue;
        };

        let active_raw = cell(row, active_col);
        let active = active_raw.is_empty()
            || matches!(active_raw.to_lowercase().as_str(), "так" | "yes" | "true" | "1");

        let restaurant = cell(row, restaurant_col);
        let rating = cell(row, rating_col).parse::<f32>().ok();
        let allergens = cell(row, allergens_col);
        let cook_time = cell(row, cook_time_col);

        items.push(MenuItem {
            id,
            name,
            category: {
                let c = cell(row, category_col);
                if c.is_empty() { "Інше".to_string() } else { c }
            },
            description: cell(row, description_col),
            price,
            restaurant_id: (!restaurant.is_empty()).then_some(restaurant),
            active,
            rating,
            allergens: (!allergens.is_empty()).then_some(allergens),
            cook_time: (!cook_time.is_empty()).then_some(cook_time),
        });
    }

    // Inactive items never leave the boundary
    items.retain(|item| item.active);

    MenuSnapshot { items }
}

/// Thin client over the Sheets values endpoint
#[derive(Debug, Clone)]
pub struct SheetsClient {
    http: reqwest::Client,
    config: CatalogConfig,
}

impl SheetsClient {
    pub fn new(http: reqwest::Client, config: CatalogConfig) -> Self {
        Self { http, config }
    }

    /// Fetch and parse the current menu
    pub async fn fetch_menu(&self) -> AppResult<MenuSnapshot> {
        let url = format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}/values/{}",
            self.config.sheet_id, self.config.menu_range
        );

        let response = self
            .http
            .get(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                error_logging::log_catalog_error(&e, "fetch_menu", &self.config.sheet_id);
                AppError::CatalogUnavailable(e.to_string())
            })?;

        let response = response.error_for_status().map_err(|e| {
            error_logging::log_catalog_error(&e, "fetch_menu", &self.config.sheet_id);
            AppError::CatalogUnavailable(e.to_string())
        })?;

        let body: ValuesResponse = response.json().await.map_err(|e| {
            error_logging::log_catalog_error(&e, "fetch_menu_decode", &self.config.sheet_id);
            AppError::CatalogUnavailable(e.to_string())
        })?;

        let snapshot = parse_menu_rows(&body.values);
        info!(
            items = snapshot.items.len(),
            sheet_id = %self.config.sheet_id,
            "Menu snapshot refreshed"
        );
        Ok(snapshot)
    }
}

struct CachedSnapshot {
    snapshot: Arc<MenuSnapshot>,
    refreshed_at: Instant,
}

/// TTL'd in-memory menu cache with forced invalidation and stale fallback
pub struct MenuCache {
    client: SheetsClient,
    ttl: Duration,
    inner: RwLock<Option<CachedSnapshot>>,
}

impl MenuCache {
    pub fn new(client: SheetsClient, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            inner: RwLock::new(None),
        }
    }

    /// Current snapshot: fresh cache hit, refresh on expiry, stale fallback
    /// when the refresh fails and an older snapshot exists.
    pub async fn snapshot(&self) -> AppResult<Arc<MenuSnapshot>> {
        {
            let guard = self.inner.read().map_err(poisoned)?;
            if let Some(cached) = guard.as_ref() {
                if cached.refreshed_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&cached.snapshot));
                }
            }
        }

        match self.refresh().await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                let guard = self.inner.read().map_err(poisoned)?;
                if let Some(cached) = guard.as_ref() {
                    warn!(error = %e, "Menu refresh failed, serving stale snapshot");
                    Ok(Arc::clone(&cached.snapshot))
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Force a refresh regardless of TTL
    pub async fn refresh(&self) -> AppResult<Arc<MenuSnapshot>> {
        debug!("Refreshing menu cache");
        let snapshot = Arc::new(self.client.fetch_menu().await?);
        let mut guard = self.inner.write().map_err(poisoned)?;
        *guard = Some(CachedSnapshot {
            snapshot: Arc::clone(&snapshot),
            refreshed_at: Instant::now(),
        });
        Ok(snapshot)
    }

    /// Drop the cached snapshot so the next read refetches
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = None;
        }
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> AppError {
    AppError::Internal("menu cache lock poisoned".to_string())
}
