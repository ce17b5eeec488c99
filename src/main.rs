use anyhow::Result;
use hubsy::bot::{self, Deps};
use hubsy::cart::CartManager;
use hubsy::catalog::{MenuCache, SheetsClient};
use hubsy::checkout::CheckoutMachine;
use hubsy::config::AppConfig;
use hubsy::db;
use hubsy::geo::NominatimGeocoder;
use hubsy::order::OrderService;
use hubsy::recommend::GeminiClient;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load and validate configuration early; a bad value should stop the
    // process before anything connects.
    let config = AppConfig::from_env()?;
    config.validate()?;
    info!("{}", config.summary());

    info!(database_url = %config.database.url, "Initializing database connection");
    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect(&config.database.url)
        .await?;

    db::init_database_schema(&pool).await?;

    // One HTTP client per upstream so timeouts stay independent.
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.bot.http_timeout_secs))
        .build()
        .expect("Failed to create HTTP client");

    let sheets = SheetsClient::new(http.clone(), config.catalog.clone());
    let menu = Arc::new(MenuCache::new(
        sheets,
        Duration::from_secs(config.catalog.cache_ttl_secs),
    ));

    // Warm the cache so the first user does not wait on the Sheets API.
    if let Err(e) = menu.refresh().await {
        warn!(error = %e, "Initial menu fetch failed, will retry on demand");
    }

    // Periodic refresh keeps the menu close to the spreadsheet.
    let refresh_menu = Arc::clone(&menu);
    let refresh_interval = Duration::from_secs(config.catalog.cache_ttl_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(refresh_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = refresh_menu.refresh().await {
                warn!(error = %e, "Periodic menu refresh failed");
            }
        }
    });

    let geocoder = Arc::new(NominatimGeocoder::new(http.clone(), &config.geo));
    let machine = CheckoutMachine::new(config.checkout.clone(), config.geo.clone(), geocoder);
    let carts = CartManager::new(pool.clone(), config.checkout.clone());
    let orders = OrderService::new(pool.clone(), config.checkout.clone());
    let recommender = Arc::new(GeminiClient::new(http.clone(), config.recommender.clone()));

    let bot = Bot::with_client(config.bot.token.clone(), http);

    let deps = Arc::new(Deps {
        config,
        pool,
        menu,
        carts,
        machine,
        orders,
        recommender,
    });

    info!("Bot initialized, starting dispatcher");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint({
            let deps = Arc::clone(&deps);
            move |bot: Bot, msg: Message| {
                let deps = Arc::clone(&deps);
                async move { bot::message_handler(bot, msg, deps).await }
            }
        }))
        .branch(Update::filter_callback_query().endpoint({
            let deps = Arc::clone(&deps);
            move |bot: Bot, q: CallbackQuery| {
                let deps = Arc::clone(&deps);
                async move { bot::callback_handler(bot, q, deps).await }
            }
        }));

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
