//! crypto-pulse — Binary Entrypoint
//! Boots the collection and annotation loops plus the admin HTTP surface
//! (health, metrics, recent-summaries debug view).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crypto_pulse::analyze::ContentAnalyzer;
use crypto_pulse::collect::nitter::NitterRssSource;
use crypto_pulse::config::ai::AiConfig;
use crypto_pulse::config::AppConfig;
use crypto_pulse::history::History;
use crypto_pulse::keys::ApiKeyPool;
use crypto_pulse::metrics::Metrics;
use crypto_pulse::openrouter::{DynCompletionApi, OpenRouterApi};
use crypto_pulse::process::BatchProcessor;
use crypto_pulse::store::postgres::PgStore;
use crypto_pulse::store::{ContentStore, DynContentStore};
use crypto_pulse::{api, scheduler};

/// Accounts seeded on first boot; `accounts.active` in the database is the
/// source of truth afterwards.
const DEFAULT_ACCOUNTS: &[&str] = &[
    "coinbase",
    "binance",
    "cz_binance",
    "ethereum",
    "VitalikButerin",
    "CryptoHayes",
    "saylor",
    "BTCTN",
    "DocumentingBTC",
    "BitcoinMagazine",
    "APompliano",
    "gladstein",
    "DeFi_Dad",
    "hasufl",
    "ethereumJoseph",
    "TheCryptoLark",
    "CoinDesk",
    "Cointelegraph",
];

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let app_cfg = AppConfig::from_env()?;
    let ai_cfg = AiConfig::load_or_default("config/ai.json");
    info!(
        models = ai_cfg.models.len(),
        per_analysis = ai_cfg.per_analysis_count(),
        summary_model = %ai_cfg.summary_model,
        "AI config loaded"
    );

    // Without at least one key the pipeline cannot run at all.
    let keys = Arc::new(ApiKeyPool::from_env_with_cooldown(Duration::from_secs(
        ai_cfg.cooldown_secs,
    ))?);
    let completion_api: DynCompletionApi =
        Arc::new(OpenRouterApi::with_api_url(keys, &ai_cfg.api_url));

    let store = PgStore::connect(&app_cfg.database_url).await?;
    store.ensure_schema().await?;
    let added = store.seed_accounts(DEFAULT_ACCOUNTS).await?;
    if added > 0 {
        info!(added, "seeded default accounts");
    }
    let store: DynContentStore = Arc::new(store);

    let history = Arc::new(History::with_capacity(2000));
    let analyzer = ContentAnalyzer::new(completion_api, ai_cfg);
    let processor = Arc::new(BatchProcessor::new(
        Arc::clone(&store),
        analyzer,
        Arc::clone(&history),
    ));

    // Admin surface: /health, /debug/recent, /metrics
    let metrics = Metrics::init();
    let router = api::create_router(api::AppState {
        history: Arc::clone(&history),
    })
    .merge(metrics.router());
    let listener = tokio::net::TcpListener::bind(&app_cfg.admin_addr)
        .await
        .with_context(|| format!("binding admin server to {}", app_cfg.admin_addr))?;
    info!(addr = %app_cfg.admin_addr, "admin server listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = ?e, "admin server exited");
        }
    });

    // Background loops; first tick fires immediately.
    let source = Arc::new(NitterRssSource::new(&app_cfg.nitter_base_url));
    let _collect = scheduler::spawn_collect_loop(
        app_cfg.collect_interval_secs,
        source,
        Arc::clone(&store),
    );
    let _process = scheduler::spawn_process_loop(
        app_cfg.process_interval_secs,
        app_cfg.process_batch_limit,
        processor,
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, exiting");
    Ok(())
}
