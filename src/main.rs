use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;
use teloxide::Bot;
use tokio::sync::watch;

use wchain_bot::api::{self, ExplorerClient, OracleClient, ReferenceClient, RpcClient};
use wchain_bot::cli::Cli;
use wchain_bot::config::Config;
use wchain_bot::services::analytics::{AnalyticsService, PriceLookup};
use wchain_bot::services::burn_watch::BurnMonitor;
use wchain_bot::services::supply::SupplyService;
use wchain_bot::state::{CursorStore, SubscriptionStore};
use wchain_bot::telegram::notifier::{Notifier, TelegramSink};
use wchain_bot::telegram::TelegramBot;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let mut log_builder = env_logger::Builder::from_default_env();
    if cli.debug {
        log_builder.filter_level(log::LevelFilter::Debug);
    }
    log_builder.init();

    info!("Starting W-Chain bot...");

    // Load configuration
    let config_path = cli.config.unwrap_or_else(|| "config/config.toml".into());
    let config = match Config::load(&config_path) {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            eprintln!("Failed to load configuration from {:?}: {}", config_path, e);
            return Err(anyhow::anyhow!("Configuration loading failed: {}", e));
        }
    };
    info!("Configuration loaded successfully.");

    let bot_token = if config.telegram.bot_token.is_empty() {
        std::env::var("TELEGRAM_BOT_TOKEN").map_err(|_| {
            anyhow::anyhow!("TELEGRAM_BOT_TOKEN is not set and telegram.bot_token is empty")
        })?
    } else {
        config.telegram.bot_token.clone()
    };

    // Upstream clients share one timeout-bounded HTTP client.
    let http = api::http_client(config.http_timeout())?;
    let oracle = OracleClient::new(http.clone(), config.upstream.oracle_base.clone());
    let reference = ReferenceClient::new(
        http.clone(),
        config.upstream.reference_base.clone(),
        config.upstream.coingecko_ids.clone(),
    );
    let rpc = RpcClient::new(http.clone(), config.upstream.rpc_url.clone());
    let explorer = ExplorerClient::new(http, config.upstream.explorer_base.clone());

    // Durable state
    std::fs::create_dir_all(&config.state.dir)?;
    let store = Arc::new(SubscriptionStore::load(config.state.dir.join("subscribers.json"))?);
    let cursor = Arc::new(CursorStore::load(config.state.dir.join("burn_cursor.json"))?);

    let analytics = Arc::new(AnalyticsService::new(
        oracle,
        reference,
        explorer.clone(),
        config.price_ttl(),
        config.stats_ttl(),
    ));
    let supply = Arc::new(SupplyService::new(rpc, config.supply.clone(), config.supply_ttl()));
    info!("Services initialized.");

    let bot = Bot::new(bot_token);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if config.burn_watch.enabled {
        let sink = Arc::new(TelegramSink::new(bot.clone()));
        let notifier = Arc::new(Notifier::new(sink, Arc::clone(&store)));
        let monitor = Arc::new(BurnMonitor::new(
            Arc::new(explorer),
            notifier,
            Arc::clone(&analytics) as Arc<dyn PriceLookup>,
            Arc::clone(&cursor),
            config.burn_watch.clone(),
        ));
        tokio::spawn(async move {
            monitor.run(shutdown_rx).await;
        });
        info!("Burn monitor started.");
    }

    // Cooperative shutdown: the monitor finishes its current cycle first.
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received.");
        let _ = shutdown_tx.send(true);
    });

    let telegram_bot = Arc::new(TelegramBot::new(bot, analytics, supply, store));
    telegram_bot.start().await?;

    Ok(())
}
