use std::sync::Arc;

use log::error;
use teloxide::dispatching::repls::CommandReplExt;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;

use crate::error::{Error, Result};
use crate::models::NetworkStats;
use crate::services::analytics::AnalyticsService;
use crate::services::supply::{distribution, SupplyService};
use crate::state::SubscriptionStore;
use crate::utils::format;

pub mod notifier;

const DEFAULT_PRICE_SYMBOLS: &[&str] = &["WCO", "WAVE", "USDT", "USDC"];

const WELCOME: &str = "👋 Welcome to the W-Chain bot!\n\n\
    /price - token prices\n\
    /supply - WCO supply breakdown\n\
    /stats - network statistics\n\
    /burnwatch - toggle burn alerts for this chat\n\
    /help - all commands";

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Token prices, e.g. /price WCO WAVE")]
    Price(String),
    #[command(description = "WCO supply breakdown")]
    Supply,
    #[command(description = "Network statistics")]
    Stats,
    #[command(description = "Toggle burn alerts for this chat")]
    BurnWatch,
    #[command(description = "Display this help message")]
    Help,
}

/// Thin command layer: parses commands, calls the services, formats replies.
/// All state and concurrency live behind the services it calls.
pub struct TelegramBot {
    bot: Bot,
    analytics: Arc<AnalyticsService>,
    supply: Arc<SupplyService>,
    store: Arc<SubscriptionStore>,
}

impl TelegramBot {
    pub fn new(
        bot: Bot,
        analytics: Arc<AnalyticsService>,
        supply: Arc<SupplyService>,
        store: Arc<SubscriptionStore>,
    ) -> Self {
        Self { bot, analytics, supply, store }
    }

    pub async fn start(self: Arc<Self>) -> Result<()> {
        let bot = self.bot.clone();
        let handler_instance = self.clone();
        Command::repl(bot, move |_b: Bot, msg: Message, cmd: Command| {
            let handler_instance = handler_instance.clone();
            async move {
                if let Err(e) = handler_instance.handle_command(msg, cmd).await {
                    error!("Error handling command: {}", e);
                }
                Ok(())
            }
        })
        .await;
        Ok(())
    }

    async fn handle_command(&self, msg: Message, cmd: Command) -> Result<()> {
        let chat_id = msg.chat.id;
        let text = match cmd {
            Command::Start => WELCOME.to_string(),
            Command::Help => Command::descriptions().to_string(),
            Command::Price(args) => self.price_text(&args).await,
            Command::Supply => self.supply_text().await,
            Command::Stats => self.stats_text().await,
            Command::BurnWatch => self.burn_watch_text(chat_id.0).await?,
        };

        self.bot
            .send_message(chat_id, text)
            .parse_mode(ParseMode::Markdown)
            .await?;
        Ok(())
    }

    async fn price_text(&self, args: &str) -> String {
        let requested: Vec<String> = args
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_uppercase())
            .collect();
        let symbols: Vec<String> = if requested.is_empty() {
            DEFAULT_PRICE_SYMBOLS.iter().map(|s| s.to_string()).collect()
        } else {
            requested
        };

        let mut lines = vec!["💵 *Token Prices*".to_string(), String::new()];
        for symbol in symbols {
            match self.analytics.get_price(&symbol).await {
                Ok(quote) => {
                    lines.push(format!("• {}: {}", quote.symbol, format::usd(quote.price_usd)))
                }
                Err(Error::UpstreamUnavailable(_)) => {
                    lines.push(format!("• {}: unavailable, try again later", symbol))
                }
                Err(_) => lines.push(format!("• {}: unknown symbol", symbol)),
            }
        }
        lines.join("\n")
    }

    async fn supply_text(&self) -> String {
        let config = self.supply.config();
        let symbol = config.token_symbol.clone();
        let decimals = config.token_decimals;

        let snapshot = match self.supply.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(Error::DataIntegrity(_)) => {
                return "⚠️ Supply figures failed an integrity check and were not published."
                    .to_string()
            }
            Err(_) => return "Supply data is unavailable right now, try again later.".to_string(),
        };

        let dist = distribution(&snapshot);
        let amount = |base: u128| format::token_amount(format::to_display_units(base, decimals));
        format!(
            "📊 *{sym} Supply*\n\n\
             • Total: {} {sym}\n\
             • Circulating: {} {sym}\n\
             • Locked: {} {sym}\n\
             • Burned: {} {sym}\n\n\
             *Distribution*\n\
             • Circulating: {}\n\
             • Locked: {}\n\
             • Burned: {}",
            amount(snapshot.total),
            amount(snapshot.circulating),
            amount(snapshot.locked),
            amount(snapshot.burned),
            format::percent(dist.circulating_pct),
            format::percent(dist.locked_pct),
            format::percent(dist.burned_pct),
            sym = symbol,
        )
    }

    async fn stats_text(&self) -> String {
        let stats: NetworkStats = match self.analytics.get_stats().await {
            Ok(stats) => stats,
            Err(_) => return "Network stats are unavailable right now, try again later.".to_string(),
        };

        let mut lines = vec!["🌐 *W-Chain Network*".to_string(), String::new()];
        if let Some(blocks) = stats.total_blocks {
            lines.push(format!("• Blocks: {}", format::token_amount(blocks as f64)));
        }
        if let Some(txs) = stats.total_transactions {
            lines.push(format!("• Transactions: {}", format::token_amount(txs as f64)));
        }
        if let Some(addresses) = stats.total_addresses {
            lines.push(format!("• Addresses: {}", format::token_amount(addresses as f64)));
        }
        if let Some(block_time) = stats.average_block_time_ms {
            lines.push(format!("• Avg block time: {:.1}s", block_time / 1000.0));
        }
        if let Some(gas) = stats.gas_price_gwei {
            let level = |v: Option<f64>| {
                v.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "-".to_string())
            };
            lines.push(format!(
                "• Gas (gwei): slow {} / avg {} / fast {}",
                level(gas.slow),
                level(gas.average),
                level(gas.fast)
            ));
        }
        lines.join("\n")
    }

    async fn burn_watch_text(&self, chat_id: i64) -> Result<String> {
        if self.store.contains(chat_id).await {
            self.store.unsubscribe(chat_id).await?;
            Ok("🔕 Burn alerts disabled for this chat.".to_string())
        } else {
            self.store.subscribe(chat_id).await?;
            Ok("🔔 Burn alerts enabled for this chat.".to_string())
        }
    }
}
