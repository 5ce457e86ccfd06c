use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};

use crate::api::TransferSource;
use crate::config::BurnWatchConfig;
use crate::error::Result;
use crate::models::{EventPosition, TransferEvent};
use crate::services::analytics::PriceLookup;
use crate::state::CursorStore;
use crate::telegram::notifier::{AlertSink, Notifier};
use crate::utils::format;

const BACKOFF_BASE: Duration = Duration::from_secs(5);
const BACKOFF_CAP: Duration = Duration::from_secs(300);

/// Monitor loop states. `failures` counts consecutive failed cycles and is
/// carried through backoff so the delay keeps growing until a cycle
/// succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Polling { failures: u32 },
    Processing { failures: u32 },
    ErrorBackoff { failures: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    Tick,
    NewEvents(usize),
    Delivered,
    Failed,
    BackoffElapsed,
}

/// Pure transition function of the monitor state machine; the run loop owns
/// the effects (queries, broadcasts, sleeps).
pub fn transition(state: MonitorState, event: MonitorEvent) -> MonitorState {
    use MonitorEvent::*;
    use MonitorState::*;

    match (state, event) {
        (Idle, Tick) => Polling { failures: 0 },
        (Polling { .. }, NewEvents(0)) => Idle,
        (Polling { failures }, NewEvents(_)) => Processing { failures },
        (Processing { .. }, Delivered) => Idle,
        (Polling { failures }, Failed) | (Processing { failures }, Failed) => {
            ErrorBackoff { failures: failures + 1 }
        }
        (ErrorBackoff { failures }, BackoffElapsed) => Polling { failures },
        // A stray event does not move the machine.
        (state, _) => state,
    }
}

pub fn backoff_delay(failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(16);
    BACKOFF_BASE
        .saturating_mul(2u32.saturating_pow(exp))
        .min(BACKOFF_CAP)
}

fn min_amount_base(tokens: u64, decimals: u8) -> u128 {
    10u128
        .checked_pow(decimals as u32)
        .and_then(|unit| unit.checked_mul(tokens as u128))
        .unwrap_or(u128::MAX)
}

/// Watches the burn wallet for new token transfers and fans alerts out to
/// subscribers. The cursor advances only after the notifier has finished
/// with an event, so a crash redelivers at most the current batch and never
/// skips one.
pub struct BurnMonitor<C, S>
where
    C: TransferSource,
    S: AlertSink,
{
    source: Arc<C>,
    notifier: Arc<Notifier<S>>,
    prices: Arc<dyn PriceLookup>,
    cursor: Arc<CursorStore>,
    config: BurnWatchConfig,
    min_amount: u128,
}

impl<C, S> BurnMonitor<C, S>
where
    C: TransferSource,
    S: AlertSink,
{
    pub fn new(
        source: Arc<C>,
        notifier: Arc<Notifier<S>>,
        prices: Arc<dyn PriceLookup>,
        cursor: Arc<CursorStore>,
        config: BurnWatchConfig,
    ) -> Self {
        let min_amount = min_amount_base(config.min_amount_tokens, config.token_decimals);
        Self { source, notifier, prices, cursor, config, min_amount }
    }

    /// Runs until `shutdown` flips; the current cycle always finishes before
    /// the loop exits. No error escapes this loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_secs(self.config.poll_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut state = MonitorState::Idle;
        info!(
            "burn monitor: watching {} transfers into {} every {}s",
            self.config.token_symbol, self.config.burn_wallet, self.config.poll_secs
        );

        loop {
            state = match state {
                MonitorState::ErrorBackoff { failures } => {
                    let delay = backoff_delay(failures);
                    warn!(
                        "burn monitor: backing off {:?} after {} consecutive failure(s)",
                        delay, failures
                    );
                    tokio::select! {
                        _ = sleep(delay) => transition(state, MonitorEvent::BackoffElapsed),
                        _ = shutdown.changed() => break,
                    }
                }
                _ => tokio::select! {
                    _ = ticker.tick() => transition(state, MonitorEvent::Tick),
                    _ = shutdown.changed() => break,
                },
            };

            let events = match self.new_events().await {
                Ok(events) => {
                    state = transition(state, MonitorEvent::NewEvents(events.len()));
                    events
                }
                Err(e) => {
                    error!("burn monitor: poll failed: {}", e);
                    state = transition(state, MonitorEvent::Failed);
                    continue;
                }
            };
            if events.is_empty() {
                continue;
            }

            state = match self.process(events).await {
                Ok(delivered) => {
                    info!("burn monitor: cycle delivered {} alert(s)", delivered);
                    transition(state, MonitorEvent::Delivered)
                }
                Err(e) => {
                    error!("burn monitor: processing failed: {}", e);
                    transition(state, MonitorEvent::Failed)
                }
            };
        }
        info!("burn monitor: stopped");
    }

    /// Fetches transfers past the cursor in ascending `(block, log)` order.
    /// An unset cursor is seeded first and yields no events for this cycle.
    async fn new_events(&self) -> Result<Vec<TransferEvent>> {
        let cursor = match self.cursor.get().await {
            Some(cursor) => cursor,
            None => {
                self.seed_cursor().await?;
                return Ok(Vec::new());
            }
        };

        let mut events: Vec<TransferEvent> = self
            .source
            .transfers_to(
                &self.config.token_contract,
                &self.config.burn_wallet,
                Some(cursor.block_number),
            )
            .await?
            .into_iter()
            .filter(|event| event.position() > cursor)
            .collect();
        events.sort_by_key(|event| event.position());
        Ok(events)
    }

    async fn process(&self, events: Vec<TransferEvent>) -> Result<usize> {
        let mut delivered = 0;
        for event in events {
            if event.amount >= self.min_amount {
                let text = self.render_alert(&event).await;
                let report = self.notifier.broadcast(&text).await;
                info!(
                    "burn alert {}: {} delivered, {} blocked, {} dropped",
                    event.tx_hash, report.delivered, report.blocked, report.dropped
                );
                delivered += 1;
            }
            self.cursor.advance(event.position()).await?;
        }
        Ok(delivered)
    }

    /// Cold start: begin strictly after the configured block, or at the
    /// newest transfer seen on chain so history is not replayed.
    async fn seed_cursor(&self) -> Result<()> {
        let position = match self.config.start_block {
            Some(block) => EventPosition::end_of_block(block),
            None => self
                .source
                .transfers_to(&self.config.token_contract, &self.config.burn_wallet, None)
                .await?
                .iter()
                .map(|event| event.position())
                .max()
                .unwrap_or_default(),
        };
        self.cursor.advance(position).await?;
        info!("burn monitor: cursor seeded at {:?}", position);
        Ok(())
    }

    async fn render_alert(&self, event: &TransferEvent) -> String {
        let units = format::to_display_units(event.amount, self.config.token_decimals);
        let mut text = format!(
            "🔥 *{} Burn Alert*\n\n• Amount: {} {}\n",
            self.config.token_symbol,
            format::token_amount(units),
            self.config.token_symbol
        );
        if let Some(price) = self.prices.usd_price(&self.config.token_symbol).await {
            text.push_str(&format!("• USD Value: {}\n", format::usd(price * units)));
        }
        if !event.from.is_empty() {
            text.push_str(&format!("• From: `{}`\n", event.from));
        }
        text.push_str(&format!("• Tx: `{}`", event.tx_hash));
        text
    }
}
