use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, warn};
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::{ApiError, RequestError};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::sleep;

use crate::models::DeliveryReport;
use crate::state::SubscriptionStore;

const MAX_DELIVERY_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Per-chat delivery failure classes. `Blocked` is permanent and prunes the
/// subscription; `Transient` is retried a bounded number of times.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("chat rejected delivery permanently")]
    Blocked,
    #[error("transient delivery failure: {0}")]
    Transient(String),
}

#[async_trait]
pub trait AlertSink: Send + Sync + 'static {
    async fn deliver(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError>;
}

/// Telegram delivery backend for alerts.
pub struct TelegramSink {
    bot: Bot,
}

impl TelegramSink {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn is_permanent(err: &ApiError) -> bool {
    matches!(
        err,
        ApiError::BotBlocked
            | ApiError::ChatNotFound
            | ApiError::UserDeactivated
            | ApiError::BotKicked
            | ApiError::BotKickedFromSupergroup
            | ApiError::GroupDeactivated
    )
}

#[async_trait]
impl AlertSink for TelegramSink {
    async fn deliver(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        match self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Markdown)
            .await
        {
            Ok(_) => Ok(()),
            Err(RequestError::Api(api)) if is_permanent(&api) => Err(DeliveryError::Blocked),
            Err(e) => Err(DeliveryError::Transient(e.to_string())),
        }
    }
}

/// Fans one alert out to every subscribed chat, one task per chat so a slow
/// or failing chat never blocks the others. Permanently failed chats are
/// unsubscribed as a side effect.
pub struct Notifier<S: AlertSink> {
    sink: Arc<S>,
    store: Arc<SubscriptionStore>,
}

impl<S: AlertSink> Notifier<S> {
    pub fn new(sink: Arc<S>, store: Arc<SubscriptionStore>) -> Self {
        Self { sink, store }
    }

    pub async fn broadcast(&self, text: &str) -> DeliveryReport {
        let chats = self.store.snapshot().await;
        let mut tasks = JoinSet::new();
        for chat_id in chats {
            let sink = Arc::clone(&self.sink);
            let text = text.to_string();
            tasks.spawn(async move { (chat_id, deliver_with_retry(sink, chat_id, text).await) });
        }

        let mut report = DeliveryReport::default();
        while let Some(joined) = tasks.join_next().await {
            let Ok((chat_id, outcome)) = joined else {
                report.dropped += 1;
                continue;
            };
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::Blocked) => {
                    warn!("chat {} rejected delivery permanently, unsubscribing", chat_id);
                    if let Err(e) = self.store.unsubscribe(chat_id).await {
                        error!("failed to unsubscribe chat {}: {}", chat_id, e);
                    }
                    report.blocked += 1;
                }
                Err(DeliveryError::Transient(reason)) => {
                    warn!(
                        "dropping alert for chat {} after {} attempts: {}",
                        chat_id, MAX_DELIVERY_ATTEMPTS, reason
                    );
                    report.dropped += 1;
                }
            }
        }
        report
    }
}

async fn deliver_with_retry<S: AlertSink>(
    sink: Arc<S>,
    chat_id: i64,
    text: String,
) -> Result<(), DeliveryError> {
    let mut attempt = 1;
    loop {
        match sink.deliver(chat_id, &text).await {
            Ok(()) => return Ok(()),
            Err(DeliveryError::Blocked) => return Err(DeliveryError::Blocked),
            Err(err @ DeliveryError::Transient(_)) => {
                if attempt >= MAX_DELIVERY_ATTEMPTS {
                    return Err(err);
                }
                attempt += 1;
                sleep(RETRY_DELAY).await;
            }
        }
    }
}
