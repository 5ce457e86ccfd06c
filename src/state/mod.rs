use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::EventPosition;

// Writes go to a sibling temp file first so a crash mid-write can never
// leave a half-written document behind.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SubscriberFile {
    subscribers: Vec<i64>,
}

/// Durable set of chat ids subscribed to burn alerts. Mutations are
/// idempotent and safe to run concurrently with an in-progress broadcast;
/// readers iterate over a copied snapshot.
pub struct SubscriptionStore {
    path: PathBuf,
    inner: Mutex<HashSet<i64>>,
}

impl SubscriptionStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let set = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<SubscriberFile>(&raw) {
                Ok(file) => file.subscribers.into_iter().collect(),
                Err(e) => {
                    // Start empty rather than refuse to boot; subscribers can
                    // re-subscribe, alerts cannot be sent at all otherwise.
                    warn!("subscription state at {:?} is invalid ({}), starting empty", path, e);
                    HashSet::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(Error::State(format!("failed to read {:?}: {}", path, e))),
        };
        info!("subscription store: {} chat(s) loaded", set.len());
        Ok(Self { path, inner: Mutex::new(set) })
    }

    /// Idempotent; returns true if the chat was newly added.
    pub async fn subscribe(&self, chat_id: i64) -> Result<bool> {
        let mut set = self.inner.lock().await;
        if !set.insert(chat_id) {
            return Ok(false);
        }
        self.persist(&set)?;
        Ok(true)
    }

    /// Idempotent; returns true if the chat was present.
    pub async fn unsubscribe(&self, chat_id: i64) -> Result<bool> {
        let mut set = self.inner.lock().await;
        if !set.remove(&chat_id) {
            return Ok(false);
        }
        self.persist(&set)?;
        Ok(true)
    }

    pub async fn contains(&self, chat_id: i64) -> bool {
        self.inner.lock().await.contains(&chat_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Copy for iteration: subscribe/unsubscribe during a broadcast never
    /// skips or duplicates a chat mid-iteration.
    pub async fn snapshot(&self) -> Vec<i64> {
        let mut chats: Vec<i64> = self.inner.lock().await.iter().copied().collect();
        chats.sort_unstable();
        chats
    }

    fn persist(&self, set: &HashSet<i64>) -> Result<()> {
        let mut subscribers: Vec<i64> = set.iter().copied().collect();
        subscribers.sort_unstable();
        let bytes = serde_json::to_vec_pretty(&SubscriberFile { subscribers })?;
        write_atomic(&self.path, &bytes)
            .map_err(|e| Error::State(format!("failed to write {:?}: {}", self.path, e)))
    }
}

/// Durable high-water mark of processed burn events. Advances monotonically
/// and is persisted before `advance` returns, which bounds redelivery after
/// a crash to the last unconfirmed batch.
pub struct CursorStore {
    path: PathBuf,
    inner: Mutex<Option<EventPosition>>,
}

impl CursorStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let cursor = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<EventPosition>(&raw) {
                Ok(position) => Some(position),
                Err(e) => {
                    warn!("cursor state at {:?} is invalid ({}), starting unset", path, e);
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::State(format!("failed to read {:?}: {}", path, e))),
        };
        if let Some(position) = cursor {
            info!("burn cursor restored at {:?}", position);
        }
        Ok(Self { path, inner: Mutex::new(cursor) })
    }

    pub async fn get(&self) -> Option<EventPosition> {
        *self.inner.lock().await
    }

    /// Moves the cursor to `position` if that is an advance; a regression is
    /// ignored. Returns true when the cursor moved.
    pub async fn advance(&self, position: EventPosition) -> Result<bool> {
        let mut cursor = self.inner.lock().await;
        if cursor.map_or(false, |current| position <= current) {
            return Ok(false);
        }
        let bytes = serde_json::to_vec_pretty(&position)?;
        write_atomic(&self.path, &bytes)
            .map_err(|e| Error::State(format!("failed to write {:?}: {}", self.path, e)))?;
        *cursor = Some(position);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn subscriptions_are_idempotent_and_survive_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("subscribers.json");

        let store = SubscriptionStore::load(path.clone()).unwrap();
        assert!(store.subscribe(555).await.unwrap());
        assert!(!store.subscribe(555).await.unwrap());
        assert!(store.subscribe(999).await.unwrap());
        assert!(store.unsubscribe(999).await.unwrap());
        assert!(!store.unsubscribe(999).await.unwrap());

        let reloaded = SubscriptionStore::load(path).unwrap();
        assert_eq!(reloaded.snapshot().await, vec![555]);
        assert!(reloaded.contains(555).await);
        assert_eq!(reloaded.len().await, 1);
    }

    #[tokio::test]
    async fn corrupt_subscriber_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("subscribers.json");
        fs::write(&path, b"{ not json").unwrap();

        let store = SubscriptionStore::load(path).unwrap();
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn cursor_advances_monotonically_and_survives_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("burn_cursor.json");

        let store = CursorStore::load(path.clone()).unwrap();
        assert_eq!(store.get().await, None);

        assert!(store.advance(EventPosition::new(10, 2)).await.unwrap());
        // Regressions and repeats are ignored.
        assert!(!store.advance(EventPosition::new(10, 2)).await.unwrap());
        assert!(!store.advance(EventPosition::new(9, 9)).await.unwrap());
        assert!(store.advance(EventPosition::new(10, 3)).await.unwrap());

        let reloaded = CursorStore::load(path).unwrap();
        assert_eq!(reloaded.get().await, Some(EventPosition::new(10, 3)));
    }
}
