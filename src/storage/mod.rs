//! User-scoped persisted client state.
//!
//! The session store and the feedback heuristic never share memory; they only
//! meet here, through small JSON documents under per-user keys.

use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::{config::Config, error::AppResult, models::UserId};

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

/// Buffered change notifications per subscriber
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// Latest recommendation result, written by the session store
    LastRecommendations(UserId),
    /// Movie ids that already received a good/bad response
    FeedbackDone(UserId),
    /// Session id at or below which feedback candidates are suppressed
    SkippedSession(UserId),
    /// Session id of the most recent good/bad response
    RespondedSession(UserId),
    /// Playback click logs feeding the feedback heuristic
    ClickLogs(UserId),
}

impl Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageKey::LastRecommendations(user) => write!(f, "last_recommendations:{}", user),
            StorageKey::FeedbackDone(user) => write!(f, "feedback_done:{}", user),
            StorageKey::SkippedSession(user) => write!(f, "feedback_skipped_session:{}", user),
            StorageKey::RespondedSession(user) => {
                write!(f, "feedback_responded_session:{}", user)
            }
            StorageKey::ClickLogs(user) => write!(f, "click_logs:{}", user),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Set,
    Removed,
}

/// Emitted to subscribers after every write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: StorageKey,
    pub kind: ChangeKind,
}

/// Key-value store for persisted client state
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &StorageKey) -> AppResult<Option<String>>;

    async fn set(&self, key: &StorageKey, value: String) -> AppResult<()>;

    async fn remove(&self, key: &StorageKey) -> AppResult<()>;

    /// Receives an event for every subsequent write through this store
    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;

    /// Store name for logging
    fn name(&self) -> &'static str;
}

/// Reads and decodes a JSON document.
///
/// Backend failures and undecodable documents both read as absent: persisted
/// client state is advisory and must never take its reader down.
pub async fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &StorageKey,
) -> Option<T> {
    let raw = match store.get(key).await {
        Ok(raw) => raw?,
        Err(e) => {
            tracing::warn!(error = %e, key = %key, store = store.name(), "Failed to read persisted state");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, key = %key, "Ignoring malformed persisted state");
            None
        }
    }
}

/// Encodes and writes a JSON document
pub async fn write_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &StorageKey,
    value: &T,
) -> AppResult<()> {
    let json = serde_json::to_string(value)?;
    store.set(key, json).await
}

/// Redis when `redis_url` is configured, otherwise process-local memory
pub fn open_store(config: &Config) -> AppResult<Arc<dyn KeyValueStore>> {
    match &config.redis_url {
        Some(url) => {
            let store = RedisStore::connect(url)?;
            tracing::info!("Persisting client state in Redis");
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("No Redis URL configured, persisting client state in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn event_channel() -> broadcast::Sender<StorageEvent> {
    broadcast::channel(EVENT_CAPACITY).0
}
