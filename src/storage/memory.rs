use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

use super::{event_channel, ChangeKind, KeyValueStore, StorageEvent, StorageKey};
use crate::error::AppResult;

/// Process-local store, used by tests and by hosts without Redis
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            events: event_channel(),
        }
    }

    fn notify(&self, key: &StorageKey, kind: ChangeKind) {
        // No subscribers is fine
        let _ = self.events.send(StorageEvent {
            key: key.clone(),
            kind,
        });
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &StorageKey) -> AppResult<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(&key.to_string()).cloned())
    }

    async fn set(&self, key: &StorageKey, value: String) -> AppResult<()> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
        self.notify(key, ChangeKind::Set);
        Ok(())
    }

    async fn remove(&self, key: &StorageKey) -> AppResult<()> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key.to_string());
        self.notify(key, ChangeKind::Removed);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
