use redis::AsyncCommands;
use redis::Client;
use tokio::sync::broadcast;

use super::{event_channel, ChangeKind, KeyValueStore, StorageEvent, StorageKey};
use crate::error::AppResult;

const KEY_PREFIX: &str = "movigation";

/// Redis-backed store for persisted client state
///
/// Lets several client processes for the same user see one another's
/// snapshots. Change events only cover writes made through this instance.
#[derive(Clone)]
pub struct RedisStore {
    redis_client: Client,
    events: broadcast::Sender<StorageEvent>,
}

impl RedisStore {
    /// Opens a client for the given Redis URL.
    ///
    /// No connection is made until the first command.
    pub fn connect(redis_url: &str) -> AppResult<Self> {
        let redis_client = Client::open(redis_url)?;
        Ok(Self {
            redis_client,
            events: event_channel(),
        })
    }

    fn namespaced(key: &StorageKey) -> String {
        format!("{}:{}", KEY_PREFIX, key)
    }

    fn notify(&self, key: &StorageKey, kind: ChangeKind) {
        let _ = self.events.send(StorageEvent {
            key: key.clone(),
            kind,
        });
    }
}

#[async_trait::async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &StorageKey) -> AppResult<Option<String>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(Self::namespaced(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &StorageKey, value: String) -> AppResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.set(Self::namespaced(key), value).await?;
        tracing::debug!(key = %key, "Persisted client state");
        self.notify(key, ChangeKind::Set);
        Ok(())
    }

    async fn remove(&self, key: &StorageKey) -> AppResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(Self::namespaced(key)).await?;
        self.notify(key, ChangeKind::Removed);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
