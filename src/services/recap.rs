use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;

use crate::{
    config::Config,
    models::{LastRecommendations, UserId},
    services::poller::IntervalHandle,
    storage::{read_json, KeyValueStore, StorageKey},
};

/// Reads the persisted last-recommendations snapshot.
///
/// Absent, malformed and empty snapshots all read as `None`.
pub async fn load_recap(store: &dyn KeyValueStore, user_id: UserId) -> Option<LastRecommendations> {
    read_json::<LastRecommendations>(store, &StorageKey::LastRecommendations(user_id))
        .await
        .filter(|snapshot| !snapshot.is_empty())
}

async fn refresh(
    store: &dyn KeyValueStore,
    user_id: UserId,
    tx: &watch::Sender<Option<LastRecommendations>>,
) {
    let recap = load_recap(store, user_id).await;
    let changed = tx.send_if_modified(|current| {
        if *current == recap {
            return false;
        }
        *current = recap;
        true
    });
    if changed {
        tracing::debug!(user_id = %user_id, "Recap updated");
    }
}

/// Live view of a user's last recommendations.
///
/// Follows storage change events for the snapshot key, with a periodic
/// re-read for writers that bypass this process.
pub struct RecapFeed {
    rx: watch::Receiver<Option<LastRecommendations>>,
    listener: Option<JoinHandle<()>>,
    refresher: Option<IntervalHandle>,
}

impl RecapFeed {
    /// Starts following `user_id`'s snapshot, re-reading every
    /// `config.recap_refresh()` as well as on change events
    pub async fn spawn(store: Arc<dyn KeyValueStore>, user_id: UserId, config: &Config) -> Self {
        // Subscribe before the first read so no write slips between them
        let mut events = store.subscribe();
        let (tx, rx) = watch::channel(load_recap(store.as_ref(), user_id).await);
        let tx = Arc::new(tx);

        let listener = {
            let store = store.clone();
            let tx = tx.clone();
            let key = StorageKey::LastRecommendations(user_id);
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) if event.key == key => refresh(store.as_ref(), user_id, &tx).await,
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Recap listener lagged behind storage events");
                            refresh(store.as_ref(), user_id, &tx).await;
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        };

        let refresher = IntervalHandle::spawn("recap_refresh", config.recap_refresh(), move || {
            let store = store.clone();
            let tx = tx.clone();
            async move { refresh(store.as_ref(), user_id, &tx).await }
        });

        Self {
            rx,
            listener: Some(listener),
            refresher: Some(refresher),
        }
    }

    pub fn current(&self) -> Option<LastRecommendations> {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<LastRecommendations>> {
        self.rx.clone()
    }

    pub async fn shutdown(mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        if let Some(refresher) = self.refresher.take() {
            refresher.shutdown().await;
        }
    }
}

impl Drop for RecapFeed {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}
