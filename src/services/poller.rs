use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to a task that runs on a fixed interval.
///
/// The task stops when `shutdown` is called or when the handle is dropped,
/// so a forgotten handle can never leave a timer running.
pub struct IntervalHandle {
    name: &'static str,
    shutdown_tx: mpsc::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl IntervalHandle {
    /// Spawns `tick` every `period`, the first run happening immediately
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            tracing::debug!(task = name, period_ms = period.as_millis() as u64, "Interval task started");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => tick().await,
                    _ = shutdown_rx.recv() => {
                        tracing::debug!(task = name, "Interval task stopped");
                        break;
                    }
                }
            }
        });

        Self {
            name,
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Stops the task and waits for an in-progress tick to finish
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!(task = self.name, "Interval task shutdown signal sent");

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for IntervalHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
