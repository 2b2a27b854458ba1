//! Satisfaction-prompt targeting.
//!
//! There is no push channel telling the client that a user finished a movie.
//! Instead every playback click is logged with the moment the user is assumed
//! to be done watching, and this module periodically scans those logs for one
//! movie worth asking about.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::{
    clock::Clock,
    config::Config,
    models::{
        ClickLog, FeedbackCandidate, FeedbackResponse, Movie, MovieId, SatisfactionRequest,
        SessionId, UserId, WatchTime,
    },
    services::{backend::RecommendationApi, poller::IntervalHandle},
    storage::{read_json, write_json, KeyValueStore, StorageKey},
};

/// Most recent completed movie ids kept
pub const COMPLETED_CAP: usize = 100;

/// Most recent click logs kept
pub const CLICK_LOG_CAP: usize = 20;

/// Every log that may currently be prompted for, in log order
pub fn eligible_candidates(
    logs: &[ClickLog],
    completed: &[MovieId],
    last_skipped: Option<SessionId>,
    now: DateTime<Utc>,
) -> Vec<FeedbackCandidate> {
    logs.iter()
        .filter(|log| !completed.contains(&log.movie_id))
        .filter_map(|log| {
            let session_id = log.session_id?;
            if last_skipped.is_some_and(|skipped| session_id <= skipped) {
                return None;
            }
            let due = log.target_show_time?;
            if due > now {
                return None;
            }
            Some(FeedbackCandidate {
                movie_id: log.movie_id,
                title: log.title.clone(),
                poster_url: log.poster_url.clone(),
                session_id,
            })
        })
        .collect()
}

/// The single candidate to prompt for, if any
pub fn select_candidate(
    logs: &[ClickLog],
    completed: &[MovieId],
    last_skipped: Option<SessionId>,
    now: DateTime<Utc>,
) -> Option<FeedbackCandidate> {
    eligible_candidates(logs, completed, last_skipped, now)
        .into_iter()
        .next()
}

#[derive(Debug, Clone)]
struct ScheduledPrompt {
    candidate: FeedbackCandidate,
    visible_at: DateTime<Utc>,
}

/// Decides, per user, when to show a satisfaction prompt and records answers
pub struct FeedbackTargeter {
    user_id: UserId,
    storage: Arc<dyn KeyValueStore>,
    api: Arc<dyn RecommendationApi>,
    clock: Arc<dyn Clock>,
    initial_delay: Duration,
    followup_delay: Duration,
    poll_interval: Duration,
    target: RwLock<Option<ScheduledPrompt>>,
}

impl FeedbackTargeter {
    pub fn new(
        user_id: UserId,
        storage: Arc<dyn KeyValueStore>,
        api: Arc<dyn RecommendationApi>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self {
            user_id,
            storage,
            api,
            clock,
            initial_delay: config.feedback_initial_delay(),
            followup_delay: config.feedback_followup_delay(),
            poll_interval: config.feedback_poll_interval(),
            target: RwLock::new(None),
        }
    }

    /// Re-runs eligibility against persisted state.
    ///
    /// A target that is still eligible is kept with its original schedule;
    /// otherwise the first eligible log is scheduled to appear after `delay`.
    pub async fn check(&self, delay: Duration) -> Option<FeedbackCandidate> {
        let logs: Vec<ClickLog> = self.read(StorageKey::ClickLogs(self.user_id)).await;
        let completed: Vec<MovieId> = self.read(StorageKey::FeedbackDone(self.user_id)).await;
        let last_skipped: Option<SessionId> =
            read_json(self.storage.as_ref(), &StorageKey::SkippedSession(self.user_id)).await;

        let now = self.clock.now();
        let eligible = eligible_candidates(&logs, &completed, last_skipped, now);

        let mut target = self.target.write().await;
        if let Some(current) = target.as_ref() {
            if eligible.contains(&current.candidate) {
                return Some(current.candidate.clone());
            }
        }

        let Some(candidate) = eligible.into_iter().next() else {
            if target.take().is_some() {
                tracing::debug!(user_id = %self.user_id, "Feedback target cleared");
            }
            return None;
        };

        tracing::info!(
            user_id = %self.user_id,
            movie_id = %candidate.movie_id,
            session_id = %candidate.session_id,
            delay_ms = delay.as_millis() as u64,
            "Feedback prompt scheduled"
        );

        let visible_at = now
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        *target = Some(ScheduledPrompt {
            candidate: candidate.clone(),
            visible_at,
        });
        Some(candidate)
    }

    /// The prompt to display right now, once its delay has elapsed
    pub async fn prompt(&self) -> Option<FeedbackCandidate> {
        let now = self.clock.now();
        self.target
            .read()
            .await
            .as_ref()
            .filter(|scheduled| scheduled.visible_at <= now)
            .map(|scheduled| scheduled.candidate.clone())
    }

    /// Records the answer to the current target and returns the next one.
    ///
    /// Submission to the backend is best-effort; local bookkeeping always
    /// happens.
    pub async fn respond(&self, response: FeedbackResponse) -> Option<FeedbackCandidate> {
        let Some(scheduled) = self.target.write().await.take() else {
            tracing::warn!(user_id = %self.user_id, "Feedback response without a target");
            return None;
        };
        let candidate = scheduled.candidate;

        match response.polarity() {
            Some(is_positive) => {
                let request = SatisfactionRequest::new(candidate.session_id, is_positive);
                if let Err(e) = self.api.submit_satisfaction(&request).await {
                    tracing::error!(
                        error = %e,
                        session_id = %candidate.session_id,
                        "Failed to submit satisfaction"
                    );
                }

                let mut completed: Vec<MovieId> =
                    self.read(StorageKey::FeedbackDone(self.user_id)).await;
                completed.retain(|id| *id != candidate.movie_id);
                completed.insert(0, candidate.movie_id);
                completed.truncate(COMPLETED_CAP);
                self.write(StorageKey::FeedbackDone(self.user_id), &completed)
                    .await;
                self.write(
                    StorageKey::RespondedSession(self.user_id),
                    &candidate.session_id,
                )
                .await;
            }
            None => {
                self.write(
                    StorageKey::SkippedSession(self.user_id),
                    &candidate.session_id,
                )
                .await;
            }
        }

        tracing::info!(
            user_id = %self.user_id,
            movie_id = %candidate.movie_id,
            session_id = %candidate.session_id,
            response = ?response,
            "Feedback recorded"
        );

        self.check(self.followup_delay).await
    }

    /// Logs that the user left for external playback of `movie`.
    ///
    /// The prompt for it becomes due once the selected watch time has passed,
    /// or after a minute when no time was selected.
    pub async fn record_click(
        &self,
        movie: &Movie,
        session_id: Option<SessionId>,
        watch_time: WatchTime,
        provider_id: Option<i64>,
    ) {
        let now = self.clock.now();
        let wait = i64::from(watch_time.minutes().max(1));
        let log = ClickLog {
            movie_id: movie.id,
            title: movie.title.clone(),
            poster_url: movie.poster_url.clone(),
            session_id,
            clicked_at: Some(now),
            target_show_time: Some(now + chrono::Duration::minutes(wait)),
        };

        let mut logs: Vec<ClickLog> = self.read(StorageKey::ClickLogs(self.user_id)).await;
        logs.retain(|existing| existing.movie_id != movie.id);
        logs.insert(0, log);
        logs.truncate(CLICK_LOG_CAP);
        self.write(StorageKey::ClickLogs(self.user_id), &logs).await;

        tracing::info!(
            user_id = %self.user_id,
            movie_id = %movie.id,
            session_id = ?session_id,
            wait_minutes = wait,
            "Playback click recorded"
        );

        if let Some(provider_id) = provider_id {
            if let Err(e) = self.api.log_playback_click(movie.id, provider_id).await {
                tracing::error!(error = %e, movie_id = %movie.id, provider_id, "Failed to log playback click");
            }
        }
    }

    /// Runs `check(initial delay)` on the configured interval
    pub fn spawn_polling(self: &Arc<Self>) -> IntervalHandle {
        let targeter = Arc::clone(self);
        IntervalHandle::spawn("feedback_poll", self.poll_interval, move || {
            let targeter = targeter.clone();
            async move {
                targeter.check(targeter.initial_delay).await;
            }
        })
    }

    async fn read<T: serde::de::DeserializeOwned + Default>(&self, key: StorageKey) -> T {
        read_json(self.storage.as_ref(), &key)
            .await
            .unwrap_or_default()
    }

    async fn write<T: serde::Serialize + Sync>(&self, key: StorageKey, value: &T) {
        if let Err(e) = write_json(self.storage.as_ref(), &key, value).await {
            tracing::warn!(error = %e, key = %key, "Failed to persist feedback state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::AppError;
    use crate::services::backend::MockRecommendationApi;
    use crate::storage::MemoryStore;

    const USER: UserId = UserId(7);

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    fn log(movie_id: i64, session_id: Option<i64>, due: Option<DateTime<Utc>>) -> ClickLog {
        ClickLog {
            movie_id: MovieId(movie_id),
            title: format!("Movie {}", movie_id),
            poster_url: String::new(),
            session_id: session_id.map(SessionId),
            clicked_at: None,
            target_show_time: due,
        }
    }

    struct Fixture {
        targeter: Arc<FeedbackTargeter>,
        storage: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture(api: MockRecommendationApi) -> Fixture {
        let storage = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let targeter = Arc::new(FeedbackTargeter::new(
            USER,
            storage.clone(),
            Arc::new(api),
            clock.clone(),
            &Config::default(),
        ));
        Fixture {
            targeter,
            storage,
            clock,
        }
    }

    async fn seed_logs(storage: &MemoryStore, logs: &[ClickLog]) {
        write_json(storage, &StorageKey::ClickLogs(USER), &logs.to_vec())
            .await
            .unwrap();
    }

    #[test]
    fn test_future_target_show_time_not_eligible() {
        let logs = vec![log(1, Some(10), Some(start() + chrono::Duration::minutes(90)))];
        assert_eq!(select_candidate(&logs, &[], None, start()), None);

        let later = start() + chrono::Duration::minutes(90);
        let candidate = select_candidate(&logs, &[], None, later).unwrap();
        assert_eq!(candidate.movie_id, MovieId(1));
        assert_eq!(candidate.session_id, SessionId(10));
    }

    #[test]
    fn test_skipped_session_suppresses_older_sessions() {
        let due = Some(start());
        let logs = vec![
            log(1, Some(41), due),
            log(2, Some(42), due),
            log(3, Some(43), due),
        ];
        let eligible = eligible_candidates(&logs, &[], Some(SessionId(42)), start());
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].session_id, SessionId(43));
    }

    #[test]
    fn test_completed_and_legacy_logs_excluded() {
        let due = Some(start());
        let logs = vec![log(1, Some(5), due), log(2, None, due), log(3, Some(5), None)];
        assert_eq!(select_candidate(&logs, &[MovieId(1)], None, start()), None);
    }

    #[tokio::test]
    async fn test_prompt_visible_after_delay() {
        let f = fixture(MockRecommendationApi::new());
        seed_logs(&f.storage, &[log(1, Some(10), Some(start()))]).await;

        let scheduled = f.targeter.check(Duration::from_secs(3)).await.unwrap();
        assert_eq!(scheduled.movie_id, MovieId(1));
        assert_eq!(f.targeter.prompt().await, None);

        f.clock.advance(chrono::Duration::seconds(3));
        assert_eq!(f.targeter.prompt().await, Some(scheduled));
    }

    #[tokio::test]
    async fn test_current_target_kept_while_eligible() {
        let f = fixture(MockRecommendationApi::new());
        seed_logs(&f.storage, &[log(2, Some(10), Some(start()))]).await;
        f.targeter.check(Duration::ZERO).await;

        // A newer log lands in front; the shown prompt must not switch
        seed_logs(
            &f.storage,
            &[log(3, Some(11), Some(start())), log(2, Some(10), Some(start()))],
        )
        .await;
        let kept = f.targeter.check(Duration::from_secs(3)).await.unwrap();
        assert_eq!(kept.movie_id, MovieId(2));
        assert_eq!(f.targeter.prompt().await.unwrap().movie_id, MovieId(2));
    }

    #[tokio::test]
    async fn test_target_cleared_when_nothing_qualifies() {
        let f = fixture(MockRecommendationApi::new());
        seed_logs(&f.storage, &[log(1, Some(10), Some(start()))]).await;
        f.targeter.check(Duration::ZERO).await;

        f.storage
            .remove(&StorageKey::ClickLogs(USER))
            .await
            .unwrap();
        assert_eq!(f.targeter.check(Duration::ZERO).await, None);
        assert_eq!(f.targeter.prompt().await, None);
    }

    #[tokio::test]
    async fn test_malformed_state_means_no_candidate() {
        let f = fixture(MockRecommendationApi::new());
        f.storage
            .set(&StorageKey::ClickLogs(USER), "{not json".to_string())
            .await
            .unwrap();
        assert_eq!(f.targeter.check(Duration::ZERO).await, None);
    }

    #[tokio::test]
    async fn test_good_response_submits_and_completes() {
        let mut api = MockRecommendationApi::new();
        api.expect_submit_satisfaction()
            .withf(|req| req.session_id == "10" && req.is_positive)
            .times(1)
            .returning(|_| Ok(()));

        let f = fixture(api);
        seed_logs(
            &f.storage,
            &[log(1, Some(10), Some(start())), log(2, Some(10), Some(start()))],
        )
        .await;
        f.targeter.check(Duration::ZERO).await;

        let next = f.targeter.respond(FeedbackResponse::Good).await.unwrap();
        assert_eq!(next.movie_id, MovieId(2));
        // Follow-up prompts use the shorter delay
        assert_eq!(f.targeter.prompt().await, None);
        f.clock.advance(chrono::Duration::seconds(1));
        assert_eq!(f.targeter.prompt().await, Some(next));

        let completed: Vec<MovieId> =
            read_json(f.storage.as_ref(), &StorageKey::FeedbackDone(USER))
                .await
                .unwrap();
        assert_eq!(completed, vec![MovieId(1)]);
        let responded: SessionId =
            read_json(f.storage.as_ref(), &StorageKey::RespondedSession(USER))
                .await
                .unwrap();
        assert_eq!(responded, SessionId(10));
    }

    #[tokio::test]
    async fn test_submission_failure_still_completes() {
        let mut api = MockRecommendationApi::new();
        api.expect_submit_satisfaction()
            .returning(|_| Err(AppError::ExternalApi("status 500".to_string())));

        let f = fixture(api);
        seed_logs(&f.storage, &[log(1, Some(10), Some(start()))]).await;
        f.targeter.check(Duration::ZERO).await;

        assert_eq!(f.targeter.respond(FeedbackResponse::Bad).await, None);
        let completed: Vec<MovieId> =
            read_json(f.storage.as_ref(), &StorageKey::FeedbackDone(USER))
                .await
                .unwrap();
        assert_eq!(completed, vec![MovieId(1)]);
    }

    #[tokio::test]
    async fn test_skip_suppresses_whole_session() {
        let mut api = MockRecommendationApi::new();
        api.expect_submit_satisfaction().never();

        let f = fixture(api);
        seed_logs(
            &f.storage,
            &[
                log(1, Some(42), Some(start())),
                log(2, Some(41), Some(start())),
                log(3, Some(42), Some(start())),
                log(4, Some(43), Some(start())),
            ],
        )
        .await;
        f.targeter.check(Duration::ZERO).await;

        let next = f.targeter.respond(FeedbackResponse::Skip).await.unwrap();
        assert_eq!(next.movie_id, MovieId(4));
        assert_eq!(next.session_id, SessionId(43));

        let skipped: SessionId =
            read_json(f.storage.as_ref(), &StorageKey::SkippedSession(USER))
                .await
                .unwrap();
        assert_eq!(skipped, SessionId(42));
    }

    #[tokio::test]
    async fn test_completed_list_capped() {
        let mut api = MockRecommendationApi::new();
        api.expect_submit_satisfaction().returning(|_| Ok(()));

        let f = fixture(api);
        let completed: Vec<MovieId> = (1..=COMPLETED_CAP as i64).map(MovieId).collect();
        write_json(f.storage.as_ref(), &StorageKey::FeedbackDone(USER), &completed)
            .await
            .unwrap();
        seed_logs(&f.storage, &[log(500, Some(1), Some(start()))]).await;
        f.targeter.check(Duration::ZERO).await;
        f.targeter.respond(FeedbackResponse::Good).await;

        let completed: Vec<MovieId> =
            read_json(f.storage.as_ref(), &StorageKey::FeedbackDone(USER))
                .await
                .unwrap();
        assert_eq!(completed.len(), COMPLETED_CAP);
        assert_eq!(completed[0], MovieId(500));
        assert_eq!(completed[1], MovieId(1));
        // Oldest entry falls off
        assert!(!completed.contains(&MovieId(COMPLETED_CAP as i64)));
    }

    #[tokio::test]
    async fn test_record_click_caps_and_deduplicates() {
        let mut api = MockRecommendationApi::new();
        api.expect_log_playback_click()
            .withf(|id, provider| *id == MovieId(10) && *provider == 8)
            .times(1)
            .returning(|_, _| Ok(()));

        let f = fixture(api);
        for id in 1..=CLICK_LOG_CAP as i64 + 5 {
            f.targeter
                .record_click(
                    &Movie::new(id, "Clicked", 100),
                    Some(SessionId(1)),
                    WatchTime::ZERO,
                    None,
                )
                .await;
        }
        f.targeter
            .record_click(
                &Movie::new(10, "Again", 100),
                Some(SessionId(2)),
                WatchTime::from_minutes(90),
                Some(8),
            )
            .await;

        let logs: Vec<ClickLog> = read_json(f.storage.as_ref(), &StorageKey::ClickLogs(USER))
            .await
            .unwrap();
        assert_eq!(logs.len(), CLICK_LOG_CAP);
        assert_eq!(logs[0].movie_id, MovieId(10));
        assert_eq!(logs[0].session_id, Some(SessionId(2)));
        assert_eq!(
            logs[0].target_show_time,
            Some(start() + chrono::Duration::minutes(90))
        );
        assert_eq!(logs.iter().filter(|l| l.movie_id == MovieId(10)).count(), 1);
        // No watch time selected: due a minute later
        assert_eq!(
            logs[1].target_show_time,
            Some(start() + chrono::Duration::minutes(1))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_schedules_prompt() {
        let f = fixture(MockRecommendationApi::new());
        seed_logs(&f.storage, &[log(1, Some(10), Some(start()))]).await;

        let handle = f.targeter.spawn_polling();
        tokio::time::sleep(Duration::from_millis(10)).await;

        f.clock.advance(chrono::Duration::seconds(3));
        assert_eq!(f.targeter.prompt().await.unwrap().movie_id, MovieId(1));
        handle.shutdown().await;
    }
}
