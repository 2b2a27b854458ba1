use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

use crate::{
    clock::Clock,
    config::Config,
    error::{AppError, ErrorKind},
    models::{
        ApiTrack, ExclusionList, Filters, LastRecommendations, Movie, MovieId, ReRecommendRequest,
        RecommendRequest, SessionId, Track, TrackId, UserId, WatchTime,
    },
    services::backend::RecommendationApi,
    storage::{write_json, KeyValueStore, StorageKey},
};

const NOTIFICATION_CAPACITY: usize = 16;

/// Why the last batch recommendation failed, for inline error display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecommendationError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RecommendationError {
    fn from_app_error(error: &AppError) -> Self {
        let kind = error.kind();
        let message = match kind {
            ErrorKind::Network => "Could not reach the recommendation server. Check your connection.",
            ErrorKind::Other => "Something went wrong while fetching recommendations.",
        };
        Self {
            kind,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// The backend answered but had nothing suitable
    NoReplacement,
    /// The replacement request itself failed
    ReplacementFailed,
}

/// Transient, auto-dismissing message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub duration: Duration,
}

/// Result of a single-slot replacement
#[derive(Debug, Clone, PartialEq)]
pub enum ReplaceOutcome {
    /// No settled slot in that track held the movie
    NotFound,
    Replaced(Movie),
    RolledBack(NotificationKind),
    /// The slot disappeared while the request was in flight
    Stale,
}

/// Owned copy of the session state for presentation
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub user_id: Option<UserId>,
    pub filters: Filters,
    pub track_a: Track,
    pub track_b: Track,
    pub excluded_ids: Vec<MovieId>,
    pub session_id: Option<SessionId>,
    pub is_loading: bool,
    pub error: Option<RecommendationError>,
}

impl SessionView {
    pub fn track(&self, id: TrackId) -> &Track {
        match id {
            TrackId::A => &self.track_a,
            TrackId::B => &self.track_b,
        }
    }
}

struct SessionState {
    user_id: Option<UserId>,
    filters: Filters,
    track_a: Track,
    track_b: Track,
    exclusions: ExclusionList,
    session_id: Option<SessionId>,
    is_loading: bool,
    error: Option<RecommendationError>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            user_id: None,
            filters: Filters::default(),
            track_a: Track::empty(TrackId::A),
            track_b: Track::empty(TrackId::B),
            exclusions: ExclusionList::new(),
            session_id: None,
            is_loading: false,
            error: None,
        }
    }

    fn track_mut(&mut self, id: TrackId) -> &mut Track {
        match id {
            TrackId::A => &mut self.track_a,
            TrackId::B => &mut self.track_b,
        }
    }

    fn clear_tracks(&mut self) {
        self.track_a = Track::empty(TrackId::A);
        self.track_b = Track::empty(TrackId::B);
    }

    /// Snapshot for the signed-in user, withheld while a replacement is in
    /// flight so recap readers only ever see settled tracks
    fn settled_snapshot(
        &self,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<(UserId, LastRecommendations)> {
        let user_id = self.user_id?;
        if self.track_a.has_pending() || self.track_b.has_pending() {
            return None;
        }
        Some((user_id, self.snapshot(now)))
    }

    fn snapshot(&self, now: chrono::DateTime<chrono::Utc>) -> LastRecommendations {
        LastRecommendations {
            track_a: self.track_a.movies(),
            track_b: self.track_b.movies(),
            filters: self.filters.clone(),
            session_id: self.session_id,
            timestamp: now,
        }
    }
}

/// Recommendation-session state store
///
/// Sole owner of filters, both tracks, the exclusion list and the
/// loading/error state. Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<SessionState>>,
    api: Arc<dyn RecommendationApi>,
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    notifications: broadcast::Sender<Notification>,
    settle_delay: Duration,
    notification_duration: Duration,
}

impl SessionStore {
    pub fn new(
        api: Arc<dyn RecommendationApi>,
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionState::new())),
            api,
            storage,
            clock,
            notifications: broadcast::channel(NOTIFICATION_CAPACITY).0,
            settle_delay: config.settle_delay(),
            notification_duration: config.notification_duration(),
        }
    }

    pub async fn view(&self) -> SessionView {
        let state = self.inner.read().await;
        SessionView {
            user_id: state.user_id,
            filters: state.filters.clone(),
            track_a: state.track_a.clone(),
            track_b: state.track_b.clone(),
            excluded_ids: state.exclusions.as_slice().to_vec(),
            session_id: state.session_id,
            is_loading: state.is_loading,
            error: state.error.clone(),
        }
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub async fn set_user(&self, user_id: Option<UserId>) {
        self.inner.write().await.user_id = user_id;
    }

    pub async fn set_time(&self, time: WatchTime) {
        self.inner.write().await.filters.time = time;
    }

    pub async fn toggle_genre(&self, genre: &str) {
        self.inner.write().await.filters.toggle_genre(genre);
    }

    pub async fn toggle_exclude_adult(&self) {
        let mut state = self.inner.write().await;
        state.filters.exclude_adult = !state.filters.exclude_adult;
    }

    /// Requests a fresh batch for the current filters.
    ///
    /// On failure both tracks are emptied and the error descriptor is set;
    /// the same descriptor is returned.
    pub async fn load_recommendations(&self) -> Result<(), RecommendationError> {
        let request = {
            let mut state = self.inner.write().await;
            state.is_loading = true;
            state.error = None;
            RecommendRequest::from(&state.filters)
        };

        tracing::info!(
            runtime_limit = request.runtime_limit,
            genres = ?request.genres,
            exclude_adult = request.exclude_adult,
            "Requesting batch recommendation"
        );

        let response = match self.api.recommend(&request).await {
            Ok(response) => response,
            Err(e) => {
                let descriptor = RecommendationError::from_app_error(&e);
                tracing::error!(error = %e, kind = ?descriptor.kind, "Batch recommendation failed");

                let mut state = self.inner.write().await;
                state.clear_tracks();
                state.session_id = None;
                state.is_loading = false;
                state.error = Some(descriptor.clone());
                return Err(descriptor);
            }
        };

        let track_a = build_track(TrackId::A, response.track_a);
        let track_b = build_track(TrackId::B, response.track_b);
        let movie_ids: Vec<MovieId> = track_a.ids().into_iter().chain(track_b.ids()).collect();

        let (user_id, snapshot) = {
            let mut state = self.inner.write().await;
            state.track_a = track_a;
            state.track_b = track_b;
            state.exclusions.reseed(movie_ids.iter().copied());
            state.session_id = response.session_id.map(SessionId);
            state.is_loading = false;
            (state.user_id, state.snapshot(self.clock.now()))
        };

        tracing::info!(
            movies = movie_ids.len(),
            session_id = ?snapshot.session_id,
            "Batch recommendation settled"
        );

        if let Some(user_id) = user_id {
            // A new session opens a new feedback window
            if let Err(e) = self.storage.remove(&StorageKey::ClickLogs(user_id)).await {
                tracing::warn!(error = %e, user_id = %user_id, "Failed to clear click logs");
            }
            self.persist_snapshot(user_id, &snapshot).await;
        }

        self.spawn_prefetch(movie_ids);
        Ok(())
    }

    /// Replaces one movie of a track with a fresh suggestion.
    ///
    /// The slot turns pending and the old id is excluded before the request
    /// goes out; on any failure the slot is restored but the old id stays
    /// excluded.
    pub async fn replace_slot(&self, track: TrackId, movie_id: MovieId) -> ReplaceOutcome {
        let request = {
            let mut state = self.inner.write().await;
            let budget = i64::from(state.filters.time.minutes());
            let genres = state.filters.genres.clone();
            let exclude_adult = state.filters.exclude_adult;

            let slots = state.track_mut(track);
            let Some(index) = slots.position_settled(movie_id) else {
                tracing::debug!(track = %track, movie_id = %movie_id, "Replacement target not found");
                return ReplaceOutcome::NotFound;
            };
            let remaining = i64::from(slots.settled_runtime_excluding(index));
            if slots.begin_replacement(index).is_none() {
                return ReplaceOutcome::NotFound;
            }

            state.exclusions.insert(movie_id);

            ReRecommendRequest {
                target_runtime: budget - remaining,
                excluded_ids: state.exclusions.as_slice().to_vec(),
                track,
                genres,
                exclude_adult,
            }
        };

        tracing::info!(
            track = %track,
            movie_id = %movie_id,
            target_runtime = request.target_runtime,
            excluded = request.excluded_ids.len(),
            "Requesting slot replacement"
        );

        let kind = match self.api.recommend_single(&request).await {
            Ok(response) => match (response.success, response.movie) {
                (true, Some(movie)) => return self.settle(track, movie_id, movie.into()).await,
                _ => {
                    tracing::warn!(
                        track = %track,
                        movie_id = %movie_id,
                        message = ?response.message,
                        "No replacement available"
                    );
                    NotificationKind::NoReplacement
                }
            },
            Err(e) => {
                tracing::error!(error = %e, track = %track, movie_id = %movie_id, "Replacement request failed");
                NotificationKind::ReplacementFailed
            }
        };

        self.roll_back(track, movie_id, kind).await
    }

    async fn settle(&self, track: TrackId, previous_id: MovieId, movie: Movie) -> ReplaceOutcome {
        tokio::time::sleep(self.settle_delay).await;

        let snapshot = {
            let mut state = self.inner.write().await;
            if !state.track_mut(track).settle_replacement(previous_id, movie.clone()) {
                tracing::debug!(track = %track, movie_id = %previous_id, "Replacement arrived for a vanished slot");
                return ReplaceOutcome::Stale;
            }
            state.exclusions.insert(movie.id);
            state.settled_snapshot(self.clock.now())
        };

        tracing::info!(
            track = %track,
            replaced = %previous_id,
            movie_id = %movie.id,
            title = %movie.title,
            "Slot replaced"
        );

        if let Some((user_id, snapshot)) = snapshot {
            self.persist_snapshot(user_id, &snapshot).await;
        }
        self.spawn_prefetch(vec![movie.id]);

        ReplaceOutcome::Replaced(movie)
    }

    async fn roll_back(
        &self,
        track: TrackId,
        previous_id: MovieId,
        kind: NotificationKind,
    ) -> ReplaceOutcome {
        let snapshot = {
            let mut state = self.inner.write().await;
            if !state.track_mut(track).roll_back(previous_id) {
                return ReplaceOutcome::Stale;
            }
            state.settled_snapshot(self.clock.now())
        };
        // Another slot may have settled while this one was pending
        if let Some((user_id, snapshot)) = snapshot {
            self.persist_snapshot(user_id, &snapshot).await;
        }

        let message = match kind {
            NotificationKind::NoReplacement => "No other movie matches your filters.",
            NotificationKind::ReplacementFailed => {
                "Couldn't fetch a replacement. Please try again shortly."
            }
        };
        // Nobody listening is fine
        let _ = self.notifications.send(Notification {
            kind,
            message: message.to_string(),
            duration: self.notification_duration,
        });

        ReplaceOutcome::RolledBack(kind)
    }

    /// Default filters, empty tracks and exclusion list. Idempotent.
    pub async fn reset_filters(&self) {
        let mut state = self.inner.write().await;
        let user_id = state.user_id;
        *state = SessionState::new();
        state.user_id = user_id;
    }

    /// `reset_filters` plus forgetting the signed-in user
    pub async fn reset(&self) {
        *self.inner.write().await = SessionState::new();
    }

    /// Fetches details for each movie and applies the adult flag to every
    /// slot still holding it. Returns how many lookups succeeded.
    pub async fn prefetch_details(&self, movie_ids: Vec<MovieId>) -> usize {
        if movie_ids.is_empty() {
            return 0;
        }

        tracing::debug!(count = movie_ids.len(), "Prefetching movie details");

        let mut tasks = Vec::new();
        for movie_id in movie_ids {
            let api = self.api.clone();
            let task = tokio::spawn(async move { (movie_id, api.movie_detail(movie_id).await) });
            tasks.push(task);
        }

        let mut enriched = 0;
        let mut failed = 0;

        for task in tasks {
            match task.await {
                Ok((_, Ok(detail))) => {
                    let mut state = self.inner.write().await;
                    let in_a = state.track_a.set_adult(detail.id, detail.adult);
                    let in_b = state.track_b.set_adult(detail.id, detail.adult);
                    if !in_a && !in_b {
                        tracing::debug!(movie_id = %detail.id, "Details arrived for an evicted movie");
                    }
                    enriched += 1;
                }
                Ok((movie_id, Err(e))) => {
                    tracing::error!(error = %e, movie_id = %movie_id, "Detail prefetch failed");
                    failed += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Task join error");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            tracing::warn!(
                success_count = enriched,
                error_count = failed,
                "Partial detail prefetch failure"
            );
        }

        enriched
    }

    fn spawn_prefetch(&self, movie_ids: Vec<MovieId>) {
        let store = self.clone();
        tokio::spawn(async move {
            store.prefetch_details(movie_ids).await;
        });
    }

    async fn persist_snapshot(&self, user_id: UserId, snapshot: &LastRecommendations) {
        let key = StorageKey::LastRecommendations(user_id);
        if let Err(e) = write_json(self.storage.as_ref(), &key, snapshot).await {
            tracing::warn!(error = %e, user_id = %user_id, "Failed to persist recommendations snapshot");
        }
    }
}

fn build_track(id: TrackId, api_track: ApiTrack) -> Track {
    let label = if api_track.label.trim().is_empty() {
        id.default_label().to_string()
    } else {
        api_track.label
    };
    let reported = api_track.total_runtime;
    let track = Track::from_movies(api_track.movies.into_iter().map(Movie::from).collect(), label);

    if reported != track.total_runtime() {
        tracing::warn!(
            track = %id,
            reported,
            computed = track.total_runtime(),
            "Backend total runtime disagrees with its movies"
        );
    }

    track
}
