/// Recommendation backend abstraction
///
/// The session store and the feedback heuristic talk to the backend only
/// through this trait, so tests can swap in a mock and hosts can wrap the HTTP
/// client (caching, auth refresh) without touching either component.
use crate::{
    error::AppResult,
    models::{
        MovieDetail, MovieId, ReRecommendRequest, ReRecommendResponse, RecommendRequest,
        RecommendResponse, SatisfactionRequest,
    },
};

pub mod http;
pub mod request_id;

pub use http::HttpRecommendationApi;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationApi: Send + Sync {
    /// Batch recommendation: two tracks fitted to the time budget
    async fn recommend(&self, request: &RecommendRequest) -> AppResult<RecommendResponse>;

    /// Replacement for one slot of a track
    async fn recommend_single(
        &self,
        request: &ReRecommendRequest,
    ) -> AppResult<ReRecommendResponse>;

    /// Movie details, used to enrich tracks after the fact
    async fn movie_detail(&self, movie_id: MovieId) -> AppResult<MovieDetail>;

    /// Satisfaction signal for a recommendation session
    async fn submit_satisfaction(&self, request: &SatisfactionRequest) -> AppResult<()>;

    /// Records that the user left for external playback on a provider
    async fn log_playback_click(&self, movie_id: MovieId, provider_id: i64) -> AppResult<()>;

    /// Backend name for logging and debugging
    fn name(&self) -> &'static str;
}
