use serde::{Deserialize, Serialize};

mod feedback;
mod filters;
mod movie;
mod track;

pub use feedback::{ClickLog, FeedbackCandidate, FeedbackResponse, LastRecommendations};
pub use filters::{Filters, WatchTime};
pub use movie::{Movie, MovieId, SessionId, UserId};
pub use track::{ExclusionList, Slot, Track, TrackId};

const POSTER_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";

// ============================================================================
// Recommendation Backend Types
// ============================================================================

/// Movie as returned by the recommendation endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiRecommendedMovie {
    pub movie_id: i64,
    #[serde(default)]
    pub tmdb_id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub adult: Option<bool>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub release_date: Option<String>,
}

impl From<ApiRecommendedMovie> for Movie {
    fn from(api: ApiRecommendedMovie) -> Self {
        let poster_url = api
            .poster_path
            .filter(|p| !p.is_empty())
            .map(|p| format!("{}{}", POSTER_BASE_URL, p))
            .unwrap_or_default();

        // Release dates arrive as "YYYY-MM-DD"
        let year = api
            .release_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse().ok());

        Movie {
            id: MovieId(api.movie_id),
            tmdb_id: api.tmdb_id,
            title: api.title,
            genres: api.genres,
            runtime: api.runtime.unwrap_or(0),
            poster_url,
            adult: api.adult.unwrap_or(false),
            year,
            rating: api.vote_average,
            overview: api.overview,
        }
    }
}

/// One track of a batch recommendation response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiTrack {
    #[serde(default)]
    pub movies: Vec<ApiRecommendedMovie>,
    #[serde(default)]
    pub total_runtime: u32,
    #[serde(default)]
    pub label: String,
}

/// Request body for a batch recommendation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendRequest {
    /// Viewing-time budget in minutes
    pub runtime_limit: u32,
    pub genres: Vec<String>,
    pub exclude_adult: bool,
}

impl From<&Filters> for RecommendRequest {
    fn from(filters: &Filters) -> Self {
        Self {
            runtime_limit: filters.time.minutes(),
            genres: filters.genres.clone(),
            exclude_adult: filters.exclude_adult,
        }
    }
}

/// Batch recommendation response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecommendResponse {
    pub track_a: ApiTrack,
    pub track_b: ApiTrack,
    #[serde(default)]
    pub session_id: Option<i64>,
}

/// Request body for a single-slot re-recommendation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReRecommendRequest {
    /// Runtime the replacement should roughly fill; may be zero or negative
    pub target_runtime: i64,
    pub excluded_ids: Vec<MovieId>,
    pub track: TrackId,
    pub genres: Vec<String>,
    pub exclude_adult: bool,
}

/// Single-slot re-recommendation response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReRecommendResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub movie: Option<ApiRecommendedMovie>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Movie details response from `GET /api/movies/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiMovieDetailEnvelope {
    pub info: ApiMovieDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiMovieDetail {
    pub movie_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub adult: Option<bool>,
    #[serde(default)]
    pub runtime: Option<u32>,
}

/// The subset of movie details the client keeps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieDetail {
    pub id: MovieId,
    pub adult: bool,
}

impl From<ApiMovieDetailEnvelope> for MovieDetail {
    fn from(envelope: ApiMovieDetailEnvelope) -> Self {
        MovieDetail {
            id: MovieId(envelope.info.movie_id),
            adult: envelope.info.adult.unwrap_or(false),
        }
    }
}

/// Satisfaction signal for one recommendation session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SatisfactionRequest {
    /// Sent as a string, which is what the backend schema expects
    pub session_id: String,
    pub is_positive: bool,
}

impl SatisfactionRequest {
    pub fn new(session_id: SessionId, is_positive: bool) -> Self {
        Self {
            session_id: session_id.to_string(),
            is_positive,
        }
    }
}

/// Body of `POST /api/movies/{id}/play`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaybackClickRequest {
    pub provider_id: i64,
}
