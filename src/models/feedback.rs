use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Filters, Movie, MovieId, SessionId};

/// Recorded when the user leaves for external playback of a movie
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClickLog {
    pub movie_id: MovieId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub poster_url: String,
    /// Absent on logs written before sessions were tracked
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub clicked_at: Option<DateTime<Utc>>,
    /// Earliest moment the user is assumed to have finished watching
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub target_show_time: Option<DateTime<Utc>>,
}

/// A previously recommended movie eligible for a satisfaction prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackCandidate {
    pub movie_id: MovieId,
    pub title: String,
    pub poster_url: String,
    pub session_id: SessionId,
}

/// The user's answer to a satisfaction prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackResponse {
    Good,
    Bad,
    /// Dismissed without an opinion
    Skip,
}

impl FeedbackResponse {
    /// Polarity sent to the backend; `None` for responses that are not sent
    pub fn polarity(&self) -> Option<bool> {
        match self {
            FeedbackResponse::Good => Some(true),
            FeedbackResponse::Bad => Some(false),
            FeedbackResponse::Skip => None,
        }
    }
}

/// Persisted copy of the latest recommendation result, read by recap surfaces
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LastRecommendations {
    #[serde(default)]
    pub track_a: Vec<Movie>,
    #[serde(default)]
    pub track_b: Vec<Movie>,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl LastRecommendations {
    pub fn is_empty(&self) -> bool {
        self.track_a.is_empty() && self.track_b.is_empty()
    }
}
