use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Backend identifier of a movie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovieId(pub i64);

impl Display for MovieId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend identifier of one batch recommendation event.
///
/// Later sessions compare greater than earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signed-in user whose persisted client state is being read or written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A movie as shown in a recommendation track
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    pub id: MovieId,
    #[serde(default)]
    pub tmdb_id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub genres: Vec<String>,
    /// Runtime in minutes
    #[serde(default)]
    pub runtime: u32,
    #[serde(default)]
    pub poster_url: String,
    /// Filled in later by detail enrichment when the batch payload lacks it
    #[serde(default)]
    pub adult: bool,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub overview: Option<String>,
}

impl Movie {
    /// Minimal record, mostly useful for building fixtures
    pub fn new(id: i64, title: impl Into<String>, runtime: u32) -> Self {
        Self {
            id: MovieId(id),
            tmdb_id: None,
            title: title.into(),
            genres: Vec::new(),
            runtime,
            poster_url: String::new(),
            adult: false,
            year: None,
            rating: None,
            overview: None,
        }
    }
}
