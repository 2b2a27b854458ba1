use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::{Movie, MovieId};

/// Which of the two parallel recommendation lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackId {
    /// Preference-weighted
    A,
    /// Diversity/popularity-weighted
    B,
}

impl TrackId {
    pub fn default_label(&self) -> &'static str {
        match self {
            TrackId::A => "Personalized picks",
            TrackId::B => "Something different",
        }
    }
}

impl Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackId::A => write!(f, "a"),
            TrackId::B => write!(f, "b"),
        }
    }
}

/// One position in a track
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Settled(Movie),
    /// A replacement is in flight; `previous` is restored if it fails
    Pending { previous: Movie },
}

impl Slot {
    /// The movie to render, or `None` while a replacement is in flight
    pub fn settled(&self) -> Option<&Movie> {
        match self {
            Slot::Settled(movie) => Some(movie),
            Slot::Pending { .. } => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Slot::Pending { .. })
    }

    // Settled movie, or the one a pending slot would roll back to
    fn held(&self) -> &Movie {
        match self {
            Slot::Settled(movie) => movie,
            Slot::Pending { previous } => previous,
        }
    }

    fn held_mut(&mut self) -> &mut Movie {
        match self {
            Slot::Settled(movie) => movie,
            Slot::Pending { previous } => previous,
        }
    }
}

/// A recommendation list with its runtime bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    slots: Vec<Slot>,
    total_runtime: u32,
    label: String,
}

impl Track {
    pub fn empty(id: TrackId) -> Self {
        Self {
            slots: Vec::new(),
            total_runtime: 0,
            label: id.default_label().to_string(),
        }
    }

    pub fn from_movies(movies: Vec<Movie>, label: impl Into<String>) -> Self {
        let mut track = Self {
            slots: movies.into_iter().map(Slot::Settled).collect(),
            total_runtime: 0,
            label: label.into(),
        };
        track.recompute_total();
        track
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Sum of slot runtimes; a pending slot counts with the runtime it would
    /// roll back to
    pub fn total_runtime(&self) -> u32 {
        self.total_runtime
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        self.slots.iter().any(Slot::is_pending)
    }

    /// Settled movies in slot order; pending slots are skipped
    pub fn movies(&self) -> Vec<Movie> {
        self.slots.iter().filter_map(Slot::settled).cloned().collect()
    }

    /// Ids of the settled movies in slot order
    pub fn ids(&self) -> Vec<MovieId> {
        self.slots
            .iter()
            .filter_map(Slot::settled)
            .map(|movie| movie.id)
            .collect()
    }

    pub(crate) fn position_settled(&self, id: MovieId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Slot::Settled(m) if m.id == id))
    }

    /// Runtime of every settled slot other than `index`
    pub(crate) fn settled_runtime_excluding(&self, index: usize) -> u32 {
        self.slots
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .filter_map(|(_, slot)| slot.settled())
            .fold(0u32, |total, movie| total.saturating_add(movie.runtime))
    }

    /// Moves a settled slot to pending and returns the movie it held
    pub(crate) fn begin_replacement(&mut self, index: usize) -> Option<Movie> {
        let slot = self.slots.get_mut(index)?;
        let Slot::Settled(movie) = slot else {
            return None;
        };
        let previous = movie.clone();
        *slot = Slot::Pending {
            previous: previous.clone(),
        };
        Some(previous)
    }

    /// Settles the pending slot that was replacing `previous_id` with `movie`.
    ///
    /// Returns false when no such pending slot exists any more.
    pub(crate) fn settle_replacement(&mut self, previous_id: MovieId, movie: Movie) -> bool {
        let Some(index) = self.position_pending(previous_id) else {
            return false;
        };
        self.slots[index] = Slot::Settled(movie);
        self.recompute_total();
        true
    }

    /// Restores the pending slot that was replacing `previous_id`
    pub(crate) fn roll_back(&mut self, previous_id: MovieId) -> bool {
        let Some(index) = self.position_pending(previous_id) else {
            return false;
        };
        let Slot::Pending { previous } = self.slots[index].clone() else {
            return false;
        };
        self.slots[index] = Slot::Settled(previous);
        self.recompute_total();
        true
    }

    /// Updates the adult flag of every slot holding `id`
    pub(crate) fn set_adult(&mut self, id: MovieId, adult: bool) -> bool {
        let mut touched = false;
        for slot in self.slots.iter_mut().filter(|s| s.held().id == id) {
            slot.held_mut().adult = adult;
            touched = true;
        }
        touched
    }

    fn position_pending(&self, previous_id: MovieId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Slot::Pending { previous } if previous.id == previous_id))
    }

    // Pending slots keep their old runtime until they settle or roll back
    fn recompute_total(&mut self) {
        self.total_runtime = self
            .slots
            .iter()
            .fold(0u32, |total, slot| total.saturating_add(slot.held().runtime));
    }
}

/// Session-scoped set of movie ids that must not be suggested again.
///
/// Keeps insertion order so the backend sees ids oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionList {
    ids: Vec<MovieId>,
}

impl ExclusionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the id was already excluded
    pub fn insert(&mut self, id: MovieId) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    pub fn as_slice(&self) -> &[MovieId] {
        &self.ids
    }

    pub fn reseed(&mut self, ids: impl IntoIterator<Item = MovieId>) {
        self.ids.clear();
        for id in ids {
            self.insert(id);
        }
    }
}
