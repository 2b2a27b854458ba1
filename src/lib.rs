//! Client-side state for the movigation recommendation service.
//!
//! [`services::SessionStore`] owns the two recommendation tracks, the slot
//! replacement lifecycle and the session exclusion list.
//! [`services::FeedbackTargeter`] decides when to ask the user about a movie
//! they went to watch. The two only meet through a [`storage::KeyValueStore`].

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod telemetry;
