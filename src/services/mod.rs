pub mod backend;
pub mod feedback;
pub mod poller;
pub mod recap;
pub mod session;

pub use backend::{HttpRecommendationApi, RecommendationApi};
pub use feedback::FeedbackTargeter;
pub use poller::IntervalHandle;
pub use recap::{load_recap, RecapFeed};
pub use session::{
    Notification, NotificationKind, RecommendationError, ReplaceOutcome, SessionStore, SessionView,
};
