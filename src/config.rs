use serde::Deserialize;
use std::time::Duration;

/// Client configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the recommendation backend
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Bearer token attached to every backend request
    #[serde(default)]
    pub api_token: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Redis connection URL for persisted client state
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Delay before a replacement movie takes over its slot
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// How long a transient notification stays visible
    #[serde(default = "default_notification_duration_ms")]
    pub notification_duration_ms: u64,

    /// Interval between feedback eligibility scans
    #[serde(default = "default_feedback_poll_interval_secs")]
    pub feedback_poll_interval_secs: u64,

    /// Delay before the first feedback prompt is shown
    #[serde(default = "default_feedback_initial_delay_ms")]
    pub feedback_initial_delay_ms: u64,

    /// Delay before a follow-up prompt is shown after a response
    #[serde(default = "default_feedback_followup_delay_ms")]
    pub feedback_followup_delay_ms: u64,

    /// Fallback refresh interval for the recommendations recap
    #[serde(default = "default_recap_refresh_secs")]
    pub recap_refresh_secs: u64,
}

fn default_api_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_settle_delay_ms() -> u64 {
    200
}

fn default_notification_duration_ms() -> u64 {
    3000
}

fn default_feedback_poll_interval_secs() -> u64 {
    60
}

fn default_feedback_initial_delay_ms() -> u64 {
    3000
}

fn default_feedback_followup_delay_ms() -> u64 {
    1000
}

fn default_recap_refresh_secs() -> u64 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            redis_url: None,
            settle_delay_ms: default_settle_delay_ms(),
            notification_duration_ms: default_notification_duration_ms(),
            feedback_poll_interval_secs: default_feedback_poll_interval_secs(),
            feedback_initial_delay_ms: default_feedback_initial_delay_ms(),
            feedback_followup_delay_ms: default_feedback_followup_delay_ms(),
            recap_refresh_secs: default_recap_refresh_secs(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn notification_duration(&self) -> Duration {
        Duration::from_millis(self.notification_duration_ms)
    }

    pub fn feedback_poll_interval(&self) -> Duration {
        Duration::from_secs(self.feedback_poll_interval_secs)
    }

    pub fn feedback_initial_delay(&self) -> Duration {
        Duration::from_millis(self.feedback_initial_delay_ms)
    }

    pub fn feedback_followup_delay(&self) -> Duration {
        Duration::from_millis(self.feedback_followup_delay_ms)
    }

    pub fn recap_refresh(&self) -> Duration {
        Duration::from_secs(self.recap_refresh_secs)
    }
}
