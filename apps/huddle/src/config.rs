use std::env;
use std::time::Duration;

/// Huddle sync core configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the HTTP snapshot API
    pub api_url: String,
    /// Websocket endpoint for the push channel
    pub ws_url: String,
    /// Fixed cadence of the snapshot poller
    pub poll_interval: Duration,
    /// First reconnect delay; doubles per attempt
    pub backoff_base: Duration,
    /// Ceiling for the reconnect delay
    pub backoff_cap: Duration,
    /// Reconnect attempts before the connection is declared lost
    pub max_reconnect_attempts: u32,
    /// Per-topic message buffer bound; oldest ids evicted beyond it
    pub retention_limit: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: env::var("HUDDLE_API_URL").unwrap_or(defaults.api_url),
            ws_url: env::var("HUDDLE_WS_URL").unwrap_or(defaults.ws_url),
            poll_interval: env_secs("HUDDLE_POLL_INTERVAL_SECS")
                .unwrap_or(defaults.poll_interval),
            backoff_base: defaults.backoff_base,
            backoff_cap: defaults.backoff_cap,
            max_reconnect_attempts: env::var("HUDDLE_MAX_RECONNECT_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_reconnect_attempts),
            retention_limit: env::var("HUDDLE_RETENTION_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retention_limit),
        }
    }
}

fn env_secs(var: &str) -> Option<Duration> {
    env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8080/api".to_string(),
            ws_url: "ws://127.0.0.1:8080/ws".to_string(),
            poll_interval: Duration::from_secs(30),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            max_reconnect_attempts: 10,
            retention_limit: 500,
        }
    }
}
