use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Relay configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Document joined when the client omits `documentId`
    #[serde(default = "default_document_id")]
    pub default_document_id: String,

    /// User reported when the client omits `userId`
    #[serde(default = "default_user_id")]
    pub default_user_id: String,

    /// Interval between server pings
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// A connection silent for this long is closed
    #[serde(default = "default_client_timeout_secs")]
    pub client_timeout_secs: u64,

    /// Presence entries older than this are dropped
    #[serde(default = "default_presence_timeout_ms")]
    pub presence_timeout_ms: i64,

    #[serde(default = "default_presence_sweep_secs")]
    pub presence_sweep_secs: u64,

    /// Frames queued for one connection before it is evicted as a slow consumer
    #[serde(default = "default_peer_queue_capacity")]
    pub peer_queue_capacity: usize,

    /// Largest inbound websocket message accepted
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        envy::from_env::<Config>().map_err(ConfigError::EnvError)
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    /// Default tracing filter when RUST_LOG is not set
    pub fn log_filter(&self) -> String {
        let level = if self.is_development() && self.log_level == "info" {
            "debug"
        } else {
            self.log_level.as_str()
        };
        format!("collab_relay={level},tower_http=debug,axum::rejection=trace,info")
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs.max(1))
    }

    pub fn presence_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.presence_sweep_secs.max(1))
    }

    pub fn peer_queue_capacity(&self) -> usize {
        self.peer_queue_capacity.max(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            cors_origins: None,
            log_level: default_log_level(),
            default_document_id: default_document_id(),
            default_user_id: default_user_id(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            client_timeout_secs: default_client_timeout_secs(),
            presence_timeout_ms: default_presence_timeout_ms(),
            presence_sweep_secs: default_presence_sweep_secs(),
            peer_queue_capacity: default_peer_queue_capacity(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_document_id() -> String {
    "default".to_string()
}

fn default_user_id() -> String {
    "anonymous".to_string()
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_client_timeout_secs() -> u64 {
    90
}

fn default_presence_timeout_ms() -> i64 {
    30_000
}

fn default_presence_sweep_secs() -> u64 {
    15
}

fn default_peer_queue_capacity() -> usize {
    1024
}

fn default_max_message_bytes() -> usize {
    16 * 1024 * 1024
}
