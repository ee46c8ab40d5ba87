//! Process configuration: `clap` derive struct with environment-variable
//! fallback on every field.

use std::time::Duration;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "sse-render-bridge", about = "SSE fan-out and task-progress bridge")]
pub struct AppConfig {
    /// Listen host.
    #[arg(long, env = "SSE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port.
    #[arg(long, env = "SSE_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Shared-store connection URL (e.g. `redis://127.0.0.1:6379`).
    #[arg(long, env = "SSE_STORE_URL", default_value = "redis://127.0.0.1:6379")]
    pub store_url: String,

    /// Maximum pooled connections to the shared store.
    #[arg(long, env = "SSE_STORE_MAX_CONNECTIONS", default_value_t = 16)]
    pub store_max_connections: usize,

    /// Heartbeat interval, seconds.
    #[arg(long, env = "SSE_HEARTBEAT_INTERVAL_SECS", default_value_t = 30)]
    pub heartbeat_interval_secs: u64,

    /// Connection idle timeout, seconds.
    #[arg(long, env = "SSE_CONNECTION_TIMEOUT_SECS", default_value_t = 300)]
    pub connection_timeout_secs: u64,

    /// Cleanup sweep interval, seconds.
    #[arg(long, env = "SSE_CLEANUP_INTERVAL_SECS", default_value_t = 60)]
    pub cleanup_interval_secs: u64,

    /// Per-connection ring buffer size (N events retained for replay).
    #[arg(long, env = "SSE_EVENT_BUFFER_SIZE", default_value_t = 100)]
    pub event_buffer_size: usize,

    /// Event buffer TTL, seconds.
    #[arg(long, env = "SSE_EVENT_BUFFER_TTL_SECS", default_value_t = 3600)]
    pub event_buffer_ttl_secs: u64,

    /// Cross-worker pub/sub channel name.
    #[arg(long, env = "SSE_CHANNEL_NAME", default_value = "sse_events")]
    pub channel_name: String,

    /// Master switch for the SSE surface; when false, `/sse/connect`
    /// refuses new connections with 503.
    #[arg(long, env = "SSE_ENABLED", default_value_t = true)]
    pub sse_enabled: bool,

    /// Comma-separated flat API keys, hashed at startup.
    #[arg(long, env = "SSE_API_KEYS", value_delimiter = ',')]
    pub api_keys: Vec<String>,

    /// Comma-separated pre-hashed API keys (SHA-256 hex), used when the
    /// raw key must never be held in process configuration.
    #[arg(long, env = "SSE_API_KEY_HASHES", value_delimiter = ',')]
    pub api_key_hashes: Vec<String>,

    /// Skips API-key/JWT checks entirely. Local development only.
    #[arg(long, env = "SSE_DEV_MODE_SKIP_AUTH", default_value_t = false)]
    pub dev_mode_skip_auth: bool,

    /// Uses the in-memory store and in-memory tool fakes instead of Redis
    /// and a real renderer. Implies nothing about auth.
    #[arg(long, env = "SSE_DEV_MODE", default_value_t = false)]
    pub dev_mode: bool,

    /// Comma-separated allowed CORS origins.
    #[arg(long, env = "SSE_ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    /// JWT issuer, enables bearer-JWT auth when set alongside `jwt_audience`/`jwks_uri`.
    #[arg(long, env = "SSE_JWT_ISSUER")]
    pub jwt_issuer: Option<String>,

    #[arg(long, env = "SSE_JWT_AUDIENCE")]
    pub jwt_audience: Option<String>,

    #[arg(long, env = "SSE_JWKS_URI")]
    pub jwks_uri: Option<String>,

    /// Emit JSON-formatted logs instead of the human-readable default.
    #[arg(long, env = "SSE_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl AppConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn event_buffer_ttl(&self) -> Duration {
        Duration::from_secs(self.event_buffer_ttl_secs)
    }
}
