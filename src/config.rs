use clap::{Args, Parser, ValueEnum};
use std::time::Duration;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub store: StoreConfig,

    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(flatten)]
    pub cleanup: CleanupConfig,

    #[command(flatten)]
    pub health: HealthConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "TOKENKEEPER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the token API
    #[arg(long, env = "TOKENKEEPER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Port for the management (health) API
    #[arg(long, env = "TOKENKEEPER_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Upper bound for a single request, including every store call it makes
    #[arg(long, env = "TOKENKEEPER_REQUEST_TIMEOUT_SECS", default_value_t = 4)]
    pub request_timeout_secs: u64,

    /// How long to wait for background tasks during shutdown
    #[arg(long, env = "TOKENKEEPER_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[arg(long = "database-url", env = "TOKENKEEPER_DATABASE_URL", default_value = "postgres://localhost/tokenkeeper")]
    pub url: String,

    #[arg(long, env = "TOKENKEEPER_DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: u32,

    #[arg(long, env = "TOKENKEEPER_DB_MIN_CONNECTIONS", default_value_t = 1)]
    pub min_connections: u32,

    /// Maximum time to wait for a free connection
    #[arg(long, env = "TOKENKEEPER_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 3)]
    pub acquire_timeout_secs: u64,

    #[arg(long, env = "TOKENKEEPER_DB_IDLE_TIMEOUT_SECS", default_value_t = 600)]
    pub idle_timeout_secs: u64,

    #[arg(long, env = "TOKENKEEPER_DB_MAX_LIFETIME_SECS", default_value_t = 1800)]
    pub max_lifetime_secs: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    #[default]
    Postgres,
    /// Process-local store, lost on restart. Meant for development.
    Memory,
}

#[derive(Clone, Debug, Args)]
pub struct StoreConfig {
    /// Where session records are kept
    #[arg(long = "store", env = "TOKENKEEPER_STORE", value_enum, default_value_t = StoreBackend::Postgres)]
    pub backend: StoreBackend,
}

#[derive(Clone, Debug, Args)]
pub struct AuthConfig {
    /// Secret key for signing access tokens
    #[arg(long, env = "TOKENKEEPER_JWT_SECRET")]
    pub jwt_secret: String,

    /// Access token time-to-live in seconds
    #[arg(long, env = "TOKENKEEPER_ACCESS_TOKEN_TTL_SECS", default_value_t = 900)]
    pub access_token_ttl_secs: u64,

    /// Refresh token time-to-live in seconds (default: 30 days)
    #[arg(long, env = "TOKENKEEPER_REFRESH_TOKEN_TTL_SECS", default_value_t = 2_592_000)]
    pub refresh_token_ttl_secs: u64,
}

impl AuthConfig {
    #[must_use]
    pub const fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_ttl_secs)
    }

    #[must_use]
    pub const fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_ttl_secs)
    }
}

#[derive(Clone, Debug, Args)]
pub struct CleanupConfig {
    /// How often to purge expired sessions (0 disables the worker)
    #[arg(long = "cleanup-interval-secs", env = "TOKENKEEPER_CLEANUP_INTERVAL_SECS", default_value_t = 3600)]
    pub interval_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct HealthConfig {
    /// Timeout for the store readiness check
    #[arg(long, env = "TOKENKEEPER_HEALTH_STORE_TIMEOUT_MS", default_value_t = 2000)]
    pub store_timeout_ms: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "TOKENKEEPER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; export is disabled when unset
    #[arg(long, env = "TOKENKEEPER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
