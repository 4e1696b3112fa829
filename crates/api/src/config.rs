//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; in-memory storage when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `INVENTORY_URL` / `PAYMENT_URL`: participant base URLs; in-memory participants when unset
/// - `DEMO_STOCK`: units per product for the in-memory inventory (default: `100`)
/// - `PARTICIPANT_TIMEOUT_MS`: per-call deadline (default: `5000`)
/// - `SAGA_TIMEOUT_MS`: whole-request deadline before the saga is cancelled (default: `30000`)
/// - `IDEMPOTENCY_TTL_HOURS`: lifetime of idempotency keys (default: `24`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub inventory_url: Option<String>,
    pub payment_url: Option<String>,
    pub demo_stock: u32,
    pub participant_timeout: Duration,
    pub saga_timeout: Duration,
    pub idempotency_ttl_hours: i64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let millis = |name: &str, default: Duration| {
            text(name)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            host: text("HOST").unwrap_or(defaults.host),
            port: text("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: text("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: text("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: text("DATABASE_URL"),
            database_max_connections: text("DATABASE_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            inventory_url: text("INVENTORY_URL"),
            payment_url: text("PAYMENT_URL"),
            demo_stock: text("DEMO_STOCK")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.demo_stock),
            participant_timeout: millis("PARTICIPANT_TIMEOUT_MS", defaults.participant_timeout),
            saga_timeout: millis("SAGA_TIMEOUT_MS", defaults.saga_timeout),
            idempotency_ttl_hours: text("IDEMPOTENCY_TTL_HOURS")
                .and_then(|v| v.parse().ok())
                .filter(|hours| *hours > 0)
                .unwrap_or(defaults.idempotency_ttl_hours),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idempotency_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.idempotency_ttl_hours)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            inventory_url: None,
            payment_url: None,
            demo_stock: 100,
            participant_timeout: Duration::from_millis(5000),
            saga_timeout: Duration::from_millis(30_000),
            idempotency_ttl_hours: domain::DEFAULT_IDEMPOTENCY_TTL_HOURS,
        }
    }
}
