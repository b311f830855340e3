use std::env;
use std::net::{IpAddr, SocketAddr};

use chrono::Duration;

use crate::workflows::trips::LifecycleConfig;

const DEFAULT_MANAGER_EMAILS: &str = "travel-managers@example.com";
const DEFAULT_PENDING_TTL_MINUTES: &str = "60";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub trips: TripConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let format = match env::var("APP_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw)?,
            Err(_) if environment == AppEnvironment::Production => LogFormat::Json,
            Err(_) => LogFormat::Compact,
        };

        let trips = TripConfig::from_env()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level, format },
            trips,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing output controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidLogFormat(raw.to_string())),
        }
    }
}

/// Engine settings for the trip lifecycle.
#[derive(Debug, Clone)]
pub struct TripConfig {
    pub manager_recipients: Vec<String>,
    /// `None` keeps pending decisions valid until resolved.
    pub pending_decision_ttl: Option<Duration>,
}

impl TripConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw_recipients = env::var("TRAVEL_MANAGER_EMAILS")
            .unwrap_or_else(|_| DEFAULT_MANAGER_EMAILS.to_string());
        let manager_recipients: Vec<String> = raw_recipients
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect();
        if manager_recipients.is_empty() {
            return Err(ConfigError::EmptyManagerList);
        }

        let ttl_minutes = env::var("TRAVEL_PENDING_DECISION_TTL_MINUTES")
            .unwrap_or_else(|_| DEFAULT_PENDING_TTL_MINUTES.to_string())
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidTtl)?;
        let pending_decision_ttl = if ttl_minutes == 0 {
            None
        } else {
            Some(Duration::minutes(i64::from(ttl_minutes)))
        };

        Ok(Self {
            manager_recipients,
            pending_decision_ttl,
        })
    }

    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            manager_recipients: self.manager_recipients.clone(),
            pending_decision_ttl: self.pending_decision_ttl,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_PORT must be a valid u16")]
    InvalidPort,
    #[error("APP_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost { source: std::net::AddrParseError },
    #[error("APP_LOG_FORMAT must be 'compact' or 'json' (found '{0}')")]
    InvalidLogFormat(String),
    #[error("TRAVEL_PENDING_DECISION_TTL_MINUTES must be a non-negative number of minutes")]
    InvalidTtl,
    #[error("TRAVEL_MANAGER_EMAILS must list at least one recipient")]
    EmptyManagerList,
}

/// Serialises tests that touch the process environment.
#[cfg(test)]
pub(crate) fn env_guard() -> &'static std::sync::Mutex<()> {
    static GUARD: std::sync::OnceLock<std::sync::Mutex<()>> = std::sync::OnceLock::new();
    GUARD.get_or_init(|| std::sync::Mutex::new(()))
}
