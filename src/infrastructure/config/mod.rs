use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

/// Runtime mode for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    Local,
    Production,
}

impl std::fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for RuntimeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(format!("Invalid runtime mode: {s}. Valid values: local, production")),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub mode: RuntimeMode,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub redis: RedisConfig,
    pub rate_limit: RateLimitSettings,
    pub timeout: TimeoutConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Token verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret the auth service signs tokens with
    pub secret: String,
    /// Route prefix guarded by token authentication
    pub protected_prefix: String,
}

/// Shared rate-limit store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub connect_timeout_seconds: u64,
}

/// Rate limiter settings, covering both strategies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Window limit (distributed strategy)
    pub max_requests: u32,
    /// Window length in seconds (distributed strategy)
    pub window_seconds: u64,
    /// Refill rate per second (local fallback)
    pub per_second: u32,
    /// Burst capacity (local fallback)
    pub burst: u32,
}

/// Request timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub default_seconds: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl AppConfig {
    /// Load configuration based on runtime mode
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or invalid
    pub fn load() -> Result<Self, config::ConfigError> {
        let mode = std::env::var("RUN_MODE")
            .unwrap_or_else(|_| "local".to_string())
            .parse::<RuntimeMode>()
            .map_err(config::ConfigError::Message)?;

        Self::load_for_mode(mode)
    }

    /// Load configuration for a specific runtime mode
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or invalid
    pub fn load_for_mode(mode: RuntimeMode) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // For local mode only, load .env.local file (if it exists)
        if mode == RuntimeMode::Local {
            builder = builder.add_source(config::File::with_name(".env.local").required(false));
        }
        // Production mode relies solely on environment variables (no .env file)

        builder = builder
            .add_source(config::Environment::with_prefix("PIPELINE"))
            .add_source(config::Environment::default());

        // Mode-specific defaults
        let (rate_limit, timeout_seconds, log_level, log_format) = match mode {
            RuntimeMode::Local => (100, 60, "debug", "pretty"),
            RuntimeMode::Production => (1000, 30, "info", "json"),
        };

        let settings = builder
            .set_default("mode", mode.to_string())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("auth.secret", "")?
            .set_default("auth.protected_prefix", "/api/v1")?
            .set_default("redis.url", "redis://redis:6379")?
            .set_default("redis.connect_timeout_seconds", 5)?
            .set_default("rate_limit.max_requests", rate_limit)?
            .set_default("rate_limit.window_seconds", 60)?
            .set_default("rate_limit.per_second", rate_limit)?
            .set_default("rate_limit.burst", rate_limit * 2)?
            .set_default("timeout.default_seconds", timeout_seconds)?
            .set_default("cors.allowed_origins", vec!["http://localhost:3000".to_string()])?
            .set_default("logging.level", log_level)?
            .set_default("logging.format", log_format)?
            .build()?;

        settings.try_deserialize()
    }

    /// Check the loaded configuration against the rules the service cannot
    /// run without.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let mut errors = Vec::new();

        if self.auth.secret.len() < 32 {
            errors.push("auth.secret must be at least 32 characters long".to_string());
        }
        if self.server.port == 0 {
            errors.push("server.port must be between 1 and 65535".to_string());
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.max_requests > 100_000 {
            errors.push("rate_limit.max_requests must be between 1 and 100000".to_string());
        }
        if self.rate_limit.window_seconds == 0 {
            errors.push("rate_limit.window_seconds must be positive".to_string());
        }
        if self.rate_limit.per_second == 0 {
            errors.push("rate_limit.per_second must be positive".to_string());
        }
        if self.rate_limit.burst < self.rate_limit.per_second {
            errors.push("rate_limit.burst must be at least rate_limit.per_second".to_string());
        }
        if self.timeout.default_seconds == 0 || self.timeout.default_seconds > 300 {
            errors.push("timeout.default_seconds must be between 1 and 300".to_string());
        }
        if self.cors.allowed_origins.is_empty() {
            errors.push("at least one cors.allowed_origins entry is required".to_string());
        }
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            errors
                .push("logging.level must be one of: trace, debug, info, warn, error".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(config::ConfigError::Message(format!(
                "configuration validation failed: {}",
                errors.join("; ")
            )))
        }
    }
}

impl ServerConfig {
    /// Get the socket address for binding
    ///
    /// # Panics
    /// Panics if the host/port configuration cannot be parsed into a valid socket address
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port).parse().expect("Invalid host/port configuration")
    }
}

impl RedisConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl RateLimitSettings {
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl TimeoutConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.default_seconds)
    }
}
