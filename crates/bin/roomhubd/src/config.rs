//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `roomhub.toml` in the working directory. Every field has a
//! default so the file is optional. Environment variables take precedence
//! over file values.

use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

use roomhub_app::action_executor::RetryPolicy;
use roomhub_app::dimmer_scheduler::DimmerSettings;
use roomhub_domain::dimmer::CurveParams;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Workflow engine tuning.
    pub engine: EngineConfig,
    /// Sunrise/sunset scheduler tuning.
    pub dimmer: DimmerConfig,
    /// Integration toggles.
    pub integrations: IntegrationsConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Age after which a cached reading no longer fires or satisfies anything.
    pub staleness_window_secs: u64,
    pub action_max_attempts: u32,
    pub action_backoff_ms: u64,
    pub command_timeout_secs: u64,
    /// How often active workflows are re-read from storage.
    pub reload_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DimmerConfig {
    pub tick_interval_secs: u64,
    pub hysteresis: f64,
    pub failure_alert_threshold: u32,
    pub max_concurrency: usize,
    /// IANA zone in which sunrise and sunset times are read.
    pub timezone: String,
    pub sigmoid_steepness: f64,
    pub exponential_steepness: f64,
}

/// Per-integration toggles.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    /// Enable the virtual controller brand.
    pub virtual_enabled: bool,
    /// Period of the simulated sensor feed.
    pub virtual_sensor_interval_secs: u64,
}

impl Config {
    /// Load configuration from `roomhub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("roomhub.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ROOMHUB_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("ROOMHUB_PORT")
            && let Ok(port) = val.parse()
        {
            self.server.port = port;
        }
        if let Ok(val) = std::env::var("ROOMHUB_BIND")
            && let Some((host, port)) = val.rsplit_once(':')
        {
            self.server.host = host.to_string();
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("ROOMHUB_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("ROOMHUB_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("ROOMHUB_TIMEZONE") {
            self.dimmer.timezone = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.engine.reload_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "engine.reload_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.engine.action_max_attempts == 0 {
            return Err(ConfigError::Validation(
                "engine.action_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.dimmer.tick_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "dimmer.tick_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.dimmer.max_concurrency == 0 {
            return Err(ConfigError::Validation(
                "dimmer.max_concurrency must be non-zero".to_string(),
            ));
        }
        if self.integrations.virtual_enabled && self.integrations.virtual_sensor_interval_secs == 0
        {
            return Err(ConfigError::Validation(
                "integrations.virtual_sensor_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.dimmer.failure_alert_threshold == 0 {
            return Err(ConfigError::Validation(
                "dimmer.failure_alert_threshold must be at least 1".to_string(),
            ));
        }
        if !self.dimmer.hysteresis.is_finite() || self.dimmer.hysteresis < 0.0 {
            return Err(ConfigError::Validation(
                "dimmer.hysteresis must be a non-negative number".to_string(),
            ));
        }
        for (name, steepness) in [
            ("sigmoid_steepness", self.dimmer.sigmoid_steepness),
            ("exponential_steepness", self.dimmer.exponential_steepness),
        ] {
            if !steepness.is_finite() || steepness <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "dimmer.{name} must be a positive number"
                )));
            }
        }
        self.staleness_window()?;
        self.timezone()?;
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the zone name is not a known
    /// IANA timezone.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.dimmer.timezone.parse().map_err(|_| {
            ConfigError::Validation(format!("unknown timezone {:?}", self.dimmer.timezone))
        })
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.engine.action_max_attempts,
            backoff: Duration::from_millis(self.engine.action_backoff_ms),
        }
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.command_timeout_secs)
    }

    #[must_use]
    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.engine.reload_interval_secs)
    }

    /// Staleness window as the signed duration the sensor cache compares
    /// timestamps with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the window does not fit a
    /// [`chrono::TimeDelta`].
    pub fn staleness_window(&self) -> Result<chrono::TimeDelta, ConfigError> {
        i64::try_from(self.engine.staleness_window_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .ok_or_else(|| {
                ConfigError::Validation(
                    "engine.staleness_window_secs is out of range".to_string(),
                )
            })
    }

    #[must_use]
    pub fn sensor_interval(&self) -> Duration {
        Duration::from_secs(self.integrations.virtual_sensor_interval_secs)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the configured timezone is
    /// unknown.
    pub fn dimmer_settings(&self) -> Result<DimmerSettings, ConfigError> {
        Ok(DimmerSettings {
            tick_interval: Duration::from_secs(self.dimmer.tick_interval_secs),
            hysteresis: self.dimmer.hysteresis,
            failure_alert_threshold: self.dimmer.failure_alert_threshold,
            max_concurrency: self.dimmer.max_concurrency,
            timezone: self.timezone()?,
            curve: CurveParams {
                sigmoid_steepness: self.dimmer.sigmoid_steepness,
                exponential_steepness: self.dimmer.exponential_steepness,
            },
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:roomhub.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "roomhubd=info,roomhub=info,tower_http=debug".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            staleness_window_secs: 300,
            action_max_attempts: 3,
            action_backoff_ms: 500,
            command_timeout_secs: 10,
            reload_interval_secs: 30,
        }
    }
}

impl Default for DimmerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
            hysteresis: 1.0,
            failure_alert_threshold: 5,
            max_concurrency: 8,
            timezone: "UTC".to_string(),
            sigmoid_steepness: 10.0,
            exponential_steepness: 3.0,
        }
    }
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            virtual_enabled: true,
            virtual_sensor_interval_secs: 15,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
