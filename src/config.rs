//! Configuration loading and defaults.
//!
//! Loads the runtime configuration from a TOML file. `ServiceConfig` is the
//! root struct: the listen address, the TLS settings that pick the serving
//! variant and drive certificate rotation, and the logging format.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::tls::provider::RotationConfig;

/// Default certificate lifetime in seconds (1 hour)
pub const DEFAULT_CERT_TTL_SECS: u64 = 3600;

/// Default clock-skew slack in seconds (10 minutes)
pub const DEFAULT_WIGGLE_ROOM_SECS: u64 = 600;

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Listen address
    pub http: HttpConfig,
    /// TLS settings; disabled by default
    #[serde(default)]
    pub tls: TlsSettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listen address configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    /// Port to bind; 0 picks an ephemeral port
    pub port: u16,
}

/// TLS serving and certificate rotation settings
#[derive(Debug, Clone, Deserialize)]
pub struct TlsSettings {
    /// Serve TLS with a self-signed rotating certificate instead of plain
    /// HTTP
    #[serde(default)]
    pub enabled: bool,
    /// Lifetime of each issued certificate in seconds
    #[serde(default = "TlsSettings::default_ttl")]
    pub time_to_live_seconds: u64,
    /// Advisory clock-skew slack in seconds for peers judging a
    /// certificate around a rotation boundary
    #[serde(default = "TlsSettings::default_wiggle_room")]
    pub wiggle_room_seconds: u64,
    /// Whether peers skip certificate verification. Defaults to true: the
    /// certificate is self-signed and carries no validatable chain.
    #[serde(default = "TlsSettings::default_insecure_skip_verify")]
    pub insecure_skip_verify: bool,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            time_to_live_seconds: Self::default_ttl(),
            wiggle_room_seconds: Self::default_wiggle_room(),
            insecure_skip_verify: Self::default_insecure_skip_verify(),
        }
    }
}

impl TlsSettings {
    fn default_ttl() -> u64 {
        DEFAULT_CERT_TTL_SECS
    }

    fn default_wiggle_room() -> u64 {
        DEFAULT_WIGGLE_ROOM_SECS
    }

    fn default_insecure_skip_verify() -> bool {
        true
    }

    /// The certificate rotation parameters these settings describe.
    pub fn rotation(&self) -> RotationConfig {
        RotationConfig {
            time_to_live: Duration::from_secs(self.time_to_live_seconds),
            wiggle_room: Duration::from_secs(self.wiggle_room_seconds),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }
}

impl ServiceConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: ServiceConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks settings a serving variant cannot be built from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tls.enabled && self.tls.time_to_live_seconds == 0 {
            return Err(ConfigError::Validation(
                "tls.time_to_live_seconds must be non-zero when TLS is enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// The host:port string to bind the listener to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http.host, self.http.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
