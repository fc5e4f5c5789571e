//! Configuration management for launchbox
//!
//! Settings are read from environment variables with defaults. Command-line
//! flags override the values loaded here.
//!
//! # Environment Variables
//!
//! - `LAUNCHBOX_LOG_LEVEL`: Logging level - default: "info"
//! - `LAUNCHBOX_REQUIRE_LOCK`: Refuse to resolve without a lock file (true|false) - default: "true"
//! - `LAUNCHBOX_SERVER`: WSGI server used for detected entry commands - default: "gunicorn"
//! - `LAUNCHBOX_DEFAULT_PORT`: Port used when the source does not declare one - default: "5000"
//! - `LAUNCHBOX_STARTUP_TIMEOUT`: Seconds to wait for the listener - default: "30"
//! - `LAUNCHBOX_PROBE_TIMEOUT`: Seconds allowed for one liveness probe - default: "5"
//!
//! # Example
//!
//! ```no_run
//! use launchbox::LaunchboxConfig;
//!
//! let config = LaunchboxConfig::default();
//! config.validate().expect("Invalid configuration");
//! println!("{}", config);
//! ```

use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_REQUIRE_LOCK: bool = true;
const DEFAULT_SERVER: &str = "gunicorn";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

const MAX_TIMEOUT_SECS: u64 = 600;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchboxConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Resolution without a lock file is an error when set
    pub require_lock: bool,

    /// WSGI server executable placed in detected entry commands
    pub server: String,

    /// Port used when the application source declares none
    pub default_port: u16,

    /// Seconds to wait for the entry process to accept connections
    pub startup_timeout_secs: u64,

    /// Seconds allowed for one HTTP liveness probe
    pub probe_timeout_secs: u64,
}

impl Default for LaunchboxConfig {
    /// Loads from `LAUNCHBOX_*` environment variables, falling back to defaults
    fn default() -> Self {
        let log_level = env::var("LAUNCHBOX_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        let require_lock = env::var("LAUNCHBOX_REQUIRE_LOCK")
            .ok()
            .and_then(|v| parse_bool(&v))
            .unwrap_or(DEFAULT_REQUIRE_LOCK);

        let server = env::var("LAUNCHBOX_SERVER")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());

        let default_port = env::var("LAUNCHBOX_DEFAULT_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let startup_timeout_secs = env::var("LAUNCHBOX_STARTUP_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_STARTUP_TIMEOUT_SECS);

        let probe_timeout_secs = env::var("LAUNCHBOX_PROBE_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS);

        Self {
            log_level,
            require_lock,
            server,
            default_port,
            startup_timeout_secs,
            probe_timeout_secs,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl LaunchboxConfig {
    /// Checks timeouts are within 1..=600 seconds, the port is non-zero and
    /// the log level is known
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("startup timeout", self.startup_timeout_secs),
            ("probe timeout", self.probe_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "The {} must be at least 1 second",
                    field
                )));
            }
            if value > MAX_TIMEOUT_SECS {
                return Err(ConfigError::ValidationFailed(format!(
                    "The {} cannot exceed 10 minutes",
                    field
                )));
            }
        }

        if self.default_port == 0 {
            return Err(ConfigError::ValidationFailed(
                "Default port must be between 1 and 65535".to_string(),
            ));
        }

        if self.server.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Server cannot be empty".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Parse a whole-second timeout given on the command line
pub fn parse_timeout_secs(field: &str, value: &str) -> Result<u64, ConfigError> {
    let secs = value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::ParseError {
            field: field.to_string(),
            error: e.to_string(),
        })?;
    if secs == 0 || secs > MAX_TIMEOUT_SECS {
        return Err(ConfigError::ParseError {
            field: field.to_string(),
            error: format!("must be between 1 and {} seconds", MAX_TIMEOUT_SECS),
        });
    }
    Ok(secs)
}

impl fmt::Display for LaunchboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Launchbox Configuration:")?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        writeln!(f, "  Require Lock: {}", self.require_lock)?;
        writeln!(f, "  Server: {}", self.server)?;
        writeln!(f, "  Default Port: {}", self.default_port)?;
        writeln!(f, "  Startup Timeout: {}s", self.startup_timeout_secs)?;
        writeln!(f, "  Probe Timeout: {}s", self.probe_timeout_secs)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }

        fn remove(key: &str) -> Self {
            let old_value = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_configuration() {
        let _guards = vec![
            EnvGuard::remove("LAUNCHBOX_LOG_LEVEL"),
            EnvGuard::remove("LAUNCHBOX_REQUIRE_LOCK"),
            EnvGuard::remove("LAUNCHBOX_SERVER"),
            EnvGuard::remove("LAUNCHBOX_DEFAULT_PORT"),
            EnvGuard::remove("LAUNCHBOX_STARTUP_TIMEOUT"),
            EnvGuard::remove("LAUNCHBOX_PROBE_TIMEOUT"),
        ];

        let config = LaunchboxConfig::default();

        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.require_lock, DEFAULT_REQUIRE_LOCK);
        assert_eq!(config.server, DEFAULT_SERVER);
        assert_eq!(config.default_port, DEFAULT_PORT);
        assert_eq!(config.startup_timeout(), Duration::from_secs(30));
        assert_eq!(config.probe_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_environment_variable_parsing() {
        let _guards = vec![
            EnvGuard::set("LAUNCHBOX_LOG_LEVEL", "DEBUG"),
            EnvGuard::set("LAUNCHBOX_REQUIRE_LOCK", "no"),
            EnvGuard::set("LAUNCHBOX_SERVER", "uwsgi"),
            EnvGuard::set("LAUNCHBOX_DEFAULT_PORT", "8000"),
            EnvGuard::set("LAUNCHBOX_STARTUP_TIMEOUT", "90"),
            EnvGuard::set("LAUNCHBOX_PROBE_TIMEOUT", "2"),
        ];

        let config = LaunchboxConfig::default();

        assert_eq!(config.log_level, "debug");
        assert!(!config.require_lock);
        assert_eq!(config.server, "uwsgi");
        assert_eq!(config.default_port, 8000);
        assert_eq!(config.startup_timeout_secs, 90);
        assert_eq!(config.probe_timeout_secs, 2);
    }

    #[test]
    #[serial]
    fn test_unparseable_values_fall_back() {
        let _guards = vec![
            EnvGuard::set("LAUNCHBOX_REQUIRE_LOCK", "maybe"),
            EnvGuard::set("LAUNCHBOX_DEFAULT_PORT", "70000"),
            EnvGuard::set("LAUNCHBOX_SERVER", "  "),
        ];

        let config = LaunchboxConfig::default();

        assert!(config.require_lock);
        assert_eq!(config.default_port, DEFAULT_PORT);
        assert_eq!(config.server, DEFAULT_SERVER);
    }

    #[test]
    #[serial]
    fn test_configuration_validation_invalid_timeout() {
        let mut config = LaunchboxConfig::default();
        config.startup_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.startup_timeout_secs = 601;
        assert!(config.validate().is_err());

        config.startup_timeout_secs = 30;
        config.probe_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_configuration_validation_invalid_log_level() {
        let mut config = LaunchboxConfig::default();
        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_timeout_secs() {
        assert_eq!(parse_timeout_secs("timeout", "45").unwrap(), 45);
        assert!(parse_timeout_secs("timeout", "0").is_err());
        assert!(parse_timeout_secs("timeout", "601").is_err());
        assert!(parse_timeout_secs("timeout", "soon").is_err());
    }

    #[test]
    #[serial]
    fn test_config_display() {
        let config = LaunchboxConfig::default();
        let display = format!("{}", config);
        assert!(display.contains("Launchbox Configuration:"));
        assert!(display.contains("Require Lock:"));
    }
}
