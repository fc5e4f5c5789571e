//! Structured logging setup for launchbox
//!
//! Logs are written to stderr so that stdout only carries command output
//! (descriptors, Dockerfiles, install sets). `RUST_LOG` is honoured when set;
//! otherwise the launchbox level comes from the CLI or `LAUNCHBOX_LOG_LEVEL`
//! and noisy HTTP crates are held at `warn`.
//!
//! # Example
//!
//! ```no_run
//! use launchbox::util::logging;
//!
//! logging::init_logging(logging::LoggingConfig::from_env());
//! tracing::info!(port = 5000, "Waiting for listener");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for launchbox's own events
    pub level: Level,

    /// Emit one JSON object per event
    pub use_json: bool,

    /// Include the module target (e.g., launchbox::launch) in logs
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: false,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// Reads `LAUNCHBOX_LOG_LEVEL` and `LAUNCHBOX_LOG_JSON`
    pub fn from_env() -> Self {
        let level = env::var("LAUNCHBOX_LOG_LEVEL")
            .map(|v| parse_level(&v))
            .unwrap_or(Level::INFO);

        let use_json = env::var("LAUNCHBOX_LOG_JSON")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);

        Self {
            level,
            use_json,
            include_target: level >= Level::DEBUG,
            ..Default::default()
        }
    }
}

/// Parses a log level name, case-insensitively; unknown names fall back to INFO
pub fn parse_level(level_str: &str) -> Level {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn build_filter(level: Level) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();
    let mut directives = vec![format!("launchbox={}", level)];
    if env::var("RUST_LOG").is_err() {
        directives.extend(["h2=warn", "hyper=warn", "reqwest=warn"].map(String::from));
    }
    for directive in directives {
        if let Ok(parsed) = directive.parse() {
            filter = filter.add_directive(parsed);
        }
    }
    filter
}

/// Installs the global subscriber; later calls are ignored
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level);
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(config.include_target)
            .with_file(config.include_location)
            .with_line_number(config.include_location);

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .init();
        } else {
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    });
}
