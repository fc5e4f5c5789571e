//! Utility modules for launchbox

pub mod logging;

pub use logging::{init_logging, LoggingConfig};
