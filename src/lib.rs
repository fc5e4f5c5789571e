//! launchbox - build and launch descriptors for Python WSGI applications
//!
//! A launch descriptor captures everything needed to package and start a
//! Python web application: the base image, the OS packages its dependencies
//! compile against, the dependency manifest and lock, the source layout, the
//! exposed port and the single entry command
//! (`<server> --bind <host:port> <module>:<object>`).
//!
//! # Project Structure
//!
//! - [`manifest`]: requirement, manifest and lock parsing; install-set resolution
//! - [`descriptor`]: the descriptor schema and its value types
//! - [`detect`]: deriving a descriptor from a source tree
//! - [`validation`]: rule-based descriptor checks
//! - [`render`]: Dockerfile rendering
//! - [`launch`]: running the entry process and probing it
//!
//! # Example Usage
//!
//! ```no_run
//! use launchbox::detect::Detector;
//! use launchbox::fs::RealFileSystem;
//! use launchbox::manifest::Resolver;
//! use launchbox::render::render_dockerfile;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let detection = Detector::new(Arc::new(RealFileSystem::new())).detect(Path::new("."))?;
//! let sources = &detection.sources;
//! let lock = sources.lock.as_ref().expect("lock file");
//! let install_set = Resolver::new(detection.marker_env()).resolve(&sources.manifest, lock)?;
//! println!("{}", render_dockerfile(&detection.descriptor, &install_set));
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod descriptor;
pub mod detect;
pub mod fs;
pub mod launch;
pub mod manifest;
pub mod render;
pub mod util;
pub mod validation;

pub use config::{ConfigError, LaunchboxConfig};
pub use descriptor::LaunchDescriptor;
pub use manifest::{InstallSet, Resolver};
pub use util::{init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
