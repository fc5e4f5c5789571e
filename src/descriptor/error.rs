use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("Invalid image reference '{input}': {reason}")]
    InvalidImage { input: String, reason: String },

    #[error("Invalid bind address '{input}': {reason}")]
    InvalidBind { input: String, reason: String },

    #[error("Invalid application reference '{input}': {reason}")]
    InvalidAppRef { input: String, reason: String },

    #[error("Failed to read or write descriptor {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML descriptor: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON descriptor: {0}")]
    Json(#[from] serde_json::Error),
}
