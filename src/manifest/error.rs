use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading manifests, lock files and requirement strings
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Invalid version: '{0}'")]
    InvalidVersion(String),

    #[error("Invalid version specifier '{input}': {reason}")]
    InvalidSpecifier { input: String, reason: String },

    #[error("Invalid requirement '{input}': {reason}")]
    InvalidRequirement { input: String, reason: String },

    #[error("Invalid environment marker '{input}': {reason}")]
    InvalidMarker { input: String, reason: String },

    #[error("Unsupported option '{option}' in {path:?} (line {line}); the dependency list must be self-contained")]
    UnsupportedOption {
        path: PathBuf,
        line: usize,
        option: String,
    },

    #[error("{path:?} is not valid TOML: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{path:?} has no [project] table")]
    MissingProjectTable { path: PathBuf },

    #[error("{path:?} does not declare [project].dependencies statically")]
    MissingDependencies { path: PathBuf },

    #[error("Lock entry '{entry}' in {path:?} is not an exact name==version pin")]
    UnpinnedLockEntry { path: PathBuf, entry: String },

    #[error("No pyproject.toml or requirements.txt found in {0:?}")]
    NotFound(PathBuf),

    #[error("Unrecognised manifest file {0:?}")]
    UnknownManifest(PathBuf),

    #[error("Unrecognised lock file {0:?}")]
    UnknownLock(PathBuf),

    #[error("{location}: {source}")]
    At {
        location: String,
        #[source]
        source: Box<ManifestError>,
    },
}

impl ManifestError {
    /// Attach a file/line location to an entry-level error
    pub fn at(self, location: impl Into<String>) -> Self {
        ManifestError::At {
            location: location.into(),
            source: Box::new(self),
        }
    }
}

/// Errors raised while matching a manifest against a lock file
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No lock file found; refusing to install unpinned dependencies")]
    MissingLock,

    #[error("Dependency '{name}' is declared in the manifest but missing from the lock file")]
    Unlocked { name: String },

    #[error("Locked version {version} of '{name}' does not satisfy '{specifier}'")]
    Unsatisfied {
        name: String,
        version: String,
        specifier: String,
    },

    #[error("Lock file pins '{name}' to several versions: {versions:?}")]
    AmbiguousLock { name: String, versions: Vec<String> },

    #[error("Dependency '{name}' is not pinned with '=='; add a lock file or pin it exactly")]
    Unpinned { name: String },

    #[error("Dependency '{name}' is a direct URL requirement, which cannot be pinned by version")]
    DirectUrl { name: String },

    #[error("Invalid locked version '{version}' for '{name}'")]
    InvalidLockedVersion { name: String, version: String },
}
