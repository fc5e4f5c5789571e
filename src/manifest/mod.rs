//! Python dependency manifests, lock files and their resolution
//!
//! Everything here parses structurally: PEP 508 requirements, PEP 440
//! versions and specifiers, PEP 621 `pyproject.toml`, `uv.lock` and pinned
//! requirements files. Input that cannot be understood is an error.

mod discover;
mod error;
mod files;
mod lock;
mod marker;
mod requirement;
mod resolve;
mod version;

pub use discover::{discover, load, Sources, LOCK_FILES, MANIFEST_FILES};
pub use error::{ManifestError, ResolveError};
pub use files::{Manifest, ManifestKind};
pub use lock::{LockFile, LockKind, LockedDependency, LockedPackage};
pub use marker::{Marker, MarkerEnv};
pub use requirement::{normalize_name, Requirement};
pub use resolve::{InstallSet, PinnedPackage, Resolver};
pub use version::{parse_specifiers, Operator, Specifier, Version};

/// Parse one PEP 508 requirement line
pub fn parse_requirement(line: &str) -> Result<Requirement, ManifestError> {
    Requirement::parse(line)
}
