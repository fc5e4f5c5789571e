//! Locating the manifest and lock file in an application tree

use super::error::ManifestError;
use super::files::Manifest;
use super::lock::LockFile;
use crate::fs::FileSystem;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

/// Manifest names in order of preference
pub const MANIFEST_FILES: &[&str] = &["pyproject.toml", "requirements.txt"];

/// Lock names in order of preference
pub const LOCK_FILES: &[&str] = &["uv.lock", "requirements.lock"];

/// Parsed dependency sources of an application tree
#[derive(Debug, Clone)]
pub struct Sources {
    /// Manifest path relative to the source root
    pub manifest_file: String,
    pub manifest: Manifest,
    pub lock_file: Option<String>,
    pub lock: Option<LockFile>,
}

/// Find and parse the manifest and lock under `root`
pub fn discover(fs: &dyn FileSystem, root: &Path) -> Result<Sources> {
    let manifest_file = MANIFEST_FILES
        .iter()
        .find(|name| fs.is_file(&root.join(name)))
        .ok_or_else(|| ManifestError::NotFound(root.to_path_buf()))?;
    let lock_file = LOCK_FILES.iter().find(|name| fs.is_file(&root.join(name)));

    debug!(manifest = manifest_file, lock = ?lock_file, root = %root.display(), "Discovered dependency files");
    load(fs, root, manifest_file, lock_file.copied())
}

/// Parse the named manifest and optional lock under `root`
pub fn load(
    fs: &dyn FileSystem,
    root: &Path,
    manifest_file: &str,
    lock_file: Option<&str>,
) -> Result<Sources> {
    let manifest_path = root.join(manifest_file);
    let content = fs
        .read_to_string(&manifest_path)
        .with_context(|| format!("Failed to read manifest {}", manifest_path.display()))?;
    let manifest = Manifest::parse(&manifest_path, &content)?;

    let lock = match lock_file {
        Some(name) => {
            let lock_path = root.join(name);
            let content = fs
                .read_to_string(&lock_path)
                .with_context(|| format!("Failed to read lock file {}", lock_path.display()))?;
            let lock = LockFile::parse(&lock_path, &content)?;
            info!(lock = name, packages = lock.len(), "Loaded lock file");
            Some(lock)
        }
        None => None,
    };

    Ok(Sources {
        manifest_file: manifest_file.to_string(),
        manifest,
        lock_file: lock_file.map(str::to_string),
        lock,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;
    use crate::manifest::{LockKind, ManifestKind};

    #[test]
    fn test_prefers_pyproject_and_uv_lock() {
        let fs = MockFileSystem::new();
        fs.add_file("pyproject.toml", "[project]\nname = \"x\"\ndependencies = [\"flask\"]\n");
        fs.add_file("requirements.txt", "django==5.0\n");
        fs.add_file("uv.lock", "[[package]]\nname = \"flask\"\nversion = \"3.0.0\"\n");
        fs.add_file("requirements.lock", "django==5.0\n");

        let sources = discover(&fs, fs.root()).unwrap();
        assert_eq!(sources.manifest_file, "pyproject.toml");
        assert_eq!(sources.manifest.kind, ManifestKind::Pyproject);
        assert_eq!(sources.lock_file.as_deref(), Some("uv.lock"));
        assert_eq!(sources.lock.unwrap().kind, LockKind::Uv);
    }

    #[test]
    fn test_requirements_without_lock() {
        let fs = MockFileSystem::new();
        fs.add_file("requirements.txt", "flask==3.0.0\n");

        let sources = discover(&fs, fs.root()).unwrap();
        assert_eq!(sources.manifest.kind, ManifestKind::Requirements);
        assert!(sources.lock.is_none());
        assert!(sources.lock_file.is_none());
    }

    #[test]
    fn test_missing_manifest() {
        let fs = MockFileSystem::new();
        fs.add_file("main.py", "print('hi')\n");

        let err = discover(&fs, fs.root()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ManifestError>(),
            Some(ManifestError::NotFound(_))
        ));
    }

    #[test]
    fn test_corrupted_lock_fails() {
        let fs = MockFileSystem::new();
        fs.add_file("pyproject.toml", "[project]\nname = \"x\"\ndependencies = []\n");
        fs.add_file("uv.lock", "[[package]\n");

        assert!(discover(&fs, fs.root()).is_err());
    }
}
