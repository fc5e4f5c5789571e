//! Deriving a launch descriptor from an application source tree
//!
//! Detection reads the top level of the tree only: the dependency manifest
//! and lock, Python version pins, and the `*.py` modules beside them. Every
//! value in the resulting descriptor comes from those files or from
//! configured defaults; anything that cannot be established (no manifest, no
//! WSGI callable) is an error rather than a guess.

mod packages;
mod python;

pub use packages::system_packages;
pub use python::{
    find_app, find_app_object, find_env_vars, find_port, normalize_python_version,
    requires_python_version, VersionSource, DEFAULT_PYTHON_VERSION,
};

use crate::config::LaunchboxConfig;
use crate::descriptor::{
    BindAddress, CopySpec, EntryCommand, ImageRef, LaunchDescriptor, DEFAULT_WORKDIR,
    SCHEMA_VERSION,
};
use crate::fs::FileSystem;
use crate::manifest::{discover, normalize_name, MarkerEnv, Sources, Version};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("{0:?} is not a directory")]
    NotADirectory(PathBuf),

    #[error("No WSGI application object found in the top-level Python modules of {0:?}")]
    NoApp(PathBuf),
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub server: String,
    pub default_port: u16,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            server: "gunicorn".to_string(),
            default_port: 5000,
        }
    }
}

impl From<&LaunchboxConfig> for DetectorConfig {
    fn from(config: &LaunchboxConfig) -> Self {
        Self {
            server: config.server.clone(),
            default_port: config.default_port,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub level: NoteLevel,
    pub message: String,
}

impl Note {
    fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoteLevel::Info,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoteLevel::Warning,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub descriptor: LaunchDescriptor,
    pub python_version: String,
    /// Variables the application reads; their values are never filled in
    pub env_vars: Vec<String>,
    pub notes: Vec<Note>,
    #[serde(skip)]
    pub sources: Sources,
}

impl Detection {
    pub fn marker_env(&self) -> MarkerEnv {
        marker_env_for_python(&self.python_version)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(|n| n.level == NoteLevel::Warning)
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor)?;
        writeln!(f)?;
        writeln!(f, "Python: {}", self.python_version)?;
        if !self.env_vars.is_empty() {
            writeln!(f, "Runtime environment: {}", self.env_vars.join(", "))?;
        }
        if !self.notes.is_empty() {
            writeln!(f)?;
            writeln!(f, "Notes:")?;
            for note in &self.notes {
                let marker = match note.level {
                    NoteLevel::Info => "-",
                    NoteLevel::Warning => "!",
                };
                writeln!(f, "  {} {}", marker, note.message)?;
            }
        }
        Ok(())
    }
}

/// Marker environment of a `python:X.Y` image
pub fn marker_env_for_python(version: &str) -> MarkerEnv {
    let version = version
        .parse::<Version>()
        .unwrap_or_else(|_| Version::from_release(vec![3, 11]));
    MarkerEnv::linux(&version)
}

/// Marker environment implied by a base image tag such as `3.12-slim`
pub fn marker_env_for_image(image: &ImageRef) -> MarkerEnv {
    let version = image
        .tag
        .as_deref()
        .and_then(normalize_python_version)
        .unwrap_or_else(|| DEFAULT_PYTHON_VERSION.to_string());
    marker_env_for_python(&version)
}

pub struct Detector {
    fs: Arc<dyn FileSystem>,
    config: DetectorConfig,
}

impl Detector {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self::with_config(fs, DetectorConfig::default())
    }

    pub fn with_config(fs: Arc<dyn FileSystem>, config: DetectorConfig) -> Self {
        Self { fs, config }
    }

    pub fn detect(&self, root: &Path) -> Result<Detection> {
        if !self.fs.is_dir(root) {
            return Err(DetectError::NotADirectory(root.to_path_buf()).into());
        }
        info!(root = %root.display(), "Detecting application");

        let mut notes = Vec::new();
        let sources = discover(self.fs.as_ref(), root)?;
        let manifest = &sources.manifest;

        let (python_version, version_source) = python::resolve_python_version(
            self.read_optional(&root.join(".python-version")).as_deref(),
            self.read_optional(&root.join("runtime.txt")).as_deref(),
            manifest,
        );
        notes.push(Note::info(format!(
            "Python {} ({})",
            python_version,
            version_source.describe()
        )));
        let base_image = ImageRef::parse(&format!("python:{}-slim", python_version))
            .context("Failed to build base image reference")?;

        let system_packages =
            system_packages(manifest.dependencies.iter().map(|d| d.name.as_str()));

        let modules = self.python_modules(root)?;
        let app = find_app(modules.iter().map(|(m, c)| (m.as_str(), c.as_str())))
            .ok_or_else(|| DetectError::NoApp(root.to_path_buf()))?;
        debug!(app = %app, "Found WSGI application");

        let app_source = modules
            .iter()
            .find(|(m, _)| *m == app.module)
            .map(|(_, c)| c.as_str());
        let detected_port = app_source
            .and_then(find_port)
            .or_else(|| modules.iter().find_map(|(_, c)| find_port(c)));
        let port = match detected_port {
            Some(port) => port,
            None => {
                notes.push(Note::info(format!(
                    "No port found in source; using {}",
                    self.config.default_port
                )));
                self.config.default_port
            }
        };

        let env_vars: BTreeSet<String> = modules
            .iter()
            .flat_map(|(_, c)| find_env_vars(c))
            .collect();
        for var in &env_vars {
            notes.push(Note::info(format!(
                "Application reads {} from the environment; provide it at run time",
                var
            )));
        }

        let server = self.config.server.clone();
        let declared = manifest
            .dependencies
            .iter()
            .any(|d| d.normalized_name() == normalize_name(&server));
        if !declared {
            warn!(server = %server, "Server is not declared in the manifest");
            notes.push(Note::warning(format!(
                "{} is not declared in {}; the entry command will not be installed",
                server, sources.manifest_file
            )));
        }
        if sources.lock.is_none() {
            notes.push(Note::warning(format!(
                "No lock file found (looked for {}); dependency versions are not pinned",
                crate::manifest::LOCK_FILES.join(", ")
            )));
        }

        let descriptor = LaunchDescriptor {
            version: SCHEMA_VERSION.to_string(),
            base_image,
            system_packages,
            workdir: DEFAULT_WORKDIR.to_string(),
            manifest: sources.manifest_file.clone(),
            lock: sources.lock_file.clone(),
            source: CopySpec::default(),
            env: BTreeMap::new(),
            expose: port,
            entry: EntryCommand {
                server,
                bind: BindAddress::new(DEFAULT_BIND_HOST, port),
                app,
                args: Vec::new(),
            },
        };

        Ok(Detection {
            descriptor,
            python_version,
            env_vars: env_vars.into_iter().collect(),
            notes,
            sources,
        })
    }

    fn read_optional(&self, path: &Path) -> Option<String> {
        if self.fs.is_file(path) {
            self.fs.read_to_string(path).ok()
        } else {
            None
        }
    }

    /// Top-level `*.py` modules as (module name, content), in lookup order
    fn python_modules(&self, root: &Path) -> Result<Vec<(String, String)>> {
        let entries = self
            .fs
            .read_dir(root)
            .with_context(|| format!("Failed to list {}", root.display()))?;
        let stems: Vec<String> = entries
            .iter()
            .filter(|e| e.is_file() && e.extension() == Some("py"))
            .map(|e| e.stem().to_string())
            .collect();

        python::module_priority(&stems)
            .into_iter()
            .map(|stem| {
                let path = root.join(format!("{}.py", stem));
                let content = self
                    .fs
                    .read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Ok((stem, content))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;

    const PYPROJECT: &str = r#"
[project]
name = "repl-nix-workspace"
version = "0.1.0"
requires-python = ">=3.11"
dependencies = [
    "flask>=3.0",
    "flask-sqlalchemy>=3.1.1",
    "gunicorn>=21.2.0",
    "psycopg2-binary>=2.9.9",
]
"#;

    const APP_PY: &str = r#"
import os
from flask import Flask

app = Flask(__name__)
app.secret_key = os.environ.get("SESSION_SECRET")
app.config["SQLALCHEMY_DATABASE_URI"] = os.environ.get("DATABASE_URL")
"#;

    const MAIN_PY: &str = r#"
from app import app

if __name__ == "__main__":
    app.run(host="0.0.0.0", port=5000, debug=True)
"#;

    fn flask_tree() -> Arc<MockFileSystem> {
        let fs = MockFileSystem::new();
        fs.add_file("pyproject.toml", PYPROJECT);
        fs.add_file("uv.lock", "[[package]]\nname = \"flask\"\nversion = \"3.0.0\"\n");
        fs.add_file("app.py", APP_PY);
        fs.add_file("main.py", MAIN_PY);
        fs.add_file("models.py", "from app import db\n");
        fs.add_dir("static");
        Arc::new(fs)
    }

    #[test]
    fn test_detects_flask_application() {
        let fs = flask_tree();
        let detection = Detector::new(fs.clone()).detect(fs.root()).unwrap();
        let descriptor = &detection.descriptor;

        assert_eq!(descriptor.base_image.to_string(), "python:3.11-slim");
        assert_eq!(descriptor.system_packages, vec!["gcc", "libpq-dev"]);
        assert_eq!(descriptor.manifest, "pyproject.toml");
        assert_eq!(descriptor.lock.as_deref(), Some("uv.lock"));
        assert_eq!(descriptor.expose, 5000);
        assert_eq!(
            descriptor.entry.argv(),
            vec!["gunicorn", "--bind", "0.0.0.0:5000", "main:app"]
        );
        assert_eq!(detection.env_vars, vec!["DATABASE_URL", "SESSION_SECRET"]);
        assert!(descriptor.env.is_empty());
        assert_eq!(detection.warnings().count(), 0);
    }

    #[test]
    fn test_python_version_file_overrides_requires_python() {
        let fs = flask_tree();
        fs.add_file(".python-version", "3.12.3\n");
        let detection = Detector::new(fs.clone()).detect(fs.root()).unwrap();
        assert_eq!(detection.python_version, "3.12");
        assert_eq!(detection.descriptor.base_image.to_string(), "python:3.12-slim");
        assert_eq!(detection.marker_env().python_version, "3.12");
    }

    #[test]
    fn test_default_port_and_custom_server() {
        let fs = MockFileSystem::new();
        fs.add_file("requirements.txt", "flask==3.0.0\n");
        fs.add_file("wsgi.py", "from flask import Flask\napplication = Flask(__name__)\n");
        let fs = Arc::new(fs);

        let config = DetectorConfig {
            server: "waitress-serve".to_string(),
            default_port: 8080,
        };
        let detection = Detector::with_config(fs.clone(), config)
            .detect(fs.root())
            .unwrap();

        assert_eq!(detection.descriptor.entry.to_string(), "waitress-serve --bind 0.0.0.0:8080 wsgi:application");
        assert_eq!(detection.descriptor.expose, 8080);
        assert_eq!(detection.descriptor.system_packages, vec!["gcc"]);
        let warnings: Vec<&str> = detection.warnings().map(|n| n.message.as_str()).collect();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("waitress-serve is not declared"));
        assert!(warnings[1].contains("No lock file"));
    }

    #[test]
    fn test_missing_manifest_is_an_error() {
        let fs = MockFileSystem::new();
        fs.add_file("app.py", APP_PY);
        let fs = Arc::new(fs);
        assert!(Detector::new(fs.clone()).detect(fs.root()).is_err());
    }

    #[test]
    fn test_missing_app_is_an_error() {
        let fs = MockFileSystem::new();
        fs.add_file("requirements.txt", "flask==3.0.0\n");
        fs.add_file("utils.py", "def helper():\n    return 1\n");
        let fs = Arc::new(fs);

        let err = Detector::new(fs.clone()).detect(fs.root()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DetectError>(),
            Some(DetectError::NoApp(_))
        ));
    }

    #[test]
    fn test_root_must_be_directory() {
        let fs = Arc::new(MockFileSystem::new());
        let err = Detector::new(fs.clone())
            .detect(Path::new("/elsewhere"))
            .unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_marker_env_for_image() {
        let image = ImageRef::parse("python:3.12-slim-bookworm").unwrap();
        assert_eq!(marker_env_for_image(&image).python_version, "3.12");

        let untagged = ImageRef::parse("python").unwrap();
        assert_eq!(marker_env_for_image(&untagged).python_version, "3.11");
    }
}
