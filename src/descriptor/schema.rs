//! Build-and-launch descriptor
//!
//! A [`LaunchDescriptor`] is the declarative form of a container recipe for a
//! Python WSGI application: the base image, OS packages, dependency files,
//! where the source goes, and the single process the container runs. It is
//! stored as YAML or JSON and is the input of rendering, validation and
//! launching.

use super::entry::EntryCommand;
use super::error::DescriptorError;
use super::image::ImageRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

pub const SCHEMA_VERSION: &str = "1.0";
pub const DEFAULT_WORKDIR: &str = "/app";

fn default_version() -> String {
    SCHEMA_VERSION.to_string()
}

fn default_workdir() -> String {
    DEFAULT_WORKDIR.to_string()
}

/// Source tree placement, `COPY <from> <to>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySpec {
    pub from: String,
    pub to: String,
}

impl Default for CopySpec {
    fn default() -> Self {
        Self {
            from: ".".to_string(),
            to: ".".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchDescriptor {
    /// Schema version (e.g., "1.0")
    #[serde(default = "default_version")]
    pub version: String,
    pub base_image: ImageRef,
    /// OS packages installed with apt-get
    #[serde(default)]
    pub system_packages: Vec<String>,
    #[serde(default = "default_workdir")]
    pub workdir: String,
    /// Dependency manifest, relative to the source root
    pub manifest: String,
    /// Lock file, relative to the source root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<String>,
    #[serde(default)]
    pub source: CopySpec,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Port declared as image metadata
    pub expose: u16,
    pub entry: EntryCommand,
}

/// On-disk descriptor encoding, chosen from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorFormat {
    Yaml,
    Json,
}

impl DescriptorFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DescriptorFormat::Json,
            _ => DescriptorFormat::Yaml,
        }
    }
}

impl LaunchDescriptor {
    pub fn from_yaml(content: &str) -> Result<Self, DescriptorError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self, DescriptorError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String, DescriptorError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> Result<String, DescriptorError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a descriptor; `.json` files are JSON, anything else YAML
    pub fn load(path: &Path) -> Result<Self, DescriptorError> {
        let content = std::fs::read_to_string(path).map_err(|source| DescriptorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match DescriptorFormat::from_path(path) {
            DescriptorFormat::Json => Self::from_json(&content),
            DescriptorFormat::Yaml => Self::from_yaml(&content),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), DescriptorError> {
        let content = match DescriptorFormat::from_path(path) {
            DescriptorFormat::Json => self.to_json()?,
            DescriptorFormat::Yaml => self.to_yaml()?,
        };
        std::fs::write(path, content).map_err(|source| DescriptorError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl fmt::Display for LaunchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Launch Descriptor (v{})", self.version)?;
        writeln!(f, "==========================")?;
        writeln!(f, "Base Image: {}", self.base_image)?;
        if !self.system_packages.is_empty() {
            writeln!(f, "Packages:   {}", self.system_packages.join(", "))?;
        }
        writeln!(f, "Workdir:    {}", self.workdir)?;
        writeln!(f)?;

        writeln!(f, "Dependencies:")?;
        writeln!(f, "  Manifest: {}", self.manifest)?;
        match &self.lock {
            Some(lock) => writeln!(f, "  Lock:     {}", lock)?,
            None => writeln!(f, "  Lock:     (none)")?,
        }
        writeln!(f)?;

        writeln!(f, "Runtime:")?;
        writeln!(f, "  Source:  {} -> {}", self.source.from, self.source.to)?;
        writeln!(f, "  Expose:  {}", self.expose)?;
        writeln!(f, "  Command: {}", self.entry)?;
        if !self.env.is_empty() {
            writeln!(f, "  Env:")?;
            for (key, value) in &self.env {
                writeln!(f, "    {}={}", key, value)?;
            }
        }

        Ok(())
    }
}
