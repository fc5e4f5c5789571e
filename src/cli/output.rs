//! Output formatting for CLI results
//!
//! Machine formats (JSON, YAML) serialize the same structures the library
//! returns; the human format is meant for a terminal.

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::detect::Detection;
use crate::manifest::{InstallSet, Sources};
use crate::render::render_dockerfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format, the descriptor's native on-disk form
    Yaml,
    /// Human-readable formatted text
    Human,
    /// A rendered Dockerfile
    Dockerfile,
}

/// Resolved install set with the files it came from
#[derive(Debug, Clone, Serialize)]
pub struct LockReport {
    pub manifest: String,
    pub lock: Option<String>,
    pub digest: String,
    pub closed: bool,
    pub packages: Vec<String>,
}

impl LockReport {
    pub fn new(sources: &Sources, install_set: &InstallSet) -> Self {
        Self {
            manifest: sources.manifest_file.clone(),
            lock: sources.lock_file.clone(),
            digest: install_set.digest(),
            closed: install_set.closed,
            packages: install_set.requirements(),
        }
    }
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a detection; the Dockerfile format needs the resolved install set
    pub fn format_detection(
        &self,
        detection: &Detection,
        install_set: Option<&InstallSet>,
    ) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&detection.descriptor)
                .context("Failed to serialize descriptor to JSON"),
            OutputFormat::Yaml => serde_yaml::to_string(&detection.descriptor)
                .context("Failed to serialize descriptor to YAML"),
            OutputFormat::Human => Ok(detection.to_string()),
            OutputFormat::Dockerfile => match install_set {
                Some(install_set) => Ok(render_dockerfile(&detection.descriptor, install_set)),
                None => bail!("Dockerfile output requires a resolved install set"),
            },
        }
    }

    pub fn format_lock(&self, report: &LockReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(report).context("Failed to serialize install set to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(report).context("Failed to serialize install set to YAML")
            }
            OutputFormat::Human => Ok(self.format_lock_human(report)),
            OutputFormat::Dockerfile => bail!("An install set has no Dockerfile form"),
        }
    }

    fn format_lock_human(&self, report: &LockReport) -> String {
        let mut output = String::new();
        let origin = match &report.lock {
            Some(lock) => format!("locked from {}", lock),
            None => format!("exact pins from {}", report.manifest),
        };
        output.push_str(&format!(
            "Install set ({} packages, {})\n",
            report.packages.len(),
            origin
        ));
        output.push_str(&format!("Digest: sha256:{}\n", report.digest));
        if !report.closed {
            output.push_str("Transitive dependencies are resolved by pip at build time\n");
        }
        output.push('\n');
        for package in &report.packages {
            output.push_str(&format!("  {}\n", package));
        }
        output
    }
}
