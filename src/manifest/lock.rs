//! Lock file readers
//!
//! A lock maps every package that may be installed to exactly one version.
//! `uv.lock` additionally records the dependency graph, which lets the
//! resolver compute the transitive closure of the manifest; a pinned
//! requirements lock is taken as already closed.

use super::error::ManifestError;
use super::files::requirement_lines;
use super::marker::Marker;
use super::requirement::{normalize_name, Requirement};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LockKind {
    Uv,
    Requirements,
}

/// Edge from a locked package to one of its dependencies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedDependency {
    pub name: String,
    /// Extras requested on the target, normalized
    pub extras: Vec<String>,
    /// Target version, recorded when the lock holds several versions of it
    pub version: Option<String>,
    pub marker: Option<Marker>,
}

/// One package version recorded in a lock file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedPackage {
    pub name: String,
    pub version: String,
    /// Edges to other locked packages, `None` when the lock has no graph
    pub dependencies: Option<Vec<LockedDependency>>,
    /// Extra edges keyed by normalized extra name
    pub optional_dependencies: BTreeMap<String, Vec<LockedDependency>>,
    /// Environments this entry applies to: the marker of a requirements-style
    /// lock line, or the `resolution-markers` of a forked `uv.lock` entry
    pub marker: Option<Marker>,
}

#[derive(Debug, Clone)]
pub struct LockFile {
    pub kind: LockKind,
    pub path: PathBuf,
    /// Keyed by normalized name; several entries mean the lock forks on markers
    pub packages: BTreeMap<String, Vec<LockedPackage>>,
}

#[derive(Debug, Deserialize)]
struct UvLock {
    #[serde(default, alias = "distribution")]
    package: Vec<UvPackage>,
}

#[derive(Debug, Deserialize)]
struct UvPackage {
    name: String,
    version: Option<String>,
    #[serde(default)]
    source: BTreeMap<String, toml::Value>,
    #[serde(default)]
    dependencies: Vec<UvDependency>,
    #[serde(default, rename = "optional-dependencies")]
    optional_dependencies: BTreeMap<String, Vec<UvDependency>>,
    #[serde(default, rename = "resolution-markers")]
    resolution_markers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UvDependency {
    name: String,
    version: Option<String>,
    #[serde(default)]
    extra: Vec<String>,
    marker: Option<String>,
}

impl UvPackage {
    /// The project itself appears in the lock as an editable or virtual source
    fn is_workspace_member(&self) -> bool {
        self.source.contains_key("editable") || self.source.contains_key("virtual")
    }
}

impl LockFile {
    /// Choose a reader from the file name
    pub fn parse(path: &Path, content: &str) -> Result<Self, ManifestError> {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if file_name == "uv.lock" {
            Self::from_uv_lock(path, content)
        } else if file_name.ends_with(".lock") || file_name.ends_with(".txt") {
            Self::from_requirements(path, content)
        } else {
            Err(ManifestError::UnknownLock(path.to_path_buf()))
        }
    }

    pub fn from_uv_lock(path: &Path, content: &str) -> Result<Self, ManifestError> {
        let doc: UvLock = toml::from_str(content).map_err(|source| ManifestError::Toml {
            path: path.to_path_buf(),
            source,
        })?;

        let mut packages: BTreeMap<String, Vec<LockedPackage>> = BTreeMap::new();
        for package in doc.package {
            if package.is_workspace_member() {
                continue;
            }
            let version = package
                .version
                .clone()
                .ok_or_else(|| ManifestError::UnpinnedLockEntry {
                    path: path.to_path_buf(),
                    entry: package.name.clone(),
                })?;

            let context = || format!("{}: package '{}'", path.display(), package.name);
            let edges = |deps: &[UvDependency]| {
                deps.iter()
                    .map(|dep| locked_dependency(dep).map_err(|e| e.at(context())))
                    .collect::<Result<Vec<_>, ManifestError>>()
            };

            let dependencies = edges(&package.dependencies)?;
            let mut optional_dependencies = BTreeMap::new();
            for (extra, deps) in &package.optional_dependencies {
                optional_dependencies.insert(normalize_name(extra), edges(deps)?);
            }
            let marker = fork_marker(&package.resolution_markers).map_err(|e| e.at(context()))?;

            packages
                .entry(normalize_name(&package.name))
                .or_default()
                .push(LockedPackage {
                    name: package.name,
                    version,
                    dependencies: Some(dependencies),
                    optional_dependencies,
                    marker,
                });
        }

        Ok(LockFile {
            kind: LockKind::Uv,
            path: path.to_path_buf(),
            packages,
        })
    }

    /// A fully pinned requirements file (`pip freeze` / `pip-compile` output)
    pub fn from_requirements(path: &Path, content: &str) -> Result<Self, ManifestError> {
        let mut packages: BTreeMap<String, Vec<LockedPackage>> = BTreeMap::new();

        for (line, text) in requirement_lines(path, content)? {
            let requirement =
                Requirement::parse(&text).map_err(|e| e.at(format!("{}:{}", path.display(), line)))?;
            let version = match (requirement.pinned_version(), requirement.specifiers.len()) {
                (Some(version), 1) => version.to_string(),
                _ => {
                    return Err(ManifestError::UnpinnedLockEntry {
                        path: path.to_path_buf(),
                        entry: text,
                    })
                }
            };

            packages
                .entry(requirement.normalized_name())
                .or_default()
                .push(LockedPackage {
                    name: requirement.name,
                    version,
                    dependencies: None,
                    optional_dependencies: BTreeMap::new(),
                    marker: requirement.marker,
                });
        }

        Ok(LockFile {
            kind: LockKind::Requirements,
            path: path.to_path_buf(),
            packages,
        })
    }

    pub fn get(&self, name: &str) -> Option<&[LockedPackage]> {
        self.packages.get(&normalize_name(name)).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.packages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

fn locked_dependency(dep: &UvDependency) -> Result<LockedDependency, ManifestError> {
    Ok(LockedDependency {
        name: dep.name.clone(),
        extras: dep.extra.iter().map(|e| normalize_name(e)).collect(),
        version: dep.version.clone(),
        marker: dep.marker.as_deref().map(Marker::parse).transpose()?,
    })
}

/// Any of the fork's resolution markers selects the entry
fn fork_marker(markers: &[String]) -> Result<Option<Marker>, ManifestError> {
    match markers {
        [] => Ok(None),
        [single] => Marker::parse(single).map(Some),
        several => {
            let joined: Vec<String> = several.iter().map(|m| format!("({})", m)).collect();
            Marker::parse(&joined.join(" or ")).map(Some)
        }
    }
}
