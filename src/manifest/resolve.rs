//! Matching a manifest against its lock file
//!
//! The result is an [`InstallSet`]: the exact `name==version` list that goes
//! into the image. Every declared dependency must be present in the lock at a
//! version its specifiers accept; nothing is ever installed unpinned.

use super::error::ResolveError;
use super::files::Manifest;
use super::lock::{LockFile, LockedDependency, LockedPackage};
use super::marker::MarkerEnv;
use super::requirement::{normalize_name, Requirement};
use super::version::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use tracing::debug;

/// A package at one exact version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedPackage {
    pub name: String,
    pub version: String,
}

impl fmt::Display for PinnedPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.name, self.version)
    }
}

/// Exact set of packages to install, sorted by normalized name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallSet {
    pub packages: Vec<PinnedPackage>,
    /// True when the set already contains every transitive dependency
    pub closed: bool,
}

impl InstallSet {
    pub fn new(packages: Vec<PinnedPackage>, closed: bool) -> Self {
        let mut by_name: BTreeMap<String, PinnedPackage> = BTreeMap::new();
        for package in packages {
            by_name.insert(normalize_name(&package.name), package);
        }
        Self {
            packages: by_name.into_values().collect(),
            closed,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), true)
    }

    pub fn get(&self, name: &str) -> Option<&PinnedPackage> {
        let wanted = normalize_name(name);
        self.packages
            .iter()
            .find(|p| normalize_name(&p.name) == wanted)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// `name==version` strings, in install order
    pub fn requirements(&self) -> Vec<String> {
        self.packages.iter().map(|p| p.to_string()).collect()
    }

    /// SHA-256 over the normalized `name==version` lines
    ///
    /// Equal digests mean equal installed dependency sets, whatever the
    /// spelling of the names in the manifest or lock.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for package in &self.packages {
            hasher.update(normalize_name(&package.name).as_bytes());
            hasher.update(b"==");
            hasher.update(package.version.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

pub struct Resolver {
    env: MarkerEnv,
}

impl Resolver {
    pub fn new(env: MarkerEnv) -> Self {
        Self { env }
    }

    pub fn env(&self) -> &MarkerEnv {
        &self.env
    }

    /// Resolve against a lock when one exists; without one, fall back to
    /// exact manifest pins only when `require_lock` is off
    pub fn resolve_with(
        &self,
        manifest: &Manifest,
        lock: Option<&LockFile>,
        require_lock: bool,
    ) -> Result<InstallSet, ResolveError> {
        match lock {
            Some(lock) => self.resolve(manifest, lock),
            None if require_lock => Err(ResolveError::MissingLock),
            None => self.resolve_pinned(manifest),
        }
    }

    pub fn resolve(&self, manifest: &Manifest, lock: &LockFile) -> Result<InstallSet, ResolveError> {
        let direct = self.applicable(manifest)?;
        let mut selected: BTreeMap<String, &LockedPackage> = BTreeMap::new();
        // (package, extras requested on it)
        let mut queue: VecDeque<(String, BTreeSet<String>)> = VecDeque::new();

        for (name, requirements) in &direct {
            let package = self.pick(lock, name, None)?;
            let version = parse_locked(package)?;
            for requirement in requirements {
                check_specifiers(requirement, &version)?;
            }
            selected.insert(name.clone(), package);

            let extras = requirements
                .iter()
                .flat_map(|r| r.extras.iter())
                .map(|e| normalize_name(e))
                .collect();
            queue.push_back((name.clone(), extras));
        }

        let has_graph = lock
            .packages
            .values()
            .flatten()
            .all(|p| p.dependencies.is_some());

        if has_graph {
            let mut activated: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            while let Some((name, extras)) = queue.pop_front() {
                let current: &LockedPackage = selected[&name];
                let first_visit = !activated.contains_key(&name);
                let done = activated.entry(name.clone()).or_default();
                let new_extras: Vec<String> =
                    extras.into_iter().filter(|e| done.insert(e.clone())).collect();

                let mut edges: Vec<&LockedDependency> = Vec::new();
                if first_visit {
                    edges.extend(current.dependencies.as_deref().unwrap_or_default());
                }
                for extra in &new_extras {
                    match current.optional_dependencies.get(extra) {
                        Some(deps) => edges.extend(deps),
                        None => debug!(package = %current.name, extra = %extra, "Lock records no dependencies for extra"),
                    }
                }

                for edge in edges {
                    if edge.marker.as_ref().is_some_and(|m| !m.evaluate(&self.env)) {
                        continue;
                    }
                    let dep_name = normalize_name(&edge.name);
                    if !selected.contains_key(&dep_name) {
                        let package = self.pick(lock, &dep_name, edge.version.as_deref())?;
                        parse_locked(package)?;
                        selected.insert(dep_name.clone(), package);
                    }
                    queue.push_back((dep_name, edge.extras.iter().cloned().collect()));
                }
            }
        } else {
            for name in lock.packages.keys() {
                if selected.contains_key(name) {
                    continue;
                }
                match self.pick(lock, name, None) {
                    Ok(package) => {
                        parse_locked(package)?;
                        selected.insert(name.clone(), package);
                    }
                    // every entry excluded by its marker
                    Err(ResolveError::Unlocked { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        debug!(
            direct = direct.len(),
            total = selected.len(),
            lock = %lock.path.display(),
            "Resolved install set"
        );

        Ok(InstallSet::new(
            selected
                .values()
                .map(|p| PinnedPackage {
                    name: p.name.clone(),
                    version: p.version.clone(),
                })
                .collect(),
            true,
        ))
    }

    /// Resolve a manifest whose every applicable dependency is an exact pin
    pub fn resolve_pinned(&self, manifest: &Manifest) -> Result<InstallSet, ResolveError> {
        let mut packages = Vec::new();

        for (name, requirements) in self.applicable(manifest)? {
            let pinned = requirements
                .iter()
                .find_map(|r| r.pinned_version())
                .ok_or_else(|| ResolveError::Unpinned { name: name.clone() })?;
            let version: Version = pinned
                .parse()
                .map_err(|_| ResolveError::InvalidLockedVersion {
                    name: name.clone(),
                    version: pinned.to_string(),
                })?;
            for requirement in &requirements {
                check_specifiers(requirement, &version)?;
            }
            packages.push(PinnedPackage {
                name: requirements[0].name.clone(),
                version: pinned.to_string(),
            });
        }

        Ok(InstallSet::new(packages, false))
    }

    /// Manifest dependencies that apply to the target environment, grouped
    /// by normalized name
    fn applicable<'m>(
        &self,
        manifest: &'m Manifest,
    ) -> Result<BTreeMap<String, Vec<&'m Requirement>>, ResolveError> {
        let mut grouped: BTreeMap<String, Vec<&Requirement>> = BTreeMap::new();
        for requirement in &manifest.dependencies {
            if let Some(marker) = &requirement.marker {
                if !marker.evaluate(&self.env) {
                    debug!(dependency = %requirement.name, marker = %marker, "Skipping dependency excluded by marker");
                    continue;
                }
            }
            if requirement.url.is_some() {
                return Err(ResolveError::DirectUrl {
                    name: requirement.name.clone(),
                });
            }
            grouped
                .entry(requirement.normalized_name())
                .or_default()
                .push(requirement);
        }
        Ok(grouped)
    }

    /// The single lock entry for `name` that applies to the environment,
    /// narrowed to `version` when the referring edge names one
    fn pick<'l>(
        &self,
        lock: &'l LockFile,
        name: &str,
        version: Option<&str>,
    ) -> Result<&'l LockedPackage, ResolveError> {
        let candidates: Vec<&LockedPackage> = lock
            .get(name)
            .unwrap_or_default()
            .iter()
            .filter(|p| p.marker.as_ref().map_or(true, |m| m.evaluate(&self.env)))
            .filter(|p| version.map_or(true, |v| p.version == v))
            .collect();

        let versions: BTreeSet<&str> = candidates.iter().map(|p| p.version.as_str()).collect();
        match versions.len() {
            0 => Err(ResolveError::Unlocked {
                name: name.to_string(),
            }),
            1 => Ok(candidates[0]),
            _ => Err(ResolveError::AmbiguousLock {
                name: name.to_string(),
                versions: versions.into_iter().map(str::to_string).collect(),
            }),
        }
    }
}

fn parse_locked(package: &LockedPackage) -> Result<Version, ResolveError> {
    package
        .version
        .parse()
        .map_err(|_| ResolveError::InvalidLockedVersion {
            name: package.name.clone(),
            version: package.version.clone(),
        })
}

fn check_specifiers(requirement: &Requirement, version: &Version) -> Result<(), ResolveError> {
    match requirement.specifiers.iter().find(|s| !s.contains(version)) {
        Some(failed) => Err(ResolveError::Unsatisfied {
            name: requirement.name.clone(),
            version: version.to_string(),
            specifier: failed.to_string(),
        }),
        None => Ok(()),
    }
}
