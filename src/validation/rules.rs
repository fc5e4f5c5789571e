use crate::descriptor::LaunchDescriptor;
use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, descriptor: &LaunchDescriptor) -> Result<()>;
}

pub struct RequiredFieldsRule;

impl ValidationRule for RequiredFieldsRule {
    fn name(&self) -> &'static str {
        "RequiredFields"
    }

    fn validate(&self, descriptor: &LaunchDescriptor) -> Result<()> {
        if descriptor.version.trim().is_empty() {
            anyhow::bail!("Version cannot be empty");
        }
        if descriptor.base_image.repository.is_empty() {
            anyhow::bail!("Base image cannot be empty");
        }
        if descriptor.manifest.trim().is_empty() {
            anyhow::bail!("Manifest path cannot be empty");
        }
        if descriptor.workdir.trim().is_empty() {
            anyhow::bail!("Workdir cannot be empty");
        }
        if descriptor.source.from.is_empty() || descriptor.source.to.is_empty() {
            anyhow::bail!("Source copy 'from' and 'to' paths cannot be empty");
        }
        if descriptor.entry.server.trim().is_empty() {
            anyhow::bail!("Entry server cannot be empty");
        }
        Ok(())
    }
}

pub struct PinnedBaseImageRule;

impl ValidationRule for PinnedBaseImageRule {
    fn name(&self) -> &'static str {
        "PinnedBaseImage"
    }

    fn validate(&self, descriptor: &LaunchDescriptor) -> Result<()> {
        if !descriptor.base_image.is_pinned() {
            anyhow::bail!(
                "Base image '{}' must be pinned to a version tag or digest",
                descriptor.base_image
            );
        }
        Ok(())
    }
}

pub struct PortConsistencyRule;

impl ValidationRule for PortConsistencyRule {
    fn name(&self) -> &'static str {
        "PortConsistency"
    }

    fn validate(&self, descriptor: &LaunchDescriptor) -> Result<()> {
        if descriptor.expose != descriptor.entry.bind.port {
            anyhow::bail!(
                "Exposed port {} does not match bind address {}",
                descriptor.expose,
                descriptor.entry.bind
            );
        }
        Ok(())
    }
}

pub struct ValidAppRefRule;

impl ValidationRule for ValidAppRefRule {
    fn name(&self) -> &'static str {
        "ValidAppRef"
    }

    fn validate(&self, descriptor: &LaunchDescriptor) -> Result<()> {
        if let Err(reason) = descriptor.entry.app.check() {
            anyhow::bail!("Entry app '{}': {}", descriptor.entry.app, reason);
        }
        Ok(())
    }
}

fn debian_package_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9+.-]+$").expect("valid regex"))
}

pub struct ValidPackageNamesRule;

impl ValidationRule for ValidPackageNamesRule {
    fn name(&self) -> &'static str {
        "ValidPackageNames"
    }

    fn validate(&self, descriptor: &LaunchDescriptor) -> Result<()> {
        for (i, package) in descriptor.system_packages.iter().enumerate() {
            if !debian_package_regex().is_match(package) {
                anyhow::bail!("System package [{}] '{}' is not a valid package name", i, package);
            }
        }
        Ok(())
    }
}

pub struct LockPresentRule;

impl ValidationRule for LockPresentRule {
    fn name(&self) -> &'static str {
        "LockPresent"
    }

    fn validate(&self, descriptor: &LaunchDescriptor) -> Result<()> {
        match descriptor.lock.as_deref() {
            Some(lock) if !lock.trim().is_empty() => Ok(()),
            _ => anyhow::bail!("A lock file is required but none is declared"),
        }
    }
}
