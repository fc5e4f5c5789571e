//! Command handlers
//!
//! Each handler logs its own failure and returns the process exit code.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::commands::{DetectArgs, LaunchArgs, LockArgs, ProbeArgs, RenderArgs, ValidateArgs};
use super::output::{LockReport, OutputFormat, OutputFormatter};
use crate::config::LaunchboxConfig;
use crate::descriptor::LaunchDescriptor;
use crate::detect::{marker_env_for_image, Detector, DetectorConfig};
use crate::fs::RealFileSystem;
use crate::launch::{probe, LaunchOptions, Launcher, ProbeOptions};
use crate::manifest::{discover, load, InstallSet, Resolver, Sources};
use crate::render::render_dockerfile;
use crate::validation::Validator;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

fn exit_with(result: Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            EXIT_FAILURE
        }
    }
}

fn current_dir_or(path: Option<&PathBuf>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path.clone()),
        None => std::env::current_dir().context("Failed to determine current directory"),
    }
}

/// Application root for a descriptor: `--source`, else the descriptor's directory
fn source_root(descriptor_path: &Path, source: Option<&PathBuf>) -> PathBuf {
    if let Some(source) = source {
        return source.clone();
    }
    descriptor_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn emit(content: &str, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Wrote output");
        }
        None if content.ends_with('\n') => print!("{}", content),
        None => println!("{}", content),
    }
    Ok(())
}

fn load_descriptor(path: &Path) -> Result<LaunchDescriptor> {
    let descriptor = LaunchDescriptor::load(path)
        .with_context(|| format!("Failed to load descriptor {}", path.display()))?;
    debug!(path = %path.display(), "Loaded descriptor");
    Ok(descriptor)
}

/// Load the descriptor's manifest and lock from `root` and resolve them
fn resolve_descriptor(
    descriptor: &LaunchDescriptor,
    root: &Path,
    config: &LaunchboxConfig,
) -> Result<(Sources, InstallSet)> {
    let fs = RealFileSystem::new();
    let sources = load(&fs, root, &descriptor.manifest, descriptor.lock.as_deref())?;
    let resolver = Resolver::new(marker_env_for_image(&descriptor.base_image));
    let install_set = resolver
        .resolve_with(&sources.manifest, sources.lock.as_ref(), config.require_lock)
        .with_context(|| format!("Failed to resolve dependencies of {}", sources.manifest_file))?;
    Ok((sources, install_set))
}

pub fn handle_detect(args: &DetectArgs, config: &LaunchboxConfig) -> i32 {
    exit_with(run_detect(args, config))
}

fn run_detect(args: &DetectArgs, config: &LaunchboxConfig) -> Result<i32> {
    let root = current_dir_or(args.path.as_ref())?;
    let detector = Detector::with_config(Arc::new(RealFileSystem::new()), DetectorConfig::from(config));
    let detection = detector.detect(&root)?;

    for note in detection.warnings() {
        warn!("{}", note.message);
    }

    let format = OutputFormat::from(args.format);
    let install_set = if format == OutputFormat::Dockerfile {
        let resolver = Resolver::new(detection.marker_env());
        let sources = &detection.sources;
        Some(
            resolver
                .resolve_with(&sources.manifest, sources.lock.as_ref(), config.require_lock)
                .with_context(|| {
                    format!("Failed to resolve dependencies of {}", sources.manifest_file)
                })?,
        )
    } else {
        None
    };

    let output = OutputFormatter::new(format).format_detection(&detection, install_set.as_ref())?;
    emit(&output, args.output.as_ref())?;
    Ok(EXIT_SUCCESS)
}

pub fn handle_lock(args: &LockArgs, config: &LaunchboxConfig) -> i32 {
    exit_with(run_lock(args, config))
}

fn run_lock(args: &LockArgs, config: &LaunchboxConfig) -> Result<i32> {
    let root = current_dir_or(args.path.as_ref())?;
    let sources = discover(&RealFileSystem::new(), &root)?;

    // Without a descriptor the target interpreter is whatever detection picks
    let detector = Detector::with_config(Arc::new(RealFileSystem::new()), DetectorConfig::from(config));
    let env = match detector.detect(&root) {
        Ok(detection) => detection.marker_env(),
        Err(e) => {
            debug!(error = %e, "Detection failed; using the default interpreter for markers");
            crate::detect::marker_env_for_python(crate::detect::DEFAULT_PYTHON_VERSION)
        }
    };

    let install_set = Resolver::new(env)
        .resolve_with(&sources.manifest, sources.lock.as_ref(), config.require_lock)
        .with_context(|| format!("Failed to resolve dependencies of {}", sources.manifest_file))?;
    info!(
        packages = install_set.len(),
        digest = %install_set.digest(),
        "Resolved install set"
    );

    let report = LockReport::new(&sources, &install_set);
    let output = OutputFormatter::new(args.format.into()).format_lock(&report)?;
    emit(&output, None)?;
    Ok(EXIT_SUCCESS)
}

pub fn handle_render(args: &RenderArgs, config: &LaunchboxConfig) -> i32 {
    exit_with(run_render(args, config))
}

fn run_render(args: &RenderArgs, config: &LaunchboxConfig) -> Result<i32> {
    let descriptor = load_descriptor(&args.descriptor)?;
    Validator::for_config(config).validate(&descriptor)?;

    let root = source_root(&args.descriptor, args.source.as_ref());
    let (_, install_set) = resolve_descriptor(&descriptor, &root, config)?;

    emit(&render_dockerfile(&descriptor, &install_set), args.output.as_ref())?;
    Ok(EXIT_SUCCESS)
}

pub fn handle_validate(args: &ValidateArgs, config: &LaunchboxConfig, quiet: bool) -> i32 {
    exit_with(run_validate(args, config, quiet))
}

fn run_validate(args: &ValidateArgs, config: &LaunchboxConfig, quiet: bool) -> Result<i32> {
    let descriptor = load_descriptor(&args.descriptor)?;
    Validator::for_config(config).validate(&descriptor)?;

    let root = source_root(&args.descriptor, args.source.as_ref());
    let (_, install_set) = resolve_descriptor(&descriptor, &root, config)?;

    if !quiet {
        println!(
            "\u{2713} {} is valid ({} packages, sha256:{})",
            args.descriptor.display(),
            install_set.len(),
            install_set.digest()
        );
    }
    Ok(EXIT_SUCCESS)
}

pub async fn handle_launch(args: &LaunchArgs, config: &LaunchboxConfig) -> i32 {
    exit_with(run_launch(args, config).await)
}

async fn run_launch(args: &LaunchArgs, config: &LaunchboxConfig) -> Result<i32> {
    let descriptor = load_descriptor(&args.descriptor)?;
    Validator::for_config(config).validate(&descriptor)?;

    let startup_timeout = match args.startup_timeout {
        Some(secs) => Duration::from_secs(secs),
        None => config.startup_timeout(),
    };
    let options = LaunchOptions {
        workdir: source_root(&args.descriptor, args.source.as_ref()),
        startup_timeout,
        probe: args.probe.as_ref().map(|path| ProbeOptions {
            path: path.clone(),
            timeout: config.probe_timeout(),
        }),
        check_port: true,
    };

    let report = Launcher::new(descriptor, options).run().await?;
    if let Some(outcome) = &report.probe {
        if !outcome.is_healthy() {
            warn!(outcome = %outcome, "Entry process did not pass the liveness probe");
        }
    }
    Ok(report.exit_code)
}

pub async fn handle_probe(args: &ProbeArgs, config: &LaunchboxConfig) -> i32 {
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.probe_timeout());
    let outcome = probe(&args.url, timeout).await;
    println!("{}: {}", args.url, outcome);
    if outcome.is_healthy() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_root_defaults_to_descriptor_dir() {
        assert_eq!(
            source_root(Path::new("/srv/app/launch.yaml"), None),
            PathBuf::from("/srv/app")
        );
        assert_eq!(source_root(Path::new("launch.yaml"), None), PathBuf::from("."));
    }

    #[test]
    fn test_source_root_override() {
        let source = PathBuf::from("/elsewhere");
        assert_eq!(
            source_root(Path::new("/srv/app/launch.yaml"), Some(&source)),
            source
        );
    }

    #[test]
    fn test_exit_with_error() {
        assert_eq!(exit_with(Ok(7)), 7);
        assert_eq!(exit_with(Err(anyhow::anyhow!("boom"))), EXIT_FAILURE);
    }
}
