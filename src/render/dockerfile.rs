//! Dockerfile rendering
//!
//! Step order follows the build phase: base image, working directory, OS
//! packages, dependency files plus pinned install, source copy, port, entry.
//! Copying the dependency files before the source keeps the install layer
//! cached across source-only changes.

use crate::descriptor::LaunchDescriptor;
use crate::manifest::InstallSet;
use serde_json::Value;

const CONTINUATION: &str = " \\\n    ";

/// Render `descriptor` with the resolved `install_set` into a Dockerfile
pub fn render_dockerfile(descriptor: &LaunchDescriptor, install_set: &InstallSet) -> String {
    let mut lines = vec![
        "# syntax=docker/dockerfile:1".to_string(),
        format!(
            "# Generated by launchbox. Install set sha256:{} ({} packages)",
            install_set.digest(),
            install_set.len()
        ),
        format!("FROM {}", descriptor.base_image),
        format!("WORKDIR {}", descriptor.workdir),
    ];

    if !descriptor.env.is_empty() {
        let pairs: Vec<String> = descriptor
            .env
            .iter()
            .map(|(key, value)| format!("{}={}", key, quote_env(value)))
            .collect();
        lines.push(format!("ENV {}", pairs.join(CONTINUATION)));
    }

    if !descriptor.system_packages.is_empty() {
        lines.push(
            [
                "RUN apt-get update".to_string(),
                format!(
                    "&& apt-get install -y --no-install-recommends {}",
                    descriptor.system_packages.join(" ")
                ),
                "&& rm -rf /var/lib/apt/lists/*".to_string(),
            ]
            .join(CONTINUATION),
        );
    }

    let mut dependency_files = vec![descriptor.manifest.as_str()];
    if let Some(lock) = &descriptor.lock {
        dependency_files.push(lock.as_str());
    }
    lines.push(format!("COPY {} ./", dependency_files.join(" ")));

    if !install_set.is_empty() {
        let mut parts = vec![if install_set.closed {
            "RUN pip install --no-cache-dir --no-deps".to_string()
        } else {
            "RUN pip install --no-cache-dir".to_string()
        }];
        parts.extend(install_set.requirements());
        lines.push(parts.join(CONTINUATION));
    }

    lines.push(format!(
        "COPY {} {}",
        descriptor.source.from, descriptor.source.to
    ));
    lines.push(format!("EXPOSE {}", descriptor.expose));

    let argv: Vec<String> = descriptor
        .entry
        .argv()
        .into_iter()
        .map(|arg| Value::String(arg).to_string())
        .collect();
    lines.push(format!("CMD [{}]", argv.join(", ")));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Plain values pass through; anything else is double-quoted with `\`, `"`
/// and `$` escaped
fn quote_env(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@,+=%".contains(c));
    if plain {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{AppRef, BindAddress, CopySpec, EntryCommand, ImageRef};
    use crate::manifest::PinnedPackage;
    use std::collections::BTreeMap;

    fn descriptor() -> LaunchDescriptor {
        LaunchDescriptor {
            version: "1.0".to_string(),
            base_image: ImageRef::parse("python:3.11-slim").unwrap(),
            system_packages: vec!["gcc".to_string(), "libpq-dev".to_string()],
            workdir: "/app".to_string(),
            manifest: "pyproject.toml".to_string(),
            lock: Some("uv.lock".to_string()),
            source: CopySpec::default(),
            env: BTreeMap::new(),
            expose: 5000,
            entry: EntryCommand {
                server: "gunicorn".to_string(),
                bind: BindAddress::new("0.0.0.0", 5000),
                app: AppRef::new("main", "app"),
                args: vec![],
            },
        }
    }

    fn install_set(flask: &str) -> InstallSet {
        InstallSet::new(
            vec![
                PinnedPackage {
                    name: "gunicorn".to_string(),
                    version: "21.2.0".to_string(),
                },
                PinnedPackage {
                    name: "flask".to_string(),
                    version: flask.to_string(),
                },
            ],
            true,
        )
    }

    fn position(haystack: &str, needle: &str) -> usize {
        haystack
            .find(needle)
            .unwrap_or_else(|| panic!("missing '{}' in:\n{}", needle, haystack))
    }

    #[test]
    fn test_steps_in_build_order() {
        let dockerfile = render_dockerfile(&descriptor(), &install_set("3.0.0"));
        let order = [
            "FROM python:3.11-slim",
            "WORKDIR /app",
            "apt-get install -y --no-install-recommends gcc libpq-dev",
            "rm -rf /var/lib/apt/lists/*",
            "COPY pyproject.toml uv.lock ./",
            "RUN pip install --no-cache-dir --no-deps",
            "flask==3.0.0",
            "gunicorn==21.2.0",
            "COPY . .",
            "EXPOSE 5000",
            r#"CMD ["gunicorn", "--bind", "0.0.0.0:5000", "main:app"]"#,
        ];
        let positions: Vec<usize> = order.iter().map(|s| position(&dockerfile, s)).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{}", dockerfile);
        assert!(!dockerfile.contains("ENV "));
    }

    #[test]
    fn test_header_carries_digest() {
        let set = install_set("3.0.0");
        let dockerfile = render_dockerfile(&descriptor(), &set);
        assert!(dockerfile.contains(&format!("sha256:{}", set.digest())));
    }

    #[test]
    fn test_deterministic() {
        let a = render_dockerfile(&descriptor(), &install_set("3.0.0"));
        let b = render_dockerfile(&descriptor(), &install_set("3.0.0"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_lock_bump_changes_only_flask() {
        let old = render_dockerfile(&descriptor(), &install_set("3.0.0"));
        let new = render_dockerfile(&descriptor(), &install_set("3.0.3"));
        assert!(new.contains("flask==3.0.3"));
        assert!(!new.contains("flask==3.0.0"));
        assert!(old.contains("flask==3.0.0"));
    }

    #[test]
    fn test_omits_empty_steps() {
        let mut descriptor = descriptor();
        descriptor.system_packages.clear();
        descriptor.lock = None;
        let dockerfile = render_dockerfile(&descriptor, &InstallSet::empty());
        assert!(!dockerfile.contains("apt-get"));
        assert!(!dockerfile.contains("pip install"));
        assert!(dockerfile.contains("COPY pyproject.toml ./"));
    }

    #[test]
    fn test_open_install_set_lets_pip_fetch_dependencies() {
        let set = InstallSet::new(
            vec![PinnedPackage {
                name: "flask".to_string(),
                version: "3.0.0".to_string(),
            }],
            false,
        );
        let dockerfile = render_dockerfile(&descriptor(), &set);
        assert!(dockerfile.contains("RUN pip install --no-cache-dir \\\n    flask==3.0.0"));
        assert!(!dockerfile.contains("--no-deps"));
    }

    #[test]
    fn test_env_quoting() {
        let mut descriptor = descriptor();
        descriptor
            .env
            .insert("PYTHONUNBUFFERED".to_string(), "1".to_string());
        descriptor
            .env
            .insert("GREETING".to_string(), "hello \"world\" $HOME".to_string());
        let dockerfile = render_dockerfile(&descriptor, &InstallSet::empty());
        assert!(dockerfile.contains(r#"ENV GREETING="hello \"world\" \$HOME""#));
        assert!(dockerfile.contains("PYTHONUNBUFFERED=1"));
    }
}
