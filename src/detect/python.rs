//! Static inspection of Python sources
//!
//! Nothing is imported or executed; module-level assignments and imports
//! are matched line by line.

use crate::descriptor::AppRef;
use crate::manifest::{parse_specifiers, Manifest, Operator};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

pub const DEFAULT_PYTHON_VERSION: &str = "3.11";

/// Module files tried first when looking for the WSGI callable
pub const PREFERRED_MODULES: &[&str] = &["main", "app", "wsgi", "application"];

/// Where the Python version was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    PythonVersionFile,
    RuntimeTxt,
    RequiresPython,
    Default,
}

impl VersionSource {
    pub fn describe(self) -> &'static str {
        match self {
            VersionSource::PythonVersionFile => ".python-version",
            VersionSource::RuntimeTxt => "runtime.txt",
            VersionSource::RequiresPython => "requires-python",
            VersionSource::Default => "default",
        }
    }
}

fn major_minor_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|[^0-9])(3)\.(\d{1,2})(?:[^0-9]|$)").expect("valid regex"))
}

/// `X.Y` from `.python-version` or `runtime.txt` content (`3.11.4`, `python-3.12`)
pub fn normalize_python_version(text: &str) -> Option<String> {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let caps = major_minor_regex().captures(first)?;
    Some(format!("{}.{}", &caps[1], &caps[2]))
}

/// Lowest `X.Y` admitted by a `requires-python` specifier set
pub fn requires_python_version(requires: &str) -> Option<String> {
    let specifiers = parse_specifiers(requires).ok()?;
    specifiers
        .iter()
        .filter(|s| {
            matches!(
                s.operator(),
                Operator::GreaterEqual
                    | Operator::Compatible
                    | Operator::Equal
                    | Operator::Arbitrary
            )
        })
        .filter_map(|s| s.version())
        .filter(|v| v.release().len() >= 2)
        .max()
        .map(|v| v.major_minor())
}

pub fn resolve_python_version(
    python_version_file: Option<&str>,
    runtime_txt: Option<&str>,
    manifest: &Manifest,
) -> (String, VersionSource) {
    if let Some(version) = python_version_file.and_then(normalize_python_version) {
        return (version, VersionSource::PythonVersionFile);
    }
    if let Some(version) = runtime_txt.and_then(normalize_python_version) {
        return (version, VersionSource::RuntimeTxt);
    }
    if let Some(version) = manifest
        .requires_python
        .as_deref()
        .and_then(requires_python_version)
    {
        return (version, VersionSource::RequiresPython);
    }
    (DEFAULT_PYTHON_VERSION.to_string(), VersionSource::Default)
}

fn wsgi_assignment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(?:flask\.)?(?:Flask\s*\(|get_wsgi_application\s*\()")
            .expect("valid regex")
    })
}

fn app_import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^from\s+[A-Za-z_.][A-Za-z0-9_.]*\s+import\s+(?:[^#\n]*[\s,(])?(app|application)\b")
            .expect("valid regex")
    })
}

fn factory_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^def\s+(create_app|make_app)\s*\(").expect("valid regex"))
}

/// WSGI callable defined, or imported, at module level in `content`
pub fn find_app_object(content: &str) -> Option<String> {
    if let Some(caps) = wsgi_assignment_regex().captures(content) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = app_import_regex().captures(content) {
        return Some(caps[1].to_string());
    }
    factory_regex()
        .captures(content)
        .map(|caps| format!("{}()", &caps[1]))
}

/// Order module stems: preferred names first, then alphabetical
pub fn module_priority(stems: &[String]) -> Vec<String> {
    let mut ordered: Vec<String> = PREFERRED_MODULES
        .iter()
        .filter(|m| stems.iter().any(|s| s == *m))
        .map(|m| m.to_string())
        .collect();
    let mut rest: Vec<String> = stems
        .iter()
        .filter(|s| !PREFERRED_MODULES.contains(&s.as_str()))
        .cloned()
        .collect();
    rest.sort();
    ordered.extend(rest);
    ordered
}

/// First module, in priority order, exposing a WSGI callable
pub fn find_app<'a>(modules: impl IntoIterator<Item = (&'a str, &'a str)>) -> Option<AppRef> {
    modules.into_iter().find_map(|(module, content)| {
        find_app_object(content).map(|object| AppRef::new(module, object))
    })
}

fn run_port_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.run\([^)]*\bport\s*=\s*(\d{1,5})").expect("valid regex"))
}

fn port_constant_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*PORT\s*=\s*[^\n#]*?(\d{2,5})").expect("valid regex"))
}

/// Port from `app.run(..., port=N)` or a `PORT = ...` constant
pub fn find_port(content: &str) -> Option<u16> {
    let found = run_port_regex()
        .captures(content)
        .or_else(|| port_constant_regex().captures(content))?;
    found[1].parse::<u16>().ok().filter(|p| *p != 0)
}

fn env_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"os\.(?:environ\.get\s*\(|getenv\s*\(|environ\s*\[)\s*['"]([A-Za-z_][A-Za-z0-9_]*)['"]"#,
        )
        .expect("valid regex")
    })
}

/// Environment variable names read through `os.environ` / `os.getenv`
pub fn find_env_vars(content: &str) -> BTreeSet<String> {
    env_var_regex()
        .captures_iter(content)
        .map(|caps| caps[1].to_string())
        .collect()
}
