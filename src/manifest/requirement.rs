//! PEP 508 dependency specifications

use super::error::ManifestError;
use super::marker::Marker;
use super::version::{parse_specifiers, Specifier};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?").expect("valid regex")
    })
}

fn extra_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?$").expect("valid regex")
    })
}

/// PEP 503 normalized project name (`Flask_SQLAlchemy` -> `flask-sqlalchemy`)
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            pending_sep = true;
        } else {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        }
    }
    out
}

/// A single declared dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub extras: Vec<String>,
    pub specifiers: Vec<Specifier>,
    pub marker: Option<Marker>,
    pub url: Option<String>,
}

impl Requirement {
    pub fn parse(input: &str) -> Result<Self, ManifestError> {
        let text = input.trim();
        let invalid = |reason: &str| ManifestError::InvalidRequirement {
            input: text.to_string(),
            reason: reason.to_string(),
        };

        let name = name_regex()
            .find(text)
            .ok_or_else(|| invalid("missing or malformed project name"))?
            .as_str()
            .to_string();
        let mut rest = text[name.len()..].trim_start();

        let mut extras = Vec::new();
        if let Some(after) = rest.strip_prefix('[') {
            let close = after
                .find(']')
                .ok_or_else(|| invalid("unclosed extras bracket"))?;
            for extra in after[..close].split(',').map(str::trim) {
                if extra.is_empty() && after[..close].trim().is_empty() {
                    continue;
                }
                if !extra_regex().is_match(extra) {
                    return Err(invalid("malformed extra name"));
                }
                extras.push(extra.to_string());
            }
            rest = after[close + 1..].trim_start();
        }

        let mut url = None;
        let mut specifiers = Vec::new();
        let marker_text;

        if let Some(after_at) = rest.strip_prefix('@') {
            let after_at = after_at.trim_start();
            // a URL may itself contain ';', so the marker must be preceded by whitespace
            let (url_part, marker_part) = match after_at.find(" ;") {
                Some(idx) => (&after_at[..idx], Some(&after_at[idx + 2..])),
                None => (after_at, None),
            };
            let url_part = url_part.trim();
            if url_part.is_empty() {
                return Err(invalid("missing URL after '@'"));
            }
            url = Some(url_part.to_string());
            marker_text = marker_part;
        } else {
            let (spec_part, marker_part) = match rest.find(';') {
                Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
                None => (rest, None),
            };
            let mut spec_part = spec_part.trim();
            if let Some(inner) = spec_part.strip_prefix('(') {
                spec_part = inner
                    .strip_suffix(')')
                    .ok_or_else(|| invalid("unbalanced parenthesis around version specifiers"))?
                    .trim();
            } else if spec_part.ends_with(')') {
                return Err(invalid("unbalanced parenthesis around version specifiers"));
            }
            if !spec_part.is_empty() {
                specifiers = parse_specifiers(spec_part).map_err(|e| e.at(text))?;
            }
            marker_text = marker_part;
        }

        let marker = match marker_text {
            Some(m) if m.trim().is_empty() => return Err(invalid("empty environment marker")),
            Some(m) => Some(Marker::parse(m)?),
            None => None,
        };

        Ok(Requirement {
            name,
            extras,
            specifiers,
            marker,
            url,
        })
    }

    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    /// True when the requirement names exactly one version (`name==X`)
    pub fn is_pinned(&self) -> bool {
        self.url.is_none() && self.specifiers.iter().any(Specifier::is_exact_pin)
    }

    /// The pinned version, when [`Requirement::is_pinned`] holds
    pub fn pinned_version(&self) -> Option<&str> {
        if self.url.is_some() {
            return None;
        }
        self.specifiers
            .iter()
            .find(|s| s.is_exact_pin())
            .map(Specifier::raw_version)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            write!(f, "[{}]", self.extras.join(","))?;
        }
        if let Some(url) = &self.url {
            write!(f, " @ {}", url)?;
        } else {
            let specs: Vec<String> = self.specifiers.iter().map(|s| s.to_string()).collect();
            write!(f, "{}", specs.join(","))?;
        }
        if let Some(marker) = &self.marker {
            write!(f, "; {}", marker)?;
        }
        Ok(())
    }
}
