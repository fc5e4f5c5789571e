//! PEP 440 versions and version specifiers
//!
//! Only what lock verification needs: parsing, total ordering and
//! specifier matching. Pre-releases are never filtered out here because the
//! lock file, not the specifier, decides which version gets installed.

use super::error::ManifestError;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^v?(?:(?P<epoch>\d+)!)?(?P<release>\d+(?:\.\d+)*)(?:[-_.]?(?P<pre_l>alpha|beta|preview|pre|rc|a|b|c)[-_.]?(?P<pre_n>\d+)?)?(?:-(?P<post_n1>\d+)|[-_.]?(?P<post_l>post|rev|r)[-_.]?(?P<post_n2>\d+)?)?(?:[-_.]?(?P<dev_l>dev)[-_.]?(?P<dev_n>\d+)?)?(?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?$",
        )
        .expect("valid regex")
    })
}

/// Pre-release phase, ordered alpha < beta < release candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreRelease {
    Alpha,
    Beta,
    Rc,
}

impl PreRelease {
    fn as_str(self) -> &'static str {
        match self {
            PreRelease::Alpha => "a",
            PreRelease::Beta => "b",
            PreRelease::Rc => "rc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum LocalSegment {
    Text(String),
    Number(u64),
}

/// A parsed PEP 440 version
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PreRelease, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Option<Vec<LocalSegment>>,
}

impl Version {
    /// A final release such as `3.11` from its numeric components
    pub fn from_release(release: Vec<u64>) -> Self {
        Version {
            epoch: 0,
            release,
            pre: None,
            post: None,
            dev: None,
            local: None,
        }
    }

    pub fn release(&self) -> &[u64] {
        &self.release
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    pub fn is_postrelease(&self) -> bool {
        self.post.is_some()
    }

    /// Copy of this version with the local label removed
    pub fn public(&self) -> Version {
        Version {
            local: None,
            ..self.clone()
        }
    }

    /// `X.Y` of the release segment, padding a missing minor with zero
    pub fn major_minor(&self) -> String {
        format!(
            "{}.{}",
            self.release.first().copied().unwrap_or(0),
            self.release.get(1).copied().unwrap_or(0)
        )
    }

    fn release_trimmed(&self) -> &[u64] {
        let end = self
            .release
            .iter()
            .rposition(|&n| n != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.release[..end]
    }

    fn same_release(&self, other: &Version) -> bool {
        self.epoch == other.epoch && self.release_trimmed() == other.release_trimmed()
    }

    /// Release segment padded with zeros to at least `len` components
    fn padded_release(&self, len: usize) -> Vec<u64> {
        let mut release = self.release.clone();
        while release.len() < len {
            release.push(0);
        }
        release
    }

    fn sort_key(&self) -> (u64, &[u64], (u8, u64), Option<u64>, (u8, u64)) {
        let pre = match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => (0, 0),
            (Some((phase, n)), _, _) => (1 + phase as u8, n),
            (None, _, _) => (u8::MAX, 0),
        };
        let dev = match self.dev {
            Some(n) => (0, n),
            None => (1, 0),
        };
        (self.epoch, self.release_trimmed(), pre, self.post, dev)
    }
}

impl FromStr for Version {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let caps = version_regex()
            .captures(&normalized)
            .ok_or_else(|| ManifestError::InvalidVersion(s.trim().to_string()))?;

        let number = |name: &str| -> Result<Option<u64>, ManifestError> {
            caps.name(name)
                .map(|m| {
                    m.as_str()
                        .parse::<u64>()
                        .map_err(|_| ManifestError::InvalidVersion(s.trim().to_string()))
                })
                .transpose()
        };

        let release = caps["release"]
            .split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| ManifestError::InvalidVersion(s.trim().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pre = match caps.name("pre_l").map(|m| m.as_str()) {
            Some(label) => {
                let phase = match label {
                    "a" | "alpha" => PreRelease::Alpha,
                    "b" | "beta" => PreRelease::Beta,
                    _ => PreRelease::Rc,
                };
                Some((phase, number("pre_n")?.unwrap_or(0)))
            }
            None => None,
        };

        let post = if caps.name("post_n1").is_some() {
            number("post_n1")?
        } else if caps.name("post_l").is_some() {
            Some(number("post_n2")?.unwrap_or(0))
        } else {
            None
        };

        let dev = if caps.name("dev_l").is_some() {
            Some(number("dev_n")?.unwrap_or(0))
        } else {
            None
        };

        let local = caps.name("local").map(|m| {
            m.as_str()
                .split(['-', '_', '.'])
                .map(|seg| match seg.parse::<u64>() {
                    Ok(n) => LocalSegment::Number(n),
                    Err(_) => LocalSegment::Text(seg.to_string()),
                })
                .collect()
        });

        Ok(Version {
            epoch: number("epoch")?.unwrap_or(0),
            release,
            pre,
            post,
            dev,
            local,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(|n| n.to_string()).collect();
        write!(f, "{}", release.join("."))?;
        if let Some((phase, n)) = self.pre {
            write!(f, "{}{}", phase.as_str(), n)?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{}", n)?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{}", n)?;
        }
        if let Some(local) = &self.local {
            let parts: Vec<String> = local
                .iter()
                .map(|seg| match seg {
                    LocalSegment::Text(t) => t.clone(),
                    LocalSegment::Number(n) => n.to_string(),
                })
                .collect();
            write!(f, "+{}", parts.join("."))?;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// Comparison operator of a version specifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
    Less,
    Greater,
    Compatible,
    Arbitrary,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::LessEqual => "<=",
            Operator::GreaterEqual => ">=",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::Compatible => "~=",
            Operator::Arbitrary => "===",
        }
    }

    /// Longest operator first so `===` is not read as `==`
    const ALL: [Operator; 8] = [
        Operator::Arbitrary,
        Operator::Compatible,
        Operator::Equal,
        Operator::NotEqual,
        Operator::LessEqual,
        Operator::GreaterEqual,
        Operator::Less,
        Operator::Greater,
    ];
}

/// A single clause such as `>=2.0`, `==3.0.*` or `~=1.4.2`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    op: Operator,
    raw: String,
    version: Option<Version>,
    wildcard: bool,
}

impl Specifier {
    pub fn operator(&self) -> Operator {
        self.op
    }

    /// The version part exactly as written
    pub fn raw_version(&self) -> &str {
        &self.raw
    }

    /// True for `==X` without wildcard: the only form that pins a version
    pub fn is_exact_pin(&self) -> bool {
        self.op == Operator::Equal && !self.wildcard
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn contains(&self, candidate: &Version) -> bool {
        let Some(spec) = &self.version else {
            return self.raw.eq_ignore_ascii_case(&candidate.to_string());
        };

        match self.op {
            Operator::Equal if self.wildcard => self.prefix_matches(spec, candidate),
            Operator::NotEqual if self.wildcard => !self.prefix_matches(spec, candidate),
            Operator::Equal => Self::equal(spec, candidate),
            Operator::NotEqual => !Self::equal(spec, candidate),
            Operator::LessEqual => candidate.public() <= *spec,
            Operator::GreaterEqual => candidate.public() >= *spec,
            Operator::Less => {
                let candidate = candidate.public();
                candidate < *spec
                    && !(!spec.is_prerelease()
                        && candidate.is_prerelease()
                        && candidate.same_release(spec))
            }
            Operator::Greater => {
                let candidate = candidate.public();
                candidate > *spec
                    && !(!spec.is_postrelease()
                        && candidate.is_postrelease()
                        && candidate.same_release(spec))
            }
            Operator::Compatible => {
                let prefix_len = spec.release.len() - 1;
                candidate.public() >= *spec
                    && candidate.epoch == spec.epoch
                    && candidate.padded_release(prefix_len)[..prefix_len]
                        == spec.release[..prefix_len]
            }
            Operator::Arbitrary => unreachable!("arbitrary equality has no parsed version"),
        }
    }

    fn equal(spec: &Version, candidate: &Version) -> bool {
        if spec.local.is_some() {
            candidate == spec
        } else {
            candidate.public() == *spec
        }
    }

    fn prefix_matches(&self, spec: &Version, candidate: &Version) -> bool {
        let len = spec.release.len();
        candidate.epoch == spec.epoch && candidate.padded_release(len)[..len] == spec.release[..]
    }
}

impl FromStr for Specifier {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = |reason: &str| ManifestError::InvalidSpecifier {
            input: trimmed.to_string(),
            reason: reason.to_string(),
        };

        let op = Operator::ALL
            .into_iter()
            .find(|op| trimmed.starts_with(op.as_str()))
            .ok_or_else(|| invalid("missing comparison operator"))?;
        let raw = trimmed[op.as_str().len()..].trim().to_string();
        if raw.is_empty() {
            return Err(invalid("missing version"));
        }

        if op == Operator::Arbitrary {
            return Ok(Specifier {
                op,
                raw,
                version: None,
                wildcard: false,
            });
        }

        let (version_text, wildcard) = match raw.strip_suffix(".*") {
            Some(prefix) => {
                if !matches!(op, Operator::Equal | Operator::NotEqual) {
                    return Err(invalid("wildcards are only allowed with == and !="));
                }
                (prefix, true)
            }
            None => (raw.as_str(), false),
        };

        let version: Version = version_text.parse()?;
        if wildcard && (version.pre.is_some() || version.post.is_some() || version.dev.is_some())
        {
            return Err(invalid("wildcard prefix must be a plain release"));
        }
        if op == Operator::Compatible && version.release.len() < 2 {
            return Err(invalid("~= requires at least two release components"));
        }
        if version.local.is_some() && !matches!(op, Operator::Equal | Operator::NotEqual) {
            return Err(invalid("local versions are only allowed with == and !="));
        }

        Ok(Specifier {
            op,
            raw,
            version: Some(version),
            wildcard,
        })
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.as_str(), self.raw)
    }
}

/// Parse a comma-separated specifier set such as `>=2.0,<3`
pub fn parse_specifiers(input: &str) -> Result<Vec<Specifier>, ManifestError> {
    input
        .split(',')
        .map(str::trim)
        .map(|clause| {
            if clause.is_empty() {
                Err(ManifestError::InvalidSpecifier {
                    input: input.trim().to_string(),
                    reason: "empty clause".to_string(),
                })
            } else {
                clause.parse()
            }
        })
        .collect()
}
