use super::error::DescriptorError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

fn component_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]+(?:[._-]+[a-z0-9]+)*$").expect("valid regex"))
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("valid regex"))
}

fn digest_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^sha256:[a-f0-9]{64}$").expect("valid regex"))
}

/// Container image reference: `[registry/]repository[:tag][@sha256:<hex>]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageRef {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self, DescriptorError> {
        let text = input.trim();
        let invalid = |reason: &str| DescriptorError::InvalidImage {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        if text.is_empty() {
            return Err(invalid("empty reference"));
        }
        if text.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }

        let (name_and_tag, digest) = match text.split_once('@') {
            Some((rest, digest)) => {
                if !digest_regex().is_match(digest) {
                    return Err(invalid("digest must be sha256:<64 hex characters>"));
                }
                (rest, Some(digest.to_string()))
            }
            None => (text, None),
        };

        let last_slash = name_and_tag.rfind('/');
        let (name, tag) = match name_and_tag.rfind(':') {
            Some(colon) if last_slash.map_or(true, |slash| colon > slash) => {
                let tag = &name_and_tag[colon + 1..];
                if !tag_regex().is_match(tag) {
                    return Err(invalid("malformed tag"));
                }
                (&name_and_tag[..colon], Some(tag.to_string()))
            }
            _ => (name_and_tag, None),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), rest)
            }
            _ => (None, name),
        };

        if repository.is_empty() {
            return Err(invalid("missing repository"));
        }
        if !repository.split('/').all(|c| component_regex().is_match(c)) {
            return Err(invalid(
                "repository must be lowercase alphanumerics separated by '.', '_', '-' or '/'",
            ));
        }

        Ok(ImageRef {
            registry,
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// A digest, or a tag other than `latest`, fixes the image contents
    pub fn is_pinned(&self) -> bool {
        self.digest.is_some() || self.tag.as_deref().is_some_and(|tag| tag != "latest")
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{}/", registry)?;
        }
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl FromStr for ImageRef {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ImageRef {
    type Error = DescriptorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ImageRef> for String {
    fn from(image: ImageRef) -> Self {
        image.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    const DIGEST: &str = "sha256:0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_official_image_with_tag() {
        let image = ImageRef::parse("python:3.11-slim").unwrap();
        assert_eq!(image.registry, None);
        assert_eq!(image.repository, "python");
        assert_eq!(image.tag.as_deref(), Some("3.11-slim"));
        assert!(image.is_pinned());
        assert_eq!(image.to_string(), "python:3.11-slim");
    }

    #[test]
    fn test_registry_with_port() {
        let image = ImageRef::parse("localhost:5000/team/app:1.2").unwrap();
        assert_eq!(image.registry.as_deref(), Some("localhost:5000"));
        assert_eq!(image.repository, "team/app");
        assert_eq!(image.tag.as_deref(), Some("1.2"));
    }

    #[test]
    fn test_digest_pins_untagged_image() {
        let image = ImageRef::parse(&format!("ghcr.io/org/python@{}", DIGEST)).unwrap();
        assert_eq!(image.registry.as_deref(), Some("ghcr.io"));
        assert_eq!(image.tag, None);
        assert!(image.is_pinned());
    }

    #[parameterized(
        untagged = { "python" },
        latest = { "python:latest" },
        namespaced_latest = { "library/python:latest" },
    )]
    fn test_unpinned_images(input: &str) {
        assert!(!ImageRef::parse(input).unwrap().is_pinned());
    }

    #[parameterized(
        empty = { "" },
        uppercase = { "Python:3.11" },
        whitespace = { "python 3.11" },
        bad_tag = { "python:3.11/slim:" },
        short_digest = { "python@sha256:abc" },
        missing_repository = { ":3.11" },
    )]
    fn test_invalid_images(input: &str) {
        assert!(ImageRef::parse(input).is_err(), "{} should fail", input);
    }

    #[test]
    fn test_serde_as_string() {
        let image = ImageRef::parse("python:3.12-slim").unwrap();
        let json = serde_json::to_string(&image).unwrap();
        assert_eq!(json, "\"python:3.12-slim\"");
        let back: ImageRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, image);
        assert!(serde_json::from_str::<ImageRef>("\"\"").is_err());
    }
}
