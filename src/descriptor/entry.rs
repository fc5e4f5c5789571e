use super::error::DescriptorError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;

fn module_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("valid regex")
    })
}

fn object_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(?:\(.*\))?$").expect("valid regex"))
}

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// Address the server binds to, written `host:port` or `[v6]:port`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BindAddress {
    pub host: String,
    pub port: u16,
}

impl BindAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn parse(input: &str) -> Result<Self, DescriptorError> {
        let text = input.trim();
        let invalid = |reason: &str| DescriptorError::InvalidBind {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (host, port) = if let Some(rest) = text.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unclosed '[' around IPv6 host"))?;
            if host.parse::<Ipv6Addr>().is_err() {
                return Err(invalid("not an IPv6 address"));
            }
            let port = after
                .strip_prefix(':')
                .ok_or_else(|| invalid("missing port"))?;
            (host, port)
        } else {
            let (host, port) = text.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
            if host.contains(':') {
                return Err(invalid("IPv6 hosts must be written as [addr]:port"));
            }
            (host, port)
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        if host.chars().any(char::is_whitespace) {
            return Err(invalid("host contains whitespace"));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| invalid("port must be an integer between 1 and 65535"))?;
        if port == 0 {
            return Err(invalid("port must be an integer between 1 and 65535"));
        }

        Ok(Self::new(host, port))
    }

    /// Address a local client should dial to reach this listener
    ///
    /// Wildcard hosts are replaced with the loopback address of the same family.
    pub fn connect_target(&self) -> String {
        let host = match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST).to_string(),
            Ok(IpAddr::V6(ip)) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST).to_string(),
            _ => self.host.clone(),
        };
        format_host_port(&host, self.port)
    }
}

fn format_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_host_port(&self.host, self.port))
    }
}

impl TryFrom<String> for BindAddress {
    type Error = DescriptorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BindAddress> for String {
    fn from(bind: BindAddress) -> Self {
        bind.to_string()
    }
}

/// WSGI callable location, `module:object`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppRef {
    pub module: String,
    pub object: String,
}

impl AppRef {
    pub fn new(module: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            object: object.into(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, DescriptorError> {
        let text = input.trim();
        let (module, object) = text
            .split_once(':')
            .ok_or_else(|| DescriptorError::InvalidAppRef {
                input: input.to_string(),
                reason: "expected module:object".to_string(),
            })?;
        let app = Self::new(module.trim(), object.trim());
        app.check().map_err(|reason| DescriptorError::InvalidAppRef {
            input: input.to_string(),
            reason,
        })?;
        Ok(app)
    }

    /// Returns the reason the module or object is not a valid Python reference
    pub fn check(&self) -> Result<(), String> {
        if !module_regex().is_match(&self.module) {
            return Err(format!("'{}' is not a dotted module path", self.module));
        }
        if let Some(keyword) = self.module.split('.').find(|p| PYTHON_KEYWORDS.contains(p)) {
            return Err(format!("module path uses the keyword '{}'", keyword));
        }
        let name = object_regex()
            .captures(&self.object)
            .and_then(|caps| caps.get(1))
            .ok_or_else(|| format!("'{}' is not a Python identifier or call", self.object))?;
        if PYTHON_KEYWORDS.contains(&name.as_str()) {
            return Err(format!("object uses the keyword '{}'", name.as_str()));
        }
        Ok(())
    }
}

impl fmt::Display for AppRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.object)
    }
}

impl TryFrom<String> for AppRef {
    type Error = DescriptorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AppRef> for String {
    fn from(app: AppRef) -> Self {
        app.to_string()
    }
}

/// The container's single entry process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryCommand {
    pub server: String,
    pub bind: BindAddress,
    pub app: AppRef,
    /// Extra server flags placed between the bind address and the app
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl EntryCommand {
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![
            self.server.clone(),
            "--bind".to_string(),
            self.bind.to_string(),
        ];
        argv.extend(self.args.iter().cloned());
        argv.push(self.app.to_string());
        argv
    }
}

impl fmt::Display for EntryCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[test]
    fn test_bind_ipv4() {
        let bind = BindAddress::parse("0.0.0.0:5000").unwrap();
        assert_eq!(bind.host, "0.0.0.0");
        assert_eq!(bind.port, 5000);
        assert_eq!(bind.to_string(), "0.0.0.0:5000");
        assert_eq!(bind.connect_target(), "127.0.0.1:5000");
    }

    #[test]
    fn test_bind_ipv6() {
        let bind = BindAddress::parse("[::]:8000").unwrap();
        assert_eq!(bind.host, "::");
        assert_eq!(bind.to_string(), "[::]:8000");
        assert_eq!(bind.connect_target(), "[::1]:8000");
    }

    #[test]
    fn test_bind_hostname_kept() {
        let bind = BindAddress::parse("localhost:8080").unwrap();
        assert_eq!(bind.connect_target(), "localhost:8080");
    }

    #[parameterized(
        no_port = { "0.0.0.0" },
        empty_host = { ":5000" },
        port_zero = { "0.0.0.0:0" },
        port_overflow = { "0.0.0.0:70000" },
        bare_ipv6 = { ":::5000" },
        unclosed_ipv6 = { "[::1:5000" },
        not_ipv6 = { "[abc]:5000" },
    )]
    fn test_invalid_bind(input: &str) {
        assert!(BindAddress::parse(input).is_err(), "{} should fail", input);
    }

    #[parameterized(
        simple = { "main:app", "main", "app" },
        dotted = { "project.wsgi:application", "project.wsgi", "application" },
        factory = { "app:create_app()", "app", "create_app()" },
        factory_args = { "app:create_app('prod')", "app", "create_app('prod')" },
    )]
    fn test_app_ref(input: &str, module: &str, object: &str) {
        let app = AppRef::parse(input).unwrap();
        assert_eq!(app.module, module);
        assert_eq!(app.object, object);
        assert_eq!(app.to_string(), input);
    }

    #[parameterized(
        missing_colon = { "main" },
        empty_module = { ":app" },
        empty_object = { "main:" },
        dashed_module = { "my-app:app" },
        keyword_object = { "main:class" },
        keyword_module = { "import.x:app" },
        digit_start = { "main:1app" },
    )]
    fn test_invalid_app_ref(input: &str) {
        assert!(AppRef::parse(input).is_err(), "{} should fail", input);
    }

    #[test]
    fn test_argv() {
        let entry = EntryCommand {
            server: "gunicorn".to_string(),
            bind: BindAddress::new("0.0.0.0", 5000),
            app: AppRef::new("main", "app"),
            args: vec!["--workers".to_string(), "2".to_string()],
        };
        assert_eq!(
            entry.argv(),
            vec!["gunicorn", "--bind", "0.0.0.0:5000", "--workers", "2", "main:app"]
        );
        assert_eq!(
            entry.to_string(),
            "gunicorn --bind 0.0.0.0:5000 --workers 2 main:app"
        );
    }
}
