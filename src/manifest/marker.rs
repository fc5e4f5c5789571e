//! PEP 508 environment markers
//!
//! Markers decide whether a dependency applies inside the target image
//! (`colorama; sys_platform == "win32"` never does on a Linux base). They are
//! parsed eagerly so a malformed marker fails the manifest load instead of
//! being ignored.

use super::error::ManifestError;
use super::version::{Specifier, Version};
use std::fmt;

/// Environment a marker is evaluated against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerEnv {
    pub python_version: String,
    pub python_full_version: String,
    pub implementation_name: String,
    pub implementation_version: String,
    pub platform_python_implementation: String,
    pub os_name: String,
    pub sys_platform: String,
    pub platform_system: String,
    pub platform_machine: String,
    pub platform_release: String,
}

impl MarkerEnv {
    /// CPython on x86_64 Linux, the shape of the official `python:*` images
    pub fn linux(python: &Version) -> Self {
        let full = python.to_string();
        Self {
            python_version: python.major_minor(),
            python_full_version: full.clone(),
            implementation_name: "cpython".to_string(),
            implementation_version: full,
            platform_python_implementation: "CPython".to_string(),
            os_name: "posix".to_string(),
            sys_platform: "linux".to_string(),
            platform_system: "Linux".to_string(),
            platform_machine: "x86_64".to_string(),
            platform_release: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variable {
    PythonVersion,
    PythonFullVersion,
    ImplementationName,
    ImplementationVersion,
    PlatformPythonImplementation,
    OsName,
    SysPlatform,
    PlatformSystem,
    PlatformMachine,
    PlatformRelease,
    Extra,
}

impl Variable {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "python_version" => Variable::PythonVersion,
            "python_full_version" => Variable::PythonFullVersion,
            "implementation_name" => Variable::ImplementationName,
            "implementation_version" => Variable::ImplementationVersion,
            "platform_python_implementation" => Variable::PlatformPythonImplementation,
            "os_name" => Variable::OsName,
            "sys_platform" => Variable::SysPlatform,
            "platform_system" => Variable::PlatformSystem,
            "platform_machine" => Variable::PlatformMachine,
            "platform_release" => Variable::PlatformRelease,
            "extra" => Variable::Extra,
            _ => return None,
        })
    }

    fn is_version(self) -> bool {
        matches!(
            self,
            Variable::PythonVersion | Variable::PythonFullVersion | Variable::ImplementationVersion
        )
    }

    fn lookup(self, env: &MarkerEnv) -> &str {
        match self {
            Variable::PythonVersion => &env.python_version,
            Variable::PythonFullVersion => &env.python_full_version,
            Variable::ImplementationName => &env.implementation_name,
            Variable::ImplementationVersion => &env.implementation_version,
            Variable::PlatformPythonImplementation => &env.platform_python_implementation,
            Variable::OsName => &env.os_name,
            Variable::SysPlatform => &env.sys_platform,
            Variable::PlatformSystem => &env.platform_system,
            Variable::PlatformMachine => &env.platform_machine,
            Variable::PlatformRelease => &env.platform_release,
            // no extras are requested when installing into the image
            Variable::Extra => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Var(Variable),
    Literal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Version(&'static str),
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare { lhs: Value, op: CompareOp, rhs: Value },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Str(String),
    Ident(String),
    Op(&'static str),
}

/// A parsed marker expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    raw: String,
    expr: Expr,
}

impl Marker {
    pub fn parse(input: &str) -> Result<Self, ManifestError> {
        let raw = input.trim().to_string();
        let invalid = |reason: String| ManifestError::InvalidMarker {
            input: raw.clone(),
            reason,
        };

        let tokens = tokenize(&raw).map_err(invalid)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.or_expr().map_err(invalid)?;
        if parser.pos != parser.tokens.len() {
            return Err(invalid(format!(
                "unexpected trailing input at token {}",
                parser.pos + 1
            )));
        }

        Ok(Marker { raw, expr })
    }

    pub fn evaluate(&self, env: &MarkerEnv) -> bool {
        eval(&self.expr, env)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

const OPERATORS: [&str; 8] = ["===", "==", "!=", "<=", ">=", "~=", "<", ">"];

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else if c == '"' || c == '\'' {
            let end = chars[i + 1..]
                .iter()
                .position(|&ch| ch == c)
                .ok_or_else(|| "unterminated string".to_string())?;
            tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
            i += end + 2;
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            let rest: String = chars[i..].iter().take(3).collect();
            let op = OPERATORS
                .into_iter()
                .find(|op| rest.starts_with(op))
                .ok_or_else(|| format!("unexpected character '{}'", c))?;
            tokens.push(Token::Op(op));
            i += op.len();
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(w)) if w == word)
    }

    fn or_expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.and_expr()?;
        while self.keyword("or") {
            self.pos += 1;
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.atom()?;
        while self.keyword("and") {
            self.pos += 1;
            let rhs = self.atom()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn atom(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.or_expr()?;
            return match self.next() {
                Some(Token::RParen) => Ok(inner),
                _ => Err("missing closing parenthesis".to_string()),
            };
        }

        let lhs = self.value()?;
        let op = self.operator()?;
        let rhs = self.value()?;
        if matches!(lhs, Value::Literal(_)) && matches!(rhs, Value::Literal(_)) {
            return Err("comparison between two literals".to_string());
        }
        Ok(Expr::Compare { lhs, op, rhs })
    }

    fn value(&mut self) -> Result<Value, String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Value::Literal(s)),
            Some(Token::Ident(name)) => Variable::from_name(&name)
                .map(Value::Var)
                .ok_or_else(|| format!("unknown marker variable '{}'", name)),
            Some(other) => Err(format!("expected a value, found {:?}", other)),
            None => Err("unexpected end of marker".to_string()),
        }
    }

    fn operator(&mut self) -> Result<CompareOp, String> {
        match self.next() {
            Some(Token::Op(op)) => Ok(CompareOp::Version(op)),
            Some(Token::Ident(word)) if word == "in" => Ok(CompareOp::In),
            Some(Token::Ident(word)) if word == "not" => match self.next() {
                Some(Token::Ident(next)) if next == "in" => Ok(CompareOp::NotIn),
                _ => Err("expected 'in' after 'not'".to_string()),
            },
            Some(other) => Err(format!("expected an operator, found {:?}", other)),
            None => Err("unexpected end of marker".to_string()),
        }
    }
}

fn eval(expr: &Expr, env: &MarkerEnv) -> bool {
    match expr {
        Expr::And(a, b) => eval(a, env) && eval(b, env),
        Expr::Or(a, b) => eval(a, env) || eval(b, env),
        Expr::Compare { lhs, op, rhs } => compare(lhs, *op, rhs, env),
    }
}

fn resolve<'a>(value: &'a Value, env: &'a MarkerEnv) -> &'a str {
    match value {
        Value::Var(var) => var.lookup(env),
        Value::Literal(s) => s,
    }
}

fn compare(lhs: &Value, op: CompareOp, rhs: &Value, env: &MarkerEnv) -> bool {
    let left = resolve(lhs, env);
    let right = resolve(rhs, env);

    match op {
        CompareOp::In => right.contains(left),
        CompareOp::NotIn => !right.contains(left),
        CompareOp::Version(symbol) => {
            let is_version = |v: &Value| matches!(v, Value::Var(var) if var.is_version());
            if is_version(lhs) || is_version(rhs) {
                if let Some(result) = version_compare(left, symbol, right) {
                    return result;
                }
            }
            string_compare(left, symbol, right)
        }
    }
}

fn version_compare(left: &str, symbol: &str, right: &str) -> Option<bool> {
    let candidate: Version = left.parse().ok()?;
    let specifier: Specifier = format!("{}{}", symbol, right).parse().ok()?;
    Some(specifier.contains(&candidate))
}

fn string_compare(left: &str, symbol: &str, right: &str) -> bool {
    match symbol {
        "==" | "===" => left == right,
        "!=" => left != right,
        "<" => left < right,
        "<=" => left <= right,
        ">" => left > right,
        ">=" => left >= right,
        _ => false,
    }
}
