//! Cookie jar shared by every request of one session.
//!
//! The jar keeps every cookie it has seen, keyed by name, in first-seen
//! order. Attributes are parsed and kept for inspection but never enforced:
//! nothing expires and nothing is scoped to a path or domain.

pub mod file;
pub mod parse;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use parse::{parse_set_cookie, split_set_cookie};

/// Errors raised by the cookie jar
#[derive(Debug, Error)]
pub enum CookieError {
    /// A `Set-Cookie` entry without a `name=value` pair (strict mode only)
    #[error("Malformed cookie: {0:?}")]
    Malformed(String),

    /// Cookie file could not be read or written
    #[error("Cookie file error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single cookie as received in a `Set-Cookie` header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            expires: None,
            max_age: None,
            same_site: None,
            secure: false,
            http_only: false,
        }
    }

    /// Render as a `Set-Cookie` style line (`name=value; Path=/; ...`)
    pub fn to_set_cookie(&self) -> String {
        let mut line = format!("{}={}", self.name, self.value);
        if let Some(path) = &self.path {
            line.push_str(&format!("; Path={}", path));
        }
        if let Some(domain) = &self.domain {
            line.push_str(&format!("; Domain={}", domain));
        }
        if let Some(expires) = &self.expires {
            line.push_str(&format!("; Expires={}", expires));
        }
        if let Some(max_age) = self.max_age {
            line.push_str(&format!("; Max-Age={}", max_age));
        }
        if let Some(same_site) = &self.same_site {
            line.push_str(&format!("; SameSite={}", same_site));
        }
        if self.secure {
            line.push_str("; Secure");
        }
        if self.http_only {
            line.push_str("; HttpOnly");
        }
        line
    }
}

/// Name-unique cookie storage in first-seen order
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
    strict: bool,
}

impl CookieJar {
    /// Create a lenient jar: malformed entries are skipped
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a strict jar: malformed entries are rejected with [`CookieError::Malformed`]
    pub fn strict() -> Self {
        Self {
            cookies: Vec::new(),
            strict: true,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Ingest `Set-Cookie` header values.
    ///
    /// Each value may hold one cookie or several comma-joined ones. In strict
    /// mode the whole batch is validated first and rejected without touching
    /// the jar if any entry is malformed.
    pub fn ingest<I, S>(&mut self, headers: I) -> Result<(), CookieError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = Vec::new();

        for header in headers {
            for raw in split_set_cookie(header.as_ref()) {
                match parse_set_cookie(raw) {
                    Ok(cookie) => parsed.push(cookie),
                    Err(err) if self.strict => return Err(err),
                    Err(_) => debug!(entry = raw, "skipping malformed Set-Cookie entry"),
                }
            }
        }

        for cookie in parsed {
            self.insert(cookie);
        }
        Ok(())
    }

    /// Insert or replace a cookie by name, keeping its original position
    pub fn insert(&mut self, cookie: Cookie) {
        match self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    /// Render the jar as a `Cookie` request header value
    pub fn to_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Remove every cookie
    pub fn reset(&mut self) {
        self.cookies.clear();
    }
}
