//! Configuration management with environment variable support.
//!
//! Configuration is an explicit value handed to the session client and the
//! scenario runner; nothing reads the environment behind the caller's back.
//! It supports:
//! - Environment variables for all configurable values
//! - Defaults matching the local development backend
//! - Builder methods for programmatic overrides
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `API_HARNESS_BASE_URL` | Base URL of the API under test | `http://localhost:3000/api/v1` |
//! | `API_HARNESS_ORIGIN` | `Origin` header sent with every request (empty disables) | `http://localhost:8082` |
//! | `API_HARNESS_TIMEOUT` | Per-request timeout in seconds | `30` |
//! | `API_HARNESS_COOKIE_FILE` | File used to persist cookies between runs | unset |
//! | `API_HARNESS_CONTINUE_ON_FAILURE` | Keep running steps after a failure | `false` |
//!
//! # Example
//!
//! ```bash
//! export API_HARNESS_BASE_URL="https://staging.example.com/api/v1"
//! export API_HARNESS_COOKIE_FILE="./cookies.txt"
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Default Values
// ============================================================================

/// Default base URL of the API under test
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api/v1";

/// Default `Origin` header (the frontend the backend expects requests from)
pub const DEFAULT_ORIGIN: &str = "http://localhost:8082";

/// Default per-request timeout (seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Login endpoint, relative to the base URL
pub const LOGIN_PATH: &str = "/auth/login";

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_BASE_URL: &str = "API_HARNESS_BASE_URL";
pub const ENV_ORIGIN: &str = "API_HARNESS_ORIGIN";
pub const ENV_TIMEOUT: &str = "API_HARNESS_TIMEOUT";
pub const ENV_COOKIE_FILE: &str = "API_HARNESS_COOKIE_FILE";
pub const ENV_CONTINUE_ON_FAILURE: &str = "API_HARNESS_CONTINUE_ON_FAILURE";

/// Centralized configuration for the harness
#[derive(Debug, Clone)]
pub struct Config {
    /// Session client configuration
    pub client: ClientSettings,
    /// Scenario runner configuration
    pub runner: RunnerSettings,
}

/// Settings for [`SessionClient`](crate::session::SessionClient)
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Base URL every relative path is joined to
    pub base_url: String,
    /// Headers added to every request
    pub default_headers: Vec<(String, String)>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Reject malformed `Set-Cookie` entries instead of skipping them
    pub strict_cookies: bool,
    /// Optional cookie persistence file
    pub cookie_file: Option<PathBuf>,
}

/// Settings for the scenario runner
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Keep running after a failed step
    pub continue_on_failure: bool,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            client: ClientSettings::from_env(),
            runner: RunnerSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            client: ClientSettings::defaults(),
            runner: RunnerSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl ClientSettings {
    pub fn from_env() -> Self {
        let origin = env::var(ENV_ORIGIN).unwrap_or_else(|_| DEFAULT_ORIGIN.to_string());

        Self {
            base_url: env::var(ENV_BASE_URL).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            default_headers: origin_headers(&origin),
            timeout: Duration::from_secs(
                env::var(ENV_TIMEOUT)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            strict_cookies: false,
            cookie_file: env::var(ENV_COOKIE_FILE)
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn defaults() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_headers: origin_headers(DEFAULT_ORIGIN),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            strict_cookies: false,
            cookie_file: None,
        }
    }

    /// Settings for `base_url` with no default headers
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_headers: Vec::new(),
            ..Self::defaults()
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the `Origin` header; an empty value removes it
    pub fn origin(mut self, origin: &str) -> Self {
        self.default_headers
            .retain(|(k, _)| !k.eq_ignore_ascii_case("origin"));
        self.default_headers.extend(origin_headers(origin));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn strict_cookies(mut self, strict: bool) -> Self {
        self.strict_cookies = strict;
        self
    }

    pub fn cookie_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookie_file = Some(path.into());
        self
    }
}

impl RunnerSettings {
    pub fn from_env() -> Self {
        Self {
            continue_on_failure: env::var(ENV_CONTINUE_ON_FAILURE)
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(false),
        }
    }

    pub fn defaults() -> Self {
        Self {
            continue_on_failure: false,
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn origin_headers(origin: &str) -> Vec<(String, String)> {
    if origin.trim().is_empty() {
        Vec::new()
    } else {
        vec![("Origin".to_string(), origin.trim().to_string())]
    }
}

/// Parse common boolean spellings ("1", "true", "yes", "on" and their negatives)
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
