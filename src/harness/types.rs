use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::transport::{Method, TransportError};

/// Request part of a step. Strings may contain `${...}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestTemplate {
    /// HTTP method (default GET)
    #[serde(default)]
    pub method: Method,

    /// Path relative to the base URL (or an absolute URL)
    pub path: String,

    /// Extra request headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// JSON body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Force (true) or disable (false) JSON decoding of the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_json: Option<bool>,
}

impl RequestTemplate {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: BTreeMap::new(),
            body: None,
            expect_json: None,
        }
    }
}

/// Expected status class of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusExpectation {
    /// 2xx
    #[default]
    Success,
    /// 3xx
    Redirect,
    /// 4xx
    ClientError,
    /// 5xx
    ServerError,
    /// Any status
    Any,
    /// Exactly this status
    Exact(u16),
}

impl StatusExpectation {
    pub fn matches(&self, status: u16) -> bool {
        match self {
            StatusExpectation::Success => (200..300).contains(&status),
            StatusExpectation::Redirect => (300..400).contains(&status),
            StatusExpectation::ClientError => (400..500).contains(&status),
            StatusExpectation::ServerError => (500..600).contains(&status),
            StatusExpectation::Any => true,
            StatusExpectation::Exact(code) => *code == status,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            StatusExpectation::Success => "2xx".to_string(),
            StatusExpectation::Redirect => "3xx".to_string(),
            StatusExpectation::ClientError => "4xx".to_string(),
            StatusExpectation::ServerError => "5xx".to_string(),
            StatusExpectation::Any => "any status".to_string(),
            StatusExpectation::Exact(code) => code.to_string(),
        }
    }
}

/// Check applied to the value at a JSON path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionCheck {
    /// Value must equal this JSON value
    Equals(Value),
    /// Value must be present (true) or absent (false)
    Exists(bool),
}

/// A JSON-path assertion against the response envelope
/// (`status`, `success`, `data.<...>`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonAssertion {
    pub path: String,
    #[serde(flatten)]
    pub check: AssertionCheck,
}

impl JsonAssertion {
    pub fn equals(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            check: AssertionCheck::Equals(value),
        }
    }

    pub fn exists(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            check: AssertionCheck::Exists(true),
        }
    }

    pub fn absent(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            check: AssertionCheck::Exists(false),
        }
    }
}

/// What a step's response must look like
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Expectation {
    #[serde(default)]
    pub status: StatusExpectation,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<JsonAssertion>,
}

/// One request-and-expectation unit of a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Name, also usable as a placeholder reference (`${name.data.id}`)
    pub name: String,

    pub request: RequestTemplate,

    #[serde(default)]
    pub expect: Expectation,

    /// Overrides the client's request timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Step {
    pub fn new(name: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            request: RequestTemplate::new(method, path),
            expect: Expectation::default(),
            timeout_ms: None,
        }
    }

    pub fn body(mut self, body: Value) -> Self {
        self.request.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.insert(name.into(), value.into());
        self
    }

    pub fn expect_status(mut self, status: StatusExpectation) -> Self {
        self.expect.status = status;
        self
    }

    pub fn assert(mut self, assertion: JsonAssertion) -> Self {
        self.expect.assertions.push(assertion);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Failure handling policy for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunPolicy {
    /// Keep running after a failed step instead of aborting
    #[serde(default)]
    pub continue_on_failure: bool,
}

impl RunPolicy {
    pub fn abort_on_failure() -> Self {
        Self {
            continue_on_failure: false,
        }
    }

    pub fn continue_on_failure() -> Self {
        Self {
            continue_on_failure: true,
        }
    }
}

/// A named, ordered list of steps loaded from a JSON file or built in code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Values available to placeholders as `${vars.<name>}`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, Value>,

    #[serde(default)]
    pub policy: RunPolicy,

    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: None,
            vars: BTreeMap::new(),
            policy: RunPolicy::default(),
            steps,
        }
    }

    pub fn var(mut self, name: impl Into<String>, value: Value) -> Self {
        self.vars.insert(name.into(), value);
        self
    }

    pub fn policy(mut self, policy: RunPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Load a scenario from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that end a scenario run or prevent it from starting.
///
/// Step-level problems are recorded in the report instead.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The target system is unreachable; no further step can run
    #[error("Transport error in step '{step}': {source}")]
    Transport {
        step: String,
        #[source]
        source: TransportError,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Scenario file could not be parsed
    #[error("Invalid scenario: {0}")]
    Scenario(#[from] serde_json::Error),
}
