//! Types for scenario run results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::Envelope;

/// Lifecycle of a scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    NotStarted,
    Running,
    /// Every step ran
    Completed,
    /// Stopped early after a failed step
    Aborted,
}

/// Verdict for a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Passed,
    Failed,
    /// Never ran because the scenario aborted first
    Skipped,
}

/// Why a step failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepFailure {
    /// Response status did not match and was not 2xx
    Http {
        status: u16,
        expected: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Response received but did not match the expectation
    Assertion {
        path: String,
        expected: Value,
        actual: Option<Value>,
    },

    /// A placeholder could not be resolved; the request was never sent
    Resolution { placeholder: String, reason: String },

    /// No response within the request timeout
    Timeout { timeout_ms: u64 },

    /// Strict cookie jar rejected a `Set-Cookie` header
    MalformedCookie { message: String },

    /// The resolved request could not be built; it was never sent
    InvalidRequest { message: String },
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepFailure::Http {
                status,
                expected,
                message,
            } => {
                write!(f, "HTTP {} (expected {})", status, expected)?;
                if let Some(msg) = message {
                    write!(f, ": {}", msg)?;
                }
                Ok(())
            }
            StepFailure::Assertion {
                path,
                expected,
                actual,
            } => {
                let actual = actual
                    .as_ref()
                    .map(Value::to_string)
                    .unwrap_or_else(|| "<missing>".to_string());
                write!(f, "assertion on `{}` failed\n- expected: {}\n+ actual:   {}", path, expected, actual)
            }
            StepFailure::Resolution {
                placeholder,
                reason,
            } => write!(f, "could not resolve `{}`: {}", placeholder, reason),
            StepFailure::Timeout { timeout_ms } => {
                write!(f, "timed out after {}ms", timeout_ms)
            }
            StepFailure::MalformedCookie { message } => write!(f, "{}", message),
            StepFailure::InvalidRequest { message } => write!(f, "invalid request: {}", message),
        }
    }
}

/// Result of a single step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Position in the scenario (0-based)
    pub index: usize,

    /// Step name
    pub name: String,

    /// Verdict
    pub outcome: StepOutcome,

    /// Response envelope, when a response was received
    pub response: Option<Envelope>,

    /// Failure detail, for failed steps
    pub failure: Option<StepFailure>,

    /// Wall-clock time spent on the step
    pub duration_ms: u64,
}

impl StepResult {
    pub fn skipped(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            outcome: StepOutcome::Skipped,
            response: None,
            failure: None,
            duration_ms: 0,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == StepOutcome::Passed
    }

    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }
}

/// Result of a complete scenario run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub scenario: String,

    /// Completed or Aborted
    pub state: ScenarioState,

    /// True when the scenario completed and every step passed
    pub passed: bool,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Total wall-clock time
    pub duration_ms: u64,

    /// One entry per step, in order
    pub steps: Vec<StepResult>,
}

impl ScenarioReport {
    pub fn count(&self, outcome: StepOutcome) -> usize {
        self.steps.iter().filter(|s| s.outcome == outcome).count()
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Human-readable summary, one line per step
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Scenario '{}': {} ({} passed, {} failed, {} skipped, {}ms)\n",
            self.scenario,
            if self.passed { "PASSED" } else { "FAILED" },
            self.count(StepOutcome::Passed),
            self.count(StepOutcome::Failed),
            self.count(StepOutcome::Skipped),
            self.duration_ms,
        );

        for step in &self.steps {
            let marker = match step.outcome {
                StepOutcome::Passed => "ok  ",
                StepOutcome::Failed => "FAIL",
                StepOutcome::Skipped => "skip",
            };
            let status = step
                .status()
                .map(|s| format!(" [{}]", s))
                .unwrap_or_default();
            out.push_str(&format!("  {} {}. {}{}", marker, step.index, step.name, status));
            if let Some(failure) = &step.failure {
                for line in failure.to_string().lines() {
                    out.push_str(&format!("\n         {}", line));
                }
            }
            out.push('\n');
        }

        out
    }
}
