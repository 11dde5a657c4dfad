//! API Harness - cookie-aware sessions and scenario runs against JSON REST APIs.
//!
//! This crate provides:
//! - A cookie jar that understands repeated and comma-joined `Set-Cookie` headers
//! - A session client that carries cookies across sequential requests
//! - A scenario runner executing ordered request/expectation steps
//! - Structured reports with per-step verdicts, bodies and timings
//!
//! # Example
//!
//! ```rust,no_run
//! use api_harness::{ClientSettings, RunPolicy, ScenarioRunner, SessionClient, Step};
//! use api_harness::transport::Method;
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SessionClient::new(&ClientSettings::new("http://localhost:3000/api/v1"))?;
//! let mut runner = ScenarioRunner::new(client);
//!
//! let steps = vec![
//!     Step::new("login", Method::Post, "/auth/login")
//!         .body(json!({"email": "qa@example.com", "password": "secret"})),
//!     Step::new("categories", Method::Get, "/password-categories"),
//! ];
//!
//! let report = runner.run(&steps, RunPolicy::default()).await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod cookie;
pub mod harness;
pub mod logging;
pub mod runner;
pub mod session;
pub mod transport;

// Re-export configuration
pub use config::{ClientSettings, Config, RunnerSettings};

// Re-export cookie types
pub use cookie::{Cookie, CookieError, CookieJar};

// Re-export harness types
pub use harness::{
    Expectation, HarnessError, HarnessResult, JsonAssertion, RunPolicy, Scenario, ScenarioRunner,
    StatusExpectation, Step,
};

// Re-export report types
pub use runner::{ScenarioReport, ScenarioState, StepFailure, StepOutcome, StepResult};

// Re-export session client
pub use session::{ClientError, Credentials, Envelope, RequestOptions, SessionClient};

// Re-export transport
pub use transport::{Method, ReqwestTransport, Transport, TransportError};
