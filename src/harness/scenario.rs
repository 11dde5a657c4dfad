use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::harness::template::{ResolutionError, ResolveContext, lookup};
use crate::harness::types::{
    AssertionCheck, Expectation, HarnessError, HarnessResult, RunPolicy, Scenario, Step,
};
use crate::config::RunnerSettings;
use crate::runner::{ScenarioReport, ScenarioState, StepFailure, StepOutcome, StepResult};
use crate::session::{ClientError, Envelope, RequestOptions, SessionClient};
use crate::transport::TransportError;

/// Runs steps in order against one [`SessionClient`].
///
/// State moves `NotStarted -> Running -> {Completed, Aborted}` on each run.
/// The client, and so its cookie jar, carries over between runs; call
/// `client_mut().jar_mut().reset()` to start a run logged out.
#[derive(Debug)]
pub struct ScenarioRunner {
    client: SessionClient,
    vars: BTreeMap<String, Value>,
    state: ScenarioState,
    /// Overrides every run policy to keep going after failures
    continue_on_failure: bool,
}

impl ScenarioRunner {
    pub fn new(client: SessionClient) -> Self {
        Self {
            client,
            vars: BTreeMap::new(),
            state: ScenarioState::NotStarted,
            continue_on_failure: false,
        }
    }

    /// Create a runner that applies `settings` on top of each run's policy
    pub fn with_settings(client: SessionClient, settings: &RunnerSettings) -> Self {
        Self {
            continue_on_failure: settings.continue_on_failure,
            ..Self::new(client)
        }
    }

    /// Set variables available as `${vars.<name>}`
    pub fn with_vars(mut self, vars: BTreeMap<String, Value>) -> Self {
        self.vars = vars;
        self
    }

    pub fn state(&self) -> ScenarioState {
        self.state
    }

    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut SessionClient {
        &mut self.client
    }

    pub fn into_client(self) -> SessionClient {
        self.client
    }

    /// Run a scenario with its own policy. Scenario variables are layered over
    /// the runner's.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> HarnessResult<ScenarioReport> {
        let mut vars = self.vars.clone();
        vars.extend(scenario.vars.iter().map(|(k, v)| (k.clone(), v.clone())));

        self.run_named(&scenario.name, &scenario.steps, scenario.policy, &vars)
            .instrument(info_span!("scenario", name = %scenario.name))
            .await
    }

    /// Run `steps` in order.
    ///
    /// Only a transport failure (target unreachable) is returned as an error;
    /// every other problem is recorded in the report.
    pub async fn run(&mut self, steps: &[Step], policy: RunPolicy) -> HarnessResult<ScenarioReport> {
        let vars = self.vars.clone();
        self.run_named("scenario", steps, policy, &vars).await
    }

    async fn run_named(
        &mut self,
        name: &str,
        steps: &[Step],
        policy: RunPolicy,
        vars: &BTreeMap<String, Value>,
    ) -> HarnessResult<ScenarioReport> {
        let started_at = Utc::now();
        let started = Instant::now();
        let policy = if self.continue_on_failure {
            RunPolicy::continue_on_failure()
        } else {
            policy
        };
        self.state = ScenarioState::Running;
        info!(steps = steps.len(), continue_on_failure = policy.continue_on_failure, "starting scenario");

        let mut results: Vec<StepResult> = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            if self.state == ScenarioState::Aborted {
                debug!(step = %step.name, "skipping step");
                results.push(StepResult::skipped(index, &step.name));
                continue;
            }

            let result = match self.run_step(index, step, &results, vars).await {
                Ok(result) => result,
                Err(source) => {
                    self.state = ScenarioState::Aborted;
                    warn!(step = %step.name, error = %source, "transport failure, aborting scenario");
                    return Err(HarnessError::Transport {
                        step: step.name.clone(),
                        source,
                    });
                }
            };

            match &result.failure {
                None => info!(step = %step.name, status = ?result.status(), ms = result.duration_ms, "step passed"),
                Some(failure) => warn!(step = %step.name, status = ?result.status(), failure = %failure, "step failed"),
            }

            if !result.passed() && !policy.continue_on_failure {
                self.state = ScenarioState::Aborted;
            }
            results.push(result);
        }

        if self.state == ScenarioState::Running {
            self.state = ScenarioState::Completed;
        }

        let passed = self.state == ScenarioState::Completed && results.iter().all(StepResult::passed);
        let report = ScenarioReport {
            scenario: name.to_string(),
            state: self.state,
            passed,
            started_at,
            duration_ms: elapsed_ms(started),
            steps: results,
        };
        info!(state = ?report.state, passed = report.passed, "scenario finished");

        Ok(report)
    }

    /// Run a single step. `Err` only for non-timeout transport failures.
    async fn run_step(
        &mut self,
        index: usize,
        step: &Step,
        previous: &[StepResult],
        vars: &BTreeMap<String, Value>,
    ) -> Result<StepResult, TransportError> {
        let started = Instant::now();
        let finish = |response: Option<Envelope>, failure: Option<StepFailure>| StepResult {
            index,
            name: step.name.clone(),
            outcome: if failure.is_some() {
                StepOutcome::Failed
            } else {
                StepOutcome::Passed
            },
            response,
            failure,
            duration_ms: elapsed_ms(started),
        };

        let ctx = ResolveContext::new(previous, vars);
        let (path, options) = match build_request(&ctx, step) {
            Ok(request) => request,
            Err(err) => {
                return Ok(finish(
                    None,
                    Some(StepFailure::Resolution {
                        placeholder: err.placeholder,
                        reason: err.reason,
                    }),
                ));
            }
        };

        debug!(step = %step.name, method = %options.method, path = %path, "running step");

        match self.client.request(&path, options).await {
            Ok(envelope) => {
                let failure = evaluate(&step.expect, &envelope);
                Ok(finish(Some(envelope), failure))
            }
            Err(ClientError::Transport(TransportError::Timeout { timeout, .. })) => Ok(finish(
                None,
                Some(StepFailure::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            )),
            Err(ClientError::Transport(err)) => Err(err),
            Err(ClientError::Cookie(err)) => Ok(finish(
                None,
                Some(StepFailure::MalformedCookie {
                    message: err.to_string(),
                }),
            )),
            Err(err @ ClientError::InvalidHeader { .. }) => Ok(finish(
                None,
                Some(StepFailure::InvalidRequest {
                    message: err.to_string(),
                }),
            )),
        }
    }
}

/// Resolve a step's template into a concrete path and request options
fn build_request(ctx: &ResolveContext<'_>, step: &Step) -> Result<(String, RequestOptions), ResolutionError> {
    let template = &step.request;
    let path = ctx.interpolate(&template.path)?;

    let mut options = RequestOptions::new(template.method);
    for (name, value) in &template.headers {
        options.headers.push((name.clone(), ctx.interpolate(value)?));
    }
    if let Some(body) = &template.body {
        options.body = Some(ctx.resolve_value(body)?);
    }
    options.expect_json = template.expect_json;
    options.timeout = step.timeout_ms.map(Duration::from_millis);

    Ok((path, options))
}

/// Check a response against an expectation; `None` means it passed
fn evaluate(expect: &Expectation, envelope: &Envelope) -> Option<StepFailure> {
    if !expect.status.matches(envelope.status) {
        if envelope.success {
            return Some(StepFailure::Assertion {
                path: "status".to_string(),
                expected: Value::String(expect.status.describe()),
                actual: Some(Value::from(envelope.status)),
            });
        }
        return Some(StepFailure::Http {
            status: envelope.status,
            expected: expect.status.describe(),
            message: envelope.error_message(),
        });
    }

    let root = envelope.to_value();
    for assertion in &expect.assertions {
        let actual = lookup(&root, &assertion.path);
        let failed = match &assertion.check {
            AssertionCheck::Equals(expected) => actual != Some(expected),
            AssertionCheck::Exists(should_exist) => actual.is_some() != *should_exist,
        };
        if failed {
            let expected = match &assertion.check {
                AssertionCheck::Equals(expected) => expected.clone(),
                AssertionCheck::Exists(true) => Value::String("<present>".to_string()),
                AssertionCheck::Exists(false) => Value::String("<absent>".to_string()),
            };
            return Some(StepFailure::Assertion {
                path: assertion.path.clone(),
                expected,
                actual: actual.cloned(),
            });
        }
    }

    None
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
