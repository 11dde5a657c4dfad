//! End-to-end scenario runs against mock backends

use std::path::PathBuf;
use std::time::Duration;

use api_harness::config::ClientSettings;
use api_harness::harness::{
    HarnessError, JsonAssertion, RunPolicy, Scenario, ScenarioRunner, StatusExpectation, Step,
};
use api_harness::runner::{ScenarioState, StepFailure, StepOutcome};
use api_harness::session::SessionClient;
use api_harness::transport::{Method, TransportError};
use httpmock::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::json;

fn runner_for(base_url: impl Into<String>) -> ScenarioRunner {
    let settings = ClientSettings::new(base_url).timeout(Duration::from_secs(5));
    ScenarioRunner::new(SessionClient::new(&settings).expect("Failed to build client"))
}

fn crud_steps() -> Vec<Step> {
    vec![
        Step::new("login", Method::Post, "/auth/login")
            .body(json!({"email": "qa@example.com", "password": "pw"})),
        Step::new("createCategory", Method::Post, "/categories").body(json!({"name": "Work"})),
        Step::new("createPassword", Method::Post, "/passwords").body(json!({
            "title": "Mail",
            "categoryId": "${createCategory.data.id}"
        })),
        Step::new("getPassword", Method::Get, "/passwords/${createPassword.data.id}"),
        Step::new("deletePassword", Method::Delete, "/passwords/${createPassword.data.id}"),
    ]
}

#[tokio::test]
async fn test_crud_scenario_completes() {
    let server = MockServer::start_async().await;

    let login = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/login")
                .json_body(json!({"email": "qa@example.com", "password": "pw"}));
            then.status(200)
                .header("content-type", "application/json")
                .header("set-cookie", "sid=abc123; Path=/; HttpOnly")
                .json_body(json!({"success": true}));
        })
        .await;
    let category = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/categories")
                .header("cookie", "sid=abc123");
            then.status(201)
                .header("content-type", "application/json")
                .json_body(json!({"id": "cat-1", "name": "Work"}));
        })
        .await;
    let password = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/passwords")
                .header("cookie", "sid=abc123")
                .json_body(json!({"title": "Mail", "categoryId": "cat-1"}));
            then.status(201)
                .header("content-type", "application/json")
                .json_body(json!({"id": "pw-1", "title": "Mail"}));
        })
        .await;
    let fetch = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/passwords/pw-1")
                .header("cookie", "sid=abc123");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"id": "pw-1", "title": "Mail", "categoryId": "cat-1"}));
        })
        .await;
    let delete = server
        .mock_async(|when, then| {
            when.method(DELETE)
                .path("/passwords/pw-1")
                .header("cookie", "sid=abc123");
            then.status(204);
        })
        .await;

    let mut runner = runner_for(server.base_url());
    let report = runner
        .run(&crud_steps(), RunPolicy::default())
        .await
        .expect("Scenario run failed");

    assert_eq!(report.state, ScenarioState::Completed);
    assert!(report.passed, "{}", report.summary());
    assert_eq!(report.count(StepOutcome::Passed), 5);
    assert_eq!(report.step("getPassword").unwrap().response.as_ref().unwrap().data["categoryId"], "cat-1");
    assert_eq!(report.steps[4].status(), Some(204));

    login.assert_async().await;
    category.assert_async().await;
    password.assert_async().await;
    fetch.assert_async().await;
    delete.assert_async().await;
}

#[tokio::test]
async fn test_abort_skips_remaining_steps() {
    let mut server = mockito::Server::new_async().await;

    let _login = server
        .mock("POST", "/auth/login")
        .with_status(200)
        .with_header("set-cookie", "sid=abc")
        .create_async()
        .await;
    let _category = server
        .mock("POST", "/categories")
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success":false,"error":{"message":"database unavailable"}}"#)
        .create_async()
        .await;
    let list = server.mock("GET", "/passwords").expect(0).create_async().await;
    let stats = server.mock("GET", "/stats").expect(0).create_async().await;

    let steps = vec![
        Step::new("login", Method::Post, "/auth/login"),
        Step::new("createCategory", Method::Post, "/categories").body(json!({"name": "Work"})),
        Step::new("listPasswords", Method::Get, "/passwords"),
        Step::new("stats", Method::Get, "/stats"),
    ];

    let mut runner = runner_for(server.url());
    let report = runner.run(&steps, RunPolicy::abort_on_failure()).await.unwrap();

    assert_eq!(report.state, ScenarioState::Aborted);
    assert!(!report.passed);
    let outcomes: Vec<_> = report.steps.iter().map(|s| s.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            StepOutcome::Passed,
            StepOutcome::Failed,
            StepOutcome::Skipped,
            StepOutcome::Skipped
        ]
    );
    assert_eq!(
        report.steps[1].failure,
        Some(StepFailure::Http {
            status: 500,
            expected: "2xx".to_string(),
            message: Some("database unavailable".to_string()),
        })
    );
    assert!(report.steps[2].failure.is_none());
    assert!(report.steps[3].response.is_none());

    list.assert_async().await;
    stats.assert_async().await;
}

#[tokio::test]
async fn test_continue_runs_independent_steps() {
    let mut server = mockito::Server::new_async().await;

    let _login = server
        .mock("POST", "/auth/login")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("set-cookie", "sid=abc")
        .with_body(r#"{"success":true,"data":{"user":{"id":"u-1"}}}"#)
        .create_async()
        .await;
    let _category = server
        .mock("POST", "/categories")
        .with_status(500)
        .create_async()
        .await;
    let never = server
        .mock("POST", "/passwords")
        .expect(0)
        .create_async()
        .await;
    let profile = server
        .mock("GET", "/users/u-1")
        .match_header("cookie", "sid=abc")
        .with_status(200)
        .create_async()
        .await;

    let steps = vec![
        Step::new("login", Method::Post, "/auth/login"),
        Step::new("createCategory", Method::Post, "/categories"),
        Step::new("createPassword", Method::Post, "/passwords")
            .body(json!({"categoryId": "${step[1].data.id}"})),
        Step::new("profile", Method::Get, "/users/${step[0].data.data.user.id}"),
    ];

    let mut runner = runner_for(server.url());
    let report = runner.run(&steps, RunPolicy::continue_on_failure()).await.unwrap();

    assert_eq!(report.state, ScenarioState::Completed);
    assert!(!report.passed);
    assert_eq!(report.steps[1].outcome, StepOutcome::Failed);
    assert!(matches!(
        report.steps[2].failure,
        Some(StepFailure::Resolution { ref placeholder, .. }) if placeholder == "${step[1].data.id}"
    ));
    assert!(report.steps[2].response.is_none());
    assert_eq!(report.steps[3].outcome, StepOutcome::Passed);

    never.assert_async().await;
    profile.assert_async().await;
}

#[tokio::test]
async fn test_connection_refused_aborts_run() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut runner = runner_for(format!("http://{}", addr));
    let err = runner
        .run(&crud_steps(), RunPolicy::continue_on_failure())
        .await
        .unwrap_err();

    match err {
        HarnessError::Transport { step, source } => {
            assert_eq!(step, "login");
            assert!(matches!(source, TransportError::Connect { .. }));
        }
        other => panic!("expected transport error, got {other}"),
    }
    assert_eq!(runner.state(), ScenarioState::Aborted);
}

#[tokio::test]
async fn test_slow_response_times_out_as_step_failure() {
    let server = MockServer::start_async().await;

    let _slow = server
        .mock_async(|when, then| {
            when.method(GET).path("/passwords/export");
            then.status(200).delay(Duration::from_millis(1500));
        })
        .await;
    let _fast = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).body("OK");
        })
        .await;

    let steps = vec![
        Step::new("export", Method::Get, "/passwords/export").timeout_ms(100),
        Step::new("health", Method::Get, "/health"),
    ];

    let mut runner = runner_for(server.base_url());
    let report = runner.run(&steps, RunPolicy::continue_on_failure()).await.unwrap();

    assert_eq!(report.steps[0].failure, Some(StepFailure::Timeout { timeout_ms: 100 }));
    assert!(report.steps[1].passed());
    assert_eq!(report.state, ScenarioState::Completed);
}

#[tokio::test]
async fn test_redirect_response_sets_cookie() {
    let server = MockServer::start_async().await;

    let login = server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/login");
            then.status(302)
                .header("location", "/home")
                .header("set-cookie", "sid=redir; Path=/; HttpOnly");
        })
        .await;
    let home = server
        .mock_async(|when, then| {
            when.method(GET).path("/home");
            then.status(200);
        })
        .await;

    let steps = vec![
        Step::new("login", Method::Post, "/auth/login")
            .body(json!({"email": "qa@example.com", "password": "pw"}))
            .expect_status(StatusExpectation::Redirect)
            .assert(JsonAssertion::equals("status", json!(302))),
    ];

    let mut runner = runner_for(server.base_url());
    let report = runner.run(&steps, RunPolicy::default()).await.unwrap();

    assert!(report.passed, "{}", report.summary());
    assert_eq!(report.steps[0].status(), Some(302));
    assert_eq!(runner.client().jar().to_header(), "sid=redir");
    login.assert_async().await;
    home.assert_calls_async(0).await;
}

#[tokio::test]
async fn test_concurrent_scenarios_keep_separate_sessions() {
    let server = MockServer::start_async().await;

    for user in ["alice", "bob"] {
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/auth/login")
                    .json_body(json!({"email": format!("{user}@example.com"), "password": "pw"}));
                then.status(200)
                    .header("set-cookie", format!("sid={user}; Path=/"));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/auth/me")
                    .header("cookie", format!("sid={user}"));
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({"email": format!("{user}@example.com")}));
            })
            .await;
    }

    let scenario = |user: &str| {
        Scenario::new(
            user,
            vec![
                Step::new("login", Method::Post, "/auth/login")
                    .body(json!({"email": "${vars.email}", "password": "pw"})),
                Step::new("me", Method::Get, "/auth/me"),
            ],
        )
        .var("email", json!(format!("{user}@example.com")))
    };
    let alice = scenario("alice");
    let bob = scenario("bob");

    let mut alice_runner = runner_for(server.base_url());
    let mut bob_runner = runner_for(server.base_url());
    let (alice_report, bob_report) = tokio::join!(
        alice_runner.run_scenario(&alice),
        bob_runner.run_scenario(&bob)
    );

    let alice_report = alice_report.unwrap();
    let bob_report = bob_report.unwrap();
    assert!(alice_report.passed, "{}", alice_report.summary());
    assert!(bob_report.passed, "{}", bob_report.summary());
    assert_eq!(
        alice_report.steps[1].response.as_ref().unwrap().data["email"],
        "alice@example.com"
    );
    assert_eq!(
        bob_report.steps[1].response.as_ref().unwrap().data["email"],
        "bob@example.com"
    );
    assert_eq!(alice_runner.client().jar().to_header(), "sid=alice");
    assert_eq!(bob_runner.client().jar().to_header(), "sid=bob");
}

#[test]
fn test_demo_scenarios_parse() {
    let demos = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos");
    for file in ["password_crud.json", "note_crud.json"] {
        let scenario = Scenario::from_file(demos.join(file)).expect("Demo scenario should parse");
        assert!(!scenario.steps.is_empty());
        assert_eq!(scenario.steps[0].name, "login");
        assert_eq!(scenario.steps[0].request.method, Method::Post);
    }
}
