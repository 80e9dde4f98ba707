use std::{
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use gqlscenario::{
    action, query, run, CaseStatus, DefaultGroupRunner, GroupManifest,
    GroupResult, GroupRunner, QueryStep, StepResult, SuiteConfig, Variables,
};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

#[derive(Clone, Default)]
struct Widgets {
    items: Arc<Mutex<Vec<Value>>>,
}

impl Widgets {
    fn create(&self, name: &Value) -> Value {
        let mut items = self.items.lock().unwrap();
        let id = format!("w{}", items.len() + 1);
        let widget = json!({"id": id, "name": name});
        items.push(widget.clone());
        widget
    }

    fn find(&self, id: &Value) -> Value {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|w| &w["id"] == id)
            .cloned()
            .unwrap_or(Value::Null)
    }
}

async fn graphql(
    State(widgets): State<Widgets>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let query = body["query"].as_str().unwrap_or_default();
    let variables = &body["variables"];

    if query.contains("createWidget") {
        let widget = widgets.create(&variables["name"]);
        let body = json!({"data": {"createWidget": widget}});
        return (StatusCode::OK, Json(body));
    }
    if query.contains("widget(") {
        let widget = widgets.find(&variables["id"]);
        return (StatusCode::OK, Json(json!({"data": {"widget": widget}})));
    }
    if query.contains("{ me") {
        let me = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|id| json!({"id": id}))
            .unwrap_or(Value::Null);
        return (StatusCode::OK, Json(json!({"data": {"me": me}})));
    }
    if query.contains("__typename") {
        return (StatusCode::OK, Json(json!({"data": {"__typename": "Query"}})));
    }
    if query.contains("deleteEverything") {
        return (
            StatusCode::OK,
            Json(json!({
                "data": null,
                "errors": [{"message": "Access denied"}]
            })),
        );
    }

    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "errors": [{"message": format!("Cannot parse query: {query}")}]
        })),
    )
}

struct TestServer {
    base_url: String,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    async fn spawn() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let app = Router::new()
            .route("/graphql", post(graphql))
            .route(
                "/broken",
                post(|| async move {
                    (StatusCode::INTERNAL_SERVER_ERROR, "upstream crashed")
                }),
            )
            .route(
                "/expired",
                post(|| async move {
                    (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({"message": "token expired"})),
                    )
                }),
            )
            .with_state(Widgets::default());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });

        let handle = tokio::spawn(async move {
            if let Err(err) = server.await {
                eprintln!("test server error: {err}");
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    fn config(&self, path: &str) -> SuiteConfig {
        SuiteConfig::default().with_endpoint(format!("{}{path}", self.base_url))
    }

    async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                let _ = handle.await;
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn load_manifest(path: &str, base_url: &str) -> GroupManifest {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let manifest_path = manifest_dir.join("tests/fixtures").join(path);
    let content = fs::read_to_string(&manifest_path)
        .unwrap_or_else(|e| panic!("failed to read {manifest_path:?}: {e}"));
    let content = content.replace("__BASE_URL__", base_url);

    GroupManifest::from_yaml(&content)
        .unwrap_or_else(|e| panic!("failed to parse manifest yaml: {e}"))
}

fn assert_case_error_contains(result: &GroupResult, case: &str, needle: &str) {
    let case = result.case(case).expect("case not found");
    let error = case.error.as_ref().expect("expected error message for case");
    assert!(
        error.contains(needle),
        "error message did not contain '{needle}': {error}"
    );
}

#[tokio::test]
async fn create_then_read_threads_captured_id() {
    let server = TestServer::spawn().await;

    let result = run(
        "widgets",
        server.config("/graphql"),
        vec![
            query(
                "create",
                QueryStep::new(
                    "mutation($name: String!) { createWidget(data: { name: $name }) { id name } }",
                )
                .payload(json!({"name": "gadget"}))
                .test_response(|r: StepResult| async move {
                    assert_eq!(r.json["name"], json!("gadget"));
                    json!({"id": r.json["id"]})
                }),
            ),
            query(
                "read",
                QueryStep::new(
                    "query($id: ID!) { widget(where: { id: $id }) { id name } }",
                )
                .payload_with(|v: Variables| async move {
                    json!({"id": v.get("id")})
                })
                    .test_response(|r: StepResult| async move {
                        assert_eq!(r.json["name"], json!("gadget"));
                    }),
            ),
        ],
    )
    .await;

    result.assert_passed();
    let read = result.case("read").unwrap();
    assert_eq!(
        read.request.as_ref().unwrap().variables,
        json!({"id": "w1"}).as_object().cloned().unwrap()
    );

    server.shutdown().await;
}

#[tokio::test]
async fn with_auth_attaches_session_header() {
    let server = TestServer::spawn().await;

    let result = run(
        "auth",
        server.config("/graphql"),
        vec![
            action("login", |_toolkit| async {
                json!({"session": {"itemId": "42", "data": {}}})
            }),
            query(
                "me as user",
                QueryStep::new("{ me { id } }")
                    .with_auth(true)
                    .test_response(|r: StepResult| async move {
                        assert_eq!(r.json, json!({"id": "42"}));
                    }),
            ),
            query(
                "me anonymously",
                QueryStep::new("{ me { id } }")
                    .test_falsy(|_r| async {})
                    .test_response(|r: StepResult| async move {
                        assert!(r.json.is_null());
                    }),
            ),
        ],
    )
    .await;

    result.assert_passed();
    server.shutdown().await;
}

#[tokio::test]
async fn unexpected_errors_fail_the_step_but_not_the_rest() {
    let server = TestServer::spawn().await;

    let result = run(
        "errors",
        server.config("/graphql"),
        vec![
            query("delete", QueryStep::new("mutation { deleteEverything }")),
            query("typename", QueryStep::new("{ __typename }")),
        ],
    )
    .await;

    assert!(!result.success);
    assert_case_error_contains(&result, "delete", "Access denied");
    assert_eq!(result.case("typename").unwrap().status, CaseStatus::Passed);

    server.shutdown().await;
}

#[tokio::test]
async fn bad_request_body_is_treated_as_graphql_errors() {
    let server = TestServer::spawn().await;

    let result = run(
        "invalid",
        server.config("/graphql"),
        vec![query(
            "garbage",
            QueryStep::new("{ nonsense }")
                .test_error(|r: StepResult| async move {
                    json!({"errors": r.errors})
                })
                .test_falsy(|_r| async {}),
        )],
    )
    .await;

    result.assert_passed();
    assert!(result.variables["errors"][0]["message"]
        .as_str()
        .unwrap()
        .contains("Cannot parse query"));

    server.shutdown().await;
}

#[tokio::test]
async fn transport_failure_is_a_dispatch_fault() {
    let server = TestServer::spawn().await;

    let result = run(
        "broken",
        server.config("/broken"),
        vec![query("typename", QueryStep::new("{ __typename }"))],
    )
    .await;

    assert!(!result.success);
    assert_case_error_contains(&result, "typename", "dispatch failed");
    assert_case_error_contains(&result, "typename", "upstream crashed");

    server.shutdown().await;
}

#[tokio::test]
async fn non_graphql_error_body_is_a_dispatch_fault() {
    let server = TestServer::spawn().await;

    let result = run(
        "expired",
        server.config("/expired"),
        vec![query(
            "me",
            QueryStep::new("{ me { id } }").test_falsy(|_r| async {}),
        )],
    )
    .await;

    assert!(!result.success);
    assert_case_error_contains(&result, "me", "dispatch failed");
    assert_case_error_contains(&result, "me", "401 Unauthorized");
    assert_case_error_contains(&result, "me", "token expired");

    server.shutdown().await;
}

#[tokio::test]
async fn failed_probe_skips_every_step() {
    let server = TestServer::spawn().await;
    let mut config = server.config("/broken");
    config.probe_on_connect = true;

    let result = DefaultGroupRunner::new()
        .run(&gqlscenario::ScenarioGroup::new(
            "probe",
            config,
            vec![query("typename", QueryStep::new("{ __typename }"))],
        ))
        .await;

    assert!(!result.success);
    assert!(result.error.as_ref().unwrap().contains("connect failed"));
    assert_eq!(result.cases[0].status, CaseStatus::Skipped);

    server.shutdown().await;
}

#[tokio::test]
async fn manifest_runs_against_server() {
    let server = TestServer::spawn().await;
    let manifest = load_manifest("widgets.yaml", &server.base_url);

    let result = DefaultGroupRunner::new().run(&manifest.into_group()).await;

    result.assert_passed();
    assert_eq!(result.variables.get("widgetId"), Some(&json!("w1")));
    assert_eq!(
        result.variables["lastErrors"],
        json!([{"message": "Access denied"}])
    );

    server.shutdown().await;
}

#[tokio::test]
async fn manifest_assert_mismatch_fails_step() {
    let server = TestServer::spawn().await;
    let manifest = load_manifest("assert_failure.yaml", &server.base_url);

    let result = DefaultGroupRunner::new().run(&manifest.into_group()).await;

    assert!(!result.success);
    assert_case_error_contains(
        &result,
        "create",
        "value at 'name' does not match",
    );
    assert_eq!(result.case("skipped").unwrap().status, CaseStatus::Skipped);

    server.shutdown().await;
}
