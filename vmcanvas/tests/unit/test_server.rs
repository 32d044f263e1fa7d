//! HTTP route tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{orchestrator, ScriptedRunner, PUBLIC_IP};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use vmcanvas::filesys::file::File;
use vmcanvas::models::catalog::{predefined_machines, PredefinedMachine};
use vmcanvas::selector::MachineSelector;
use vmcanvas::server::serve::router;
use vmcanvas::server::state::ServerState;
use vmcanvas::storage::machines::MachineStore;

/// Always picks the second predefined machine
struct FixedSelector;

#[async_trait]
impl MachineSelector for FixedSelector {
    async fn select(&self, _prompt: &str) -> PredefinedMachine {
        predefined_machines()[1].clone()
    }
}

struct TestApp {
    dir: TempDir,
    router: Router,
    runner: Arc<ScriptedRunner>,
}

fn app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let runner = ScriptedRunner::new();
    let store = Arc::new(MachineStore::new(File::new(dir.path().join("machines.json"))));
    let orch = Arc::new(orchestrator(&dir.path().join("deployments"), runner.clone()));
    let state = ServerState::new(store, orch, Arc::new(FixedSelector));
    TestApp {
        router: router(Arc::new(state)),
        runner,
        dir,
    }
}

async fn send(app: &TestApp, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn vm1() -> Value {
    json!({
        "id": "vm-1",
        "name": "A",
        "region": "us-west-1",
        "instanceSize": "t2.micro",
        "application": "none"
    })
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "vmcanvas");
}

#[tokio::test]
async fn test_create_and_get_machine() {
    let app = app();

    let (status, body) = send(&app, "POST", "/api/machines", Some(vm1())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["deploymentStatus"], "pending");

    let (status, body) = send(&app, "GET", "/api/machines/vm-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["region"], "us-west-1");

    let (_, body) = send(&app, "GET", "/api/machines", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_missing_fields_is_bad_request() {
    let app = app();
    let (status, body) = send(&app, "POST", "/api/machines", Some(json!({"id": "vm-1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("name"));
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/machines")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_missing_machine_is_not_found() {
    let app = app();
    let (status, body) = send(&app, "GET", "/api/machines/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"success": false, "error": "Machine not found"}));
}

#[tokio::test]
async fn test_patch_merges_fields() {
    let app = app();
    send(&app, "POST", "/api/machines", Some(vm1())).await;

    let (status, body) = send(
        &app,
        "PATCH",
        "/api/machines/vm-1",
        Some(json!({"instanceSize": "t3.large"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["instanceSize"], "t3.large");
    assert_eq!(body["data"]["region"], "us-west-1");

    let (status, _) = send(
        &app,
        "PATCH",
        "/api/machines/missing",
        Some(json!({"name": "B"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_machine() {
    let app = app();
    send(&app, "POST", "/api/machines", Some(vm1())).await;

    let (status, body) = send(&app, "DELETE", "/api/machines/vm-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let (status, _) = send(&app, "DELETE", "/api/machines/vm-1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deploy_success_updates_store() {
    let app = app();
    send(&app, "POST", "/api/machines", Some(vm1())).await;

    let (status, body) = send(&app, "POST", "/api/deploy", Some(json!({"vmConfig": vm1()}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["vmId"], "vm-1");
    assert_eq!(body["publicIp"], PUBLIC_IP);
    assert_eq!(body["sshKeyName"], "vm-key-vm-1");
    assert!(body["sshCommand"].as_str().unwrap().starts_with("ssh -i "));
    assert!(body.get("error").is_none());
    assert!(body.get("warning").is_none());

    let (_, stored) = send(&app, "GET", "/api/machines/vm-1", None).await;
    assert_eq!(stored["data"]["isDeployed"], true);
    assert_eq!(stored["data"]["deploymentStatus"], "deployed");
    assert_eq!(stored["data"]["publicIp"], PUBLIC_IP);

    let (_, deployed) = send(&app, "GET", "/api/machines?status=deployed", None).await;
    assert_eq!(deployed["data"].as_array().unwrap().len(), 1);

    // Stale client copy still says pending; the stored status wins
    let (status, body) = send(&app, "POST", "/api/deploy", Some(json!({"vmConfig": vm1()}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(app.runner.count("terraform apply"), 1);
}

#[tokio::test]
async fn test_deploy_failure_is_server_error_and_resettable() {
    let app = app();
    app.runner.fail("terraform apply");
    send(&app, "POST", "/api/machines", Some(vm1())).await;

    let (status, body) = send(&app, "POST", "/api/deploy", Some(json!({"vmConfig": vm1()}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["vmId"], "vm-1");
    assert_eq!(body["error"], "Terraform apply failed");
    assert!(body.get("publicIp").is_none());

    let (_, stored) = send(&app, "GET", "/api/machines/vm-1", None).await;
    assert_eq!(stored["data"]["deploymentStatus"], "failed");
    assert_eq!(stored["data"]["isDeployed"], false);

    let (status, body) = send(&app, "GET", "/api/deployments/vm-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "failed");
    assert_eq!(body["data"]["error"], "Terraform apply failed");

    let (status, body) = send(&app, "POST", "/api/deployments/vm-1/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");

    let (_, stored) = send(&app, "GET", "/api/machines/vm-1", None).await;
    assert_eq!(stored["data"]["deploymentStatus"], "pending");
}

#[tokio::test]
async fn test_bootstrap_failure_is_reported_as_warning() {
    let app = app();
    app.runner.fail("scp");
    send(&app, "POST", "/api/machines", Some(vm1())).await;

    let (status, body) = send(&app, "POST", "/api/deploy", Some(json!({"vmConfig": vm1()}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["warning"].as_str().unwrap().contains("may be incomplete"));
}

#[tokio::test]
async fn test_machine_recreated_during_deploy_starts_fresh() {
    let app = app();
    app.runner.delay("terraform apply", Duration::from_millis(300));
    send(&app, "POST", "/api/machines", Some(vm1())).await;

    let (first, _) = tokio::join!(
        send(&app, "POST", "/api/deploy", Some(json!({"vmConfig": vm1()}))),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let (status, _) = send(&app, "DELETE", "/api/machines/vm-1", None).await;
            assert_eq!(status, StatusCode::OK);
            let (status, _) = send(&app, "POST", "/api/machines", Some(vm1())).await;
            assert_eq!(status, StatusCode::OK);

            // Refused while the old attempt runs, without touching the record
            let (status, _) =
                send(&app, "POST", "/api/deploy", Some(json!({"vmConfig": vm1()}))).await;
            assert_eq!(status, StatusCode::CONFLICT);
            let (_, stored) = send(&app, "GET", "/api/machines/vm-1", None).await;
            assert_eq!(stored["data"]["deploymentStatus"], "pending");
        }
    );
    assert_eq!(first.0, StatusCode::OK);

    // The old outcome belongs to the deleted record
    let (_, stored) = send(&app, "GET", "/api/machines/vm-1", None).await;
    assert_eq!(stored["data"]["deploymentStatus"], "pending");
    assert_eq!(stored["data"]["isDeployed"], false);
    let (_, status) = send(&app, "GET", "/api/deployments/vm-1", None).await;
    assert_eq!(status["data"]["status"], "pending");

    let (status, body) = send(&app, "POST", "/api/deploy", Some(json!({"vmConfig": vm1()}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(app.runner.count("terraform apply"), 2);

    let (_, stored) = send(&app, "GET", "/api/machines/vm-1", None).await;
    assert_eq!(stored["data"]["deploymentStatus"], "deployed");
}

#[tokio::test]
async fn test_refused_deploy_leaves_stored_status() {
    let app = app();
    app.runner.delay("terraform apply", Duration::from_millis(200));
    send(&app, "POST", "/api/machines", Some(vm1())).await;

    let (first, second) = tokio::join!(
        send(&app, "POST", "/api/deploy", Some(json!({"vmConfig": vm1()}))),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            send(&app, "POST", "/api/deploy", Some(json!({"vmConfig": vm1()}))).await
        }
    );
    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::CONFLICT);

    let (_, stored) = send(&app, "GET", "/api/machines/vm-1", None).await;
    assert_eq!(stored["data"]["deploymentStatus"], "deployed");
}

#[tokio::test]
async fn test_unsaved_outcome_is_reported_as_warning() {
    let app = app();
    app.runner.delay("terraform apply", Duration::from_millis(200));
    send(&app, "POST", "/api/machines", Some(vm1())).await;

    let ((status, body), _) = tokio::join!(
        send(&app, "POST", "/api/deploy", Some(json!({"vmConfig": vm1()}))),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            std::fs::write(app.dir.path().join("machines.json"), "{not json").unwrap();
        }
    );

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["publicIp"], PUBLIC_IP);
    assert!(body["warning"]
        .as_str()
        .unwrap()
        .contains("could not be saved"));
}

#[tokio::test]
async fn test_deploy_unstored_machine() {
    let app = app();
    let (status, body) = send(&app, "POST", "/api/deploy", Some(json!({"vmConfig": vm1()}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = send(&app, "GET", "/api/machines/vm-1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deploy_requires_full_config() {
    let app = app();
    let (status, _) = send(
        &app,
        "POST",
        "/api/deploy",
        Some(json!({"vmConfig": {"id": "vm-1"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.runner.calls().is_empty());
}

#[tokio::test]
async fn test_deployment_status_unknown_is_not_found() {
    let app = app();
    let (status, _) = send(&app, "GET", "/api/deployments/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "POST", "/api/deployments/nope/reset", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_catalog() {
    let app = app();
    let (status, body) = send(&app, "GET", "/api/catalog", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["regions"].as_array().unwrap().len(), 9);
    assert_eq!(body["data"]["regions"][0]["name"], "Virginia");
    assert_eq!(body["data"]["predefinedMachines"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_select() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/select",
        Some(json!({"prompt": "a small box"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Claude machine");

    let (status, _) = send(&app, "POST", "/api/select", Some(json!({"prompt": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
