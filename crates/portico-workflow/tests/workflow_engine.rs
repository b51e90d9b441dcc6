use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use assert_json_diff::assert_json_include;
use portico_registry::{DEFINITION_FILE, EndpointRegistry};
use portico_workflow::{
    ReqwestTransport, RunOptions, StaticEnvironments, StepExecutor, WorkflowEngine, WorkflowError,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers with the request body, so step outputs mirror their payloads.
struct Echo;

impl Respond for Echo {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(201).set_body_bytes(request.body.clone())
    }
}

fn write(root: &Path, relative: &str, body: Value) {
    let dir = root.join(relative);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(DEFINITION_FILE), body.to_string()).unwrap();
}

fn sales_order_definitions(root: &Path, backend: &str) {
    write(
        root,
        "Proxy/Internal/Lines",
        json!({"Type": "Private", "Url": format!("{backend}/svc/Lines"), "Methods": ["POST"]}),
    );
    write(
        root,
        "Proxy/Orders",
        json!({"Type": "Standard", "Url": format!("{backend}/svc/Orders"), "Methods": ["GET", "POST"]}),
    );
    write(
        root,
        "Proxy/Notify",
        json!({"Type": "Standard", "Url": format!("{backend}/svc/Notify"), "Methods": ["POST"]}),
    );
    write(
        root,
        "Composite/SalesOrder",
        json!({
            "Type": "Composite",
            "AllowedEnvironments": ["prod"],
            "CompositeConfig": {
                "Name": "SalesOrder",
                "Steps": [
                    {
                        "Name": "CreateLines",
                        "Endpoint": "Internal/Lines",
                        "IsArray": true,
                        "ArrayProperty": "Lines",
                        "TemplateTransformations": {"TransactionKey": "$guid"}
                    },
                    {
                        "Name": "CreateHeader",
                        "Endpoint": "Orders",
                        "SourceProperty": "Header",
                        "DependsOn": "Notify",
                        "TemplateTransformations": {
                            "TransactionKey": "$prev.CreateLines.0.TransactionKey",
                            "RequestId": "$requestid",
                            "NotifyId": "$prev.Notify.Id"
                        }
                    },
                    {
                        "Name": "Notify",
                        "Endpoint": "Notify",
                        "SourceProperty": "CreateHeader"
                    }
                ]
            }
        }),
    );
}

fn engine(root: &Path) -> WorkflowEngine {
    let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
    let environments = StaticEnvironments::new(vec!["prod".into(), "dev".into()])
        .with_headers("prod", [("X-Tenant", "acme")]);
    let executor = StepExecutor::new(Arc::new(transport), Arc::new(environments), "gw-test");
    WorkflowEngine::new(Arc::new(EndpointRegistry::new(root)), executor)
}

fn request_body() -> Vec<u8> {
    json!({
        "Header": {"Customer": "C-1"},
        "Lines": [{"Item": "A"}, {"Item": "B"}, {"Item": "C"}]
    })
    .to_string()
    .into_bytes()
}

fn options() -> RunOptions {
    RunOptions {
        gateway_base: "https://gw".into(),
        correlation_id: Some("req-123".into()),
    }
}

#[tokio::test]
async fn test_header_carries_key_generated_for_first_line() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/svc/Lines"))
        .and(header("ServerName", "gw-test"))
        .and(header("DatabaseName", "prod"))
        .and(header("X-Tenant", "acme"))
        .respond_with(Echo)
        .expect(3)
        .mount(&backend)
        .await;
    Mock::given(method("POST"))
        .and(path("/svc/Orders"))
        .respond_with(Echo)
        .expect(1)
        .mount(&backend)
        .await;
    Mock::given(method("POST"))
        .and(path("/svc/Notify"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&backend)
        .await;

    let tmp = TempDir::new().unwrap();
    sales_order_definitions(tmp.path(), &backend.uri());
    let result = engine(tmp.path())
        .run("SalesOrder", "prod", &request_body(), &options())
        .await
        .unwrap();

    assert!(result.success, "unexpected failure: {result:?}");
    assert_eq!(result.http_status(), 200);
    let keys: Vec<&String> = result.step_results.keys().collect();
    assert_eq!(keys, ["CreateLines", "CreateHeader", "Notify"]);

    let lines = result.step_results["CreateLines"].as_array().unwrap();
    let items: Vec<&str> = lines.iter().map(|l| l["Item"].as_str().unwrap()).collect();
    assert_eq!(items, ["A", "B", "C"]);
    let key = lines[0]["TransactionKey"].as_str().unwrap();
    assert!(lines.iter().all(|l| l["TransactionKey"] == key));

    let header_result = &result.step_results["CreateHeader"];
    assert_eq!(
        header_result,
        &json!({"Customer": "C-1", "TransactionKey": key, "RequestId": "req-123"})
    );
    assert_eq!(result.step_results["Notify"], Value::Null);

    // The outbound header payload is what the backend received.
    let received = backend.received_requests().await.unwrap();
    let orders_call = received
        .iter()
        .find(|r| r.url.path() == "/svc/Orders")
        .unwrap();
    let sent: Value = serde_json::from_slice(&orders_call.body).unwrap();
    assert_eq!(sent["TransactionKey"], json!(key));
}

#[tokio::test]
async fn test_each_run_gets_a_fresh_guid() {
    let backend = MockServer::start().await;
    Mock::given(method("POST")).respond_with(Echo).mount(&backend).await;

    let tmp = TempDir::new().unwrap();
    sales_order_definitions(tmp.path(), &backend.uri());
    let engine = engine(tmp.path());

    let first = engine
        .run("SalesOrder", "prod", &request_body(), &RunOptions::default())
        .await
        .unwrap();
    let second = engine
        .run("SalesOrder", "prod", &request_body(), &RunOptions::default())
        .await
        .unwrap();

    let key = |r: &portico_workflow::CompositeResult| {
        r.step_results["CreateHeader"]["TransactionKey"].clone()
    };
    assert_ne!(key(&first), key(&second));
    assert_ne!(first.correlation_id, second.correlation_id);
}

#[tokio::test]
async fn test_backend_error_halts_with_structured_detail() {
    let backend = MockServer::start().await;
    Mock::given(path("/svc/Lines"))
        .respond_with(Echo)
        .mount(&backend)
        .await;
    Mock::given(path("/svc/Orders"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"message":"bad input"}"#))
        .mount(&backend)
        .await;
    Mock::given(path("/svc/Notify"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&backend)
        .await;

    let tmp = TempDir::new().unwrap();
    sales_order_definitions(tmp.path(), &backend.uri());
    let result = engine(tmp.path())
        .run("SalesOrder", "prod", &request_body(), &options())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.http_status(), 400);
    assert_eq!(result.step_results.len(), 1);
    assert_json_include!(
        actual: serde_json::to_value(&result).unwrap(),
        expected: json!({
            "Success": false,
            "ErrorStep": "CreateHeader",
            "StatusCode": 400,
            "ErrorDetail": {"message": "bad input"}
        })
    );
}

#[tokio::test]
async fn test_non_json_error_detail_is_truncated_text() {
    let backend = MockServer::start().await;
    Mock::given(path("/svc/Lines"))
        .respond_with(ResponseTemplate::new(503).set_body_string("u".repeat(300)))
        .mount(&backend)
        .await;

    let tmp = TempDir::new().unwrap();
    sales_order_definitions(tmp.path(), &backend.uri());
    let result = engine(tmp.path())
        .run("SalesOrder", "prod", &request_body(), &options())
        .await
        .unwrap();

    assert_eq!(result.status_code, Some(503));
    assert_eq!(result.error_step.as_deref(), Some("CreateLines"));
    assert_eq!(result.error_detail, Some(Value::String("u".repeat(200))));
    assert!(result.step_results.is_empty());
}

#[tokio::test]
async fn test_backend_urls_are_rewritten() {
    let backend = MockServer::start().await;
    let orders_url = format!("{}/svc/Orders", backend.uri());
    Mock::given(path("/svc/Lines"))
        .respond_with(Echo)
        .mount(&backend)
        .await;
    Mock::given(path("/svc/Orders"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_string(json!({"self": format!("{orders_url}/42")}).to_string()),
        )
        .mount(&backend)
        .await;
    Mock::given(path("/svc/Notify"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&backend)
        .await;

    let tmp = TempDir::new().unwrap();
    sales_order_definitions(tmp.path(), &backend.uri());
    let result = engine(tmp.path())
        .run("SalesOrder", "prod", &request_body(), &options())
        .await
        .unwrap();

    assert_eq!(
        result.step_results["CreateHeader"],
        json!({"self": "https://gw/api/prod/Orders/42"})
    );
}

#[tokio::test]
async fn test_routing_failures_run_no_step() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(Echo)
        .expect(0)
        .mount(&backend)
        .await;

    let tmp = TempDir::new().unwrap();
    sales_order_definitions(tmp.path(), &backend.uri());
    let engine = engine(tmp.path());

    let not_found = engine
        .run("Missing", "prod", &request_body(), &options())
        .await;
    assert!(matches!(not_found, Err(WorkflowError::NotFound(_))));

    let wrong_env = engine
        .run("SalesOrder", "dev", &request_body(), &options())
        .await;
    assert!(matches!(
        wrong_env,
        Err(WorkflowError::EnvironmentNotAllowed { .. })
    ));

    let unknown_env = engine
        .run("SalesOrder", "staging", &request_body(), &options())
        .await;
    assert!(matches!(
        unknown_env,
        Err(WorkflowError::EnvironmentNotAllowed { .. })
    ));

    let bad_body = engine
        .run("SalesOrder", "prod", b"not json", &options())
        .await;
    assert!(matches!(bad_body, Err(WorkflowError::InvalidBody(_))));
}

#[tokio::test]
async fn test_misconfigured_step_fails_with_400() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(Echo)
        .expect(0)
        .mount(&backend)
        .await;

    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "Proxy/ReadOnly",
        json!({"Type": "Standard", "Url": format!("{}/svc/ReadOnly", backend.uri()), "Methods": ["GET"]}),
    );
    write(
        tmp.path(),
        "Composite/Broken",
        json!({
            "Type": "Composite",
            "CompositeConfig": {"Steps": [
                {"Name": "Write", "Endpoint": "ReadOnly", "Method": "POST"},
                {"Name": "Never", "Endpoint": "Nowhere"}
            ]}
        }),
    );
    write(
        tmp.path(),
        "Composite/Dangling",
        json!({
            "Type": "Composite",
            "CompositeConfig": {"Steps": [{"Name": "Only", "Endpoint": "Nowhere"}]}
        }),
    );
    let engine = engine(tmp.path());

    let method_refused = engine
        .run("Broken", "prod", b"{}", &options())
        .await
        .unwrap();
    assert_eq!(method_refused.error_step.as_deref(), Some("Write"));
    assert_eq!(method_refused.http_status(), 400);

    let missing_target = engine
        .run("Dangling", "prod", b"{}", &options())
        .await
        .unwrap();
    assert_eq!(missing_target.error_step.as_deref(), Some("Only"));
    assert_eq!(missing_target.status_code, Some(400));
    assert!(missing_target.error_detail.is_none());
}
