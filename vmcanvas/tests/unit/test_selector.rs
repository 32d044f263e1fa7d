//! Machine selector tests against a mock messages API

use secrecy::SecretString;
use serde_json::json;
use vmcanvas::models::catalog::predefined_machines;
use vmcanvas::selector::{AnthropicSelector, MachineSelector};
use vmcanvas::storage::settings::SelectorSettings;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn selector(server: &MockServer) -> AnthropicSelector {
    let settings = SelectorSettings {
        base_url: server.uri(),
        timeout_secs: 5,
        ..Default::default()
    };
    AnthropicSelector::with_api_key(&settings, Some(SecretString::from("test-key".to_string())))
        .unwrap()
}

fn reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "msg_1",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": text}]
    }))
}

#[tokio::test]
async fn test_selects_numbered_machine() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({"max_tokens": 10})))
        .respond_with(reply("2"))
        .expect(1)
        .mount(&server)
        .await;

    let machine = selector(&server).select("small cheap box in Virginia").await;
    assert_eq!(machine, predefined_machines()[1]);
}

#[tokio::test]
async fn test_out_of_range_answer_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(reply("7"))
        .mount(&server)
        .await;

    let machine = selector(&server).select("anything").await;
    assert_eq!(machine, predefined_machines()[0]);
}

#[tokio::test]
async fn test_non_text_reply_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "tool_use", "id": "t1", "name": "x", "input": {}}]
        })))
        .mount(&server)
        .await;

    let machine = selector(&server).select("anything").await;
    assert_eq!(machine, predefined_machines()[0]);
}

#[tokio::test]
async fn test_api_error_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let machine = selector(&server).select("anything").await;
    assert_eq!(machine, predefined_machines()[0]);
}

#[tokio::test]
async fn test_missing_key_never_calls_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(reply("2"))
        .expect(0)
        .mount(&server)
        .await;

    let settings = SelectorSettings {
        base_url: server.uri(),
        ..Default::default()
    };
    let selector = AnthropicSelector::with_api_key(&settings, None).unwrap();
    assert_eq!(selector.select("anything").await, predefined_machines()[0]);
}

#[test]
fn test_invalid_base_url_is_config_error() {
    let settings = SelectorSettings {
        base_url: "not a url".to_string(),
        ..Default::default()
    };
    assert!(AnthropicSelector::with_api_key(&settings, None).is_err());
}
