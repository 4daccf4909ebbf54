//! HTTP API against a live server on an ephemeral port

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fleetwatch::{
    actors::ProberHandle,
    api::{ApiConfig, ApiState, spawn_api_server},
    config::ProberConfig,
    metrics::MetricsService,
    monitors::Prober,
    storage::{MemoryBackend, NewEndpoint, StorageBackend},
};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::helpers::{OpenPorts, payload};

const OPERATOR_TOKEN: &str = "test-token";

struct TestHub {
    base: String,
    client: reqwest::Client,
    cancel: CancellationToken,
}

impl TestHub {
    /// Hub with two endpoints, `web-1` (10.0.0.1, port 22 open) and `db-1`
    async fn start() -> Self {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        storage
            .insert_endpoint(NewEndpoint::new("web-1", "10.0.0.1"))
            .await
            .unwrap();
        storage
            .insert_endpoint(NewEndpoint::new("db-1", "10.0.0.2"))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let connector = OpenPorts::new(Duration::from_millis(3)).with("10.0.0.1", &[22]);
        let prober = Prober::new(storage.clone(), &ProberConfig::default())
            .with_connector(Arc::new(connector));
        let prober = ProberHandle::spawn(prober, Duration::from_secs(3600), cancel.child_token());

        let metrics = Arc::new(MetricsService::with_default_retention(storage));
        let state = ApiState::new(metrics, prober);

        let config = ApiConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            auth_token: Some(OPERATOR_TOKEN.to_string()),
            enable_cors: false,
        };
        let (addr, _task) = spawn_api_server(config, state, cancel.clone())
            .await
            .unwrap();

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            cancel,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn operator(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(OPERATOR_TOKEN)
    }

    async fn issue_token(&self, id: i64) -> String {
        let response = self
            .operator(reqwest::Method::POST, &format!("/api/metrics/{id}/token"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = response.json().await.unwrap();
        body["agent_token"].as_str().unwrap().to_string()
    }

    fn submit(&self, token: &str, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(self.url("/api/metrics/submit"))
            .header("X-Agent-Token", token)
            .json(body)
    }
}

impl Drop for TestHub {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let hub = TestHub::start().await;

    let response = hub.client.get(hub.url("/api/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage_healthy"], true);
}

#[tokio::test]
async fn test_operator_routes_require_bearer_token() {
    let hub = TestHub::start().await;

    let missing = hub
        .client
        .get(hub.url("/api/endpoints"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = hub
        .client
        .get(hub.url("/api/endpoints"))
        .bearer_auth("nope")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

    let ok = hub
        .operator(reqwest::Method::GET, "/api/endpoints")
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    let body: Value = ok.json().await.unwrap();
    assert_eq!(body["count"], 2);
    assert!(body["endpoints"][0].get("agent_token").is_none());
}

#[tokio::test]
async fn test_submit_then_query() {
    let hub = TestHub::start().await;
    let token = hub.issue_token(1).await;
    assert_eq!(token.len(), 64);

    for (cpu, memory) in [(10.0, 40.0), (20.0, 50.0)] {
        let response = hub
            .submit(&token, &serde_json::to_value(payload(cpu, memory)).unwrap())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["endpoint_id"], 1);
    }

    let history: Value = hub
        .operator(reqwest::Method::GET, "/api/metrics/1?hours=1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["endpoint_name"], "web-1");
    assert_eq!(history["hours"], 1);
    assert_eq!(history["history"].as_array().unwrap().len(), 2);
    assert_eq!(history["current"]["cpu_percent"], 20.0);
    assert_eq!(history["avg_cpu"], 15.0);
    assert_eq!(history["avg_memory"], 45.0);

    let current: Value = hub
        .operator(reqwest::Method::GET, "/api/metrics/current/all")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(current["1"]["cpu_percent"], 20.0);
    assert!(current.get("2").is_none());

    let endpoints: Value = hub
        .operator(reqwest::Method::GET, "/api/endpoints")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(endpoints["endpoints"][0]["status"], "online");
}

#[tokio::test]
async fn test_history_defaults_to_twelve_hours() {
    let hub = TestHub::start().await;

    let history: Value = hub
        .operator(reqwest::Method::GET, "/api/metrics/2")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(history["hours"], 12);
    assert_eq!(history["history"], json!([]));
    assert_eq!(history["current"], Value::Null);
    assert_eq!(history["avg_cpu"], Value::Null);
}

#[tokio::test]
async fn test_submit_rejections() {
    let hub = TestHub::start().await;
    let token = hub.issue_token(1).await;
    let valid = serde_json::to_value(payload(10.0, 10.0)).unwrap();

    let unknown = hub.submit("deadbeef", &valid).send().await.unwrap();
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);

    let missing = hub
        .client
        .post(hub.url("/api/metrics/submit"))
        .json(&valid)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let mut too_hot = valid.clone();
    too_hot["cpu_percent"] = json!(150.0);
    let response = hub.submit(&token, &too_hot).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("cpu_percent"));

    let mut negative = valid.clone();
    negative["memory_used_mb"] = json!(-1);
    let response = hub.submit(&token, &negative).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let mut malformed_bad_token = valid.clone();
    malformed_bad_token["memory_used_mb"] = json!("lots");
    let response = hub
        .submit("deadbeef", &malformed_bad_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let history: Value = hub
        .operator(reqwest::Method::GET, "/api/metrics/1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["history"], json!([]));
}

#[tokio::test]
async fn test_invalid_window_is_rejected() {
    let hub = TestHub::start().await;

    let response = hub
        .operator(reqwest::Method::GET, "/api/metrics/1?hours=0")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_token_lifecycle() {
    let hub = TestHub::start().await;

    let before = hub
        .operator(reqwest::Method::GET, "/api/metrics/1/token")
        .send()
        .await
        .unwrap();
    assert_eq!(before.status(), StatusCode::NOT_FOUND);

    let first = hub.issue_token(1).await;
    let second = hub.issue_token(1).await;
    assert_ne!(first, second);

    let fetched: Value = hub
        .operator(reqwest::Method::GET, "/api/metrics/1/token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["agent_token"], second.as_str());
    assert_eq!(fetched["endpoint_name"], "web-1");

    let valid = serde_json::to_value(payload(10.0, 10.0)).unwrap();
    let stale = hub.submit(&first, &valid).send().await.unwrap();
    assert_eq!(stale.status(), StatusCode::UNAUTHORIZED);

    let revoked = hub
        .operator(reqwest::Method::DELETE, "/api/metrics/1/token")
        .send()
        .await
        .unwrap();
    assert_eq!(revoked.status(), StatusCode::NO_CONTENT);

    let after = hub.submit(&second, &valid).send().await.unwrap();
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_endpoint_is_not_found() {
    let hub = TestHub::start().await;

    for (method, path) in [
        (reqwest::Method::GET, "/api/metrics/99"),
        (reqwest::Method::POST, "/api/metrics/99/token"),
        (reqwest::Method::DELETE, "/api/metrics/99/token"),
    ] {
        let response = hub.operator(method, path).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
    }
}

#[tokio::test]
async fn test_probe_on_demand() {
    let hub = TestHub::start().await;

    let response = hub
        .operator(reqwest::Method::POST, "/api/probe")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let batch: Value = response.json().await.unwrap();
    assert_eq!(batch["total"], 2);
    assert_eq!(batch["online"], 1);
    assert_eq!(batch["offline"], 1);

    let endpoints: Value = hub
        .operator(reqwest::Method::GET, "/api/endpoints")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(endpoints["endpoints"][0]["status"], "online");
    assert_eq!(endpoints["endpoints"][1]["status"], "offline");
}

#[tokio::test]
async fn test_malformed_id_and_window_return_json_errors() {
    let hub = TestHub::start().await;

    let response = hub
        .operator(reqwest::Method::GET, "/api/metrics/1?hours=lots")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());

    for (method, path) in [
        (reqwest::Method::GET, "/api/metrics/web-1"),
        (reqwest::Method::POST, "/api/metrics/web-1/token"),
        (reqwest::Method::GET, "/api/metrics/web-1/token"),
        (reqwest::Method::DELETE, "/api/metrics/web-1/token"),
    ] {
        let response = hub.operator(method, path).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].is_string(), "{path}");
    }
}
