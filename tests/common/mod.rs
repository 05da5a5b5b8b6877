//! Shared harness for the webhook test suites.
//!
//! Each [`TestContext`] owns a wiremock server standing in for the provider's
//! voice and task-routing APIs and a router built exactly as the binary builds
//! it, driven through `tower::ServiceExt::oneshot` without a socket.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use forward_amd::{
    config::{Config, ForwardingMode, RescheduleMode},
    provider::{ProviderCredentials, ProviderEndpoints},
    server::{build_router, build_state, AppState},
};

pub const ACCOUNT_SID: &str = "AC123";
pub const PUBLIC_URL: &str = "https://forward.example.com";
pub const CALLS_PATH: &str = "/2010-04-01/Accounts/AC123/Calls.json";

pub struct TestContext {
    pub provider: MockServer,
    pub state: AppState,
    pub router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("response body should be JSON")
    }
}

pub fn config(provider: &MockServer, mode: ForwardingMode) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 5000,
        mode,
        credentials: ProviderCredentials {
            account_sid: ACCOUNT_SID.to_string(),
            auth_token: "secret".to_string(),
        },
        endpoints: ProviderEndpoints {
            api_base: provider.uri(),
            taskrouter_base: provider.uri(),
        },
        caller_id: None,
        destination_number: Some("+15550002222".to_string()),
        workspace_name: Some("Forwarding".to_string()),
        public_url: Some(PUBLIC_URL.to_string()),
        cooldown_secs: 0,
        reschedule: RescheduleMode::Timer,
    }
}

impl TestContext {
    pub async fn conference() -> Self {
        let provider = MockServer::start().await;
        let config = config(&provider, ForwardingMode::Conference);
        Self::with_config(provider, config).await
    }

    pub async fn task_router() -> Self {
        let provider = MockServer::start().await;
        mount_workspace_catalog(&provider).await;
        let config = config(&provider, ForwardingMode::TaskRouter);
        Self::with_config(provider, config).await
    }

    pub async fn with_config(provider: MockServer, config: Config) -> Self {
        let state = build_state(config).await.expect("state should build");
        let router = build_router(state.clone());
        Self {
            provider,
            state,
            router,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        TestResponse {
            status,
            content_type,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    /// POST a provider-style form webhook.
    pub async fn webhook(&self, uri: &str, params: &[(&str, &str)]) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .expect("valid request");
        self.send(request).await
    }

    pub async fn post_json(&self, uri: &str, value: Value) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .expect("valid request");
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("valid request");
        self.send(request).await
    }

    /// Requests the provider has seen on `request_path`.
    pub async fn provider_requests(&self, request_path: &str) -> usize {
        self.provider
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }

    /// Poll until the provider has seen `count` requests on `request_path`.
    pub async fn wait_for_requests(&self, request_path: &str, count: usize) -> bool {
        for _ in 0..50 {
            if self.provider_requests(request_path).await >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

/// Answer call creation with a fixed outbound SID.
pub async fn mount_create_call(provider: &MockServer, outbound_sid: &str, expected: u64) {
    Mock::given(method("POST"))
        .and(path(CALLS_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "sid": outbound_sid,
            "status": "queued"
        })))
        .expect(expected)
        .mount(provider)
        .await;
}

pub fn call_path(sid: &str) -> String {
    format!("/2010-04-01/Accounts/{}/Calls/{}.json", ACCOUNT_SID, sid)
}

async fn mount_workspace_catalog(provider: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/Workspaces"))
        .and(query_param("FriendlyName", "Forwarding"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "workspaces": [{"sid": "WS1", "friendly_name": "Forwarding"}]
        })))
        .mount(provider)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/Workspaces/WS1/Workflows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "workflows": [{"sid": "WW1", "friendly_name": "Default Fifo Workflow"}]
        })))
        .mount(provider)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/Workspaces/WS1/Activities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "activities": [
                {"sid": "WA1", "friendly_name": "Offline"},
                {"sid": "WA2", "friendly_name": "Idle"},
                {"sid": "WA3", "friendly_name": "Temporarily Unavailable"},
                {"sid": "WA4", "friendly_name": "Busy"}
            ]
        })))
        .mount(provider)
        .await;
}
