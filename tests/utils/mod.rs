#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use biolink_webhooks::config::{Config, VaultBackend};
use biolink_webhooks::server::Server;
use reqwest::Client;
use serde_json::{Value, json};

/// Backoff used by test servers so a full three-attempt cycle takes well under a second.
pub const TEST_BACKOFF_MS: u64 = 100;

pub fn test_config() -> Config {
    let mut config = Config::load().unwrap();
    config.server.host = "localhost".to_string();
    config.server.port = 0;
    config.webhook.base_backoff_ms = TEST_BACKOFF_MS;
    config.webhook.jitter = false;
    config.webhook.request_timeout_secs = 5;
    config.vault.backend = VaultBackend::Memory;
    config
}

pub async fn spawn_server() -> String {
    spawn_server_with(test_config()).await
}

pub async fn spawn_server_with(config: Config) -> String {
    let server = Server::new(&config).await.unwrap();

    let port = server.port();
    tokio::spawn(server.run());

    format!("http://{}:{}", config.server.host, port)
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await });
    format!("http://{addr}")
}

/// One request seen by a [`Receiver`].
#[derive(Debug, Clone)]
pub struct Received {
    pub timestamp: String,
    pub signature: String,
    pub user_agent: String,
    pub body: String,
    pub at: Instant,
}

#[derive(Default)]
struct ReceiverState {
    /// Status per request; the last entry repeats once the script runs out.
    script: Vec<u16>,
    delay: Duration,
    requests: Vec<Received>,
}

/// A webhook endpoint that records every request and answers from a script.
#[derive(Clone)]
pub struct Receiver {
    pub url: String,
    state: Arc<Mutex<ReceiverState>>,
}

impl Receiver {
    pub async fn start(script: &[u16]) -> Self {
        Self::start_with_delay(script, Duration::ZERO).await
    }

    pub async fn start_with_delay(script: &[u16], delay: Duration) -> Self {
        let state = Arc::new(Mutex::new(ReceiverState {
            script: script.to_vec(),
            delay,
            requests: Vec::new(),
        }));
        let router = Router::new()
            .route("/hook", post(record))
            .with_state(state.clone());
        let base = serve(router).await;

        Self {
            url: format!("{base}/hook"),
            state,
        }
    }

    pub fn requests(&self) -> Vec<Received> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn hits(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }
}

async fn record(
    State(state): State<Arc<Mutex<ReceiverState>>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };

    let (status, delay) = {
        let mut state = state.lock().unwrap();
        let index = state.requests.len();
        let status = state
            .script
            .get(index)
            .or(state.script.last())
            .copied()
            .unwrap_or(200);
        state.requests.push(Received {
            timestamp: header("x-biolink-timestamp"),
            signature: header("x-biolink-signature"),
            user_agent: header("user-agent"),
            body,
            at: Instant::now(),
        });
        (status, state.delay)
    };

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    (StatusCode::from_u16(status).unwrap(), format!("answered {status}"))
}

/// A secret manager that stores secrets but refuses to hand them back.
pub async fn spawn_unreadable_vault() -> String {
    let router = Router::new()
        .route(
            "/secrets",
            post(|| async { axum::Json(json!({ "id": "sec_1" })) }),
        )
        .route(
            "/secrets/{id}",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE })
                .delete(|| async { StatusCode::NO_CONTENT }),
        );
    serve(router).await
}

/// Thin client for the management API.
pub struct Api {
    pub addr: String,
    pub client: Client,
}

impl Api {
    pub fn new(addr: String) -> Self {
        Self {
            addr,
            client: Client::new(),
        }
    }

    /// Registers an endpoint and returns `(endpoint_id, secret)`.
    pub async fn create_endpoint(
        &self,
        owner: &str,
        url: &str,
        events: &[&str],
    ) -> (String, String) {
        let response = self
            .client
            .post(format!("{}/owners/{owner}/endpoints", self.addr))
            .json(&json!({ "url": url, "events": events }))
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);

        let body: Value = response.json().await.unwrap();
        let id = body["data"]["endpoint"]["id"].as_str().unwrap().to_string();
        let secret = body["data"]["secret"].as_str().unwrap().to_string();
        (id, secret)
    }

    /// Emits an event and returns the number of deliveries dispatched.
    pub async fn emit(&self, owner: &str, event: &str, data: Value) -> u64 {
        let response = self
            .client
            .post(format!("{}/owners/{owner}/events", self.addr))
            .json(&json!({ "event": event, "data": data }))
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

        let body: Value = response.json().await.unwrap();
        body["data"]["dispatched"].as_u64().unwrap()
    }

    pub async fn deliveries(&self, owner: &str, endpoint_id: &str) -> Vec<Value> {
        let response = self
            .client
            .get(format!(
                "{}/owners/{owner}/endpoints/{endpoint_id}/deliveries",
                self.addr
            ))
            .send()
            .await
            .expect("Failed to execute request.");
        assert!(response.status().is_success());

        let body: Value = response.json().await.unwrap();
        body["data"].as_array().cloned().unwrap_or_default()
    }

    /// Polls the delivery history until the newest delivery leaves `Pending`.
    pub async fn wait_for_outcome(&self, owner: &str, endpoint_id: &str) -> Value {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(delivery) = self.deliveries(owner, endpoint_id).await.into_iter().next()
                && delivery["attempts"].as_u64().unwrap_or(0) > 0
            {
                return delivery;
            }
            assert!(Instant::now() < deadline, "delivery never completed");
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    pub async fn retry(&self, owner: &str, delivery_id: &str) -> reqwest::Response {
        self.client
            .post(format!(
                "{}/owners/{owner}/deliveries/{delivery_id}/retry",
                self.addr
            ))
            .send()
            .await
            .expect("Failed to execute request.")
    }
}
