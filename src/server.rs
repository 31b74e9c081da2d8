mod handlers;
mod responses;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::{Config, VaultBackend};
use crate::domain::{DeliveryLedger, EndpointRegistry, SecretVault};
use crate::infrastructure::{
    HttpSecretVault, InMemoryDeliveryLedger, InMemoryEndpointRegistry, InMemorySecretVault,
};
use crate::outbound::webhook::{
    DeliveryWorker, EventEmitter, RetryStrategy, WebhookHttpClient, WebhookManager,
};
use crate::server::handlers::deliveries::{list_deliveries, retry_delivery};
use crate::server::handlers::endpoints::{
    create_endpoint, delete_endpoint, list_endpoints, rotate_secret, update_endpoint,
};
use crate::server::handlers::events::emit_event;
use crate::server::handlers::health::health_check;
use axum::http::Method;
use axum::{
    Router,
    routing::{get, patch, post},
};
use color_eyre::eyre::{Context, Result, eyre};
use secrecy::SecretString;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Clone)]
/// The global application state shared between all request handlers.
pub(crate) struct AppState {
    manager: Arc<WebhookManager>,
    emitter: Arc<EventEmitter>,
}

impl AppState {
    /// Wire the vault, stores, delivery worker, emitter and manager together.
    fn from_config(config: &Config) -> Result<Self> {
        let vault: Arc<dyn SecretVault> = match config.vault.backend {
            VaultBackend::Memory => {
                tracing::warn!(
                    "Using in-memory secret vault; signing secrets will not survive a restart"
                );
                Arc::new(InMemorySecretVault::new())
            }
            VaultBackend::Http => {
                let url = config
                    .vault
                    .url
                    .as_deref()
                    .ok_or_else(|| eyre!("vault.url is required for the http vault backend"))?;
                let token = config.vault.token.clone().map(SecretString::from);
                let vault = HttpSecretVault::new(url, token)
                    .wrap_err("Failed to create vault client")?;
                Arc::new(vault)
            }
        };
        let registry: Arc<dyn EndpointRegistry> = Arc::new(InMemoryEndpointRegistry::new());
        let ledger: Arc<dyn DeliveryLedger> = Arc::new(InMemoryDeliveryLedger::new());

        let http_client = WebhookHttpClient::with_timeout(config.webhook.request_timeout())
            .wrap_err("Failed to create webhook HTTP client")?;
        let retry_strategy =
            RetryStrategy::new(config.webhook.base_backoff_ms).with_jitter(config.webhook.jitter);
        let worker = Arc::new(
            DeliveryWorker::new(vault.clone(), ledger.clone(), http_client)
                .with_retry_strategy(retry_strategy)
                .with_response_excerpt_chars(config.webhook.response_excerpt_chars),
        );

        let emitter = Arc::new(EventEmitter::new(
            registry.clone(),
            ledger.clone(),
            worker.clone(),
        ));
        let manager = Arc::new(
            WebhookManager::new(vault, registry, ledger, worker)
                .with_history_limit(config.webhook.history_limit),
        );

        Ok(Self { manager, emitter })
    }
}

pub struct Server {
    router: Router,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Creates a new HTTP server.
    pub async fn new(config: &Config) -> Result<Self> {
        let trace_layer =
            TraceLayer::new_for_http().make_span_with(|request: &'_ axum::extract::Request<_>| {
                let uri = request.uri().to_string();
                tracing::info_span!("request", method = %request.method(), uri)
            });

        let cors_layer = CorsLayer::new()
            .allow_origin(Any)
            .allow_headers(Any)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ]);

        let state = AppState::from_config(config)?;

        let router = Router::new()
            .route("/health", get(health_check))
            .route(
                "/owners/{owner_id}/endpoints",
                post(create_endpoint).get(list_endpoints),
            )
            .route(
                "/owners/{owner_id}/endpoints/{id}",
                patch(update_endpoint).delete(delete_endpoint),
            )
            .route(
                "/owners/{owner_id}/endpoints/{id}/rotate-secret",
                post(rotate_secret),
            )
            .route(
                "/owners/{owner_id}/endpoints/{id}/deliveries",
                get(list_deliveries),
            )
            .route(
                "/owners/{owner_id}/deliveries/{id}/retry",
                post(retry_delivery),
            )
            .route("/owners/{owner_id}/events", post(emit_event))
            .layer(cors_layer)
            .layer(trace_layer)
            .with_state(state);

        let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
            .await
            .wrap_err_with(|| format!("Failed to bind to port {}", config.server.port))?;
        let local_addr = listener
            .local_addr()
            .wrap_err("Failed to read bound address")?;

        Ok(Self {
            router,
            listener,
            local_addr,
        })
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Runs the HTTP server.
    pub async fn run(self) -> Result<()> {
        tracing::info!("Server listening on {}", self.local_addr);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}
