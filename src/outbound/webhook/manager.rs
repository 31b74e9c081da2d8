// Endpoint management and delivery visibility
//
// Manages:
// - Endpoint lifecycle (create, list, update, delete) with the signing secret
//   held in the vault and only a reference kept on the endpoint
// - Secret rotation
// - Delivery listing and manual retry of failed deliveries

use rand::RngCore;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::events::EventType;
use crate::domain::models::{Delivery, DeliveryState, Endpoint, EndpointValidationError};
use crate::domain::ports::{
    DeliveryLedger, EndpointRegistry, RepositoryError, SecretVault, VaultError,
};
use crate::outbound::webhook::delivery_worker::DeliveryWorker;

const SECRET_PREFIX: &str = "whsec_";
const SECRET_BYTES: usize = 32;
const SECRET_NAME: &str = "webhook-signing-secret";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEndpoint {
    pub url: String,
    pub events: BTreeSet<EventType>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEndpoint {
    pub url: Option<String>,
    pub events: Option<BTreeSet<EventType>>,
    pub is_active: Option<bool>,
}

/// An endpoint together with its plaintext signing secret.
///
/// Only produced by creation and rotation; the secret cannot be fetched again.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointWithSecret {
    pub endpoint: Endpoint,
    pub secret: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Validation(#[from] EndpointValidationError),

    #[error("Delivery {id} is {state:?} and cannot be retried")]
    NotRetryable { id: Uuid, state: DeliveryState },

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct WebhookManager {
    vault: Arc<dyn SecretVault>,

    registry: Arc<dyn EndpointRegistry>,

    ledger: Arc<dyn DeliveryLedger>,

    worker: Arc<DeliveryWorker>,

    /// Number of deliveries returned per endpoint listing.
    history_limit: usize,
}

impl WebhookManager {
    pub const DEFAULT_HISTORY_LIMIT: usize = 50;

    pub fn new(
        vault: Arc<dyn SecretVault>,
        registry: Arc<dyn EndpointRegistry>,
        ledger: Arc<dyn DeliveryLedger>,
        worker: Arc<DeliveryWorker>,
    ) -> Self {
        Self {
            vault,
            registry,
            ledger,
            worker,
            history_limit: Self::DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    /// Register an endpoint and return its secret, exactly once.
    pub async fn create_endpoint(
        &self,
        owner_id: &str,
        request: CreateEndpoint,
    ) -> Result<EndpointWithSecret, ManagerError> {
        let mut endpoint = Endpoint::new(
            owner_id.to_string(),
            request.url,
            request.events,
            String::new(),
        )?;

        let secret = generate_secret();
        endpoint.secret_ref = self
            .vault
            .store(owner_id, SECRET_NAME, SecretString::from(secret.clone()))
            .await?;
        let secret_ref = endpoint.secret_ref.clone();

        let endpoint = match self.registry.insert(endpoint).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                // Insert failed after the vault write; don't leave the secret behind.
                self.forget_secret(&secret_ref).await;
                return Err(e.into());
            }
        };

        info!(
            owner_id = %owner_id,
            endpoint_id = %endpoint.id,
            url = %endpoint.url,
            "Webhook endpoint created"
        );
        Ok(EndpointWithSecret { endpoint, secret })
    }

    pub async fn list_endpoints(&self, owner_id: &str) -> Result<Vec<Endpoint>, ManagerError> {
        Ok(self.registry.list_by_owner(owner_id).await?)
    }

    pub async fn get_endpoint(&self, owner_id: &str, id: Uuid) -> Result<Endpoint, ManagerError> {
        self.registry
            .get(id)
            .await?
            .filter(|e| e.owner_id == owner_id)
            .ok_or_else(|| ManagerError::NotFound(format!("Endpoint {id}")))
    }

    /// Toggle active, change subscribed events or url. Re-validates the result.
    pub async fn update_endpoint(
        &self,
        owner_id: &str,
        id: Uuid,
        changes: UpdateEndpoint,
    ) -> Result<Endpoint, ManagerError> {
        let mut endpoint = self.get_endpoint(owner_id, id).await?;

        if let Some(url) = changes.url {
            endpoint.url = url;
        }
        if let Some(events) = changes.events {
            endpoint.events = events;
        }
        if let Some(is_active) = changes.is_active {
            endpoint.is_active = is_active;
        }
        endpoint.validate()?;

        let updated = self
            .registry
            .update(endpoint)
            .await?
            .ok_or_else(|| ManagerError::NotFound(format!("Endpoint {id}")))?;

        info!(
            endpoint_id = %id,
            is_active = updated.is_active,
            events = updated.events.len(),
            "Webhook endpoint updated"
        );
        Ok(updated)
    }

    /// Delete an endpoint, its deliveries and its vault secret.
    ///
    /// The registry row goes first so no new emission can resolve the
    /// endpoint while its deliveries are being removed.
    pub async fn delete_endpoint(&self, owner_id: &str, id: Uuid) -> Result<(), ManagerError> {
        let endpoint = self.get_endpoint(owner_id, id).await?;

        self.registry.delete(id).await?;
        let removed = self.ledger.delete_for_endpoint(id).await?;
        self.forget_secret(&endpoint.secret_ref).await;

        info!(
            endpoint_id = %id,
            deliveries_removed = removed,
            "Webhook endpoint deleted"
        );
        Ok(())
    }

    /// Replace the signing secret. The new plaintext is returned once.
    pub async fn rotate_secret(
        &self,
        owner_id: &str,
        id: Uuid,
    ) -> Result<EndpointWithSecret, ManagerError> {
        let mut endpoint = self.get_endpoint(owner_id, id).await?;
        let previous_ref = endpoint.secret_ref.clone();

        let secret = generate_secret();
        endpoint.secret_ref = self
            .vault
            .store(owner_id, SECRET_NAME, SecretString::from(secret.clone()))
            .await?;
        let new_ref = endpoint.secret_ref.clone();

        let endpoint = match self.registry.update(endpoint).await {
            Ok(Some(endpoint)) => endpoint,
            Ok(None) => {
                self.forget_secret(&new_ref).await;
                return Err(ManagerError::NotFound(format!("Endpoint {id}")));
            }
            Err(e) => {
                self.forget_secret(&new_ref).await;
                return Err(e.into());
            }
        };
        self.forget_secret(&previous_ref).await;

        info!(endpoint_id = %id, "Webhook signing secret rotated");
        Ok(EndpointWithSecret { endpoint, secret })
    }

    /// Most recent deliveries of an endpoint, newest first.
    pub async fn list_deliveries(
        &self,
        owner_id: &str,
        endpoint_id: Uuid,
    ) -> Result<Vec<Delivery>, ManagerError> {
        self.get_endpoint(owner_id, endpoint_id).await?;
        Ok(self
            .ledger
            .list_for_endpoint(endpoint_id, self.history_limit)
            .await?)
    }

    /// Re-run a failed delivery with its original payload, in the background.
    ///
    /// The row is reopened atomically, so two concurrent retries of the same
    /// delivery cannot both start a cycle.
    pub async fn retry_delivery(
        &self,
        owner_id: &str,
        delivery_id: Uuid,
    ) -> Result<Delivery, ManagerError> {
        let delivery = self
            .ledger
            .get(delivery_id)
            .await?
            .ok_or_else(|| ManagerError::NotFound(format!("Delivery {delivery_id}")))?;

        let endpoint = self
            .get_endpoint(owner_id, delivery.endpoint_id)
            .await
            .map_err(|e| match e {
                ManagerError::NotFound(_) => {
                    ManagerError::NotFound(format!("Delivery {delivery_id}"))
                }
                other => other,
            })?;

        let reopened = self
            .ledger
            .reopen_failed(delivery_id)
            .await?
            .ok_or(ManagerError::NotRetryable {
                id: delivery_id,
                state: delivery.state(),
            })?;

        info!(
            delivery_id = %delivery_id,
            endpoint_id = %endpoint.id,
            "Manual retry requested"
        );
        drop(self.worker.spawn(delivery_id, endpoint));
        Ok(reopened)
    }

    async fn forget_secret(&self, vault_id: &str) {
        if vault_id.is_empty() {
            return;
        }
        if let Err(e) = self.vault.delete(vault_id).await {
            warn!(vault_id = %vault_id, error = %e, "Failed to delete signing secret");
        }
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    format!("{SECRET_PREFIX}{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DeliveryOutcome;
    use crate::infrastructure::{
        InMemoryDeliveryLedger, InMemoryEndpointRegistry, InMemorySecretVault,
    };
    use crate::outbound::webhook::emitter::EventEmitter;
    use crate::outbound::webhook::http_client::WebhookHttpClient;
    use async_trait::async_trait;
    use secrecy::ExposeSecret;
    use std::time::Duration;

    struct Fixture {
        manager: WebhookManager,
        vault: Arc<InMemorySecretVault>,
        ledger: Arc<InMemoryDeliveryLedger>,
    }

    fn fixture() -> Fixture {
        let vault = Arc::new(InMemorySecretVault::new());
        let registry = Arc::new(InMemoryEndpointRegistry::new());
        let ledger = Arc::new(InMemoryDeliveryLedger::new());
        let worker = Arc::new(DeliveryWorker::new(
            vault.clone(),
            ledger.clone(),
            WebhookHttpClient::new().unwrap(),
        ));
        Fixture {
            manager: WebhookManager::new(vault.clone(), registry, ledger.clone(), worker),
            vault,
            ledger,
        }
    }

    fn request(url: &str, events: &[EventType]) -> CreateEndpoint {
        CreateEndpoint {
            url: url.to_string(),
            events: events.iter().copied().collect(),
        }
    }

    #[tokio::test]
    async fn test_create_returns_secret_once_and_stores_only_reference() {
        let fx = fixture();
        let created = fx
            .manager
            .create_endpoint(
                "owner-1",
                request("https://hooks.example.com", &[EventType::LinkClicked]),
            )
            .await
            .unwrap();

        assert!(created.secret.starts_with("whsec_"));
        assert_eq!(created.secret.len(), "whsec_".len() + 64);

        let stored = fx.vault.read(&created.endpoint.secret_ref).await.unwrap();
        assert_eq!(stored.expose_secret(), created.secret);

        let listed = fx.manager.list_endpoints("owner-1").await.unwrap();
        let row = serde_json::to_string(&listed).unwrap();
        assert!(!row.contains(&created.secret));
    }

    #[tokio::test]
    async fn test_invalid_endpoint_leaves_vault_untouched() {
        let fx = fixture();
        let result = fx
            .manager
            .create_endpoint("owner-1", request("not a url", &[EventType::PageViewed]))
            .await;

        assert!(matches!(result, Err(ManagerError::Validation(_))));
        assert!(fx.vault.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_toggles_and_revalidates() {
        let fx = fixture();
        let created = fx
            .manager
            .create_endpoint(
                "owner-1",
                request("https://hooks.example.com", &[EventType::PageViewed]),
            )
            .await
            .unwrap();
        let id = created.endpoint.id;

        let updated = fx
            .manager
            .update_endpoint(
                "owner-1",
                id,
                UpdateEndpoint {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated.is_active);

        let result = fx
            .manager
            .update_endpoint(
                "owner-1",
                id,
                UpdateEndpoint {
                    events: Some(BTreeSet::new()),
                    is_active: Some(true),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(ManagerError::Validation(EndpointValidationError::NoEvents))
        ));
    }

    #[tokio::test]
    async fn test_other_owner_cannot_see_endpoint() {
        let fx = fixture();
        let created = fx
            .manager
            .create_endpoint(
                "owner-1",
                request("https://hooks.example.com", &[EventType::PageViewed]),
            )
            .await
            .unwrap();

        let result = fx.manager.get_endpoint("owner-2", created.endpoint.id).await;
        assert!(matches!(result, Err(ManagerError::NotFound(_))));

        let result = fx
            .manager
            .list_deliveries("owner-2", created.endpoint.id)
            .await;
        assert!(matches!(result, Err(ManagerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_deliveries_and_secret() {
        let fx = fixture();
        let created = fx
            .manager
            .create_endpoint(
                "owner-1",
                request("https://hooks.example.com", &[EventType::PageViewed]),
            )
            .await
            .unwrap();
        let id = created.endpoint.id;
        fx.ledger
            .insert(Delivery::pending(id, EventType::PageViewed, "{}".into()))
            .await
            .unwrap();

        fx.manager.delete_endpoint("owner-1", id).await.unwrap();

        assert!(fx.ledger.all().await.is_empty());
        assert!(fx.vault.is_empty().await);
        assert!(fx.manager.list_endpoints("owner-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rotate_secret_replaces_vault_entry() {
        let fx = fixture();
        let created = fx
            .manager
            .create_endpoint(
                "owner-1",
                request("https://hooks.example.com", &[EventType::PageViewed]),
            )
            .await
            .unwrap();

        let rotated = fx
            .manager
            .rotate_secret("owner-1", created.endpoint.id)
            .await
            .unwrap();

        assert_ne!(rotated.secret, created.secret);
        assert_ne!(rotated.endpoint.secret_ref, created.endpoint.secret_ref);
        assert!(fx.vault.read(&created.endpoint.secret_ref).await.is_err());
        assert_eq!(fx.vault.len().await, 1);
    }

    #[tokio::test]
    async fn test_only_failed_deliveries_can_be_retried() {
        let fx = fixture();
        let created = fx
            .manager
            .create_endpoint(
                "owner-1",
                request("http://127.0.0.1:9/hook", &[EventType::PageViewed]),
            )
            .await
            .unwrap();
        let delivery = fx
            .ledger
            .insert(Delivery::pending(created.endpoint.id, EventType::PageViewed, "{}".into()))
            .await
            .unwrap();

        let result = fx.manager.retry_delivery("owner-1", delivery.id).await;
        assert!(matches!(
            result,
            Err(ManagerError::NotRetryable {
                state: DeliveryState::Pending,
                ..
            })
        ));

        fx.ledger
            .record_outcome(delivery.id, DeliveryOutcome::failed(Some(500), 3, "err".into(), None))
            .await
            .unwrap();

        let result = fx.manager.retry_delivery("owner-2", delivery.id).await;
        assert!(matches!(result, Err(ManagerError::NotFound(_))));

        let reopened = fx.manager.retry_delivery("owner-1", delivery.id).await.unwrap();
        assert_eq!(reopened.state(), DeliveryState::Pending);
        assert_eq!(reopened.payload, "{}");
    }

    /// Registry whose delete stalls before removing the row.
    struct SlowDelete {
        inner: InMemoryEndpointRegistry,
        delay: Duration,
    }

    #[async_trait]
    impl EndpointRegistry for SlowDelete {
        async fn insert(&self, endpoint: Endpoint) -> Result<Endpoint, RepositoryError> {
            self.inner.insert(endpoint).await
        }
        async fn get(&self, id: Uuid) -> Result<Option<Endpoint>, RepositoryError> {
            self.inner.get(id).await
        }
        async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Endpoint>, RepositoryError> {
            self.inner.list_by_owner(owner_id).await
        }
        async fn find_subscribed(
            &self,
            owner_id: &str,
            event: EventType,
        ) -> Result<Vec<Endpoint>, RepositoryError> {
            self.inner.find_subscribed(owner_id, event).await
        }
        async fn update(&self, endpoint: Endpoint) -> Result<Option<Endpoint>, RepositoryError> {
            self.inner.update(endpoint).await
        }
        async fn delete(&self, id: Uuid) -> Result<Option<Endpoint>, RepositoryError> {
            tokio::time::sleep(self.delay).await;
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_delete_racing_emit_leaves_no_deliveries() {
        let vault = Arc::new(InMemorySecretVault::new());
        let registry = Arc::new(SlowDelete {
            inner: InMemoryEndpointRegistry::new(),
            delay: Duration::from_millis(200),
        });
        let ledger = Arc::new(InMemoryDeliveryLedger::new());
        let worker = Arc::new(DeliveryWorker::new(
            vault.clone(),
            ledger.clone(),
            WebhookHttpClient::new().unwrap(),
        ));
        let manager = Arc::new(WebhookManager::new(
            vault.clone(),
            registry.clone(),
            ledger.clone(),
            worker.clone(),
        ));
        let emitter = EventEmitter::new(registry, ledger.clone(), worker);

        let created = manager
            .create_endpoint(
                "owner-1",
                request("http://127.0.0.1:9/hook", &[EventType::PageViewed]),
            )
            .await
            .unwrap();
        let id = created.endpoint.id;

        let deleting = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.delete_endpoint("owner-1", id).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        emitter
            .emit("owner-1", EventType::PageViewed, serde_json::json!({}))
            .await;

        deleting.await.unwrap().unwrap();

        let orphans: Vec<Delivery> = ledger
            .all()
            .await
            .into_iter()
            .filter(|d| d.endpoint_id == id)
            .collect();
        assert!(orphans.is_empty());
        assert!(vault.is_empty().await);
    }

    /// Registry that is reachable for nothing.
    struct RegistryDown;

    #[async_trait]
    impl EndpointRegistry for RegistryDown {
        async fn insert(&self, _: Endpoint) -> Result<Endpoint, RepositoryError> {
            Err(RepositoryError::Unavailable("db down".into()))
        }
        async fn get(&self, _: Uuid) -> Result<Option<Endpoint>, RepositoryError> {
            Err(RepositoryError::Unavailable("db down".into()))
        }
        async fn list_by_owner(&self, _: &str) -> Result<Vec<Endpoint>, RepositoryError> {
            Err(RepositoryError::Unavailable("db down".into()))
        }
        async fn find_subscribed(
            &self,
            _: &str,
            _: EventType,
        ) -> Result<Vec<Endpoint>, RepositoryError> {
            Err(RepositoryError::Unavailable("db down".into()))
        }
        async fn update(&self, _: Endpoint) -> Result<Option<Endpoint>, RepositoryError> {
            Err(RepositoryError::Unavailable("db down".into()))
        }
        async fn delete(&self, _: Uuid) -> Result<Option<Endpoint>, RepositoryError> {
            Err(RepositoryError::Unavailable("db down".into()))
        }
    }

    #[tokio::test]
    async fn test_retry_surfaces_storage_outage() {
        let vault = Arc::new(InMemorySecretVault::new());
        let ledger = Arc::new(InMemoryDeliveryLedger::new());
        let worker = Arc::new(DeliveryWorker::new(
            vault.clone(),
            ledger.clone(),
            WebhookHttpClient::new().unwrap(),
        ));
        let manager = WebhookManager::new(vault, Arc::new(RegistryDown), ledger.clone(), worker);

        let delivery = ledger
            .insert(Delivery::pending(Uuid::new_v4(), EventType::PageViewed, "{}".into()))
            .await
            .unwrap();
        ledger
            .record_outcome(delivery.id, DeliveryOutcome::failed(Some(500), 3, "err".into(), None))
            .await
            .unwrap();

        let result = manager.retry_delivery("owner-1", delivery.id).await;
        assert!(matches!(
            result,
            Err(ManagerError::Repository(RepositoryError::Unavailable(_)))
        ));
        assert_eq!(
            ledger.get(delivery.id).await.unwrap().unwrap().state(),
            DeliveryState::Failed
        );
    }
}

