//! In-memory adapters for the vault, endpoint registry and delivery ledger.
//!
//! Used by the default server wiring and throughout the tests. Every write is
//! keyed by a single id, so concurrent deliveries never contend on a row.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::events::EventType;
use crate::domain::models::{Delivery, DeliveryOutcome, DeliveryState, Endpoint};
use crate::domain::ports::{
    DeliveryLedger, EndpointRegistry, RepositoryError, SecretVault, VaultError,
};

// ============================================================================
// InMemorySecretVault
// ============================================================================

struct VaultEntry {
    owner_ref: String,
    name: String,
    value: SecretString,
}

#[derive(Clone, Default)]
pub struct InMemorySecretVault {
    entries: Arc<RwLock<HashMap<String, VaultEntry>>>,
}

impl InMemorySecretVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of secrets currently held.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Name and owner of a stored secret, without the value.
    pub async fn describe(&self, vault_id: &str) -> Option<(String, String)> {
        let entries = self.entries.read().await;
        entries
            .get(vault_id)
            .map(|e| (e.owner_ref.clone(), e.name.clone()))
    }
}

#[async_trait]
impl SecretVault for InMemorySecretVault {
    async fn store(
        &self,
        owner_ref: &str,
        name: &str,
        value: SecretString,
    ) -> Result<String, VaultError> {
        let vault_id = Uuid::new_v4().to_string();
        let mut entries = self.entries.write().await;
        entries.insert(
            vault_id.clone(),
            VaultEntry {
                owner_ref: owner_ref.to_string(),
                name: name.to_string(),
                value,
            },
        );
        debug!(vault_id = %vault_id, owner_ref = %owner_ref, "Stored secret");
        Ok(vault_id)
    }

    async fn read(&self, vault_id: &str) -> Result<SecretString, VaultError> {
        let entries = self.entries.read().await;
        entries
            .get(vault_id)
            .map(|e| SecretString::from(e.value.expose_secret().to_owned()))
            .ok_or_else(|| VaultError::NotFound(vault_id.to_string()))
    }

    async fn delete(&self, vault_id: &str) -> Result<(), VaultError> {
        let mut entries = self.entries.write().await;
        entries
            .remove(vault_id)
            .map(|_| ())
            .ok_or_else(|| VaultError::NotFound(vault_id.to_string()))
    }
}

// ============================================================================
// InMemoryEndpointRegistry
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct InMemoryEndpointRegistry {
    endpoints: Arc<RwLock<HashMap<Uuid, Endpoint>>>,
}

impl InMemoryEndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EndpointRegistry for InMemoryEndpointRegistry {
    async fn insert(&self, endpoint: Endpoint) -> Result<Endpoint, RepositoryError> {
        let mut endpoints = self.endpoints.write().await;
        if endpoints.contains_key(&endpoint.id) {
            return Err(RepositoryError::Conflict(format!(
                "endpoint {} already exists",
                endpoint.id
            )));
        }
        endpoints.insert(endpoint.id, endpoint.clone());
        Ok(endpoint)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Endpoint>, RepositoryError> {
        Ok(self.endpoints.read().await.get(&id).cloned())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Endpoint>, RepositoryError> {
        let endpoints = self.endpoints.read().await;
        let mut owned: Vec<Endpoint> = endpoints
            .values()
            .filter(|e| e.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by_key(|e| e.created_at);
        Ok(owned)
    }

    async fn find_subscribed(
        &self,
        owner_id: &str,
        event: EventType,
    ) -> Result<Vec<Endpoint>, RepositoryError> {
        let endpoints = self.endpoints.read().await;
        Ok(endpoints
            .values()
            .filter(|e| e.owner_id == owner_id && e.subscribes_to(event))
            .cloned()
            .collect())
    }

    async fn update(&self, endpoint: Endpoint) -> Result<Option<Endpoint>, RepositoryError> {
        let mut endpoints = self.endpoints.write().await;
        match endpoints.get_mut(&endpoint.id) {
            Some(existing) => {
                *existing = endpoint.clone();
                Ok(Some(endpoint))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Endpoint>, RepositoryError> {
        Ok(self.endpoints.write().await.remove(&id))
    }
}

// ============================================================================
// InMemoryDeliveryLedger
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct InMemoryDeliveryLedger {
    deliveries: Arc<RwLock<HashMap<Uuid, Delivery>>>,
}

impl InMemoryDeliveryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivery currently recorded, in creation order.
    pub async fn all(&self) -> Vec<Delivery> {
        let deliveries = self.deliveries.read().await;
        let mut all: Vec<Delivery> = deliveries.values().cloned().collect();
        all.sort_by_key(|d| d.created_at);
        all
    }
}

#[async_trait]
impl DeliveryLedger for InMemoryDeliveryLedger {
    async fn insert(&self, delivery: Delivery) -> Result<Delivery, RepositoryError> {
        let mut deliveries = self.deliveries.write().await;
        if deliveries.contains_key(&delivery.id) {
            return Err(RepositoryError::Conflict(format!(
                "delivery {} already exists",
                delivery.id
            )));
        }
        deliveries.insert(delivery.id, delivery.clone());
        Ok(delivery)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Delivery>, RepositoryError> {
        Ok(self.deliveries.read().await.get(&id).cloned())
    }

    async fn list_for_endpoint(
        &self,
        endpoint_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Delivery>, RepositoryError> {
        let deliveries = self.deliveries.read().await;
        let mut matching: Vec<Delivery> = deliveries
            .values()
            .filter(|d| d.endpoint_id == endpoint_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: DeliveryOutcome,
    ) -> Result<(), RepositoryError> {
        let mut deliveries = self.deliveries.write().await;
        match deliveries.get_mut(&id) {
            Some(delivery) => {
                delivery.apply(outcome);
                Ok(())
            }
            None => Err(RepositoryError::Unavailable(format!(
                "delivery {id} no longer exists"
            ))),
        }
    }

    async fn reopen_failed(&self, id: Uuid) -> Result<Option<Delivery>, RepositoryError> {
        let mut deliveries = self.deliveries.write().await;
        match deliveries.get_mut(&id) {
            Some(delivery) if delivery.state() == DeliveryState::Failed => {
                delivery.reopen();
                Ok(Some(delivery.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_for_endpoint(&self, endpoint_id: Uuid) -> Result<usize, RepositoryError> {
        let mut deliveries = self.deliveries.write().await;
        let before = deliveries.len();
        deliveries.retain(|_, d| d.endpoint_id != endpoint_id);
        Ok(before - deliveries.len())
    }
}
