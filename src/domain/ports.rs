/*
   This module specifies the API by which the webhook core talks to its
   external collaborators: secret custody, endpoint configuration and the
   delivery ledger.
*/

use async_trait::async_trait;
use secrecy::SecretString;
use uuid::Uuid;

use crate::domain::events::EventType;
use crate::domain::models::{Delivery, DeliveryOutcome, Endpoint};

/// Error type for secret vault operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Access denied to secret: {0}")]
    AccessDenied(String),

    #[error("Vault unavailable: {0}")]
    Unavailable(String),
}

/// Error type for endpoint and delivery persistence
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Conflicting record: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Custody of HMAC signing secrets, addressed by opaque reference.
///
/// A stored value is never handed back through `store`; `read` exposes it
/// only to the caller that needs it for a single signing operation.
#[async_trait]
pub trait SecretVault: Send + Sync {
    async fn store(
        &self,
        owner_ref: &str,
        name: &str,
        value: SecretString,
    ) -> Result<String, VaultError>;

    async fn read(&self, vault_id: &str) -> Result<SecretString, VaultError>;

    async fn delete(&self, vault_id: &str) -> Result<(), VaultError>;
}

/// Persisted endpoint configuration.
#[async_trait]
pub trait EndpointRegistry: Send + Sync {
    async fn insert(&self, endpoint: Endpoint) -> Result<Endpoint, RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Option<Endpoint>, RepositoryError>;

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Endpoint>, RepositoryError>;

    /// Active endpoints of `owner_id` whose event set contains `event`.
    async fn find_subscribed(
        &self,
        owner_id: &str,
        event: EventType,
    ) -> Result<Vec<Endpoint>, RepositoryError>;

    async fn update(&self, endpoint: Endpoint) -> Result<Option<Endpoint>, RepositoryError>;

    async fn delete(&self, id: Uuid) -> Result<Option<Endpoint>, RepositoryError>;
}

/// Persisted delivery records, one row per attempt cycle.
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    async fn insert(&self, delivery: Delivery) -> Result<Delivery, RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Option<Delivery>, RepositoryError>;

    /// Most recent deliveries of an endpoint, newest first.
    async fn list_for_endpoint(
        &self,
        endpoint_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Delivery>, RepositoryError>;

    /// Single-row write of a cycle's terminal outcome.
    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: DeliveryOutcome,
    ) -> Result<(), RepositoryError>;

    /// Atomically move a failed delivery back to pending.
    ///
    /// Returns `None` when the row is missing or not in the failed state.
    async fn reopen_failed(&self, id: Uuid) -> Result<Option<Delivery>, RepositoryError>;

    async fn delete_for_endpoint(&self, endpoint_id: Uuid) -> Result<usize, RepositoryError>;
}
