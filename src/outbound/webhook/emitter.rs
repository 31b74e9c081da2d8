use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::domain::events::EventType;
use crate::domain::models::Delivery;
use crate::domain::ports::{DeliveryLedger, EndpointRegistry, RepositoryError};
use crate::outbound::webhook::delivery_worker::DeliveryWorker;
use crate::outbound::webhook::schemas::WebhookPayload;

/// Entry point for domain code that wants subscribers notified of an event.
///
/// `emit` resolves the owner's subscribed endpoints, writes one pending
/// delivery per endpoint and hands each to a detached [`DeliveryWorker`]
/// task. It never waits on the network and never returns an error.
pub struct EventEmitter {
    registry: Arc<dyn EndpointRegistry>,

    ledger: Arc<dyn DeliveryLedger>,

    worker: Arc<DeliveryWorker>,
}

impl EventEmitter {
    pub fn new(
        registry: Arc<dyn EndpointRegistry>,
        ledger: Arc<dyn DeliveryLedger>,
        worker: Arc<DeliveryWorker>,
    ) -> Self {
        Self {
            registry,
            ledger,
            worker,
        }
    }

    /// Fan `event` out to every active endpoint of `owner_id` subscribed to it.
    ///
    /// Returns the number of deliveries dispatched. Lookup failures are logged
    /// and turn the call into a no-op.
    pub async fn emit(&self, owner_id: &str, event: EventType, data: Value) -> usize {
        match self.try_emit(owner_id, event, data).await {
            Ok(dispatched) => dispatched,
            Err(e) => {
                error!(
                    owner_id = %owner_id,
                    event = %event,
                    error = %e,
                    "Failed to emit webhook event – skipping"
                );
                0
            }
        }
    }

    async fn try_emit(
        &self,
        owner_id: &str,
        event: EventType,
        data: Value,
    ) -> Result<usize, RepositoryError> {
        let endpoints = self.registry.find_subscribed(owner_id, event).await?;

        if endpoints.is_empty() {
            debug!(
                owner_id = %owner_id,
                event = %event,
                "No endpoints subscribed – event dropped"
            );
            return Ok(0);
        }

        // Serialized once so every endpoint, and every later retry, gets the
        // same bytes.
        let payload = WebhookPayload::now(event, data)
            .to_json()
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        let mut dispatched = 0usize;
        for endpoint in endpoints {
            let pending = Delivery::pending(endpoint.id, event, payload.clone());
            let delivery = match self.ledger.insert(pending).await {
                Ok(delivery) => delivery,
                Err(e) => {
                    error!(
                        endpoint_id = %endpoint.id,
                        event = %event,
                        error = %e,
                        "Failed to record delivery – endpoint skipped"
                    );
                    continue;
                }
            };

            // A delete that landed after the lookup has already run its
            // cascade; this row would outlive the endpoint.
            if let Ok(None) = self.registry.get(endpoint.id).await {
                debug!(
                    endpoint_id = %endpoint.id,
                    event = %event,
                    "Endpoint deleted during emission – delivery discarded"
                );
                if let Err(e) = self.ledger.delete_for_endpoint(endpoint.id).await {
                    error!(
                        endpoint_id = %endpoint.id,
                        error = %e,
                        "Failed to discard delivery of deleted endpoint"
                    );
                }
                continue;
            }

            debug!(
                delivery_id = %delivery.id,
                endpoint_id = %endpoint.id,
                event = %event,
                "Delivery dispatched"
            );
            // Detached: the handle is dropped and the task runs to completion on its own.
            drop(self.worker.spawn(delivery.id, endpoint));
            dispatched += 1;
        }

        info!(
            owner_id = %owner_id,
            event = %event,
            dispatched = dispatched,
            "Webhook event emitted"
        );
        Ok(dispatched)
    }
}
