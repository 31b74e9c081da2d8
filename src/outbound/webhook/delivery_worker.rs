use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::models::{DeliveryOutcome, Endpoint, truncate_chars};
use crate::domain::ports::{DeliveryLedger, SecretVault};
use crate::outbound::webhook::hmac_signer::HmacSigner;
use crate::outbound::webhook::http_client::WebhookHttpClient;
use crate::outbound::webhook::retry_strategy::RetryStrategy;

/// Runs the sign/send/retry cycle for one delivery at a time.
///
/// Instances are shared behind an `Arc`; each call to [`DeliveryWorker::deliver`]
/// touches only the ledger row of its own delivery id, so any number of
/// cycles can run concurrently.
///
/// Per cycle:
/// 1. Load the stored payload.
/// 2. Read the endpoint secret from the vault. Failure here is terminal and
///    no request is sent.
/// 3. Send up to `max_attempts` signed POSTs, sleeping the backoff between
///    attempts, stopping at the first 2xx.
/// 4. Write the terminal outcome. Ledger failures are logged and dropped.
pub struct DeliveryWorker {
    vault: Arc<dyn SecretVault>,

    ledger: Arc<dyn DeliveryLedger>,

    http_client: WebhookHttpClient,

    retry_strategy: RetryStrategy,

    /// Cap on the stored response/error excerpt, in characters.
    response_excerpt_chars: usize,
}

impl DeliveryWorker {
    pub const DEFAULT_RESPONSE_EXCERPT_CHARS: usize = 1000;

    pub fn new(
        vault: Arc<dyn SecretVault>,
        ledger: Arc<dyn DeliveryLedger>,
        http_client: WebhookHttpClient,
    ) -> Self {
        Self {
            vault,
            ledger,
            http_client,
            retry_strategy: RetryStrategy::default(),
            response_excerpt_chars: Self::DEFAULT_RESPONSE_EXCERPT_CHARS,
        }
    }

    /// Override the retry strategy.
    pub fn with_retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    pub fn with_response_excerpt_chars(mut self, chars: usize) -> Self {
        self.response_excerpt_chars = chars;
        self
    }

    /// Run a cycle on a detached task and return immediately.
    pub fn spawn(self: &Arc<Self>, delivery_id: Uuid, endpoint: Endpoint) -> JoinHandle<()> {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            worker.deliver(delivery_id, &endpoint).await;
        })
    }

    /// Run one full attempt cycle for `delivery_id` against `endpoint`.
    pub async fn deliver(&self, delivery_id: Uuid, endpoint: &Endpoint) {
        let payload = match self.ledger.get(delivery_id).await {
            Ok(Some(delivery)) => delivery.payload,
            Ok(None) => {
                warn!(delivery_id = %delivery_id, "Delivery not found – nothing to send");
                return;
            }
            Err(e) => {
                error!(delivery_id = %delivery_id, error = %e, "Failed to load delivery");
                return;
            }
        };

        let signer = match self.vault.read(&endpoint.secret_ref).await {
            Ok(secret) => HmacSigner::new(secret),
            Err(e) => {
                warn!(
                    delivery_id = %delivery_id,
                    endpoint_id = %endpoint.id,
                    error = %e,
                    "Signing secret unavailable – failing delivery without sending"
                );
                self.record(delivery_id, DeliveryOutcome::secret_unavailable())
                    .await;
                return;
            }
        };

        let outcome = self
            .run_attempts(delivery_id, endpoint, &payload, &signer)
            .await;
        drop(signer);

        self.record(delivery_id, outcome).await;
    }

    async fn run_attempts(
        &self,
        delivery_id: Uuid,
        endpoint: &Endpoint,
        payload: &str,
        signer: &HmacSigner,
    ) -> DeliveryOutcome {
        let max_attempts = self.retry_strategy.max_attempts();
        let mut attempt = 1;

        loop {
            let delay = self.retry_strategy.delay_before(attempt);
            if !delay.is_zero() {
                debug!(
                    delivery_id = %delivery_id,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }

            match self
                .http_client
                .send_webhook(&endpoint.url, payload, signer)
                .await
            {
                Ok(response) => {
                    info!(
                        delivery_id = %delivery_id,
                        endpoint_id = %endpoint.id,
                        attempt = attempt,
                        status_code = response.status_code,
                        response_time_ms = response.response_time_ms,
                        "Webhook delivered successfully"
                    );
                    return DeliveryOutcome::succeeded(
                        response.status_code,
                        attempt,
                        truncate_chars(&response.body, self.response_excerpt_chars),
                        response.response_time_ms,
                    );
                }
                Err(e) if self.retry_strategy.should_retry(attempt) => {
                    warn!(
                        delivery_id = %delivery_id,
                        endpoint_id = %endpoint.id,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Webhook delivery failed – will retry"
                    );
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        delivery_id = %delivery_id,
                        endpoint_id = %endpoint.id,
                        attempt = attempt,
                        error = %e,
                        "Webhook delivery permanently failed"
                    );
                    return DeliveryOutcome::failed(
                        e.status_code(),
                        max_attempts,
                        truncate_chars(&e.excerpt(), self.response_excerpt_chars),
                        e.response_time_ms(),
                    );
                }
            }
        }
    }

    async fn record(&self, delivery_id: Uuid, outcome: DeliveryOutcome) {
        if let Err(e) = self.ledger.record_outcome(delivery_id, outcome).await {
            error!(
                delivery_id = %delivery_id,
                error = %e,
                "Failed to record delivery outcome"
            );
        }
    }
}
