// Webhook delivery module
//
// Building blocks:
//   hmac_signer, http_client, retry_strategy, schemas
//
// Pipeline:
//   emitter         – resolves subscribed endpoints and records pending deliveries
//   delivery_worker – runs the signed attempt cycle for one delivery in the background
//   manager         – endpoint lifecycle, delivery history and manual retry

pub mod delivery_worker;
pub mod emitter;
pub mod hmac_signer;
pub mod http_client;
pub mod manager;
pub mod retry_strategy;
pub mod schemas;

// Re-export commonly used types
pub use delivery_worker::DeliveryWorker;
pub use emitter::EventEmitter;
pub use hmac_signer::{
    HmacSigner, format_signature_header, parse_signature_header, verify_signature,
};
pub use http_client::{HttpClientError, WebhookHttpClient, WebhookResponse};
pub use manager::{CreateEndpoint, EndpointWithSecret, ManagerError, UpdateEndpoint, WebhookManager};
pub use retry_strategy::RetryStrategy;
pub use schemas::{SIGNATURE_HEADER, TIMESTAMP_HEADER, USER_AGENT, WebhookPayload};
