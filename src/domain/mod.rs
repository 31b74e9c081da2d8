pub mod events;
pub mod models;
pub mod ports;

pub use events::{EventType, UnknownEventType};
pub use models::{
    Delivery, DeliveryOutcome, DeliveryState, Endpoint, EndpointValidationError, MAX_ATTEMPTS,
};
pub use ports::{DeliveryLedger, EndpointRegistry, RepositoryError, SecretVault, VaultError};
