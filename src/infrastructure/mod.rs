pub mod in_memory;
pub mod vault_client;

pub use in_memory::{InMemoryDeliveryLedger, InMemoryEndpointRegistry, InMemorySecretVault};
pub use vault_client::HttpSecretVault;
