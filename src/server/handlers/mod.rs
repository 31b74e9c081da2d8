pub mod deliveries;
pub mod endpoints;
pub mod events;
pub mod health;
