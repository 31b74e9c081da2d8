use serde::Serialize;

use crate::server::responses::ResponseBody;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Liveness probe. Reports the running build; does not touch the vault.
pub async fn health_check() -> ResponseBody<Health> {
    ResponseBody::ok(Health {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}
