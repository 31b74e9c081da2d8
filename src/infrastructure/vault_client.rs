use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::ports::{SecretVault, VaultError};

#[derive(Serialize)]
struct StoreRequest<'a> {
    owner_ref: &'a str,
    name: &'a str,
    value: &'a str,
}

#[derive(Deserialize)]
struct StoreResponse {
    id: String,
}

#[derive(Deserialize)]
struct ReadResponse {
    value: String,
}

/// `SecretVault` backed by a remote secret manager speaking a small REST API:
///
/// - `POST   {base}/secrets`       `{owner_ref, name, value}` -> `{id}`
/// - `GET    {base}/secrets/{id}`  -> `{value}`
/// - `DELETE {base}/secrets/{id}`
pub struct HttpSecretVault {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpSecretVault {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<SecretString>,
    ) -> Result<Self, VaultError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| VaultError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    fn secret_url(&self, vault_id: &str) -> String {
        format!("{}/secrets/{vault_id}", self.base_url)
    }
}

/// Map a non-success vault response onto the vault error taxonomy.
fn status_error(status: StatusCode, vault_id: &str) -> VaultError {
    match status {
        StatusCode::NOT_FOUND => VaultError::NotFound(vault_id.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            VaultError::AccessDenied(vault_id.to_string())
        }
        other => VaultError::Unavailable(format!("vault responded with {other}")),
    }
}

#[async_trait]
impl SecretVault for HttpSecretVault {
    async fn store(
        &self,
        owner_ref: &str,
        name: &str,
        value: SecretString,
    ) -> Result<String, VaultError> {
        let request = self
            .client
            .post(format!("{}/secrets", self.base_url))
            .json(&StoreRequest {
                owner_ref,
                name,
                value: value.expose_secret(),
            });

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| VaultError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), name));
        }

        let stored: StoreResponse = response
            .json()
            .await
            .map_err(|e| VaultError::Unavailable(format!("malformed vault response: {e}")))?;

        debug!(vault_id = %stored.id, owner_ref = %owner_ref, "Stored secret in vault");
        Ok(stored.id)
    }

    async fn read(&self, vault_id: &str) -> Result<SecretString, VaultError> {
        let request = self.client.get(self.secret_url(vault_id));
        let response = self.authorize(request).send().await.map_err(|e| {
            warn!(vault_id = %vault_id, error = %e, "Vault read failed");
            VaultError::Unavailable(e.to_string())
        })?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), vault_id));
        }

        let body: ReadResponse = response
            .json()
            .await
            .map_err(|e| VaultError::Unavailable(format!("malformed vault response: {e}")))?;

        Ok(SecretString::from(body.value))
    }

    async fn delete(&self, vault_id: &str) -> Result<(), VaultError> {
        let request = self.client.delete(self.secret_url(vault_id));
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| VaultError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), vault_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Secrets = Arc<Mutex<HashMap<String, String>>>;

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer vault-token")
    }

    async fn store_secret(
        State(secrets): State<Secrets>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> Result<Json<serde_json::Value>, StatusCode> {
        if !authorized(&headers) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        let id = format!("sec-{}", secrets.lock().unwrap().len() + 1);
        let value = body["value"].as_str().unwrap_or_default().to_string();
        secrets.lock().unwrap().insert(id.clone(), value);
        Ok(Json(serde_json::json!({ "id": id })))
    }

    async fn read_secret(
        State(secrets): State<Secrets>,
        headers: HeaderMap,
        Path(id): Path<String>,
    ) -> Result<Json<serde_json::Value>, StatusCode> {
        if !authorized(&headers) {
            return Err(StatusCode::FORBIDDEN);
        }
        match secrets.lock().unwrap().get(&id) {
            Some(value) => Ok(Json(serde_json::json!({ "value": value }))),
            None => Err(StatusCode::NOT_FOUND),
        }
    }

    async fn delete_secret(
        State(secrets): State<Secrets>,
        Path(id): Path<String>,
    ) -> StatusCode {
        match secrets.lock().unwrap().remove(&id) {
            Some(_) => StatusCode::NO_CONTENT,
            None => StatusCode::NOT_FOUND,
        }
    }

    async fn spawn_vault() -> String {
        let secrets: Secrets = Arc::new(Mutex::new(HashMap::new()));
        let router = Router::new()
            .route("/secrets", post(store_secret))
            .route("/secrets/{id}", get(read_secret).delete(delete_secret))
            .with_state(secrets);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_store_read_delete_round_trip() {
        let base = spawn_vault().await;
        let token = SecretString::from("vault-token".to_string());
        let vault = HttpSecretVault::new(base, Some(token)).unwrap();

        let id = vault
            .store("owner-1", "endpoint-secret", SecretString::from("whsec_1".to_string()))
            .await
            .unwrap();
        let secret = vault.read(&id).await.unwrap();
        assert_eq!(secret.expose_secret(), "whsec_1");

        vault.delete(&id).await.unwrap();
        assert_eq!(
            vault.read(&id).await.map(|_| ()),
            Err(VaultError::NotFound(id))
        );
    }

    #[tokio::test]
    async fn test_missing_token_is_access_denied() {
        let base = spawn_vault().await;
        let vault = HttpSecretVault::new(base, None).unwrap();

        assert_eq!(
            vault.read("sec-1").await.map(|_| ()),
            Err(VaultError::AccessDenied("sec-1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_unreachable_vault_is_unavailable() {
        let vault = HttpSecretVault::new("http://127.0.0.1:9", None).unwrap();
        let result = vault.read("sec-1").await;
        assert!(matches!(result, Err(VaultError::Unavailable(_))));
    }

    #[test]
    fn test_status_error_mapping() {
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, "x"),
            VaultError::NotFound("x".to_string())
        );
        assert_eq!(
            status_error(StatusCode::FORBIDDEN, "x"),
            VaultError::AccessDenied("x".to_string())
        );
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "x"),
            VaultError::Unavailable(_)
        ));
    }
}
