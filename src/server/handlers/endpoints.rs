use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::domain::Endpoint;
use crate::outbound::webhook::{CreateEndpoint, EndpointWithSecret, ManagerError, UpdateEndpoint};
use crate::server::AppState;
use crate::server::responses::ResponseBody;

/// The plaintext secret in the response is the only time it is ever shown.
pub async fn create_endpoint(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    Json(request): Json<CreateEndpoint>,
) -> Result<ResponseBody<EndpointWithSecret>, ManagerError> {
    let created = state.manager.create_endpoint(&owner_id, request).await?;
    Ok(ResponseBody::new(StatusCode::CREATED, created))
}

pub async fn list_endpoints(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<ResponseBody<Vec<Endpoint>>, ManagerError> {
    let endpoints = state.manager.list_endpoints(&owner_id).await?;
    Ok(ResponseBody::ok(endpoints))
}

pub async fn update_endpoint(
    State(state): State<AppState>,
    Path((owner_id, id)): Path<(String, Uuid)>,
    Json(changes): Json<UpdateEndpoint>,
) -> Result<ResponseBody<Endpoint>, ManagerError> {
    let endpoint = state.manager.update_endpoint(&owner_id, id, changes).await?;
    Ok(ResponseBody::ok(endpoint))
}

pub async fn delete_endpoint(
    State(state): State<AppState>,
    Path((owner_id, id)): Path<(String, Uuid)>,
) -> Result<StatusCode, ManagerError> {
    state.manager.delete_endpoint(&owner_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn rotate_secret(
    State(state): State<AppState>,
    Path((owner_id, id)): Path<(String, Uuid)>,
) -> Result<ResponseBody<EndpointWithSecret>, ManagerError> {
    let rotated = state.manager.rotate_secret(&owner_id, id).await?;
    Ok(ResponseBody::ok(rotated))
}
