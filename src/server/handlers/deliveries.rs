use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::domain::Delivery;
use crate::outbound::webhook::ManagerError;
use crate::server::AppState;
use crate::server::responses::ResponseBody;

pub async fn list_deliveries(
    State(state): State<AppState>,
    Path((owner_id, endpoint_id)): Path<(String, Uuid)>,
) -> Result<ResponseBody<Vec<Delivery>>, ManagerError> {
    let deliveries = state.manager.list_deliveries(&owner_id, endpoint_id).await?;
    Ok(ResponseBody::ok(deliveries))
}

/// Accepted, not completed: the attempt cycle runs after the response is sent.
pub async fn retry_delivery(
    State(state): State<AppState>,
    Path((owner_id, delivery_id)): Path<(String, Uuid)>,
) -> Result<ResponseBody<Delivery>, ManagerError> {
    let delivery = state.manager.retry_delivery(&owner_id, delivery_id).await?;
    Ok(ResponseBody::new(StatusCode::ACCEPTED, delivery))
}
