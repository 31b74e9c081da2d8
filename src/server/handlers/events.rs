use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::EventType;
use crate::server::AppState;
use crate::server::responses::ResponseBody;

#[derive(Debug, Deserialize)]
pub struct EmitRequest {
    pub event: EventType,
    /// Event attributes. Must be a JSON object.
    pub data: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct EmitResponse {
    pub dispatched: usize,
}

/// Emit an event on behalf of an owner. 202 once accepted; delivery happens later.
pub async fn emit_event(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    Json(request): Json<EmitRequest>,
) -> ResponseBody<EmitResponse> {
    let dispatched = state
        .emitter
        .emit(&owner_id, request.event, Value::Object(request.data))
        .await;
    ResponseBody::new(StatusCode::ACCEPTED, EmitResponse { dispatched })
}
