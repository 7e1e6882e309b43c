//! Route handlers.
//!
//! Broker routes decode the raw body, run one engine operation, then replay
//! the scripted reply. The engine has released the store lock by the time
//! the reply delay is slept.

use axum::body::Bytes;
use axum::extract::{OriginalUri, Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use broker_core::Payload;
use broker_state::{BrokerError, BrokerResult, Reply};
use serde_json::Value;
use tracing::debug;

use crate::ApiState;
use crate::error::ApiError;

fn json_response(status: StatusCode, body: String) -> Response {
    (status, [(CONTENT_TYPE, "application/json")], body).into_response()
}

fn decode_payload(body: &Bytes) -> BrokerResult<Payload> {
    serde_json::from_slice(body).map_err(BrokerError::MalformedRequest)
}

async fn play(reply: Reply) -> BrokerResult<Response> {
    let status = StatusCode::from_u16(reply.checked_status()?)
        .map_err(|_| BrokerError::InvalidStatus(reply.status))?;
    if !reply.delay.is_zero() {
        debug!(delay_ms = reply.delay.as_millis() as u64, "delaying scripted reply");
        tokio::time::sleep(reply.delay).await;
    }
    Ok(json_response(status, reply.body.render()))
}

async fn replay(result: BrokerResult<Reply>, uri: &Uri) -> Response {
    let played = match result {
        Ok(reply) => play(reply).await,
        Err(e) => Err(e),
    };
    played.unwrap_or_else(|e| ApiError::new(e, uri).into_response())
}

fn pretty(result: BrokerResult<Value>, uri: &Uri) -> Response {
    result
        .and_then(|doc| serde_json::to_string_pretty(&doc).map_err(BrokerError::Snapshot))
        .map(|body| json_response(StatusCode::OK, body))
        .unwrap_or_else(|e| ApiError::new(e, uri).into_response())
}

// ── Broker ─────────────────────────────────────────────────────

/// GET /v2/catalog
pub async fn catalog(State(state): State<ApiState>, OriginalUri(uri): OriginalUri) -> Response {
    replay(state.engine.catalog(), &uri).await
}

/// PUT /v2/service_instances/{instance_id}
pub async fn provision(
    State(state): State<ApiState>,
    OriginalUri(uri): OriginalUri,
    Path(instance_id): Path<String>,
    body: Bytes,
) -> Response {
    let result = decode_payload(&body)
        .and_then(|payload| state.engine.provision(&instance_id, payload));
    replay(result, &uri).await
}

/// GET /v2/service_instances/{instance_id}
pub async fn fetch_status(
    State(state): State<ApiState>,
    OriginalUri(uri): OriginalUri,
    Path(instance_id): Path<String>,
) -> Response {
    replay(state.engine.fetch_status(&instance_id), &uri).await
}

/// PATCH /v2/service_instances/{instance_id}
pub async fn update(
    State(state): State<ApiState>,
    OriginalUri(uri): OriginalUri,
    Path(instance_id): Path<String>,
    body: Bytes,
) -> Response {
    let result =
        decode_payload(&body).and_then(|payload| state.engine.update(&instance_id, payload));
    replay(result, &uri).await
}

/// DELETE /v2/service_instances/{instance_id}
pub async fn deprovision(
    State(state): State<ApiState>,
    OriginalUri(uri): OriginalUri,
    Path(instance_id): Path<String>,
) -> Response {
    replay(state.engine.deprovision(&instance_id), &uri).await
}

/// PUT /v2/service_instances/{instance_id}/service_bindings/{binding_id}
pub async fn bind(
    State(state): State<ApiState>,
    OriginalUri(uri): OriginalUri,
    Path((instance_id, binding_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let result = decode_payload(&body)
        .and_then(|payload| state.engine.bind(&instance_id, &binding_id, payload));
    replay(result, &uri).await
}

/// DELETE /v2/service_instances/{instance_id}/service_bindings/{binding_id}
pub async fn unbind(
    State(state): State<ApiState>,
    OriginalUri(uri): OriginalUri,
    Path((_instance_id, binding_id)): Path<(String, String)>,
) -> Response {
    replay(state.engine.unbind(&binding_id), &uri).await
}

// ── Config ─────────────────────────────────────────────────────

/// GET /config
pub async fn get_config(State(state): State<ApiState>, OriginalUri(uri): OriginalUri) -> Response {
    pretty(state.engine.store().snapshot_without_instances(), &uri)
}

/// GET /config/all
pub async fn get_config_all(
    State(state): State<ApiState>,
    OriginalUri(uri): OriginalUri,
) -> Response {
    pretty(state.engine.store().snapshot(), &uri)
}

/// POST /config
pub async fn merge_config(
    State(state): State<ApiState>,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> Response {
    let result = serde_json::from_slice::<Value>(&body)
        .map_err(BrokerError::MalformedRequest)
        .and_then(|partial| state.engine.store().merge(partial));
    pretty(result, &uri)
}

/// POST /config/reset
pub async fn reset_config(
    State(state): State<ApiState>,
    OriginalUri(uri): OriginalUri,
) -> Response {
    pretty(state.engine.store().reset(), &uri)
}
