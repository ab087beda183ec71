//! Stream enumeration and status endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use relaybox_core::{validate_stream_key, StreamStatus};

use super::AppState;
use crate::error::ApiError;

/// GET /api/streams
pub async fn list_streams(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.store.stream_keys().await?))
}

/// Status of every stream the engine holds state for
///
/// GET /api/status
pub async fn all_statuses(State(state): State<AppState>) -> Json<Vec<StreamStatus>> {
    Json(state.engine.statuses().await)
}

/// Status of one registered stream
///
/// A registered stream the engine has never seen reports an idle status.
///
/// GET /api/status/:stream_key
pub async fn stream_status(
    State(state): State<AppState>,
    Path(stream_key): Path<String>,
) -> Result<Json<StreamStatus>, ApiError> {
    if !validate_stream_key(&stream_key) {
        return Err(ApiError::InvalidStreamKey);
    }

    let known = state.store.stream_keys().await?;
    if !known.contains(&stream_key) {
        return Err(ApiError::StreamNotFound(stream_key));
    }

    let status = state
        .engine
        .status(&stream_key)
        .await
        .unwrap_or_else(|| StreamStatus::idle(&stream_key));

    Ok(Json(status))
}
