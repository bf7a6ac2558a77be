use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::{
    error::AppError,
    pixel::{EventKind, EventRequest},
    state::State,
    utils::ClientMeta,
};

/// Forwards one browser-side event to the Conversions API.
///
/// The body is optional, an empty POST sends the event with request metadata only.
pub async fn event_handler(
    AxumState(state): AxumState<Arc<State>>,
    Path(event): Path<String>,
    meta: ClientMeta,
    body: Bytes,
) -> Result<Response, AppError> {
    let kind = EventKind::from_slug(&event).ok_or(AppError::NotFound)?;

    let Some(pixel) = state.pixel.as_ref() else {
        return Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "event_name": kind.name(),
                "error": "Facebook pixel is not configured",
            })),
        )
            .into_response());
    };

    let request: EventRequest = if body.iter().all(u8::is_ascii_whitespace) {
        EventRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::MalformedPayload(e.to_string()))?
    };
    let outcome = pixel.send(kind, &request, &meta).await;

    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };

    Ok((status, Json(outcome)).into_response())
}
