use std::sync::Arc;

use axum::{Json, extract::State as AxumState, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::state::State;

pub mod admin;
pub mod auth;
pub mod events;
pub mod links;
pub mod orders;
pub mod profile;
pub mod public;

pub async fn health_handler(AxumState(state): AxumState<Arc<State>>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "store": state.store.backend_tag() })),
        ),
        Err(e) => {
            error!("Health check failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "store": state.store.backend_tag() })),
            )
        }
    }
}

#[derive(Serialize)]
pub struct SiteInfo {
    site_url: String,
    card_price: i64,
    contact_phone: Option<String>,
    contact_email: Option<String>,
    pixel_enabled: bool,
}

pub async fn site_handler(AxumState(state): AxumState<Arc<State>>) -> Json<SiteInfo> {
    Json(SiteInfo {
        site_url: state.config.site_url.clone(),
        card_price: state.config.card_price,
        contact_phone: state.config.contact_phone.clone(),
        contact_email: state.config.contact_email.clone(),
        pixel_enabled: state.pixel.is_some(),
    })
}
