use std::sync::Arc;

use axum::{Json, extract::State as AxumState, http::StatusCode};
use serde::{Deserialize, Serialize};
use store::{NewUser, StoreError, User, non_empty, password};
use tracing::{info, warn};

use crate::{
    error::AppError,
    pixel::{EventKind, EventRequest},
    state::State,
    utils::{ClientMeta, JsonBody, check_password, normalize_username},
};

#[derive(Deserialize)]
pub struct RegisterRequest {
    username: String,
    password: String,
    #[serde(default)]
    full_name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    user: User,
    token: String,
}

pub async fn register_handler(
    AxumState(state): AxumState<Arc<State>>,
    meta: ClientMeta,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let username = normalize_username(&payload.username)?;
    check_password(&payload.password)?;

    let user = state
        .store
        .create_user(NewUser {
            username,
            password_hash: password::hash(&payload.password).await?,
            full_name: non_empty(payload.full_name),
            is_batch_generated: false,
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => AppError::Conflict("Username is already taken".to_string()),
            other => other.into(),
        })?;

    info!("Registered user {}", user.username);

    if let Some(pixel) = state.pixel.clone() {
        let request = EventRequest {
            external_id: Some(user.id.to_string()),
            first_name: user.full_name.clone(),
            event_source_url: Some(format!("{}/register", state.config.site_url)),
            ..Default::default()
        };
        tokio::spawn(async move {
            pixel.send(EventKind::CompleteRegistration, &request, &meta).await;
        });
    }

    let token = state.sessions.issue(user.id);
    Ok((StatusCode::CREATED, Json(SessionResponse { user, token })))
}

pub async fn login_handler(
    AxumState(state): AxumState<Arc<State>>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let username = payload.username.trim().to_lowercase();

    let user = match state.store.user_by_username(&username).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(AppError::Unauthorized),
        Err(e) => return Err(e.into()),
    };

    if !password::verify(&payload.password, &user.password_hash).await {
        warn!("Failed login for {username}");
        return Err(AppError::Unauthorized);
    }

    if !user.is_active {
        return Err(AppError::Forbidden("Account is deactivated".to_string()));
    }

    let token = state.sessions.issue(user.id);
    Ok(Json(SessionResponse { user, token }))
}
