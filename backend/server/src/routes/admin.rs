use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State as AxumState},
    http::{
        StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use batch::{BatchRequest, BatchSettings};
use serde::Deserialize;
use store::{Page, User, UserFlags, UserQuery};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::Admin,
    error::AppError,
    state::State,
    utils::{JsonBody, clamp_limit, clamp_offset},
};

#[derive(Deserialize)]
pub struct UserParams {
    search: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct BatchPayload {
    #[serde(flatten)]
    request: BatchRequest,
    #[serde(default)]
    archive: bool,
}

pub async fn list_users_handler(
    AxumState(state): AxumState<Arc<State>>,
    _admin: Admin,
    Query(params): Query<UserParams>,
) -> Result<Json<Page<User>>, AppError> {
    let query = UserQuery {
        search: params
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        limit: clamp_limit(params.limit),
        offset: clamp_offset(params.offset),
    };

    Ok(Json(state.store.list_users(query).await?))
}

pub async fn update_user_handler(
    AxumState(state): AxumState<Arc<State>>,
    _admin: Admin,
    Path(id): Path<Uuid>,
    JsonBody(flags): JsonBody<UserFlags>,
) -> Result<Json<User>, AppError> {
    let user = state.store.set_user_flags(id, flags).await?;
    info!(
        "User {} flags: active={} premium={}",
        user.username, user.is_active, user.is_premium
    );

    Ok(Json(user))
}

pub async fn delete_user_handler(
    AxumState(state): AxumState<Arc<State>>,
    _admin: Admin,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.store.delete_user(id).await?;
    info!("Deleted user {id}");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn batch_handler(
    AxumState(state): AxumState<Arc<State>>,
    _admin: Admin,
    JsonBody(payload): JsonBody<BatchPayload>,
) -> Result<Response, AppError> {
    let settings = BatchSettings {
        site_url: state.config.site_url.clone(),
    };

    // Per-item failures and the summary are logged by the generator
    let report = batch::generate(state.store.as_ref(), &payload.request, &settings, |_| {}).await?;

    if !payload.archive {
        return Ok(Json(report).into_response());
    }

    let zip = batch::archive(&report)?;
    let filename = format!(
        "board-accounts-{}.zip",
        report.generated_at.format("%Y%m%d-%H%M%S")
    );

    Ok((
        [
            (CONTENT_TYPE, "application/zip".to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        zip,
    )
        .into_response())
}
