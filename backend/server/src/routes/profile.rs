use std::sync::Arc;

use axum::{
    Json,
    extract::State as AxumState,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use batch::{qr::qr_png, utils::profile_url};
use chrono::{Duration, Utc};
use store::{ProfileUpdate, User, UserStats};

use crate::{auth::AuthUser, error::AppError, state::State, utils::{JsonBody, check_profile}};

/// Window for the daily visit breakdown on the dashboard.
pub const STATS_DAYS: i64 = 7;

pub async fn me_handler(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

pub async fn update_profile_handler(
    AxumState(state): AxumState<Arc<State>>,
    AuthUser(user): AuthUser,
    JsonBody(update): JsonBody<ProfileUpdate>,
) -> Result<Json<User>, AppError> {
    check_profile(&update)?;

    Ok(Json(state.store.update_profile(user.id, update).await?))
}

pub async fn stats_handler(
    AxumState(state): AxumState<Arc<State>>,
    AuthUser(user): AuthUser,
) -> Result<Json<UserStats>, AppError> {
    let since = Utc::now() - Duration::days(STATS_DAYS);

    Ok(Json(state.store.user_stats(user.id, since).await?))
}

pub async fn qr_handler(
    AxumState(state): AxumState<Arc<State>>,
    AuthUser(user): AuthUser,
) -> Result<Response, AppError> {
    qr_response(&state, &user.username)
}

pub(crate) fn qr_response(state: &State, username: &str) -> Result<Response, AppError> {
    let png = qr_png(&profile_url(&state.config.site_url, username))?;

    Ok(([(CONTENT_TYPE, "image/png")], png).into_response())
}
