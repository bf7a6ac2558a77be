use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State as AxumState},
    http::StatusCode,
};
use serde::Deserialize;
use store::{LinkUpdate, NewLink, UserLink, non_empty};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::AppError,
    state::State,
    utils::{JsonBody, check_title, normalize_link_url},
};

#[derive(Deserialize)]
pub struct ReorderRequest {
    ids: Vec<Uuid>,
}

pub async fn list_links_handler(
    AxumState(state): AxumState<Arc<State>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<UserLink>>, AppError> {
    Ok(Json(state.store.links_for_user(user.id, false).await?))
}

pub async fn create_link_handler(
    AxumState(state): AxumState<Arc<State>>,
    AuthUser(user): AuthUser,
    JsonBody(link): JsonBody<NewLink>,
) -> Result<(StatusCode, Json<UserLink>), AppError> {
    let link = NewLink {
        title: check_title(&link.title)?,
        url: normalize_link_url(link.link_type, &link.url)?,
        platform: non_empty(link.platform),
        link_type: link.link_type,
    };

    let created = state.store.create_link(user.id, link).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_link_handler(
    AxumState(state): AxumState<Arc<State>>,
    AuthUser(user): AuthUser,
    Path(link_id): Path<Uuid>,
    JsonBody(mut update): JsonBody<LinkUpdate>,
) -> Result<Json<UserLink>, AppError> {
    if let Some(title) = &update.title {
        update.title = Some(check_title(title)?);
    }

    // The stored pair of type and URL must stay consistent whichever half changes
    update.url = match (update.link_type, update.url.take()) {
        (None, None) => None,
        (Some(link_type), Some(url)) => Some(normalize_link_url(link_type, &url)?),
        (None, Some(url)) => {
            let current = current_link(&state, user.id, link_id).await?;
            Some(normalize_link_url(current.link_type, &url)?)
        }
        (Some(link_type), None) => {
            let current = current_link(&state, user.id, link_id).await?;
            Some(normalize_link_url(link_type, &current.url)?)
        }
    };

    Ok(Json(state.store.update_link(user.id, link_id, update).await?))
}

pub async fn delete_link_handler(
    AxumState(state): AxumState<Arc<State>>,
    AuthUser(user): AuthUser,
    Path(link_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.store.delete_link(user.id, link_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn reorder_links_handler(
    AxumState(state): AxumState<Arc<State>>,
    AuthUser(user): AuthUser,
    JsonBody(payload): JsonBody<ReorderRequest>,
) -> Result<Json<Vec<UserLink>>, AppError> {
    Ok(Json(state.store.reorder_links(user.id, &payload.ids).await?))
}

async fn current_link(state: &State, user_id: Uuid, link_id: Uuid) -> Result<UserLink, AppError> {
    let link = state.store.link_by_id(link_id).await?;

    // Someone else's link looks the same as a missing one
    if link.user_id != user_id {
        return Err(AppError::NotFound);
    }

    Ok(link)
}
