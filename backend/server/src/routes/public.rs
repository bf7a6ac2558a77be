use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State as AxumState},
    response::Response,
};
use serde::Serialize;
use store::{LinkClick, PageVisit, StoreError, User, UserLink};
use tracing::warn;
use uuid::Uuid;

use super::profile::qr_response;
use crate::{error::AppError, state::State, utils::ClientMeta};

/// What anyone scanning a card gets to see.
#[derive(Serialize)]
pub struct PublicProfile {
    username: String,
    full_name: Option<String>,
    job_title: Option<String>,
    company: Option<String>,
    bio: Option<String>,
    profile_image_url: Option<String>,
    background_color: String,
    text_color: String,
    button_color: String,
    is_premium: bool,
    links: Vec<PublicLink>,
}

#[derive(Serialize)]
pub struct PublicLink {
    id: Uuid,
    link_type: store::LinkType,
    platform: Option<String>,
    title: String,
    url: String,
}

#[derive(Serialize)]
pub struct ClickResponse {
    url: String,
}

impl PublicProfile {
    fn new(user: User, links: Vec<UserLink>) -> Self {
        Self {
            username: user.username,
            full_name: user.full_name,
            job_title: user.job_title,
            company: user.company,
            bio: user.bio,
            profile_image_url: user.profile_image_url,
            background_color: user.background_color,
            text_color: user.text_color,
            button_color: user.button_color,
            is_premium: user.is_premium,
            links: links
                .into_iter()
                .map(|link| PublicLink {
                    id: link.id,
                    link_type: link.link_type,
                    platform: link.platform,
                    title: link.title,
                    url: link.url,
                })
                .collect(),
        }
    }
}

async fn active_user(state: &State, username: &str) -> Result<User, AppError> {
    let user = state.store.user_by_username(&username.trim().to_lowercase()).await?;

    if !user.is_active {
        return Err(AppError::NotFound);
    }

    Ok(user)
}

pub async fn profile_handler(
    AxumState(state): AxumState<Arc<State>>,
    Path(username): Path<String>,
    meta: ClientMeta,
) -> Result<Json<PublicProfile>, AppError> {
    let user = active_user(&state, &username).await?;
    let links = state.store.links_for_user(user.id, true).await?;

    let visit = PageVisit {
        user_id: user.id,
        ip_address: meta.ip,
        user_agent: meta.user_agent,
        referrer: meta.referrer,
    };
    if let Err(e) = state.store.record_visit(visit).await {
        warn!("Failed to record visit for {}: {e}", user.username);
    }

    Ok(Json(PublicProfile::new(user, links)))
}

pub async fn profile_qr_handler(
    AxumState(state): AxumState<Arc<State>>,
    Path(username): Path<String>,
) -> Result<Response, AppError> {
    let user = active_user(&state, &username).await?;

    qr_response(&state, &user.username)
}

pub async fn click_handler(
    AxumState(state): AxumState<Arc<State>>,
    Path(link_id): Path<Uuid>,
    meta: ClientMeta,
) -> Result<Json<ClickResponse>, AppError> {
    let link = state.store.link_by_id(link_id).await?;
    if !link.is_active {
        return Err(AppError::NotFound);
    }

    let owner = match state.store.user_by_id(link.user_id).await {
        Ok(owner) if owner.is_active => owner,
        Ok(_) | Err(StoreError::NotFound) => return Err(AppError::NotFound),
        Err(e) => return Err(e.into()),
    };

    state
        .store
        .record_click(LinkClick {
            link_id: link.id,
            user_id: owner.id,
            ip_address: meta.ip,
            user_agent: meta.user_agent,
        })
        .await?;

    Ok(Json(ClickResponse { url: link.url }))
}
