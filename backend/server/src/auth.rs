//! # Sessions
//!
//! Stateless bearer tokens: `base64url("<user_id>:<expires_unix>") . base64url(hmac)`,
//! HMAC-SHA256 keyed with `SESSION_SECRET`. Nothing is stored server side, so a
//! deactivated account is caught by re-reading the user on every request.
//!
//! Admin routes use a separate static `ADMIN_TOKEN`, compared in constant time.
use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use store::User;
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

use crate::{error::AppError, state::State};

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_DAYS: i64 = 30;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("Malformed token")]
    Malformed,

    #[error("Bad signature")]
    BadSignature,

    #[error("Token expired")]
    Expired,
}

#[derive(Clone)]
pub struct Sessions {
    mac: HmacSha256,
    ttl: Duration,
}

impl Sessions {
    pub fn new(secret: &str) -> Self {
        let mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");

        Self {
            mac,
            ttl: Duration::days(SESSION_DAYS),
        }
    }

    pub fn issue(&self, user_id: Uuid) -> String {
        self.issue_at(user_id, Utc::now())
    }

    pub fn verify(&self, token: &str) -> Result<Uuid, SessionError> {
        self.verify_at(token, Utc::now())
    }

    fn sign(&self, payload: &[u8]) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac
    }

    fn issue_at(&self, user_id: Uuid, now: DateTime<Utc>) -> String {
        let payload = format!("{user_id}:{}", (now + self.ttl).timestamp());
        let signature = self.sign(payload.as_bytes()).finalize().into_bytes();

        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode(signature)
        )
    }

    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Uuid, SessionError> {
        let (payload, signature) = token.split_once('.').ok_or(SessionError::Malformed)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| SessionError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SessionError::Malformed)?;

        self.sign(&payload)
            .verify_slice(&signature)
            .map_err(|_| SessionError::BadSignature)?;

        let payload = String::from_utf8(payload).map_err(|_| SessionError::Malformed)?;
        let (user_id, expires) = payload.split_once(':').ok_or(SessionError::Malformed)?;

        let user_id = Uuid::parse_str(user_id).map_err(|_| SessionError::Malformed)?;
        let expires: i64 = expires.parse().map_err(|_| SessionError::Malformed)?;

        if now.timestamp() >= expires {
            return Err(SessionError::Expired);
        }

        Ok(user_id)
    }
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// A signed-in, active user.
pub struct AuthUser(pub User);

impl FromRequestParts<Arc<State>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<State>) -> Result<Self, Self::Rejection> {
        let token = bearer(parts).ok_or(AppError::Unauthorized)?;
        let user_id = state
            .sessions
            .verify(token)
            .map_err(|_| AppError::Unauthorized)?;

        let user = state.store.user_by_id(user_id).await.map_err(|e| match e {
            store::StoreError::NotFound => AppError::Unauthorized,
            other => other.into(),
        })?;

        if !user.is_active {
            return Err(AppError::Forbidden("Account is deactivated".to_string()));
        }

        Ok(AuthUser(user))
    }
}

pub struct Admin;

impl FromRequestParts<Arc<State>> for Admin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<State>) -> Result<Self, Self::Rejection> {
        let token = bearer(parts).ok_or(AppError::Unauthorized)?;

        if bool::from(token.as_bytes().ct_eq(state.config.admin_token.as_bytes())) {
            Ok(Admin)
        } else {
            Err(AppError::Unauthorized)
        }
    }
}
