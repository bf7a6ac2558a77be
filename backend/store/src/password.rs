//! # Passwords
//!
//! Argon2id PHC strings. The plaintext only exists for the length of a request,
//! or inside a batch report until the administrator downloads it.
//!
//! Hashing takes tens of milliseconds of CPU. Async callers use [`hash`] and
//! [`verify`], which run on the blocking pool instead of a runtime worker.
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use tokio::task::spawn_blocking;

use crate::error::StoreError;

pub async fn hash(password: &str) -> Result<String, StoreError> {
    let password = password.to_string();

    spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| StoreError::Hashing(e.to_string()))?
}

pub async fn verify(password: &str, hash: &str) -> bool {
    let (password, hash) = (password.to_string(), hash.to_string());

    spawn_blocking(move || verify_password(&password, &hash))
        .await
        .unwrap_or(false)
}

pub fn hash_password(password: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Hashing(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
