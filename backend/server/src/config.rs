use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use thiserror::Error;
use tracing::{info, warn};

use crate::pixel::FacebookConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub memory_store: bool,
    pub site_url: String,
    pub card_price: i64,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub cors_origin: String,
    pub session_secret: String,
    pub admin_token: String,
    pub facebook: Option<FacebookConfig>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let memory_store: bool = try_load("BOARD_MEMORY_STORE", "false")?;
        let database_url = optional("DATABASE_URL");

        if database_url.is_none() && !memory_store {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let session_secret = read_secret("SESSION_SECRET").ok_or(ConfigError::Missing("SESSION_SECRET"))?;
        if session_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                key: "SESSION_SECRET",
                reason: "must be at least 32 characters".to_string(),
            });
        }

        Ok(Self {
            port: try_load("RUST_PORT", "8080")?,
            database_url,
            memory_store,
            site_url: try_load("SITE_URL", "https://boardiraq.com")?,
            card_price: check_card_price(try_load("CARD_PRICE", "25000")?)?,
            contact_phone: optional("CONTACT_PHONE"),
            contact_email: optional("CONTACT_EMAIL"),
            cors_origin: try_load("CORS_ORIGIN", "*")?,
            session_secret,
            admin_token: read_secret("ADMIN_TOKEN").ok_or(ConfigError::Missing("ADMIN_TOKEN"))?,
            facebook: load_facebook()?,
        })
    }
}

/// Keeps `quantity * price` far from overflow for any allowed quantity.
pub const MAX_CARD_PRICE: i64 = 1_000_000_000;

fn check_card_price(price: i64) -> Result<i64, ConfigError> {
    if !(1..=MAX_CARD_PRICE).contains(&price) {
        return Err(ConfigError::Invalid {
            key: "CARD_PRICE",
            reason: format!("must be between 1 and {MAX_CARD_PRICE}"),
        });
    }

    Ok(price)
}

fn load_facebook() -> Result<Option<FacebookConfig>, ConfigError> {
    match (read_secret("FB_PIXEL_ID"), read_secret("FB_ACCESS_TOKEN")) {
        (Some(pixel_id), Some(access_token)) => Ok(Some(FacebookConfig {
            pixel_id,
            access_token,
            api_version: try_load("FB_API_VERSION", "v18.0")?,
            graph_url: try_load("FB_GRAPH_URL", "https://graph.facebook.com")?,
            test_event_code: optional("FB_TEST_EVENT_CODE"),
        })),
        (None, None) => {
            info!("Facebook pixel not configured, event forwarding disabled");
            Ok(None)
        }
        (None, Some(_)) => Err(ConfigError::Missing("FB_PIXEL_ID")),
        (Some(_), None) => Err(ConfigError::Missing("FB_ACCESS_TOKEN")),
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn optional(key: &str) -> Option<String> {
    var(key).or_else(|| {
        info!("{key} not set");
        None
    })
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }
        })
}

/// Docker secret first, then the environment variable of the same name.
fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| {
            info!("No secret file for {secret_name}, falling back to environment");
            var(secret_name)
        })
}
