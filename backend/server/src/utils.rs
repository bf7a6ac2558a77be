use std::{collections::HashMap, convert::Infallible, net::SocketAddr, sync::LazyLock};

use axum::{
    Json,
    extract::{ConnectInfo, FromRequest, FromRequestParts, Request},
    http::{
        HeaderMap,
        header::{COOKIE, REFERER, USER_AGENT},
        request::Parts,
    },
};
use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use regex::Regex;
use store::{LinkType, ProfileUpdate};

use crate::error::AppError::{self, MalformedPayload};

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 200;
pub const MAX_ORDER_QUANTITY: i32 = 100;
pub const MIN_PASSWORD_LEN: usize = 6;

// Iraq has no DST
const BAGHDAD_OFFSET_SECS: i32 = 3 * 3600;

/// Paths that would shadow pages of the site if used as a profile name.
const RESERVED_USERNAMES: &[&str] = &[
    "admin", "api", "dashboard", "login", "logout", "register", "order", "orders", "profile",
    "settings", "static", "assets",
];

static USERNAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9._-]{3,30}$").unwrap());
static HEX_COLOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").unwrap());

/// Request metadata used for analytics and the Conversions API.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub cookies: HashMap<String, String>,
}

impl ClientMeta {
    pub fn from_headers(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let forwarded = header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .filter(|ip| !ip.is_empty());

        Self {
            ip: forwarded
                .or_else(|| header("x-real-ip"))
                .or_else(|| peer.map(|addr| addr.ip().to_string())),
            user_agent: header(USER_AGENT.as_str()),
            referrer: header(REFERER.as_str()),
            cookies: headers
                .get_all(COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(parse_cookies)
                .collect(),
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

fn parse_cookies(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(Self::from_headers(&parts.headers, peer))
    }
}

/// `Json` whose rejections come back as `AppError`, so a bad body gets the usual 400 `{"error"}`.
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = axum::extract::rejection::JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;

        Ok(Self(value))
    }
}

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

/// Start of the current day in Baghdad, as UTC.
pub fn local_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(offset) = FixedOffset::east_opt(BAGHDAD_OFFSET_SECS) else {
        return now.date_naive().and_time(NaiveTime::MIN).and_utc();
    };

    match now
        .with_timezone(&offset)
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(offset)
        .single()
    {
        Some(midnight) => midnight.with_timezone(&Utc),
        None => now.date_naive().and_time(NaiveTime::MIN).and_utc(),
    }
}

pub fn normalize_username(input: &str) -> Result<String, AppError> {
    let username = input.trim().to_lowercase();

    if !USERNAME.is_match(&username) {
        return Err(MalformedPayload(
            "username must be 3-30 characters of a-z, 0-9, '.', '_' or '-'".to_string(),
        ));
    }

    if RESERVED_USERNAMES.contains(&username.as_str()) {
        return Err(MalformedPayload(format!("username {username} is reserved")));
    }

    Ok(username)
}

pub fn check_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(MalformedPayload(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    Ok(())
}

fn check_length(field: &str, value: &Option<String>, max: usize) -> Result<(), AppError> {
    match value {
        Some(v) if v.trim().chars().count() > max => Err(MalformedPayload(format!(
            "{field} must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}

fn check_color(field: &str, value: &Option<String>) -> Result<(), AppError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() && !HEX_COLOR.is_match(v) => Err(MalformedPayload(format!(
            "{field} must be a #rrggbb colour"
        ))),
        _ => Ok(()),
    }
}

fn is_http_url(value: &str) -> bool {
    reqwest::Url::parse(value).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

pub fn check_profile(update: &ProfileUpdate) -> Result<(), AppError> {
    check_length("full_name", &update.full_name, 100)?;
    check_length("job_title", &update.job_title, 100)?;
    check_length("company", &update.company, 100)?;
    check_length("bio", &update.bio, 500)?;
    check_color("background_color", &update.background_color)?;
    check_color("text_color", &update.text_color)?;
    check_color("button_color", &update.button_color)?;

    match update.profile_image_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() && !is_http_url(url) => Err(MalformedPayload(
            "profile_image_url must be an http(s) URL".to_string(),
        )),
        _ => Ok(()),
    }
}

pub fn check_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();

    if title.is_empty() || title.chars().count() > 100 {
        return Err(MalformedPayload(
            "title must be 1-100 characters".to_string(),
        ));
    }

    Ok(title.to_string())
}

/// Turns what a user typed into a clickable URL for the link type.
pub fn normalize_link_url(link_type: LinkType, raw: &str) -> Result<String, AppError> {
    let raw = raw.trim();

    if raw.is_empty() {
        return Err(MalformedPayload("url is required".to_string()));
    }

    let url = match link_type {
        LinkType::Phone => {
            let number = raw.strip_prefix("tel:").unwrap_or(raw);
            let cleaned: String = number
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '+')
                .collect();
            if cleaned.chars().filter(char::is_ascii_digit).count() < 6 {
                return Err(MalformedPayload("phone number is too short".to_string()));
            }
            format!("tel:{cleaned}")
        }
        LinkType::Email => {
            let address = raw.strip_prefix("mailto:").unwrap_or(raw);
            if !address.contains('@') || address.contains(char::is_whitespace) {
                return Err(MalformedPayload("invalid email address".to_string()));
            }
            format!("mailto:{address}")
        }
        LinkType::Whatsapp if !raw.starts_with("http") => {
            let digits = crate::pixel::normalize_phone(raw);
            if digits.len() < 6 {
                return Err(MalformedPayload("whatsapp number is too short".to_string()));
            }
            format!("https://wa.me/{digits}")
        }
        _ => {
            let url = if raw.contains("://") {
                raw.to_string()
            } else {
                format!("https://{raw}")
            };
            if !is_http_url(&url) {
                return Err(MalformedPayload("url must be http(s)".to_string()));
            }
            url
        }
    };

    Ok(url)
}

pub fn check_required(field: &str, value: &str) -> Result<String, AppError> {
    let value = value.trim();

    if value.is_empty() {
        return Err(MalformedPayload(format!("{field} is required")));
    }

    Ok(value.to_string())
}

pub fn check_quantity(quantity: i32) -> Result<(), AppError> {
    if !(1..=MAX_ORDER_QUANTITY).contains(&quantity) {
        return Err(MalformedPayload(format!(
            "quantity must be between 1 and {MAX_ORDER_QUANTITY}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username("  Ali.Hassan ").unwrap(), "ali.hassan");
        assert!(normalize_username("ab").is_err());
        assert!(normalize_username("ali hassan").is_err());
        assert!(normalize_username("Admin").is_err());
    }

    #[test]
    fn test_check_password() {
        assert!(check_password("12345").is_err());
        assert!(check_password("123456").is_ok());
    }

    #[test]
    fn test_check_profile() {
        let ok = ProfileUpdate {
            background_color: Some("#AABBCC".to_string()),
            text_color: Some(String::new()),
            profile_image_url: Some("https://cdn.example.com/a.png".to_string()),
            ..Default::default()
        };
        assert!(check_profile(&ok).is_ok());

        let bad_color = ProfileUpdate {
            button_color: Some("blue".to_string()),
            ..Default::default()
        };
        assert!(check_profile(&bad_color).is_err());

        let bad_image = ProfileUpdate {
            profile_image_url: Some("javascript:alert(1)".to_string()),
            ..Default::default()
        };
        assert!(check_profile(&bad_image).is_err());
    }

    #[test]
    fn test_normalize_link_url() {
        assert_eq!(
            normalize_link_url(LinkType::Phone, "+964 770 123 4567").unwrap(),
            "tel:+9647701234567"
        );
        assert_eq!(
            normalize_link_url(LinkType::Email, "ali@example.com").unwrap(),
            "mailto:ali@example.com"
        );
        assert_eq!(
            normalize_link_url(LinkType::Whatsapp, "07701234567").unwrap(),
            "https://wa.me/9647701234567"
        );
        assert_eq!(
            normalize_link_url(LinkType::Social, "instagram.com/ali").unwrap(),
            "https://instagram.com/ali"
        );
        assert!(normalize_link_url(LinkType::Website, "ftp://example.com").is_err());
        assert!(normalize_link_url(LinkType::Email, "not-an-email").is_err());
        assert!(normalize_link_url(LinkType::Phone, "12").is_err());
    }

    #[test]
    fn test_check_quantity() {
        assert!(check_quantity(0).is_err());
        assert!(check_quantity(MAX_ORDER_QUANTITY + 1).is_err());
        assert!(check_quantity(5).is_ok());
    }

    #[test]
    fn test_limits() {
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10_000)), MAX_LIMIT);
        assert_eq!(clamp_offset(Some(-5)), 0);
    }

    #[test]
    fn test_local_midnight() {
        // 22:30 UTC is already 01:30 the next day in Baghdad
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 22, 30, 0).unwrap();
        assert_eq!(
            local_midnight(now),
            Utc.with_ymd_and_hms(2025, 3, 1, 21, 0, 0).unwrap()
        );

        let morning = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(
            local_midnight(morning),
            Utc.with_ymd_and_hms(2025, 2, 28, 21, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_client_meta() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4, 10.0.0.1"));
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8"));
        headers.insert(COOKIE, HeaderValue::from_static("_fbp=fb.1.1.2; theme=dark"));

        let meta = ClientMeta::from_headers(&headers, Some("127.0.0.1:9000".parse().unwrap()));
        assert_eq!(meta.ip.as_deref(), Some("1.2.3.4"));
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(meta.cookie("_fbp"), Some("fb.1.1.2"));
        assert_eq!(meta.cookie("theme"), Some("dark"));

        let mut proxied = HeaderMap::new();
        proxied.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        let meta = ClientMeta::from_headers(&proxied, Some("127.0.0.1:9000".parse().unwrap()));
        assert_eq!(meta.ip.as_deref(), Some("9.9.9.9"));

        let bare = ClientMeta::from_headers(&HeaderMap::new(), Some("127.0.0.1:9000".parse().unwrap()));
        assert_eq!(bare.ip.as_deref(), Some("127.0.0.1"));
    }
}
