//! # Facebook Conversions API
//!
//! Server-side copies of the browser pixel events. The browser sends the same
//! `event_id` so Facebook can deduplicate the pair.
//!
//! ## User data
//!
//! PII is normalised then SHA-256 hashed before it leaves the server:
//! - email: trimmed, lowercase
//! - phone: digits only, Iraqi local `07xxxxxxxxx` rewritten to `9647xxxxxxxxx`
//! - names: trimmed, lowercase
//! - city: lowercase, letters and digits only
//! - country: two-letter code, `iq` when absent
//!
//! Blank fields are dropped, never hashed. Client IP and user agent go in clear,
//! as the API requires.
//!
//! ## Identifiers
//!
//! - `fbp`: the `_fbp` cookie, else a fresh `fb.1.<unix_ms>.<10 random digits>`
//! - `fbc`: the `_fbc` cookie, else built from a `fbclid` in the body or in the
//!   event source URL, else omitted
//! - `external_id`: the caller's id, else a hash of `ip|user_agent` so repeat
//!   anonymous visitors still group together
//!
//! ## Failures
//!
//! One POST per event, no retry. A non-2xx answer becomes an [`EventOutcome`]
//! with `success: false`.
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::utils::ClientMeta;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_COUNTRY: &str = "iq";
pub const DEFAULT_CURRENCY: &str = "IQD";

#[derive(Clone, Debug)]
pub struct FacebookConfig {
    pub pixel_id: String,
    pub access_token: String,
    pub api_version: String,
    pub graph_url: String,
    pub test_event_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    PageView,
    ViewContent,
    Lead,
    Contact,
    CompleteRegistration,
    Purchase,
}

impl EventKind {
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "page-view" => Some(EventKind::PageView),
            "view-content" => Some(EventKind::ViewContent),
            "lead" => Some(EventKind::Lead),
            "contact" => Some(EventKind::Contact),
            "complete-registration" => Some(EventKind::CompleteRegistration),
            "purchase" => Some(EventKind::Purchase),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EventKind::PageView => "PageView",
            EventKind::ViewContent => "ViewContent",
            EventKind::Lead => "Lead",
            EventKind::Contact => "Contact",
            EventKind::CompleteRegistration => "CompleteRegistration",
            EventKind::Purchase => "Purchase",
        }
    }
}

/// What callers may tell us about an event. Everything is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventRequest {
    pub event_id: Option<String>,
    pub event_source_url: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub external_id: Option<String>,
    pub fbclid: Option<String>,
    pub value: Option<f64>,
    pub currency: Option<String>,
    pub content_name: Option<String>,
    pub content_category: Option<String>,
    pub content_ids: Option<Vec<String>>,
    pub num_items: Option<i64>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct UserData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub em: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ph: Option<String>,
    #[serde(rename = "fn", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ln: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ct: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbc: Option<String>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct CustomData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_items: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ServerEvent {
    pub event_name: &'static str,
    pub event_time: i64,
    pub event_id: String,
    pub action_source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_source_url: Option<String>,
    pub user_data: UserData,
    pub custom_data: CustomData,
}

#[derive(Debug, Serialize)]
pub struct EventBatch {
    pub data: Vec<ServerEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_event_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventOutcome {
    pub success: bool,
    pub event_name: &'static str,
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_received: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbtrace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct GraphSuccess {
    events_received: Option<i64>,
    fbtrace_id: Option<String>,
}

#[derive(Deserialize)]
struct GraphFailure {
    error: GraphErrorBody,
}

#[derive(Deserialize)]
struct GraphErrorBody {
    message: String,
    fbtrace_id: Option<String>,
}

pub struct Pixel {
    client: Client,
    config: FacebookConfig,
}

impl Pixel {
    pub fn new(config: FacebookConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/{}/events",
            self.config.graph_url.trim_end_matches('/'),
            self.config.api_version,
            self.config.pixel_id
        )
    }

    pub async fn send(&self, kind: EventKind, request: &EventRequest, meta: &ClientMeta) -> EventOutcome {
        let event = build_event(kind, request, meta, Utc::now());
        let event_id = event.event_id.clone();

        let batch = EventBatch {
            data: vec![event],
            test_event_code: self.config.test_event_code.clone(),
        };

        let failure = |status: Option<u16>, error: String, fbtrace_id: Option<String>| {
            warn!(
                "Facebook {} event {event_id} failed ({status:?}): {error}",
                kind.name()
            );
            EventOutcome {
                success: false,
                event_name: kind.name(),
                event_id: event_id.clone(),
                status,
                events_received: None,
                fbtrace_id,
                error: Some(error),
            }
        };

        let response = match self
            .client
            .post(self.endpoint())
            .query(&[("access_token", self.config.access_token.as_str())])
            .json(&batch)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return failure(None, e.without_url().to_string(), None),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return failure(Some(status.as_u16()), e.without_url().to_string(), None),
        };

        if !status.is_success() {
            let (message, fbtrace_id) = match serde_json::from_str::<GraphFailure>(&body) {
                Ok(parsed) => (parsed.error.message, parsed.error.fbtrace_id),
                Err(_) => (body, None),
            };
            return failure(Some(status.as_u16()), message, fbtrace_id);
        }

        let parsed: GraphSuccess = serde_json::from_str(&body).unwrap_or(GraphSuccess {
            events_received: None,
            fbtrace_id: None,
        });

        info!("Facebook {} event {event_id} accepted", kind.name());

        EventOutcome {
            success: true,
            event_name: kind.name(),
            event_id: event_id.clone(),
            status: Some(status.as_u16()),
            events_received: parsed.events_received,
            fbtrace_id: parsed.fbtrace_id,
            error: None,
        }
    }
}

pub fn build_event(kind: EventKind, request: &EventRequest, meta: &ClientMeta, now: DateTime<Utc>) -> ServerEvent {
    let event_source_url = present(&request.event_source_url).or_else(|| meta.referrer.clone());
    let fbclid = present(&request.fbclid).or_else(|| event_source_url.as_deref().and_then(fbclid_from_url));

    let external_id = match present(&request.external_id) {
        Some(id) => Some(sha256_hex(&id)),
        None => anonymous_id(meta),
    };

    let user_data = UserData {
        em: present(&request.email).map(|e| sha256_hex(&normalize_email(&e))),
        ph: present(&request.phone)
            .map(|p| normalize_phone(&p))
            .filter(|p| !p.is_empty())
            .map(|p| sha256_hex(&p)),
        first_name: present(&request.first_name).map(|n| sha256_hex(&normalize_name(&n))),
        ln: present(&request.last_name).map(|n| sha256_hex(&normalize_name(&n))),
        ct: present(&request.city)
            .map(|c| normalize_city(&c))
            .filter(|c| !c.is_empty())
            .map(|c| sha256_hex(&c)),
        country: Some(sha256_hex(&normalize_country(request.country.as_deref()))),
        external_id,
        client_ip_address: meta.ip.clone(),
        client_user_agent: meta.user_agent.clone(),
        fbp: meta.cookie("_fbp").map(str::to_string).or_else(|| Some(synthesize_fbp(now))),
        fbc: meta
            .cookie("_fbc")
            .map(str::to_string)
            .or_else(|| fbclid.map(|id| format!("fb.1.{}.{id}", now.timestamp_millis()))),
    };

    let value = request.value.or(match kind {
        EventKind::Purchase => Some(0.0),
        _ => None,
    });
    let currency = value.map(|_| {
        present(&request.currency)
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
    });

    ServerEvent {
        event_name: kind.name(),
        event_time: now.timestamp(),
        event_id: present(&request.event_id).unwrap_or_else(|| Uuid::new_v4().to_string()),
        action_source: "website",
        event_source_url,
        user_data,
        custom_data: CustomData {
            value,
            currency,
            content_name: present(&request.content_name),
            content_category: present(&request.content_category),
            content_ids: request.content_ids.clone().filter(|ids| !ids.is_empty()),
            num_items: request.num_items,
        },
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn normalize_city(city: &str) -> String {
    city.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

pub fn normalize_country(country: Option<&str>) -> String {
    country
        .map(|c| c.trim().to_lowercase())
        .filter(|c| c.len() == 2 && c.chars().all(|ch| ch.is_ascii_alphabetic()))
        .unwrap_or_else(|| DEFAULT_COUNTRY.to_string())
}

/// Digits only, with Iraqi local and `00` prefixes rewritten to the international form.
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    if let Some(rest) = digits.strip_prefix("00") {
        rest.to_string()
    } else if digits.len() == 11 && digits.starts_with("07") {
        format!("964{}", &digits[1..])
    } else {
        digits
    }
}

fn fbclid_from_url(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == "fbclid")
        .map(|(_, value)| value.into_owned())
        .filter(|v| !v.is_empty())
}

fn anonymous_id(meta: &ClientMeta) -> Option<String> {
    if meta.ip.is_none() && meta.user_agent.is_none() {
        return None;
    }

    Some(sha256_hex(&format!(
        "{}|{}",
        meta.ip.as_deref().unwrap_or_default(),
        meta.user_agent.as_deref().unwrap_or_default()
    )))
}

fn synthesize_fbp(now: DateTime<Utc>) -> String {
    let random: u64 = rand::thread_rng().gen_range(1_000_000_000..10_000_000_000);
    format!("fb.1.{}.{random}", now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn meta() -> ClientMeta {
        ClientMeta {
            ip: Some("185.10.10.10".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
            referrer: None,
            cookies: HashMap::new(),
        }
    }

    #[test]
    fn test_slugs() {
        for (slug, name) in [
            ("page-view", "PageView"),
            ("view-content", "ViewContent"),
            ("lead", "Lead"),
            ("contact", "Contact"),
            ("complete-registration", "CompleteRegistration"),
            ("purchase", "Purchase"),
        ] {
            assert_eq!(EventKind::from_slug(slug).map(EventKind::name), Some(name));
        }
        assert_eq!(EventKind::from_slug("add-to-cart"), None);
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("0770 123 4567"), "9647701234567");
        assert_eq!(normalize_phone("+964 770-123-4567"), "9647701234567");
        assert_eq!(normalize_phone("00964 7701234567"), "9647701234567");
        assert_eq!(normalize_phone("not a phone"), "");
    }

    #[test]
    fn test_normalize_fields() {
        assert_eq!(normalize_email("  Ali@Example.COM "), "ali@example.com");
        assert_eq!(normalize_city("Sulaymaniyah City"), "sulaymaniyahcity");
        assert_eq!(normalize_country(None), "iq");
        assert_eq!(normalize_country(Some("US")), "us");
        assert_eq!(normalize_country(Some("Iraq")), "iq");
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hashes_and_skips_blank_fields() {
        let request = EventRequest {
            email: Some(" Ali@Example.com".to_string()),
            phone: Some("   ".to_string()),
            first_name: Some(String::new()),
            ..Default::default()
        };

        let event = build_event(EventKind::Lead, &request, &meta(), Utc::now());

        assert_eq!(event.user_data.em, Some(sha256_hex("ali@example.com")));
        assert_eq!(event.user_data.ph, None);
        assert_eq!(event.user_data.first_name, None);
        assert_eq!(event.user_data.country, Some(sha256_hex("iq")));
        assert_eq!(event.user_data.client_ip_address.as_deref(), Some("185.10.10.10"));
        assert_eq!(event.custom_data.value, None);
        assert_eq!(event.custom_data.currency, None);
    }

    #[test]
    fn test_synthesizes_identifiers() {
        let now = Utc::now();
        let event = build_event(EventKind::PageView, &EventRequest::default(), &meta(), now);

        let fbp = event.user_data.fbp.unwrap();
        assert!(fbp.starts_with(&format!("fb.1.{}.", now.timestamp_millis())));
        assert_eq!(fbp.rsplit('.').next().map(str::len), Some(10));
        assert_eq!(event.user_data.fbc, None);
        assert_eq!(
            event.user_data.external_id,
            Some(sha256_hex("185.10.10.10|Mozilla/5.0"))
        );
        assert!(Uuid::parse_str(&event.event_id).is_ok());
    }

    #[test]
    fn test_prefers_cookies_and_url_fbclid() {
        let mut meta = meta();
        meta.cookies.insert("_fbp".to_string(), "fb.1.1.42".to_string());

        let now = Utc::now();
        let request = EventRequest {
            event_source_url: Some("https://boardiraq.com/ali?fbclid=AbC123".to_string()),
            event_id: Some("evt-1".to_string()),
            ..Default::default()
        };
        let event = build_event(EventKind::ViewContent, &request, &meta, now);

        assert_eq!(event.user_data.fbp.as_deref(), Some("fb.1.1.42"));
        assert_eq!(
            event.user_data.fbc,
            Some(format!("fb.1.{}.AbC123", now.timestamp_millis()))
        );
        assert_eq!(event.event_id, "evt-1");

        meta.cookies.insert("_fbc".to_string(), "fb.1.7.cookie".to_string());
        let event = build_event(EventKind::ViewContent, &request, &meta, now);
        assert_eq!(event.user_data.fbc.as_deref(), Some("fb.1.7.cookie"));
    }

    #[test]
    fn test_purchase_defaults_currency() {
        let request = EventRequest {
            value: Some(50_000.0),
            currency: Some("usd".to_string()),
            ..Default::default()
        };
        let event = build_event(EventKind::Purchase, &request, &meta(), Utc::now());
        assert_eq!(event.custom_data.currency.as_deref(), Some("USD"));

        let event = build_event(EventKind::Purchase, &EventRequest::default(), &meta(), Utc::now());
        assert_eq!(event.custom_data.value, Some(0.0));
        assert_eq!(event.custom_data.currency.as_deref(), Some(DEFAULT_CURRENCY));
    }

    #[test]
    fn test_payload_shape() {
        let event = build_event(EventKind::Contact, &EventRequest::default(), &meta(), Utc::now());
        let json = serde_json::to_value(EventBatch {
            data: vec![event],
            test_event_code: None,
        })
        .unwrap();

        assert_eq!(json["data"][0]["event_name"], "Contact");
        assert_eq!(json["data"][0]["action_source"], "website");
        assert!(json["data"][0]["user_data"].get("em").is_none());
        assert!(json.get("test_event_code").is_none());
    }
}
