#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use reqwest::{Client, Response};
use serde_json::{Value, json};
use server::{build_router, config::Config, pixel::FacebookConfig, state::State};
use store::MemoryStore;
use tokio::net::TcpListener;

pub const ADMIN_TOKEN: &str = "test-admin-token";
pub const CARD_PRICE: i64 = 25_000;

pub fn test_config(facebook: Option<FacebookConfig>) -> Config {
    Config {
        port: 0,
        database_url: None,
        memory_store: true,
        site_url: "https://boardiraq.test".to_string(),
        card_price: CARD_PRICE,
        contact_phone: Some("+9647700000000".to_string()),
        contact_email: None,
        cors_origin: "*".to_string(),
        session_secret: "0123456789abcdef0123456789abcdef".to_string(),
        admin_token: ADMIN_TOKEN.to_string(),
        facebook,
    }
}

pub struct TestApp {
    pub base: String,
    pub client: Client,
    pub store: Arc<MemoryStore>,
}

pub async fn spawn_app(facebook: Option<FacebookConfig>) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let state = State::with_store(test_config(facebook), store.clone()).expect("state");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(
            listener,
            build_router(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("serve");
    });

    TestApp {
        base: format!("http://{addr}"),
        client: Client::new(),
        store,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub async fn register(&self, username: &str, password: &str) -> (Value, String) {
        let res = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({ "username": username, "password": password, "full_name": "Ali Hassan" }))
            .send()
            .await
            .expect("register");
        assert_eq!(res.status(), 201);

        let body: Value = res.json().await.expect("json");
        let token = body["token"].as_str().expect("token").to_string();
        (body["user"].clone(), token)
    }

    pub async fn get_auth(&self, path: &str, token: &str) -> Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("request")
    }

    pub async fn send_json(
        &self,
        method: reqwest::Method,
        path: &str,
        token: Option<&str>,
        body: Value,
    ) -> Response {
        let mut req = self.client.request(method, self.url(path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.expect("request")
    }
}
