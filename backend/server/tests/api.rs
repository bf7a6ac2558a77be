mod common;

use std::io::{Cursor, Read};

use common::{ADMIN_TOKEN, CARD_PRICE, spawn_app};
use reqwest::Method;
use serde_json::{Value, json};

#[tokio::test]
async fn health_and_site_info() {
    let app = spawn_app(None).await;

    let res = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    let site: Value = app
        .client
        .get(app.url("/api/site"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(site["card_price"], CARD_PRICE);
    assert_eq!(site["pixel_enabled"], false);
}

#[tokio::test]
async fn register_and_login() {
    let app = spawn_app(None).await;
    let (user, token) = app.register("Ali.Hassan", "secret1").await;

    assert_eq!(user["username"], "ali.hassan");
    assert!(user.get("password_hash").is_none());

    let me: Value = app.get_auth("/api/me", &token).await.json().await.unwrap();
    assert_eq!(me["id"], user["id"]);

    let dup = app
        .send_json(
            Method::POST,
            "/api/auth/register",
            None,
            json!({ "username": "ali.hassan", "password": "another" }),
        )
        .await;
    assert_eq!(dup.status(), 409);

    let short = app
        .send_json(
            Method::POST,
            "/api/auth/register",
            None,
            json!({ "username": "sara", "password": "123" }),
        )
        .await;
    assert_eq!(short.status(), 400);

    let wrong = app
        .send_json(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "username": "ali.hassan", "password": "nope-nope" }),
        )
        .await;
    assert_eq!(wrong.status(), 401);

    let unknown = app
        .send_json(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "username": "nobody", "password": "secret1" }),
        )
        .await;
    assert_eq!(unknown.status(), 401);

    let ok = app
        .send_json(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "username": "ALI.HASSAN", "password": "secret1" }),
        )
        .await;
    assert_eq!(ok.status(), 200);
}

#[tokio::test]
async fn requests_without_valid_session_are_rejected() {
    let app = spawn_app(None).await;

    let res = app.client.get(app.url("/api/me")).send().await.unwrap();
    assert_eq!(res.status(), 401);

    let res = app.get_auth("/api/me", "not.a-token").await;
    assert_eq!(res.status(), 401);
}

#[tokio::test]
async fn deactivated_user_is_locked_out() {
    let app = spawn_app(None).await;
    let (user, token) = app.register("karim", "secret1").await;
    let id = user["id"].as_str().unwrap();

    let res = app
        .send_json(
            Method::PATCH,
            &format!("/api/admin/users/{id}"),
            Some(ADMIN_TOKEN),
            json!({ "is_active": false }),
        )
        .await;
    assert_eq!(res.status(), 200);

    let login = app
        .send_json(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "username": "karim", "password": "secret1" }),
        )
        .await;
    assert_eq!(login.status(), 403);

    assert_eq!(app.get_auth("/api/me", &token).await.status(), 403);

    let profile = app.client.get(app.url("/api/profiles/karim")).send().await.unwrap();
    assert_eq!(profile.status(), 404);
}

#[tokio::test]
async fn profile_update_validates_colours() {
    let app = spawn_app(None).await;
    let (_, token) = app.register("noor", "secret1").await;

    let bad = app
        .send_json(
            Method::PUT,
            "/api/me/profile",
            Some(&token),
            json!({ "button_color": "red" }),
        )
        .await;
    assert_eq!(bad.status(), 400);

    let ok = app
        .send_json(
            Method::PUT,
            "/api/me/profile",
            Some(&token),
            json!({ "job_title": "Engineer", "button_color": "#ff0000" }),
        )
        .await;
    assert_eq!(ok.status(), 200);

    let user: Value = ok.json().await.unwrap();
    assert_eq!(user["job_title"], "Engineer");
    assert_eq!(user["button_color"], "#ff0000");
    assert_eq!(user["full_name"], "Ali Hassan");
}

#[tokio::test]
async fn links_reorder_and_public_profile() {
    let app = spawn_app(None).await;
    let (_, token) = app.register("zainab", "secret1").await;

    let mut ids = Vec::new();
    for (link_type, title, url) in [
        ("phone", "Call me", "0770 123 4567"),
        ("social", "Instagram", "instagram.com/zainab"),
        ("email", "Mail", "zainab@example.com"),
    ] {
        let res = app
            .send_json(
                Method::POST,
                "/api/me/links",
                Some(&token),
                json!({ "link_type": link_type, "title": title, "url": url }),
            )
            .await;
        assert_eq!(res.status(), 201);
        let link: Value = res.json().await.unwrap();
        ids.push(link["id"].as_str().unwrap().to_string());
    }

    let reversed: Vec<&String> = ids.iter().rev().collect();
    let res = app
        .send_json(
            Method::PUT,
            "/api/me/links/order",
            Some(&token),
            json!({ "ids": reversed }),
        )
        .await;
    assert_eq!(res.status(), 200);

    let partial = app
        .send_json(
            Method::PUT,
            "/api/me/links/order",
            Some(&token),
            json!({ "ids": [ids[0]] }),
        )
        .await;
    assert_eq!(partial.status(), 400);

    // Hide the phone link from the public page
    let res = app
        .send_json(
            Method::PUT,
            &format!("/api/me/links/{}", ids[0]),
            Some(&token),
            json!({ "is_active": false }),
        )
        .await;
    assert_eq!(res.status(), 200);

    let profile: Value = app
        .client
        .get(app.url("/api/profiles/zainab"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let titles: Vec<&str> = profile["links"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, ["Mail", "Instagram"]);

    let all: Value = app.get_auth("/api/me/links", &token).await.json().await.unwrap();
    assert_eq!(all.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn visits_and_clicks_are_counted() {
    let app = spawn_app(None).await;
    let (_, token) = app.register("mustafa", "secret1").await;

    let link: Value = app
        .send_json(
            Method::POST,
            "/api/me/links",
            Some(&token),
            json!({ "link_type": "website", "title": "Site", "url": "https://mustafa.iq" }),
        )
        .await
        .json()
        .await
        .unwrap();
    let link_id = link["id"].as_str().unwrap();

    for _ in 0..2 {
        let res = app.client.get(app.url("/api/profiles/mustafa")).send().await.unwrap();
        assert_eq!(res.status(), 200);
    }
    assert_eq!(app.store.visit_log_len().await, 2);

    let res = app
        .client
        .post(app.url(&format!("/api/links/{link_id}/click")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["url"], "https://mustafa.iq");
    assert_eq!(app.store.click_log_len().await, 1);

    let stats: Value = app.get_auth("/api/me/stats", &token).await.json().await.unwrap();
    assert_eq!(stats["total_visits"], 2);
    assert_eq!(stats["total_clicks"], 1);
    assert_eq!(stats["links"][0]["click_count"], 1);

    let missing = app
        .client
        .post(app.url(&format!("/api/links/{}/click", uuid::Uuid::new_v4())))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    let unknown = app.client.get(app.url("/api/profiles/nobody")).send().await.unwrap();
    assert_eq!(unknown.status(), 404);
}

#[tokio::test]
async fn qr_codes_are_png() {
    let app = spawn_app(None).await;
    let (_, token) = app.register("hussein", "secret1").await;

    for res in [
        app.get_auth("/api/me/qr", &token).await,
        app.client.get(app.url("/api/profiles/hussein/qr")).send().await.unwrap(),
    ] {
        assert_eq!(res.status(), 200);
        assert_eq!(res.headers()["content-type"], "image/png");
        let bytes = res.bytes().await.unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
    }
}

fn order_body(quantity: i32) -> Value {
    json!({
        "customer_name": "Ahmed Kareem",
        "phone": "07701234567",
        "city": "Baghdad",
        "address": "Karrada, street 62",
        "quantity": quantity,
    })
}

#[tokio::test]
async fn orders_flow() {
    let app = spawn_app(None).await;

    let zero = app.send_json(Method::POST, "/api/orders", None, order_body(0)).await;
    assert_eq!(zero.status(), 400);

    let mut missing = order_body(1);
    missing["address"] = json!("  ");
    let res = app.send_json(Method::POST, "/api/orders", None, missing).await;
    assert_eq!(res.status(), 400);

    let res = app.send_json(Method::POST, "/api/orders", None, order_body(3)).await;
    assert_eq!(res.status(), 201);
    let order: Value = res.json().await.unwrap();
    assert_eq!(order["total"], 3 * CARD_PRICE);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["payment_status"], "unpaid");
    let id = order["id"].as_str().unwrap();

    let anonymous = app.client.get(app.url("/api/orders")).send().await.unwrap();
    assert_eq!(anonymous.status(), 401);

    let res = app
        .send_json(
            Method::PATCH,
            &format!("/api/orders/{id}"),
            Some(ADMIN_TOKEN),
            json!({ "status": "confirmed", "payment_status": "paid" }),
        )
        .await;
    assert_eq!(res.status(), 200);

    let list: Value = app
        .get_auth("/api/orders?status=confirmed", ADMIN_TOKEN)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(list["total"], 1);

    let bad_filter = app.get_auth("/api/orders?status=lost", ADMIN_TOKEN).await;
    assert_eq!(bad_filter.status(), 400);

    let stats: Value = app
        .get_auth("/api/orders/stats", ADMIN_TOKEN)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_orders"], 1);
    assert_eq!(stats["confirmed"], 1);
    assert_eq!(stats["paid_revenue"], 3 * CARD_PRICE);
    assert_eq!(stats["orders_today"], 1);

    let res = app
        .client
        .delete(app.url(&format!("/api/orders/{id}")))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);

    let gone = app.get_auth(&format!("/api/orders/{id}"), ADMIN_TOKEN).await;
    assert_eq!(gone.status(), 404);
}

#[tokio::test]
async fn admin_requires_token() {
    let app = spawn_app(None).await;

    assert_eq!(app.get_auth("/api/admin/users", "wrong").await.status(), 401);

    let (_, user_token) = app.register("layla", "secret1").await;
    assert_eq!(app.get_auth("/api/admin/users", &user_token).await.status(), 401);

    let users: Value = app
        .get_auth("/api/admin/users?search=lay", ADMIN_TOKEN)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(users["total"], 1);
    assert_eq!(users["items"][0]["username"], "layla");
}

#[tokio::test]
async fn admin_deletes_user() {
    let app = spawn_app(None).await;
    let (user, token) = app.register("omar", "secret1").await;
    let id = user["id"].as_str().unwrap();

    let res = app
        .client
        .delete(app.url(&format!("/api/admin/users/{id}")))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);

    assert_eq!(app.get_auth("/api/me", &token).await.status(), 401);
}

#[tokio::test]
async fn batch_report_and_archive() {
    let app = spawn_app(None).await;

    let too_many = app
        .send_json(
            Method::POST,
            "/api/admin/batch",
            Some(ADMIN_TOKEN),
            json!({ "count": 101 }),
        )
        .await;
    assert_eq!(too_many.status(), 400);

    let res = app
        .send_json(
            Method::POST,
            "/api/admin/batch",
            Some(ADMIN_TOKEN),
            json!({ "count": 2, "prefix": "Expo" }),
        )
        .await;
    assert_eq!(res.status(), 200);
    let report: Value = res.json().await.unwrap();
    assert_eq!(report["created"], 2);

    let account = &report["items"][0];
    assert_eq!(account["status"], "created");
    let username = account["username"].as_str().unwrap();
    assert!(username.starts_with("expo"));

    let login = app
        .send_json(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "username": username, "password": account["password"] }),
        )
        .await;
    assert_eq!(login.status(), 200);
    let body: Value = login.json().await.unwrap();
    assert_eq!(body["user"]["is_batch_generated"], true);

    let res = app
        .send_json(
            Method::POST,
            "/api/admin/batch",
            Some(ADMIN_TOKEN),
            json!({ "count": 1, "archive": true }),
        )
        .await;
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "application/zip");

    let bytes = res.bytes().await.unwrap();
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();

    let mut csv = String::new();
    zip.by_name("accounts.csv").unwrap().read_to_string(&mut csv).unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert!(zip.by_name("README.txt").is_ok());
    assert_eq!(
        (0..zip.len())
            .filter(|i| zip.by_index(*i).unwrap().name().starts_with("qr/"))
            .count(),
        1
    );
}

#[tokio::test]
async fn huge_offset_returns_empty_page() {
    let app = spawn_app(None).await;
    app.send_json(Method::POST, "/api/orders", None, order_body(1)).await;
    app.register("yusuf", "secret1").await;

    for path in [
        "/api/orders?offset=9223372036854775807",
        "/api/admin/users?offset=9223372036854775807&limit=200",
    ] {
        let res = app.get_auth(path, ADMIN_TOKEN).await;
        assert_eq!(res.status(), 200);

        let page: Value = res.json().await.unwrap();
        assert_eq!(page["total"], 1);
        assert!(page["items"].as_array().unwrap().is_empty());
    }
}

#[tokio::test]
async fn malformed_bodies_get_json_400() {
    let app = spawn_app(None).await;

    let mut no_address = order_body(1);
    no_address.as_object_mut().unwrap().remove("address");

    let (_, token) = app.register("hiba", "secret1").await;

    let cases = [
        app.send_json(Method::POST, "/api/orders", None, no_address).await,
        app.send_json(
            Method::POST,
            "/api/auth/register",
            None,
            json!({ "username": "noura" }),
        )
        .await,
        app.send_json(
            Method::POST,
            "/api/me/links",
            Some(&token),
            json!({ "link_type": "fax", "title": "Fax", "url": "123456" }),
        )
        .await,
        app.client
            .post(app.url("/api/auth/login"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap(),
    ];

    for res in cases {
        assert_eq!(res.status(), 400);
        assert_eq!(res.headers()["content-type"], "application/json");
        let body: Value = res.json().await.unwrap();
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn clicks_on_hidden_links_or_inactive_owners_are_404() {
    let app = spawn_app(None).await;
    let (user, token) = app.register("rana", "secret1").await;

    let mut ids = Vec::new();
    for title in ["Hidden", "Visible"] {
        let link: Value = app
            .send_json(
                Method::POST,
                "/api/me/links",
                Some(&token),
                json!({ "link_type": "website", "title": title, "url": "https://rana.iq" }),
            )
            .await
            .json()
            .await
            .unwrap();
        ids.push(link["id"].as_str().unwrap().to_string());
    }

    app.send_json(
        Method::PUT,
        &format!("/api/me/links/{}", ids[0]),
        Some(&token),
        json!({ "is_active": false }),
    )
    .await;

    let click = |id: &str| app.client.post(app.url(&format!("/api/links/{id}/click"))).send();

    assert_eq!(click(&ids[0]).await.unwrap().status(), 404);
    assert_eq!(click(&ids[1]).await.unwrap().status(), 200);

    let id = user["id"].as_str().unwrap();
    app.send_json(
        Method::PATCH,
        &format!("/api/admin/users/{id}"),
        Some(ADMIN_TOKEN),
        json!({ "is_active": false }),
    )
    .await;

    assert_eq!(click(&ids[1]).await.unwrap().status(), 404);
    assert_eq!(app.store.click_log_len().await, 1);
}

#[tokio::test]
async fn reorder_rejects_foreign_links() {
    let app = spawn_app(None).await;
    let (_, mine) = app.register("salma", "secret1").await;
    let (_, theirs) = app.register("tariq", "secret1").await;

    let mut link_ids = Vec::new();
    for token in [&mine, &theirs] {
        let link: Value = app
            .send_json(
                Method::POST,
                "/api/me/links",
                Some(token),
                json!({ "link_type": "website", "title": "Site", "url": "https://example.iq" }),
            )
            .await
            .json()
            .await
            .unwrap();
        link_ids.push(link["id"].as_str().unwrap().to_string());
    }

    let res = app
        .send_json(
            Method::PUT,
            "/api/me/links/order",
            Some(&mine),
            json!({ "ids": [link_ids[1]] }),
        )
        .await;
    assert_eq!(res.status(), 400);

    let res = app
        .send_json(
            Method::PUT,
            "/api/me/links/order",
            Some(&mine),
            json!({ "ids": [link_ids[0], link_ids[1]] }),
        )
        .await;
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn retyping_a_link_revalidates_its_url() {
    let app = spawn_app(None).await;
    let (_, token) = app.register("dina", "secret1").await;

    let create = |link_type: &str, url: &str| {
        app.send_json(
            Method::POST,
            "/api/me/links",
            Some(token.as_str()),
            json!({ "link_type": link_type, "title": "Link", "url": url }),
        )
    };

    let website: Value = create("website", "https://dina.iq").await.json().await.unwrap();
    let res = app
        .send_json(
            Method::PUT,
            &format!("/api/me/links/{}", website["id"].as_str().unwrap()),
            Some(&token),
            json!({ "link_type": "phone" }),
        )
        .await;
    assert_eq!(res.status(), 400);

    let phone: Value = create("phone", "07701234567").await.json().await.unwrap();
    let res = app
        .send_json(
            Method::PUT,
            &format!("/api/me/links/{}", phone["id"].as_str().unwrap()),
            Some(&token),
            json!({ "link_type": "whatsapp" }),
        )
        .await;
    assert_eq!(res.status(), 200);

    let link: Value = res.json().await.unwrap();
    assert_eq!(link["link_type"], "whatsapp");
    assert_eq!(link["url"], "https://wa.me/9647701234567");
}
