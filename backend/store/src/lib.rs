//! # Store
//!
//! Data-access layer for profiles, links, orders and the visit/click logs.
//!
//! ## Tables
//!
//! - `users`: account identity, profile fields, theme colours, counters and flags
//! - `user_links`: one row per contact/social link, ordered by `sort_order`
//! - `orders`: physical NFC card purchase requests
//! - `page_visits` / `link_clicks`: append-only analytics logs
//!
//! ## Consistency
//!
//! Nothing here spans entities. Counters (`total_visits`, `total_clicks`,
//! `click_count`) are bumped by single `UPDATE ... SET x = x + 1` statements, so
//! row-level atomicity in Postgres is all we rely on.
//!
//! ## Backends
//!
//! - [`PgStore`]: `tokio-postgres`, schema applied on connect
//! - [`MemoryStore`]: same semantics behind a mutex, for tests and local runs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod error;
pub mod memory;
pub mod models;
pub mod password;
pub mod postgres;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use models::*;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn ping(&self) -> StoreResult<()>;

    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    async fn user_by_id(&self, id: Uuid) -> StoreResult<User>;

    async fn user_by_username(&self, username: &str) -> StoreResult<User>;

    async fn username_exists(&self, username: &str) -> StoreResult<bool>;

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> StoreResult<User>;

    async fn set_user_flags(&self, id: Uuid, flags: UserFlags) -> StoreResult<User>;

    /// Removes the user together with their links and analytics rows.
    async fn delete_user(&self, id: Uuid) -> StoreResult<()>;

    async fn list_users(&self, query: UserQuery) -> StoreResult<Page<User>>;

    async fn links_for_user(&self, user_id: Uuid, active_only: bool) -> StoreResult<Vec<UserLink>>;

    async fn link_by_id(&self, link_id: Uuid) -> StoreResult<UserLink>;

    /// Appends the link after the user's current last link.
    async fn create_link(&self, user_id: Uuid, link: NewLink) -> StoreResult<UserLink>;

    async fn update_link(&self, user_id: Uuid, link_id: Uuid, update: LinkUpdate) -> StoreResult<UserLink>;

    async fn delete_link(&self, user_id: Uuid, link_id: Uuid) -> StoreResult<()>;

    /// `ids` must be a permutation of the user's links; each link takes its index as `sort_order`.
    async fn reorder_links(&self, user_id: Uuid, ids: &[Uuid]) -> StoreResult<Vec<UserLink>>;

    async fn record_visit(&self, visit: PageVisit) -> StoreResult<()>;

    async fn record_click(&self, click: LinkClick) -> StoreResult<()>;

    async fn user_stats(&self, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<UserStats>;

    async fn create_order(&self, order: NewOrder) -> StoreResult<Order>;

    async fn order_by_id(&self, id: Uuid) -> StoreResult<Order>;

    async fn list_orders(&self, query: OrderQuery) -> StoreResult<Page<Order>>;

    async fn update_order(&self, id: Uuid, update: OrderUpdate) -> StoreResult<Order>;

    async fn delete_order(&self, id: Uuid) -> StoreResult<()>;

    async fn order_stats(&self, today_start: DateTime<Utc>) -> StoreResult<OrderStats>;
}

pub(crate) fn check_reorder(existing: &[Uuid], ids: &[Uuid]) -> StoreResult<()> {
    let mut wanted = ids.to_vec();
    wanted.sort();
    wanted.dedup();

    let mut current = existing.to_vec();
    current.sort();

    if wanted.len() != ids.len() || wanted != current {
        return Err(StoreError::Invalid(
            "link order must list every link exactly once".to_string(),
        ));
    }

    Ok(())
}

pub(crate) fn check_quantity(quantity: i32) -> StoreResult<()> {
    if quantity <= 0 {
        return Err(StoreError::Invalid("quantity must be positive".to_string()));
    }

    Ok(())
}
