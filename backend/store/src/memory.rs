use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    Store, StoreError, StoreResult, check_quantity, check_reorder,
    models::{
        DailyVisits, LinkClick, LinkClicks, LinkUpdate, NewLink, NewOrder, NewUser, Order,
        OrderQuery, OrderStats, OrderUpdate, Page, PageVisit, PaymentStatus, ProfileUpdate, User,
        UserFlags, UserLink, UserQuery, UserStats, DEFAULT_BACKGROUND_COLOR, DEFAULT_BUTTON_COLOR,
        DEFAULT_TEXT_COLOR, OrderStatus, non_empty,
    },
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    links: HashMap<Uuid, UserLink>,
    orders: HashMap<Uuid, Order>,
    visits: Vec<(Uuid, DateTime<Utc>)>,
    clicks: Vec<(Uuid, DateTime<Utc>)>,
}

/// In-process store with the same semantics as [`crate::PgStore`].
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn visit_log_len(&self) -> usize {
        self.tables.lock().await.visits.len()
    }

    pub async fn click_log_len(&self) -> usize {
        self.tables.lock().await.clicks.len()
    }
}

fn page<T: Clone>(mut items: Vec<T>, limit: i64, offset: i64) -> Page<T> {
    let total = items.len() as i64;
    let start = offset.clamp(0, total) as usize;
    let end = offset.saturating_add(limit).clamp(0, total) as usize;

    Page {
        items: items.drain(start..end.max(start)).collect(),
        total,
    }
}

fn apply(target: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *target = non_empty(value);
    }
}

fn apply_color(target: &mut String, value: Option<String>, default: &str) {
    if let Some(color) = value {
        *target = non_empty(Some(color)).unwrap_or_else(|| default.to_string());
    }
}

fn sorted_links(tables: &Tables, user_id: Uuid, active_only: bool) -> Vec<UserLink> {
    let mut links: Vec<UserLink> = tables
        .links
        .values()
        .filter(|link| link.user_id == user_id && (!active_only || link.is_active))
        .cloned()
        .collect();
    links.sort_by_key(|link| (link.sort_order, link.created_at));
    links
}

#[async_trait]
impl Store for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.lock().await;

        if tables.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(format!(
                "username {} is taken",
                user.username
            )));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            password_hash: user.password_hash,
            full_name: non_empty(user.full_name),
            job_title: None,
            company: None,
            bio: None,
            profile_image_url: None,
            background_color: DEFAULT_BACKGROUND_COLOR.to_string(),
            text_color: DEFAULT_TEXT_COLOR.to_string(),
            button_color: DEFAULT_BUTTON_COLOR.to_string(),
            total_visits: 0,
            total_clicks: 0,
            is_active: true,
            is_premium: false,
            is_batch_generated: user.is_batch_generated,
            created_at: now,
            updated_at: now,
        };

        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn user_by_id(&self, id: Uuid) -> StoreResult<User> {
        self.tables
            .lock()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn user_by_username(&self, username: &str) -> StoreResult<User> {
        self.tables
            .lock()
            .await
            .users
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn username_exists(&self, username: &str) -> StoreResult<bool> {
        Ok(self
            .tables
            .lock()
            .await
            .users
            .values()
            .any(|u| u.username == username))
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> StoreResult<User> {
        let mut tables = self.tables.lock().await;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;

        apply(&mut user.full_name, update.full_name);
        apply(&mut user.job_title, update.job_title);
        apply(&mut user.company, update.company);
        apply(&mut user.bio, update.bio);
        apply(&mut user.profile_image_url, update.profile_image_url);
        apply_color(&mut user.background_color, update.background_color, DEFAULT_BACKGROUND_COLOR);
        apply_color(&mut user.text_color, update.text_color, DEFAULT_TEXT_COLOR);
        apply_color(&mut user.button_color, update.button_color, DEFAULT_BUTTON_COLOR);
        user.updated_at = Utc::now();

        Ok(user.clone())
    }

    async fn set_user_flags(&self, id: Uuid, flags: UserFlags) -> StoreResult<User> {
        let mut tables = self.tables.lock().await;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;

        if let Some(active) = flags.is_active {
            user.is_active = active;
        }
        if let Some(premium) = flags.is_premium {
            user.is_premium = premium;
        }
        user.updated_at = Utc::now();

        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        tables.users.remove(&id).ok_or(StoreError::NotFound)?;

        let removed: Vec<Uuid> = tables
            .links
            .values()
            .filter(|link| link.user_id == id)
            .map(|link| link.id)
            .collect();
        for link_id in &removed {
            tables.links.remove(link_id);
        }

        tables.visits.retain(|(user_id, _)| *user_id != id);
        tables.clicks.retain(|(link_id, _)| !removed.contains(link_id));

        Ok(())
    }

    async fn list_users(&self, query: UserQuery) -> StoreResult<Page<User>> {
        let tables = self.tables.lock().await;
        let needle = non_empty(query.search).map(|s| s.to_lowercase());

        let mut users: Vec<User> = tables
            .users
            .values()
            .filter(|u| match &needle {
                Some(needle) => {
                    u.username.contains(needle.as_str())
                        || u.full_name
                            .as_deref()
                            .is_some_and(|name| name.to_lowercase().contains(needle.as_str()))
                }
                None => true,
            })
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(page(users, query.limit, query.offset))
    }

    async fn links_for_user(&self, user_id: Uuid, active_only: bool) -> StoreResult<Vec<UserLink>> {
        Ok(sorted_links(&*self.tables.lock().await, user_id, active_only))
    }

    async fn link_by_id(&self, link_id: Uuid) -> StoreResult<UserLink> {
        self.tables
            .lock()
            .await
            .links
            .get(&link_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_link(&self, user_id: Uuid, link: NewLink) -> StoreResult<UserLink> {
        let mut tables = self.tables.lock().await;

        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }

        let next = tables
            .links
            .values()
            .filter(|l| l.user_id == user_id)
            .map(|l| l.sort_order + 1)
            .max()
            .unwrap_or(0);

        let created = UserLink {
            id: Uuid::new_v4(),
            user_id,
            link_type: link.link_type,
            platform: non_empty(link.platform),
            title: link.title,
            url: link.url,
            sort_order: next,
            click_count: 0,
            is_active: true,
            created_at: Utc::now(),
        };

        tables.links.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_link(&self, user_id: Uuid, link_id: Uuid, update: LinkUpdate) -> StoreResult<UserLink> {
        let mut tables = self.tables.lock().await;
        let link = tables
            .links
            .get_mut(&link_id)
            .filter(|l| l.user_id == user_id)
            .ok_or(StoreError::NotFound)?;

        if let Some(link_type) = update.link_type {
            link.link_type = link_type;
        }
        apply(&mut link.platform, update.platform);
        if let Some(title) = update.title {
            link.title = title;
        }
        if let Some(url) = update.url {
            link.url = url;
        }
        if let Some(active) = update.is_active {
            link.is_active = active;
        }

        Ok(link.clone())
    }

    async fn delete_link(&self, user_id: Uuid, link_id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;

        match tables.links.get(&link_id) {
            Some(link) if link.user_id == user_id => {
                tables.links.remove(&link_id);
                tables.clicks.retain(|(id, _)| *id != link_id);
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn reorder_links(&self, user_id: Uuid, ids: &[Uuid]) -> StoreResult<Vec<UserLink>> {
        let mut tables = self.tables.lock().await;

        let existing: Vec<Uuid> = sorted_links(&tables, user_id, false)
            .iter()
            .map(|l| l.id)
            .collect();
        check_reorder(&existing, ids)?;

        for (index, id) in ids.iter().enumerate() {
            if let Some(link) = tables.links.get_mut(id) {
                link.sort_order = index as i32;
            }
        }

        Ok(sorted_links(&tables, user_id, false))
    }

    async fn record_visit(&self, visit: PageVisit) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .get_mut(&visit.user_id)
            .ok_or(StoreError::NotFound)?;

        user.total_visits += 1;
        tables.visits.push((visit.user_id, Utc::now()));

        Ok(())
    }

    async fn record_click(&self, click: LinkClick) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;

        let link = tables
            .links
            .get_mut(&click.link_id)
            .filter(|l| l.user_id == click.user_id)
            .ok_or(StoreError::NotFound)?;
        link.click_count += 1;

        if let Some(user) = tables.users.get_mut(&click.user_id) {
            user.total_clicks += 1;
        }
        tables.clicks.push((click.link_id, Utc::now()));

        Ok(())
    }

    async fn user_stats(&self, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<UserStats> {
        let tables = self.tables.lock().await;
        let user = tables.users.get(&user_id).ok_or(StoreError::NotFound)?;

        let links = sorted_links(&tables, user_id, false)
            .into_iter()
            .map(|l| LinkClicks {
                link_id: l.id,
                title: l.title,
                click_count: l.click_count,
            })
            .collect();

        let mut per_day: HashMap<chrono::NaiveDate, i64> = HashMap::new();
        for (_, at) in tables
            .visits
            .iter()
            .filter(|(id, at)| *id == user_id && *at >= since)
        {
            *per_day.entry(at.date_naive()).or_default() += 1;
        }

        let mut daily_visits: Vec<DailyVisits> = per_day
            .into_iter()
            .map(|(day, visits)| DailyVisits { day, visits })
            .collect();
        daily_visits.sort_by_key(|d| d.day);

        Ok(UserStats {
            total_visits: user.total_visits,
            total_clicks: user.total_clicks,
            links,
            daily_visits,
        })
    }

    async fn create_order(&self, order: NewOrder) -> StoreResult<Order> {
        check_quantity(order.quantity)?;

        let now = Utc::now();
        let total = order.total();
        let created = Order {
            id: Uuid::new_v4(),
            customer_name: order.customer_name,
            phone: order.phone,
            email: non_empty(order.email),
            city: order.city,
            address: order.address,
            card_design: non_empty(order.card_design),
            quantity: order.quantity,
            unit_price: order.unit_price,
            total,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            notes: non_empty(order.notes),
            created_at: now,
            updated_at: now,
        };

        self.tables
            .lock()
            .await
            .orders
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn order_by_id(&self, id: Uuid) -> StoreResult<Order> {
        self.tables
            .lock()
            .await
            .orders
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_orders(&self, query: OrderQuery) -> StoreResult<Page<Order>> {
        let tables = self.tables.lock().await;

        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| query.status.is_none_or(|status| o.status == status))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(page(orders, query.limit, query.offset))
    }

    async fn update_order(&self, id: Uuid, update: OrderUpdate) -> StoreResult<Order> {
        let mut tables = self.tables.lock().await;
        let order = tables.orders.get_mut(&id).ok_or(StoreError::NotFound)?;

        if let Some(status) = update.status {
            order.status = status;
        }
        if let Some(payment) = update.payment_status {
            order.payment_status = payment;
        }
        apply(&mut order.notes, update.notes);
        order.updated_at = Utc::now();

        Ok(order.clone())
    }

    async fn delete_order(&self, id: Uuid) -> StoreResult<()> {
        self.tables
            .lock()
            .await
            .orders
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn order_stats(&self, today_start: DateTime<Utc>) -> StoreResult<OrderStats> {
        let tables = self.tables.lock().await;
        let mut stats = OrderStats::default();

        for order in tables.orders.values() {
            stats.add(order, today_start);
        }

        Ok(stats)
    }
}
