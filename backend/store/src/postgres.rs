//! # Postgres
//!
//! `tokio-postgres` backend. One shared [`Client`]; the driver pipelines
//! concurrent queries over its connection, so handlers never wait on a pool.
//!
//! Every write is a single statement. Log inserts and counter bumps are folded
//! into one statement with data-modifying CTEs.
use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio_postgres::{Client, NoTls, Row, error::SqlState};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    Store, StoreError, StoreResult, check_quantity,
    models::{
        DailyVisits, LinkClick, LinkClicks, LinkUpdate, NewLink, NewOrder, NewUser, Order,
        OrderQuery, OrderStats, OrderUpdate, Page, PageVisit, ProfileUpdate, User, UserFlags,
        UserLink, UserQuery, UserStats, DEFAULT_BACKGROUND_COLOR, DEFAULT_BUTTON_COLOR,
        DEFAULT_TEXT_COLOR,
    },
};

const SCHEMA: &str = include_str!("schema.sql");

const USER_COLUMNS: &str = "id, username, password_hash, full_name, job_title, company, bio, \
     profile_image_url, background_color, text_color, button_color, total_visits, total_clicks, \
     is_active, is_premium, is_batch_generated, created_at, updated_at";

const LINK_COLUMNS: &str =
    "id, user_id, link_type, platform, title, url, sort_order, click_count, is_active, created_at";

const ORDER_COLUMNS: &str = "id, customer_name, phone, email, city, address, card_design, \
     quantity, unit_price, total, status, payment_status, notes, created_at, updated_at";

pub struct PgStore {
    client: Arc<Client>,
}

impl PgStore {
    /// Connects and applies the schema.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Database connection error: {e}");
            }
        });

        client.batch_execute(SCHEMA).await?;
        info!("Database schema ready");

        Ok(Self {
            client: Arc::new(client),
        })
    }

    async fn one_user(&self, sql: &str, params: &[&(dyn tokio_postgres::types::ToSql + Sync)]) -> StoreResult<User> {
        let row = self
            .client
            .query_opt(sql, params)
            .await?
            .ok_or(StoreError::NotFound)?;

        user_from_row(&row)
    }
}

fn parse<T>(row: &Row, column: &str) -> StoreResult<T>
where
    T: FromStr<Err = String>,
{
    row.try_get::<_, String>(column)?
        .parse()
        .map_err(StoreError::Invalid)
}

fn user_from_row(row: &Row) -> StoreResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        full_name: row.try_get("full_name")?,
        job_title: row.try_get("job_title")?,
        company: row.try_get("company")?,
        bio: row.try_get("bio")?,
        profile_image_url: row.try_get("profile_image_url")?,
        background_color: row.try_get("background_color")?,
        text_color: row.try_get("text_color")?,
        button_color: row.try_get("button_color")?,
        total_visits: row.try_get("total_visits")?,
        total_clicks: row.try_get("total_clicks")?,
        is_active: row.try_get("is_active")?,
        is_premium: row.try_get("is_premium")?,
        is_batch_generated: row.try_get("is_batch_generated")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn link_from_row(row: &Row) -> StoreResult<UserLink> {
    Ok(UserLink {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        link_type: parse(row, "link_type")?,
        platform: row.try_get("platform")?,
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        sort_order: row.try_get("sort_order")?,
        click_count: row.try_get("click_count")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn order_from_row(row: &Row) -> StoreResult<Order> {
    Ok(Order {
        id: row.try_get("id")?,
        customer_name: row.try_get("customer_name")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        city: row.try_get("city")?,
        address: row.try_get("address")?,
        card_design: row.try_get("card_design")?,
        quantity: row.try_get("quantity")?,
        unit_price: row.try_get("unit_price")?,
        total: row.try_get("total")?,
        status: parse(row, "status")?,
        payment_status: parse(row, "payment_status")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn rows_into<T>(rows: Vec<Row>, map: fn(&Row) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows.iter().map(map).collect()
}

fn like_pattern(search: &str) -> String {
    let escaped = search
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");

    format!("%{escaped}%")
}

/// `None` keeps the column, blank clears it to NULL.
fn optional_column(column: &str, param: usize) -> String {
    format!("{column} = CASE WHEN ${param}::text IS NULL THEN {column} ELSE NULLIF(TRIM(${param}), '') END")
}

/// `None` keeps the column, blank resets it to the default colour.
fn color_column(column: &str, param: usize, default: &str) -> String {
    format!(
        "{column} = CASE WHEN ${param}::text IS NULL THEN {column} ELSE COALESCE(NULLIF(TRIM(${param}), ''), '{default}') END"
    )
}

#[async_trait]
impl Store for PgStore {
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.client.execute("SELECT 1", &[]).await?;
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users (id, username, password_hash, full_name, is_batch_generated) \
             VALUES ($1, $2, $3, NULLIF(TRIM($4), ''), $5) RETURNING {USER_COLUMNS}"
        );

        let result = self
            .client
            .query_one(
                &sql,
                &[
                    &Uuid::new_v4(),
                    &user.username,
                    &user.password_hash,
                    &user.full_name,
                    &user.is_batch_generated,
                ],
            )
            .await;

        match result {
            Ok(row) => user_from_row(&row),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => Err(StoreError::Conflict(
                format!("username {} is taken", user.username),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn user_by_id(&self, id: Uuid) -> StoreResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        self.one_user(&sql, &[&id]).await
    }

    async fn user_by_username(&self, username: &str) -> StoreResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        self.one_user(&sql, &[&username]).await
    }

    async fn username_exists(&self, username: &str) -> StoreResult<bool> {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)",
                &[&username],
            )
            .await?;

        Ok(row.try_get(0)?)
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> StoreResult<User> {
        let sql = format!(
            "UPDATE users SET {}, {}, {}, {}, {}, {}, {}, {}, updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}",
            optional_column("full_name", 2),
            optional_column("job_title", 3),
            optional_column("company", 4),
            optional_column("bio", 5),
            optional_column("profile_image_url", 6),
            color_column("background_color", 7, DEFAULT_BACKGROUND_COLOR),
            color_column("text_color", 8, DEFAULT_TEXT_COLOR),
            color_column("button_color", 9, DEFAULT_BUTTON_COLOR),
        );

        self.one_user(
            &sql,
            &[
                &id,
                &update.full_name,
                &update.job_title,
                &update.company,
                &update.bio,
                &update.profile_image_url,
                &update.background_color,
                &update.text_color,
                &update.button_color,
            ],
        )
        .await
    }

    async fn set_user_flags(&self, id: Uuid, flags: UserFlags) -> StoreResult<User> {
        let sql = format!(
            "UPDATE users SET is_active = COALESCE($2, is_active), \
             is_premium = COALESCE($3, is_premium), updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );

        self.one_user(&sql, &[&id, &flags.is_active, &flags.is_premium])
            .await
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        match self
            .client
            .execute("DELETE FROM users WHERE id = $1", &[&id])
            .await?
        {
            0 => Err(StoreError::NotFound),
            _ => Ok(()),
        }
    }

    async fn list_users(&self, query: UserQuery) -> StoreResult<Page<User>> {
        let pattern = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);
        let filter = "($1::text IS NULL OR username ILIKE $1 OR full_name ILIKE $1)";

        let total: i64 = self
            .client
            .query_one(
                &format!("SELECT COUNT(*) FROM users WHERE {filter}"),
                &[&pattern],
            )
            .await?
            .try_get(0)?;

        let rows = self
            .client
            .query(
                &format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE {filter} \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3"
                ),
                &[&pattern, &query.limit, &query.offset],
            )
            .await?;

        Ok(Page {
            items: rows_into(rows, user_from_row)?,
            total,
        })
    }

    async fn links_for_user(&self, user_id: Uuid, active_only: bool) -> StoreResult<Vec<UserLink>> {
        let rows = self
            .client
            .query(
                &format!(
                    "SELECT {LINK_COLUMNS} FROM user_links \
                     WHERE user_id = $1 AND (NOT $2 OR is_active) \
                     ORDER BY sort_order, created_at"
                ),
                &[&user_id, &active_only],
            )
            .await?;

        rows_into(rows, link_from_row)
    }

    async fn link_by_id(&self, link_id: Uuid) -> StoreResult<UserLink> {
        let row = self
            .client
            .query_opt(
                &format!("SELECT {LINK_COLUMNS} FROM user_links WHERE id = $1"),
                &[&link_id],
            )
            .await?
            .ok_or(StoreError::NotFound)?;

        link_from_row(&row)
    }

    async fn create_link(&self, user_id: Uuid, link: NewLink) -> StoreResult<UserLink> {
        let sql = format!(
            "INSERT INTO user_links (id, user_id, link_type, platform, title, url, sort_order) \
             SELECT $1, u.id, $3, NULLIF(TRIM($4), ''), $5, $6, \
                    COALESCE((SELECT MAX(sort_order) + 1 FROM user_links WHERE user_id = u.id), 0) \
             FROM users u WHERE u.id = $2 \
             RETURNING {LINK_COLUMNS}"
        );

        let row = self
            .client
            .query_opt(
                &sql,
                &[
                    &Uuid::new_v4(),
                    &user_id,
                    &link.link_type.to_string(),
                    &link.platform,
                    &link.title,
                    &link.url,
                ],
            )
            .await?
            .ok_or(StoreError::NotFound)?;

        link_from_row(&row)
    }

    async fn update_link(&self, user_id: Uuid, link_id: Uuid, update: LinkUpdate) -> StoreResult<UserLink> {
        let sql = format!(
            "UPDATE user_links SET link_type = COALESCE($3, link_type), {}, \
             title = COALESCE($5, title), url = COALESCE($6, url), \
             is_active = COALESCE($7, is_active) \
             WHERE id = $1 AND user_id = $2 RETURNING {LINK_COLUMNS}",
            optional_column("platform", 4),
        );

        let row = self
            .client
            .query_opt(
                &sql,
                &[
                    &link_id,
                    &user_id,
                    &update.link_type.map(|t| t.to_string()),
                    &update.platform,
                    &update.title,
                    &update.url,
                    &update.is_active,
                ],
            )
            .await?
            .ok_or(StoreError::NotFound)?;

        link_from_row(&row)
    }

    async fn delete_link(&self, user_id: Uuid, link_id: Uuid) -> StoreResult<()> {
        match self
            .client
            .execute(
                "DELETE FROM user_links WHERE id = $1 AND user_id = $2",
                &[&link_id, &user_id],
            )
            .await?
        {
            0 => Err(StoreError::NotFound),
            _ => Ok(()),
        }
    }

    async fn reorder_links(&self, user_id: Uuid, ids: &[Uuid]) -> StoreResult<Vec<UserLink>> {
        let existing: Vec<Uuid> = self
            .links_for_user(user_id, false)
            .await?
            .into_iter()
            .map(|l| l.id)
            .collect();
        crate::check_reorder(&existing, ids)?;

        self.client
            .execute(
                "UPDATE user_links AS l SET sort_order = (o.ord - 1)::int \
                 FROM unnest($2::uuid[]) WITH ORDINALITY AS o(id, ord) \
                 WHERE l.id = o.id AND l.user_id = $1",
                &[&user_id, &ids],
            )
            .await?;

        self.links_for_user(user_id, false).await
    }

    async fn record_visit(&self, visit: PageVisit) -> StoreResult<()> {
        let updated = self
            .client
            .execute(
                "WITH logged AS ( \
                     INSERT INTO page_visits (user_id, ip_address, user_agent, referrer) \
                     SELECT id, $2, $3, $4 FROM users WHERE id = $1 \
                     RETURNING user_id \
                 ) \
                 UPDATE users SET total_visits = total_visits + 1 \
                 WHERE id IN (SELECT user_id FROM logged)",
                &[
                    &visit.user_id,
                    &visit.ip_address,
                    &visit.user_agent,
                    &visit.referrer,
                ],
            )
            .await?;

        match updated {
            0 => Err(StoreError::NotFound),
            _ => Ok(()),
        }
    }

    async fn record_click(&self, click: LinkClick) -> StoreResult<()> {
        let updated = self
            .client
            .execute(
                "WITH logged AS ( \
                     INSERT INTO link_clicks (link_id, user_id, ip_address, user_agent) \
                     SELECT id, user_id, $3, $4 FROM user_links WHERE id = $1 AND user_id = $2 \
                     RETURNING link_id, user_id \
                 ), bumped AS ( \
                     UPDATE user_links SET click_count = click_count + 1 \
                     WHERE id IN (SELECT link_id FROM logged) \
                     RETURNING user_id \
                 ) \
                 UPDATE users SET total_clicks = total_clicks + 1 \
                 WHERE id IN (SELECT user_id FROM bumped)",
                &[
                    &click.link_id,
                    &click.user_id,
                    &click.ip_address,
                    &click.user_agent,
                ],
            )
            .await?;

        match updated {
            0 => Err(StoreError::NotFound),
            _ => Ok(()),
        }
    }

    async fn user_stats(&self, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<UserStats> {
        let user = self.user_by_id(user_id).await?;

        let links = self
            .links_for_user(user_id, false)
            .await?
            .into_iter()
            .map(|l| LinkClicks {
                link_id: l.id,
                title: l.title,
                click_count: l.click_count,
            })
            .collect();

        let rows = self
            .client
            .query(
                "SELECT (visited_at AT TIME ZONE 'UTC')::date AS day, COUNT(*) AS visits \
                 FROM page_visits WHERE user_id = $1 AND visited_at >= $2 \
                 GROUP BY 1 ORDER BY 1",
                &[&user_id, &since],
            )
            .await?;

        let daily_visits = rows
            .iter()
            .map(|row| {
                Ok(DailyVisits {
                    day: row.try_get::<_, NaiveDate>("day")?,
                    visits: row.try_get("visits")?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(UserStats {
            total_visits: user.total_visits,
            total_clicks: user.total_clicks,
            links,
            daily_visits,
        })
    }

    async fn create_order(&self, order: NewOrder) -> StoreResult<Order> {
        check_quantity(order.quantity)?;

        let sql = format!(
            "INSERT INTO orders (id, customer_name, phone, email, city, address, card_design, \
                                 quantity, unit_price, total, notes) \
             VALUES ($1, $2, $3, NULLIF(TRIM($4), ''), $5, $6, NULLIF(TRIM($7), ''), $8, $9, $10, NULLIF(TRIM($11), '')) \
             RETURNING {ORDER_COLUMNS}"
        );

        let row = self
            .client
            .query_one(
                &sql,
                &[
                    &Uuid::new_v4(),
                    &order.customer_name,
                    &order.phone,
                    &order.email,
                    &order.city,
                    &order.address,
                    &order.card_design,
                    &order.quantity,
                    &order.unit_price,
                    &order.total(),
                    &order.notes,
                ],
            )
            .await?;

        order_from_row(&row)
    }

    async fn order_by_id(&self, id: Uuid) -> StoreResult<Order> {
        let row = self
            .client
            .query_opt(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"),
                &[&id],
            )
            .await?
            .ok_or(StoreError::NotFound)?;

        order_from_row(&row)
    }

    async fn list_orders(&self, query: OrderQuery) -> StoreResult<Page<Order>> {
        let status = query.status.map(|s| s.to_string());
        let filter = "($1::text IS NULL OR status = $1)";

        let total: i64 = self
            .client
            .query_one(
                &format!("SELECT COUNT(*) FROM orders WHERE {filter}"),
                &[&status],
            )
            .await?
            .try_get(0)?;

        let rows = self
            .client
            .query(
                &format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE {filter} \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3"
                ),
                &[&status, &query.limit, &query.offset],
            )
            .await?;

        Ok(Page {
            items: rows_into(rows, order_from_row)?,
            total,
        })
    }

    async fn update_order(&self, id: Uuid, update: OrderUpdate) -> StoreResult<Order> {
        let sql = format!(
            "UPDATE orders SET status = COALESCE($2, status), \
             payment_status = COALESCE($3, payment_status), {}, updated_at = NOW() \
             WHERE id = $1 RETURNING {ORDER_COLUMNS}",
            optional_column("notes", 4),
        );

        let row = self
            .client
            .query_opt(
                &sql,
                &[
                    &id,
                    &update.status.map(|s| s.to_string()),
                    &update.payment_status.map(|s| s.to_string()),
                    &update.notes,
                ],
            )
            .await?
            .ok_or(StoreError::NotFound)?;

        order_from_row(&row)
    }

    async fn delete_order(&self, id: Uuid) -> StoreResult<()> {
        match self
            .client
            .execute("DELETE FROM orders WHERE id = $1", &[&id])
            .await?
        {
            0 => Err(StoreError::NotFound),
            _ => Ok(()),
        }
    }

    async fn order_stats(&self, today_start: DateTime<Utc>) -> StoreResult<OrderStats> {
        let row = self
            .client
            .query_one(
                "SELECT COUNT(*) AS total_orders, \
                        COUNT(*) FILTER (WHERE status = 'pending') AS pending, \
                        COUNT(*) FILTER (WHERE status = 'confirmed') AS confirmed, \
                        COUNT(*) FILTER (WHERE status = 'shipped') AS shipped, \
                        COUNT(*) FILTER (WHERE status = 'delivered') AS delivered, \
                        COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled, \
                        COALESCE(SUM(total) FILTER (WHERE status <> 'cancelled'), 0)::bigint AS revenue, \
                        COALESCE(SUM(total) FILTER (WHERE status <> 'cancelled' AND payment_status = 'paid'), 0)::bigint AS paid_revenue, \
                        COUNT(*) FILTER (WHERE created_at >= $1) AS orders_today \
                 FROM orders",
                &[&today_start],
            )
            .await?;

        Ok(OrderStats {
            total_orders: row.try_get("total_orders")?,
            pending: row.try_get("pending")?,
            confirmed: row.try_get("confirmed")?,
            shipped: row.try_get("shipped")?,
            delivered: row.try_get("delivered")?,
            cancelled: row.try_get("cancelled")?,
            revenue: row.try_get("revenue")?,
            paid_revenue: row.try_get("paid_revenue")?,
            orders_today: row.try_get("orders_today")?,
        })
    }
}
