use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_BACKGROUND_COLOR: &str = "#ffffff";
pub const DEFAULT_TEXT_COLOR: &str = "#111827";
pub const DEFAULT_BUTTON_COLOR: &str = "#2563eb";

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: Option<String>,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub bio: Option<String>,
    pub profile_image_url: Option<String>,
    pub background_color: String,
    pub text_color: String,
    pub button_color: String,
    pub total_visits: i64,
    pub total_clicks: i64,
    pub is_active: bool,
    pub is_premium: bool,
    pub is_batch_generated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub is_batch_generated: bool,
}

/// Partial profile edit. `None` leaves a field untouched, an empty string clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub bio: Option<String>,
    pub profile_image_url: Option<String>,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub button_color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFlags {
    pub is_active: Option<bool>,
    pub is_premium: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Phone,
    Email,
    Website,
    Social,
    Whatsapp,
    Custom,
}

impl FromStr for LinkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "phone" => Ok(LinkType::Phone),
            "email" => Ok(LinkType::Email),
            "website" => Ok(LinkType::Website),
            "social" => Ok(LinkType::Social),
            "whatsapp" => Ok(LinkType::Whatsapp),
            "custom" => Ok(LinkType::Custom),
            _ => Err(format!("Invalid LinkType variant: {s}")),
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkType::Phone => "phone",
            LinkType::Email => "email",
            LinkType::Website => "website",
            LinkType::Social => "social",
            LinkType::Whatsapp => "whatsapp",
            LinkType::Custom => "custom",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserLink {
    pub id: Uuid,
    pub user_id: Uuid,
    pub link_type: LinkType,
    pub platform: Option<String>,
    pub title: String,
    pub url: String,
    pub sort_order: i32,
    pub click_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLink {
    pub link_type: LinkType,
    pub platform: Option<String>,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkUpdate {
    pub link_type: Option<LinkType>,
    pub platform: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            _ => Err(format!("Invalid OrderStatus variant: {s}")),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            _ => Err(format!("Invalid PaymentStatus variant: {s}")),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub city: String,
    pub address: String,
    pub card_design: Option<String>,
    pub quantity: i32,
    pub unit_price: i64,
    pub total: i64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub city: String,
    pub address: String,
    pub card_design: Option<String>,
    pub quantity: i32,
    pub unit_price: i64,
    pub notes: Option<String>,
}

impl NewOrder {
    pub fn total(&self) -> i64 {
        i64::from(self.quantity) * self.unit_price
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderStats {
    pub total_orders: i64,
    pub pending: i64,
    pub confirmed: i64,
    pub shipped: i64,
    pub delivered: i64,
    pub cancelled: i64,
    pub revenue: i64,
    pub paid_revenue: i64,
    pub orders_today: i64,
}

impl OrderStats {
    /// Folds one order into the running totals.
    pub fn add(&mut self, order: &Order, today_start: DateTime<Utc>) {
        self.total_orders += 1;

        match order.status {
            OrderStatus::Pending => self.pending += 1,
            OrderStatus::Confirmed => self.confirmed += 1,
            OrderStatus::Shipped => self.shipped += 1,
            OrderStatus::Delivered => self.delivered += 1,
            OrderStatus::Cancelled => self.cancelled += 1,
        }

        if order.status != OrderStatus::Cancelled {
            self.revenue += order.total;

            if order.payment_status == PaymentStatus::Paid {
                self.paid_revenue += order.total;
            }
        }

        if order.created_at >= today_start {
            self.orders_today += 1;
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageVisit {
    pub user_id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LinkClick {
    pub link_id: Uuid,
    pub user_id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkClicks {
    pub link_id: Uuid,
    pub title: String,
    pub click_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyVisits {
    pub day: NaiveDate,
    pub visits: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub total_visits: i64,
    pub total_clicks: i64,
    pub links: Vec<LinkClicks>,
    pub daily_visits: Vec<DailyVisits>,
}

/// Treats blank strings as absent.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
