use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State as AxumState},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use store::{NewOrder, Order, OrderQuery, OrderStats, OrderStatus, OrderUpdate, Page, non_empty};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::Admin,
    error::AppError,
    pixel::{DEFAULT_CURRENCY, EventKind, EventRequest},
    state::State,
    utils::{
        ClientMeta, JsonBody, check_quantity, check_required, clamp_limit, clamp_offset,
        local_midnight,
    },
};

#[derive(Deserialize)]
pub struct OrderRequest {
    customer_name: String,
    phone: String,
    #[serde(default)]
    email: Option<String>,
    city: String,
    address: String,
    #[serde(default)]
    card_design: Option<String>,
    quantity: i32,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Deserialize)]
pub struct OrderParams {
    status: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

pub async fn create_order_handler(
    AxumState(state): AxumState<Arc<State>>,
    meta: ClientMeta,
    JsonBody(payload): JsonBody<OrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    check_quantity(payload.quantity)?;

    let order = NewOrder {
        customer_name: check_required("customer_name", &payload.customer_name)?,
        phone: check_required("phone", &payload.phone)?,
        email: non_empty(payload.email),
        city: check_required("city", &payload.city)?,
        address: check_required("address", &payload.address)?,
        card_design: non_empty(payload.card_design),
        quantity: payload.quantity,
        unit_price: state.config.card_price,
        notes: non_empty(payload.notes),
    };

    let order = state.store.create_order(order).await?;
    info!("Order {} placed for {} card(s)", order.id, order.quantity);

    if let Some(pixel) = state.pixel.clone() {
        let request = lead_event(&state, &order);
        tokio::spawn(async move {
            pixel.send(EventKind::Lead, &request, &meta).await;
        });
    }

    Ok((StatusCode::CREATED, Json(order)))
}

/// The customer's own details, so the ad platform can match the lead.
fn lead_event(state: &State, order: &Order) -> EventRequest {
    let mut names = order.customer_name.split_whitespace();

    EventRequest {
        event_source_url: Some(format!("{}/order", state.config.site_url)),
        email: order.email.clone(),
        phone: Some(order.phone.clone()),
        first_name: names.next().map(str::to_string),
        last_name: names.last().map(str::to_string),
        city: Some(order.city.clone()),
        external_id: Some(order.id.to_string()),
        value: Some(order.total as f64),
        currency: Some(DEFAULT_CURRENCY.to_string()),
        content_name: Some("NFC business card".to_string()),
        num_items: Some(i64::from(order.quantity)),
        ..Default::default()
    }
}

pub async fn list_orders_handler(
    AxumState(state): AxumState<Arc<State>>,
    _admin: Admin,
    Query(params): Query<OrderParams>,
) -> Result<Json<Page<Order>>, AppError> {
    let status = match params.status.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(raw.parse::<OrderStatus>().map_err(AppError::MalformedPayload)?),
    };

    let query = OrderQuery {
        status,
        limit: clamp_limit(params.limit),
        offset: clamp_offset(params.offset),
    };

    Ok(Json(state.store.list_orders(query).await?))
}

pub async fn order_stats_handler(
    AxumState(state): AxumState<Arc<State>>,
    _admin: Admin,
) -> Result<Json<OrderStats>, AppError> {
    Ok(Json(state.store.order_stats(local_midnight(Utc::now())).await?))
}

pub async fn get_order_handler(
    AxumState(state): AxumState<Arc<State>>,
    _admin: Admin,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.store.order_by_id(id).await?))
}

pub async fn update_order_handler(
    AxumState(state): AxumState<Arc<State>>,
    _admin: Admin,
    Path(id): Path<Uuid>,
    JsonBody(update): JsonBody<OrderUpdate>,
) -> Result<Json<Order>, AppError> {
    let order = state.store.update_order(id, update).await?;
    info!("Order {id} is now {} / {}", order.status, order.payment_status);

    Ok(Json(order))
}

pub async fn delete_order_handler(
    AxumState(state): AxumState<Arc<State>>,
    _admin: Admin,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.store.delete_order(id).await?;

    Ok(StatusCode::NO_CONTENT)
}
