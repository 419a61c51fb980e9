//! Order creation, reads, and cancellation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use orders::{Order, ShippingAddress};
use saga::{CreateOrderCommand, LineItemRequest};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::error::{ApiError, caller_id};

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemRequest>,
    pub shipping_address: ShippingAddressRequest,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct ShippingAddressRequest {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub recipient_name: String,
    pub recipient_phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<usize>,
    pub size: Option<usize>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub user_id: String,
    pub status: String,
    pub lines: Vec<OrderLineResponse>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub shipping_address: String,
    pub payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: String,
    pub sku: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
}

#[derive(Serialize)]
pub struct OrderPageResponse {
    pub items: Vec<OrderResponse>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

pub(crate) fn order_response(order: &Order) -> OrderResponse {
    OrderResponse {
        id: order.id.to_string(),
        order_number: order.order_number.clone(),
        user_id: order.user_id.to_string(),
        status: order.status.to_string(),
        lines: order
            .lines
            .iter()
            .map(|line| OrderLineResponse {
                product_id: line.product_id.to_string(),
                sku: line.sku.clone(),
                product_name: line.product_name.clone(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price.cents(),
                subtotal_cents: line.subtotal.cents(),
            })
            .collect(),
        subtotal_cents: order.subtotal.cents(),
        tax_cents: order.tax.cents(),
        shipping_cents: order.shipping.cents(),
        discount_cents: order.discount.cents(),
        total_cents: order.total.cents(),
        currency: order.currency.clone(),
        shipping_address: order.shipping_address.formatted(),
        payment_id: order.payment_id.map(|id| id.to_string()),
        payment_method: order.payment_method.clone(),
        notes: order.notes.clone(),
        created_at: order.created_at,
        paid_at: order.paid_at,
        shipped_at: order.shipped_at,
        delivered_at: order.delivered_at,
    }
}

pub(crate) fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = Uuid::parse_str(id)
        .map_err(|e| ApiError::bad_request(format!("invalid order id: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}

// -- Handlers --

/// POST /orders — run the creation saga for the calling user.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let user_id = caller_id(&headers)?;

    let cmd = CreateOrderCommand {
        user_id,
        items: req
            .items
            .iter()
            .map(|item| LineItemRequest {
                product_id: ProductId::from_uuid(item.product_id),
                quantity: item.quantity,
            })
            .collect(),
        shipping_address: ShippingAddress {
            street: req.shipping_address.street,
            city: req.shipping_address.city,
            state: req.shipping_address.state,
            postal_code: req.shipping_address.postal_code,
            country: req.shipping_address.country,
            recipient_name: req.shipping_address.recipient_name,
            recipient_phone: req.shipping_address.recipient_phone,
        },
        payment_method: req.payment_method,
        notes: req.notes,
    };

    let order = state.coordinator.create_order(cmd).await?;
    Ok((StatusCode::CREATED, Json(order_response(&order))))
}

/// GET /orders/{id} — load an order the caller owns.
#[tracing::instrument(skip(state, headers))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let user_id = caller_id(&headers)?;
    let order_id = parse_order_id(&id)?;
    let order = state.coordinator.get_order(order_id, user_id).await?;
    Ok(Json(order_response(&order)))
}

/// GET /orders?page=&size= — page through the caller's orders.
#[tracing::instrument(skip(state, headers))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<OrderPageResponse>, ApiError> {
    let user_id = caller_id(&headers)?;
    let page = params.page.unwrap_or(0);
    let size = params.size.unwrap_or(20).min(100);

    let result = state.coordinator.list_orders(user_id, page, size).await?;
    Ok(Json(OrderPageResponse {
        items: result.items.iter().map(order_response).collect(),
        page: result.page,
        size: result.size,
        total: result.total,
    }))
}

/// POST /orders/{id}/cancel — cancel an order the caller owns.
#[tracing::instrument(skip(state, headers))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let user_id = caller_id(&headers)?;
    let order_id = parse_order_id(&id)?;
    let order = state.coordinator.cancel_order(order_id, user_id).await?;
    Ok(Json(order_response(&order)))
}
