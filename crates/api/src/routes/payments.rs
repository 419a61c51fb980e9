//! Payment submission, lookup, and refund endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId};
use payments::{Payment, PaymentMethod};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::error::{ApiError, caller_id};

// -- Request types --

#[derive(Deserialize)]
pub struct ProcessPaymentRequest {
    pub order_id: Uuid,
    pub idempotency_key: String,
    pub amount_cents: i64,
    pub currency: Option<String>,
    pub payment_method: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub order_id: String,
    pub user_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub payment_method: String,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_amount_cents: Option<i64>,
}

fn payment_response(payment: &Payment) -> PaymentResponse {
    PaymentResponse {
        id: payment.id.to_string(),
        order_id: payment.order_id.to_string(),
        user_id: payment.user_id.to_string(),
        amount_cents: payment.amount.cents(),
        currency: payment.currency.clone(),
        status: payment.status.to_string(),
        payment_method: payment.method.to_string(),
        transaction_id: payment.transaction_id.clone(),
        failure_reason: payment.failure_reason.clone(),
        created_at: payment.created_at,
        processed_at: payment.processed_at,
        refunded_at: payment.refunded_at,
        refund_amount_cents: payment.refund_amount.map(|m| m.cents()),
    }
}

fn parse_payment_id(id: &str) -> Result<PaymentId, ApiError> {
    let uuid = Uuid::parse_str(id)
        .map_err(|e| ApiError::bad_request(format!("invalid payment id: {e}")))?;
    Ok(PaymentId::from_uuid(uuid))
}

// -- Handlers --

/// POST /payments — run a payment attempt for an order through the
/// coordinator, which settles inventory and order state on the outcome.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ProcessPaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let user_id = caller_id(&headers)?;
    let order_id = OrderId::from_uuid(req.order_id);

    if req.idempotency_key.trim().is_empty() {
        return Err(ApiError::bad_request("idempotency_key must not be empty"));
    }
    if let Some(ref currency) = req.currency
        && currency != "USD"
    {
        return Err(ApiError::bad_request(format!(
            "unsupported currency: {currency}"
        )));
    }
    let method: PaymentMethod = req
        .payment_method
        .parse()
        .map_err(|e: String| ApiError::bad_request(e))?;

    let outcome = state
        .coordinator
        .process_payment(
            order_id,
            user_id,
            &req.idempotency_key,
            Money::from_cents(req.amount_cents),
            method,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(payment_response(&outcome.payment))))
}

/// GET /payments/{id} — load a payment the caller owns.
#[tracing::instrument(skip(state, headers))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let user_id = caller_id(&headers)?;
    let payment_id = parse_payment_id(&id)?;
    let payment = state.payments.payment(payment_id, user_id).await?;
    Ok(Json(payment_response(&payment)))
}

/// POST /payments/{id}/refund — refund a completed payment.
///
/// When the payment is the one that confirmed its order, the refund goes
/// through the coordinator so the order moves to `Refunded` as well.
#[tracing::instrument(skip(state, headers))]
pub async fn refund(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let user_id = caller_id(&headers)?;
    let payment_id = parse_payment_id(&id)?;

    let payment = state.payments.payment(payment_id, user_id).await?;
    let order = state
        .coordinator
        .get_order(payment.order_id, user_id)
        .await?;

    let refunded = if order.payment_id == Some(payment.id) {
        state
            .coordinator
            .refund_order(order.id, user_id)
            .await?
            .payment
    } else {
        state.payments.refund(payment_id, user_id).await?
    };

    Ok(Json(payment_response(&refunded)))
}
