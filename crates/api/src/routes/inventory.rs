//! Internal inventory endpoints consumed by order-domain peers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::{OrderId, ProductId};
use inventory::{InventoryLedger, ReleaseOutcome, StockLevel};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct StockChangeParams {
    pub quantity: u32,
    pub order_id: Uuid,
}

#[derive(Serialize)]
pub struct StockLevelResponse {
    pub product_id: String,
    pub sku: String,
    pub stock_quantity: u32,
    pub reserved_quantity: u32,
    pub available: u32,
    pub low_stock: bool,
}

#[derive(Serialize)]
pub struct ReleaseResponse {
    pub released: bool,
    pub stock: Option<StockLevelResponse>,
}

fn stock_response(level: &StockLevel) -> StockLevelResponse {
    StockLevelResponse {
        product_id: level.product_id.to_string(),
        sku: level.sku.clone(),
        stock_quantity: level.stock_quantity,
        reserved_quantity: level.reserved_quantity,
        available: level.available(),
        low_stock: level.is_low_stock(),
    }
}

fn parse_product_id(id: &str) -> Result<ProductId, ApiError> {
    let uuid = Uuid::parse_str(id)
        .map_err(|e| ApiError::bad_request(format!("invalid product id: {e}")))?;
    Ok(ProductId::from_uuid(uuid))
}

/// POST /inventory/{product_id}/reserve?quantity=&order_id=
#[tracing::instrument(skip(state))]
pub async fn reserve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<StockChangeParams>,
) -> Result<Json<StockLevelResponse>, ApiError> {
    let product_id = parse_product_id(&id)?;
    let level = state
        .ledger
        .reserve(product_id, params.quantity, OrderId::from_uuid(params.order_id))
        .await?;
    Ok(Json(stock_response(&level)))
}

/// POST /inventory/{product_id}/release?quantity=&order_id=
#[tracing::instrument(skip(state))]
pub async fn release(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<StockChangeParams>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    let product_id = parse_product_id(&id)?;
    let outcome = state
        .ledger
        .release(product_id, params.quantity, OrderId::from_uuid(params.order_id))
        .await?;
    Ok(Json(match outcome {
        ReleaseOutcome::Released(level) => ReleaseResponse {
            released: true,
            stock: Some(stock_response(&level)),
        },
        ReleaseOutcome::NoOp => ReleaseResponse {
            released: false,
            stock: None,
        },
    }))
}

/// GET /inventory/{product_id} — current stock counters.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StockLevelResponse>, ApiError> {
    let product_id = parse_product_id(&id)?;
    let level = state.ledger.stock_level(product_id).await?;
    Ok(Json(stock_response(&level)))
}
