use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, ProductId};
use events::{EventEnvelope, EventPublisher, InventoryChangePayload, topics};
use tokio::sync::RwLock;

use crate::error::InventoryError;
use crate::ledger::{InventoryLedger, ReleaseOutcome, StockLevel};

const SOURCE: &str = "inventory-ledger";

/// In-memory inventory ledger.
///
/// A single writer lock makes each mutation an atomic conditional
/// update, the in-process equivalent of a conditional `UPDATE ... WHERE
/// stock - reserved >= qty` at the storage layer. Stands in for a
/// relational ledger behind the same [`InventoryLedger`] interface.
#[derive(Clone)]
pub struct InMemoryInventoryLedger {
    state: Arc<RwLock<HashMap<ProductId, StockLevel>>>,
    bus: Arc<dyn EventPublisher>,
}

impl InMemoryInventoryLedger {
    /// Creates an empty ledger publishing audit events to `bus`.
    pub fn new(bus: Arc<dyn EventPublisher>) -> Self {
        Self {
            state: Arc::new(RwLock::new(HashMap::new())),
            bus,
        }
    }

    /// Seeds a product with initial stock.
    pub async fn seed(
        &self,
        product_id: ProductId,
        sku: impl Into<String>,
        stock_quantity: u32,
        low_stock_threshold: u32,
    ) {
        let mut state = self.state.write().await;
        state.insert(
            product_id,
            StockLevel {
                product_id,
                sku: sku.into(),
                stock_quantity,
                reserved_quantity: 0,
                low_stock_threshold,
            },
        );
    }

    /// Publishes an audit event; failures are logged, never surfaced.
    async fn publish_change(
        &self,
        routing_key: &str,
        before: &StockLevel,
        after: &StockLevel,
        quantity: u32,
        order_id: Option<OrderId>,
    ) {
        let payload = InventoryChangePayload {
            product_id: after.product_id,
            sku: after.sku.clone(),
            quantity,
            stock_before: before.stock_quantity,
            reserved_before: before.reserved_quantity,
            stock_after: after.stock_quantity,
            reserved_after: after.reserved_quantity,
            order_id,
        };

        let correlation = order_id
            .map(|id| id.as_uuid())
            .unwrap_or_else(|| after.product_id.as_uuid());

        let envelope = match EventEnvelope::new(
            routing_key,
            after.product_id.as_uuid(),
            correlation,
            SOURCE,
            &payload,
        ) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(error = %e, routing_key, "failed to build inventory event");
                return;
            }
        };

        if let Err(e) = self
            .bus
            .publish(topics::INVENTORY_EXCHANGE, routing_key, envelope)
            .await
        {
            tracing::warn!(error = %e, routing_key, "inventory event publish failed");
        }
    }
}

#[async_trait]
impl InventoryLedger for InMemoryInventoryLedger {
    #[tracing::instrument(skip(self))]
    async fn reserve(
        &self,
        product_id: ProductId,
        quantity: u32,
        order_id: OrderId,
    ) -> Result<StockLevel, InventoryError> {
        let (before, after) = {
            let mut state = self.state.write().await;
            let level = state
                .get_mut(&product_id)
                .ok_or(InventoryError::ProductNotFound(product_id))?;

            // The availability check and the increment happen under the
            // same write guard: exactly one of two racing reservations
            // for the last unit can pass the check.
            if level.available() < quantity {
                metrics::counter!("inventory_reservation_rejections_total").increment(1);
                return Err(InventoryError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available: level.available(),
                });
            }

            let before = level.clone();
            level.reserved_quantity += quantity;
            (before, level.clone())
        };

        metrics::counter!("inventory_reservations_total").increment(1);
        self.publish_change(
            topics::INVENTORY_RESERVED,
            &before,
            &after,
            quantity,
            Some(order_id),
        )
        .await;

        Ok(after)
    }

    #[tracing::instrument(skip(self))]
    async fn release(
        &self,
        product_id: ProductId,
        quantity: u32,
        order_id: OrderId,
    ) -> Result<ReleaseOutcome, InventoryError> {
        let result = {
            let mut state = self.state.write().await;
            match state.get_mut(&product_id) {
                None => {
                    tracing::warn!(%product_id, %order_id, "release for unknown product");
                    None
                }
                Some(level) => {
                    let released = quantity.min(level.reserved_quantity);
                    if released < quantity {
                        tracing::warn!(
                            %product_id,
                            %order_id,
                            requested = quantity,
                            reserved = level.reserved_quantity,
                            "release quantity exceeds reservation, flooring at zero"
                        );
                    }
                    if released == 0 {
                        None
                    } else {
                        let before = level.clone();
                        level.reserved_quantity -= released;
                        Some((before, level.clone(), released))
                    }
                }
            }
        };

        match result {
            None => Ok(ReleaseOutcome::NoOp),
            Some((before, after, released)) => {
                metrics::counter!("inventory_releases_total").increment(1);
                self.publish_change(
                    topics::INVENTORY_RELEASED,
                    &before,
                    &after,
                    released,
                    Some(order_id),
                )
                .await;
                Ok(ReleaseOutcome::Released(after))
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn confirm_sale(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<StockLevel, InventoryError> {
        let mut state = self.state.write().await;
        let level = state
            .get_mut(&product_id)
            .ok_or(InventoryError::ProductNotFound(product_id))?;

        let from_stock = quantity.min(level.stock_quantity);
        let from_reserved = quantity.min(level.reserved_quantity);
        if from_stock < quantity || from_reserved < quantity {
            tracing::warn!(
                %product_id,
                quantity,
                stock = level.stock_quantity,
                reserved = level.reserved_quantity,
                "confirm_sale quantity exceeds counters, flooring at zero"
            );
        }
        level.stock_quantity -= from_stock;
        level.reserved_quantity -= from_reserved;
        // Retiring more reserved than stock would break the invariant.
        level.reserved_quantity = level.reserved_quantity.min(level.stock_quantity);

        metrics::counter!("inventory_sales_confirmed_total").increment(1);
        Ok(level.clone())
    }

    async fn restock(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<StockLevel, InventoryError> {
        let mut state = self.state.write().await;
        let level = state
            .get_mut(&product_id)
            .ok_or(InventoryError::ProductNotFound(product_id))?;
        level.stock_quantity += quantity;
        Ok(level.clone())
    }

    async fn stock_level(&self, product_id: ProductId) -> Result<StockLevel, InventoryError> {
        let state = self.state.read().await;
        state
            .get(&product_id)
            .cloned()
            .ok_or(InventoryError::ProductNotFound(product_id))
    }

    async fn low_stock(&self) -> Result<Vec<StockLevel>, InventoryError> {
        let state = self.state.read().await;
        Ok(state
            .values()
            .filter(|level| level.is_low_stock())
            .cloned()
            .collect())
    }
}
