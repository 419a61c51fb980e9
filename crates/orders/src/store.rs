//! Whole-aggregate order persistence with per-order optimistic
//! concurrency.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Classify, ErrorKind, OrderId, UserId, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::aggregate::Order;
use crate::status::OrderStatus;

/// Errors raised by the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert of an ID that already exists.
    #[error("order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// Insert of an order number that already exists.
    #[error("duplicate order number: {0}")]
    DuplicateOrderNumber(String),

    /// Update of an order that was never inserted.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// A concurrent writer moved the version first. Re-read and retry;
    /// never blindly overwrite.
    #[error("version conflict for order {order_id}: expected {expected}, found {actual}")]
    VersionConflict {
        order_id: OrderId,
        expected: Version,
        actual: Version,
    },

    /// The storage backend was unreachable.
    #[error("order store unavailable: {0}")]
    Unavailable(String),
}

impl Classify for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::DuplicateOrder(_)
            | StoreError::DuplicateOrderNumber(_)
            | StoreError::VersionConflict { .. } => ErrorKind::Conflict,
            StoreError::OrderNotFound(_) => ErrorKind::NotFound,
            StoreError::Unavailable(_) => ErrorKind::DownstreamUnavailable,
        }
    }
}

/// One page of a list query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

/// Transactional persistence of the order aggregate.
///
/// The store saves and loads whole aggregates only; lines are never
/// mutated from outside. `update` is the single-writer-per-order
/// boundary: it commits only if the caller read the current version.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order at [`Version::first`].
    async fn insert(&self, order: Order) -> Result<Order, StoreError>;

    /// Persists a changed order if `expected` is still the stored
    /// version; returns the order at its new version.
    async fn update(&self, order: Order, expected: Version) -> Result<Order, StoreError>;

    /// Loads an order by ID.
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Loads an order by its human-readable number.
    async fn get_by_order_number(&self, order_number: &str) -> Result<Option<Order>, StoreError>;

    /// Pages through a user's orders, newest first.
    async fn list_by_user(
        &self,
        user_id: UserId,
        page: usize,
        size: usize,
    ) -> Result<Page<Order>, StoreError>;

    /// Every order currently in `status`.
    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, StoreError>;
}

/// In-memory order store.
///
/// A single writer lock makes the version compare-and-swap atomic, the
/// in-process equivalent of row-level locking in a relational store.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders.
    pub async fn count(&self) -> usize {
        self.state.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, mut order: Order) -> Result<Order, StoreError> {
        let mut state = self.state.write().await;
        if state.contains_key(&order.id) {
            return Err(StoreError::DuplicateOrder(order.id));
        }
        if state
            .values()
            .any(|existing| existing.order_number == order.order_number)
        {
            return Err(StoreError::DuplicateOrderNumber(order.order_number));
        }
        order.version = Version::first();
        state.insert(order.id, order.clone());
        Ok(order)
    }

    async fn update(&self, mut order: Order, expected: Version) -> Result<Order, StoreError> {
        let mut state = self.state.write().await;
        let stored = state
            .get(&order.id)
            .ok_or(StoreError::OrderNotFound(order.id))?;

        if stored.version != expected {
            return Err(StoreError::VersionConflict {
                order_id: order.id,
                expected,
                actual: stored.version,
            });
        }

        order.version = expected.next();
        state.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.state.read().await.get(&order_id).cloned())
    }

    async fn get_by_order_number(&self, order_number: &str) -> Result<Option<Order>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .values()
            .find(|order| order.order_number == order_number)
            .cloned())
    }

    async fn list_by_user(
        &self,
        user_id: UserId,
        page: usize,
        size: usize,
    ) -> Result<Page<Order>, StoreError> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .values()
            .filter(|order| order.user_id == user_id)
            .cloned()
            .collect();
        // Newest first, ID as tiebreaker for a stable page order.
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.as_uuid().cmp(&b.id.as_uuid()))
        });

        let total = orders.len();
        let items = orders.into_iter().skip(page * size).take(size).collect();
        Ok(Page {
            items,
            page,
            size,
            total,
        })
    }

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .values()
            .filter(|order| order.status == status)
            .cloned()
            .collect())
    }
}
