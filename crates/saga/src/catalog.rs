//! Narrow interface to the product catalog collaborator.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A product as seen at order time.
///
/// The coordinator snapshots these fields onto order lines; they are
/// never re-read from the catalog afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub unit_price: Money,
    pub active: bool,
    pub available: u32,
}

impl ProductSnapshot {
    /// A product is sellable when active with enough advertised stock.
    /// The inventory ledger remains the authority; this is the cheap
    /// pre-check before reserving.
    pub fn is_sellable(&self, quantity: u32) -> bool {
        self.active && self.available >= quantity
    }
}

/// Read access to the (out-of-scope) catalog service.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Fetches the current snapshot for a product, if it exists.
    async fn product(&self, product_id: ProductId) -> Option<ProductSnapshot>;
}

/// In-memory catalog for tests and local runs.
#[derive(Clone, Default)]
pub struct InMemoryProductCatalog {
    products: Arc<RwLock<HashMap<ProductId, ProductSnapshot>>>,
}

impl InMemoryProductCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a product snapshot.
    pub async fn upsert(&self, snapshot: ProductSnapshot) {
        self.products
            .write()
            .await
            .insert(snapshot.product_id, snapshot);
    }

    /// Seeds an active product.
    pub async fn seed(
        &self,
        product_id: ProductId,
        sku: impl Into<String>,
        name: impl Into<String>,
        unit_price: Money,
        available: u32,
    ) {
        self.upsert(ProductSnapshot {
            product_id,
            sku: sku.into(),
            name: name.into(),
            unit_price,
            active: true,
            available,
        })
        .await;
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn product(&self, product_id: ProductId) -> Option<ProductSnapshot> {
        self.products.read().await.get(&product_id).cloned()
    }
}
