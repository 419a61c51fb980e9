//! Integration tests for the order fulfillment saga using
//! failure-injecting collaborator doubles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{Classify, ErrorKind, Money, OrderId, ProductId, UserId, Version};
use events::InMemoryEventBus;
use inventory::{
    InMemoryInventoryLedger, InventoryError, InventoryLedger, ReleaseOutcome, StockLevel,
};
use orders::{
    InMemoryOrderStore, Order, OrderStatus, OrderStore, Page, PricingRules, ShippingAddress,
    StoreError,
};
use payments::{PaymentProcessor, SimulatedGateway};
use saga::{
    CreateOrderCommand, CoordinatorError, InMemoryProductCatalog, LineItemRequest,
    OrderCoordinator, RetryPolicy,
};

fn address() -> ShippingAddress {
    ShippingAddress {
        street: "1 Main St".to_string(),
        city: "Springfield".to_string(),
        state: "IL".to_string(),
        postal_code: "62704".to_string(),
        country: "US".to_string(),
        recipient_name: "Pat Doe".to_string(),
        recipient_phone: None,
    }
}

fn command(user_id: UserId, items: Vec<LineItemRequest>) -> CreateOrderCommand {
    CreateOrderCommand {
        user_id,
        items,
        shipping_address: address(),
        payment_method: None,
        notes: None,
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
    }
}

/// Ledger double that fails the first N reserves, and optionally every
/// release, with a transient error.
struct FlakyLedger {
    inner: InMemoryInventoryLedger,
    reserve_failures_left: AtomicU32,
    fail_releases: AtomicBool,
    release_attempts: AtomicU32,
}

impl FlakyLedger {
    fn new(inner: InMemoryInventoryLedger, reserve_failures: u32) -> Self {
        Self {
            inner,
            reserve_failures_left: AtomicU32::new(reserve_failures),
            fail_releases: AtomicBool::new(false),
            release_attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl InventoryLedger for FlakyLedger {
    async fn reserve(
        &self,
        product_id: ProductId,
        quantity: u32,
        order_id: OrderId,
    ) -> Result<StockLevel, InventoryError> {
        if self
            .reserve_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok()
        {
            return Err(InventoryError::Unavailable("connection reset".to_string()));
        }
        self.inner.reserve(product_id, quantity, order_id).await
    }

    async fn release(
        &self,
        product_id: ProductId,
        quantity: u32,
        order_id: OrderId,
    ) -> Result<ReleaseOutcome, InventoryError> {
        self.release_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_releases.load(Ordering::SeqCst) {
            return Err(InventoryError::Unavailable("connection reset".to_string()));
        }
        self.inner.release(product_id, quantity, order_id).await
    }

    async fn confirm_sale(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<StockLevel, InventoryError> {
        self.inner.confirm_sale(product_id, quantity).await
    }

    async fn restock(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<StockLevel, InventoryError> {
        self.inner.restock(product_id, quantity).await
    }

    async fn stock_level(&self, product_id: ProductId) -> Result<StockLevel, InventoryError> {
        self.inner.stock_level(product_id).await
    }

    async fn low_stock(&self) -> Result<Vec<StockLevel>, InventoryError> {
        self.inner.low_stock().await
    }
}

/// Store double that can fail inserts and lose one update race.
struct UnreliableStore {
    inner: InMemoryOrderStore,
    fail_inserts: AtomicBool,
    conflict_next_update: AtomicBool,
}

impl UnreliableStore {
    fn new() -> Self {
        Self {
            inner: InMemoryOrderStore::new(),
            fail_inserts: AtomicBool::new(false),
            conflict_next_update: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl OrderStore for UnreliableStore {
    async fn insert(&self, order: Order) -> Result<Order, StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("database gone".to_string()));
        }
        self.inner.insert(order).await
    }

    async fn update(&self, order: Order, expected: Version) -> Result<Order, StoreError> {
        if self.conflict_next_update.swap(false, Ordering::SeqCst) {
            return Err(StoreError::VersionConflict {
                order_id: order.id,
                expected,
                actual: expected.next(),
            });
        }
        self.inner.update(order, expected).await
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        self.inner.get(order_id).await
    }

    async fn get_by_order_number(&self, order_number: &str) -> Result<Option<Order>, StoreError> {
        self.inner.get_by_order_number(order_number).await
    }

    async fn list_by_user(
        &self,
        user_id: UserId,
        page: usize,
        size: usize,
    ) -> Result<Page<Order>, StoreError> {
        self.inner.list_by_user(user_id, page, size).await
    }

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, StoreError> {
        self.inner.list_by_status(status).await
    }
}

struct Harness<S: OrderStore, L: InventoryLedger> {
    coordinator: OrderCoordinator<
        S,
        L,
        InMemoryProductCatalog,
        SimulatedGateway,
        InMemoryEventBus,
    >,
    ledger: Arc<L>,
    store: Arc<S>,
    bus: Arc<InMemoryEventBus>,
    widget: ProductId,
    gadget: ProductId,
}

async fn harness_with<S: OrderStore, L: InventoryLedger>(
    store: S,
    make_ledger: impl FnOnce(InMemoryInventoryLedger) -> L,
) -> Harness<S, L> {
    let bus = Arc::new(InMemoryEventBus::new());
    let inner_ledger = InMemoryInventoryLedger::new(bus.clone());
    let catalog = Arc::new(InMemoryProductCatalog::new());

    let widget = ProductId::new();
    let gadget = ProductId::new();
    catalog
        .seed(widget, "SKU-001", "Widget", Money::from_cents(10_000), 100)
        .await;
    catalog
        .seed(gadget, "SKU-002", "Gadget", Money::from_cents(2_500), 100)
        .await;
    inner_ledger.seed(widget, "SKU-001", 10, 2).await;
    inner_ledger.seed(gadget, "SKU-002", 10, 2).await;

    let ledger = Arc::new(make_ledger(inner_ledger));
    let store = Arc::new(store);
    let payments = Arc::new(PaymentProcessor::new(
        SimulatedGateway::new(),
        bus.clone(),
        Duration::from_millis(100),
    ));

    let coordinator = OrderCoordinator::new(
        store.clone(),
        ledger.clone(),
        catalog,
        payments,
        bus.clone(),
        PricingRules::default(),
        fast_retry(),
    );

    Harness {
        coordinator,
        ledger,
        store,
        bus,
        widget,
        gadget,
    }
}

#[tokio::test]
async fn transient_ledger_failures_are_retried_to_success() {
    let h = harness_with(InMemoryOrderStore::new(), |inner| FlakyLedger::new(inner, 2)).await;

    let order = h
        .coordinator
        .create_order(command(
            UserId::new(),
            vec![LineItemRequest {
                product_id: h.widget,
                quantity: 2,
            }],
        ))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(
        h.ledger.stock_level(h.widget).await.unwrap().reserved_quantity,
        2
    );
}

#[tokio::test]
async fn exhausted_retries_become_a_terminal_downstream_failure() {
    // More consecutive failures than the attempt ceiling allows.
    let h = harness_with(InMemoryOrderStore::new(), |inner| FlakyLedger::new(inner, 10)).await;

    let err = h
        .coordinator
        .create_order(command(
            UserId::new(),
            vec![LineItemRequest {
                product_id: h.widget,
                quantity: 2,
            }],
        ))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DownstreamUnavailable);
    assert!(
        h.store
            .list_by_status(OrderStatus::Pending)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn persistence_failure_after_reservation_triggers_full_compensation() {
    let store = UnreliableStore::new();
    store.fail_inserts.store(true, Ordering::SeqCst);
    let h = harness_with(store, |inner| inner).await;

    let err = h
        .coordinator
        .create_order(command(
            UserId::new(),
            vec![
                LineItemRequest {
                    product_id: h.widget,
                    quantity: 2,
                },
                LineItemRequest {
                    product_id: h.gadget,
                    quantity: 3,
                },
            ],
        ))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DownstreamUnavailable);

    // Every granted reservation was released again.
    assert_eq!(
        h.ledger.stock_level(h.widget).await.unwrap().reserved_quantity,
        0
    );
    assert_eq!(
        h.ledger.stock_level(h.gadget).await.unwrap().reserved_quantity,
        0
    );
    assert_eq!(h.bus.published_count(events::topics::INVENTORY_RELEASED).await, 2);
    assert_eq!(h.bus.published_count(events::topics::ORDER_CREATED).await, 0);
}

#[tokio::test]
async fn compensation_failures_do_not_mask_the_original_error() {
    let h = harness_with(InMemoryOrderStore::new(), |inner| FlakyLedger::new(inner, 0)).await;
    h.ledger.fail_releases.store(true, Ordering::SeqCst);

    // Line 2 asks for more than the ledger holds; line 1's compensation
    // will fail, and the caller must still see the insufficient stock.
    let err = h
        .coordinator
        .create_order(command(
            UserId::new(),
            vec![
                LineItemRequest {
                    product_id: h.widget,
                    quantity: 2,
                },
                LineItemRequest {
                    product_id: h.gadget,
                    quantity: 50,
                },
            ],
        ))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoordinatorError::Inventory(InventoryError::InsufficientStock { .. })
    ));
    // The release was attempted even though it kept failing.
    assert!(h.ledger.release_attempts.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn lost_write_race_is_retried_once_by_re_reading() {
    let store = UnreliableStore::new();
    let h = harness_with(store, |inner| inner).await;
    let user_id = UserId::new();

    let order = h
        .coordinator
        .create_order(command(
            user_id,
            vec![LineItemRequest {
                product_id: h.widget,
                quantity: 1,
            }],
        ))
        .await
        .unwrap();

    // The next update loses the race once, then succeeds on re-read.
    h.store.conflict_next_update.store(true, Ordering::SeqCst);
    let cancelled = h.coordinator.cancel_order(order.id, user_id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn concurrent_orders_for_the_same_stock_have_exactly_one_winner() {
    let h = Arc::new(harness_with(InMemoryOrderStore::new(), |inner| inner).await);

    // Product with stock 10; two simultaneous orders of 6 each.
    let first = {
        let h = h.clone();
        tokio::spawn(async move {
            h.coordinator
                .create_order(command(
                    UserId::new(),
                    vec![LineItemRequest {
                        product_id: h.widget,
                        quantity: 6,
                    }],
                ))
                .await
        })
    };
    let second = {
        let h = h.clone();
        tokio::spawn(async move {
            h.coordinator
                .create_order(command(
                    UserId::new(),
                    vec![LineItemRequest {
                        product_id: h.widget,
                        quantity: 6,
                    }],
                ))
                .await
        })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);

    let loser = results.iter().find(|r| r.is_err()).unwrap();
    assert!(matches!(
        loser.as_ref().unwrap_err(),
        CoordinatorError::Inventory(InventoryError::InsufficientStock { .. })
    ));

    let level = h.ledger.stock_level(h.widget).await.unwrap();
    assert_eq!(level.reserved_quantity, 6);
    assert_eq!(level.available(), 4);

    // Only the winner was persisted and announced.
    assert_eq!(h.store.count().await, 1);
    assert_eq!(h.bus.published_count(events::topics::ORDER_CREATED).await, 1);
}
