//! The order fulfillment coordinator.

use std::sync::Arc;
use std::time::Instant;

use common::{Money, OrderId, ProductId, UserId};
use events::{
    EventEnvelope, EventPublisher, OrderCancelledPayload, OrderCreatedPayload, OrderLinePayload,
    topics,
};
use inventory::InventoryLedger;
use orders::{
    Order, OrderLine, OrderStatus, OrderStore, Page, PricingRules, ShippingAddress, StoreError,
};
use payments::{Payment, PaymentGateway, PaymentMethod, PaymentProcessor, PaymentStatus};
use serde::Deserialize;

use crate::catalog::ProductCatalog;
use crate::error::CoordinatorError;
use crate::retry::{RetryPolicy, retry_transient};

const SOURCE: &str = "order-coordinator";

/// One requested line of a new order.
#[derive(Debug, Clone, Deserialize)]
pub struct LineItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Everything needed to create an order.
#[derive(Debug, Clone)]
pub struct CreateOrderCommand {
    pub user_id: UserId,
    pub items: Vec<LineItemRequest>,
    pub shipping_address: ShippingAddress,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

/// An order together with the payment that settled it.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub order: Order,
    pub payment: Payment,
}

/// Coordinates order creation, payment, and cancellation across the
/// inventory ledger, order store, payment processor, and event bus.
///
/// Reservations are acquired strictly in request order and compensated
/// in reverse; persistence always follows successful reservation, never
/// precedes it. Compensation is best-effort and never masks the error
/// that triggered it.
pub struct OrderCoordinator<S, L, C, G, B>
where
    S: OrderStore,
    L: InventoryLedger,
    C: ProductCatalog,
    G: PaymentGateway,
    B: EventPublisher,
{
    store: Arc<S>,
    ledger: Arc<L>,
    catalog: Arc<C>,
    payments: Arc<PaymentProcessor<G>>,
    bus: Arc<B>,
    pricing: PricingRules,
    retry: RetryPolicy,
}

impl<S, L, C, G, B> OrderCoordinator<S, L, C, G, B>
where
    S: OrderStore,
    L: InventoryLedger,
    C: ProductCatalog,
    G: PaymentGateway,
    B: EventPublisher,
{
    /// Creates a coordinator over the given collaborators.
    pub fn new(
        store: Arc<S>,
        ledger: Arc<L>,
        catalog: Arc<C>,
        payments: Arc<PaymentProcessor<G>>,
        bus: Arc<B>,
        pricing: PricingRules,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            catalog,
            payments,
            bus,
            pricing,
            retry,
        }
    }

    /// Creates an order: snapshot products, reserve stock per line,
    /// price, persist, publish.
    ///
    /// Any failure after the first successful reservation releases every
    /// granted reservation in reverse acquisition order before the cause
    /// is returned; the caller never sees partial progress.
    #[tracing::instrument(skip(self, cmd), fields(user_id = %cmd.user_id))]
    pub async fn create_order(&self, cmd: CreateOrderCommand) -> Result<Order, CoordinatorError> {
        metrics::counter!("orders_create_attempts_total").increment(1);
        let started = Instant::now();

        if cmd.items.is_empty() {
            return Err(CoordinatorError::Validation(
                "order must contain at least one item".to_string(),
            ));
        }
        for item in &cmd.items {
            if item.quantity == 0 {
                return Err(CoordinatorError::Validation(format!(
                    "quantity must be greater than zero for product {}",
                    item.product_id
                )));
            }
        }

        let order_id = OrderId::new();

        // Snapshot every product and verify sellability before touching
        // the ledger; a doomed request reserves nothing.
        let mut lines = Vec::with_capacity(cmd.items.len());
        for item in &cmd.items {
            let product = self
                .catalog
                .product(item.product_id)
                .await
                .ok_or(CoordinatorError::ProductNotFound(item.product_id))?;

            if !product.active {
                return Err(CoordinatorError::ProductNotSellable {
                    product_id: product.product_id,
                    sku: product.sku,
                });
            }
            if product.available < item.quantity {
                return Err(CoordinatorError::Inventory(
                    inventory::InventoryError::InsufficientStock {
                        product_id: item.product_id,
                        requested: item.quantity,
                        available: product.available,
                    },
                ));
            }

            lines.push(OrderLine::new(
                product.product_id,
                product.sku,
                product.name,
                product.unit_price,
                item.quantity,
            ));
        }

        // Reserve in request order. The failure position determines what
        // gets compensated, so lines are never reserved in parallel.
        let mut reserved: Vec<(ProductId, u32)> = Vec::with_capacity(lines.len());
        for line in &lines {
            let ledger = self.ledger.clone();
            let (product_id, quantity) = (line.product_id, line.quantity);
            let result = retry_transient(&self.retry, || {
                let ledger = ledger.clone();
                async move { ledger.reserve(product_id, quantity, order_id).await }
            })
            .await;

            if let Err(e) = result {
                tracing::warn!(
                    %order_id,
                    %product_id,
                    error = %e,
                    "reservation failed, compensating prior lines"
                );
                self.compensate_reservations(order_id, &reserved).await;
                metrics::counter!("orders_create_failed_total").increment(1);
                return Err(e.into());
            }
            reserved.push((product_id, quantity));
        }

        let order = Order::new(
            order_id,
            cmd.user_id,
            lines,
            cmd.shipping_address,
            &self.pricing,
            cmd.payment_method,
            cmd.notes,
        )?;

        // Persistence must follow reservation. If the store fails now,
        // the reservations are orphaned unless released here.
        let order = match self.store.insert(order).await {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(%order_id, error = %e, "persist failed after reservation, compensating");
                self.compensate_reservations(order_id, &reserved).await;
                metrics::counter!("orders_create_failed_total").increment(1);
                return Err(e.into());
            }
        };

        self.publish_created(&order).await;

        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("order_create_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(%order_id, order_number = %order.order_number, total = %order.total, "order created");

        Ok(order)
    }

    /// Cancels an order the caller owns, releasing any reservations the
    /// ledger still holds for it.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<Order, CoordinatorError> {
        let order = self
            .store
            .get(order_id)
            .await?
            .ok_or(CoordinatorError::OrderNotFound(order_id))?;
        order.ensure_owned_by(user_id)?;

        let lines: Vec<(ProductId, u32)> = order
            .lines
            .iter()
            .map(|line| (line.product_id, line.quantity))
            .collect();

        // Settle the race against concurrent writers first; release only
        // after this order has actually moved to Cancelled, and only if
        // the state it left still held its reservations.
        let (order, previous) = self
            .transition_and_save(order, OrderStatus::Cancelled)
            .await?;

        if previous.holds_reservation() {
            self.compensate_reservations(order_id, &lines).await;
        }

        self.publish_cancelled(&order).await;
        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(%order_id, "order cancelled");

        Ok(order)
    }

    /// Runs a payment attempt for an order and settles the outcome.
    ///
    /// Replaying an idempotency key returns the recorded payment without
    /// touching the gateway or the order. On completion the reserved
    /// stock is sold through; on failure it is released so the order can
    /// be retried under a new key or cancelled.
    #[tracing::instrument(skip(self, idempotency_key))]
    pub async fn process_payment(
        &self,
        order_id: OrderId,
        user_id: UserId,
        idempotency_key: &str,
        amount: Money,
        method: PaymentMethod,
    ) -> Result<PaymentOutcome, CoordinatorError> {
        let order = self
            .store
            .get(order_id)
            .await?
            .ok_or(CoordinatorError::OrderNotFound(order_id))?;
        order.ensure_owned_by(user_id)?;

        if let Some(existing) = self.payments.payment_by_key(idempotency_key).await {
            if existing.order_id != order_id {
                return Err(payments::PaymentError::KeyAlreadyUsed {
                    key: idempotency_key.to_string(),
                    order_id: existing.order_id,
                }
                .into());
            }
            tracing::info!(%order_id, payment_id = %existing.id, "payment replayed by idempotency key");
            return Ok(PaymentOutcome {
                order,
                payment: existing,
            });
        }

        if amount != order.total {
            return Err(CoordinatorError::AmountMismatch {
                supplied: amount,
                expected: order.total,
            });
        }

        let (order, _) = self
            .transition_and_save(order, OrderStatus::PaymentProcessing)
            .await?;

        let payment = self
            .payments
            .process_payment(
                user_id,
                order_id,
                idempotency_key,
                amount,
                &order.currency,
                method,
            )
            .await?;

        let order = match payment.status {
            PaymentStatus::Completed => {
                // Sold through: permanently retire the reserved units.
                for line in &order.lines {
                    if let Err(e) = self
                        .ledger
                        .confirm_sale(line.product_id, line.quantity)
                        .await
                    {
                        tracing::error!(
                            %order_id,
                            product_id = %line.product_id,
                            error = %e,
                            "confirm_sale failed after completed payment"
                        );
                    }
                }
                let mut confirmed = order.clone();
                confirmed.payment_id = Some(payment.id);
                let version = confirmed.version;
                confirmed.transition(OrderStatus::Confirmed)?;
                self.store.update(confirmed, version).await?
            }
            PaymentStatus::Failed => {
                let lines: Vec<(ProductId, u32)> = order
                    .lines
                    .iter()
                    .map(|line| (line.product_id, line.quantity))
                    .collect();
                self.compensate_reservations(order_id, &lines).await;
                let (order, _) = self
                    .transition_and_save(order, OrderStatus::PaymentFailed)
                    .await?;
                order
            }
            _ => order,
        };

        Ok(PaymentOutcome { order, payment })
    }

    /// Refunds a confirmed order in full and marks it `Refunded`.
    #[tracing::instrument(skip(self))]
    pub async fn refund_order(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<PaymentOutcome, CoordinatorError> {
        let order = self
            .store
            .get(order_id)
            .await?
            .ok_or(CoordinatorError::OrderNotFound(order_id))?;
        order.ensure_owned_by(user_id)?;

        if !order.status.can_transition_to(OrderStatus::Refunded) {
            return Err(orders::OrderError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Refunded,
            }
            .into());
        }

        let payment_id = order
            .payment_id
            .ok_or(CoordinatorError::NoRefundablePayment(order_id))?;
        let payment = self.payments.refund(payment_id, user_id).await?;

        let (order, _) = self.transition_and_save(order, OrderStatus::Refunded).await?;
        tracing::info!(%order_id, %payment_id, "order refunded");

        Ok(PaymentOutcome { order, payment })
    }

    /// Advances fulfillment status (`Processing`, `Shipped`, `Delivered`).
    /// Internal progression, not exposed to order owners.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, CoordinatorError> {
        let order = self
            .store
            .get(order_id)
            .await?
            .ok_or(CoordinatorError::OrderNotFound(order_id))?;
        let (order, _) = self.transition_and_save(order, status).await?;
        Ok(order)
    }

    /// Loads an order the caller owns.
    pub async fn get_order(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<Order, CoordinatorError> {
        let order = self
            .store
            .get(order_id)
            .await?
            .ok_or(CoordinatorError::OrderNotFound(order_id))?;
        order.ensure_owned_by(user_id)?;
        Ok(order)
    }

    /// Pages through the caller's orders, newest first.
    pub async fn list_orders(
        &self,
        user_id: UserId,
        page: usize,
        size: usize,
    ) -> Result<Page<Order>, CoordinatorError> {
        Ok(self.store.list_by_user(user_id, page, size).await?)
    }

    /// Applies `next` and saves, re-reading once if a concurrent writer
    /// won the version race. Returns the saved order and the status it
    /// transitioned from.
    async fn transition_and_save(
        &self,
        order: Order,
        next: OrderStatus,
    ) -> Result<(Order, OrderStatus), CoordinatorError> {
        let mut current = order;
        let mut retried = false;
        loop {
            let previous = current.status;
            let mut changed = current.clone();
            changed.transition(next)?;
            match self.store.update(changed, current.version).await {
                Ok(saved) => return Ok((saved, previous)),
                Err(StoreError::VersionConflict { .. }) if !retried => {
                    tracing::warn!(order_id = %current.id, status = %next, "lost write race, re-reading");
                    retried = true;
                    current = self
                        .store
                        .get(current.id)
                        .await?
                        .ok_or(CoordinatorError::OrderNotFound(current.id))?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Releases granted reservations in reverse acquisition order.
    ///
    /// Best-effort by contract: failures are logged and swallowed so the
    /// original error (or the cancellation) is what the caller sees.
    async fn compensate_reservations(&self, order_id: OrderId, reserved: &[(ProductId, u32)]) {
        if reserved.is_empty() {
            return;
        }
        metrics::counter!("orders_compensations_total").increment(1);
        for (product_id, quantity) in reserved.iter().rev() {
            match self.ledger.release(*product_id, *quantity, order_id).await {
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(
                        %order_id,
                        %product_id,
                        quantity,
                        error = %e,
                        "compensating release failed"
                    );
                }
            }
        }
    }

    async fn publish_created(&self, order: &Order) {
        let payload = OrderCreatedPayload {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id: order.user_id,
            lines: order
                .lines
                .iter()
                .map(|line| OrderLinePayload {
                    product_id: line.product_id,
                    product_name: line.product_name.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    subtotal: line.subtotal,
                })
                .collect(),
            total: order.total,
            shipping_address: order.shipping_address.formatted(),
            status: order.status.to_string(),
        };
        self.publish(topics::ORDER_CREATED, order.id, &payload).await;
    }

    async fn publish_cancelled(&self, order: &Order) {
        let payload = OrderCancelledPayload {
            order_id: order.id,
            user_id: order.user_id,
        };
        self.publish(topics::ORDER_CANCELLED, order.id, &payload).await;
    }

    /// Fire-and-forget: a publish failure never rolls back a committed
    /// order, it is only logged for alerting.
    async fn publish<P: serde::Serialize>(&self, routing_key: &str, order_id: OrderId, payload: &P) {
        let envelope = match EventEnvelope::new(
            routing_key,
            order_id.as_uuid(),
            order_id.as_uuid(),
            SOURCE,
            payload,
        ) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(error = %e, routing_key, "failed to build order event");
                return;
            }
        };
        if let Err(e) = self
            .bus
            .publish(topics::ORDER_EXCHANGE, routing_key, envelope)
            .await
        {
            tracing::warn!(error = %e, routing_key, "order event publish failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryProductCatalog;
    use common::Classify;
    use common::ErrorKind;
    use events::InMemoryEventBus;
    use inventory::{InMemoryInventoryLedger, InventoryError};
    use orders::InMemoryOrderStore;
    use payments::{GatewayMode, SimulatedGateway};
    use std::time::Duration;

    struct Fixture {
        coordinator: OrderCoordinator<
            InMemoryOrderStore,
            InMemoryInventoryLedger,
            InMemoryProductCatalog,
            SimulatedGateway,
            InMemoryEventBus,
        >,
        store: Arc<InMemoryOrderStore>,
        ledger: Arc<InMemoryInventoryLedger>,
        catalog: Arc<InMemoryProductCatalog>,
        gateway: SimulatedGateway,
        bus: Arc<InMemoryEventBus>,
        widget: ProductId,
        gadget: ProductId,
    }

    async fn setup() -> Fixture {
        let bus = Arc::new(InMemoryEventBus::new());
        let store = Arc::new(InMemoryOrderStore::new());
        let ledger = Arc::new(InMemoryInventoryLedger::new(bus.clone()));
        let catalog = Arc::new(InMemoryProductCatalog::new());
        let gateway = SimulatedGateway::new();
        let payments = Arc::new(PaymentProcessor::new(
            gateway.clone(),
            bus.clone(),
            Duration::from_millis(100),
        ));

        let widget = ProductId::new();
        let gadget = ProductId::new();
        catalog
            .seed(widget, "SKU-001", "Widget", Money::from_cents(10_000), 10)
            .await;
        catalog
            .seed(gadget, "SKU-002", "Gadget", Money::from_cents(2_500), 10)
            .await;
        ledger.seed(widget, "SKU-001", 10, 2).await;
        ledger.seed(gadget, "SKU-002", 10, 2).await;

        let coordinator = OrderCoordinator::new(
            store.clone(),
            ledger.clone(),
            catalog.clone(),
            payments,
            bus.clone(),
            PricingRules::default(),
            RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(10),
                multiplier: 2.0,
            },
        );

        Fixture {
            coordinator,
            store,
            ledger,
            catalog,
            gateway,
            bus,
            widget,
            gadget,
        }
    }

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
            payment_method: Some("credit_card".to_string()),
            notes: None,
        }
    }

    #[tokio::test]
    async fn create_order_reserves_prices_persists_and_publishes() {
        let f = setup().await;
        let user_id = UserId::new();

        let order = f
            .coordinator
            .create_order(command(
                user_id,
                vec![
                    LineItemRequest {
                        product_id: f.widget,
                        quantity: 1,
                    },
                    LineItemRequest {
                        product_id: f.gadget,
                        quantity: 3,
                    },
                ],
            ))
            .await
            .unwrap();

        // $100.00 + 3 × $25.00 = $175.00; 8% tax; free shipping.
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.subtotal.cents(), 17_500);
        assert_eq!(order.tax.cents(), 1_400);
        assert_eq!(order.total.cents(), 18_900);
        assert!(order.totals_consistent());

        assert_eq!(f.ledger.stock_level(f.widget).await.unwrap().reserved_quantity, 1);
        assert_eq!(f.ledger.stock_level(f.gadget).await.unwrap().reserved_quantity, 3);
        assert_eq!(f.store.count().await, 1);
        assert_eq!(f.bus.published_count(topics::ORDER_CREATED).await, 1);
    }

    #[tokio::test]
    async fn empty_and_zero_quantity_requests_are_rejected() {
        let f = setup().await;
        let user_id = UserId::new();

        let err = f.coordinator.create_order(command(user_id, vec![])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = f
            .coordinator
            .create_order(command(
                user_id,
                vec![LineItemRequest {
                    product_id: f.widget,
                    quantity: 0,
                }],
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(f.store.count().await, 0);
    }

    #[tokio::test]
    async fn unknown_product_is_terminal_and_reserves_nothing() {
        let f = setup().await;

        let err = f
            .coordinator
            .create_order(command(
                UserId::new(),
                vec![LineItemRequest {
                    product_id: ProductId::new(),
                    quantity: 1,
                }],
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinatorError::ProductNotFound(_)));
        assert_eq!(f.ledger.stock_level(f.widget).await.unwrap().reserved_quantity, 0);
        assert_eq!(f.store.count().await, 0);
    }

    #[tokio::test]
    async fn inactive_product_is_not_sellable() {
        let f = setup().await;
        let inactive = ProductId::new();
        f.catalog
            .upsert(crate::catalog::ProductSnapshot {
                product_id: inactive,
                sku: "SKU-OFF".to_string(),
                name: "Retired".to_string(),
                unit_price: Money::from_cents(100),
                active: false,
                available: 10,
            })
            .await;

        let err = f
            .coordinator
            .create_order(command(
                UserId::new(),
                vec![LineItemRequest {
                    product_id: inactive,
                    quantity: 1,
                }],
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinatorError::ProductNotSellable { .. }));
    }

    #[tokio::test]
    async fn failed_second_line_releases_first_exactly_once_and_never_persists() {
        let f = setup().await;
        // Catalog advertises more gadgets than the ledger holds, so the
        // pre-check passes and the conditional reserve is what fails.
        f.catalog
            .seed(f.gadget, "SKU-002", "Gadget", Money::from_cents(2_500), 100)
            .await;

        let err = f
            .coordinator
            .create_order(command(
                UserId::new(),
                vec![
                    LineItemRequest {
                        product_id: f.widget,
                        quantity: 2,
                    },
                    LineItemRequest {
                        product_id: f.gadget,
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

        // Line 1 was released exactly once; the store saw no write.
        assert_eq!(f.ledger.stock_level(f.widget).await.unwrap().reserved_quantity, 0);
        assert_eq!(f.bus.published_count(topics::INVENTORY_RELEASED).await, 1);
        assert_eq!(f.store.count().await, 0);
        assert_eq!(f.bus.published_count(topics::ORDER_CREATED).await, 0);
    }

    #[tokio::test]
    async fn cancel_releases_stock_and_publishes() {
        let f = setup().await;
        let user_id = UserId::new();
        let order = f
            .coordinator
            .create_order(command(
                user_id,
                vec![LineItemRequest {
                    product_id: f.widget,
                    quantity: 4,
                }],
            ))
            .await
            .unwrap();

        let cancelled = f.coordinator.cancel_order(order.id, user_id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(f.ledger.stock_level(f.widget).await.unwrap().reserved_quantity, 0);
        assert_eq!(f.bus.published_count(topics::ORDER_CANCELLED).await, 1);
    }

    #[tokio::test]
    async fn cancel_is_ownership_checked() {
        let f = setup().await;
        let order = f
            .coordinator
            .create_order(command(
                UserId::new(),
                vec![LineItemRequest {
                    product_id: f.widget,
                    quantity: 1,
                }],
            ))
            .await
            .unwrap();

        let err = f
            .coordinator
            .cancel_order(order.id, UserId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BusinessRule);
    }

    #[tokio::test]
    async fn cancel_after_shipping_fails_without_mutation() {
        let f = setup().await;
        let user_id = UserId::new();
        let order = f
            .coordinator
            .create_order(command(
                user_id,
                vec![LineItemRequest {
                    product_id: f.widget,
                    quantity: 2,
                }],
            ))
            .await
            .unwrap();

        f.coordinator
            .process_payment(order.id, user_id, "key-ship", order.total, PaymentMethod::CreditCard)
            .await
            .unwrap();
        f.coordinator
            .update_status(order.id, OrderStatus::Processing)
            .await
            .unwrap();
        f.coordinator
            .update_status(order.id, OrderStatus::Shipped)
            .await
            .unwrap();

        let stock_before = f.ledger.stock_level(f.widget).await.unwrap();
        let err = f.coordinator.cancel_order(order.id, user_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BusinessRule);

        // Neither order state nor inventory moved.
        let order = f.coordinator.get_order(order.id, user_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(f.ledger.stock_level(f.widget).await.unwrap(), stock_before);
    }

    #[tokio::test]
    async fn completed_payment_confirms_order_and_retires_stock() {
        let f = setup().await;
        let user_id = UserId::new();
        let order = f
            .coordinator
            .create_order(command(
                user_id,
                vec![LineItemRequest {
                    product_id: f.widget,
                    quantity: 4,
                }],
            ))
            .await
            .unwrap();

        let outcome = f
            .coordinator
            .process_payment(order.id, user_id, "key-1", order.total, PaymentMethod::CreditCard)
            .await
            .unwrap();

        assert_eq!(outcome.payment.status, PaymentStatus::Completed);
        assert_eq!(outcome.order.status, OrderStatus::Confirmed);
        assert_eq!(outcome.order.payment_id, Some(outcome.payment.id));
        assert!(outcome.order.paid_at.is_some());

        let level = f.ledger.stock_level(f.widget).await.unwrap();
        assert_eq!(level.stock_quantity, 6);
        assert_eq!(level.reserved_quantity, 0);
        assert_eq!(f.bus.published_count(topics::PAYMENT_COMPLETED).await, 1);
    }

    #[tokio::test]
    async fn failed_payment_releases_stock_and_allows_retry_under_new_key() {
        let f = setup().await;
        let user_id = UserId::new();
        let order = f
            .coordinator
            .create_order(command(
                user_id,
                vec![LineItemRequest {
                    product_id: f.widget,
                    quantity: 4,
                }],
            ))
            .await
            .unwrap();

        f.gateway
            .set_mode(GatewayMode::Decline("card declined".to_string()))
            .await;
        let outcome = f
            .coordinator
            .process_payment(order.id, user_id, "key-1", order.total, PaymentMethod::CreditCard)
            .await
            .unwrap();

        assert_eq!(outcome.payment.status, PaymentStatus::Failed);
        assert_eq!(outcome.order.status, OrderStatus::PaymentFailed);
        let level = f.ledger.stock_level(f.widget).await.unwrap();
        assert_eq!(level.reserved_quantity, 0);
        assert_eq!(level.stock_quantity, 10);

        // Retry under a fresh key succeeds once the gateway recovers.
        f.gateway.set_mode(GatewayMode::Approve).await;
        let outcome = f
            .coordinator
            .process_payment(order.id, user_id, "key-2", order.total, PaymentMethod::CreditCard)
            .await
            .unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Confirmed);
        assert_eq!(f.gateway.calls(), 2);
    }

    #[tokio::test]
    async fn payment_replay_returns_recorded_outcome_without_gateway_call() {
        let f = setup().await;
        let user_id = UserId::new();
        let order = f
            .coordinator
            .create_order(command(
                user_id,
                vec![LineItemRequest {
                    product_id: f.widget,
                    quantity: 1,
                }],
            ))
            .await
            .unwrap();

        let first = f
            .coordinator
            .process_payment(order.id, user_id, "key-1", order.total, PaymentMethod::CreditCard)
            .await
            .unwrap();
        let second = f
            .coordinator
            .process_payment(order.id, user_id, "key-1", order.total, PaymentMethod::CreditCard)
            .await
            .unwrap();

        assert_eq!(first.payment.id, second.payment.id);
        assert_eq!(second.order.status, OrderStatus::Confirmed);
        assert_eq!(f.gateway.calls(), 1);
    }

    #[tokio::test]
    async fn payment_amount_must_match_order_total() {
        let f = setup().await;
        let user_id = UserId::new();
        let order = f
            .coordinator
            .create_order(command(
                user_id,
                vec![LineItemRequest {
                    product_id: f.widget,
                    quantity: 1,
                }],
            ))
            .await
            .unwrap();

        let err = f
            .coordinator
            .process_payment(
                order.id,
                user_id,
                "key-1",
                Money::from_cents(1),
                PaymentMethod::CreditCard,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinatorError::AmountMismatch { .. }));
        // The order never left Pending.
        let order = f.coordinator.get_order(order.id, user_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn refund_after_confirmation_settles_payment_and_order() {
        let f = setup().await;
        let user_id = UserId::new();
        let order = f
            .coordinator
            .create_order(command(
                user_id,
                vec![LineItemRequest {
                    product_id: f.widget,
                    quantity: 1,
                }],
            ))
            .await
            .unwrap();

        f.coordinator
            .process_payment(order.id, user_id, "key-1", order.total, PaymentMethod::CreditCard)
            .await
            .unwrap();

        let outcome = f.coordinator.refund_order(order.id, user_id).await.unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Refunded);
        assert_eq!(outcome.payment.status, PaymentStatus::Refunded);
        assert_eq!(outcome.payment.refund_amount, Some(order.total));

        // A second refund is a business-rule error.
        let err = f.coordinator.refund_order(order.id, user_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BusinessRule);
    }

    #[tokio::test]
    async fn refund_before_payment_is_rejected() {
        let f = setup().await;
        let user_id = UserId::new();
        let order = f
            .coordinator
            .create_order(command(
                user_id,
                vec![LineItemRequest {
                    product_id: f.widget,
                    quantity: 1,
                }],
            ))
            .await
            .unwrap();

        let err = f.coordinator.refund_order(order.id, user_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BusinessRule);
    }

    #[tokio::test]
    async fn list_orders_pages_per_user() {
        let f = setup().await;
        let user_id = UserId::new();
        for _ in 0..3 {
            f.coordinator
                .create_order(command(
                    user_id,
                    vec![LineItemRequest {
                        product_id: f.widget,
                        quantity: 1,
                    }],
                ))
                .await
                .unwrap();
        }

        let page = f.coordinator.list_orders(user_id, 0, 2).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 3);
    }
}
