use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{Money, OrderId, PaymentId, UserId};
use events::{EventEnvelope, EventPublisher, PaymentEventPayload, topics};
use tokio::sync::RwLock;

use crate::error::PaymentError;
use crate::gateway::{ChargeOutcome, ChargeRequest, PaymentGateway};
use crate::payment::{Payment, PaymentMethod, PaymentStatus};

const SOURCE: &str = "payment-processor";

#[derive(Default)]
struct ProcessorState {
    payments: HashMap<PaymentId, Payment>,
    by_key: HashMap<String, PaymentId>,
    by_order: HashMap<OrderId, Vec<PaymentId>>,
}

/// Idempotent payment submission, lookup, and refund.
///
/// The idempotency check and the insertion of the `Processing` record
/// happen under one write guard, so a duplicate submission always
/// observes the first record instead of racing past the check. The
/// gateway is invoked at most once per idempotency key, ever.
pub struct PaymentProcessor<G: PaymentGateway> {
    gateway: G,
    bus: Arc<dyn EventPublisher>,
    gateway_timeout: Duration,
    state: Arc<RwLock<ProcessorState>>,
}

impl<G: PaymentGateway> PaymentProcessor<G> {
    /// Creates a processor with a bounded gateway timeout.
    pub fn new(gateway: G, bus: Arc<dyn EventPublisher>, gateway_timeout: Duration) -> Self {
        Self {
            gateway,
            bus,
            gateway_timeout,
            state: Arc::new(RwLock::new(ProcessorState::default())),
        }
    }

    /// Processes a payment for an order.
    ///
    /// If `idempotency_key` already has a record, that record is returned
    /// unchanged without touching the gateway — replay is not an error.
    /// Otherwise the gateway runs exactly once and the record transitions
    /// to `Completed` or `Failed`; a timed-out or ambiguous gateway
    /// response is `Failed` with a reason telling the caller to retry
    /// under a new key.
    #[tracing::instrument(skip(self, idempotency_key))]
    pub async fn process_payment(
        &self,
        user_id: UserId,
        order_id: OrderId,
        idempotency_key: &str,
        amount: Money,
        currency: &str,
        method: PaymentMethod,
    ) -> Result<Payment, PaymentError> {
        let payment = {
            let mut state = self.state.write().await;

            if let Some(existing_id) = state.by_key.get(idempotency_key) {
                let existing = state
                    .payments
                    .get(existing_id)
                    .cloned()
                    .ok_or_else(|| {
                        PaymentError::Inconsistency(format!(
                            "idempotency key '{idempotency_key}' points at missing payment"
                        ))
                    })?;
                if existing.order_id != order_id {
                    return Err(PaymentError::KeyAlreadyUsed {
                        key: idempotency_key.to_string(),
                        order_id: existing.order_id,
                    });
                }
                tracing::info!(payment_id = %existing.id, "idempotency replay, gateway not invoked");
                metrics::counter!("payments_idempotent_replays_total").increment(1);
                return Ok(existing);
            }

            let payment = Payment::processing(
                order_id,
                user_id,
                idempotency_key,
                amount,
                currency,
                method,
            );
            state.payments.insert(payment.id, payment.clone());
            state
                .by_key
                .insert(idempotency_key.to_string(), payment.id);
            state.by_order.entry(order_id).or_default().push(payment.id);
            payment
        };

        let request = ChargeRequest {
            payment_id: payment.id,
            order_id,
            user_id,
            amount,
            currency: currency.to_string(),
            method,
        };

        let outcome = tokio::time::timeout(self.gateway_timeout, self.gateway.charge(&request)).await;

        let payment = {
            let mut state = self.state.write().await;
            let record = state.payments.get_mut(&payment.id).ok_or_else(|| {
                PaymentError::Inconsistency(format!("payment {} vanished mid-charge", payment.id))
            })?;

            match outcome {
                Ok(ChargeOutcome::Approved { transaction_id }) => {
                    record.status = PaymentStatus::Completed;
                    record.transaction_id = Some(transaction_id);
                    record.processed_at = Some(Utc::now());
                }
                Ok(ChargeOutcome::Declined { reason }) => {
                    record.status = PaymentStatus::Failed;
                    record.failure_reason = Some(reason);
                }
                Err(_elapsed) => {
                    // Funds may or may not have been captured; the caller
                    // must retry under a fresh idempotency key.
                    record.status = PaymentStatus::Failed;
                    record.failure_reason = Some(format!(
                        "gateway timed out after {}ms; retry requires a new idempotency key",
                        self.gateway_timeout.as_millis()
                    ));
                }
            }
            record.clone()
        };

        match payment.status {
            PaymentStatus::Completed => {
                metrics::counter!("payments_completed_total").increment(1);
                tracing::info!(payment_id = %payment.id, transaction_id = ?payment.transaction_id, "payment completed");
                self.publish(topics::PAYMENT_COMPLETED, &payment).await;
            }
            PaymentStatus::Failed => {
                metrics::counter!("payments_failed_total").increment(1);
                tracing::warn!(payment_id = %payment.id, reason = ?payment.failure_reason, "payment failed");
                self.publish(topics::PAYMENT_FAILED, &payment).await;
            }
            _ => {}
        }

        Ok(payment)
    }

    /// Refunds a completed payment in full.
    ///
    /// Refunding anything but a `Completed` payment is a business-rule
    /// error, not a system fault.
    #[tracing::instrument(skip(self))]
    pub async fn refund(
        &self,
        payment_id: PaymentId,
        user_id: UserId,
    ) -> Result<Payment, PaymentError> {
        let payment = {
            let mut state = self.state.write().await;
            let record = state
                .payments
                .get_mut(&payment_id)
                .ok_or(PaymentError::PaymentNotFound(payment_id))?;

            if record.user_id != user_id {
                return Err(PaymentError::NotOwner {
                    payment_id,
                    user_id,
                });
            }

            if !record.status.can_refund() {
                return Err(PaymentError::RefundNotAllowed {
                    payment_id,
                    status: record.status,
                });
            }

            record.status = PaymentStatus::Refunded;
            record.refunded_at = Some(Utc::now());
            record.refund_amount = Some(record.amount);
            record.clone()
        };

        metrics::counter!("payments_refunded_total").increment(1);
        tracing::info!(%payment_id, amount = %payment.amount, "payment refunded");
        self.publish(topics::PAYMENT_REFUNDED, &payment).await;

        Ok(payment)
    }

    /// Returns a payment, checking ownership.
    pub async fn payment(
        &self,
        payment_id: PaymentId,
        user_id: UserId,
    ) -> Result<Payment, PaymentError> {
        let state = self.state.read().await;
        let payment = state
            .payments
            .get(&payment_id)
            .ok_or(PaymentError::PaymentNotFound(payment_id))?;
        if payment.user_id != user_id {
            return Err(PaymentError::NotOwner {
                payment_id,
                user_id,
            });
        }
        Ok(payment.clone())
    }

    /// Every payment attempted for an order, in submission order.
    pub async fn payments_for_order(&self, order_id: OrderId) -> Vec<Payment> {
        let state = self.state.read().await;
        state
            .by_order
            .get(&order_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.payments.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Looks up the payment bound to an idempotency key, if any.
    pub async fn payment_by_key(&self, idempotency_key: &str) -> Option<Payment> {
        let state = self.state.read().await;
        state
            .by_key
            .get(idempotency_key)
            .and_then(|id| state.payments.get(id).cloned())
    }

    async fn publish(&self, routing_key: &str, payment: &Payment) {
        let payload = PaymentEventPayload {
            payment_id: payment.id,
            order_id: payment.order_id,
            user_id: payment.user_id,
            amount: payment.amount,
            currency: payment.currency.clone(),
            status: payment.status.to_string(),
            transaction_id: payment.transaction_id.clone(),
            failure_reason: payment.failure_reason.clone(),
            refund_amount: payment.refund_amount,
        };

        let envelope = match EventEnvelope::new(
            routing_key,
            payment.id.as_uuid(),
            payment.order_id.as_uuid(),
            SOURCE,
            &payload,
        ) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(error = %e, routing_key, "failed to build payment event");
                return;
            }
        };

        if let Err(e) = self
            .bus
            .publish(topics::PAYMENT_EXCHANGE, routing_key, envelope)
            .await
        {
            tracing::warn!(error = %e, routing_key, "payment event publish failed");
        }
    }
}
