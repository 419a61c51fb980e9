use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{Money, OrderId, PaymentId, UserId};
use tokio::sync::RwLock;

use crate::payment::PaymentMethod;

/// A charge request as sent to the gateway.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub method: PaymentMethod,
}

/// The gateway's answer to a charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// Funds captured; the gateway assigned a transaction id.
    Approved { transaction_id: String },

    /// The charge was rejected.
    Declined { reason: String },
}

/// External payment gateway.
///
/// The processor wraps every call in a bounded timeout; a gateway that
/// hangs is indistinguishable from one that captured funds, which is why
/// timeouts surface as failures that demand a fresh idempotency key.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Attempts to capture funds for one charge request.
    async fn charge(&self, request: &ChargeRequest) -> ChargeOutcome;
}

/// Behavior of the simulated gateway for the next charges.
#[derive(Debug, Clone)]
pub enum GatewayMode {
    /// Approve every charge.
    Approve,

    /// Decline every charge with the given reason.
    Decline(String),

    /// Sleep past the processor's timeout before answering.
    Hang(Duration),
}

/// Deterministic stand-in for a real payment gateway.
#[derive(Clone)]
pub struct SimulatedGateway {
    mode: Arc<RwLock<GatewayMode>>,
    calls: Arc<AtomicU64>,
    sequence: Arc<AtomicU64>,
}

impl SimulatedGateway {
    /// Creates a gateway that approves everything.
    pub fn new() -> Self {
        Self {
            mode: Arc::new(RwLock::new(GatewayMode::Approve)),
            calls: Arc::new(AtomicU64::new(0)),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Switches the behavior for subsequent charges.
    pub async fn set_mode(&self, mode: GatewayMode) {
        *self.mode.write().await = mode;
    }

    /// Total number of charge invocations so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, _request: &ChargeRequest) -> ChargeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mode = self.mode.read().await.clone();
        match mode {
            GatewayMode::Approve => {
                let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                ChargeOutcome::Approved {
                    transaction_id: format!("TXN-{seq:08}"),
                }
            }
            GatewayMode::Decline(reason) => ChargeOutcome::Declined { reason },
            GatewayMode::Hang(duration) => {
                tokio::time::sleep(duration).await;
                let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                ChargeOutcome::Approved {
                    transaction_id: format!("TXN-{seq:08}"),
                }
            }
        }
    }
}
