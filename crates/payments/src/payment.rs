use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId, UserId};
use serde::{Deserialize, Serialize};

/// The state of a payment in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    /// Payment record created, gateway not yet invoked.
    #[default]
    Pending,

    /// Gateway call in flight.
    Processing,

    /// Funds captured (terminal unless refunded).
    Completed,

    /// Declined, timed out, or errored (terminal).
    Failed,

    /// A completed payment that was refunded (terminal state).
    Refunded,
}

impl PaymentStatus {
    /// Only completed payments can be refunded.
    pub fn can_refund(&self) -> bool {
        matches!(self, PaymentStatus::Completed)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Processing => "Processing",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Supported payment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Paypal,
    BankTransfer,
}

impl PaymentMethod {
    /// Returns the method name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "debit_card" => Ok(PaymentMethod::DebitCard),
            "paypal" => Ok(PaymentMethod::Paypal),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

/// A payment transaction record.
///
/// Exactly one payment exists per idempotency key, ever; retries of a
/// failed payment use a fresh key and produce a fresh record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub idempotency_key: String,
    pub amount: Money,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_amount: Option<Money>,
}

impl Payment {
    /// Creates a fresh record in `Processing`, ready for the gateway call.
    pub fn processing(
        order_id: OrderId,
        user_id: UserId,
        idempotency_key: impl Into<String>,
        amount: Money,
        currency: impl Into<String>,
        method: PaymentMethod,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            order_id,
            user_id,
            idempotency_key: idempotency_key.into(),
            amount,
            currency: currency.into(),
            method,
            status: PaymentStatus::Processing,
            transaction_id: None,
            failure_reason: None,
            created_at: Utc::now(),
            processed_at: None,
            refunded_at: None,
            refund_amount: None,
        }
    }
}
