use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::money::Money;
use super::order::OrderStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Created,
    Approved,
    Completed,
    Cancelled,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Created => "created",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order status a store order should move to once a payment reaches `status`.
impl From<PaymentStatus> for OrderStatus {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Completed => OrderStatus::Processing,
            PaymentStatus::Failed => OrderStatus::Failed,
            PaymentStatus::Cancelled => OrderStatus::Cancelled,
            PaymentStatus::Refunded => OrderStatus::Refunded,
            PaymentStatus::Pending | PaymentStatus::Created | PaymentStatus::Approved => {
                OrderStatus::Pending
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    PayPal,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::PayPal => "paypal",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            PaymentMethod::PayPal => "PayPal",
        }
    }
}

/// A payment attempt observed while handling one callback or webhook.
/// Records are transient and never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: String,
    pub provider_payment_id: String,
    pub payer_id: String,
    pub amount: Option<Money>,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub transaction_id: String,
    pub processed_at: DateTime<Utc>,
    /// Meta entries written onto the store order alongside the payment.
    pub metadata: BTreeMap<String, String>,
}

impl Payment {
    pub fn record(
        order_id: &str,
        provider_payment_id: &str,
        payer_id: &str,
        amount: Option<Money>,
        status: PaymentStatus,
    ) -> Self {
        let processed_at = Utc::now();
        let mut metadata = BTreeMap::from([
            ("_paypal_payment_id".to_string(), provider_payment_id.to_string()),
            ("_payment_completed_at".to_string(), processed_at.to_rfc3339()),
            ("_proxy_payment_processed".to_string(), "true".to_string()),
        ]);
        if !payer_id.is_empty() {
            metadata.insert("_paypal_payer_id".to_string(), payer_id.to_string());
        }

        Self {
            id: Uuid::new_v4(),
            order_id: order_id.to_string(),
            provider_payment_id: provider_payment_id.to_string(),
            payer_id: payer_id.to_string(),
            amount,
            status,
            method: PaymentMethod::PayPal,
            transaction_id: provider_payment_id.to_string(),
            processed_at,
            metadata,
        }
    }

    /// Overrides the transaction id when a better one is known; blank values are ignored.
    pub fn with_transaction_id(mut self, transaction_id: &str) -> Self {
        if !transaction_id.is_empty() {
            self.transaction_id = transaction_id.to_string();
        }
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self.status,
            PaymentStatus::Completed
                | PaymentStatus::Failed
                | PaymentStatus::Cancelled
                | PaymentStatus::Refunded
        )
    }
}
