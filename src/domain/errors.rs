use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("cannot combine amounts in different currencies: {left} and {right}")]
    CurrencyMismatch { left: String, right: String },
    #[error("malformed amount: '{0}'")]
    Malformed(String),
    #[error("negative amount: {0}")]
    Negative(String),
}

/// Failures reported by an order store (REST API) client.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order {0} not found")]
    NotFound(String),
    #[error("store API returned status {status}")]
    Api { status: u16, body: String },
    #[error("store request failed: {0}")]
    Transport(String),
    #[error("could not decode store response: {0}")]
    Decode(String),
}

impl StoreError {
    /// Diagnostic detail that is logged but only shown to callers in development.
    pub fn detail(&self) -> String {
        match self {
            StoreError::Api { status, body } => format!("status {status}: {body}"),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,
    #[error("signature header malformed")]
    Malformed,
    #[error("signature does not match payload")]
    Mismatch,
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Order not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Order {order_id} cannot be paid: {reason}")]
    NotPayable { order_id: String, reason: String },
    #[error(
        "Order {order_id}: processing store total {actual} does not match source total {expected}"
    )]
    AmountMismatch {
        order_id: String,
        expected: String,
        actual: String,
    },
    #[error(transparent)]
    Money(#[from] MoneyError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => DomainError::NotFound(id),
            other => DomainError::Store(other),
        }
    }
}
