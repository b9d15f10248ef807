use async_trait::async_trait;

use super::errors::{SignatureError, StoreError};
use super::order::{Order, OrderStatus};
use super::payment::Payment;

/// A WooCommerce-compatible order REST API.
#[async_trait]
pub trait OrderStore: Send + Sync + 'static {
    async fn fetch_order(&self, order_id: &str) -> Result<Order, StoreError>;
    async fn create_order(&self, order: &Order) -> Result<Order, StoreError>;
    async fn update_order_status(&self, order_id: &str, status: OrderStatus)
        -> Result<(), StoreError>;
    async fn update_order_payment(&self, order_id: &str, payment: &Payment)
        -> Result<(), StoreError>;
}

/// Authenticates the raw body of an inbound webhook.
pub trait WebhookVerifier: Send + Sync + 'static {
    fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), SignatureError>;
}
