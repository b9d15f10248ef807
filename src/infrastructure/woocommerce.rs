use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::StoreConfig;
use crate::domain::errors::StoreError;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::payment::Payment;
use crate::domain::ports::OrderStore;

use super::models::{NewWcOrder, WcOrderRow, WcPaymentUpdate, WcStatusUpdate};

const API_PREFIX: &str = "wp-json/wc/v3";

/// REST client for one WooCommerce store, authenticated with consumer
/// key/secret over HTTP basic auth.
#[derive(Clone)]
pub struct WooCommerceClient {
    client: reqwest::Client,
    config: StoreConfig,
    label: &'static str,
}

impl WooCommerceClient {
    /// `label` names the store in log lines ("source", "processing").
    pub fn new(config: StoreConfig, label: &'static str) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("payment-proxy/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            config,
            label,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.config.base_url, API_PREFIX, path)
    }

    /// Sends a request, retrying transport failures and 5xx responses with a
    /// linear backoff. Anything else is returned on the first attempt.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        order_id: &str,
        body: Option<&Value>,
    ) -> Result<T, StoreError> {
        let attempts = self.config.retry_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.send_once(method.clone(), path, order_id, body).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && is_retryable(&e) => {
                    let delay = self.config.retry_base_delay * attempt;
                    log::warn!(
                        "{} store {} {} failed: {} (attempt {}/{}), retrying in {:?}",
                        self.label,
                        method,
                        path,
                        e,
                        attempt,
                        attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    log::error!(
                        "{} store {} {} failed after {} attempt(s): {}",
                        self.label,
                        method,
                        path,
                        attempt,
                        e.detail()
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        order_id: &str,
        body: Option<&Value>,
    ) -> Result<T, StoreError> {
        let mut request = self
            .client
            .request(method, self.endpoint(path))
            .header(ACCEPT, "application/json")
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(order_id.to_string()));
        }
        if !status.is_success() {
            return Err(StoreError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

fn is_retryable(error: &StoreError) -> bool {
    match error {
        StoreError::Transport(_) => true,
        StoreError::Api { status, .. } => *status >= 500,
        StoreError::NotFound(_) | StoreError::Decode(_) => false,
    }
}

fn to_body<T: serde::Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Decode(e.to_string()))
}

#[async_trait]
impl OrderStore for WooCommerceClient {
    async fn fetch_order(&self, order_id: &str) -> Result<Order, StoreError> {
        log::debug!("fetching order {} from {} store", order_id, self.label);
        let row: WcOrderRow = self
            .request(Method::GET, &format!("orders/{order_id}"), order_id, None)
            .await?;
        row.into_domain()
    }

    async fn create_order(&self, order: &Order) -> Result<Order, StoreError> {
        let body = to_body(&NewWcOrder::from(order))?;
        let row: WcOrderRow = self
            .request(Method::POST, "orders", &order.number, Some(&body))
            .await?;
        let created = row.into_domain()?;
        log::info!(
            "created order {} on {} store for order number {}",
            created.id,
            self.label,
            created.number
        );
        Ok(created)
    }

    async fn update_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        let body = to_body(&WcStatusUpdate {
            status: status.as_str(),
        })?;
        let _: Value = self
            .request(Method::PUT, &format!("orders/{order_id}"), order_id, Some(&body))
            .await?;
        log::info!("{} store order {} set to {}", self.label, order_id, status);
        Ok(())
    }

    async fn update_order_payment(
        &self,
        order_id: &str,
        payment: &Payment,
    ) -> Result<(), StoreError> {
        let body = to_body(&WcPaymentUpdate::from(payment))?;
        let _: Value = self
            .request(Method::PUT, &format!("orders/{order_id}"), order_id, Some(&body))
            .await?;
        log::info!(
            "{} store order {} recorded payment {} ({})",
            self.label,
            order_id,
            payment.transaction_id,
            payment.status
        );
        Ok(())
    }
}
