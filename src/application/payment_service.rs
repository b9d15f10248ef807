use std::fmt;
use std::sync::Arc;

use crate::config::ReturnUrls;
use crate::domain::errors::DomainError;
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::OrderStore;
use crate::domain::webhook::{CaptureResource, WebhookEnvelope, WebhookEvent};
use crate::infrastructure::order_locks::OrderLocks;
use crate::infrastructure::url_builder::{with_query, UrlBuilder};

/// Status value the proxy puts on its own return callback.
const RETURN_STATUS: &str = "success";

pub struct RedirectRequest {
    pub order_id: OrderId,
    /// Origin the provider should send the customer back to, e.g. `https://proxy.example`.
    pub callback_base: String,
}

pub struct ReturnRequest {
    pub order_id: OrderId,
    pub proxy_order_id: Option<OrderId>,
    pub payment_id: Option<String>,
    pub payer_id: Option<String>,
    /// Provider transaction id, preferred over `payment_id` when recording the payment.
    pub transaction_id: Option<String>,
    pub status: Option<String>,
}

pub struct CancelRequest {
    pub order_id: OrderId,
    pub proxy_order_id: Option<OrderId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookStatus {
    Processed,
    Ignored,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookStatus::Processed => "processed",
            WebhookStatus::Ignored => "ignored",
        }
    }
}

impl fmt::Display for WebhookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookOutcome {
    pub status: WebhookStatus,
    pub message: String,
}

impl WebhookOutcome {
    fn processed(message: impl Into<String>) -> Self {
        Self {
            status: WebhookStatus::Processed,
            message: message.into(),
        }
    }

    fn ignored(message: impl Into<String>) -> Self {
        Self {
            status: WebhookStatus::Ignored,
            message: message.into(),
        }
    }
}

/// Sequences the redirect, return, cancel and webhook flows between the
/// source store and the processing store.
pub struct PaymentService {
    source: Arc<dyn OrderStore>,
    processing: Arc<dyn OrderStore>,
    urls: UrlBuilder,
    return_urls: ReturnUrls,
    locks: OrderLocks,
}

impl PaymentService {
    pub fn new(
        source: Arc<dyn OrderStore>,
        processing: Arc<dyn OrderStore>,
        urls: UrlBuilder,
        return_urls: ReturnUrls,
    ) -> Self {
        Self {
            source,
            processing,
            urls,
            return_urls,
            locks: OrderLocks::new(),
        }
    }

    /// Mirrors the source order onto the processing store and returns the
    /// checkout URL the customer should be sent to.
    pub async fn redirect(&self, request: RedirectRequest) -> Result<String, DomainError> {
        let order_id = request.order_id.as_str();
        let _guard = self.locks.acquire(order_id).await;

        let order = self.source.fetch_order(order_id).await?;
        if order.is_payment_completed() {
            log::info!(
                "order {} already paid (status {}), skipping checkout",
                order_id,
                order.status
            );
            return Ok(with_query(
                &self.return_urls.success,
                &[("order", order_id), ("already_paid", "1")],
            ));
        }
        order.validate_for_payment()?;
        match order.items_total() {
            Ok(sum) if sum != order.total => log::warn!(
                "order {} lines add up to {} but its total is {}",
                order_id,
                sum,
                order.total
            ),
            Ok(_) => {}
            Err(e) => log::warn!("order {} lines cannot be summed: {}", order_id, e),
        }

        let proxy = self.processing.create_order(&order.to_proxy_order()).await?;
        let proxy_id = proxy.id.to_string();
        if proxy.total != order.total {
            log::error!(
                "processing order {} totals {} but order {} totals {}, aborting checkout",
                proxy_id,
                proxy.total,
                order_id,
                order.total
            );
            if let Err(e) = self
                .processing
                .update_order_status(&proxy_id, OrderStatus::Cancelled)
                .await
            {
                log::warn!(
                    "mismatched processing order {} could not be cancelled: {}",
                    proxy_id,
                    e.detail()
                );
            }
            return Err(DomainError::AmountMismatch {
                order_id: order_id.to_string(),
                expected: order.total.to_string(),
                actual: proxy.total.to_string(),
            });
        }

        let return_url =
            self.urls
                .return_url(&request.callback_base, order_id, &proxy_id, RETURN_STATUS);
        let cancel_url = self.urls.cancel_url(&request.callback_base, order_id);
        let checkout_url = self.urls.checkout_url(&proxy, &return_url, &cancel_url);

        log::info!(
            "order {} mirrored as processing order {} ({})",
            order_id,
            proxy_id,
            order.total
        );
        Ok(checkout_url)
    }

    /// Resolves the provider's success callback to a customer-facing URL.
    /// Never fails: every outcome is a redirect.
    pub async fn handle_return(&self, request: ReturnRequest) -> String {
        let order_id = request.order_id.as_str();
        log::info!(
            "payment return for order {} (processing order {:?}, payment {:?}, status {:?})",
            order_id,
            request.proxy_order_id.as_ref().map(OrderId::as_str),
            request.payment_id,
            request.status
        );

        if let Some(proxy) = self.confirmed_proxy_order(&request).await {
            let payment = Payment::record(
                order_id,
                request.payment_id.as_deref().unwrap_or_default(),
                request.payer_id.as_deref().unwrap_or_default(),
                Some(proxy.total.clone()),
                PaymentStatus::Completed,
            )
            .with_transaction_id(&proxy.transaction_id);

            if let Err(e) = self.source.update_order_payment(order_id, &payment).await {
                log::error!(
                    "payment confirmed but order {} could not be updated: {}",
                    order_id,
                    e.detail()
                );
            }
            return with_query(
                &self.return_urls.success,
                &[("order", order_id), ("payment", "confirmed")],
            );
        }

        let payment_id = request.payment_id.as_deref().unwrap_or_default();
        let payer_id = request.payer_id.as_deref().unwrap_or_default();
        if !payment_id.is_empty() || !payer_id.is_empty() {
            let payment = Payment::record(
                order_id,
                payment_id,
                payer_id,
                None,
                PaymentStatus::Completed,
            )
            .with_transaction_id(request.transaction_id.as_deref().unwrap_or_default());
            match self.source.update_order_payment(order_id, &payment).await {
                Ok(()) => {
                    log::info!(
                        "order {} marked paid from callback parameters (payment {})",
                        order_id,
                        payment_id
                    );
                    return with_query(
                        &self.return_urls.success,
                        &[("order", order_id), ("payment", "success")],
                    );
                }
                Err(e) => log::error!(
                    "order {} could not be updated from callback parameters: {}",
                    order_id,
                    e.detail()
                ),
            }
        }

        log::warn!("could not verify payment for order {}", order_id);
        self.error_url(Some(order_id), "payment_verification_failed")
    }

    async fn confirmed_proxy_order(&self, request: &ReturnRequest) -> Option<Order> {
        let proxy_id = request.proxy_order_id.as_ref()?;
        match self.processing.fetch_order(proxy_id.as_str()).await {
            Ok(proxy) if proxy.mirrored_from().as_deref() != Some(request.order_id.as_str()) => {
                log::warn!(
                    "processing order {} mirrors order {:?}, not {}; ignoring it",
                    proxy_id,
                    proxy.mirrored_from(),
                    request.order_id
                );
                None
            }
            Ok(proxy) if proxy.is_payment_completed() => Some(proxy),
            Ok(proxy) => {
                log::info!(
                    "processing order {} not paid yet (status {})",
                    proxy_id,
                    proxy.status
                );
                None
            }
            Err(e) => {
                log::warn!(
                    "could not check processing order {}: {}",
                    proxy_id,
                    e.detail()
                );
                None
            }
        }
    }

    /// Marks the source order cancelled, best effort, and returns the cancel page.
    pub async fn cancel(&self, request: CancelRequest) -> String {
        let order_id = request.order_id.as_str();
        let payment = Payment::record(order_id, "", "", None, PaymentStatus::Cancelled);
        log::info!(
            "payment {} cancelled for order {} (processing order {:?})",
            payment.id,
            order_id,
            request.proxy_order_id.as_ref().map(OrderId::as_str)
        );

        if let Err(e) = self
            .source
            .update_order_status(order_id, OrderStatus::from(payment.status))
            .await
        {
            log::error!("order {} could not be cancelled: {}", order_id, e.detail());
        }
        self.cancel_url(Some(order_id))
    }

    pub async fn handle_webhook(
        &self,
        envelope: WebhookEnvelope,
    ) -> Result<WebhookOutcome, DomainError> {
        let webhook_id = envelope.id.clone();
        let event = WebhookEvent::from_envelope(envelope)?;
        log::info!("webhook {} received: {}", webhook_id, event.event_type());

        match event {
            WebhookEvent::CaptureCompleted(resource) => self.capture_completed(resource).await,
            WebhookEvent::CaptureDenied(resource) => {
                self.mark_order(resource, PaymentStatus::Failed, "Payment capture denied processed")
                    .await
            }
            WebhookEvent::CaptureRefunded(resource) => {
                self.mark_order(
                    resource,
                    PaymentStatus::Refunded,
                    "Payment capture refunded processed",
                )
                .await
            }
            WebhookEvent::Unrecognized { event_type, .. } => {
                log::info!("webhook {} ignored: unhandled event {}", webhook_id, event_type);
                Ok(WebhookOutcome::ignored(format!(
                    "Event type {event_type} not handled"
                )))
            }
        }
    }

    async fn capture_completed(
        &self,
        resource: CaptureResource,
    ) -> Result<WebhookOutcome, DomainError> {
        if resource.payment_id().is_empty() {
            return Err(DomainError::InvalidInput(
                "capture id missing from webhook resource".to_string(),
            ));
        }
        let order_id = resource.order_id().ok_or_else(|| {
            DomainError::InvalidInput("order id missing from webhook resource".to_string())
        })?;
        let order_id = OrderId::parse(order_id)?;
        let amount = resource.amount()?;

        let payment = Payment::record(
            order_id.as_str(),
            resource.payment_id(),
            "",
            amount,
            PaymentStatus::Completed,
        );
        self.source
            .update_order_payment(order_id.as_str(), &payment)
            .await?;

        log::info!(
            "capture {} recorded on order {}{}",
            resource.payment_id(),
            order_id,
            payment
                .amount
                .as_ref()
                .map(|a| format!(" ({a})"))
                .unwrap_or_default()
        );
        Ok(WebhookOutcome::processed(
            "Payment capture completed processed successfully",
        ))
    }

    async fn mark_order(
        &self,
        resource: CaptureResource,
        outcome: PaymentStatus,
        message: &str,
    ) -> Result<WebhookOutcome, DomainError> {
        let Some(order_id) = resource.order_id() else {
            log::warn!(
                "{} webhook for capture {} carries no order id",
                outcome,
                resource.payment_id()
            );
            return Ok(WebhookOutcome::ignored("No order id in webhook resource"));
        };
        let order_id = OrderId::parse(order_id)?;

        self.source
            .update_order_status(order_id.as_str(), OrderStatus::from(outcome))
            .await?;
        Ok(WebhookOutcome::processed(message))
    }

    /// Customer-facing error page, tagged with `marker`.
    pub fn error_url(&self, order_id: Option<&str>, marker: &str) -> String {
        match order_id {
            Some(order_id) => with_query(
                &self.return_urls.error,
                &[("order", order_id), ("error", marker)],
            ),
            None => with_query(&self.return_urls.error, &[("error", marker)]),
        }
    }

    pub fn cancel_url(&self, order_id: Option<&str>) -> String {
        match order_id {
            Some(order_id) => with_query(
                &self.return_urls.cancel,
                &[("order", order_id), ("payment", "cancelled")],
            ),
            None => with_query(&self.return_urls.cancel, &[("payment", "cancelled")]),
        }
    }
}
