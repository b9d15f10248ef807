use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::errors::DomainError;
use crate::domain::order::{Order, OrderId};
use crate::errors::AppError;
use crate::handlers::payments::with_deadline;
use crate::AppState;

// ── Response DTOs ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub name: String,
    pub sku: String,
    pub quantity: u32,
    /// Decimal string, e.g. "9.99"
    pub total: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: u64,
    pub number: String,
    pub status: String,
    pub currency: String,
    pub total: String,
    pub payment_method: String,
    pub transaction_id: String,
    pub created_at: String,
    pub paid_at: Option<String>,
    pub items: Vec<OrderItemResponse>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            number: order.number,
            status: order.status.as_str().to_string(),
            total: order.total.to_store_format(),
            currency: order.currency,
            payment_method: order.payment_method,
            transaction_id: order.transaction_id,
            created_at: order.created_at.to_rfc3339(),
            paid_at: order.paid_at.map(|t| t.to_rfc3339()),
            items: order
                .line_items
                .into_iter()
                .map(|item| OrderItemResponse {
                    total: item.total.to_store_format(),
                    name: item.name,
                    sku: item.sku,
                    quantity: item.quantity,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderStatusResponse {
    pub order_id: String,
    pub status: String,
    pub is_paid: bool,
    pub can_be_processed: bool,
}

impl From<Order> for OrderStatusResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id.to_string(),
            status: order.status.as_str().to_string(),
            is_paid: order.is_payment_completed(),
            can_be_processed: order.can_be_processed(),
        }
    }
}

async fn fetch_source_order(state: &AppState, raw_id: &str) -> Result<Order, AppError> {
    let order_id = OrderId::parse(raw_id).map_err(|e| {
        log::warn!("rejected order id '{}': {}", raw_id, e);
        AppError::from(e)
    })?;

    with_deadline(
        state.config.server.request_timeout,
        state.source.fetch_order(order_id.as_str()),
    )
    .await
    .ok_or(AppError::Timeout)?
    .map_err(|e| AppError::from(DomainError::from(e)).for_environment(state.config.server.is_development()))
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /api/v1/order/{id}
///
/// Reads an order through from the source store.
#[utoipa::path(
    get,
    path = "/api/v1/order/{id}",
    params(("id" = String, Path, description = "Source order id")),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 400, description = "Invalid order id"),
        (status = 404, description = "Order not found"),
        (status = 408, description = "Request timed out"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let order = fetch_source_order(&state, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// GET /api/v1/status/{id}
#[utoipa::path(
    get,
    path = "/api/v1/status/{id}",
    params(("id" = String, Path, description = "Source order id")),
    responses(
        (status = 200, description = "Order status", body = OrderStatusResponse),
        (status = 400, description = "Invalid order id"),
        (status = 404, description = "Order not found"),
        (status = 408, description = "Request timed out"),
    ),
    tag = "orders"
)]
pub async fn get_order_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let order = fetch_source_order(&state, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(OrderStatusResponse::from(order)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{fixtures, OrderStatus};

    #[test]
    fn order_response_exposes_no_customer_details() {
        let response = OrderResponse::from(fixtures::order(123, OrderStatus::Pending, "19.99"));
        let body = serde_json::to_value(&response).unwrap();

        assert_eq!(body["total"], "19.99");
        assert_eq!(body["items"][1]["total"], "10.00");
        assert!(body.get("billing").is_none());
        assert!(!body.to_string().contains("jan@example.com"));
    }

    #[test]
    fn status_response_reflects_payability() {
        let pending = OrderStatusResponse::from(fixtures::order(1, OrderStatus::Pending, "5.00"));
        assert!(pending.can_be_processed);
        assert!(!pending.is_paid);

        let paid = OrderStatusResponse::from(fixtures::order(1, OrderStatus::OnHold, "5.00"));
        assert!(paid.is_paid);
        assert_eq!(paid.status, "on-hold");
    }
}
