pub mod api;
pub mod health;
pub mod payments;

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Payment Proxy API",
        description = "Redirects customers of a source store to an anonymized checkout on a processing store and relays the payment result back."
    ),
    paths(
        payments::redirect,
        payments::payment_return,
        payments::payment_cancel,
        payments::webhook,
        api::get_order,
        api::get_order_status,
        health::health,
    ),
    components(schemas(
        payments::WebhookResponse,
        api::OrderResponse,
        api::OrderItemResponse,
        api::OrderStatusResponse,
        health::HealthResponse,
    )),
    tags(
        (name = "payments", description = "Checkout redirect, provider callbacks and webhooks"),
        (name = "orders", description = "Read-through access to source store orders"),
        (name = "health", description = "Liveness and readiness checks"),
    )
)]
pub struct ApiDoc;
