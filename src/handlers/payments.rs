use std::future::Future;
use std::time::Duration;

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::application::payment_service::{
    CancelRequest, RedirectRequest, ReturnRequest, WebhookOutcome,
};
use crate::domain::order::OrderId;
use crate::domain::webhook::WebhookEnvelope;
use crate::errors::AppError;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "X-PayPal-Transmission-Sig";
pub const FALLBACK_SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

const RETURN_STATUSES: [&str; 5] = ["approved", "completed", "cancelled", "failed", "success"];

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RedirectQuery {
    /// Source order id, 1-50 alphanumeric characters.
    #[serde(rename = "orderId", alias = "order_id")]
    pub order_id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReturnQuery {
    pub order_id: Option<String>,
    /// Order id on the processing store.
    pub oitam_order_id: Option<String>,
    #[serde(rename = "paymentId")]
    pub payment_id: Option<String>,
    #[serde(rename = "PayerID")]
    pub payer_id: Option<String>,
    /// Provider transaction id, when the provider sends one.
    pub transaction_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CancelQuery {
    pub order_id: Option<String>,
    pub oitam_order_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookResponse {
    pub status: String,
    pub message: String,
}

impl From<WebhookOutcome> for WebhookResponse {
    fn from(outcome: WebhookOutcome) -> Self {
        Self {
            status: outcome.status.as_str().to_string(),
            message: outcome.message,
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn found(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_order_id(raw: &str) -> Result<OrderId, AppError> {
    OrderId::parse(raw).map_err(|e| {
        log::warn!("rejected order id '{}': {}", raw, e);
        AppError::from(e)
    })
}

/// Runs `fut` under the configured request deadline.
pub(crate) async fn with_deadline<F: Future>(limit: Duration, fut: F) -> Option<F::Output> {
    tokio::time::timeout(limit, fut).await.ok()
}

/// Origin of the proxy as seen by the customer's browser.
fn callback_base(state: &AppState, req: &HttpRequest) -> String {
    match &state.config.server.public_base_url {
        Some(base) => base.trim_end_matches('/').to_string(),
        None => format!("https://{}", req.connection_info().host()),
    }
}

/// Blank referrers pass. Otherwise the referrer's host, without port or a
/// leading `www.`, must be on the allowlist.
fn referrer_allowed(referrer: &str, allowed: &[String]) -> bool {
    let referrer = referrer.trim();
    if referrer.is_empty() {
        return true;
    }
    let rest = referrer
        .strip_prefix("https://")
        .or_else(|| referrer.strip_prefix("http://"))
        .unwrap_or(referrer);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = host.split(':').next().unwrap_or_default().to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    allowed.iter().any(|domain| {
        let domain = domain.trim().to_ascii_lowercase();
        domain.strip_prefix("www.").unwrap_or(&domain) == host
    })
}

fn is_valid_payment_id(value: &str) -> bool {
    (1..=100).contains(&value.len())
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_valid_payer_id(value: &str) -> bool {
    (1..=50).contains(&value.len()) && value.chars().all(|c| c.is_ascii_alphanumeric())
}

fn parse_return_query(query: ReturnQuery) -> Result<ReturnRequest, &'static str> {
    let order_id = non_blank(query.order_id).ok_or("missing_order_id")?;
    let order_id = OrderId::parse(&order_id).map_err(|_| "invalid_return_parameters")?;

    let proxy_order_id = non_blank(query.oitam_order_id)
        .map(|id| OrderId::parse(&id))
        .transpose()
        .map_err(|_| "invalid_return_parameters")?;
    let payment_id = non_blank(query.payment_id);
    let payer_id = non_blank(query.payer_id);
    let transaction_id = non_blank(query.transaction_id);
    let status = non_blank(query.status);

    if payment_id.as_deref().is_some_and(|v| !is_valid_payment_id(v))
        || transaction_id.as_deref().is_some_and(|v| !is_valid_payment_id(v))
        || payer_id.as_deref().is_some_and(|v| !is_valid_payer_id(v))
        || status
            .as_deref()
            .is_some_and(|v| !RETURN_STATUSES.contains(&v))
    {
        return Err("invalid_return_parameters");
    }

    Ok(ReturnRequest {
        order_id,
        proxy_order_id,
        payment_id,
        payer_id,
        transaction_id,
        status,
    })
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /redirect
///
/// Mirrors the source order onto the processing store and sends the customer
/// to its pay-for-order page. Orders that are already paid go straight to the
/// success page without creating anything.
#[utoipa::path(
    get,
    path = "/redirect",
    params(RedirectQuery),
    responses(
        (status = 302, description = "Redirect to the processing store checkout"),
        (status = 400, description = "Missing or invalid order id, or order not payable"),
        (status = 403, description = "Referrer not on the allowlist"),
        (status = 404, description = "Order not found on the source store"),
        (status = 408, description = "Request timed out"),
        (status = 429, description = "Rate limit exceeded (production)"),
        (status = 500, description = "Store API failure"),
    ),
    tag = "payments"
)]
pub async fn redirect(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<RedirectQuery>,
) -> Result<HttpResponse, AppError> {
    let referrer = req
        .headers()
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !referrer_allowed(referrer, &state.config.allowed_referrers) {
        log::warn!("redirect refused for referrer '{}'", referrer);
        return Err(AppError::Forbidden("Invalid referrer".to_string()));
    }

    let raw = non_blank(query.into_inner().order_id)
        .ok_or_else(|| AppError::BadRequest("orderId is required".to_string()))?;
    let order_id = parse_order_id(&raw)?;

    let request = RedirectRequest {
        order_id,
        callback_base: callback_base(&state, &req),
    };
    let location = with_deadline(
        state.config.server.request_timeout,
        state.payments.redirect(request),
    )
    .await
    .ok_or_else(|| {
        log::warn!("redirect for order {} timed out", raw);
        AppError::Timeout
    })?
    .map_err(|e| AppError::from(e).for_environment(state.config.server.is_development()))?;

    Ok(found(&location))
}

/// GET /paypal-return
///
/// Success callback from the payment provider. Always answers with a
/// redirect: the success page when payment is confirmed, the error page
/// otherwise.
#[utoipa::path(
    get,
    path = "/paypal-return",
    params(ReturnQuery),
    responses(
        (status = 302, description = "Redirect to the success or error page"),
    ),
    tag = "payments"
)]
pub async fn payment_return(
    state: web::Data<AppState>,
    query: web::Query<ReturnQuery>,
) -> HttpResponse {
    let request = match parse_return_query(query.into_inner()) {
        Ok(request) => request,
        Err(marker) => {
            log::warn!("rejected payment return: {}", marker);
            return found(&state.payments.error_url(None, marker));
        }
    };

    let order_id = request.order_id.clone();
    match with_deadline(
        state.config.server.request_timeout,
        state.payments.handle_return(request),
    )
    .await
    {
        Some(location) => found(&location),
        None => {
            log::warn!("payment return for order {} timed out", order_id);
            found(
                &state
                    .payments
                    .error_url(Some(order_id.as_str()), "payment_verification_failed"),
            )
        }
    }
}

/// GET /paypal-cancel
///
/// Cancel callback from the payment provider. Always redirects to the cancel
/// page, whether or not the source order could be updated.
#[utoipa::path(
    get,
    path = "/paypal-cancel",
    params(CancelQuery),
    responses(
        (status = 302, description = "Redirect to the cancel page"),
    ),
    tag = "payments"
)]
pub async fn payment_cancel(
    state: web::Data<AppState>,
    query: web::Query<CancelQuery>,
) -> HttpResponse {
    let query = query.into_inner();
    let order_id = match non_blank(query.order_id).map(|id| OrderId::parse(&id)) {
        Some(Ok(order_id)) => order_id,
        Some(Err(e)) => {
            log::warn!("payment cancel with invalid order id: {}", e);
            return found(&state.payments.cancel_url(None));
        }
        None => return found(&state.payments.cancel_url(None)),
    };
    let proxy_order_id = non_blank(query.oitam_order_id).and_then(|id| OrderId::parse(&id).ok());

    let fallback = state.payments.cancel_url(Some(order_id.as_str()));
    let request = CancelRequest {
        order_id,
        proxy_order_id,
    };
    match with_deadline(
        state.config.server.request_timeout,
        state.payments.cancel(request),
    )
    .await
    {
        Some(location) => found(&location),
        None => {
            log::warn!("payment cancel timed out, redirecting anyway");
            found(&fallback)
        }
    }
}

/// POST /webhook
///
/// Asynchronous notification from the payment provider. The raw body is
/// authenticated before it is parsed.
#[utoipa::path(
    post,
    path = "/webhook",
    request_body(content = String, description = "Provider event: {id, event_type, resource}", content_type = "application/json"),
    responses(
        (status = 200, description = "Event processed or ignored", body = WebhookResponse),
        (status = 400, description = "Malformed event"),
        (status = 401, description = "Missing or invalid signature"),
        (status = 408, description = "Request timed out"),
        (status = 415, description = "Body is not JSON"),
        (status = 429, description = "Rate limit exceeded (production)"),
        (status = 500, description = "Store update failed; the provider should retry"),
    ),
    tag = "payments"
)]
pub async fn webhook(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.contains("application/json") {
        return Err(AppError::UnsupportedMediaType(
            "Content-Type must be application/json".to_string(),
        ));
    }

    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .or_else(|| req.headers().get(FALLBACK_SIGNATURE_HEADER))
        .and_then(|v| v.to_str().ok());

    state.verifier.verify(&body, signature).map_err(|e| {
        log::warn!(
            "webhook rejected from {}: {}",
            req.connection_info().realip_remote_addr().unwrap_or("unknown"),
            e
        );
        AppError::from(e)
    })?;

    let envelope: WebhookEnvelope = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid webhook body: {e}")))?;

    let outcome = with_deadline(
        state.config.server.request_timeout,
        state.payments.handle_webhook(envelope),
    )
    .await
    .ok_or(AppError::Timeout)?
    .map_err(|e| AppError::from(e).for_environment(state.config.server.is_development()))?;

    Ok(HttpResponse::Ok().json(WebhookResponse::from(outcome)))
}
