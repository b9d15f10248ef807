pub mod application;
pub mod config;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod middleware;

use std::sync::Arc;
use std::time::Instant;

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::middleware::{from_fn, DefaultHeaders, Logger};
use actix_web::{web, App, HttpServer};

use application::payment_service::PaymentService;
use config::Config;
use domain::errors::StoreError;
use domain::ports::{OrderStore, WebhookVerifier};
use infrastructure::signature::{HmacSignatureVerifier, UnsignedVerifier};
use infrastructure::url_builder::UrlBuilder;
use infrastructure::woocommerce::WooCommerceClient;
use middleware::IpRateLimiter;

/// Everything a request handler needs, built once at startup.
pub struct AppState {
    pub config: Arc<Config>,
    pub payments: Arc<PaymentService>,
    pub source: Arc<dyn OrderStore>,
    pub verifier: Arc<dyn WebhookVerifier>,
    /// Present in production only.
    pub rate_limiter: Option<Arc<IpRateLimiter>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Config,
        source: Arc<dyn OrderStore>,
        processing: Arc<dyn OrderStore>,
        verifier: Arc<dyn WebhookVerifier>,
    ) -> Self {
        let payments = PaymentService::new(
            source.clone(),
            processing,
            UrlBuilder::new(config.checkout_base()),
            config.return_urls.clone(),
        );
        let rate_limiter = config
            .server
            .is_production()
            .then(|| Arc::new(IpRateLimiter::new(config.rate_limit)));
        Self {
            config: Arc::new(config),
            payments: Arc::new(payments),
            source,
            verifier,
            rate_limiter,
            started_at: Instant::now(),
        }
    }

    /// Wires the WooCommerce clients and the webhook verifier from `config`.
    pub fn from_config(config: Config) -> Result<Self, StoreError> {
        let source = WooCommerceClient::new(config.source.clone(), "source")?;
        let processing = WooCommerceClient::new(config.processing.clone(), "processing")?;

        let verifier: Arc<dyn WebhookVerifier> = match &config.webhook.secret {
            Some(secret) => Arc::new(HmacSignatureVerifier::new(secret)),
            None => {
                log::warn!(
                    "WEBHOOK_SECRET is not set; webhooks will be accepted unsigned ({})",
                    config.server.environment.as_str()
                );
                Arc::new(UnsignedVerifier)
            }
        };

        Ok(Self::new(
            config,
            Arc::new(source),
            Arc::new(processing),
            verifier,
        ))
    }
}

/// Route table, shared by the server and the in-process tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    use handlers::{api, health, payments};

    cfg.route("/health", web::get().to(health::health))
        .route("/ping", web::get().to(health::health))
        .route("/ready", web::get().to(health::health))
        .route("/live", web::get().to(health::health))
        .route("/redirect", web::get().to(payments::redirect))
        .route("/paypal", web::get().to(payments::redirect))
        .route("/paypal-return", web::get().to(payments::payment_return))
        .route("/paypal-cancel", web::get().to(payments::payment_cancel))
        .route("/webhook", web::post().to(payments::webhook))
        .route("/paypal-webhook", web::post().to(payments::webhook))
        .route("/api-docs/openapi.json", web::get().to(health::openapi))
        .service(
            web::scope("/api/v1")
                .route("/health", web::get().to(health::health))
                .route("/order/{id}", web::get().to(api::get_order))
                .route("/order/{id}/status", web::get().to(api::get_order_status))
                .route("/status/{id}", web::get().to(api::get_order_status)),
        );
}

pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Frame-Options", "DENY"))
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"))
}

/// The full application: routes plus rate limiting, CORS, security headers
/// and access logging. Used by the server and the in-process tests.
pub fn app(
    state: web::Data<AppState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let cors = middleware::cors(&state.config.cors);
    App::new()
        .app_data(state)
        .wrap(from_fn(middleware::rate_limit))
        .wrap(cors)
        .wrap(security_headers())
        .wrap(Logger::default())
        .configure(configure)
}

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    state: AppState,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    let state = web::Data::new(state);
    Ok(HttpServer::new(move || app(state.clone()))
    .bind((host.to_string(), port))?
    .run())
}
