//! Cross-cutting request guards wrapped around every route.

use std::net::IpAddr;

use actix_cors::Cors;
use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::Next;
use actix_web::{web, Error, ResponseError};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::config::{CorsConfig, RateLimitConfig};
use crate::errors::AppError;
use crate::AppState;

/// Token bucket per client IP.
pub struct IpRateLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
}

impl IpRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let quota = Quota::per_second(config.per_second).allow_burst(config.burst);
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    /// `Err(seconds)` until the client may retry, rounded up to at least 1.
    pub fn check(&self, client: &str) -> Result<(), u64> {
        self.limiter.check_key(&client.to_string()).map_err(|not_until| {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            (wait.as_secs() + u64::from(wait.subsec_nanos() > 0)).max(1)
        })?;
        Ok(())
    }
}

/// Client key: the forwarded or peer IP, with any port dropped.
fn client_key(req: &ServiceRequest) -> String {
    let info = req.connection_info();
    let addr = info.realip_remote_addr().unwrap_or("unknown");
    match addr.parse::<IpAddr>() {
        Ok(ip) => ip.to_string(),
        Err(_) => addr
            .rsplit_once(':')
            .map_or(addr, |(host, _)| host)
            .trim_matches(['[', ']'])
            .to_string(),
    }
}

/// Rejects clients over budget with 429 and `Retry-After`. A no-op when the
/// state carries no limiter.
pub async fn rate_limit<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error>
where
    B: MessageBody + 'static,
{
    let limiter = req
        .app_data::<web::Data<AppState>>()
        .and_then(|state| state.rate_limiter.clone());

    if let Some(limiter) = limiter {
        let client = client_key(&req);
        if let Err(retry_after_secs) = limiter.check(&client) {
            log::warn!(
                "rate limit exceeded for {} on {} {}",
                client,
                req.method(),
                req.path()
            );
            let response = AppError::TooManyRequests { retry_after_secs }.error_response();
            return Ok(req.into_response(response).map_into_right_body());
        }
    }

    next.call(req).await.map(ServiceResponse::map_into_left_body)
}

pub fn cors(config: &CorsConfig) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(config.allowed_methods.iter().map(String::as_str))
        .allowed_headers(config.allowed_headers.iter().map(String::as_str))
        .max_age(config.max_age_secs);

    if config.allows_any_origin() {
        cors = cors.allow_any_origin();
    } else {
        for origin in &config.allowed_origins {
            cors = cors.allowed_origin(origin);
        }
    }
    if config.allow_credentials {
        cors = cors.supports_credentials();
    }
    cors
}
