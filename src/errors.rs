use actix_web::http::{header, StatusCode};
use actix_web::HttpResponse;
use serde_json::json;
use thiserror::Error;

use crate::domain::errors::{DomainError, SignatureError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limit exceeded")]
    TooManyRequests { retry_after_secs: u64 },

    /// `detail` carries upstream diagnostics; see [`AppError::for_environment`].
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        detail: Option<String>,
    },
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::UnsupportedMediaType(_) => "unsupported_media_type",
            AppError::Timeout => "timeout",
            AppError::TooManyRequests { .. } => "rate_limited",
            AppError::Internal { .. } => "internal_error",
        }
    }

    /// Drops internal detail unless running in development.
    pub fn for_environment(self, development: bool) -> Self {
        match self {
            AppError::Internal { message, .. } if !development => AppError::Internal {
                message,
                detail: None,
            },
            other => other,
        }
    }
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::NotFound(id) => AppError::NotFound(format!("order {id}")),
            DomainError::InvalidInput(msg) => AppError::BadRequest(msg),
            e @ (DomainError::NotPayable { .. } | DomainError::Money(_)) => {
                AppError::BadRequest(e.to_string())
            }
            DomainError::Store(e) => AppError::Internal {
                message: "order store request failed".to_string(),
                detail: Some(e.detail()),
            },
            e @ DomainError::AmountMismatch { .. } => AppError::Internal {
                message: "processing order total does not match the source order".to_string(),
                detail: Some(e.to_string()),
            },
        }
    }
}

impl From<SignatureError> for AppError {
    fn from(e: SignatureError) -> Self {
        AppError::Unauthorized(e.to_string())
    }
}

impl actix_web::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Timeout => StatusCode::REQUEST_TIMEOUT,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::Internal { detail, .. } => {
                let mut body = json!({
                    "error": "Internal server error",
                    "code": self.code(),
                });
                if let Some(detail) = detail {
                    body["detail"] = json!(detail);
                }
                body
            }
            _ => json!({
                "error": self.to_string(),
                "code": self.code(),
            }),
        };
        let mut response = HttpResponse::build(self.status_code());
        if let AppError::TooManyRequests { retry_after_secs } = self {
            response.insert_header((header::RETRY_AFTER, retry_after_secs.to_string()));
        }
        response.json(body)
    }
}
