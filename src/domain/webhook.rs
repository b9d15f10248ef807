use serde::Deserialize;
use serde_json::Value;

use super::errors::{DomainError, MoneyError};
use super::money::Money;

pub const CAPTURE_COMPLETED: &str = "PAYMENT.CAPTURE.COMPLETED";
pub const CAPTURE_DENIED: &str = "PAYMENT.CAPTURE.DENIED";
pub const CAPTURE_REFUNDED: &str = "PAYMENT.CAPTURE.REFUNDED";

/// Notification body as posted by the payment provider.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub id: String,
    pub event_type: String,
    #[serde(default)]
    pub resource: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResourceAmount {
    pub value: String,
    pub currency_code: String,
}

/// The subset of a capture/refund resource the proxy acts on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CaptureResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub amount: Option<ResourceAmount>,
}

impl CaptureResource {
    /// Source order id, taken from `custom_id` and then `invoice_id`.
    pub fn order_id(&self) -> Option<&str> {
        [&self.custom_id, &self.invoice_id]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
    }

    pub fn payment_id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    pub fn amount(&self) -> Result<Option<Money>, MoneyError> {
        self.amount
            .as_ref()
            .map(|a| Money::parse(&a.value, &a.currency_code))
            .transpose()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    CaptureCompleted(CaptureResource),
    CaptureDenied(CaptureResource),
    CaptureRefunded(CaptureResource),
    /// Anything else the provider sends; acknowledged without action.
    Unrecognized { event_type: String, resource: Value },
}

impl WebhookEvent {
    pub fn from_envelope(envelope: WebhookEnvelope) -> Result<Self, DomainError> {
        let ctor: fn(CaptureResource) -> WebhookEvent = match envelope.event_type.as_str() {
            CAPTURE_COMPLETED => WebhookEvent::CaptureCompleted,
            CAPTURE_DENIED => WebhookEvent::CaptureDenied,
            CAPTURE_REFUNDED => WebhookEvent::CaptureRefunded,
            _ => {
                return Ok(WebhookEvent::Unrecognized {
                    event_type: envelope.event_type,
                    resource: envelope.resource,
                })
            }
        };

        let resource = match envelope.resource {
            Value::Null => CaptureResource::default(),
            value => serde_json::from_value(value).map_err(|e| {
                DomainError::InvalidInput(format!(
                    "malformed {} resource: {e}",
                    envelope.event_type
                ))
            })?,
        };
        Ok(ctor(resource))
    }

    pub fn event_type(&self) -> &str {
        match self {
            WebhookEvent::CaptureCompleted(_) => CAPTURE_COMPLETED,
            WebhookEvent::CaptureDenied(_) => CAPTURE_DENIED,
            WebhookEvent::CaptureRefunded(_) => CAPTURE_REFUNDED,
            WebhookEvent::Unrecognized { event_type, .. } => event_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn envelope(body: Value) -> WebhookEnvelope {
        serde_json::from_value(body).expect("valid envelope")
    }

    #[test]
    fn capture_completed_is_typed() {
        let event = WebhookEvent::from_envelope(envelope(json!({
            "id": "WH-1",
            "event_type": "PAYMENT.CAPTURE.COMPLETED",
            "resource": {
                "id": "CAP-1",
                "custom_id": "X",
                "amount": { "value": "10.00", "currency_code": "USD" }
            }
        })))
        .unwrap();

        let WebhookEvent::CaptureCompleted(resource) = event else {
            panic!("expected capture completed");
        };
        assert_eq!(resource.order_id(), Some("X"));
        assert_eq!(resource.payment_id(), "CAP-1");
        assert_eq!(
            resource.amount().unwrap(),
            Some(Money::parse("10.00", "USD").unwrap())
        );
    }

    #[test]
    fn invoice_id_is_used_when_custom_id_is_blank() {
        let resource = CaptureResource {
            custom_id: Some("  ".to_string()),
            invoice_id: Some("INV7".to_string()),
            ..CaptureResource::default()
        };
        assert_eq!(resource.order_id(), Some("INV7"));
        assert_eq!(CaptureResource::default().order_id(), None);
    }

    #[test]
    fn unknown_event_keeps_raw_resource() {
        let event = WebhookEvent::from_envelope(envelope(json!({
            "id": "WH-2",
            "event_type": "BILLING.SUBSCRIPTION.CREATED",
            "resource": { "anything": [1, 2, 3] }
        })))
        .unwrap();

        assert_eq!(event.event_type(), "BILLING.SUBSCRIPTION.CREATED");
        assert!(matches!(event, WebhookEvent::Unrecognized { .. }));
    }

    #[test]
    fn malformed_known_resource_is_rejected() {
        let result = WebhookEvent::from_envelope(envelope(json!({
            "event_type": "PAYMENT.CAPTURE.DENIED",
            "resource": { "custom_id": 42 }
        })));
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));
    }

    #[test]
    fn malformed_amount_is_an_error() {
        let resource = CaptureResource {
            amount: Some(ResourceAmount {
                value: "ten".to_string(),
                currency_code: "USD".to_string(),
            }),
            ..CaptureResource::default()
        };
        assert!(resource.amount().is_err());
    }
}
