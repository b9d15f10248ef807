//! In-process flow tests: the actix app is driven with `actix_web::test`
//! while wiremock servers stand in for the source and processing stores.

use std::collections::HashMap;
use std::time::Duration;

use actix_web::dev::ServiceResponse;
use actix_web::http::{header, StatusCode};
use actix_web::{test, web};
use payment_proxy::config::Config;
use payment_proxy::infrastructure::signature::HmacSignatureVerifier;
use payment_proxy::{app, AppState};
use serde_json::{json, Value};
use wiremock::matchers::{any, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUCCESS_URL: &str = "https://source.example/thank-you";
const CANCEL_URL: &str = "https://source.example/cart";
const ERROR_URL: &str = "https://source.example/payment-error";
const WEBHOOK_SECRET: &str = "whsec_test";

struct Stores {
    source: MockServer,
    processing: MockServer,
}

impl Stores {
    async fn start() -> Self {
        Self {
            source: MockServer::start().await,
            processing: MockServer::start().await,
        }
    }

    fn config(&self, extra: &[(&str, &str)]) -> Config {
        let mut env: HashMap<String, String> = [
            ("SOURCE_STORE_URL", self.source.uri()),
            ("SOURCE_CONSUMER_KEY", "ck_source".to_string()),
            ("SOURCE_CONSUMER_SECRET", "cs_source".to_string()),
            ("PROCESSING_STORE_URL", self.processing.uri()),
            ("PROCESSING_CONSUMER_KEY", "ck_processing".to_string()),
            ("PROCESSING_CONSUMER_SECRET", "cs_processing".to_string()),
            ("SUCCESS_RETURN_URL", SUCCESS_URL.to_string()),
            ("CANCEL_RETURN_URL", CANCEL_URL.to_string()),
            ("ERROR_RETURN_URL", ERROR_URL.to_string()),
            ("PUBLIC_BASE_URL", "https://proxy.example".to_string()),
            ("RETRY_BASE_DELAY_MS", "1".to_string()),
            ("REQUEST_TIMEOUT_SECS", "10".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        for (k, v) in extra {
            env.insert(k.to_string(), v.to_string());
        }
        Config::from_lookup(|key| env.get(key).cloned()).expect("valid test config")
    }
}

fn order_json(id: u64, status: &str, total: &str) -> Value {
    json!({
        "id": id,
        "number": id.to_string(),
        "order_key": format!("wc_order_key{id}"),
        "status": status,
        "currency": "USD",
        "total": total,
        "transaction_id": if status == "processing" { "TXN-1" } else { "" },
        "date_created_gmt": "2024-05-01T12:00:00",
        "billing": { "first_name": "Jan", "email": "jan@example.com", "country": "PL" },
        "shipping": { "first_name": "Jan", "country": "PL" },
        "line_items": [
            { "id": 1, "name": "Blue Oyster Spores", "quantity": 1, "sku": "GT-01",
              "price": 9.99, "subtotal": "9.99", "total": "9.99" },
            { "id": 2, "name": "Syringe", "quantity": 2, "sku": "SY-02",
              "price": 5, "subtotal": "10.00", "total": "10.00" }
        ],
        "coupon_lines": [ { "id": 3, "code": "SPRING", "discount": "1.00" } ]
    })
}

/// Processing-store copy of `source_id`, tagged the way the redirect tags it.
fn proxy_json(id: u64, source_id: u64, status: &str, total: &str) -> Value {
    let mut order = order_json(id, status, total);
    order["meta_data"] = json!([
        { "key": "_original_order_id", "value": source_id.to_string() },
        { "key": "_proxy_order", "value": "true" }
    ]);
    order
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(app(web::Data::new($state))).await
    };
}

fn location<B>(resp: &ServiceResponse<B>) -> String {
    resp.headers()
        .get(header::LOCATION)
        .expect("location header")
        .to_str()
        .unwrap()
        .to_string()
}

#[actix_web::test]
async fn redirect_then_return_marks_source_order_paid() {
    let stores = Stores::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wc/v3/orders/123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(order_json(123, "pending", "19.99")))
        .mount(&stores.source)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wc/v3/orders"))
        .and(body_partial_json(json!({ "status": "pending", "set_paid": false, "total": "19.99" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(proxy_json(456, 123, "pending", "19.99")))
        .expect(1)
        .mount(&stores.processing)
        .await;

    let app = app!(AppState::from_config(stores.config(&[])).unwrap());

    let req = test::TestRequest::get()
        .uri("/redirect?orderId=123")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    let checkout = location(&resp);
    let expected_prefix = format!(
        "{}/checkout/456/?pay_for_order=true&key=wc_order_key456",
        stores.processing.uri()
    );
    assert!(checkout.starts_with(&expected_prefix), "{checkout}");
    assert!(checkout.contains("proxy.example%2Fpaypal-return"));

    // The customer paid; the processing store now reports the proxy order as processing.
    Mock::given(method("GET"))
        .and(path("/wp-json/wc/v3/orders/456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(proxy_json(456, 123, "processing", "19.99")))
        .mount(&stores.processing)
        .await;
    Mock::given(method("PUT"))
        .and(path("/wp-json/wc/v3/orders/123"))
        .and(body_partial_json(json!({
            "status": "processing",
            "transaction_id": "TXN-1",
            "payment_method": "paypal"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(order_json(123, "processing", "19.99")))
        .expect(1)
        .mount(&stores.source)
        .await;

    let req = test::TestRequest::get()
        .uri("/paypal-return?order_id=123&oitam_order_id=456&paymentId=PAY1&PayerID=PAYER1")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    let landing = location(&resp);
    assert!(landing.starts_with(SUCCESS_URL), "{landing}");
    assert!(landing.contains("order=123"));
    assert!(landing.contains("payment=confirmed"));
}

#[actix_web::test]
async fn already_paid_order_skips_proxy_creation() {
    let stores = Stores::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wc/v3/orders/123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(order_json(123, "completed", "19.99")))
        .mount(&stores.source)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&stores.processing)
        .await;

    let app = app!(AppState::from_config(stores.config(&[])).unwrap());
    let req = test::TestRequest::get().uri("/paypal?orderId=123").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), format!("{SUCCESS_URL}?order=123&already_paid=1"));
}

#[actix_web::test]
async fn invalid_order_id_is_rejected_before_any_store_call() {
    let stores = Stores::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&stores.source)
        .await;

    let app = app!(AppState::from_config(stores.config(&[])).unwrap());

    for uri in ["/redirect?orderId=12%3B3", "/redirect", "/api/v1/status/a-b"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "bad_request");
    }
}

#[actix_web::test]
async fn upstream_failure_on_redirect_is_a_500() {
    let stores = Stores::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(3)
        .mount(&stores.source)
        .await;

    let app = app!(AppState::from_config(stores.config(&[("ENVIRONMENT", "staging")])).unwrap());
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/redirect?orderId=123").to_request(),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert!(body.get("detail").is_none());
}

#[actix_web::test]
async fn cancel_redirects_even_when_source_update_fails() {
    let stores = Stores::start().await;
    Mock::given(method("PUT"))
        .and(path("/wp-json/wc/v3/orders/123"))
        .and(body_partial_json(json!({ "status": "cancelled" })))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&stores.source)
        .await;

    let app = app!(AppState::from_config(stores.config(&[])).unwrap());
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/paypal-cancel?order_id=123&oitam_order_id=456")
            .to_request(),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), format!("{CANCEL_URL}?order=123&payment=cancelled"));
}

#[actix_web::test]
async fn invalid_return_parameters_go_to_error_page() {
    let stores = Stores::start().await;
    let app = app!(AppState::from_config(stores.config(&[])).unwrap());

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/paypal-return?order_id=123&PayerID=not-valid!")
            .to_request(),
    )
    .await;
    assert_eq!(location(&resp), format!("{ERROR_URL}?error=invalid_return_parameters"));

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/paypal-return?paymentId=PAY1").to_request(),
    )
    .await;
    assert_eq!(location(&resp), format!("{ERROR_URL}?error=missing_order_id"));
}

#[actix_web::test]
async fn signed_webhook_marks_order_paid() {
    let stores = Stores::start().await;
    Mock::given(method("PUT"))
        .and(path("/wp-json/wc/v3/orders/77"))
        .and(body_partial_json(json!({ "transaction_id": "CAP-1", "status": "processing" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 77 })))
        .expect(1)
        .mount(&stores.source)
        .await;

    let app = app!(AppState::from_config(stores.config(&[("WEBHOOK_SECRET", WEBHOOK_SECRET)])).unwrap());
    let body = json!({
        "id": "WH-1",
        "event_type": "PAYMENT.CAPTURE.COMPLETED",
        "resource": {
            "id": "CAP-1",
            "custom_id": "77",
            "amount": { "value": "19.99", "currency_code": "USD" }
        }
    })
    .to_string();

    let unsigned = test::TestRequest::post()
        .uri("/webhook")
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload(body.clone())
        .to_request();
    let resp = test::call_service(&app, unsigned).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let signature = HmacSignatureVerifier::new(WEBHOOK_SECRET).sign(body.as_bytes());
    let signed = test::TestRequest::post()
        .uri("/paypal-webhook")
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .insert_header(("X-PayPal-Transmission-Sig", signature))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, signed).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "processed");
}

#[actix_web::test]
async fn unrecognized_webhook_is_ignored() {
    let stores = Stores::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&stores.source)
        .await;

    let app = app!(AppState::from_config(stores.config(&[])).unwrap());
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/webhook")
            .set_json(json!({ "id": "WH-9", "event_type": "CUSTOMER.DISPUTE.CREATED", "resource": {} }))
            .to_request(),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ignored");
}

#[actix_web::test]
async fn malformed_webhook_body_is_a_400() {
    let stores = Stores::start().await;
    let app = app!(AppState::from_config(stores.config(&[])).unwrap());
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/webhook")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("not json")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn non_json_webhook_is_a_415() {
    let stores = Stores::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&stores.source)
        .await;

    let app = app!(AppState::from_config(stores.config(&[])).unwrap());
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/webhook")
            .insert_header((header::CONTENT_TYPE, "text/plain"))
            .set_payload(r#"{"id":"WH-1","event_type":"PAYMENT.CAPTURE.COMPLETED","resource":{}}"#)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "unsupported_media_type");
}

#[actix_web::test]
async fn redirect_from_foreign_referrer_is_forbidden() {
    let stores = Stores::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&stores.source)
        .await;

    let app = app!(AppState::from_config(stores.config(&[("ALLOWED_REFERRER_DOMAINS", "source.example")])).unwrap());
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/redirect?orderId=123")
            .insert_header((header::REFERER, "https://evil.example/checkout"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "forbidden");
}

#[actix_web::test]
async fn redirect_aborts_when_processing_store_recomputes_the_total() {
    let stores = Stores::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wc/v3/orders/123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(order_json(123, "pending", "19.99")))
        .mount(&stores.source)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wc/v3/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(proxy_json(456, 123, "pending", "16.99")))
        .expect(1)
        .mount(&stores.processing)
        .await;
    Mock::given(method("PUT"))
        .and(path("/wp-json/wc/v3/orders/456"))
        .and(body_partial_json(json!({ "status": "cancelled" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(proxy_json(456, 123, "cancelled", "16.99")))
        .expect(1)
        .mount(&stores.processing)
        .await;

    let app = app!(AppState::from_config(stores.config(&[])).unwrap());
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/redirect?orderId=123").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(resp.headers().get(header::LOCATION).is_none());
}

#[actix_web::test]
async fn slow_stores_hit_the_request_deadline() {
    let stores = Stores::start().await;
    let slow = Duration::from_secs(3);
    Mock::given(method("GET"))
        .and(path("/wp-json/wc/v3/orders/123"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(order_json(123, "pending", "19.99"))
                .set_delay(slow),
        )
        .mount(&stores.source)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 123 })).set_delay(slow))
        .mount(&stores.source)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wc/v3/orders/456"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(proxy_json(456, 123, "processing", "19.99"))
                .set_delay(slow),
        )
        .mount(&stores.processing)
        .await;

    let app = app!(AppState::from_config(stores.config(&[("REQUEST_TIMEOUT_SECS", "1")])).unwrap());

    for uri in ["/redirect?orderId=123", "/api/v1/order/123", "/api/v1/status/123"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT, "{uri}");
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "timeout");
    }

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/paypal-return?order_id=123&oitam_order_id=456")
            .to_request(),
    )
    .await;
    assert_eq!(
        location(&resp),
        format!("{ERROR_URL}?order=123&error=payment_verification_failed")
    );

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/paypal-cancel?order_id=123&oitam_order_id=456")
            .to_request(),
    )
    .await;
    assert_eq!(location(&resp), format!("{CANCEL_URL}?order=123&payment=cancelled"));

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/webhook")
            .set_json(json!({
                "id": "WH-2",
                "event_type": "PAYMENT.CAPTURE.COMPLETED",
                "resource": { "id": "CAP-2", "custom_id": "123" }
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
}

#[actix_web::test]
async fn production_rate_limit_answers_429_per_client() {
    let stores = Stores::start().await;
    let app = app!(AppState::from_config(stores.config(&[
        ("ENVIRONMENT", "production"),
        ("WEBHOOK_SECRET", WEBHOOK_SECRET),
        ("RATE_LIMIT_PER_SECOND", "1"),
        ("RATE_LIMIT_BURST", "2"),
    ]))
    .unwrap());

    let from = |ip: &str| {
        test::TestRequest::get()
            .uri("/health")
            .insert_header(("X-Forwarded-For", ip.to_string()))
            .to_request()
    };
    for _ in 0..2 {
        let resp = test::call_service(&app, from("198.51.100.7")).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = test::call_service(&app, from("198.51.100.7")).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = resp
        .headers()
        .get(header::RETRY_AFTER)
        .expect("retry-after header")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "rate_limited");

    let resp = test::call_service(&app, from("198.51.100.8")).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn rate_limit_is_off_outside_production() {
    let stores = Stores::start().await;
    let app = app!(AppState::from_config(stores.config(&[
        ("RATE_LIMIT_PER_SECOND", "1"),
        ("RATE_LIMIT_BURST", "1"),
    ]))
    .unwrap());

    for _ in 0..5 {
        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}

#[actix_web::test]
async fn cors_preflight_follows_configured_origins() {
    let stores = Stores::start().await;
    let app = app!(AppState::from_config(stores.config(&[(
        "CORS_ALLOWED_ORIGINS",
        "https://shop.example"
    )]))
    .unwrap());

    let preflight = |origin: &str| {
        test::TestRequest::default()
            .method(actix_web::http::Method::OPTIONS)
            .uri("/api/v1/order/123")
            .insert_header((header::ORIGIN, origin.to_string()))
            .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, "GET"))
            .to_request()
    };

    let resp = test::call_service(&app, preflight("https://shop.example")).await;
    assert!(resp.status().is_success(), "{}", resp.status());
    assert_eq!(
        resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://shop.example"
    );
    assert_eq!(resp.headers().get(header::ACCESS_CONTROL_MAX_AGE).unwrap(), "86400");

    let resp = test::call_service(&app, preflight("https://evil.example")).await;
    assert!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[actix_web::test]
async fn order_read_through_and_not_found() {
    let stores = Stores::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wc/v3/orders/123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(order_json(123, "on-hold", "19.99")))
        .mount(&stores.source)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wc/v3/orders/999"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&stores.source)
        .await;

    let app = app!(AppState::from_config(stores.config(&[])).unwrap());

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/order/123").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "on-hold");
    assert_eq!(body["items"].as_array().unwrap().len(), 2);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/v1/order/123/status").to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["is_paid"], true);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/status/999").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn health_endpoints_answer_with_security_headers() {
    let stores = Stores::start().await;
    let app = app!(AppState::from_config(stores.config(&[])).unwrap());

    for uri in ["/health", "/ping", "/ready", "/live", "/api/v1/health"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK, "{uri}");
        assert_eq!(resp.headers().get("X-Frame-Options").unwrap(), "DENY");
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "OK");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}

#[actix_web::test]
async fn openapi_document_lists_payment_routes() {
    let stores = Stores::start().await;
    let app = app!(AppState::from_config(stores.config(&[])).unwrap());

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api-docs/openapi.json").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["paths"].get("/redirect").is_some());
    assert!(body["paths"].get("/webhook").is_some());
}
