use url::{form_urlencoded, Url};

use crate::domain::order::Order;

const RETURN_PATH: &str = "paypal-return";
const CANCEL_PATH: &str = "paypal-cancel";

/// Builds the checkout URL on the processing store and the proxy's own
/// callback URLs. Every builder yields a URL even for a malformed base.
#[derive(Debug, Clone)]
pub struct UrlBuilder {
    checkout_base: String,
}

impl UrlBuilder {
    /// `checkout_base` is the processing store's pay-for-order page,
    /// e.g. `https://processing.example/checkout`.
    pub fn new(checkout_base: impl Into<String>) -> Self {
        Self {
            checkout_base: checkout_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn checkout_url(&self, order: &Order, return_url: &str, cancel_url: &str) -> String {
        let page = format!("{}/{}/", self.checkout_base, order.id);
        with_query(
            &page,
            &[
                ("pay_for_order", "true"),
                ("key", &order.order_key),
                ("return_url", return_url),
                ("cancel_return", cancel_url),
            ],
        )
    }

    pub fn return_url(&self, base: &str, order_id: &str, proxy_order_id: &str, status: &str) -> String {
        with_query(
            &join(base, RETURN_PATH),
            &[
                ("order_id", order_id),
                ("oitam_order_id", proxy_order_id),
                ("status", status),
            ],
        )
    }

    pub fn cancel_url(&self, base: &str, order_id: &str) -> String {
        with_query(&join(base, CANCEL_PATH), &[("order_id", order_id)])
    }
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// Appends percent-encoded query pairs to `base`, keeping any query it
/// already has.
pub fn with_query(base: &str, pairs: &[(&str, &str)]) -> String {
    match Url::parse(base) {
        Ok(mut url) => {
            url.query_pairs_mut().extend_pairs(pairs);
            url.into()
        }
        Err(e) => {
            log::warn!("could not parse URL '{}' ({}), concatenating instead", base, e);
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            let separator = if base.contains('?') { '&' } else { '?' };
            format!("{base}{separator}{query}")
        }
    }
}
