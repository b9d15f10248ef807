use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::errors::{DomainError, MoneyError};
use super::money::Money;

/// Payment method identifier written onto proxy orders.
pub const PROXY_PAYMENT_METHOD: &str = "paypal";
pub const PROXY_PAYMENT_METHOD_TITLE: &str = "PayPal";

const PLACEHOLDER_FIRST_NAME: &str = "Customer";
const PLACEHOLDER_LAST_NAME: &str = "Order";
const PLACEHOLDER_STREET: &str = "Private";
const PLACEHOLDER_CITY: &str = "Private";
const PLACEHOLDER_POSTCODE: &str = "00000";
const PLACEHOLDER_EMAIL: &str = "noreply@proxy.invalid";

const MAX_ORDER_ID_LEN: usize = 50;

/// Meta key on a proxy order naming the source order it mirrors.
pub const ORIGINAL_ORDER_ID_KEY: &str = "_original_order_id";

/// Identifier of an order as accepted on the public HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderId(String);

impl OrderId {
    /// Accepts 1–50 ASCII alphanumeric characters.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if raw.is_empty() {
            return Err(DomainError::InvalidInput("order id is required".to_string()));
        }
        if raw.len() > MAX_ORDER_ID_LEN || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainError::InvalidInput(format!(
                "invalid order id format: '{raw}'"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Pending,
    Processing,
    OnHold,
    Completed,
    Cancelled,
    Refunded,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::OnHold => "on-hold",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "on-hold" => Ok(OrderStatus::OnHold),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            "failed" => Ok(OrderStatus::Failed),
            other => Err(DomainError::InvalidInput(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub address_1: String,
    pub address_2: String,
    pub city: String,
    pub state: String,
    pub postcode: String,
    pub country: String,
    pub email: String,
    pub phone: String,
}

impl Address {
    /// Names of required fields that are blank. The payment provider only
    /// strictly needs the country.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.country.trim().is_empty() {
            missing.push("country");
        }
        missing
    }

    fn placeholder(country: &str, email: &str) -> Self {
        Self {
            first_name: PLACEHOLDER_FIRST_NAME.to_string(),
            last_name: PLACEHOLDER_LAST_NAME.to_string(),
            address_1: PLACEHOLDER_STREET.to_string(),
            city: PLACEHOLDER_CITY.to_string(),
            postcode: PLACEHOLDER_POSTCODE.to_string(),
            country: country.to_string(),
            email: email.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetaData {
    pub key: String,
    pub value: Value,
}

impl MetaData {
    pub fn new(key: &str, value: impl Into<Value>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub id: u64,
    pub name: String,
    pub product_id: u64,
    pub variation_id: u64,
    pub quantity: u32,
    pub sku: String,
    pub price: Money,
    pub subtotal: Money,
    pub subtotal_tax: Money,
    pub total: Money,
    pub total_tax: Money,
    pub meta_data: Vec<MetaData>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShippingLine {
    pub id: u64,
    pub method_id: String,
    pub method_title: String,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeeLine {
    pub id: u64,
    pub name: String,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaxLine {
    pub id: u64,
    pub rate_code: String,
    pub rate_id: u64,
    pub label: String,
    pub compound: bool,
    pub tax_total: Money,
    pub shipping_tax_total: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CouponLine {
    pub id: u64,
    pub code: String,
    pub discount: Money,
    pub discount_tax: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: u64,
    /// Human-readable number, identical on both stores.
    pub number: String,
    pub order_key: String,
    pub status: OrderStatus,
    pub currency: String,
    pub total: Money,
    pub payment_method: String,
    pub payment_method_title: String,
    pub transaction_id: String,
    pub customer_note: String,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub billing: Address,
    pub shipping: Address,
    pub line_items: Vec<LineItem>,
    pub shipping_lines: Vec<ShippingLine>,
    pub fee_lines: Vec<FeeLine>,
    pub tax_lines: Vec<TaxLine>,
    pub coupon_lines: Vec<CouponLine>,
    pub meta_data: Vec<MetaData>,
}

impl Order {
    pub fn can_be_processed(&self) -> bool {
        self.status == OrderStatus::Pending && self.total.is_positive()
    }

    pub fn is_payment_completed(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Completed | OrderStatus::Processing | OrderStatus::OnHold
        )
    }

    /// Checks everything the redirect flow needs before a proxy order is created.
    pub fn validate_for_payment(&self) -> Result<(), DomainError> {
        let not_payable = |reason: String| DomainError::NotPayable {
            order_id: self.id.to_string(),
            reason,
        };

        if self.is_payment_completed() {
            return Err(not_payable("payment already completed".to_string()));
        }
        if !self.total.is_positive() {
            return Err(not_payable(format!("non-positive total {}", self.total)));
        }
        if !self.can_be_processed() {
            return Err(not_payable(format!("status is {}", self.status)));
        }
        if self.currency.trim().is_empty() {
            return Err(not_payable("currency is missing".to_string()));
        }
        if self.line_items.is_empty() {
            return Err(not_payable("order has no line items".to_string()));
        }
        let missing = self.billing.missing_required();
        if !missing.is_empty() {
            return Err(not_payable(format!(
                "billing address is missing {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Sum of line, shipping, fee and tax totals. Line totals already include
    /// coupon discounts, so coupon lines are not subtracted again.
    pub fn items_total(&self) -> Result<Money, MoneyError> {
        let mut sum = Money::zero(&self.currency);
        for item in &self.line_items {
            sum = sum.add(&item.total)?;
        }
        for line in &self.shipping_lines {
            sum = sum.add(&line.total)?;
        }
        for fee in &self.fee_lines {
            sum = sum.add(&fee.total)?;
        }
        for tax in &self.tax_lines {
            sum = sum.add(&tax.tax_total)?.add(&tax.shipping_tax_total)?;
        }
        Ok(sum)
    }

    /// Source order id recorded on a proxy order, if any.
    pub fn mirrored_from(&self) -> Option<String> {
        let meta = self.meta_data.iter().find(|m| m.key == ORIGINAL_ORDER_ID_KEY)?;
        match &meta.value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Anonymized copy for the processing store, stamped with the current time.
    pub fn to_proxy_order(&self) -> Order {
        self.to_proxy_order_at(Utc::now())
    }

    /// Anonymized copy for the processing store.
    ///
    /// Keeps the order number, currency, totals, shipping/fee/tax lines and
    /// per-item SKU, quantity and amounts. Item names become `Item {n}`,
    /// product references are cleared, customer details are replaced except
    /// the country, and coupon lines are dropped.
    pub fn to_proxy_order_at(&self, now: DateTime<Utc>) -> Order {
        Order {
            id: 0,
            number: self.number.clone(),
            order_key: String::new(),
            status: OrderStatus::Pending,
            currency: self.currency.clone(),
            total: self.total.clone(),
            payment_method: PROXY_PAYMENT_METHOD.to_string(),
            payment_method_title: PROXY_PAYMENT_METHOD_TITLE.to_string(),
            transaction_id: String::new(),
            customer_note: String::new(),
            created_at: now,
            paid_at: None,
            billing: Address::placeholder(&self.billing.country, PLACEHOLDER_EMAIL),
            shipping: Address::placeholder(&self.shipping.country, ""),
            line_items: self
                .line_items
                .iter()
                .enumerate()
                .map(|(i, item)| LineItem {
                    id: 0,
                    name: format!("Item {}", i + 1),
                    product_id: 0,
                    variation_id: 0,
                    quantity: item.quantity,
                    sku: item.sku.clone(),
                    price: item.price.clone(),
                    subtotal: item.subtotal.clone(),
                    subtotal_tax: item.subtotal_tax.clone(),
                    total: item.total.clone(),
                    total_tax: item.total_tax.clone(),
                    meta_data: Vec::new(),
                })
                .collect(),
            shipping_lines: self.shipping_lines.clone(),
            fee_lines: self.fee_lines.clone(),
            tax_lines: self.tax_lines.clone(),
            coupon_lines: Vec::new(),
            meta_data: vec![
                MetaData::new(ORIGINAL_ORDER_ID_KEY, self.id.to_string()),
                MetaData::new("_original_order_number", self.number.clone()),
                MetaData::new("_proxy_order", "true"),
            ],
        }
    }
}
