//! Wire representation of the WooCommerce v3 order schema and its mapping
//! to and from the domain types.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::errors::StoreError;
use crate::domain::money::Money;
use crate::domain::order::{
    Address, CouponLine, FeeLine, LineItem, MetaData, Order, OrderStatus, ShippingLine, TaxLine,
};
use crate::domain::payment::Payment;

/// Money fields arrive as decimal strings, except a few (`line_items[].price`)
/// which the store emits as bare JSON numbers.
fn decimal_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(serde_json::Number),
        Null,
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
        Raw::Null => String::new(),
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WcOrderRow {
    pub id: u64,
    #[serde(default)]
    pub number: String,
    pub status: String,
    pub currency: String,
    #[serde(deserialize_with = "decimal_string")]
    pub total: String,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub date_created_gmt: Option<String>,
    #[serde(default)]
    pub date_paid_gmt: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payment_method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payment_method_title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub transaction_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub order_key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub customer_note: String,
    #[serde(default)]
    pub billing: WcAddress,
    #[serde(default)]
    pub shipping: WcAddress,
    #[serde(default)]
    pub line_items: Vec<WcLineItem>,
    #[serde(default)]
    pub shipping_lines: Vec<WcShippingLine>,
    #[serde(default)]
    pub fee_lines: Vec<WcFeeLine>,
    #[serde(default)]
    pub tax_lines: Vec<WcTaxLine>,
    #[serde(default)]
    pub coupon_lines: Vec<WcCouponLine>,
    #[serde(default)]
    pub meta_data: Vec<WcMetaData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WcAddress {
    #[serde(deserialize_with = "null_as_default")]
    pub first_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub last_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub company: String,
    #[serde(deserialize_with = "null_as_default")]
    pub address_1: String,
    #[serde(deserialize_with = "null_as_default")]
    pub address_2: String,
    #[serde(deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub postcode: String,
    #[serde(deserialize_with = "null_as_default")]
    pub country: String,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(deserialize_with = "null_as_default")]
    pub phone: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WcLineItem {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub product_id: u64,
    #[serde(default)]
    pub variation_id: u64,
    pub quantity: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sku: String,
    #[serde(default, deserialize_with = "decimal_string")]
    pub price: String,
    #[serde(deserialize_with = "decimal_string")]
    pub subtotal: String,
    #[serde(default, deserialize_with = "decimal_string")]
    pub subtotal_tax: String,
    #[serde(deserialize_with = "decimal_string")]
    pub total: String,
    #[serde(default, deserialize_with = "decimal_string")]
    pub total_tax: String,
    #[serde(default)]
    pub meta_data: Vec<WcMetaData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WcShippingLine {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub method_id: String,
    #[serde(default)]
    pub method_title: String,
    #[serde(deserialize_with = "decimal_string")]
    pub total: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WcFeeLine {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(deserialize_with = "decimal_string")]
    pub total: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WcTaxLine {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub rate_code: String,
    #[serde(default)]
    pub rate_id: u64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub compound: bool,
    #[serde(deserialize_with = "decimal_string")]
    pub tax_total: String,
    #[serde(default, deserialize_with = "decimal_string")]
    pub shipping_tax_total: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WcCouponLine {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub code: String,
    #[serde(deserialize_with = "decimal_string")]
    pub discount: String,
    #[serde(default, deserialize_with = "decimal_string")]
    pub discount_tax: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WcMetaData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

// ── Request bodies ──────────────────────────────────────────────────────────

/// Body of `POST /orders`. Only fields the store accepts on create.
#[derive(Debug, Serialize)]
pub struct NewWcOrder {
    pub status: String,
    pub currency: String,
    pub total: String,
    pub payment_method: String,
    pub payment_method_title: String,
    pub set_paid: bool,
    pub billing: WcAddress,
    pub shipping: WcAddress,
    pub line_items: Vec<NewWcLineItem>,
    pub shipping_lines: Vec<NewWcShippingLine>,
    pub fee_lines: Vec<NewWcFeeLine>,
    pub meta_data: Vec<WcMetaData>,
}

#[derive(Debug, Serialize)]
pub struct NewWcLineItem {
    pub name: String,
    pub quantity: u32,
    pub sku: String,
    pub price: String,
    pub subtotal: String,
    pub subtotal_tax: String,
    pub total: String,
    pub total_tax: String,
}

#[derive(Debug, Serialize)]
pub struct NewWcShippingLine {
    pub method_id: String,
    pub method_title: String,
    pub total: String,
}

#[derive(Debug, Serialize)]
pub struct NewWcFeeLine {
    pub name: String,
    pub total: String,
}

/// Body of `PUT /orders/{id}` when only the status changes.
#[derive(Debug, Serialize)]
pub struct WcStatusUpdate<'a> {
    pub status: &'a str,
}

/// Body of `PUT /orders/{id}` recording a confirmed payment.
#[derive(Debug, Serialize)]
pub struct WcPaymentUpdate {
    pub payment_method: String,
    pub payment_method_title: String,
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_paid_gmt: Option<String>,
    pub meta_data: Vec<WcMetaData>,
}

// ── Conversions ─────────────────────────────────────────────────────────────

fn money(field: &str, value: &str, currency: &str) -> Result<Money, StoreError> {
    Money::parse(value, currency).map_err(|e| StoreError::Decode(format!("{field}: {e}")))
}

/// Like [`money`], but a blank field means zero.
fn money_or_zero(field: &str, value: &str, currency: &str) -> Result<Money, StoreError> {
    if value.trim().is_empty() {
        Ok(Money::zero(currency))
    } else {
        money(field, value, currency)
    }
}

/// The store emits naive local timestamps plus `_gmt` variants; both are
/// treated as UTC here, preferring the `_gmt` one.
fn timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

impl From<WcAddress> for Address {
    fn from(a: WcAddress) -> Self {
        Address {
            first_name: a.first_name,
            last_name: a.last_name,
            company: a.company,
            address_1: a.address_1,
            address_2: a.address_2,
            city: a.city,
            state: a.state,
            postcode: a.postcode,
            country: a.country,
            email: a.email,
            phone: a.phone,
        }
    }
}

impl From<&Address> for WcAddress {
    fn from(a: &Address) -> Self {
        WcAddress {
            first_name: a.first_name.clone(),
            last_name: a.last_name.clone(),
            company: a.company.clone(),
            address_1: a.address_1.clone(),
            address_2: a.address_2.clone(),
            city: a.city.clone(),
            state: a.state.clone(),
            postcode: a.postcode.clone(),
            country: a.country.clone(),
            email: a.email.clone(),
            phone: a.phone.clone(),
        }
    }
}

impl From<WcMetaData> for MetaData {
    fn from(m: WcMetaData) -> Self {
        MetaData {
            key: m.key,
            value: m.value,
        }
    }
}

impl From<&MetaData> for WcMetaData {
    fn from(m: &MetaData) -> Self {
        WcMetaData {
            id: None,
            key: m.key.clone(),
            value: m.value.clone(),
        }
    }
}

impl WcOrderRow {
    pub fn into_domain(self) -> Result<Order, StoreError> {
        let currency = self.currency.clone();
        let status: OrderStatus = self
            .status
            .parse()
            .map_err(|e| StoreError::Decode(format!("order {}: {e}", self.id)))?;

        let created_at = timestamp(self.date_created_gmt.as_deref())
            .or_else(|| timestamp(self.date_created.as_deref()))
            .unwrap_or_else(|| {
                log::warn!("order {} has no parseable creation date, using now", self.id);
                Utc::now()
            });

        let line_items = self
            .line_items
            .into_iter()
            .map(|item| {
                // Older stores omit the unit price.
                let price = if item.price.is_empty() {
                    let subtotal = money("line_items.subtotal", &item.subtotal, &currency)?;
                    let qty = BigDecimal::from(item.quantity.max(1));
                    Money::new(subtotal.amount() / &qty, &currency)
                        .map_err(|e| StoreError::Decode(format!("line_items.price: {e}")))?
                } else {
                    money("line_items.price", &item.price, &currency)?
                };
                Ok(LineItem {
                    id: item.id,
                    name: item.name,
                    product_id: item.product_id,
                    variation_id: item.variation_id,
                    quantity: item.quantity,
                    sku: item.sku,
                    price,
                    subtotal: money("line_items.subtotal", &item.subtotal, &currency)?,
                    subtotal_tax: money_or_zero(
                        "line_items.subtotal_tax",
                        &item.subtotal_tax,
                        &currency,
                    )?,
                    total: money("line_items.total", &item.total, &currency)?,
                    total_tax: money_or_zero("line_items.total_tax", &item.total_tax, &currency)?,
                    meta_data: item.meta_data.into_iter().map(Into::into).collect(),
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let shipping_lines = self
            .shipping_lines
            .into_iter()
            .map(|line| {
                Ok(ShippingLine {
                    id: line.id,
                    method_id: line.method_id,
                    method_title: line.method_title,
                    total: money("shipping_lines.total", &line.total, &currency)?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let fee_lines = self
            .fee_lines
            .into_iter()
            .map(|fee| {
                Ok(FeeLine {
                    id: fee.id,
                    name: fee.name,
                    total: money("fee_lines.total", &fee.total, &currency)?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let tax_lines = self
            .tax_lines
            .into_iter()
            .map(|tax| {
                let shipping_tax = money_or_zero(
                    "tax_lines.shipping_tax_total",
                    &tax.shipping_tax_total,
                    &currency,
                )?;
                Ok(TaxLine {
                    id: tax.id,
                    rate_code: tax.rate_code,
                    rate_id: tax.rate_id,
                    label: tax.label,
                    compound: tax.compound,
                    tax_total: money("tax_lines.tax_total", &tax.tax_total, &currency)?,
                    shipping_tax_total: shipping_tax,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let coupon_lines = self
            .coupon_lines
            .into_iter()
            .map(|coupon| {
                let discount_tax =
                    money_or_zero("coupon_lines.discount_tax", &coupon.discount_tax, &currency)?;
                Ok(CouponLine {
                    id: coupon.id,
                    code: coupon.code,
                    discount: money("coupon_lines.discount", &coupon.discount, &currency)?,
                    discount_tax,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(Order {
            id: self.id,
            number: if self.number.is_empty() {
                self.id.to_string()
            } else {
                self.number
            },
            order_key: self.order_key,
            status,
            total: money("total", &self.total, &currency)?,
            currency,
            payment_method: self.payment_method,
            payment_method_title: self.payment_method_title,
            transaction_id: self.transaction_id,
            customer_note: self.customer_note,
            created_at,
            paid_at: timestamp(self.date_paid_gmt.as_deref()),
            billing: self.billing.into(),
            shipping: self.shipping.into(),
            line_items,
            shipping_lines,
            fee_lines,
            tax_lines,
            coupon_lines,
            meta_data: self.meta_data.into_iter().map(Into::into).collect(),
        })
    }
}

impl From<&Order> for NewWcOrder {
    fn from(order: &Order) -> Self {
        NewWcOrder {
            status: order.status.as_str().to_string(),
            currency: order.currency.clone(),
            total: order.total.to_store_format(),
            payment_method: order.payment_method.clone(),
            payment_method_title: order.payment_method_title.clone(),
            set_paid: false,
            billing: (&order.billing).into(),
            shipping: (&order.shipping).into(),
            line_items: order
                .line_items
                .iter()
                .map(|item| NewWcLineItem {
                    name: item.name.clone(),
                    quantity: item.quantity,
                    sku: item.sku.clone(),
                    price: item.price.to_store_format(),
                    subtotal: item.subtotal.to_store_format(),
                    subtotal_tax: item.subtotal_tax.to_store_format(),
                    total: item.total.to_store_format(),
                    total_tax: item.total_tax.to_store_format(),
                })
                .collect(),
            shipping_lines: order
                .shipping_lines
                .iter()
                .map(|line| NewWcShippingLine {
                    method_id: line.method_id.clone(),
                    method_title: line.method_title.clone(),
                    total: line.total.to_store_format(),
                })
                .collect(),
            fee_lines: order
                .fee_lines
                .iter()
                .map(|fee| NewWcFeeLine {
                    name: fee.name.clone(),
                    total: fee.total.to_store_format(),
                })
                .collect(),
            meta_data: order
                .meta_data
                .iter()
                .map(Into::into)
                .chain(std::iter::once(WcMetaData {
                    id: None,
                    key: "_proxy_created_at".to_string(),
                    value: order.created_at.timestamp().into(),
                }))
                .collect(),
        }
    }
}

impl From<&Payment> for WcPaymentUpdate {
    fn from(payment: &Payment) -> Self {
        WcPaymentUpdate {
            payment_method: payment.method.as_str().to_string(),
            payment_method_title: payment.method.title().to_string(),
            transaction_id: payment.transaction_id.clone(),
            status: payment
                .is_completed()
                .then(|| OrderStatus::from(payment.status).as_str().to_string()),
            date_paid_gmt: payment
                .is_completed()
                .then(|| payment.processed_at.format("%Y-%m-%dT%H:%M:%S").to_string()),
            meta_data: payment
                .metadata
                .iter()
                .map(|(key, value)| WcMetaData {
                    id: None,
                    key: key.clone(),
                    value: Value::String(value.clone()),
                })
                .collect(),
        }
    }
}
