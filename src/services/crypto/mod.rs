//! Crypto payment processor (NOWPayments-compatible API).
//!
//! Invoices are created through the REST API and settle asynchronously through
//! IPN callbacks. Each callback is signed with HMAC-SHA512 over the JSON body with
//! its object keys sorted, hex encoded in the `x-nowpayments-sig` header.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sha2::Sha512;

mod live;
#[cfg(test)]
mod mock;

pub use live::LiveCryptoService;
#[cfg(test)]
pub use mock::MockCryptoService;

pub const SIGNATURE_HEADER: &str = "x-nowpayments-sig";

type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, thiserror::Error)]
pub enum CryptoServiceError {
    #[error("crypto api error: {0}")]
    Api(String),
    #[error("ipn verification failed: {0}")]
    Webhook(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

impl From<reqwest::Error> for CryptoServiceError {
    fn from(err: reqwest::Error) -> Self {
        CryptoServiceError::Api(err.to_string())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CreateInvoiceRequest {
    pub price_amount: f64,
    pub price_currency: String,
    pub order_id: String,
    /// Carries the JSON-encoded purchase metadata bag back to us in the IPN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipn_callback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CryptoInvoice {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub invoice_url: String,
}

/// Body of an IPN callback after signature verification.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CryptoPaymentNotification {
    #[serde(deserialize_with = "string_or_number")]
    pub payment_id: String,
    pub payment_status: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub price_amount: f64,
    pub price_currency: String,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub pay_amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub actually_paid: Option<f64>,
    #[serde(default)]
    pub pay_currency: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub order_description: Option<String>,
}

impl CryptoPaymentNotification {
    /// Per-status event id used for the processed-event log; the processor sends one
    /// callback per status change of a payment.
    pub fn event_id(&self) -> String {
        format!("{}:{}", self.payment_id, self.payment_status)
    }

    /// Amount of crypto actually received, falling back to the quoted amount.
    pub fn crypto_amount(&self) -> Option<f64> {
        self.actually_paid
            .filter(|v| *v > 0.0)
            .or(self.pay_amount)
    }
}

#[async_trait]
pub trait CryptoPaymentService: Send + Sync {
    async fn create_invoice(
        &self,
        req: CreateInvoiceRequest,
    ) -> Result<CryptoInvoice, CryptoServiceError>;

    fn verify_ipn(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<CryptoPaymentNotification, CryptoServiceError>;
}

/// Rebuilds `value` with every object's keys in ascending order.
pub fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Hex HMAC-SHA512 of the key-sorted JSON body.
pub fn ipn_signature(secret: &str, body: &Value) -> Result<String, CryptoServiceError> {
    let canonical = serde_json::to_string(&sort_keys(body))
        .map_err(|e| CryptoServiceError::Serde(e.to_string()))?;
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| CryptoServiceError::Webhook(e.to_string()))?;
    mac.update(canonical.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_f64(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected a number, got {}", value)))
}

fn lenient_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sort_keys_orders_nested_objects() {
        let value = json!({ "b": 1, "a": { "z": true, "c": [ { "y": 1, "x": 2 } ] } });
        let canonical = serde_json::to_string(&sort_keys(&value)).unwrap();
        assert_eq!(canonical, r#"{"a":{"c":[{"x":2,"y":1}],"z":true},"b":1}"#);
    }

    #[test]
    fn notification_accepts_numeric_ids_and_string_amounts() {
        let body = json!({
            "payment_id": 5077125051u64,
            "payment_status": "finished",
            "price_amount": "12.5",
            "price_currency": "usd",
            "pay_amount": 0.00021,
            "actually_paid": 0,
            "pay_currency": "btc",
            "order_id": "ord_1"
        });
        let n: CryptoPaymentNotification = serde_json::from_value(body).unwrap();
        assert_eq!(n.payment_id, "5077125051");
        assert_eq!(n.price_amount, 12.5);
        assert_eq!(n.event_id(), "5077125051:finished");
        assert_eq!(n.crypto_amount(), Some(0.00021));
        assert!(n.order_description.is_none());
    }

    #[test]
    fn signature_ignores_key_order() {
        let a = json!({ "payment_id": 1, "payment_status": "finished" });
        let b: Value =
            serde_json::from_str(r#"{"payment_status":"finished","payment_id":1}"#).unwrap();
        assert_eq!(
            ipn_signature("secret", &a).unwrap(),
            ipn_signature("secret", &b).unwrap()
        );
        assert_ne!(
            ipn_signature("secret", &a).unwrap(),
            ipn_signature("other", &a).unwrap()
        );
    }
}
