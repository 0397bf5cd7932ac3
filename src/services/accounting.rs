use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

use crate::models::payment::Payment;

#[derive(Debug, thiserror::Error)]
pub enum AccountingError {
    #[error("accounting request failed: {0}")]
    Http(String),
    #[error("accounting endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Mirror of a completed payment for the external accounting system.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountingRecord {
    pub external_id: String,
    pub amount_usd: f64,
    pub amount_crypto: f64,
    pub crypto_currency: String,
    pub product_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    pub status: String,
    pub payment_date: String,
    pub user_email: Option<String>,
    pub user_id: String,
    pub metadata: Value,
}

impl AccountingRecord {
    /// Card payments report the fiat amount in both amount fields.
    pub fn for_payment(
        payment: &Payment,
        user_email: Option<String>,
        product_name: Option<String>,
    ) -> Self {
        let amount = payment.amount();
        Self {
            external_id: payment.id.clone(),
            amount_usd: amount.major(),
            amount_crypto: amount.major(),
            crypto_currency: amount.currency.to_ascii_uppercase(),
            product_type: payment.payment_type.as_str().to_string(),
            product_name,
            status: payment.status.as_str().to_string(),
            payment_date: payment.created_at.format(&Rfc3339).unwrap_or_default(),
            user_email,
            user_id: payment.user_id.clone(),
            metadata: payment.metadata.clone(),
        }
    }

    pub fn with_crypto(mut self, amount: f64, currency: &str) -> Self {
        self.amount_crypto = amount;
        self.crypto_currency = currency.to_ascii_uppercase();
        self
    }
}

/// Best-effort side channel. `forward` never reports failure to the caller.
pub trait AccountingForwarder: Send + Sync {
    fn forward(&self, record: AccountingRecord);
}

#[derive(Clone)]
pub struct HttpAccountingForwarder {
    http: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpAccountingForwarder {
    pub fn new(http: Client, url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            url: url.into(),
            api_key,
        }
    }

    pub async fn send(&self, record: &AccountingRecord) -> Result<(), AccountingError> {
        let mut req = self.http.post(&self.url).json(record);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| AccountingError::Http(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(AccountingError::Status { status, body })
        }
    }
}

impl AccountingForwarder for HttpAccountingForwarder {
    fn forward(&self, record: AccountingRecord) {
        let forwarder = self.clone();
        tokio::spawn(async move {
            match forwarder.send(&record).await {
                Ok(()) => info!(external_id = %record.external_id, "payment mirrored to accounting"),
                Err(err) => warn!(
                    %err,
                    external_id = %record.external_id,
                    "failed to mirror payment to accounting"
                ),
            }
        });
    }
}

/// Used when no accounting endpoint is configured.
pub struct NoopAccountingForwarder;

impl AccountingForwarder for NoopAccountingForwarder {
    fn forward(&self, record: AccountingRecord) {
        debug!(external_id = %record.external_id, "accounting forwarding disabled");
    }
}

#[cfg(test)]
pub use tests::RecordingAccountingForwarder;
