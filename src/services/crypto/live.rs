use super::{
    ipn_signature, CreateInvoiceRequest, CryptoInvoice, CryptoPaymentNotification,
    CryptoPaymentService, CryptoServiceError,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use subtle::ConstantTimeEq;

pub struct LiveCryptoService {
    http: Client,
    api_base: String,
    api_key: String,
    ipn_secret: String,
}

impl LiveCryptoService {
    pub fn new(
        http: Client,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        ipn_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            ipn_secret: ipn_secret.into(),
        }
    }

    pub fn from_settings(http: &Client, settings: &crate::config::CryptoSettings) -> Self {
        Self::new(
            http.clone(),
            settings.api_base_url.clone(),
            settings.api_key.clone(),
            settings.ipn_secret.clone(),
        )
    }
}

#[async_trait]
impl CryptoPaymentService for LiveCryptoService {
    async fn create_invoice(
        &self,
        req: CreateInvoiceRequest,
    ) -> Result<CryptoInvoice, CryptoServiceError> {
        let resp = self
            .http
            .post(format!("{}/v1/invoice", self.api_base))
            .header("x-api-key", &self.api_key)
            .json(&req)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CryptoServiceError::Api(format!(
                "invoice creation failed: {} {}",
                status, text
            )));
        }

        resp.json::<CryptoInvoice>()
            .await
            .map_err(|e| CryptoServiceError::Serde(e.to_string()))
    }

    fn verify_ipn(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<CryptoPaymentNotification, CryptoServiceError> {
        let body: Value = serde_json::from_slice(payload)
            .map_err(|e| CryptoServiceError::Serde(e.to_string()))?;

        let expected = ipn_signature(&self.ipn_secret, &body)?;
        let provided = signature_header.trim().to_ascii_lowercase();
        if expected.as_bytes().ct_eq(provided.as_bytes()).unwrap_u8() == 0u8 {
            return Err(CryptoServiceError::Webhook("signature mismatch".into()));
        }

        serde_json::from_value(body).map_err(|e| CryptoServiceError::Serde(e.to_string()))
    }
}
