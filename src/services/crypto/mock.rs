use super::{
    CreateInvoiceRequest, CryptoInvoice, CryptoPaymentNotification, CryptoPaymentService,
    CryptoServiceError,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Accepts any signature unless built with `rejecting()`.
#[derive(Clone, Default)]
pub struct MockCryptoService {
    pub invoices: Arc<Mutex<Vec<CreateInvoiceRequest>>>,
    pub reject_signatures: bool,
}

impl MockCryptoService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            reject_signatures: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl CryptoPaymentService for MockCryptoService {
    async fn create_invoice(
        &self,
        req: CreateInvoiceRequest,
    ) -> Result<CryptoInvoice, CryptoServiceError> {
        let mut invoices = self.invoices.lock().unwrap();
        invoices.push(req);
        Ok(CryptoInvoice {
            id: format!("inv_{}", invoices.len()),
            invoice_url: "https://pay.example.test/invoice".into(),
        })
    }

    fn verify_ipn(
        &self,
        payload: &[u8],
        _signature_header: &str,
    ) -> Result<CryptoPaymentNotification, CryptoServiceError> {
        if self.reject_signatures {
            return Err(CryptoServiceError::Webhook("signature mismatch".into()));
        }
        serde_json::from_slice(payload).map_err(|e| CryptoServiceError::Serde(e.to_string()))
    }
}
