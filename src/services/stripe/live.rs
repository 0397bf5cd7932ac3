use super::{
    CheckoutLineItem, CheckoutMode, CheckoutSession, CreateCheckoutSessionRequest, StripeEvent,
    StripeService, StripeServiceError,
};
use crate::models::purchase::META_USER_ID;
use async_trait::async_trait;
use std::collections::HashMap;

pub struct LiveStripeService {
    client: stripe::Client,
    webhook_secret: String,
}

impl LiveStripeService {
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            client: stripe::Client::new(secret_key),
            webhook_secret: webhook_secret.into(),
        }
    }

    pub fn from_settings(settings: &crate::config::StripeSettings) -> Self {
        Self::new(settings.secret_key.clone(), settings.webhook_secret.clone())
    }
}

fn currency(code: &str) -> Result<stripe::Currency, StripeServiceError> {
    serde_json::from_value(serde_json::Value::String(code.to_ascii_lowercase()))
        .map_err(|_| StripeServiceError::InvalidRequest(format!("unsupported currency `{code}`")))
}

fn line_item(
    item: &CheckoutLineItem,
) -> Result<stripe::CreateCheckoutSessionLineItems, StripeServiceError> {
    let mut li = stripe::CreateCheckoutSessionLineItems {
        quantity: Some(1),
        ..Default::default()
    };
    match item {
        CheckoutLineItem::Price { price_id } => li.price = Some(price_id.clone()),
        CheckoutLineItem::Inline { name, amount } => {
            if amount.minor <= 0 {
                return Err(StripeServiceError::InvalidRequest(format!(
                    "inline price for `{name}` must be positive"
                )));
            }
            li.price_data = Some(stripe::CreateCheckoutSessionLineItemsPriceData {
                currency: currency(&amount.currency)?,
                product: None,
                product_data: Some(stripe::CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: name.clone(),
                    ..Default::default()
                }),
                recurring: None,
                tax_behavior: None,
                unit_amount: Some(amount.minor),
                unit_amount_decimal: None,
            });
        }
    }
    Ok(li)
}

#[async_trait]
impl StripeService for LiveStripeService {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError> {
        let customer = req
            .customer
            .parse::<stripe::CustomerId>()
            .map_err(|e| StripeServiceError::InvalidRequest(e.to_string()))?;
        let metadata: HashMap<String, String> = req.metadata.into_iter().collect();

        let mut params = stripe::CreateCheckoutSession::new();
        params.success_url = Some(&req.success_url);
        params.cancel_url = Some(&req.cancel_url);
        params.client_reference_id = Some(&req.client_reference_id);
        params.customer = Some(customer);
        params.line_items = Some(vec![line_item(&req.line_item)?]);
        match req.mode {
            CheckoutMode::Payment => {
                params.mode = Some(stripe::CheckoutSessionMode::Payment);
            }
            CheckoutMode::Subscription => {
                params.mode = Some(stripe::CheckoutSessionMode::Subscription);
                params.subscription_data = Some(stripe::CreateCheckoutSessionSubscriptionData {
                    metadata: Some(metadata.clone()),
                    ..Default::default()
                });
            }
        }
        params.metadata = Some(metadata);

        let session = stripe::CheckoutSession::create(&self.client, params).await?;
        Ok(CheckoutSession {
            id: session.id.to_string(),
            url: session.url,
        })
    }

    async fn create_customer(
        &self,
        email: &str,
        user_id: &str,
    ) -> Result<String, StripeServiceError> {
        let mut params = stripe::CreateCustomer::new();
        params.email = Some(email);
        params.metadata = Some(HashMap::from([(
            META_USER_ID.to_string(),
            user_id.to_string(),
        )]));
        let customer = stripe::Customer::create(&self.client, params).await?;
        Ok(customer.id.to_string())
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError> {
        let body =
            std::str::from_utf8(payload).map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        let event = stripe::Webhook::construct_event(body, signature_header, &self.webhook_secret)?;
        let payload =
            serde_json::to_value(&event).map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        Ok(StripeEvent {
            id: event.id.to_string(),
            r#type: event.type_.to_string(),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::money::Amount;

    #[test]
    fn inline_item_maps_to_price_data() {
        let li = line_item(&CheckoutLineItem::Inline {
            name: "Tip".into(),
            amount: Amount::from_minor(500, "usd"),
        })
        .unwrap();
        assert!(li.price.is_none());
        let data = li.price_data.unwrap();
        assert_eq!(data.unit_amount, Some(500));
        assert_eq!(data.currency, stripe::Currency::USD);
        assert_eq!(data.product_data.unwrap().name, "Tip");
    }

    #[test]
    fn catalog_item_maps_to_price_id() {
        let li = line_item(&CheckoutLineItem::Price {
            price_id: "price_vip_monthly".into(),
        })
        .unwrap();
        assert_eq!(li.price.as_deref(), Some("price_vip_monthly"));
        assert_eq!(li.quantity, Some(1));
    }

    #[test]
    fn non_positive_or_unknown_currency_is_rejected() {
        let zero = line_item(&CheckoutLineItem::Inline {
            name: "Free".into(),
            amount: Amount::from_minor(0, "usd"),
        });
        assert!(matches!(zero, Err(StripeServiceError::InvalidRequest(_))));

        let bogus = line_item(&CheckoutLineItem::Inline {
            name: "Odd".into(),
            amount: Amount::from_minor(100, "zzz"),
        });
        assert!(matches!(bogus, Err(StripeServiceError::InvalidRequest(_))));
    }
}
