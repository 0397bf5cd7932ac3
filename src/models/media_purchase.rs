use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use super::money::Amount;
use super::payment::{PaymentProvider, PaymentStatus};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MediaPurchase {
    pub id: String,
    pub user_id: String,
    pub media_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub provider: PaymentProvider,
    pub provider_transaction_id: String,
    pub status: PaymentStatus,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewMediaPurchase {
    pub user_id: String,
    pub media_id: String,
    pub amount: Amount,
    pub provider: PaymentProvider,
    pub provider_transaction_id: String,
    pub status: PaymentStatus,
}

impl NewMediaPurchase {
    pub fn into_purchase(self, created_at: OffsetDateTime) -> MediaPurchase {
        MediaPurchase {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id,
            media_id: self.media_id,
            amount_minor: self.amount.minor,
            currency: self.amount.currency,
            provider: self.provider,
            provider_transaction_id: self.provider_transaction_id,
            status: self.status,
            created_at,
        }
    }
}
