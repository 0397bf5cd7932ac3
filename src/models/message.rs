use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;

use super::money::Amount;
use super::payment::{PaymentProvider, PaymentStatus};

/// The slice of a chat message that payments touch.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub unlocked_by: Json<Vec<String>>,
    pub tip_total_minor: i64,
}

impl Message {
    pub fn is_unlocked_for(&self, user_id: &str) -> bool {
        self.unlocked_by.0.iter().any(|id| id == user_id)
    }
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "message_payment_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessagePaymentType {
    PpvUnlock,
    Tip,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MessagePayment {
    pub id: String,
    pub message_id: String,
    pub user_id: String,
    pub payment_type: MessagePaymentType,
    pub amount_minor: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub provider: PaymentProvider,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewMessagePayment {
    pub message_id: String,
    pub user_id: String,
    pub payment_type: MessagePaymentType,
    pub amount: Amount,
    pub status: PaymentStatus,
    pub provider: PaymentProvider,
}

impl NewMessagePayment {
    pub fn into_message_payment(self, created_at: OffsetDateTime) -> MessagePayment {
        MessagePayment {
            id: uuid::Uuid::new_v4().to_string(),
            message_id: self.message_id,
            user_id: self.user_id,
            payment_type: self.payment_type,
            amount_minor: self.amount.minor,
            currency: self.amount.currency,
            status: self.status,
            provider: self.provider,
            created_at,
        }
    }
}
