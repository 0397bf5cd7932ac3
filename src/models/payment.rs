use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use time::OffsetDateTime;

use super::money::Amount;

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }

    /// Statuses a row may hold when it moves to `self`. Settled payments only
    /// move to REFUNDED; failed and refunded rows stay put.
    pub fn reachable_from(&self) -> &'static [PaymentStatus] {
        match self {
            PaymentStatus::Pending => &[],
            PaymentStatus::Completed | PaymentStatus::Failed | PaymentStatus::Cancelled => {
                &[PaymentStatus::Pending]
            }
            PaymentStatus::Refunded => &[PaymentStatus::Pending, PaymentStatus::Completed],
        }
    }
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[sqlx(type_name = "payment_provider", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentProvider {
    Stripe,
    Crypto,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "STRIPE",
            PaymentProvider::Crypto => "CRYPTO",
        }
    }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::Crypto => "crypto",
        };
        write!(f, "{}", s)
    }
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "payment_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Subscription,
    MediaPurchase,
    PpvUnlock,
    Tip,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Subscription => "SUBSCRIPTION",
            PaymentType::MediaPurchase => "MEDIA_PURCHASE",
            PaymentType::PpvUnlock => "PPV_UNLOCK",
            PaymentType::Tip => "TIP",
        }
    }
}

/// Ledger row for one money movement.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub user_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub provider: PaymentProvider,
    pub provider_transaction_id: String,
    pub payment_type: PaymentType,
    pub metadata: Value,
    pub created_at: OffsetDateTime,
}

impl Payment {
    pub fn amount(&self) -> Amount {
        Amount::from_minor(self.amount_minor, &self.currency)
    }
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: String,
    pub amount: Amount,
    pub status: PaymentStatus,
    pub provider: PaymentProvider,
    pub provider_transaction_id: String,
    pub payment_type: PaymentType,
    pub metadata: Value,
}

impl NewPayment {
    /// Materializes the row a repository will insert, assigning a fresh id.
    pub fn into_payment(self, created_at: OffsetDateTime) -> Payment {
        Payment {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id,
            amount_minor: self.amount.minor,
            currency: self.amount.currency,
            status: self.status,
            provider: self.provider,
            provider_transaction_id: self.provider_transaction_id,
            payment_type: self.payment_type,
            metadata: self.metadata,
            created_at,
        }
    }
}
