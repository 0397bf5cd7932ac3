use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::payment::{PaymentProvider, PaymentType};
use super::subscription::BillingInterval;

pub const META_USER_ID: &str = "userId";
pub const META_TYPE: &str = "type";
pub const META_MEDIA_ID: &str = "mediaId";
pub const META_MESSAGE_ID: &str = "messageId";
pub const META_RECIPIENT_ID: &str = "recipientId";
pub const META_PLAN_ID: &str = "planId";
pub const META_BILLING_INTERVAL: &str = "billingInterval";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("metadata is missing `{0}`")]
    Missing(&'static str),
    #[error("unknown purchase type `{0}`")]
    UnknownType(String),
    #[error("metadata field `{field}` has invalid value `{value}`")]
    Invalid { field: &'static str, value: String },
}

/// What a checkout paid for, as carried in the provider's metadata bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Purchase {
    Subscription {
        user_id: String,
        plan_name: Option<String>,
        billing_interval: Option<BillingInterval>,
    },
    Media {
        user_id: String,
        media_id: String,
    },
    PpvUnlock {
        user_id: String,
        message_id: String,
    },
    Tip {
        user_id: String,
        message_id: Option<String>,
        recipient_id: Option<String>,
    },
}

fn field<'a>(meta: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    meta.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn required(meta: &BTreeMap<String, String>, key: &'static str) -> Result<String, MetadataError> {
    field(meta, key)
        .map(str::to_string)
        .ok_or(MetadataError::Missing(key))
}

impl Purchase {
    pub fn from_metadata(meta: &BTreeMap<String, String>) -> Result<Self, MetadataError> {
        let user_id = required(meta, META_USER_ID)?;
        let kind = required(meta, META_TYPE)?;

        match kind.as_str() {
            "subscription" => {
                let billing_interval = match field(meta, META_BILLING_INTERVAL) {
                    Some(raw) => Some(BillingInterval::parse(raw).ok_or_else(|| {
                        MetadataError::Invalid {
                            field: META_BILLING_INTERVAL,
                            value: raw.to_string(),
                        }
                    })?),
                    None => None,
                };
                Ok(Purchase::Subscription {
                    user_id,
                    plan_name: field(meta, META_PLAN_ID).map(str::to_string),
                    billing_interval,
                })
            }
            "media_purchase" => Ok(Purchase::Media {
                user_id,
                media_id: required(meta, META_MEDIA_ID)?,
            }),
            "ppv_unlock" => Ok(Purchase::PpvUnlock {
                user_id,
                message_id: required(meta, META_MESSAGE_ID)?,
            }),
            "tip" => Ok(Purchase::Tip {
                user_id,
                message_id: field(meta, META_MESSAGE_ID).map(str::to_string),
                recipient_id: field(meta, META_RECIPIENT_ID).map(str::to_string),
            }),
            other => Err(MetadataError::UnknownType(other.to_string())),
        }
    }

    /// The metadata bag checkout creation attaches; inverse of `from_metadata`.
    pub fn to_metadata(&self) -> BTreeMap<String, String> {
        let mut meta = BTreeMap::new();
        meta.insert(META_USER_ID.to_string(), self.user_id().to_string());
        meta.insert(META_TYPE.to_string(), self.kind().to_string());
        let mut put = |key: &str, value: Option<&String>| {
            if let Some(v) = value {
                meta.insert(key.to_string(), v.clone());
            }
        };
        match self {
            Purchase::Subscription {
                plan_name,
                billing_interval,
                ..
            } => {
                put(META_PLAN_ID, plan_name.as_ref());
                put(
                    META_BILLING_INTERVAL,
                    billing_interval.map(|i| i.as_str().to_string()).as_ref(),
                );
            }
            Purchase::Media { media_id, .. } => put(META_MEDIA_ID, Some(media_id)),
            Purchase::PpvUnlock { message_id, .. } => put(META_MESSAGE_ID, Some(message_id)),
            Purchase::Tip {
                message_id,
                recipient_id,
                ..
            } => {
                put(META_MESSAGE_ID, message_id.as_ref());
                put(META_RECIPIENT_ID, recipient_id.as_ref());
            }
        }
        meta
    }

    pub fn user_id(&self) -> &str {
        match self {
            Purchase::Subscription { user_id, .. }
            | Purchase::Media { user_id, .. }
            | Purchase::PpvUnlock { user_id, .. }
            | Purchase::Tip { user_id, .. } => user_id,
        }
    }

    /// Wire tag used in the `type` metadata key.
    pub fn kind(&self) -> &'static str {
        match self {
            Purchase::Subscription { .. } => "subscription",
            Purchase::Media { .. } => "media_purchase",
            Purchase::PpvUnlock { .. } => "ppv_unlock",
            Purchase::Tip { .. } => "tip",
        }
    }

    pub fn payment_type(&self) -> PaymentType {
        match self {
            Purchase::Subscription { .. } => PaymentType::Subscription,
            Purchase::Media { .. } => PaymentType::MediaPurchase,
            Purchase::PpvUnlock { .. } => PaymentType::PpvUnlock,
            Purchase::Tip { .. } => PaymentType::Tip,
        }
    }

    /// Audit blob stored on the Payment row, which has no foreign keys to these ids.
    pub fn audit_metadata(&self, provider: PaymentProvider) -> Value {
        let mut blob = json!({ "provider": provider.to_string() });
        let mut put = |key: &str, value: Option<&String>| {
            if let Some(v) = value {
                blob[key] = Value::String(v.clone());
            }
        };
        match self {
            Purchase::Subscription { plan_name, .. } => put(META_PLAN_ID, plan_name.as_ref()),
            Purchase::Media { media_id, .. } => put(META_MEDIA_ID, Some(media_id)),
            Purchase::PpvUnlock { message_id, .. } => put(META_MESSAGE_ID, Some(message_id)),
            Purchase::Tip {
                message_id,
                recipient_id,
                ..
            } => {
                put(META_MESSAGE_ID, message_id.as_ref());
                put(META_RECIPIENT_ID, recipient_id.as_ref());
            }
        }
        blob
    }
}
