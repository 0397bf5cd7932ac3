//! Reconciliation of verified provider events into ledger and entitlement state.
//!
//! Handlers take the shared [`AppState`](crate::state::AppState) so they reach the
//! repositories and the accounting forwarder the same way route handlers do.

pub mod checkout;
pub mod crypto;
pub mod entitlements;
pub mod event;
pub mod router;
pub mod subscriptions;

use crate::models::purchase::MetadataError;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("unresolvable event: {0}")]
    Unresolvable(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ReconcileError {
    /// Recoverable errors are acknowledged: a redelivery would fail the same way.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ReconcileError::Database(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// New ledger or subscription state was written.
    Applied,
    /// The provider transaction was already recorded; nothing changed.
    Duplicate,
    /// An older subscription update lost against newer stored state.
    Stale,
    /// Acknowledged without writes.
    Ignored,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::Duplicate => "duplicate",
            Outcome::Stale => "stale",
            Outcome::Ignored => "ignored",
        }
    }
}
