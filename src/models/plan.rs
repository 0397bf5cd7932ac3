use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Catalog entry a subscription points at. Provider metadata refers to plans by
/// `name`, not by id.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Plan {
    pub id: String,
    pub name: String,
}
