//! Account data model.
//!
//! An account is the owner identity behind API credentials. The gateway
//! reads an account's plan to resolve rate ceilings; plan changes are made
//! by the billing integration, never here.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Represents an account record from the database.
///
/// # Database Table
///
/// Maps to the `accounts` table. The `plan` column holds one of
/// `free`, `pro`, `enterprise` (enforced by a CHECK constraint) and is
/// read-only from the gateway's perspective.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Account {
    /// Unique identifier for this account
    pub id: Uuid,

    /// Contact email for the account owner
    pub email: String,

    /// Current subscription tier as stored (`free`, `pro`, `enterprise`)
    pub plan: String,

    /// Timestamp when the account was created
    pub created_at: DateTime<Utc>,
}
