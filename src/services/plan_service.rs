//! Subscription plan resolution.
//!
//! Given a verified owner identity, looks up the account's current tier.
//! The tier is written by the billing integration; this service only
//! reads it.

use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{account::Account, plan::Plan},
};

/// Resolve an owner's current plan.
///
/// # Degradation
///
/// A missing account row, or a stored tier string this build does not
/// recognize, resolves to [`Plan::Free`]: under-privileging is safe,
/// over-privileging is not. A database *error* is different; it
/// propagates, because granting or denying access during a store outage
/// is a policy decision the caller owns, not an accident of this lookup.
pub async fn resolve(pool: &DbPool, owner_id: Uuid) -> Result<Plan, AppError> {
    let account = sqlx::query_as::<_, Account>(
        "SELECT id, email, plan, created_at FROM accounts WHERE id = $1",
    )
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    let plan = match account {
        Some(account) => Plan::parse(&account.plan).unwrap_or_else(|| {
            tracing::warn!(owner_id = %owner_id, plan = %account.plan, "unrecognized plan; defaulting to free");
            Plan::Free
        }),
        None => {
            tracing::debug!(owner_id = %owner_id, "no account record; defaulting to free");
            Plan::Free
        }
    };

    Ok(plan)
}
