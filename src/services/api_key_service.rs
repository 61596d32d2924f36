//! API key issuance, verification, listing, and revocation.
//!
//! This is the credential store behind the request gate. Tokens are
//! generated with 160 bits of entropy, stored only as SHA-256 hashes, and
//! revoked by deactivation so the audit trail survives.
//!
//! # Token Lifecycle
//!
//! 1. `issue` generates `dash_<40 hex>` and returns the plaintext once
//! 2. `verify` hashes a presented token and looks up an active record
//! 3. `revoke` flips `is_active`; the very next `verify` fails
//!
//! The plaintext exists only in step 1's return value. Every other read
//! path sees the prefix or the hash.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::api_key::{ApiKey, ApiKeyResponse},
};

/// Fixed literal prefix of every issued token.
pub const TOKEN_PREFIX: &str = "dash_";

/// Random bytes per token: 20 bytes = 160 bits of entropy.
const TOKEN_RANDOM_BYTES: usize = 20;

/// Characters of the token retained as the non-secret display prefix.
const DISPLAY_PREFIX_LEN: usize = 15;

/// Active keys an owner may hold at once.
pub const MAX_ACTIVE_KEYS: i64 = 5;

/// Generate a fresh token: the fixed prefix plus 40 lowercase hex chars.
fn generate_token() -> String {
    let bytes: [u8; TOKEN_RANDOM_BYTES] = rand::random();
    format!("{TOKEN_PREFIX}{}", hex::encode(bytes))
}

/// SHA-256 digest of the full token, hex-encoded.
///
/// This is the only representation ever compared at verification time.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether a presented bearer value has the shape of an issued token.
///
/// The gate calls this before any store round trip: a value that cannot
/// have been issued is rejected as malformed without touching the
/// database.
pub fn token_shape_valid(token: &str) -> bool {
    match token.strip_prefix(TOKEN_PREFIX) {
        Some(rest) => {
            rest.len() == TOKEN_RANDOM_BYTES * 2
                && rest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        }
        None => false,
    }
}

/// Issue a new API key for an owner.
///
/// # Process
///
/// 1. Generate token, hash, and display prefix
/// 2. Inside a transaction, count the owner's active keys
/// 3. Reject with `KeyLimitReached` at the cap, insert otherwise
///
/// The cap check and insert share one transaction so two racing creations
/// by the same owner cannot both slip under the cap.
///
/// # Returns
///
/// The stored record and the plaintext token. The plaintext is returned
/// exactly once, here; it is never persisted.
pub async fn issue(
    pool: &DbPool,
    owner_id: Uuid,
    name: String,
) -> Result<(ApiKey, String), AppError> {
    let token = generate_token();
    let key_hash = hash_token(&token);
    let key_prefix: String = token.chars().take(DISPLAY_PREFIX_LEN).collect();

    let mut tx = pool.begin().await?;

    let active_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM api_keys WHERE owner_id = $1 AND is_active = true",
    )
    .bind(owner_id)
    .fetch_one(&mut *tx)
    .await?;

    if active_count >= MAX_ACTIVE_KEYS {
        tx.rollback().await?;
        return Err(AppError::KeyLimitReached);
    }

    let key = sqlx::query_as::<_, ApiKey>(
        r#"
        INSERT INTO api_keys (owner_id, name, key_prefix, key_hash)
        VALUES ($1, $2, $3, $4)
        RETURNING id, owner_id, name, key_prefix, key_hash, is_active, last_used_at, created_at
        "#,
    )
    .bind(owner_id)
    .bind(&name)
    .bind(&key_prefix)
    .bind(&key_hash)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(owner_id = %owner_id, key_id = %key.id, "issued API key");

    Ok((key, token))
}

/// Verify a presented token against the credential store.
///
/// Hashes the token and looks up an **active** record with a matching
/// hash. Unknown secret, wrong secret, and revoked secret all return the
/// same `InvalidApiKey`; the response never reveals whether a token ever
/// existed.
///
/// On success, `last_used_at` is updated on a detached task. That write
/// is off the critical path and its failure never fails the request.
pub async fn verify(pool: &DbPool, token: &str) -> Result<ApiKey, AppError> {
    let key_hash = hash_token(token);

    let key = sqlx::query_as::<_, ApiKey>(
        r#"
        SELECT id, owner_id, name, key_prefix, key_hash, is_active, last_used_at, created_at
        FROM api_keys
        WHERE key_hash = $1 AND is_active = true
        "#,
    )
    .bind(&key_hash)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::InvalidApiKey)?;

    touch_last_used(pool.clone(), key.id);

    Ok(key)
}

/// Best-effort `last_used_at` update, fire-and-forget.
fn touch_last_used(pool: DbPool, key_id: Uuid) {
    tokio::spawn(async move {
        let result = sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = $1")
            .bind(key_id)
            .execute(&pool)
            .await;

        if let Err(e) = result {
            tracing::warn!(key_id = %key_id, "failed to record last_used_at: {e}");
        }
    });
}

/// List an owner's API keys, newest first.
///
/// Responses carry the display prefix and metadata only; the hash never
/// leaves this module and the plaintext no longer exists.
pub async fn list(pool: &DbPool, owner_id: Uuid) -> Result<Vec<ApiKeyResponse>, AppError> {
    let keys = sqlx::query_as::<_, ApiKey>(
        r#"
        SELECT id, owner_id, name, key_prefix, key_hash, is_active, last_used_at, created_at
        FROM api_keys
        WHERE owner_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(keys.into_iter().map(Into::into).collect())
}

/// Revoke an API key by deactivating it.
///
/// Owner-scoped: the update matches both id and owner, so a caller cannot
/// revoke another account's key (the attempt reads as not-found).
/// Idempotent: revoking an already-revoked key succeeds. Because `verify`
/// only matches active rows and reads the store directly, revocation is
/// effective on the very next verification.
pub async fn revoke(pool: &DbPool, owner_id: Uuid, key_id: Uuid) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE api_keys SET is_active = false WHERE id = $1 AND owner_id = $2")
        .bind(key_id)
        .bind(owner_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::KeyNotFound);
    }

    tracing::info!(owner_id = %owner_id, key_id = %key_id, "revoked API key");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_have_the_documented_shape() {
        let token = generate_token();
        assert!(token.starts_with(TOKEN_PREFIX));
        assert_eq!(token.len(), TOKEN_PREFIX.len() + TOKEN_RANDOM_BYTES * 2);
        assert!(token_shape_valid(&token));
    }

    #[test]
    fn generated_tokens_are_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
    }

    #[test]
    fn shape_check_rejects_foreign_values() {
        assert!(!token_shape_valid(""));
        assert!(!token_shape_valid("dash_"));
        assert!(!token_shape_valid("dash_short"));
        // Wrong prefix
        assert!(!token_shape_valid(&format!("key_{}", "a".repeat(40))));
        // Right length, non-hex payload
        assert!(!token_shape_valid(&format!("dash_{}", "z".repeat(40))));
        // Uppercase hex is never issued
        assert!(!token_shape_valid(&format!("dash_{}", "A".repeat(40))));
    }

    #[test]
    fn shape_check_accepts_issued_form() {
        assert!(token_shape_valid(&format!("dash_{}", "0123456789abcdef".repeat(2) + "01234567")));
    }

    #[test]
    fn hash_is_stable_and_not_the_token() {
        let token = generate_token();
        let hash = hash_token(&token);
        assert_eq!(hash, hash_token(&token));
        assert_eq!(hash.len(), 64);
        assert!(!hash.contains(TOKEN_PREFIX));
    }

    #[test]
    fn display_prefix_reveals_only_fifteen_characters() {
        let token = generate_token();
        let prefix: String = token.chars().take(DISPLAY_PREFIX_LEN).collect();
        assert_eq!(prefix.len(), 15);
        // 10 hex chars of a 40-char payload: not enough to reconstruct.
        assert!(token.len() - prefix.len() >= 30);
    }
}
