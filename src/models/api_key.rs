//! API key data models and request/response types.
//!
//! API keys authenticate callers of the public data API. Only a SHA-256
//! hash of the token is ever stored; the plaintext exists once, in the
//! creation response.
//!
//! # Token Format
//!
//! `dash_` followed by 40 lowercase hex characters (20 random bytes).
//! The first 15 characters are retained as `key_prefix` so owners can
//! recognize their keys in listings without the secret ever being
//! recoverable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table:
/// - `key_hash`: SHA-256 hash of the full token (64 hex characters)
/// - `key_prefix`: first 15 characters of the token, for listings
/// - `is_active`: revocation flag; revoked keys are kept for audit,
///   never deleted
/// - `last_used_at`: best-effort timestamp written after successful
///   verification
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    /// Unique identifier for this API key
    pub id: Uuid,

    /// Account that owns this key
    pub owner_id: Uuid,

    /// Owner-chosen display name
    pub name: String,

    /// Non-secret prefix of the original token
    pub key_prefix: String,

    /// SHA-256 hash of the full token
    ///
    /// The only representation checked at verification time. Inactive
    /// rows never match, so revocation takes effect on the next lookup.
    pub key_hash: String,

    /// Whether this key is currently valid
    pub is_active: bool,

    /// When this key last passed verification (best effort)
    pub last_used_at: Option<DateTime<Utc>>,

    /// Timestamp when this key was created
    pub created_at: DateTime<Utc>,
}

/// Request body for creating a new API key.
///
/// # JSON Example
///
/// ```json
/// {
///   "name": "CI pipeline"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    /// Display name for the new key
    pub name: String,
}

/// Response body for key listings and as the metadata part of creation.
///
/// Never contains `key_hash` or the plaintext token.
#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    /// Key unique identifier
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Non-secret token prefix for recognition in listings
    pub key_prefix: String,

    /// Whether the key is active
    pub is_active: bool,

    /// When the key last passed verification
    pub last_used_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl From<ApiKey> for ApiKeyResponse {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name,
            key_prefix: key.key_prefix,
            is_active: key.is_active,
            last_used_at: key.last_used_at,
            created_at: key.created_at,
        }
    }
}

/// Response returned once, at key creation.
///
/// # One-Time Reveal
///
/// `key` is the full plaintext token. No other endpoint can reproduce it;
/// after this response only the hash and the prefix exist.
///
/// # JSON Example
///
/// ```json
/// {
///   "api_key": {
///     "id": "550e8400-e29b-41d4-a716-446655440000",
///     "name": "CI pipeline",
///     "key_prefix": "dash_3fa85f64a1",
///     "is_active": true,
///     "last_used_at": null,
///     "created_at": "2025-06-01T10:00:00Z"
///   },
///   "key": "dash_3fa85f64a1b2c3d4e5f60718293a4b5c6d7e8f90",
///   "warning": "Store this key now; it cannot be retrieved again."
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct CreateApiKeyResponse {
    /// Key metadata (the same shape listings return)
    pub api_key: ApiKeyResponse,

    /// Full plaintext token, shown only here
    pub key: String,

    /// Reminder that the plaintext is not retrievable again
    pub warning: &'static str,
}

impl CreateApiKeyResponse {
    /// Build the creation response around the freshly issued plaintext.
    pub fn new(key_record: ApiKey, plaintext: String) -> Self {
        Self {
            api_key: key_record.into(),
            key: plaintext,
            warning: "Store this key now; it cannot be retrieved again.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> ApiKey {
        ApiKey {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "test".to_string(),
            key_prefix: "dash_0123456789".to_string(),
            key_hash: "ab".repeat(32),
            is_active: true,
            last_used_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn listing_response_never_serializes_hash() {
        let response: ApiKeyResponse = sample_key().into();
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("key_hash").is_none());
        assert!(json.get("key").is_none());
        assert_eq!(json["key_prefix"], "dash_0123456789");
    }

    #[test]
    fn creation_response_carries_plaintext_and_warning() {
        let plaintext = "dash_0123456789abcdef0123456789abcdef01234567".to_string();
        let response = CreateApiKeyResponse::new(sample_key(), plaintext.clone());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["key"], plaintext.as_str());
        assert!(json["warning"].as_str().unwrap().contains("cannot be retrieved"));
        // Metadata side still hides the hash.
        assert!(json["api_key"].get("key_hash").is_none());
    }
}
