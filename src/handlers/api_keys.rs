//! API key management HTTP handlers.
//!
//! This module implements the credential management endpoints:
//! - POST /api/v1/keys - Issue a new key (plaintext revealed once)
//! - GET /api/v1/keys - List keys (prefix + metadata only)
//! - DELETE /api/v1/keys/{id} - Revoke a key
//!
//! All three sit behind the gate plus `require_identity`, so a verified
//! owner is always present in the request extensions.

use crate::{
    db::DbPool,
    error::AppError,
    middleware::gate::AuthContext,
    models::api_key::{ApiKeyResponse, CreateApiKeyRequest, CreateApiKeyResponse},
    services::api_key_service,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

/// Issue a new API key.
///
/// # Endpoint
///
/// `POST /api/v1/keys`
///
/// # Response
///
/// - **Success (201 Created)**: key metadata plus the plaintext token.
///   This is the only response that will ever contain the plaintext;
///   the body carries an explicit warning to that effect.
/// - **Error (409)**: owner already holds 5 active keys
/// - **Error (401)**: no verified identity
pub async fn create_key(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<CreateApiKeyResponse>), AppError> {
    let owner_id = auth.owner_id.ok_or(AppError::InvalidApiKey)?;

    if request.name.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "Key name must not be empty".to_string(),
        ));
    }

    let (key, plaintext) = api_key_service::issue(&pool, owner_id, request.name).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateApiKeyResponse::new(key, plaintext)),
    ))
}

/// List the authenticated owner's API keys.
///
/// # Endpoint
///
/// `GET /api/v1/keys`
///
/// Returns display prefixes and metadata, newest first. Neither the
/// plaintext nor the hash appears in any listing.
pub async fn list_keys(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ApiKeyResponse>>, AppError> {
    let owner_id = auth.owner_id.ok_or(AppError::InvalidApiKey)?;

    let keys = api_key_service::list(&pool, owner_id).await?;

    Ok(Json(keys))
}

/// Revoke an API key.
///
/// # Endpoint
///
/// `DELETE /api/v1/keys/{id}`
///
/// # Response
///
/// - **Success (204 No Content)**: key deactivated (idempotent; revoking
///   an already-revoked key also returns 204)
/// - **Error (404)**: key does not exist or belongs to another owner
pub async fn revoke_key(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let owner_id = auth.owner_id.ok_or(AppError::InvalidApiKey)?;

    api_key_service::revoke(&pool, owner_id, key_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
