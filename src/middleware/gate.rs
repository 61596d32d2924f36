//! Request gate: authentication, tier resolution, and rate limiting.
//!
//! This middleware intercepts every data-API request to:
//! 1. Strip caller-supplied trust headers before anything can read them
//! 2. Establish identity from the `Authorization` bearer token, if any
//! 3. Resolve the owner's subscription plan
//! 4. Count the request against the tier's rate ceiling (atomic, in the
//!    shared store)
//! 5. Forward with gateway-verified trust headers, or reject with
//!    401 / 429
//!
//! # Trust Boundary
//!
//! `X-Gateway-Owner-Id` and `X-Gateway-Plan` are written only by this
//! middleware, after verification. Every inbound occurrence of those
//! names is removed first, so a forged `X-Gateway-Plan: enterprise` from
//! the wire can never reach a downstream handler.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    models::plan::Plan,
    services::{api_key_service, plan_service, rate_limit},
};

/// Header carrying the verified owner id to downstream handlers.
pub const OWNER_HEADER: &str = "x-gateway-owner-id";

/// Header carrying the verified plan to downstream handlers.
pub const PLAN_HEADER: &str = "x-gateway-plan";

/// The allow-list of trust headers only the gate may write.
const GATEWAY_TRUST_HEADERS: [&str; 2] = [OWNER_HEADER, PLAN_HEADER];

/// Verified identity attached to every gated request.
///
/// Inserted into the request's extension map by the gate; anonymous
/// requests carry a context with no owner and the free plan. Handlers
/// extract it with `Extension<AuthContext>`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Verified owner account, if the caller presented a valid key
    pub owner_id: Option<Uuid>,

    /// The API key that authenticated this request
    pub key_id: Option<Uuid>,

    /// Resolved subscription tier (free for anonymous callers)
    pub plan: Plan,
}

impl AuthContext {
    fn anonymous() -> Self {
        Self {
            owner_id: None,
            key_id: None,
            plan: Plan::Free,
        }
    }

    /// Guard for endpoints that require a minimum tier.
    ///
    /// # Errors
    ///
    /// `InsufficientPlan` (403) naming the required tier when this
    /// request's plan is below it.
    pub fn require_plan(&self, minimum: Plan) -> Result<(), AppError> {
        if self.plan >= minimum {
            Ok(())
        } else {
            Err(AppError::InsufficientPlan(minimum))
        }
    }
}

/// Request gate middleware.
///
/// # Flow
///
/// 1. No `Authorization` header: proceed as anonymous free tier,
///    rate-limited by client IP
/// 2. Bearer value without the issued token shape: 401, no store lookup
/// 3. Otherwise verify the credential (401 on failure) and resolve the
///    plan; paid tiers are rate-limited per owner
/// 4. Rate check; over the ceiling short-circuits with 429
/// 5. Forward with fresh trust headers and mirror the rate telemetry
///    onto the response
///
/// # Store Outage Policy
///
/// If the counter store is unreachable, free and anonymous traffic is
/// admitted unmetered (with a warning log and no telemetry headers);
/// paid tiers are rejected with 500. See DESIGN.md.
pub async fn gate_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Drop any trust assertion the caller smuggled in. This happens
    // before verification so no later step can observe forged values.
    strip_trust_headers(request.headers_mut());

    let client_ip = client_ip(request.headers());

    let auth = match extract_bearer(request.headers())? {
        None => AuthContext::anonymous(),
        Some(token) => {
            // A value that cannot have been issued is malformed; don't
            // spend a store round trip on it.
            if !api_key_service::token_shape_valid(&token) {
                return Err(AppError::MalformedAuthHeader);
            }

            let key = api_key_service::verify(&state.pool, &token).await?;
            let plan = plan_service::resolve(&state.pool, key.owner_id).await?;
            tracing::debug!(key_id = %key.id, owner_id = %key.owner_id, plan = %plan, "verified API key");

            AuthContext {
                owner_id: Some(key.owner_id),
                key_id: Some(key.id),
                plan,
            }
        }
    };

    let identifier = rate_limit::identifier_for(auth.plan, auth.owner_id, &client_ip);

    let decision = match state.limiter.check(&identifier, auth.plan).await {
        Ok(decision) => Some(decision),
        Err(e) if auth.plan == Plan::Free => {
            tracing::warn!(identifier = %identifier, "rate-limit store unreachable; admitting free-tier request: {e}");
            None
        }
        Err(e) => return Err(AppError::Internal(e)),
    };

    if let Some(decision) = decision {
        if !decision.allowed {
            return Err(AppError::RateLimited(decision));
        }
    }

    apply_trust_headers(request.headers_mut(), &auth);
    request.extensions_mut().insert(auth);

    let mut response = next.run(request).await;

    if let Some(decision) = decision {
        let headers = response.headers_mut();
        headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));
        headers.insert("X-RateLimit-Reset", HeaderValue::from(decision.reset_at_ms));
    }

    Ok(response)
}

/// Reject anonymous requests.
///
/// Layered inside the gate on the key-management routes, which are
/// meaningless without a verified owner.
pub async fn require_identity(request: Request, next: Next) -> Result<Response, AppError> {
    let verified = request
        .extensions()
        .get::<AuthContext>()
        .is_some_and(|auth| auth.owner_id.is_some());

    if !verified {
        return Err(AppError::InvalidApiKey);
    }

    Ok(next.run(request).await)
}

/// Extract the bearer token from the `Authorization` header.
///
/// Returns `Ok(None)` when the header is absent (anonymous traffic).
/// A header that is present but is not `Bearer <value>` is malformed.
fn extract_bearer(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    let Some(header) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let value = header.to_str().map_err(|_| AppError::MalformedAuthHeader)?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(AppError::MalformedAuthHeader)?;

    Ok(Some(token.to_string()))
}

/// Remove every inbound occurrence of the gateway-owned trust headers.
fn strip_trust_headers(headers: &mut HeaderMap) {
    for name in GATEWAY_TRUST_HEADERS {
        headers.remove(name);
    }
}

/// Attach the verified identity for downstream consumption.
fn apply_trust_headers(headers: &mut HeaderMap, auth: &AuthContext) {
    headers.insert(PLAN_HEADER, HeaderValue::from_static(auth.plan.as_str()));

    if let Some(owner_id) = auth.owner_id {
        let value = HeaderValue::from_str(&owner_id.to_string())
            .expect("UUID is a valid header value");
        headers.insert(OWNER_HEADER, value);
    }
}

/// Client address for IP-keyed rate limiting.
///
/// Taken from the proxy header chain: first `X-Forwarded-For` entry,
/// then `X-Real-IP`, then a loopback placeholder. The gateway sits
/// behind a trusted proxy; these headers are set by it, not the caller.
fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    "127.0.0.1".to_string()
}
