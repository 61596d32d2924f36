//! Business logic services.
//!
//! Services contain the gateway's core logic separated from HTTP
//! handlers: credential storage, plan resolution, and rate limiting.

pub mod api_key_service;
pub mod plan_service;
pub mod rate_limit;
