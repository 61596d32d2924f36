//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the request/response types the API exchanges with clients.

/// Account (credential owner) model
pub mod account;
/// API key model and management DTOs
pub mod api_key;
/// Subscription plan tiers
pub mod plan;
