//! Subscription plan tiers and their rate ceilings.
//!
//! Every account holds exactly one plan. The plan is mutated out-of-band
//! (billing provider or administrative action); this service only reads it
//! to decide rate ceilings and endpoint access.

use serde::{Deserialize, Serialize};

/// Subscription tier of an account.
///
/// # Ordering
///
/// Variants are ordered `Free < Pro < Enterprise`, so minimum-tier checks
/// can be written as `plan >= Plan::Pro`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    /// Free tier: 60 requests/minute, rate-limited by client IP.
    Free,

    /// Pro tier: 600 requests/minute, rate-limited per owner.
    Pro,

    /// Enterprise tier: 3000 requests/minute, rate-limited per owner.
    Enterprise,
}

impl Plan {
    /// Request ceiling for this plan within one rate-limit window.
    pub fn requests_per_minute(&self) -> i64 {
        match self {
            Plan::Free => 60,
            Plan::Pro => 600,
            Plan::Enterprise => 3000,
        }
    }

    /// Parse the tier string stored in the `accounts.plan` column.
    ///
    /// Returns `None` for anything that is not a known tier. Callers decide
    /// the fallback (the plan resolver degrades to [`Plan::Free`]).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(Plan::Free),
            "pro" => Some(Plan::Pro),
            "enterprise" => Some(Plan::Enterprise),
            _ => None,
        }
    }

    /// Canonical lowercase name, as stored in the database and used in
    /// rate-limit identifiers and gateway headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tiers() {
        assert_eq!(Plan::parse("free"), Some(Plan::Free));
        assert_eq!(Plan::parse("pro"), Some(Plan::Pro));
        assert_eq!(Plan::parse("enterprise"), Some(Plan::Enterprise));
    }

    #[test]
    fn rejects_unknown_tiers() {
        assert_eq!(Plan::parse("platinum"), None);
        assert_eq!(Plan::parse("PRO"), None);
        assert_eq!(Plan::parse(""), None);
    }

    #[test]
    fn tier_ordering_for_guards() {
        assert!(Plan::Free < Plan::Pro);
        assert!(Plan::Pro < Plan::Enterprise);
        assert!(Plan::Enterprise >= Plan::Pro);
    }

    #[test]
    fn ceilings_match_tiers() {
        assert_eq!(Plan::Free.requests_per_minute(), 60);
        assert_eq!(Plan::Pro.requests_per_minute(), 600);
        assert_eq!(Plan::Enterprise.requests_per_minute(), 3000);
    }

    #[test]
    fn display_roundtrips_through_parse() {
        for plan in [Plan::Free, Plan::Pro, Plan::Enterprise] {
            assert_eq!(Plan::parse(plan.as_str()), Some(plan));
        }
    }
}
