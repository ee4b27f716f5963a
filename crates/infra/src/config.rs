//! Configuration loading and representation.

use std::str::FromStr;

/// Runtime knobs for the inventory core, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryConfig {
    /// Bounded retries of the ledger's optimistic commit before `Contention`.
    pub max_commit_retries: u32,
    /// Also append `RESERVATION` entries for reserve/release.
    pub log_reservations: bool,
    /// Horizon (days) of the expiring-stock query.
    pub expiry_warning_days: i64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            max_commit_retries: 16,
            log_reservations: false,
            expiry_warning_days: 30,
        }
    }
}

impl InventoryConfig {
    pub const MAX_COMMIT_RETRIES: &'static str = "STOCKCORE_MAX_COMMIT_RETRIES";
    pub const LOG_RESERVATIONS: &'static str = "STOCKCORE_LOG_RESERVATIONS";
    pub const EXPIRY_WARNING_DAYS: &'static str = "STOCKCORE_EXPIRY_WARNING_DAYS";

    /// Load from process environment variables; unset or invalid values fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_commit_retries: parse_or(
                &lookup,
                Self::MAX_COMMIT_RETRIES,
                defaults.max_commit_retries,
            ),
            log_reservations: lookup(Self::LOG_RESERVATIONS)
                .map(|v| parse_flag(Self::LOG_RESERVATIONS, &v, defaults.log_reservations))
                .unwrap_or(defaults.log_reservations),
            expiry_warning_days: parse_or(
                &lookup,
                Self::EXPIRY_WARNING_DAYS,
                defaults.expiry_warning_days,
            ),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: FromStr + core::fmt::Debug,
{
    match lookup(name) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, ?default, "invalid value; using default");
            default
        }),
    }
}

fn parse_flag(name: &str, raw: &str, default: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            tracing::warn!(variable = name, value = %raw, default, "invalid flag; using default");
            default
        }
    }
}
