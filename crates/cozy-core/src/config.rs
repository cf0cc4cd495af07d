#![forbid(unsafe_code)]

//! Registry configuration.

use std::env;

/// Environment variable that makes deferred delivery the registry default.
pub const ASYNC_ENV: &str = "COZY_OBSERVE_ASYNC";

/// Settings for a [`Registry`](crate::observe::registry::Registry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryConfig {
    /// Dispatch mode for observations that do not choose one.
    pub default_async: bool,
}

impl RegistryConfig {
    /// Read settings from the environment.
    ///
    /// `COZY_OBSERVE_ASYNC` accepts `1`/`true`/`yes`/`on` (case-insensitive);
    /// anything else, or an unset variable, means synchronous delivery.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its
    /// value.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            default_async: lookup(ASYNC_ENV).is_some_and(|v| parse_flag(&v)),
        }
    }

    #[must_use]
    pub fn with_default_async(mut self, default_async: bool) -> Self {
        self.default_async = default_async;
        self
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
