//! # Rate Limit Configuration
//!
//! Named policies and the limiter-wide settings that go with them.
//!
//! ## Fixed Windows
//!
//! ```text
//!     Policy "login": 5 requests / 15 min
//!
//!     t=0          first request opens the window
//!     ├─ req 1..5  allowed (remaining 4..0)
//!     ├─ req 6     denied, retry after (reset - now)
//!     t=15min ──── window ends
//!     └─ next req  opens a fresh window (count = 1)
//! ```
//!
//! Each policy keeps its own counters. Two policies never share budget even
//! when the same client hits both endpoints.

use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Policy name for sign-in attempts.
pub const LOGIN: &str = "login";

/// Policy name for account registration.
pub const REGISTER: &str = "register";

/// Policy name for password reset requests.
pub const FORGOT_PASSWORD: &str = "forgot_password";

/// Policy name for newsletter subscriptions.
pub const NEWSLETTER: &str = "newsletter";

/// Policy name for comment posting.
pub const COMMENTS: &str = "comments";

/// Default interval between expiry sweeps (one minute).
pub const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 60_000;

const MINUTE_MS: u64 = 60_000;

/// A request ceiling applied per identity over a fixed window.
///
/// # Example
///
/// ```rust
/// use newsdesk::RateLimitPolicy;
///
/// let policy = RateLimitPolicy::per_minutes("login", 5, 15);
/// assert_eq!(policy.window_ms, 900_000);
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RateLimitPolicy {
    /// Name of the policy. Becomes the prefix of every counter key.
    ///
    /// Left empty in config files; filled from the map key on load.
    #[serde(default)]
    pub name: String,

    /// Maximum admitted requests per window.
    pub max_requests: u32,

    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl RateLimitPolicy {
    /// Creates a policy with an explicit window in milliseconds.
    pub fn new(name: impl Into<String>, max_requests: u32, window_ms: u64) -> Self {
        Self {
            name: name.into(),
            max_requests,
            window_ms,
        }
    }

    /// Creates a policy with a window expressed in minutes.
    pub fn per_minutes(name: impl Into<String>, max_requests: u32, minutes: u64) -> Self {
        Self::new(name, max_requests, minutes * MINUTE_MS)
    }

    /// Returns the window as a `Duration`.
    #[inline]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Checks that the policy can be enforced.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::EmptyPolicyName`] if `name` is empty
    /// - [`ConfigError::ZeroMaxRequests`] if `max_requests` is 0
    /// - [`ConfigError::ZeroWindow`] if `window_ms` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyPolicyName);
        }
        if self.max_requests == 0 {
            return Err(ConfigError::ZeroMaxRequests(self.name.clone()));
        }
        if self.window_ms == 0 {
            return Err(ConfigError::ZeroWindow(self.name.clone()));
        }
        Ok(())
    }

    /// Builds the counter key for an identity under this policy.
    #[inline]
    pub(crate) fn key_for(&self, identity: &str) -> String {
        let mut key = String::with_capacity(self.name.len() + 1 + identity.len());
        key.push_str(&self.name);
        key.push(':');
        key.push_str(identity);
        key
    }
}

/// Limiter-wide configuration: the named policies plus sweep cadence.
///
/// `Default` yields the portal's stock policies:
///
/// | Policy            | Ceiling | Window |
/// |-------------------|---------|--------|
/// | `login`           | 5       | 15 min |
/// | `register`        | 3       | 60 min |
/// | `forgot_password` | 3       | 60 min |
/// | `newsletter`      | 5       | 60 min |
/// | `comments`        | 10      | 5 min  |
///
/// # Example
///
/// ```rust
/// use newsdesk::{RateLimitConfig, RateLimitPolicy};
///
/// let config = RateLimitConfig::default()
///     .with_policy(RateLimitPolicy::per_minutes("comments", 20, 5));
///
/// assert_eq!(config.policy("comments").unwrap().max_requests, 20);
/// assert_eq!(config.policy("login").unwrap().max_requests, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawRateLimitConfig")]
pub struct RateLimitConfig {
    /// Policies keyed by name.
    pub policies: BTreeMap<String, RateLimitPolicy>,

    /// Minimum spacing between expiry sweeps, in milliseconds.
    pub cleanup_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            policies: default_policies(),
            cleanup_interval_ms: DEFAULT_CLEANUP_INTERVAL_MS,
        }
    }
}

impl RateLimitConfig {
    /// Creates a configuration with no policies.
    pub fn empty() -> Self {
        Self {
            policies: BTreeMap::new(),
            cleanup_interval_ms: DEFAULT_CLEANUP_INTERVAL_MS,
        }
    }

    /// Adds or replaces a policy, keyed by its name.
    pub fn with_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.policies.insert(policy.name.clone(), policy);
        self
    }

    /// Sets the sweep interval.
    pub fn with_cleanup_interval_ms(mut self, ms: u64) -> Self {
        self.cleanup_interval_ms = ms;
        self
    }

    /// Looks up a policy by name.
    #[inline]
    pub fn policy(&self, name: &str) -> Option<&RateLimitPolicy> {
        self.policies.get(name)
    }

    /// Validates every policy and the sweep interval.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cleanup_interval_ms == 0 {
            return Err(ConfigError::ZeroCleanupInterval);
        }
        for (key, policy) in &self.policies {
            policy.validate()?;
            if key != &policy.name {
                return Err(ConfigError::NameMismatch {
                    key: key.clone(),
                    name: policy.name.clone(),
                });
            }
        }
        Ok(())
    }
}

fn default_policies() -> BTreeMap<String, RateLimitPolicy> {
    [
        RateLimitPolicy::per_minutes(LOGIN, 5, 15),
        RateLimitPolicy::per_minutes(REGISTER, 3, 60),
        RateLimitPolicy::per_minutes(FORGOT_PASSWORD, 3, 60),
        RateLimitPolicy::per_minutes(NEWSLETTER, 5, 60),
        RateLimitPolicy::per_minutes(COMMENTS, 10, 5),
    ]
    .into_iter()
    .map(|policy| (policy.name.clone(), policy))
    .collect()
}

fn default_cleanup_interval_ms() -> u64 {
    DEFAULT_CLEANUP_INTERVAL_MS
}

// On-disk shape: policy names come from the map keys.
#[derive(Deserialize)]
struct RawRateLimitConfig {
    #[serde(default = "default_policies")]
    policies: BTreeMap<String, RateLimitPolicy>,
    #[serde(default = "default_cleanup_interval_ms")]
    cleanup_interval_ms: u64,
}

impl From<RawRateLimitConfig> for RateLimitConfig {
    fn from(raw: RawRateLimitConfig) -> Self {
        let policies = raw
            .policies
            .into_iter()
            .map(|(key, mut policy)| {
                if policy.name.is_empty() {
                    policy.name = key.clone();
                }
                (key, policy)
            })
            .collect();

        Self {
            policies,
            cleanup_interval_ms: raw.cleanup_interval_ms,
        }
    }
}
