//! # Rate Limiter Module
//!
//! Per-identity fixed-window throttling for the portal's sensitive endpoints.
//!
//! ## Module Structure
//!
//! ```text
//!     rate_limiter/
//!     ├── mod.rs          (You are here - Module organization)
//!     ├── config.rs       (Named policies and sweep settings)
//!     ├── core.rs         (Concurrent counter store)
//!     ├── manager.rs      (Policy-aware limiter and sweep scheduling)
//!     ├── metrics.rs      (Per-policy counters and health)
//!     └── identity.rs     (Client identity from proxy headers)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     Request headers
//!          │ derive_client_identity()
//!          ▼
//!     ┌─────────┐
//!     │ Manager │ ◄── Policy lookup, metrics, sweep gate
//!     └────┬────┘
//!          │
//!          ▼
//!     ┌─────────┐
//!     │  Core   │ ◄── Atomic check-and-increment per key
//!     └─────────┘
//! ```

mod config;
mod core;
mod identity;
mod manager;
mod metrics;

/// Policy configuration and the stock policy names
pub use config::{
    RateLimitConfig, RateLimitPolicy, COMMENTS, DEFAULT_CLEANUP_INTERVAL_MS, FORGOT_PASSWORD,
    LOGIN, NEWSLETTER, REGISTER,
};

/// Counter store and check outcomes
pub use core::{RateLimitEntry, RateLimitResult, RateLimitStore};

/// Identity derivation from request headers
pub use identity::{
    derive_client_identity, HeaderSource, FORWARDED_FOR_HEADER, REAL_IP_HEADER, UNKNOWN_IDENTITY,
};

/// The limiter handlers call into
pub use manager::{LimiterStats, RateLimiter};

/// Per-policy metrics
pub use metrics::{HealthStatus, PolicyMetrics};
