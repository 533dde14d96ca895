//! Sliding-window rate limiting.
//!
//! A [`RateLimitPolicy`] is immutable configuration built once at startup, one
//! per protected route group. The [`SlidingWindowLimiter`] evaluates a policy
//! against the shared store: expired entries are purged and counted in one
//! atomic round trip, and admitted requests append a `(timestamp, nonce)`
//! member as a second atomic step. The axum middleware wires the two together
//! and reports `X-RateLimit-*` headers on every response.
//!
//! ## Failure Semantics
//!
//! Store errors fail OPEN: the request is admitted and the failure is logged.
//! Availability of the protected service takes priority over strict quota
//! enforcement.

pub mod limiter;
pub mod middleware;
pub mod policy;

pub use self::limiter::{RateLimitDecision, SlidingWindowLimiter};
pub use self::middleware::{RateLimitState, rate_limit};
pub use self::policy::RateLimitPolicy;
pub use self::policy::presets as limit_presets;
