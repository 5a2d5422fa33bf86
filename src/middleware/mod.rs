//! Middleware components
//!
//! Ingress policy (security headers, origin allow-listing, tiered rate
//! limits, IP allow-listing) and session authentication. Policy decisions
//! are pure functions; the middleware adapters only wire them into the
//! request pipeline.

pub mod auth;
pub mod ip_allowlist;
pub mod origin;
pub mod rate_limit;
pub mod security_headers;

pub use auth::{auth_middleware, AuthUser};
pub use ip_allowlist::{check_ip_allowed, ip_allowlist_middleware, IpPolicy};
pub use origin::{check_origin, origin_middleware, OriginPolicy};
pub use rate_limit::{
    rate_limit_middleware, spawn_rate_limit_cleanup, RateLimitPolicies, RateLimitStore, Tier,
    TierLimiter,
};
pub use security_headers::security_headers_middleware;
