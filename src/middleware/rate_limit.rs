//! Tiered rate limiting middleware
//!
//! IP-keyed fixed-window counters protect against brute force attacks and
//! API abuse. The counter store is an explicit value injected into the
//! middleware rather than module-level state, so a shared-backend
//! implementation can replace the in-process one without touching handlers.
//! Counters are process-local; under multi-process deployment each process
//! keeps its own view.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::Environment;
use crate::utils::AppError;

/// Rate limit tier, each with its own window and ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    General,
    Auth,
    Upload,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::General => "general",
            Tier::Auth => "auth",
            Tier::Upload => "upload",
        }
    }
}

/// Window length and request ceiling for one tier
#[derive(Debug, Clone, Copy)]
pub struct TierPolicy {
    pub window: Duration,
    pub ceiling: u32,
}

/// Per-tier policies for the whole store
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicies {
    pub general: TierPolicy,
    pub auth: TierPolicy,
    pub upload: TierPolicy,
}

impl RateLimitPolicies {
    /// Default policies; production tightens the general ceiling
    pub fn for_environment(environment: Environment) -> Self {
        let general_ceiling = match environment {
            Environment::Production => 100,
            Environment::Development => 1000,
        };
        Self {
            general: TierPolicy {
                window: Duration::from_secs(15 * 60),
                ceiling: general_ceiling,
            },
            auth: TierPolicy {
                window: Duration::from_secs(15 * 60),
                ceiling: 5,
            },
            upload: TierPolicy {
                window: Duration::from_secs(60),
                ceiling: 10,
            },
        }
    }

    fn policy(&self, tier: Tier) -> TierPolicy {
        match tier {
            Tier::General => self.general,
            Tier::Auth => self.auth,
            Tier::Upload => self.upload,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    started_at: Instant,
    count: u32,
}

/// Thread-safe counter store keyed by client address and tier
#[derive(Clone)]
pub struct RateLimitStore {
    windows: Arc<RwLock<HashMap<(IpAddr, Tier), WindowState>>>,
    policies: RateLimitPolicies,
}

impl RateLimitStore {
    pub fn new(policies: RateLimitPolicies) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            policies,
        }
    }

    /// Increment the tier counter for the client and decide allow/deny
    ///
    /// The count resets at the window boundary. A post-increment count above
    /// the ceiling is rejected with the remaining window time as retry-after.
    pub async fn check(&self, ip: IpAddr, tier: Tier) -> Result<(), AppError> {
        let policy = self.policies.policy(tier);
        let now = Instant::now();

        let mut windows = self.windows.write().await;
        let state = windows
            .entry((ip, tier))
            .or_insert(WindowState {
                started_at: now,
                count: 0,
            });

        if now.duration_since(state.started_at) >= policy.window {
            state.started_at = now;
            state.count = 0;
        }

        state.count += 1;
        if state.count > policy.ceiling {
            let elapsed = now.duration_since(state.started_at);
            let remaining = policy.window.saturating_sub(elapsed);
            let retry_after = remaining.as_secs().max(1);
            return Err(AppError::RateLimited { retry_after });
        }

        Ok(())
    }

    /// Drop windows that have fully elapsed, bounding memory for churny IPs
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|(_, tier), state| {
            now.duration_since(state.started_at) < self.policies.policy(*tier).window
        });
        debug!(
            "Rate limit cleanup: {} -> {} tracked windows",
            before,
            windows.len()
        );
    }
}

/// One tier's limiter, usable as axum middleware state
#[derive(Clone)]
pub struct TierLimiter {
    pub store: RateLimitStore,
    pub tier: Tier,
}

impl TierLimiter {
    pub fn new(store: RateLimitStore, tier: Tier) -> Self {
        Self { store, tier }
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limiter): State<TierLimiter>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = addr.ip();
    match limiter.store.check(ip, limiter.tier).await {
        Ok(()) => next.run(request).await,
        Err(err) => {
            warn!(ip = %ip, tier = limiter.tier.as_str(), "Rate limit exceeded");
            err.into_response()
        }
    }
}

/// Spawn a background task to periodically clean up elapsed windows
pub fn spawn_rate_limit_cleanup(store: RateLimitStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            store.cleanup().await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_policies(ceiling: u32, window: Duration) -> RateLimitPolicies {
        let policy = TierPolicy { window, ceiling };
        RateLimitPolicies {
            general: policy,
            auth: policy,
            upload: policy,
        }
    }

    #[tokio::test]
    async fn test_requests_under_ceiling_pass() {
        let store = RateLimitStore::new(tiny_policies(3, Duration::from_secs(60)));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for _ in 0..3 {
            assert!(store.check(ip, Tier::Auth).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_ceiling_plus_one_is_rejected_with_retry_after() {
        let store = RateLimitStore::new(tiny_policies(5, Duration::from_secs(900)));
        let ip: IpAddr = "1.2.3.4".parse().unwrap();

        for _ in 0..5 {
            assert!(store.check(ip, Tier::Auth).await.is_ok());
        }
        match store.check(ip, Tier::Auth).await {
            Err(AppError::RateLimited { retry_after }) => {
                assert!(retry_after >= 1 && retry_after <= 900);
            }
            other => panic!("expected RateLimited, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_window_reset_allows_requests_again() {
        let store = RateLimitStore::new(tiny_policies(1, Duration::from_millis(30)));
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        assert!(store.check(ip, Tier::General).await.is_ok());
        assert!(store.check(ip, Tier::General).await.is_err());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.check(ip, Tier::General).await.is_ok());
    }

    #[tokio::test]
    async fn test_tiers_are_counted_separately() {
        let store = RateLimitStore::new(tiny_policies(1, Duration::from_secs(60)));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();

        assert!(store.check(ip, Tier::Auth).await.is_ok());
        assert!(store.check(ip, Tier::Auth).await.is_err());
        // The upload tier for the same client is untouched
        assert!(store.check(ip, Tier::Upload).await.is_ok());
    }

    #[tokio::test]
    async fn test_different_ips_have_separate_limits() {
        let store = RateLimitStore::new(tiny_policies(1, Duration::from_secs(60)));
        let ip1: IpAddr = "192.168.1.1".parse().unwrap();
        let ip2: IpAddr = "192.168.1.2".parse().unwrap();

        assert!(store.check(ip1, Tier::General).await.is_ok());
        assert!(store.check(ip1, Tier::General).await.is_err());
        assert!(store.check(ip2, Tier::General).await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_drops_elapsed_windows() {
        let store = RateLimitStore::new(tiny_policies(5, Duration::from_millis(10)));
        let ip: IpAddr = "10.1.1.1".parse().unwrap();
        store.check(ip, Tier::General).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.cleanup().await;
        assert!(store.windows.read().await.is_empty());
    }

    #[test]
    fn test_production_tightens_general_ceiling() {
        let dev = RateLimitPolicies::for_environment(Environment::Development);
        let prod = RateLimitPolicies::for_environment(Environment::Production);
        assert_eq!(dev.general.ceiling, 1000);
        assert_eq!(prod.general.ceiling, 100);
        // Auth and upload tiers do not vary by environment
        assert_eq!(dev.auth.ceiling, prod.auth.ceiling);
    }
}
