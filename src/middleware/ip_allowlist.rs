//! Client address allow-listing
//!
//! When an allow-list is configured and non-empty, only listed client
//! addresses are served. An empty or missing list means default-open.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::warn;

use crate::utils::AppError;

/// Decide whether a client address is acceptable
pub fn check_ip_allowed(addr: IpAddr, allowed: &[IpAddr]) -> Result<(), AppError> {
    if allowed.is_empty() || allowed.contains(&addr) {
        Ok(())
    } else {
        Err(AppError::ForbiddenAddress(addr.to_string()))
    }
}

/// Shared allow-list for the IP middleware
#[derive(Clone)]
pub struct IpPolicy {
    allowed: Arc<Vec<IpAddr>>,
}

impl IpPolicy {
    pub fn new(allowed: Vec<IpAddr>) -> Self {
        Self {
            allowed: Arc::new(allowed),
        }
    }
}

/// IP allow-list middleware
pub async fn ip_allowlist_middleware(
    State(policy): State<IpPolicy>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match check_ip_allowed(addr.ip(), &policy.allowed) {
        Ok(()) => next.run(request).await,
        Err(err) => {
            warn!(ip = %addr.ip(), "Client address rejected");
            err.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_is_default_open() {
        let addr: IpAddr = "203.0.113.9".parse().unwrap();
        assert!(check_ip_allowed(addr, &[]).is_ok());
    }

    #[test]
    fn test_listed_address_passes() {
        let addr: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(check_ip_allowed(addr, &[addr]).is_ok());
    }

    #[test]
    fn test_unlisted_address_rejected() {
        let addr: IpAddr = "203.0.113.9".parse().unwrap();
        let allowed: Vec<IpAddr> = vec!["10.0.0.1".parse().unwrap()];
        assert!(matches!(
            check_ip_allowed(addr, &allowed),
            Err(AppError::ForbiddenAddress(_))
        ));
    }
}
