//! Origin allow-listing
//!
//! Browser requests carry an Origin header that must match the configured
//! allow-list. Requests without an Origin header (mobile apps, curl, server
//! to server) always pass. The decision is a pure function over the header
//! value; the axum middleware only adapts it.

use axum::{
    body::Body,
    extract::{Request, State},
    http::header::ORIGIN,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

use crate::utils::AppError;

/// Decide whether a request origin is acceptable
pub fn check_origin(origin: Option<&str>, allowed: &[String]) -> Result<(), AppError> {
    match origin {
        None => Ok(()),
        Some(origin) if allowed.iter().any(|a| a == origin) => Ok(()),
        Some(origin) => Err(AppError::OriginRejected(origin.to_string())),
    }
}

/// Shared allow-list for the origin middleware
#[derive(Clone)]
pub struct OriginPolicy {
    allowed: Arc<Vec<String>>,
}

impl OriginPolicy {
    pub fn new(allowed: Vec<String>) -> Self {
        Self {
            allowed: Arc::new(allowed),
        }
    }
}

/// Origin check middleware
pub async fn origin_middleware(
    State(policy): State<OriginPolicy>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    match check_origin(origin.as_deref(), &policy.allowed) {
        Ok(()) => next.run(request).await,
        Err(err) => {
            warn!(origin = origin.as_deref().unwrap_or(""), "Origin rejected");
            err.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn allowed() -> Vec<String> {
        vec![
            "http://localhost:3000".to_string(),
            "https://stayspot.app".to_string(),
        ]
    }

    #[rstest]
    #[case(None, true)]
    #[case(Some("https://stayspot.app"), true)]
    #[case(Some("http://localhost:3000"), true)]
    #[case(Some("https://evil.example"), false)]
    #[case(Some("http://localhost:3001"), false)]
    // Scheme and case must match exactly
    #[case(Some("https://localhost:3000"), false)]
    #[case(Some("HTTP://LOCALHOST:3000"), false)]
    fn test_check_origin(#[case] origin: Option<&str>, #[case] expected_ok: bool) {
        assert_eq!(check_origin(origin, &allowed()).is_ok(), expected_ok);
    }

    #[test]
    fn test_unlisted_origin_carries_the_offender() {
        let result = check_origin(Some("https://evil.example"), &allowed());
        assert!(matches!(result, Err(AppError::OriginRejected(o)) if o == "https://evil.example"));
    }

    #[test]
    fn test_empty_allow_list_rejects_all_browser_origins() {
        let result = check_origin(Some("http://localhost:3000"), &[]);
        assert!(result.is_err());
    }
}
