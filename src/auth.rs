//! Static admin bearer-token guard for the operational API.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::errors::ServiceError;

/// Token the admin API accepts; `None` locks the API entirely.
#[derive(Clone)]
pub struct AdminToken(Option<Arc<str>>);

impl AdminToken {
    pub fn new(token: Option<String>) -> Self {
        Self(
            token
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .map(Arc::from),
        )
    }

    fn accepts(&self, presented: &str) -> bool {
        match &self.0 {
            Some(expected) => constant_time_eq(expected.as_bytes(), presented.as_bytes()),
            None => false,
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Rejects requests that do not carry the configured admin bearer token
pub async fn require_admin(
    State(token): State<AdminToken>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let presented = bearer_token(request.headers())
        .ok_or_else(|| ServiceError::Unauthorized("Missing bearer token".to_string()))?;

    if !token.accepts(presented) {
        tracing::warn!(path = %request.uri().path(), "Rejected admin API request");
        return Err(ServiceError::Unauthorized(
            "Invalid admin token".to_string(),
        ));
    }

    Ok(next.run(request).await)
}

/// Extension methods for Router to add the admin guard
pub trait AuthRouterExt {
    fn with_admin_token(self, token: AdminToken) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_admin_token(self, token: AdminToken) -> Self {
        self.layer(axum::middleware::from_fn_with_state(token, require_admin))
    }
}
