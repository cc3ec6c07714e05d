/*!
 * # Admin Authentication
 *
 * Staff endpoints are gated by one static token taken from configuration.
 * Clients present it in the `x-admin-token` header or, for links opened
 * from a chat, as a `?token=` query parameter.
 *
 * When no token is configured every admin request is rejected.
 */

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// Header carrying the admin token
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Query parameter accepted as an alternative to the header
pub const ADMIN_TOKEN_QUERY: &str = "token";

/// Expected admin token, shared by every admin route
#[derive(Clone, Default)]
pub struct AdminGuard {
    token: Option<Arc<str>>,
}

impl std::fmt::Debug for AdminGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminGuard")
            .field("configured", &self.token.is_some())
            .finish()
    }
}

impl AdminGuard {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: token
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(Arc::from),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    /// Checks a presented token against the configured one.
    pub fn verify(&self, presented: Option<&str>) -> Result<(), ServiceError> {
        let Some(expected) = self.token.as_deref() else {
            warn!("Admin request rejected: no admin token configured");
            return Err(ServiceError::Unauthorized(
                "Admin access is disabled".to_string(),
            ));
        };
        match presented {
            Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(()),
            Some(_) => Err(ServiceError::Unauthorized("Invalid admin token".to_string())),
            None => Err(ServiceError::Unauthorized("Missing admin token".to_string())),
        }
    }
}

impl From<&AppConfig> for AdminGuard {
    fn from(config: &AppConfig) -> Self {
        Self::new(config.admin_token())
    }
}

/// Token from the header, falling back to the query string
pub fn extract_admin_token(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(value) = headers.get(ADMIN_TOKEN_HEADER) {
        if let Ok(token) = value.to_str() {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == ADMIN_TOKEN_QUERY)
        .map(|(_, value)| value.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Rejects requests that do not carry the configured admin token
pub async fn admin_auth_middleware(
    State(guard): State<AdminGuard>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let presented = extract_admin_token(request.headers(), request.uri().query());
    guard.verify(presented.as_deref())?;
    debug!(path = %request.uri().path(), "Admin request authorized");
    Ok(next.run(request).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.iter().zip(b) {
        res |= x ^ y;
    }
    res == 0
}
