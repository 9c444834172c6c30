//! Tenant resolution from API keys or the tenant header.
//!
//! With `[auth].api_keys` configured, an `Authorization: Bearer <key>`
//! header selects the tenant the key belongs to. `/rag` routes require
//! such a key; chat routes accept one but fall back to the tenant header.
//! Without configured keys the tenant header (or the default tenant) is
//! used everywhere.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use superagent_core::config::AuthConfig;

use crate::error::ApiError;
use crate::state::AppState;

/// Tenant resolved for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant(pub String);

/// Resolve the tenant for `headers`.
///
/// A presented bearer token must be a known key whenever keys are
/// configured. `require_key` makes the key mandatory in that case.
pub fn resolve_tenant(auth: &AuthConfig, headers: &HeaderMap, require_key: bool) -> Result<Tenant, ApiError> {
    if !auth.api_keys.is_empty() {
        match headers.get(header::AUTHORIZATION) {
            Some(value) => {
                let value = value.to_str().map_err(|_| {
                    ApiError::Unauthorized("Invalid Authorization header encoding".to_string())
                })?;
                let tenant = value
                    .strip_prefix("Bearer ")
                    .map(str::trim)
                    .and_then(|key| auth.tenant_for_key(key))
                    .ok_or_else(|| ApiError::Unauthorized("Invalid bearer token".to_string()))?;
                return Ok(Tenant(tenant.to_string()));
            }
            None if require_key => {
                return Err(ApiError::Unauthorized(
                    "Missing Authorization header".to_string(),
                ));
            }
            None => {}
        }
    }

    let tenant = headers
        .get(auth.tenant_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(auth.default_tenant.as_str());
    Ok(Tenant(tenant.to_string()))
}

async fn run_with_tenant(state: &AppState, mut req: Request, next: Next, require_key: bool) -> Response {
    match resolve_tenant(&state.config.auth, req.headers(), require_key) {
        Ok(tenant) => {
            req.extensions_mut().insert(tenant);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(path = %req.uri().path(), "Rejected request without valid API key");
            e.into_response()
        }
    }
}

/// Middleware for routes that require an API key when keys are configured.
pub async fn require_tenant(State(state): State<AppState>, req: Request, next: Next) -> Response {
    run_with_tenant(&state, req, next, true).await
}

/// Middleware for routes where an API key is optional.
pub async fn optional_tenant(State(state): State<AppState>, req: Request, next: Next) -> Response {
    run_with_tenant(&state, req, next, false).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use superagent_core::config::ApiKeyEntry;

    fn keyed() -> AuthConfig {
        AuthConfig {
            api_keys: vec![ApiKeyEntry {
                key: "sk-acme".to_string(),
                tenant: "acme".to_string(),
            }],
            ..AuthConfig::default()
        }
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_default_tenant_without_keys() {
        let t = resolve_tenant(&AuthConfig::default(), &HeaderMap::new(), true).unwrap();
        assert_eq!(t, Tenant("default".to_string()));
    }

    #[test]
    fn test_tenant_header_without_keys() {
        let h = headers(&[("x-tenant-id", " globex ")]);
        let t = resolve_tenant(&AuthConfig::default(), &h, true).unwrap();
        assert_eq!(t.0, "globex");

        let blank = headers(&[("x-tenant-id", "  ")]);
        let t = resolve_tenant(&AuthConfig::default(), &blank, false).unwrap();
        assert_eq!(t.0, "default");
    }

    #[test]
    fn test_valid_key_selects_tenant() {
        let h = headers(&[("authorization", "Bearer sk-acme"), ("x-tenant-id", "globex")]);
        assert_eq!(resolve_tenant(&keyed(), &h, true).unwrap().0, "acme");
    }

    #[test]
    fn test_invalid_key_rejected() {
        let h = headers(&[("authorization", "Bearer nope")]);
        assert!(matches!(resolve_tenant(&keyed(), &h, false), Err(ApiError::Unauthorized(_))));
        let h = headers(&[("authorization", "Basic sk-acme")]);
        assert!(matches!(resolve_tenant(&keyed(), &h, true), Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn test_missing_key() {
        let h = headers(&[("x-tenant-id", "globex")]);
        assert!(matches!(resolve_tenant(&keyed(), &h, true), Err(ApiError::Unauthorized(_))));
        assert_eq!(resolve_tenant(&keyed(), &h, false).unwrap().0, "globex");
    }
}
