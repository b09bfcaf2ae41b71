use axum::extract::{FromRef, FromRequestParts};
use axum::http::{HeaderMap, request::Parts};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::NexusError;

/// Shared secret the CRM gateway presents on every API call.
#[derive(Clone)]
pub struct ApiKey(pub Arc<str>);

impl ApiKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref().trim()))
    }

    /// An unset key never matches, so an empty candidate cannot authenticate.
    fn matches(&self, candidate: &str) -> bool {
        !self.0.is_empty() && bool::from(candidate.as_bytes().ct_eq(self.0.as_bytes()))
    }
}

/// Ensure the inbound request is authorized.
/// Accepts either:
/// - Header: `x-api-key: ...`
/// - Header: `Authorization: Bearer ...`
/// - Query string: `?key=...`
pub fn ensure_authorized(
    headers: &HeaderMap,
    query: Option<&str>,
    expected: &ApiKey,
) -> Result<(), NexusError> {
    if expected.0.is_empty() {
        return Err(NexusError::Unauthorized);
    }

    // 1) header: x-api-key
    if let Some(hv) = headers.get("x-api-key").and_then(|v| v.to_str().ok())
        && expected.matches(hv.trim())
    {
        return Ok(());
    }

    // 2) header: Authorization: Bearer <key>
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        let auth = auth.trim();
        if let Some(token) = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            && expected.matches(token.trim())
        {
            return Ok(());
        }
    }

    // 3) query: key=...
    if let Some(qs) = query {
        for (k, v) in url::form_urlencoded::parse(qs.as_bytes()) {
            if k == "key" && expected.matches(&v) {
                return Ok(());
            }
        }
    }

    Err(NexusError::Unauthorized)
}

#[derive(Debug, Clone, Copy)]
pub struct RequireKeyAuth;

impl<S> FromRequestParts<S> for RequireKeyAuth
where
    ApiKey: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = NexusError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let expected = ApiKey::from_ref(state);
        ensure_authorized(&parts.headers, parts.uri.query(), &expected)?;
        Ok(Self)
    }
}

/// CRM user on whose behalf the gateway calls, from `x-user-id`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallerUser(pub Option<String>);

impl<S> FromRequestParts<S> for CallerUser
where
    S: Send + Sync,
{
    type Rejection = NexusError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Ok(Self(user))
    }
}
