use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::NexusError;

/// Tenant a Workspace call is made for: `x-organization-id` header, else `?organizationId=`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizationScope(pub String);

impl OrganizationScope {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for OrganizationScope
where
    S: Send + Sync,
{
    type Rejection = NexusError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_header = parts
            .headers
            .get("x-organization-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let org = from_header.or_else(|| {
            parts.uri.query().and_then(|qs| {
                url::form_urlencoded::parse(qs.as_bytes())
                    .find(|(k, v)| k == "organizationId" && !v.trim().is_empty())
                    .map(|(_, v)| v.trim().to_string())
            })
        });
        org.map(Self)
            .ok_or_else(|| NexusError::BadRequest("organizationId is required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(req: Request<()>) -> Result<OrganizationScope, NexusError> {
        let (mut parts, _) = req.into_parts();
        OrganizationScope::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn header_wins_over_query() {
        let req = Request::builder()
            .uri("/api/gmail/messages?organizationId=from-query")
            .header("x-organization-id", "from-header")
            .body(())
            .unwrap();
        assert_eq!(extract(req).await.unwrap().as_str(), "from-header");
    }

    #[tokio::test]
    async fn query_is_used_without_header_and_blank_is_rejected() {
        let req = Request::builder()
            .uri("/api/gmail/messages?organizationId=org-7")
            .body(())
            .unwrap();
        assert_eq!(extract(req).await.unwrap().as_str(), "org-7");

        let req = Request::builder()
            .uri("/api/gmail/messages?organizationId=%20")
            .body(())
            .unwrap();
        assert!(matches!(extract(req).await, Err(NexusError::BadRequest(_))));
    }
}
