use axum::{Json, http::StatusCode, response::IntoResponse};
use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;
use tracing::error;

#[derive(Debug, ThisError)]
pub enum NexusError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    /// Transport-level failure talking to the token endpoint.
    #[error("OAuth2 token request error: {0}")]
    Oauth2Token(String),

    /// The token endpoint answered with an OAuth error body (revoked, expired, bad client).
    #[error("OAuth2 server error: {error}")]
    Oauth2Server {
        error: String,
        description: Option<String>,
    },

    #[error("OAuth flow error: {0}")]
    OauthFlowError(String),

    #[error("Google account not connected; reconnect required")]
    NotConnected,

    #[error("Invalid or missing API key")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Upstream error with status {status}: {message}")]
    UpstreamStatus { status: StatusCode, message: String },

    #[error("Ractor error: {0}")]
    RactorError(String),
}

impl NexusError {
    /// Network blips and upstream 5xx are worth another attempt; OAuth rejections are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            NexusError::Reqwest(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            NexusError::Oauth2Token(_) => true,
            NexusError::UpstreamStatus { status, .. } => status.is_server_error(),
            _ => false,
        }
    }

    /// Upstream refused the credential itself.
    pub fn is_rejection(&self) -> bool {
        matches!(self, NexusError::Oauth2Server { .. })
    }
}

impl
    From<
        RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    > for NexusError
{
    fn from(
        e: RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    ) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => NexusError::Oauth2Server {
                error: err.error().to_string(),
                description: err.error_description().cloned(),
            },
            RequestTokenError::Request(req_e) => {
                NexusError::Oauth2Token(format!("request failed: {}", req_e))
            }
            // non-OAuth body, typically a 5xx page from a proxy or load balancer
            RequestTokenError::Parse(parse_err, _body) => {
                NexusError::Oauth2Token(format!("unexpected token endpoint response: {parse_err}"))
            }
            RequestTokenError::Other(s) => NexusError::Oauth2Token(s),
        }
    }
}

impl IntoResponse for NexusError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            NexusError::BadRequest(msg) | NexusError::OauthFlowError(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            NexusError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            NexusError::NotConnected | NexusError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            NexusError::Oauth2Server { .. } => (
                StatusCode::UNAUTHORIZED,
                "Google rejected the stored credential; reconnect required".to_string(),
            ),
            NexusError::UpstreamStatus { status, .. } => match *status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => (
                    StatusCode::UNAUTHORIZED,
                    "Upstream authentication failed; reconnect required".to_string(),
                ),
                StatusCode::NOT_FOUND => {
                    (StatusCode::NOT_FOUND, "Upstream resource not found".to_string())
                }
                StatusCode::TOO_MANY_REQUESTS => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "Upstream rate limit exceeded".to_string(),
                ),
                StatusCode::BAD_REQUEST => {
                    (StatusCode::BAD_REQUEST, "Upstream rejected the request".to_string())
                }
                _ => (StatusCode::BAD_GATEWAY, "An upstream error occurred".to_string()),
            },
            NexusError::DatabaseError(_)
            | NexusError::RactorError(_)
            | NexusError::Io(_)
            | NexusError::Reqwest(_)
            | NexusError::Oauth2Token(_)
            | NexusError::Json(_)
            | NexusError::UrlParse(_) => {
                error!(error = %self, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
        };
        (status, Json(ApiErrorResponse { error: message })).into_response()
    }
}

/// Error body shared by every endpoint: `{ "error": "..." }`.
#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: NexusError) -> (StatusCode, String) {
        let resp = err.into_response();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn not_connected_is_401_with_error_string() {
        let (status, body) = render(NexusError::NotConnected).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body,
            r#"{"error":"Google account not connected; reconnect required"}"#
        );
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let (status, body) = render(NexusError::Oauth2Token("dns failure".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.contains("dns"));
    }

    #[tokio::test]
    async fn upstream_forbidden_asks_for_reconnect() {
        let (status, _) = render(NexusError::UpstreamStatus {
            status: StatusCode::FORBIDDEN,
            message: "insufficient scope".into(),
        })
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(NexusError::Oauth2Token("timeout".into()).is_retryable());
        let rejected = NexusError::Oauth2Server {
            error: "invalid_grant".into(),
            description: None,
        };
        assert!(!rejected.is_retryable());
        assert!(rejected.is_rejection());
    }
}
