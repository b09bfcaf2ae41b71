use crate::error::NexusError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use oauth2::CsrfToken;
use serde::{Deserialize, Serialize};

/// 16 random bytes, base64url.
pub(crate) fn random_token() -> String {
    CsrfToken::new_random().secret().to_string()
}

/// Opaque `state` round-tripped through Google's consent screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthState {
    pub organization_id: String,
    pub user_id: Option<String>,
    pub redirect_uri: String,
    /// Makes every encoded state unique.
    pub nonce: String,
}

impl OAuthState {
    pub fn new(
        organization_id: impl Into<String>,
        user_id: Option<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            user_id,
            redirect_uri: redirect_uri.into(),
            nonce: random_token(),
        }
    }

    pub fn encode(&self) -> Result<String, NexusError> {
        Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(self)?))
    }

    pub fn decode(raw: &str) -> Result<Self, NexusError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.trim_end_matches('='))
            .map_err(|_| NexusError::OauthFlowError("malformed state".to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|_| NexusError::OauthFlowError("malformed state".to_string()))
    }
}
