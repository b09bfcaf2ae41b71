use crate::api::ensure_success;
use crate::config::{BasicConfig, GoogleConfig};
use crate::error::NexusError;
use crate::google_oauth::credentials::TokenGrant;
use crate::google_oauth::scopes::GOOGLE_SCOPES;

use base64::Engine;
use chrono::{DateTime, Utc};
use oauth2::{
    AuthUrl, AuthorizationCode, Client as OAuth2Client, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, ExtraTokenFields, PkceCodeChallenge, PkceCodeVerifier,
    RedirectUrl, RefreshToken, Scope, StandardRevocableToken, StandardTokenResponse, TokenResponse,
    TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenType,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Google OAuth endpoints bound to one organization's OAuth client.
#[derive(Clone)]
pub struct GoogleOauthEndpoints {
    client: GoogleOauth2Client,
    http: reqwest::Client,
    revoke_url: Url,
    userinfo_url: Url,
}

/// Result of the authorization-code exchange.
#[derive(Debug, Clone)]
pub struct CodeExchange {
    pub grant: TokenGrant,
    /// `email` claim of the id_token, when Google sent one.
    pub id_token_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoogleUserInfo {
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl GoogleOauthEndpoints {
    pub fn new(
        google: &GoogleConfig,
        client_id: &str,
        client_secret: &str,
        http: reqwest::Client,
    ) -> Result<Self, NexusError> {
        let client = OAuth2Client::new(ClientId::new(client_id.to_string()))
            .set_client_secret(ClientSecret::new(client_secret.to_string()))
            .set_auth_uri(AuthUrl::new(google.auth_url.to_string())?)
            .set_token_uri(TokenUrl::new(google.token_url.to_string())?);
        Ok(Self {
            client,
            http,
            revoke_url: google.revoke_url.clone(),
            userinfo_url: google.userinfo_url.clone(),
        })
    }

    /// Redirect URI used by both the consent URL and the code exchange.
    pub fn with_redirect_uri(mut self, redirect_uri: &str) -> Result<Self, NexusError> {
        self.client = self
            .client
            .set_redirect_uri(RedirectUrl::new(redirect_uri.to_string())?);
        Ok(self)
    }

    /// Consent URL asking for offline access and a fresh consent screen.
    pub fn authorize_url(&self, state: String, challenge: PkceCodeChallenge) -> Url {
        let (url, _csrf) = self
            .client
            .authorize_url(|| CsrfToken::new(state))
            .add_scopes(GOOGLE_SCOPES.iter().map(|s| Scope::new((*s).to_string())))
            .set_pkce_challenge(challenge)
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .add_extra_param("include_granted_scopes", "true")
            .url();
        url
    }

    pub async fn exchange_code(
        &self,
        code: String,
        pkce_verifier: String,
    ) -> Result<CodeExchange, NexusError> {
        let response: GoogleTokenResponse = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
            .request_async(&self.http)
            .await?;
        info!("Authorization code exchanged");
        let id_token_email = response
            .extra_fields()
            .id_token
            .as_deref()
            .and_then(email_from_id_token);
        Ok(CodeExchange {
            grant: grant_from_response(&response, Utc::now()),
            id_token_email,
        })
    }

    /// Exchange a refresh token for a new access token. No retry here.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, NexusError> {
        let response: GoogleTokenResponse = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await?;
        debug!(
            rotated = response.refresh_token().is_some(),
            "Access token refreshed"
        );
        Ok(grant_from_response(&response, Utc::now()))
    }

    /// Revoke a token at Google. Revoking an access token also drops its refresh token.
    pub async fn revoke(&self, token: &str) -> Result<(), NexusError> {
        let resp = self
            .http
            .post(self.revoke_url.clone())
            .form(&[("token", token)])
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    pub async fn userinfo(&self, access_token: &str) -> Result<GoogleUserInfo, NexusError> {
        let resp = self
            .http
            .get(self.userinfo_url.clone())
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await?;
        Ok(ensure_success(resp).await?.json().await?)
    }
}

/// Shared outbound HTTP client for OAuth and Workspace API calls.
pub fn build_http_client(basic: &BasicConfig, google: &GoogleConfig) -> Result<reqwest::Client, NexusError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("gworkspace-nexus/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .timeout(google.http_timeout())
        // token endpoint responses must not be followed anywhere
        .redirect(reqwest::redirect::Policy::none());
    if let Some(proxy_url) = basic.proxy.as_ref() {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
    }
    Ok(builder.build()?)
}

fn grant_from_response(response: &GoogleTokenResponse, now: DateTime<Utc>) -> TokenGrant {
    let token_type = match response.token_type() {
        BasicTokenType::Bearer => "Bearer".to_string(),
        BasicTokenType::Mac => "MAC".to_string(),
        BasicTokenType::Extension(other) => other.clone(),
    };
    TokenGrant {
        access_token: response.access_token().secret().to_string(),
        refresh_token: response.refresh_token().map(|t| t.secret().to_string()),
        token_type,
        expires_at: response
            .expires_in()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| now + d),
        scope: response.scopes().map(|scopes| {
            scopes
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        }),
    }
}

/// Read the `email` claim from an unverified id_token payload.
fn email_from_id_token(id_token: &str) -> Option<String> {
    let payload_b64 = id_token.split('.').nth(1)?;
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64.trim_end_matches('='))
        .ok()?;
    let payload: Value = serde_json::from_slice(&decoded).ok()?;
    payload.get("email")?.as_str().map(str::to_string)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GoogleTokenField {
    #[serde(rename = "id_token")]
    pub id_token: Option<String>,
}
impl ExtraTokenFields for GoogleTokenField {}

pub type GoogleTokenResponse = StandardTokenResponse<GoogleTokenField, BasicTokenType>;

pub(super) type GoogleOauth2Client = OAuth2Client<
    BasicErrorResponse,
    GoogleTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;
