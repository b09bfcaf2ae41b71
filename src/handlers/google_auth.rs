use crate::google_oauth::endpoints::GoogleOauthEndpoints;
use crate::google_oauth::scopes::{GOOGLE_SCOPES, GoogleModule, modules_for_scopes};
use crate::google_oauth::state::OAuthState;
use crate::middleware::{CallerUser, OrganizationScope, RequireKeyAuth};
use crate::service::MaintenanceStatus;
use crate::{NexusError, router::NexusState};

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::TypedHeader;
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use chrono::{DateTime, Utc};
use headers::Host;
use oauth2::PkceCodeChallenge;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use time::Duration;
use tracing::{info, warn};
use url::Url;

const STATE_COOKIE: &str = "google_oauth_state";
const PKCE_COOKIE: &str = "google_oauth_pkce";
const CALLBACK_PATH: &str = "/api/google-auth/callback";

#[derive(Debug, Deserialize)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationBody {
    pub organization_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleModuleBody {
    pub organization_id: String,
    pub module_name: String,
    pub enabled: bool,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub email: Option<String>,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub refresh_count: i64,
}

/// GET /api/google-auth/redirect-uri
pub async fn redirect_uri(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    host: Option<TypedHeader<Host>>,
) -> Result<Json<Value>, NexusError> {
    let uri = resolve_redirect_uri(&state, host.as_ref().map(|h| &h.0))?;
    Ok(Json(json!({ "redirectUri": uri })))
}

/// GET /api/google-auth/connect -> consent URL for the organization's own OAuth client.
pub async fn connect(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
    CallerUser(user_id): CallerUser,
    host: Option<TypedHeader<Host>>,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, NexusError> {
    let org = organization.as_str();
    let Some(ws) = state.manager.configured_workspace(org).await? else {
        return Err(NexusError::BadRequest(
            "Google Workspace is not configured for this organization".to_string(),
        ));
    };

    let redirect = resolve_redirect_uri(&state, host.as_ref().map(|h| &h.0))?;
    let endpoints = state
        .manager
        .endpoints_for(&ws)?
        .with_redirect_uri(&redirect)?;

    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
    let oauth_state = OAuthState::new(org, user_id, redirect);
    let encoded_state = oauth_state.encode()?;
    let auth_url = endpoints.authorize_url(encoded_state.clone(), challenge);

    let secure = !state.config.basic.insecure_cookie;
    let jar = jar
        .add(build_cookie(STATE_COOKIE, encoded_state, secure))
        .add(build_cookie(PKCE_COOKIE, verifier.secret().to_string(), secure));

    info!(organization_id = %org, "Dispatching Google consent URL");
    Ok((
        jar,
        Json(json!({
            "success": true,
            "data": { "authUrl": auth_url.as_str(), "scopes": GOOGLE_SCOPES },
        })),
    ))
}

/// GET /api/google-auth/callback -> exchanges the code, stores the credential,
/// and sends the browser back to the CRM frontend.
pub async fn callback(
    State(state): State<NexusState>,
    Query(query): Query<AuthCallbackQuery>,
    jar: PrivateCookieJar,
) -> Response {
    let (session, jar) = load_oauth_session(jar);

    match complete_consent(&state, &query, session).await {
        Ok((organization_id, email)) => {
            info!(organization_id = %organization_id, "Google account connected");
            let target = frontend_callback(
                &state.config.basic.frontend_url,
                &[
                    ("google_success", "1"),
                    ("organizationId", organization_id.as_str()),
                    ("admin_email", email.as_str()),
                ],
            );
            (jar, Redirect::to(target.as_str())).into_response()
        }
        Err(failure) => {
            warn!(kind = failure.kind(), error = %failure, "Google consent callback failed");
            let target = frontend_callback(
                &state.config.basic.frontend_url,
                &[("google_error", failure.kind())],
            );
            (jar, Redirect::to(target.as_str())).into_response()
        }
    }
}

/// GET /api/google-auth/status
pub async fn status(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    organization: OrganizationScope,
) -> Result<Json<ConnectionStatus>, NexusError> {
    let org = organization.as_str();
    let client = state.manager.authenticated_client(org).await?;
    let row = state.manager.tokens().find(org).await?;

    let Some(row) = row else {
        return Ok(Json(ConnectionStatus {
            connected: false,
            email: None,
            scopes: Vec::new(),
            expires_at: None,
            last_refresh_at: None,
            refresh_count: 0,
        }));
    };

    let email = match &client {
        Some(client) => {
            cached_email(&state, org, client.access_token(), row.google_email.clone()).await
        }
        None => row.google_email.clone(),
    };

    Ok(Json(ConnectionStatus {
        connected: client.is_some(),
        email,
        scopes: row
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
        expires_at: row.expires_at,
        last_refresh_at: row.last_refresh_at,
        refresh_count: row.refresh_count,
    }))
}

/// POST /api/google-auth/disconnect. The only path that deletes a stored credential.
pub async fn disconnect(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    Json(body): Json<OrganizationBody>,
) -> Result<Json<Value>, NexusError> {
    let org = required_org(&body.organization_id)?;

    if let Some(row) = state.manager.tokens().find(org).await?
        && let Some(ws) = state.manager.configured_workspace(org).await?
    {
        let token = row.refresh_token.as_deref().unwrap_or(&row.access_token);
        if let Err(e) = state.manager.endpoints_for(&ws)?.revoke(token).await {
            warn!(organization_id = %org, error = %e, "Token revoke failed; deleting anyway");
        }
    }

    let deleted = state.manager.tokens().delete(org).await?;
    state.manager.workspaces().disable_all(org).await?;
    state.status_cache.remove(&org.to_string());

    info!(organization_id = %org, deleted, "Google account disconnected");
    Ok(Json(json!({ "success": true, "disconnected": deleted })))
}

/// POST /api/google-auth/toggle-module
pub async fn toggle_module(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    Json(body): Json<ToggleModuleBody>,
) -> Result<Json<Value>, NexusError> {
    let org = required_org(&body.organization_id)?;
    let module: GoogleModule = body.module_name.parse().map_err(NexusError::BadRequest)?;

    if body.enabled && state.manager.tokens().find(org).await?.is_none() {
        return Err(NexusError::BadRequest(
            "Connect a Google account before enabling modules".to_string(),
        ));
    }
    if !state
        .manager
        .workspaces()
        .set_modules(org, &[module], body.enabled)
        .await?
    {
        return Err(NexusError::NotFound(
            "Google Workspace config not found".to_string(),
        ));
    }

    info!(organization_id = %org, module = %module, enabled = body.enabled, "Module toggled");
    Ok(Json(json!({
        "success": true,
        "module": module.as_str(),
        "enabled": body.enabled,
    })))
}

/// POST /api/google-auth/login -> arm the delayed connectivity check for the caller.
pub async fn login(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    CallerUser(user_id): CallerUser,
    Json(body): Json<OrganizationBody>,
) -> Result<Json<Value>, NexusError> {
    let org = required_org(&body.organization_id)?;
    let user_id = user_id.ok_or_else(|| NexusError::BadRequest("x-user-id is required".to_string()))?;
    state.maintenance.schedule_login_probe(user_id, org);
    Ok(Json(json!({ "success": true, "scheduled": true })))
}

/// POST /api/google-auth/logout
pub async fn logout(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    CallerUser(user_id): CallerUser,
) -> Result<Json<Value>, NexusError> {
    let user_id = user_id.ok_or_else(|| NexusError::BadRequest("x-user-id is required".to_string()))?;
    state.maintenance.cancel_login_probe(user_id);
    Ok(Json(json!({ "success": true })))
}

/// GET /api/google-auth/scheduler/status
pub async fn scheduler_status(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
) -> Result<Json<MaintenanceStatus>, NexusError> {
    Ok(Json(state.maintenance.status().await?))
}

/// POST /api/google-auth/scheduler/refresh -> run a sweep now.
pub async fn scheduler_refresh(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
) -> impl IntoResponse {
    state.maintenance.sweep_now();
    (
        StatusCode::ACCEPTED,
        Json(json!({ "success": true, "queued": true })),
    )
}

#[derive(Debug, thiserror::Error)]
enum ConsentFailure {
    #[error("consent denied: {0}")]
    Denied(String),
    #[error("state or session cookie invalid")]
    InvalidState,
    #[error("missing `code` in callback")]
    MissingCode,
    #[error("Google Workspace not configured")]
    NotConfigured,
    #[error("Google account {0:?} is not the organization admin")]
    AdminMismatch(Option<String>),
    #[error("code exchange failed: {0}")]
    Exchange(NexusError),
    #[error("{0}")]
    Internal(#[from] NexusError),
}

impl ConsentFailure {
    fn kind(&self) -> &str {
        match self {
            ConsentFailure::Denied(kind) => kind.as_str(),
            ConsentFailure::InvalidState => "invalid_state",
            ConsentFailure::MissingCode => "missing_code",
            ConsentFailure::NotConfigured => "not_configured",
            ConsentFailure::AdminMismatch(_) => "admin_email_mismatch",
            ConsentFailure::Exchange(_) => "token_exchange_failed",
            ConsentFailure::Internal(_) => "server_error",
        }
    }
}

struct OAuthSession {
    /// Encoded `state` exactly as handed to Google.
    state: String,
    pkce_verifier: String,
}

/// Returns `(organization_id, google_email)` once the credential is stored.
async fn complete_consent(
    state: &NexusState,
    query: &AuthCallbackQuery,
    session: Option<OAuthSession>,
) -> Result<(String, String), ConsentFailure> {
    if let Some(error) = query.error.as_deref() {
        return Err(ConsentFailure::Denied(error.to_string()));
    }

    let session = session.ok_or(ConsentFailure::InvalidState)?;
    let returned = query.state.as_deref().ok_or(ConsentFailure::InvalidState)?;
    // the whole state is bound to the session, not only its nonce
    if !bool::from(returned.as_bytes().ct_eq(session.state.as_bytes())) {
        return Err(ConsentFailure::InvalidState);
    }
    let oauth_state = OAuthState::decode(returned).map_err(|_| ConsentFailure::InvalidState)?;
    let code = query.code.clone().ok_or(ConsentFailure::MissingCode)?;

    let org = oauth_state.organization_id.as_str();
    let ws = state
        .manager
        .configured_workspace(org)
        .await?
        .ok_or(ConsentFailure::NotConfigured)?;
    let endpoints = state
        .manager
        .endpoints_for(&ws)?
        .with_redirect_uri(&oauth_state.redirect_uri)?;

    let exchange = endpoints
        .exchange_code(code, session.pkce_verifier)
        .await
        .map_err(ConsentFailure::Exchange)?;
    let grant = exchange.grant;

    let email = match endpoints.userinfo(&grant.access_token).await {
        Ok(info) => info.email,
        Err(e) => {
            warn!(organization_id = %org, error = %e, "userinfo lookup failed; using id_token email");
            None
        }
    }
    .or(exchange.id_token_email);

    let admin = ws.admin_email.as_deref().unwrap_or_default().trim();
    let Some(email) = email.filter(|e| e.trim().eq_ignore_ascii_case(admin)) else {
        revoke_quietly(&endpoints, &grant.access_token, org).await;
        return Err(ConsentFailure::AdminMismatch(ws.admin_email.clone()));
    };

    state
        .manager
        .tokens()
        .upsert_from_consent(org, &grant, Some(&email), oauth_state.user_id.as_deref())
        .await?;
    let modules = modules_for_scopes(grant.scope.as_deref().unwrap_or_default());
    state
        .manager
        .workspaces()
        .set_modules(org, &modules, true)
        .await?;
    state
        .status_cache
        .set(org.to_string(), email.clone(), state.config.cache.status_ttl());

    Ok((org.to_string(), email))
}

async fn revoke_quietly(endpoints: &GoogleOauthEndpoints, token: &str, org: &str) {
    if let Err(e) = endpoints.revoke(token).await {
        warn!(organization_id = %org, error = %e, "Failed to revoke rejected consent token");
    }
}

async fn cached_email(
    state: &NexusState,
    org: &str,
    access_token: &str,
    stored: Option<String>,
) -> Option<String> {
    let key = org.to_string();
    if let Some(email) = state.status_cache.get(&key) {
        return Some(email);
    }

    let fetched = match state.manager.configured_workspace(org).await {
        Ok(Some(ws)) => match state.manager.endpoints_for(&ws) {
            Ok(endpoints) => endpoints
                .userinfo(access_token)
                .await
                .inspect_err(|e| warn!(organization_id = %org, error = %e, "userinfo lookup failed"))
                .ok()
                .and_then(|info| info.email),
            Err(_) => None,
        },
        _ => None,
    };

    let email = fetched.or(stored)?;
    state
        .status_cache
        .set(key, email.clone(), state.config.cache.status_ttl());
    Some(email)
}

fn required_org(raw: &str) -> Result<&str, NexusError> {
    let org = raw.trim();
    if org.is_empty() {
        return Err(NexusError::BadRequest("organizationId is required".to_string()));
    }
    Ok(org)
}

/// Configured redirect URI, else derived from the request host.
fn resolve_redirect_uri(state: &NexusState, host: Option<&Host>) -> Result<String, NexusError> {
    if let Some(uri) = &state.config.google.redirect_uri {
        return Ok(uri.to_string());
    }
    let host = host.ok_or_else(|| {
        NexusError::BadRequest("cannot derive redirect URI without a Host header".to_string())
    })?;
    Ok(derive_redirect_uri(host.hostname(), host.port()))
}

fn derive_redirect_uri(hostname: &str, port: Option<u16>) -> String {
    let scheme = if hostname == "localhost" || hostname.starts_with("127.") {
        "http"
    } else {
        "https"
    };
    match port {
        Some(port) => format!("{scheme}://{hostname}:{port}{CALLBACK_PATH}"),
        None => format!("{scheme}://{hostname}{CALLBACK_PATH}"),
    }
}

fn frontend_callback(frontend: &Url, params: &[(&str, &str)]) -> Url {
    let mut target = frontend.clone();
    let path = format!("{}/google-auth-callback", target.path().trim_end_matches('/'));
    target.set_path(&path);
    target.query_pairs_mut().clear().extend_pairs(params);
    target
}

/// Reads and clears the consent cookies.
fn load_oauth_session(jar: PrivateCookieJar) -> (Option<OAuthSession>, PrivateCookieJar) {
    let state = jar.get(STATE_COOKIE).map(|c| c.value().to_owned());
    let pkce_verifier = jar.get(PKCE_COOKIE).map(|c| c.value().to_owned());
    let jar = jar
        .remove(clear_cookie(STATE_COOKIE))
        .remove(clear_cookie(PKCE_COOKIE));
    let session = state
        .zip(pkce_verifier)
        .map(|(state, pkce_verifier)| OAuthSession {
            state,
            pkce_verifier,
        });
    (session, jar)
}

fn build_cookie(name: &str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build(Cookie::new(name.to_string(), value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(Duration::minutes(15))
        .build()
}

fn clear_cookie(name: &str) -> Cookie<'static> {
    Cookie::build(Cookie::new(name.to_string(), ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}
