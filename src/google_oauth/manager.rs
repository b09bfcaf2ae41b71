//! Organization-scoped access to a ready Google client.
//!
//! [`GoogleAuthManager::authenticated_client`] is the only way consumers obtain
//! credentials. It refreshes an expired token at most once per call and never
//! deletes a stored credential; a failed refresh leaves the row as it was.
//!
//! Request-path refreshes and the maintenance sweep share
//! [`GoogleAuthManager::refresh_organization`], which serialises refreshes per
//! organization and skips the upstream call when another caller got there first.

use crate::config::GoogleConfig;
use crate::db::models::DbWorkspaceConfig;
use crate::db::{TokenStorage, WorkspaceStorage};
use crate::error::NexusError;
use crate::google_oauth::credentials::StoredCredential;
use crate::google_oauth::endpoints::GoogleOauthEndpoints;

use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use url::Url;

/// Ready-to-use Google client for one organization.
#[derive(Clone)]
pub struct AuthenticatedClient {
    organization_id: String,
    admin_email: String,
    access_token: String,
    token_type: String,
    expires_at: Option<DateTime<Utc>>,
    http: reqwest::Client,
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("organization_id", &self.organization_id)
            .field("admin_email", &self.admin_email)
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl AuthenticatedClient {
    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    /// Workspace admin mailbox the credential belongs to.
    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Outbound request carrying the organization's bearer token.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(&self.access_token)
    }
}

/// What a refresh attempt ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Upstream issued a new token and it was persisted.
    Refreshed(StoredCredential),
    /// Someone else refreshed (or reconnected) while we waited for the lock.
    Superseded(StoredCredential),
    /// Nothing stored to refresh with.
    NoRefreshToken,
    /// Upstream refused the refresh token; the row is left untouched.
    Rejected(String),
    /// The credential or Workspace config disappeared.
    Missing,
}

impl RefreshOutcome {
    pub fn credential(self) -> Option<StoredCredential> {
        match self {
            RefreshOutcome::Refreshed(c) | RefreshOutcome::Superseded(c) => Some(c),
            _ => None,
        }
    }
}

struct ManagerInner {
    tokens: TokenStorage,
    workspaces: WorkspaceStorage,
    google: GoogleConfig,
    http: reqwest::Client,
    refresh_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

#[derive(Clone)]
pub struct GoogleAuthManager {
    inner: Arc<ManagerInner>,
}

impl GoogleAuthManager {
    pub fn new(
        tokens: TokenStorage,
        workspaces: WorkspaceStorage,
        google: GoogleConfig,
        http: reqwest::Client,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                tokens,
                workspaces,
                google,
                http,
                refresh_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn tokens(&self) -> &TokenStorage {
        &self.inner.tokens
    }

    pub fn workspaces(&self) -> &WorkspaceStorage {
        &self.inner.workspaces
    }

    pub fn google_config(&self) -> &GoogleConfig {
        &self.inner.google
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Workspace config, only if admin identity and OAuth client are all set.
    pub async fn configured_workspace(
        &self,
        organization_id: &str,
    ) -> Result<Option<DbWorkspaceConfig>, NexusError> {
        Ok(self
            .inner
            .workspaces
            .get(organization_id)
            .await?
            .filter(DbWorkspaceConfig::is_configured))
    }

    /// OAuth endpoints bound to the organization's own client.
    pub fn endpoints_for(&self, ws: &DbWorkspaceConfig) -> Result<GoogleOauthEndpoints, NexusError> {
        GoogleOauthEndpoints::new(
            &self.inner.google,
            ws.client_id.as_deref().unwrap_or_default(),
            ws.client_secret.as_deref().unwrap_or_default(),
            self.inner.http.clone(),
        )
    }

    /// A client for the organization, or `None` when it cannot be given one
    /// (not configured, never connected, or refresh refused).
    /// `Err` only for infrastructure failures: database or network.
    pub async fn authenticated_client(
        &self,
        organization_id: &str,
    ) -> Result<Option<AuthenticatedClient>, NexusError> {
        let organization_id = organization_id.trim();
        if organization_id.is_empty() {
            warn!("Client requested without an organization id");
            return Ok(None);
        }

        let Some(ws) = self.configured_workspace(organization_id).await? else {
            debug!(organization_id = %organization_id, "Google Workspace not configured");
            return Ok(None);
        };

        let Some(row) = self.inner.tokens.find(organization_id).await? else {
            debug!(organization_id = %organization_id, "No Google credential stored");
            return Ok(None);
        };
        let credential: StoredCredential = row.into();

        if !credential.needs_refresh(Utc::now(), self.inner.google.expiry_skew()) {
            return Ok(Some(self.client_from(&ws, credential)));
        }

        info!(
            organization_id = %organization_id,
            expires_at = ?credential.expires_at,
            "Access token expired; refreshing"
        );
        let outcome = self.refresh_locked(&ws, &credential).await?;
        Ok(outcome.credential().map(|c| self.client_from(&ws, c)))
    }

    /// Refresh `snapshot`'s organization unless it changed since the snapshot was read.
    pub async fn refresh_organization(
        &self,
        snapshot: &StoredCredential,
    ) -> Result<RefreshOutcome, NexusError> {
        let Some(ws) = self
            .configured_workspace(&snapshot.organization_id)
            .await?
        else {
            return Ok(RefreshOutcome::Missing);
        };
        self.refresh_locked(&ws, snapshot).await
    }

    async fn refresh_locked(
        &self,
        ws: &DbWorkspaceConfig,
        snapshot: &StoredCredential,
    ) -> Result<RefreshOutcome, NexusError> {
        let org = snapshot.organization_id.as_str();
        let lock = self.refresh_lock(org);
        let outcome = {
            let _guard = lock.lock().await;
            self.refresh_if_current(ws, snapshot).await
        };
        drop(lock);
        self.release_refresh_lock(org);
        outcome
    }

    /// Runs with the organization's refresh lock held.
    async fn refresh_if_current(
        &self,
        ws: &DbWorkspaceConfig,
        snapshot: &StoredCredential,
    ) -> Result<RefreshOutcome, NexusError> {
        let org = snapshot.organization_id.as_str();
        let Some(current) = self.inner.tokens.find(org).await? else {
            return Ok(RefreshOutcome::Missing);
        };
        let current: StoredCredential = current.into();
        if snapshot.superseded_by(&current) {
            debug!(organization_id = %org, "Already refreshed by another caller; skip duplicate");
            return Ok(RefreshOutcome::Superseded(current));
        }

        let Some(refresh_token) = current.refresh_token.as_deref().filter(|_| current.can_refresh())
        else {
            warn!(organization_id = %org, "Token expired and no refresh token stored; reconnect required");
            return Ok(RefreshOutcome::NoRefreshToken);
        };

        let endpoints = self.endpoints_for(ws)?;
        let grant = match endpoints.refresh(refresh_token).await {
            Ok(grant) => grant,
            Err(e) if e.is_rejection() => {
                warn!(organization_id = %org, error = %e, "Refresh rejected by Google; credential kept as is");
                return Ok(RefreshOutcome::Rejected(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        if !self.inner.tokens.record_refresh(org, &grant).await? {
            info!(organization_id = %org, "Credential removed during refresh; discarding new token");
            return Ok(RefreshOutcome::Missing);
        }
        let Some(refreshed) = self.inner.tokens.find(org).await? else {
            return Ok(RefreshOutcome::Missing);
        };
        let refreshed: StoredCredential = refreshed.into();
        info!(
            organization_id = %org,
            refresh_count = refreshed.refresh_count,
            expires_at = ?refreshed.expires_at,
            "Access token refreshed"
        );
        Ok(RefreshOutcome::Refreshed(refreshed))
    }

    fn refresh_lock(&self, organization_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .inner
            .refresh_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(organization_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Forget the organization's lock once nobody holds or waits on it.
    fn release_refresh_lock(&self, organization_id: &str) {
        let mut locks = self
            .inner
            .refresh_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks
            .get(organization_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(organization_id);
        }
    }

    /// Organizations with a refresh running or queued.
    pub fn refreshes_in_flight(&self) -> usize {
        self.inner
            .refresh_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn client_from(&self, ws: &DbWorkspaceConfig, credential: StoredCredential) -> AuthenticatedClient {
        AuthenticatedClient {
            organization_id: credential.organization_id,
            admin_email: ws.admin_email.clone().unwrap_or_default(),
            access_token: credential.access_token,
            token_type: credential.token_type,
            expires_at: credential.expires_at,
            http: self.inner.http.clone(),
        }
    }
}
