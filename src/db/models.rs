use crate::google_oauth::credentials::StoredCredential;
use crate::google_oauth::scopes::GoogleModule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row of `google_tokens`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbGoogleToken {
    pub organization_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub google_email: Option<String>,
    pub connected_by: Option<String>,
    pub refresh_count: i64,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbGoogleToken> for StoredCredential {
    fn from(d: DbGoogleToken) -> Self {
        StoredCredential {
            organization_id: d.organization_id,
            access_token: d.access_token,
            refresh_token: d.refresh_token,
            token_type: d.token_type,
            expires_at: d.expires_at,
            scope: d.scope,
            refresh_count: d.refresh_count,
            last_refresh_at: d.last_refresh_at,
        }
    }
}

/// Row of `google_workspace_configs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbWorkspaceConfig {
    pub organization_id: String,
    pub domain: Option<String>,
    pub admin_email: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub enabled: bool,
    pub gmail_enabled: bool,
    pub calendar_enabled: bool,
    pub drive_enabled: bool,
    pub docs_enabled: bool,
    pub sheets_enabled: bool,
    pub meet_enabled: bool,
    pub voice_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbWorkspaceConfig {
    /// Admin identity and OAuth client are all present and non-empty.
    pub fn is_configured(&self) -> bool {
        [
            &self.domain,
            &self.admin_email,
            &self.client_id,
            &self.client_secret,
        ]
        .iter()
        .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }

    pub fn module_enabled(&self, module: GoogleModule) -> bool {
        match module {
            GoogleModule::Gmail => self.gmail_enabled,
            GoogleModule::Calendar => self.calendar_enabled,
            GoogleModule::Drive => self.drive_enabled,
            GoogleModule::Docs => self.docs_enabled,
            GoogleModule::Sheets => self.sheets_enabled,
            GoogleModule::Meet => self.meet_enabled,
            GoogleModule::Voice => self.voice_enabled,
        }
    }
}

/// Admin-supplied fields for creating or updating a Workspace config.
/// A `None` client secret keeps the stored one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfigInput {
    pub domain: String,
    pub admin_email: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
}
