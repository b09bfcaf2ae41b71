use crate::db::models::{DbWorkspaceConfig, WorkspaceConfigInput};
use crate::google_oauth::scopes::GoogleModule;
use crate::middleware::RequireKeyAuth;
use crate::{NexusError, router::NexusState};

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Workspace config as shown to CRM admins. The client secret never leaves the server.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfigView {
    pub organization_id: String,
    pub domain: Option<String>,
    pub admin_email: Option<String>,
    pub client_id: Option<String>,
    pub has_client_secret: bool,
    pub enabled: bool,
    pub is_configured: bool,
    pub modules: BTreeMap<&'static str, bool>,
    pub updated_at: DateTime<Utc>,
}

impl From<&DbWorkspaceConfig> for WorkspaceConfigView {
    fn from(ws: &DbWorkspaceConfig) -> Self {
        Self {
            organization_id: ws.organization_id.clone(),
            domain: ws.domain.clone(),
            admin_email: ws.admin_email.clone(),
            client_id: ws.client_id.clone(),
            has_client_secret: ws
                .client_secret
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty()),
            enabled: ws.enabled,
            is_configured: ws.is_configured(),
            modules: GoogleModule::ALL
                .iter()
                .map(|m| (m.as_str(), ws.module_enabled(*m)))
                .collect(),
            updated_at: ws.updated_at,
        }
    }
}

/// GET /api/organizations/{id}/google-workspace/config
pub async fn get_config(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    Path(organization_id): Path<String>,
) -> Result<Json<WorkspaceConfigView>, NexusError> {
    let ws = state
        .manager
        .workspaces()
        .get(&organization_id)
        .await?
        .ok_or_else(|| NexusError::NotFound("Google Workspace config not found".to_string()))?;
    Ok(Json(WorkspaceConfigView::from(&ws)))
}

/// POST /api/organizations/{id}/google-workspace/config
pub async fn save_config(
    State(state): State<NexusState>,
    _auth: RequireKeyAuth,
    Path(organization_id): Path<String>,
    Json(input): Json<WorkspaceConfigInput>,
) -> Result<Json<WorkspaceConfigView>, NexusError> {
    validate_input(&input)?;

    let workspaces = state.manager.workspaces();
    workspaces.upsert(&organization_id, &input).await?;
    let ws = workspaces
        .get(&organization_id)
        .await?
        .ok_or_else(|| NexusError::NotFound("Google Workspace config not found".to_string()))?;

    info!(
        organization_id = %organization_id,
        domain = %input.domain.trim(),
        configured = ws.is_configured(),
        "Google Workspace config saved"
    );
    Ok(Json(WorkspaceConfigView::from(&ws)))
}

fn validate_input(input: &WorkspaceConfigInput) -> Result<(), NexusError> {
    let domain = input.domain.trim();
    let admin_email = input.admin_email.trim();
    if domain.is_empty() || input.client_id.trim().is_empty() {
        return Err(NexusError::BadRequest(
            "domain and clientId are required".to_string(),
        ));
    }
    let Some((local, email_domain)) = admin_email.split_once('@') else {
        return Err(NexusError::BadRequest("adminEmail must be an email address".to_string()));
    };
    if local.is_empty() || !email_domain.eq_ignore_ascii_case(domain) {
        return Err(NexusError::BadRequest(format!(
            "adminEmail must belong to the domain {domain}"
        )));
    }
    Ok(())
}
