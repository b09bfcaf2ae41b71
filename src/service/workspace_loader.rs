use crate::db::WorkspaceStorage;
use crate::db::models::WorkspaceConfigInput;
use crate::error::NexusError;
use serde::Deserialize;
use std::{fs, path::Path};
use tracing::{info, warn};

/// One Workspace config file: the organization plus its admin/OAuth fields.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSeed {
    pub organization_id: String,
    #[serde(flatten)]
    pub config: WorkspaceConfigInput,
}

/// Load Workspace config JSON files from a directory. Unreadable files are skipped.
pub fn load_from_dir(dir: &Path) -> Result<Vec<WorkspaceSeed>, NexusError> {
    if !dir.exists() {
        info!(path = %dir.display(), "workspace config directory not found; skipping load");
        return Ok(Vec::new());
    }

    let loaded: Vec<WorkspaceSeed> = fs::read_dir(dir)?
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                let err: NexusError = e.into();
                warn!(error = %err, "failed to read workspace dir entry");
                None
            }
        })
        .filter(|path| is_json_file(path))
        .filter_map(|path| {
            load_seed(&path)
                .inspect_err(|e| {
                    warn!(path = %path.display(), error = %e, "failed to load workspace config");
                })
                .ok()
        })
        .collect();

    Ok(loaded)
}

/// Upsert every seed; returns how many were stored.
pub async fn apply(storage: &WorkspaceStorage, seeds: &[WorkspaceSeed]) -> usize {
    let mut stored = 0;
    for seed in seeds {
        match storage.upsert(&seed.organization_id, &seed.config).await {
            Ok(()) => stored += 1,
            Err(e) => warn!(
                organization_id = %seed.organization_id,
                error = %e,
                "failed to store workspace config"
            ),
        }
    }
    stored
}

fn is_json_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        == Some(true)
}

fn load_seed(path: &Path) -> Result<WorkspaceSeed, NexusError> {
    let contents = fs::read_to_string(path)?;
    let seed: WorkspaceSeed = serde_json::from_str(&contents)?;
    if seed.organization_id.trim().is_empty() {
        return Err(NexusError::BadRequest("organizationId is empty".to_string()));
    }
    Ok(seed)
}
