use crate::db::models::{DbWorkspaceConfig, WorkspaceConfigInput};
use crate::db::sqlite::{SqlitePool, from_db_time, to_db_time};
use crate::error::NexusError;
use crate::google_oauth::scopes::GoogleModule;
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

/// Access to `google_workspace_configs`.
#[derive(Clone)]
pub struct WorkspaceStorage {
    pool: SqlitePool,
}

impl WorkspaceStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, organization_id: &str) -> Result<Option<DbWorkspaceConfig>, NexusError> {
        let row = sqlx::query(
            r#"SELECT organization_id, domain, admin_email, client_id, client_secret, enabled,
                      gmail_enabled, calendar_enabled, drive_enabled, docs_enabled,
                      sheets_enabled, meet_enabled, voice_enabled, created_at, updated_at
               FROM google_workspace_configs WHERE organization_id = ?"#,
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_model).transpose()
    }

    /// Create or update admin identity and OAuth client. Module switches are left alone.
    pub async fn upsert(
        &self,
        organization_id: &str,
        input: &WorkspaceConfigInput,
    ) -> Result<(), NexusError> {
        let now = to_db_time(Utc::now());
        let secret = input
            .client_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        sqlx::query(
            r#"
            INSERT INTO google_workspace_configs (
                organization_id, domain, admin_email, client_id, client_secret,
                enabled, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(organization_id) DO UPDATE SET
                domain = excluded.domain,
                admin_email = excluded.admin_email,
                client_id = excluded.client_id,
                client_secret = COALESCE(excluded.client_secret, google_workspace_configs.client_secret),
                enabled = 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(organization_id)
        .bind(input.domain.trim())
        .bind(input.admin_email.trim())
        .bind(input.client_id.trim())
        .bind(secret)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Flip the switches of `modules`. Returns `false` when the organization has no config.
    pub async fn set_modules(
        &self,
        organization_id: &str,
        modules: &[GoogleModule],
        enabled: bool,
    ) -> Result<bool, NexusError> {
        if modules.is_empty() {
            return Ok(self.get(organization_id).await?.is_some());
        }
        let assignments = modules
            .iter()
            .map(|m| format!("{} = ?", m.column()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE google_workspace_configs SET {assignments}, updated_at = ? WHERE organization_id = ?"
        );
        let mut query = sqlx::query(&sql);
        for _ in modules {
            query = query.bind(enabled);
        }
        let result = query
            .bind(to_db_time(Utc::now()))
            .bind(organization_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Turn every module off (used on disconnect).
    pub async fn disable_all(&self, organization_id: &str) -> Result<bool, NexusError> {
        self.set_modules(organization_id, GoogleModule::ALL, false).await
    }

    fn row_to_model(row: SqliteRow) -> Result<DbWorkspaceConfig, NexusError> {
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        Ok(DbWorkspaceConfig {
            organization_id: row.try_get("organization_id")?,
            domain: row.try_get("domain")?,
            admin_email: row.try_get("admin_email")?,
            client_id: row.try_get("client_id")?,
            client_secret: row.try_get("client_secret")?,
            enabled: row.try_get("enabled")?,
            gmail_enabled: row.try_get("gmail_enabled")?,
            calendar_enabled: row.try_get("calendar_enabled")?,
            drive_enabled: row.try_get("drive_enabled")?,
            docs_enabled: row.try_get("docs_enabled")?,
            sheets_enabled: row.try_get("sheets_enabled")?,
            meet_enabled: row.try_get("meet_enabled")?,
            voice_enabled: row.try_get("voice_enabled")?,
            created_at: from_db_time(&created_at)?,
            updated_at: from_db_time(&updated_at)?,
        })
    }
}
