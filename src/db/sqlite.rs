use crate::db::models::DbGoogleToken;
use crate::db::schema::SQLITE_INIT;
use crate::error::NexusError;
use crate::google_oauth::credentials::TokenGrant;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

pub type SqlitePool = Pool<Sqlite>;

/// Open (creating if needed) the database and apply the bundled schema.
pub async fn connect(database_url: &str) -> Result<SqlitePool, NexusError> {
    let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Initialize the schema by executing the bundled DDL.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), NexusError> {
    // sqlx::query runs one statement at a time
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}

/// Fixed-width UTC timestamp so TEXT comparison matches time order.
pub(crate) fn to_db_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_db_time(s: &str) -> Result<DateTime<Utc>, NexusError> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
        .with_timezone(&Utc))
}

pub(crate) fn from_db_time_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>, NexusError> {
    s.as_deref().map(from_db_time).transpose()
}

/// Access to the `google_tokens` table: at most one credential row per organization.
#[derive(Clone)]
pub struct TokenStorage {
    pool: SqlitePool,
}

const TOKEN_COLUMNS: &str = r#"organization_id, access_token, refresh_token, token_type,
    expires_at, scope, google_email, connected_by, refresh_count, last_refresh_at,
    created_at, updated_at"#;

impl TokenStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn find(&self, organization_id: &str) -> Result<Option<DbGoogleToken>, NexusError> {
        let row = sqlx::query(&format!(
            "SELECT {TOKEN_COLUMNS} FROM google_tokens WHERE organization_id = ?"
        ))
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_model).transpose()
    }

    /// Store the result of an authorization-code exchange.
    /// An absent refresh token, scope or email keeps the previously stored value.
    pub async fn upsert_from_consent(
        &self,
        organization_id: &str,
        grant: &TokenGrant,
        google_email: Option<&str>,
        connected_by: Option<&str>,
    ) -> Result<(), NexusError> {
        let now = to_db_time(Utc::now());
        sqlx::query(
            r#"
            INSERT INTO google_tokens (
                organization_id, access_token, refresh_token, token_type, expires_at,
                scope, google_email, connected_by, refresh_count, last_refresh_at,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, ?, ?)
            ON CONFLICT(organization_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = COALESCE(excluded.refresh_token, google_tokens.refresh_token),
                token_type = excluded.token_type,
                expires_at = excluded.expires_at,
                scope = COALESCE(excluded.scope, google_tokens.scope),
                google_email = COALESCE(excluded.google_email, google_tokens.google_email),
                connected_by = COALESCE(excluded.connected_by, google_tokens.connected_by),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(organization_id)
        .bind(&grant.access_token)
        .bind(&grant.refresh_token)
        .bind(&grant.token_type)
        .bind(grant.expires_at.map(to_db_time))
        .bind(&grant.scope)
        .bind(google_email)
        .bind(connected_by)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a successful refresh and bump the counters.
    /// Returns `false` when the row vanished in the meantime (explicit disconnect).
    pub async fn record_refresh(
        &self,
        organization_id: &str,
        grant: &TokenGrant,
    ) -> Result<bool, NexusError> {
        let now = to_db_time(Utc::now());
        let result = sqlx::query(
            r#"UPDATE google_tokens SET
                access_token = ?,
                refresh_token = COALESCE(?, refresh_token),
                token_type = ?,
                expires_at = ?,
                scope = COALESCE(?, scope),
                refresh_count = refresh_count + 1,
                last_refresh_at = ?,
                updated_at = ?
              WHERE organization_id = ?"#,
        )
        .bind(&grant.access_token)
        .bind(&grant.refresh_token)
        .bind(&grant.token_type)
        .bind(grant.expires_at.map(to_db_time))
        .bind(&grant.scope)
        .bind(&now)
        .bind(&now)
        .bind(organization_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Refreshable rows expiring at or before `deadline`, plus rows with no known expiry.
    pub async fn list_due(&self, deadline: DateTime<Utc>) -> Result<Vec<DbGoogleToken>, NexusError> {
        let rows = sqlx::query(&format!(
            r#"SELECT {TOKEN_COLUMNS} FROM google_tokens
               WHERE refresh_token IS NOT NULL
                 AND (expires_at IS NULL OR expires_at <= ?)
               ORDER BY expires_at"#
        ))
        .bind(to_db_time(deadline))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_model).collect()
    }

    /// Remove the organization's credential. Only explicit disconnect calls this.
    pub async fn delete(&self, organization_id: &str) -> Result<bool, NexusError> {
        let result = sqlx::query("DELETE FROM google_tokens WHERE organization_id = ?")
            .bind(organization_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    fn row_to_model(row: SqliteRow) -> Result<DbGoogleToken, NexusError> {
        let expires_at: Option<String> = row.try_get("expires_at")?;
        let last_refresh_at: Option<String> = row.try_get("last_refresh_at")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(DbGoogleToken {
            organization_id: row.try_get("organization_id")?,
            access_token: row.try_get("access_token")?,
            refresh_token: row.try_get("refresh_token")?,
            token_type: row.try_get("token_type")?,
            expires_at: from_db_time_opt(expires_at)?,
            scope: row.try_get("scope")?,
            google_email: row.try_get("google_email")?,
            connected_by: row.try_get("connected_by")?,
            refresh_count: row.try_get("refresh_count")?,
            last_refresh_at: from_db_time_opt(last_refresh_at)?,
            created_at: from_db_time(&created_at)?,
            updated_at: from_db_time(&updated_at)?,
        })
    }
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    // one connection: every in-memory connection is its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");
    init_schema(&pool).await.expect("apply schema");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn grant(access: &str, refresh: Option<&str>, expires_in: i64) -> TokenGrant {
        TokenGrant {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            token_type: "Bearer".to_string(),
            expires_at: Some(Utc::now() + Duration::seconds(expires_in)),
            scope: Some("openid email".to_string()),
        }
    }

    #[tokio::test]
    async fn consent_without_refresh_token_keeps_the_old_one() {
        let storage = TokenStorage::new(memory_pool().await);
        storage
            .upsert_from_consent("org-a", &grant("a1", Some("r1"), 3600), Some("admin@a.be"), None)
            .await
            .unwrap();
        storage
            .upsert_from_consent("org-a", &grant("a2", None, 3600), None, Some("user-1"))
            .await
            .unwrap();

        let row = storage.find("org-a").await.unwrap().unwrap();
        assert_eq!(row.access_token, "a2");
        assert_eq!(row.refresh_token.as_deref(), Some("r1"));
        assert_eq!(row.google_email.as_deref(), Some("admin@a.be"));
        assert_eq!(row.connected_by.as_deref(), Some("user-1"));
        assert_eq!(row.refresh_count, 0);
    }

    #[tokio::test]
    async fn record_refresh_bumps_counter_and_preserves_refresh_token() {
        let storage = TokenStorage::new(memory_pool().await);
        storage
            .upsert_from_consent("org-a", &grant("a1", Some("r1"), -60), None, None)
            .await
            .unwrap();

        assert!(storage.record_refresh("org-a", &grant("a2", None, 3600)).await.unwrap());

        let row = storage.find("org-a").await.unwrap().unwrap();
        assert_eq!(row.access_token, "a2");
        assert_eq!(row.refresh_token.as_deref(), Some("r1"));
        assert_eq!(row.refresh_count, 1);
        assert!(row.last_refresh_at.is_some());
        assert!(row.expires_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn record_refresh_on_missing_row_reports_false() {
        let storage = TokenStorage::new(memory_pool().await);
        assert!(!storage.record_refresh("ghost", &grant("a", None, 60)).await.unwrap());
        assert!(storage.find("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_due_picks_expiring_and_unknown_expiry() {
        let storage = TokenStorage::new(memory_pool().await);
        storage
            .upsert_from_consent("soon", &grant("a", Some("r"), 120), None, None)
            .await
            .unwrap();
        storage
            .upsert_from_consent("later", &grant("a", Some("r"), 7200), None, None)
            .await
            .unwrap();
        storage
            .upsert_from_consent("no-refresh", &grant("a", None, 60), None, None)
            .await
            .unwrap();
        let mut unknown = grant("a", Some("r"), 0);
        unknown.expires_at = None;
        storage
            .upsert_from_consent("unknown", &unknown, None, None)
            .await
            .unwrap();

        let due = storage
            .list_due(Utc::now() + Duration::minutes(10))
            .await
            .unwrap();
        let mut ids: Vec<_> = due.into_iter().map(|r| r.organization_id).collect();
        ids.sort();
        assert_eq!(ids, vec!["soon".to_string(), "unknown".to_string()]);
    }

    #[tokio::test]
    async fn delete_removes_only_that_organization() {
        let storage = TokenStorage::new(memory_pool().await);
        storage
            .upsert_from_consent("org-a", &grant("a", Some("r"), 60), None, None)
            .await
            .unwrap();
        storage
            .upsert_from_consent("org-b", &grant("b", Some("r"), 60), None, None)
            .await
            .unwrap();
        assert!(storage.delete("org-a").await.unwrap());
        assert!(!storage.delete("org-a").await.unwrap());
        assert!(storage.find("org-b").await.unwrap().is_some());
    }
}
