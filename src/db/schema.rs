//! SQL DDL for initializing the database schema.
//! SQLite-first design; can be adapted for other RDBMS.

/// SQLite schema includes:
/// - `google_workspace_configs`: one row per organization (admin identity, OAuth client, module switches)
/// - `google_tokens`: zero or one OAuth credential per organization
///
/// Timestamps are stored as fixed-width RFC3339 UTC text so they compare lexically.
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS google_workspace_configs (
    organization_id TEXT PRIMARY KEY NOT NULL,
    domain TEXT NULL,
    admin_email TEXT NULL,
    client_id TEXT NULL,
    client_secret TEXT NULL,
    enabled INTEGER NOT NULL DEFAULT 0,
    gmail_enabled INTEGER NOT NULL DEFAULT 0,
    calendar_enabled INTEGER NOT NULL DEFAULT 0,
    drive_enabled INTEGER NOT NULL DEFAULT 0,
    docs_enabled INTEGER NOT NULL DEFAULT 0,
    sheets_enabled INTEGER NOT NULL DEFAULT 0,
    meet_enabled INTEGER NOT NULL DEFAULT 0,
    voice_enabled INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS google_tokens (
    organization_id TEXT PRIMARY KEY NOT NULL,
    access_token TEXT NOT NULL,
    refresh_token TEXT NULL,
    token_type TEXT NOT NULL DEFAULT 'Bearer',
    expires_at TEXT NULL, -- NULL: no known expiry
    scope TEXT NULL, -- space delimited
    google_email TEXT NULL,
    connected_by TEXT NULL,
    refresh_count INTEGER NOT NULL DEFAULT 0,
    last_refresh_at TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_google_tokens_expires_at ON google_tokens(expires_at);
"#;
