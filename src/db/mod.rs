//! Database module: models and schema for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows and conversions
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: pool setup and the `google_tokens` storage
//! - `workspace.rs`: the `google_workspace_configs` storage

pub mod models;
pub mod schema;
pub mod sqlite;
pub mod workspace;

pub use models::{DbGoogleToken, DbWorkspaceConfig, WorkspaceConfigInput};
pub use schema::SQLITE_INIT;
pub use sqlite::{SqlitePool, TokenStorage, connect, init_schema};
pub use workspace::WorkspaceStorage;
