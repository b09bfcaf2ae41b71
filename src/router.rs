use crate::cache::SharedTtlCache;
use crate::config::Config;
use crate::google_oauth::GoogleAuthManager;
use crate::handlers::{calendar, gmail, google_auth, workspace};
use crate::middleware::ApiKey;
use crate::service::MaintenanceHandle;

use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post, put},
};
use axum_extra::extract::cookie::Key;
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct NexusState {
    pub config: Arc<Config>,
    pub manager: GoogleAuthManager,
    pub maintenance: MaintenanceHandle,
    /// Connected Google account email per organization, so `/status` does
    /// not hit userinfo on every poll.
    pub status_cache: SharedTtlCache<String, String>,
    api_key: ApiKey,
    cookie_key: Key,
}

impl NexusState {
    pub fn new(
        config: Arc<Config>,
        manager: GoogleAuthManager,
        maintenance: MaintenanceHandle,
    ) -> Self {
        let status_cache = SharedTtlCache::new(config.cache.max_entries);
        let api_key = ApiKey::new(&config.basic.crm_key);
        Self {
            config,
            manager,
            maintenance,
            status_cache,
            api_key,
            cookie_key: Key::generate(),
        }
    }
}

impl FromRef<NexusState> for Key {
    fn from_ref(state: &NexusState) -> Self {
        state.cookie_key.clone()
    }
}

impl FromRef<NexusState> for ApiKey {
    fn from_ref(state: &NexusState) -> Self {
        state.api_key.clone()
    }
}

pub fn nexus_router(state: NexusState) -> Router {
    let body_limit = state.config.basic.body_limit_bytes;

    let google_auth = Router::new()
        .route("/redirect-uri", get(google_auth::redirect_uri))
        .route("/connect", get(google_auth::connect))
        .route("/url", get(google_auth::connect))
        .route("/callback", get(google_auth::callback))
        .route("/status", get(google_auth::status))
        .route("/disconnect", post(google_auth::disconnect))
        .route("/toggle-module", post(google_auth::toggle_module))
        .route("/login", post(google_auth::login))
        .route("/logout", post(google_auth::logout))
        .route("/scheduler/status", get(google_auth::scheduler_status))
        .route("/scheduler/refresh", post(google_auth::scheduler_refresh));

    let gmail = Router::new()
        .route("/messages", get(gmail::list_messages))
        .route(
            "/messages/{id}",
            get(gmail::get_message).delete(gmail::delete_message),
        )
        .route("/messages/send", post(gmail::send_message))
        .route("/messages/{id}/read", post(gmail::mark_read))
        .route("/messages/{id}/star", post(gmail::mark_starred))
        .route("/messages/{id}/trash", post(gmail::trash_message))
        .route("/messages/{id}/untrash", post(gmail::untrash_message))
        .route("/messages/{id}/labels", post(gmail::modify_labels))
        .route(
            "/messages/{id}/attachments/{attachment_id}",
            get(gmail::get_attachment),
        )
        .route("/labels", get(gmail::list_labels).post(gmail::create_label))
        .route(
            "/labels/{id}",
            put(gmail::update_label).delete(gmail::delete_label),
        )
        .route("/drafts", get(gmail::list_drafts).post(gmail::save_draft))
        .route("/drafts/{id}", axum::routing::delete(gmail::delete_draft))
        .route("/drafts/{id}/send", post(gmail::send_draft))
        .route("/trash/empty", post(gmail::empty_trash));

    let calendar = Router::new()
        .route(
            "/events",
            get(calendar::list_events).post(calendar::create_event),
        )
        .route(
            "/events/{id}",
            put(calendar::update_event).delete(calendar::delete_event),
        );

    Router::new()
        .nest("/api/google-auth", google_auth)
        .route(
            "/api/organizations/{id}/google-workspace/config",
            get(workspace::get_config).post(workspace::save_config),
        )
        .nest("/api/gmail", gmail)
        .nest("/api/calendar", calendar)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
