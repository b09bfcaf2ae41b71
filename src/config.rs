//! Layered configuration: built-in defaults, then `config.toml`, then `CRM_*`
//! environment variables (`__` separates sections, e.g. `CRM_BASIC__CRM_KEY`).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub basic: BasicConfig,
    pub google: GoogleConfig,
    pub maintenance: MaintenanceConfig,
    pub cache: CacheConfig,
}

impl Config {
    /// Load from `config.toml` in the working directory plus environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment(CONFIG_FILE).extract()
    }

    pub fn figment(path: impl Into<PathBuf>) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.into()))
            .merge(Env::prefixed("CRM_").split("__"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    pub listen_addr: String,
    pub database_url: String,
    pub loglevel: String,
    /// Shared key the CRM front-end/gateway presents on every API call.
    pub crm_key: String,
    /// Where the consent callback sends the browser back to.
    pub frontend_url: Url,
    /// Drop the `Secure` flag on OAuth cookies (plain-http local setups).
    pub insecure_cookie: bool,
    /// Optional directory of Workspace config JSON files loaded at start-up.
    pub workspace_dir: Option<PathBuf>,
    pub proxy: Option<Url>,
    pub body_limit_bytes: usize,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:4000".to_string(),
            database_url: "sqlite://gworkspace.db".to_string(),
            loglevel: "info".to_string(),
            crm_key: "change-me".to_string(),
            frontend_url: Url::parse("http://localhost:5173").expect("static url"),
            insecure_cookie: false,
            workspace_dir: None,
            proxy: None,
            body_limit_bytes: 30 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub auth_url: Url,
    pub token_url: Url,
    pub revoke_url: Url,
    pub userinfo_url: Url,
    pub gmail_api_base: Url,
    pub calendar_api_base: Url,
    /// Fixed OAuth redirect URI; derived from the `Host` header when unset.
    pub redirect_uri: Option<Url>,
    /// Tokens expiring within this many seconds are refreshed before use.
    pub expiry_skew_secs: u64,
    pub http_timeout_secs: u64,
    /// Display name used in the `From:` header when the caller gives none.
    pub default_sender_name: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        let url = |s: &str| Url::parse(s).expect("static url");
        Self {
            auth_url: url("https://accounts.google.com/o/oauth2/v2/auth"),
            token_url: url("https://oauth2.googleapis.com/token"),
            revoke_url: url("https://oauth2.googleapis.com/revoke"),
            userinfo_url: url("https://www.googleapis.com/oauth2/v2/userinfo"),
            gmail_api_base: url("https://gmail.googleapis.com/gmail/v1/"),
            calendar_api_base: url("https://www.googleapis.com/calendar/v3/"),
            redirect_uri: None,
            expiry_skew_secs: 60,
            http_timeout_secs: 15,
            default_sender_name: "2Thier CRM".to_string(),
        }
    }
}

impl GoogleConfig {
    pub fn expiry_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expiry_skew_secs as i64)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    pub sweep_interval_secs: u64,
    /// Rows expiring within this window are refreshed by the sweep.
    pub refresh_window_secs: u64,
    pub sweep_concurrency: usize,
    pub refresh_per_minute: u32,
    pub login_probe_delay_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 50 * 60,
            refresh_window_secs: 10 * 60,
            sweep_concurrency: 4,
            refresh_per_minute: 10,
            login_probe_delay_secs: 5 * 60,
        }
    }
}

impl MaintenanceConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn refresh_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_window_secs as i64)
    }

    pub fn login_probe_delay(&self) -> Duration {
        Duration::from_secs(self.login_probe_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub status_ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            status_ttl_secs: 60,
            max_entries: 1024,
        }
    }
}

impl CacheConfig {
    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }
}
