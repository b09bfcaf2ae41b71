use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Token set returned by the token endpoint, normalised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present only on first offline consent or when Google rotates it.
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

/// Organization credential as the manager sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub organization_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub refresh_count: i64,
    pub last_refresh_at: Option<DateTime<Utc>>,
}

impl StoredCredential {
    /// Expired, or expiring within `skew` of `now`. No expiry means never.
    pub fn needs_refresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_at.is_some_and(|at| at <= now + skew)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }

    /// True if `other` was refreshed after this snapshot was taken.
    pub fn superseded_by(&self, other: &StoredCredential) -> bool {
        other.refresh_count > self.refresh_count || other.access_token != self.access_token
    }
}
