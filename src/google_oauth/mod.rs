pub mod credentials;
pub mod endpoints;
pub mod manager;
pub mod scopes;
pub mod state;

pub use endpoints::{GoogleOauthEndpoints, GoogleUserInfo, build_http_client};
pub use manager::{AuthenticatedClient, GoogleAuthManager, RefreshOutcome};
