pub mod auth;
pub mod organization;

pub use auth::{ApiKey, CallerUser, RequireKeyAuth};
pub use organization::OrganizationScope;
