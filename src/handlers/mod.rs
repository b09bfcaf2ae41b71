pub mod calendar;
pub mod gmail;
pub mod google_auth;
pub mod workspace;
