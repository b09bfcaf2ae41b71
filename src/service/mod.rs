pub mod calendar;
pub mod gmail;
pub mod maintenance;
pub mod mime;
pub mod workspace_loader;

pub use calendar::CalendarService;
pub use gmail::GmailService;
pub use maintenance::{MaintenanceHandle, MaintenanceStatus, SweepReport};
