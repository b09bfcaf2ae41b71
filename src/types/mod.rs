pub mod calendar;
pub mod gmail;
