//! SeaORM entities for the retirement tables.
//!
//! Enumerated columns (frequency, status, outcome, ...) are stored as lowercase
//! strings; the service layer owns the conversions.

pub mod prelude;

pub mod batch_retirement_items;
pub mod batch_retirements;
pub mod credits;
pub mod retirement_schedules;
pub mod retirements;
pub mod schedule_executions;
