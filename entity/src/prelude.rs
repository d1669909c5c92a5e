pub use super::batch_retirement_items::Entity as BatchRetirementItems;
pub use super::batch_retirements::Entity as BatchRetirements;
pub use super::credits::Entity as Credits;
pub use super::retirement_schedules::Entity as RetirementSchedules;
pub use super::retirements::Entity as Retirements;
pub use super::schedule_executions::Entity as ScheduleExecutions;
