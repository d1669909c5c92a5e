// Service modules
pub mod batch_service;
pub mod credit_selector;
pub mod csv_decoder;
pub mod execution_runner;
pub mod jwt_service;
pub mod recurrence;
pub mod schedule_lock;
pub mod scheduling_service;
pub mod ticker;

pub use batch_service::BatchService;
pub use credit_selector::CreditSelector;
pub use execution_runner::ExecutionRunner;
pub use jwt_service::JWTService;
pub use scheduling_service::{SchedulingService, TickReport};
