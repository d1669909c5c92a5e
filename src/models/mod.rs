pub mod batch;
pub mod common;
pub mod credit;
pub mod schedule;
