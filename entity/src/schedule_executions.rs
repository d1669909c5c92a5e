use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One attempted schedule occurrence.
///
/// Rows are never deleted and carry no foreign key to the schedule, so the
/// history outlives a deleted schedule.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "schedule_executions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub company_id: Uuid,
    /// "scheduled" or "manual"
    pub trigger: String,
    /// "success" or "failure"
    pub outcome: String,
    pub run_at: TimeDateTimeWithTimeZone,
    /// JSON array of retirement ids
    #[sea_orm(column_type = "JsonBinary")]
    pub retirement_ids: Json,
    #[sea_orm(column_type = "Decimal(Some((20, 6)))", nullable)]
    pub retired_amount: Option<Decimal>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
