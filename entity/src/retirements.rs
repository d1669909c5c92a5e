use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Immutable record of an amount permanently consumed from one credit
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "retirements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    pub credit_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub amount: Decimal,
    pub purpose: String,
    /// "user" or "schedule"
    pub retired_by_kind: String,
    pub retired_by: Uuid,
    pub schedule_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub retired_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
