use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Company-owned credit pool entry
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "credits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    /// Scope tag a retirement purpose must match (e.g. "scope1")
    pub purpose: String,
    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub remaining_amount: Decimal,
    pub expiry_date: Option<TimeDateTimeWithTimeZone>,
    pub created_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
