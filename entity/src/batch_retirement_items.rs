use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "batch_retirement_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub batch_id: Uuid,
    /// Input order within the batch (CSV data-row order for uploads)
    pub position: i32,
    /// Raw credit reference; empty means automatic selection
    pub credit_id: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((20, 6)))", nullable)]
    pub amount: Option<Decimal>,
    pub purpose: String,
    /// pending | completed | failed
    pub status: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub retirement_ids: Json,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub processed_at: Option<TimeDateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
