use async_trait::async_trait;
use sea_orm::{
    entity::*, query::*, sea_query::Expr, DatabaseConnection, DbErr, TransactionTrait,
};
use time::OffsetDateTime;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{RetirementStore, StoreError, StoreResult};
use crate::models::{
    batch::{Batch, BatchFilter, BatchItem, BatchItemStatus, BatchStatus},
    credit::{AllocationCommit, Credit, RetiredBy, Retirement},
    schedule::{
        CreditSelection, CreditSelectionMode, Execution, ExecutionOutcome, ExecutionTrigger,
        Frequency, Schedule, ScheduleFilter,
    },
};

/// sea-orm backed store (PostgreSQL)
pub struct PostgresStore {
    db: DatabaseConnection,
}

impl PostgresStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn corrupt(what: &str, value: &str) -> StoreError {
    StoreError::Backend(format!("unrecognized {} '{}' in database", what, value))
}

fn count(value: i32) -> u32 {
    u32::try_from(value).unwrap_or_default()
}

fn ids_to_json(ids: &[Uuid]) -> StoreResult<serde_json::Value> {
    serde_json::to_value(ids).map_err(|e| StoreError::Backend(e.to_string()))
}

fn ids_from_json(value: serde_json::Value) -> StoreResult<Vec<Uuid>> {
    serde_json::from_value(value).map_err(|e| StoreError::Backend(e.to_string()))
}

fn credit_from_model(m: entity::credits::Model) -> Credit {
    Credit {
        id: m.id,
        company_id: m.company_id,
        purpose: m.purpose,
        remaining_amount: m.remaining_amount,
        expiry_date: m.expiry_date,
        created_at: m.created_at,
    }
}

fn retirement_from_model(m: entity::retirements::Model) -> StoreResult<Retirement> {
    let retired_by = RetiredBy::from_parts(&m.retired_by_kind, m.retired_by)
        .ok_or_else(|| corrupt("retired_by_kind", &m.retired_by_kind))?;

    Ok(Retirement {
        id: m.id,
        company_id: m.company_id,
        credit_id: m.credit_id,
        amount: m.amount,
        purpose: m.purpose,
        retired_by,
        schedule_id: m.schedule_id,
        batch_id: m.batch_id,
        retired_at: m.retired_at,
    })
}

fn schedule_from_model(m: entity::retirement_schedules::Model) -> StoreResult<Schedule> {
    let frequency =
        Frequency::from_str(&m.frequency).ok_or_else(|| corrupt("frequency", &m.frequency))?;
    let mode = match m.credit_selection.as_str() {
        "automatic" => CreditSelectionMode::Automatic,
        "manual" => CreditSelectionMode::Manual,
        other => return Err(corrupt("credit_selection", other)),
    };
    let credit_selection = CreditSelection::from_parts(mode, m.credit_id)
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    Ok(Schedule {
        id: m.id,
        company_id: m.company_id,
        name: m.name,
        description: m.description,
        purpose: m.purpose,
        amount: m.amount,
        credit_selection,
        frequency,
        start_date: m.start_date,
        next_run_date: m.next_run_date,
        is_active: m.is_active,
        created_by: m.created_by,
        last_run_at: m.last_run_at,
        created_at: m.created_at,
        updated_at: m.updated_at,
    })
}

fn schedule_to_active(s: &Schedule) -> entity::retirement_schedules::ActiveModel {
    entity::retirement_schedules::ActiveModel {
        id: Set(s.id),
        company_id: Set(s.company_id),
        name: Set(s.name.clone()),
        description: Set(s.description.clone()),
        purpose: Set(s.purpose.clone()),
        amount: Set(s.amount),
        credit_selection: Set(s.credit_selection.mode_str().to_string()),
        credit_id: Set(s.credit_selection.credit_id()),
        frequency: Set(s.frequency.as_str().to_string()),
        start_date: Set(s.start_date),
        next_run_date: Set(s.next_run_date),
        is_active: Set(s.is_active),
        created_by: Set(s.created_by),
        last_run_at: Set(s.last_run_at),
        created_at: Set(s.created_at),
        updated_at: Set(s.updated_at),
    }
}

fn execution_from_model(m: entity::schedule_executions::Model) -> StoreResult<Execution> {
    Ok(Execution {
        id: m.id,
        schedule_id: m.schedule_id,
        company_id: m.company_id,
        trigger: ExecutionTrigger::from_str(&m.trigger)
            .ok_or_else(|| corrupt("trigger", &m.trigger))?,
        outcome: ExecutionOutcome::from_str(&m.outcome)
            .ok_or_else(|| corrupt("outcome", &m.outcome))?,
        run_at: m.run_at,
        retirement_ids: ids_from_json(m.retirement_ids)?,
        retired_amount: m.retired_amount,
        error_code: m.error_code,
        error_message: m.error_message,
    })
}

fn batch_from_model(m: entity::batch_retirements::Model) -> StoreResult<Batch> {
    Ok(Batch {
        id: m.id,
        company_id: m.company_id,
        name: m.name,
        description: m.description,
        status: BatchStatus::from_str(&m.status).ok_or_else(|| corrupt("status", &m.status))?,
        total_items: count(m.total_items),
        completed_items: count(m.completed_items),
        failed_items: count(m.failed_items),
        created_by: m.created_by,
        created_at: m.created_at,
        completed_at: m.completed_at,
    })
}

fn batch_item_from_model(m: entity::batch_retirement_items::Model) -> StoreResult<BatchItem> {
    Ok(BatchItem {
        id: m.id,
        batch_id: m.batch_id,
        position: count(m.position),
        credit_id: m.credit_id,
        amount: m.amount,
        purpose: m.purpose,
        status: BatchItemStatus::from_str(&m.status)
            .ok_or_else(|| corrupt("item status", &m.status))?,
        retirement_ids: ids_from_json(m.retirement_ids)?,
        error_code: m.error_code,
        error_message: m.error_message,
        processed_at: m.processed_at,
    })
}

fn batch_item_to_active(item: &BatchItem) -> StoreResult<entity::batch_retirement_items::ActiveModel> {
    Ok(entity::batch_retirement_items::ActiveModel {
        id: Set(item.id),
        batch_id: Set(item.batch_id),
        position: Set(item.position as i32),
        credit_id: Set(item.credit_id.clone()),
        amount: Set(item.amount),
        purpose: Set(item.purpose.clone()),
        status: Set(item.status.as_str().to_string()),
        retirement_ids: Set(ids_to_json(&item.retirement_ids)?),
        error_code: Set(item.error_code.clone()),
        error_message: Set(item.error_message.clone()),
        processed_at: Set(item.processed_at),
    })
}

#[async_trait]
impl RetirementStore for PostgresStore {
    async fn insert_credit(&self, credit: &Credit) -> StoreResult<()> {
        let model = entity::credits::ActiveModel {
            id: Set(credit.id),
            company_id: Set(credit.company_id),
            purpose: Set(credit.purpose.clone()),
            remaining_amount: Set(credit.remaining_amount),
            expiry_date: Set(credit.expiry_date),
            created_at: Set(credit.created_at),
        };
        entity::credits::Entity::insert(model).exec(&self.db).await?;
        Ok(())
    }

    async fn get_credit(&self, id: Uuid) -> StoreResult<Option<Credit>> {
        let credit = entity::credits::Entity::find_by_id(id).one(&self.db).await?;
        Ok(credit.map(credit_from_model))
    }

    async fn list_eligible_credits(
        &self,
        company_id: Uuid,
        purpose: &str,
        at: OffsetDateTime,
    ) -> StoreResult<Vec<Credit>> {
        let credits = entity::credits::Entity::find()
            .filter(entity::credits::Column::CompanyId.eq(company_id))
            .filter(entity::credits::Column::Purpose.eq(purpose))
            .filter(entity::credits::Column::RemainingAmount.gt(rust_decimal::Decimal::ZERO))
            .filter(
                Condition::any()
                    .add(entity::credits::Column::ExpiryDate.is_null())
                    .add(entity::credits::Column::ExpiryDate.gte(at)),
            )
            .all(&self.db)
            .await?;

        Ok(credits.into_iter().map(credit_from_model).collect())
    }

    #[instrument(skip(self, commit), fields(company_id = %commit.company_id, portions = commit.portions.len()))]
    async fn commit_allocation(&self, commit: &AllocationCommit) -> StoreResult<Vec<Retirement>> {
        let txn = self.db.begin().await?;

        // Compare-and-swap per credit; a concurrent commit that got there first
        // leaves zero matching rows
        for portion in &commit.portions {
            let result = entity::credits::Entity::update_many()
                .col_expr(
                    entity::credits::Column::RemainingAmount,
                    Expr::col(entity::credits::Column::RemainingAmount).sub(portion.amount),
                )
                .filter(entity::credits::Column::Id.eq(portion.credit_id))
                .filter(entity::credits::Column::RemainingAmount.eq(portion.expected_remaining))
                .filter(entity::credits::Column::RemainingAmount.gte(portion.amount))
                .exec(&txn)
                .await?;

            if result.rows_affected != 1 {
                txn.rollback().await?;
                debug!(credit_id = %portion.credit_id, "allocation lost the race");
                return Err(StoreError::Conflict(format!(
                    "credit {} changed since it was read",
                    portion.credit_id
                )));
            }
        }

        let retirements = commit.retirements();
        if !retirements.is_empty() {
            let models = retirements.iter().map(|r| entity::retirements::ActiveModel {
                id: Set(r.id),
                company_id: Set(r.company_id),
                credit_id: Set(r.credit_id),
                amount: Set(r.amount),
                purpose: Set(r.purpose.clone()),
                retired_by_kind: Set(r.retired_by.kind().to_string()),
                retired_by: Set(r.retired_by.id()),
                schedule_id: Set(r.schedule_id),
                batch_id: Set(r.batch_id),
                retired_at: Set(r.retired_at),
            });
            entity::retirements::Entity::insert_many(models)
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(retirements)
    }

    async fn list_retirements(&self, company_id: Uuid) -> StoreResult<Vec<Retirement>> {
        entity::retirements::Entity::find()
            .filter(entity::retirements::Column::CompanyId.eq(company_id))
            .order_by_asc(entity::retirements::Column::RetiredAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(retirement_from_model)
            .collect()
    }

    async fn insert_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        entity::retirement_schedules::Entity::insert(schedule_to_active(schedule))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn get_schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>> {
        entity::retirement_schedules::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(schedule_from_model)
            .transpose()
    }

    async fn list_schedules(
        &self,
        company_id: Uuid,
        filter: &ScheduleFilter,
    ) -> StoreResult<Vec<Schedule>> {
        let mut query = entity::retirement_schedules::Entity::find()
            .filter(entity::retirement_schedules::Column::CompanyId.eq(company_id));
        if let Some(active) = filter.is_active {
            query = query.filter(entity::retirement_schedules::Column::IsActive.eq(active));
        }
        if let Some(frequency) = filter.frequency {
            query = query
                .filter(entity::retirement_schedules::Column::Frequency.eq(frequency.as_str()));
        }

        query
            .order_by_asc(entity::retirement_schedules::Column::NextRunDate)
            .order_by_asc(entity::retirement_schedules::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(schedule_from_model)
            .collect()
    }

    async fn update_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        match schedule_to_active(schedule).update(&self.db).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(StoreError::NotFound(format!(
                "schedule {} not found",
                schedule.id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_schedule(&self, id: Uuid) -> StoreResult<bool> {
        let result = entity::retirement_schedules::Entity::delete_by_id(id)
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn list_due_schedules(&self, now: OffsetDateTime) -> StoreResult<Vec<Schedule>> {
        entity::retirement_schedules::Entity::find()
            .filter(entity::retirement_schedules::Column::IsActive.eq(true))
            .filter(entity::retirement_schedules::Column::NextRunDate.lte(now))
            .order_by_asc(entity::retirement_schedules::Column::NextRunDate)
            .all(&self.db)
            .await?
            .into_iter()
            .map(schedule_from_model)
            .collect()
    }

    async fn insert_execution(&self, execution: &Execution) -> StoreResult<()> {
        let model = entity::schedule_executions::ActiveModel {
            id: Set(execution.id),
            schedule_id: Set(execution.schedule_id),
            company_id: Set(execution.company_id),
            trigger: Set(execution.trigger.as_str().to_string()),
            outcome: Set(execution.outcome.as_str().to_string()),
            run_at: Set(execution.run_at),
            retirement_ids: Set(ids_to_json(&execution.retirement_ids)?),
            retired_amount: Set(execution.retired_amount),
            error_code: Set(execution.error_code.clone()),
            error_message: Set(execution.error_message.clone()),
        };
        entity::schedule_executions::Entity::insert(model)
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn list_executions(
        &self,
        company_id: Uuid,
        schedule_id: Uuid,
    ) -> StoreResult<Vec<Execution>> {
        entity::schedule_executions::Entity::find()
            .filter(entity::schedule_executions::Column::CompanyId.eq(company_id))
            .filter(entity::schedule_executions::Column::ScheduleId.eq(schedule_id))
            .order_by_desc(entity::schedule_executions::Column::RunAt)
            .order_by_desc(entity::schedule_executions::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(execution_from_model)
            .collect()
    }

    async fn insert_batch(&self, batch: &Batch, items: &[BatchItem]) -> StoreResult<()> {
        let txn = self.db.begin().await?;

        let model = entity::batch_retirements::ActiveModel {
            id: Set(batch.id),
            company_id: Set(batch.company_id),
            name: Set(batch.name.clone()),
            description: Set(batch.description.clone()),
            status: Set(batch.status.as_str().to_string()),
            total_items: Set(batch.total_items as i32),
            completed_items: Set(batch.completed_items as i32),
            failed_items: Set(batch.failed_items as i32),
            created_by: Set(batch.created_by),
            created_at: Set(batch.created_at),
            completed_at: Set(batch.completed_at),
        };
        entity::batch_retirements::Entity::insert(model)
            .exec(&txn)
            .await?;

        // Chunked to stay under the bind-parameter limit on large uploads
        for chunk in items.chunks(1_000) {
            let models = chunk
                .iter()
                .map(batch_item_to_active)
                .collect::<StoreResult<Vec<_>>>()?;
            entity::batch_retirement_items::Entity::insert_many(models)
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(())
    }

    async fn record_batch_item(&self, item: &BatchItem) -> StoreResult<Batch> {
        let counter = match item.status {
            BatchItemStatus::Completed => entity::batch_retirements::Column::CompletedItems,
            BatchItemStatus::Failed => entity::batch_retirements::Column::FailedItems,
            BatchItemStatus::Pending => {
                return Err(StoreError::Backend(format!(
                    "batch item {} recorded while still pending",
                    item.id
                )))
            }
        };

        let txn = self.db.begin().await?;

        let update = entity::batch_retirement_items::ActiveModel {
            id: Set(item.id),
            status: Set(item.status.as_str().to_string()),
            retirement_ids: Set(ids_to_json(&item.retirement_ids)?),
            error_code: Set(item.error_code.clone()),
            error_message: Set(item.error_message.clone()),
            processed_at: Set(item.processed_at),
            ..Default::default()
        };
        match update.update(&txn).await {
            Ok(_) => {}
            Err(DbErr::RecordNotUpdated) => {
                txn.rollback().await?;
                return Err(StoreError::NotFound(format!(
                    "batch item {} not found",
                    item.id
                )));
            }
            Err(e) => return Err(e.into()),
        }

        entity::batch_retirements::Entity::update_many()
            .col_expr(counter, Expr::col(counter).add(1))
            .filter(entity::batch_retirements::Column::Id.eq(item.batch_id))
            .exec(&txn)
            .await?;

        let batch = entity::batch_retirements::Entity::find_by_id(item.batch_id)
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("batch {} not found", item.batch_id)))?;

        txn.commit().await?;
        batch_from_model(batch)
    }

    async fn finish_batch(&self, batch: &Batch) -> StoreResult<Batch> {
        let update = entity::batch_retirements::ActiveModel {
            id: Set(batch.id),
            status: Set(batch.status.as_str().to_string()),
            completed_items: Set(batch.completed_items as i32),
            failed_items: Set(batch.failed_items as i32),
            completed_at: Set(batch.completed_at),
            ..Default::default()
        };

        match update.update(&self.db).await {
            Ok(model) => batch_from_model(model),
            Err(DbErr::RecordNotUpdated) => {
                Err(StoreError::NotFound(format!("batch {} not found", batch.id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_batch(&self, id: Uuid) -> StoreResult<Option<Batch>> {
        entity::batch_retirements::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(batch_from_model)
            .transpose()
    }

    async fn list_batch_items(&self, batch_id: Uuid) -> StoreResult<Vec<BatchItem>> {
        entity::batch_retirement_items::Entity::find()
            .filter(entity::batch_retirement_items::Column::BatchId.eq(batch_id))
            .order_by_asc(entity::batch_retirement_items::Column::Position)
            .all(&self.db)
            .await?
            .into_iter()
            .map(batch_item_from_model)
            .collect()
    }

    async fn list_batches(
        &self,
        company_id: Uuid,
        filter: &BatchFilter,
    ) -> StoreResult<Vec<Batch>> {
        let mut query = entity::batch_retirements::Entity::find()
            .filter(entity::batch_retirements::Column::CompanyId.eq(company_id));
        if let Some(status) = filter.status {
            query = query.filter(entity::batch_retirements::Column::Status.eq(status.as_str()));
        }

        query
            .order_by_desc(entity::batch_retirements::Column::CreatedAt)
            .order_by_desc(entity::batch_retirements::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(batch_from_model)
            .collect()
    }
}
