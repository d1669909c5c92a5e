use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Credit pool
        manager
            .create_table(
                Table::create()
                    .table(Credits::Table)
                    .if_not_exists()
                    .col(pk_uuid(Credits::Id))
                    .col(uuid(Credits::CompanyId))
                    .col(string(Credits::Purpose))
                    .col(decimal_len(Credits::RemainingAmount, 20, 6))
                    .col(timestamp_with_time_zone_null(Credits::ExpiryDate))
                    .col(
                        timestamp_with_time_zone(Credits::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .check(Expr::col(Credits::RemainingAmount).gte(0))
                    .to_owned(),
            )
            .await?;

        // Selection order: company + purpose, earliest expiry, oldest first
        manager
            .create_index(
                Index::create()
                    .name("idx_credits_company_purpose_expiry")
                    .table(Credits::Table)
                    .col(Credits::CompanyId)
                    .col(Credits::Purpose)
                    .col(Credits::ExpiryDate)
                    .col(Credits::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Retirements (append-only)
        manager
            .create_table(
                Table::create()
                    .table(Retirements::Table)
                    .if_not_exists()
                    .col(pk_uuid(Retirements::Id))
                    .col(uuid(Retirements::CompanyId))
                    .col(uuid(Retirements::CreditId))
                    .col(decimal_len(Retirements::Amount, 20, 6))
                    .col(string(Retirements::Purpose))
                    .col(string_len(Retirements::RetiredByKind, 16))
                    .col(uuid(Retirements::RetiredBy))
                    .col(uuid_null(Retirements::ScheduleId))
                    .col(uuid_null(Retirements::BatchId))
                    .col(timestamp_with_time_zone(Retirements::RetiredAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_retirements_credit")
                            .from(Retirements::Table, Retirements::CreditId)
                            .to(Credits::Table, Credits::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_retirements_credit_id")
                    .table(Retirements::Table)
                    .col(Retirements::CreditId)
                    .to_owned(),
            )
            .await?;

        // Recurring schedules
        manager
            .create_table(
                Table::create()
                    .table(RetirementSchedules::Table)
                    .if_not_exists()
                    .col(pk_uuid(RetirementSchedules::Id))
                    .col(uuid(RetirementSchedules::CompanyId))
                    .col(string(RetirementSchedules::Name))
                    .col(text_null(RetirementSchedules::Description))
                    .col(string(RetirementSchedules::Purpose))
                    .col(decimal_len(RetirementSchedules::Amount, 20, 6))
                    .col(string_len(RetirementSchedules::CreditSelection, 16))
                    .col(uuid_null(RetirementSchedules::CreditId))
                    .col(string_len(RetirementSchedules::Frequency, 16))
                    .col(timestamp_with_time_zone(RetirementSchedules::StartDate))
                    .col(timestamp_with_time_zone(RetirementSchedules::NextRunDate))
                    .col(boolean(RetirementSchedules::IsActive).default(true))
                    .col(uuid(RetirementSchedules::CreatedBy))
                    .col(timestamp_with_time_zone_null(RetirementSchedules::LastRunAt))
                    .col(
                        timestamp_with_time_zone(RetirementSchedules::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(RetirementSchedules::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Tick query: active schedules due by next_run_date
        manager
            .create_index(
                Index::create()
                    .name("idx_retirement_schedules_due")
                    .table(RetirementSchedules::Table)
                    .col(RetirementSchedules::IsActive)
                    .col(RetirementSchedules::NextRunDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_retirement_schedules_company")
                    .table(RetirementSchedules::Table)
                    .col(RetirementSchedules::CompanyId)
                    .to_owned(),
            )
            .await?;

        // Execution log; no FK to schedules so history survives deletion
        manager
            .create_table(
                Table::create()
                    .table(ScheduleExecutions::Table)
                    .if_not_exists()
                    .col(pk_uuid(ScheduleExecutions::Id))
                    .col(uuid(ScheduleExecutions::ScheduleId))
                    .col(uuid(ScheduleExecutions::CompanyId))
                    .col(string_len(ScheduleExecutions::Trigger, 16))
                    .col(string_len(ScheduleExecutions::Outcome, 16))
                    .col(timestamp_with_time_zone(ScheduleExecutions::RunAt))
                    .col(json_binary(ScheduleExecutions::RetirementIds))
                    .col(decimal_len_null(ScheduleExecutions::RetiredAmount, 20, 6))
                    .col(string_null(ScheduleExecutions::ErrorCode))
                    .col(text_null(ScheduleExecutions::ErrorMessage))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_schedule_executions_schedule_run_at")
                    .table(ScheduleExecutions::Table)
                    .col(ScheduleExecutions::ScheduleId)
                    .col(ScheduleExecutions::RunAt)
                    .to_owned(),
            )
            .await?;

        // Batches
        manager
            .create_table(
                Table::create()
                    .table(BatchRetirements::Table)
                    .if_not_exists()
                    .col(pk_uuid(BatchRetirements::Id))
                    .col(uuid(BatchRetirements::CompanyId))
                    .col(string(BatchRetirements::Name))
                    .col(text_null(BatchRetirements::Description))
                    .col(string_len(BatchRetirements::Status, 16))
                    .col(integer(BatchRetirements::TotalItems))
                    .col(integer(BatchRetirements::CompletedItems).default(0))
                    .col(integer(BatchRetirements::FailedItems).default(0))
                    .col(uuid(BatchRetirements::CreatedBy))
                    .col(
                        timestamp_with_time_zone(BatchRetirements::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(timestamp_with_time_zone_null(BatchRetirements::CompletedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_batch_retirements_company")
                    .table(BatchRetirements::Table)
                    .col(BatchRetirements::CompanyId)
                    .col(BatchRetirements::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BatchRetirementItems::Table)
                    .if_not_exists()
                    .col(pk_uuid(BatchRetirementItems::Id))
                    .col(uuid(BatchRetirementItems::BatchId))
                    .col(integer(BatchRetirementItems::Position))
                    .col(string_null(BatchRetirementItems::CreditId))
                    .col(decimal_len_null(BatchRetirementItems::Amount, 20, 6))
                    .col(string(BatchRetirementItems::Purpose))
                    .col(string_len(BatchRetirementItems::Status, 16))
                    .col(json_binary(BatchRetirementItems::RetirementIds))
                    .col(string_null(BatchRetirementItems::ErrorCode))
                    .col(text_null(BatchRetirementItems::ErrorMessage))
                    .col(timestamp_with_time_zone_null(BatchRetirementItems::ProcessedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_batch_retirement_items_batch")
                            .from(BatchRetirementItems::Table, BatchRetirementItems::BatchId)
                            .to(BatchRetirements::Table, BatchRetirements::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_batch_retirement_items_batch_position")
                    .table(BatchRetirementItems::Table)
                    .col(BatchRetirementItems::BatchId)
                    .col(BatchRetirementItems::Position)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BatchRetirementItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BatchRetirements::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ScheduleExecutions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RetirementSchedules::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Retirements::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Credits::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Credits {
    Table,
    Id,
    CompanyId,
    Purpose,
    RemainingAmount,
    ExpiryDate,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Retirements {
    Table,
    Id,
    CompanyId,
    CreditId,
    Amount,
    Purpose,
    RetiredByKind,
    RetiredBy,
    ScheduleId,
    BatchId,
    RetiredAt,
}

#[derive(DeriveIden)]
enum RetirementSchedules {
    Table,
    Id,
    CompanyId,
    Name,
    Description,
    Purpose,
    Amount,
    CreditSelection,
    CreditId,
    Frequency,
    StartDate,
    NextRunDate,
    IsActive,
    CreatedBy,
    LastRunAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ScheduleExecutions {
    Table,
    Id,
    ScheduleId,
    CompanyId,
    Trigger,
    Outcome,
    RunAt,
    RetirementIds,
    RetiredAmount,
    ErrorCode,
    ErrorMessage,
}

#[derive(DeriveIden)]
enum BatchRetirements {
    Table,
    Id,
    CompanyId,
    Name,
    Description,
    Status,
    TotalItems,
    CompletedItems,
    FailedItems,
    CreatedBy,
    CreatedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum BatchRetirementItems {
    Table,
    Id,
    BatchId,
    Position,
    CreditId,
    Amount,
    Purpose,
    Status,
    RetirementIds,
    ErrorCode,
    ErrorMessage,
    ProcessedAt,
}
