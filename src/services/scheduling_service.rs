use std::{sync::Arc, time::Duration as StdDuration};

use rust_decimal::Decimal;
use time::{Duration, OffsetDateTime};
use tokio::{sync::OwnedMutexGuard, task::JoinSet};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::SchedulerConfig,
    error::{ApiError, Result},
    models::{
        common::amount_problem,
        credit::{Provenance, RetiredBy},
        schedule::{
            Execution, ExecutionTrigger, NewSchedule, Schedule, ScheduleFilter, SchedulePatch,
        },
    },
    services::{
        execution_runner::{ExecutionRunner, RetirementRequest},
        recurrence,
        schedule_lock::ScheduleLocks,
    },
    store::RetirementStore,
};

/// Outcome of one scheduled occurrence within a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Succeeded,
    Failed,
    /// Lock busy, or the schedule was deleted, paused or moved since selection
    Skipped,
}

/// Counts for one pass over the due schedules
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Occurrences that could not be recorded at all
    pub errored: usize,
}

pub struct SchedulingService {
    store: Arc<dyn RetirementStore>,
    clock: Arc<dyn Clock>,
    runner: Arc<ExecutionRunner>,
    locks: ScheduleLocks,
    start_date_grace: Duration,
}

impl SchedulingService {
    pub fn new(
        store: Arc<dyn RetirementStore>,
        clock: Arc<dyn Clock>,
        runner: Arc<ExecutionRunner>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            clock,
            runner,
            locks: ScheduleLocks::new(StdDuration::from_millis(config.lock_timeout_ms)),
            start_date_grace: Duration::hours(config.start_date_grace_hours),
        }
    }

    #[instrument(skip(self, new_schedule), fields(name = %new_schedule.name))]
    pub async fn create(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        new_schedule: NewSchedule,
    ) -> Result<Schedule> {
        validate_text("name", &new_schedule.name)?;
        validate_text("purpose", &new_schedule.purpose)?;
        validate_amount(new_schedule.amount)?;

        let now = self.clock.now();
        if new_schedule.start_date < now - self.start_date_grace {
            return Err(ApiError::Validation(format!(
                "startDate {} lies too far in the past",
                new_schedule.start_date
            )));
        }

        let schedule = Schedule {
            id: Uuid::now_v7(),
            company_id,
            name: new_schedule.name.trim().to_string(),
            description: new_schedule.description,
            purpose: new_schedule.purpose.trim().to_string(),
            amount: new_schedule.amount,
            credit_selection: new_schedule.credit_selection,
            frequency: new_schedule.frequency,
            start_date: new_schedule.start_date,
            next_run_date: new_schedule.start_date,
            is_active: true,
            created_by: user_id,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_schedule(&schedule).await?;

        info!(
            "Created {} schedule {} for company {}, first run at {}",
            schedule.frequency.as_str(),
            schedule.id,
            company_id,
            schedule.next_run_date
        );
        Ok(schedule)
    }

    pub async fn list(&self, company_id: Uuid, filter: &ScheduleFilter) -> Result<Vec<Schedule>> {
        Ok(self.store.list_schedules(company_id, filter).await?)
    }

    pub async fn get(&self, company_id: Uuid, id: Uuid) -> Result<Schedule> {
        self.store
            .get_schedule(id)
            .await?
            .filter(|s| s.company_id == company_id)
            .ok_or_else(|| ApiError::NotFound(format!("Schedule {} not found", id)))
    }

    #[instrument(skip(self, patch))]
    pub async fn update(&self, company_id: Uuid, id: Uuid, patch: SchedulePatch) -> Result<Schedule> {
        let _guard = self.lock(id).await?;
        let mut schedule = self.get(company_id, id).await?;

        if let Some(name) = patch.name {
            validate_text("name", &name)?;
            schedule.name = name.trim().to_string();
        }
        if let Some(description) = patch.description {
            schedule.description = Some(description);
        }
        if let Some(purpose) = patch.purpose {
            validate_text("purpose", &purpose)?;
            schedule.purpose = purpose.trim().to_string();
        }
        if let Some(amount) = patch.amount {
            validate_amount(amount)?;
            schedule.amount = amount;
        }
        if let Some(selection) = patch.credit_selection {
            schedule.credit_selection = selection;
        }
        if let Some(frequency) = patch.frequency {
            if frequency != schedule.frequency {
                schedule.next_run_date = recurrence::advance(schedule.next_run_date, frequency)?;
                schedule.frequency = frequency;
            }
        }

        schedule.updated_at = self.clock.now();
        self.store.update_schedule(&schedule).await?;

        info!("Updated schedule {}", id);
        Ok(schedule)
    }

    #[instrument(skip(self))]
    pub async fn pause(&self, company_id: Uuid, id: Uuid) -> Result<Schedule> {
        let schedule = self.set_active(company_id, id, false).await?;
        info!("Paused schedule {}", id);
        Ok(schedule)
    }

    #[instrument(skip(self))]
    pub async fn resume(&self, company_id: Uuid, id: Uuid) -> Result<Schedule> {
        let schedule = self.set_active(company_id, id, true).await?;
        info!(
            "Resumed schedule {}, next run at {}",
            id, schedule.next_run_date
        );
        Ok(schedule)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, company_id: Uuid, id: Uuid) -> Result<()> {
        let guard = self.lock(id).await?;
        self.get(company_id, id).await?;

        if !self.store.delete_schedule(id).await? {
            return Err(ApiError::NotFound(format!("Schedule {} not found", id)));
        }
        drop(guard);
        self.locks.forget(id);

        info!("Deleted schedule {}", id);
        Ok(())
    }

    /// Run one occurrence right away. The schedule itself is left as it is:
    /// paused schedules stay paused and the next run date does not move.
    #[instrument(skip(self))]
    pub async fn execute_now(&self, company_id: Uuid, user_id: Uuid, id: Uuid) -> Result<Execution> {
        let _guard = self.lock(id).await?;
        let schedule = self.get(company_id, id).await?;

        let provenance = Provenance::schedule(schedule.id, RetiredBy::User(user_id));
        let execution = self
            .execute(&schedule, ExecutionTrigger::Manual, provenance)
            .await?;

        Ok(execution)
    }

    /// Newest first. Executions of a deleted schedule stay visible to its company.
    pub async fn list_executions(&self, company_id: Uuid, schedule_id: Uuid) -> Result<Vec<Execution>> {
        if let Some(schedule) = self.store.get_schedule(schedule_id).await? {
            if schedule.company_id != company_id {
                return Err(ApiError::NotFound(format!(
                    "Schedule {} not found",
                    schedule_id
                )));
            }
        }

        Ok(self.store.list_executions(company_id, schedule_id).await?)
    }

    /// One pass of the scheduler: every due schedule runs concurrently and the
    /// pass returns once all of them have finished.
    #[instrument(skip(self))]
    pub async fn run_due_schedules(self: &Arc<Self>) -> Result<TickReport> {
        let now = self.clock.now();
        let due = self.store.list_due_schedules(now).await?;

        let mut report = TickReport {
            due: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            return Ok(report);
        }

        let mut tasks = JoinSet::new();
        for schedule in due {
            let service = Arc::clone(self);
            tasks.spawn(async move {
                let id = schedule.id;
                (id, service.run_scheduled(id, now).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(TickOutcome::Succeeded))) => report.succeeded += 1,
                Ok((_, Ok(TickOutcome::Failed))) => report.failed += 1,
                Ok((_, Ok(TickOutcome::Skipped))) => report.skipped += 1,
                Ok((id, Err(e))) => {
                    error!("Scheduled run of {} could not be recorded: {}", id, e);
                    report.errored += 1;
                }
                Err(e) => {
                    error!("Scheduled run task panicked: {}", e);
                    report.errored += 1;
                }
            }
        }

        info!(
            "Tick finished: due={}, succeeded={}, failed={}, skipped={}, errored={}",
            report.due, report.succeeded, report.failed, report.skipped, report.errored
        );
        Ok(report)
    }

    async fn run_scheduled(&self, id: Uuid, now: OffsetDateTime) -> Result<TickOutcome> {
        let Some(_guard) = self.locks.acquire(id).await else {
            warn!("Schedule {} is busy; skipping it this tick", id);
            return Ok(TickOutcome::Skipped);
        };

        // Re-read under the lock; it may have been paused, deleted or run meanwhile
        let Some(mut schedule) = self.store.get_schedule(id).await? else {
            return Ok(TickOutcome::Skipped);
        };
        if !schedule.is_due(now) {
            return Ok(TickOutcome::Skipped);
        }

        // The occurrence is consumed before anything is retired: a failure
        // after this point may lose one run but never repeats it
        let (next_run_date, skipped) =
            recurrence::advance_past(schedule.next_run_date, schedule.frequency, now)?;
        if skipped > 0 {
            warn!(
                "Schedule {} missed {} occurrences; next run moved to {}",
                id, skipped, next_run_date
            );
        }

        let run_at = self.clock.now();
        schedule.next_run_date = next_run_date;
        schedule.last_run_at = Some(run_at);
        schedule.updated_at = run_at;
        self.store.update_schedule(&schedule).await?;

        let provenance = Provenance::schedule(schedule.id, RetiredBy::Schedule(schedule.id));
        let execution = self
            .attempt(&schedule, ExecutionTrigger::Scheduled, provenance, run_at)
            .await;
        if let Err(e) = self.store.insert_execution(&execution).await {
            error!(
                "Schedule {} ran at {} but its execution was not recorded: {}",
                id, run_at, e
            );
            return Err(e.into());
        }

        Ok(match execution.error_code {
            None => TickOutcome::Succeeded,
            Some(_) => TickOutcome::Failed,
        })
    }

    /// Run the retirement and record the execution, whatever its outcome
    async fn execute(
        &self,
        schedule: &Schedule,
        trigger: ExecutionTrigger,
        provenance: Provenance,
    ) -> Result<Execution> {
        let execution = self
            .attempt(schedule, trigger, provenance, self.clock.now())
            .await;
        self.store.insert_execution(&execution).await?;
        Ok(execution)
    }

    async fn attempt(
        &self,
        schedule: &Schedule,
        trigger: ExecutionTrigger,
        provenance: Provenance,
        run_at: OffsetDateTime,
    ) -> Execution {
        let request = RetirementRequest::for_schedule(schedule, provenance);

        match self.runner.run(&request).await {
            Ok(outcome) => {
                info!(
                    "Schedule {} retired {} {} ({})",
                    schedule.id,
                    outcome.total(),
                    schedule.purpose,
                    trigger.as_str()
                );
                Execution::success(
                    schedule,
                    trigger,
                    run_at,
                    outcome.retirement_ids(),
                    outcome.total(),
                )
            }
            Err(e) => {
                warn!(
                    "Schedule {} failed ({}): {}",
                    schedule.id,
                    trigger.as_str(),
                    e
                );
                Execution::failure(schedule, trigger, run_at, &e)
            }
        }
    }

    async fn set_active(&self, company_id: Uuid, id: Uuid, active: bool) -> Result<Schedule> {
        let _guard = self.lock(id).await?;
        let mut schedule = self.get(company_id, id).await?;

        if schedule.is_active != active {
            schedule.is_active = active;
            schedule.updated_at = self.clock.now();
            self.store.update_schedule(&schedule).await?;
        }
        Ok(schedule)
    }

    async fn lock(&self, id: Uuid) -> Result<OwnedMutexGuard<()>> {
        self.locks.acquire(id).await.ok_or_else(|| {
            ApiError::ConcurrencyConflict(format!(
                "Schedule {} is busy; try again shortly",
                id
            ))
        })
    }
}

fn validate_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn validate_amount(amount: Decimal) -> Result<()> {
    match amount_problem(amount) {
        Some(reason) => Err(ApiError::Validation(reason)),
        None => Ok(()),
    }
}
