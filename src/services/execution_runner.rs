use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::{ApiError, Result},
    models::{
        credit::{AllocationCommit, AllocationPortion, Provenance, Retirement},
        schedule::{CreditSelection, Schedule},
    },
    services::credit_selector::CreditSelector,
    store::{RetirementStore, StoreError},
};

/// Where the credits for a retirement come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditSource {
    Automatic,
    Fixed(Uuid),
}

impl From<CreditSelection> for CreditSource {
    fn from(selection: CreditSelection) -> Self {
        match selection {
            CreditSelection::Automatic => Self::Automatic,
            CreditSelection::Manual { credit_id } => Self::Fixed(credit_id),
        }
    }
}

/// A single retirement to carry out
#[derive(Debug, Clone)]
pub struct RetirementRequest {
    pub company_id: Uuid,
    pub purpose: String,
    pub amount: Decimal,
    pub source: CreditSource,
    pub provenance: Provenance,
}

impl RetirementRequest {
    /// One occurrence of `schedule`, attributed to `provenance`
    pub fn for_schedule(schedule: &Schedule, provenance: Provenance) -> Self {
        Self {
            company_id: schedule.company_id,
            purpose: schedule.purpose.clone(),
            amount: schedule.amount,
            source: schedule.credit_selection.into(),
            provenance,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetirementOutcome {
    pub retirements: Vec<Retirement>,
}

impl RetirementOutcome {
    pub fn retirement_ids(&self) -> Vec<Uuid> {
        self.retirements.iter().map(|r| r.id).collect()
    }

    pub fn total(&self) -> Decimal {
        self.retirements.iter().map(|r| r.amount).sum()
    }
}

/// Carries out one retirement. Writes retirements and credit deductions only;
/// execution and batch records are the caller's job.
pub struct ExecutionRunner {
    store: Arc<dyn RetirementStore>,
    clock: Arc<dyn Clock>,
    selector: Arc<CreditSelector>,
}

impl ExecutionRunner {
    pub fn new(
        store: Arc<dyn RetirementStore>,
        clock: Arc<dyn Clock>,
        selector: Arc<CreditSelector>,
    ) -> Self {
        Self {
            store,
            clock,
            selector,
        }
    }

    #[instrument(skip(self, request), fields(company_id = %request.company_id, amount = %request.amount))]
    pub async fn run(&self, request: &RetirementRequest) -> Result<RetirementOutcome> {
        let retirements = match request.source {
            CreditSource::Automatic => {
                self.selector
                    .allocate(
                        request.company_id,
                        &request.purpose,
                        request.amount,
                        &request.provenance,
                    )
                    .await?
            }
            CreditSource::Fixed(credit_id) => self.retire_from(credit_id, request).await?,
        };

        Ok(RetirementOutcome { retirements })
    }

    async fn retire_from(
        &self,
        credit_id: Uuid,
        request: &RetirementRequest,
    ) -> Result<Vec<Retirement>> {
        let max_attempts = self.selector.max_attempts();

        for attempt in 1..=max_attempts {
            let now = self.clock.now();
            let credit = self
                .store
                .get_credit(credit_id)
                .await?
                .filter(|c| c.company_id == request.company_id)
                .ok_or_else(|| {
                    ApiError::CreditNotFound(format!("credit {} does not exist", credit_id))
                })?;

            if credit.purpose != request.purpose {
                return Err(ApiError::CreditIneligible(format!(
                    "credit {} is tagged '{}', not '{}'",
                    credit_id, credit.purpose, request.purpose
                )));
            }
            if credit.is_expired_at(now) {
                return Err(ApiError::CreditIneligible(format!(
                    "credit {} expired",
                    credit_id
                )));
            }
            if credit.remaining_amount < request.amount {
                return Err(ApiError::CreditNotFound(format!(
                    "credit {} has {} remaining, {} requested",
                    credit_id, credit.remaining_amount, request.amount
                )));
            }

            let commit = AllocationCommit::new(
                request.company_id,
                &request.purpose,
                vec![AllocationPortion {
                    credit_id,
                    expected_remaining: credit.remaining_amount,
                    amount: request.amount,
                }],
                &request.provenance,
                now,
            );

            match self.store.commit_allocation(&commit).await {
                Ok(retirements) => return Ok(retirements),
                Err(StoreError::Conflict(reason)) => {
                    debug!("Fixed-credit attempt {} conflicted: {}", attempt, reason);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ApiError::ConcurrencyConflict(format!(
            "credit {} kept changing; gave up after {} attempts",
            credit_id, max_attempts
        )))
    }
}
