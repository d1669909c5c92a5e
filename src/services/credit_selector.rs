use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::{ApiError, Result},
    models::credit::{AllocationCommit, AllocationPortion, Credit, Provenance, Retirement},
    store::{RetirementStore, StoreError},
};

/// Split `amount` across `credits`, earliest expiry first.
///
/// Credits without an expiry date go last; ties fall back to creation time and
/// then id so the plan is deterministic. Only the last credit drawn may be
/// partially consumed.
pub fn plan_allocation(mut credits: Vec<Credit>, amount: Decimal) -> Result<Vec<AllocationPortion>> {
    credits.sort_by(|a, b| {
        let expiry = match (a.expiry_date, b.expiry_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        };
        expiry
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });

    let available: Decimal = credits.iter().map(|c| c.remaining_amount).sum();
    if available < amount {
        return Err(ApiError::InsufficientCredits(format!(
            "requested {}, available {}",
            amount, available
        )));
    }

    let mut portions = Vec::new();
    let mut outstanding = amount;
    for credit in credits {
        if outstanding <= Decimal::ZERO {
            break;
        }
        let take = credit.remaining_amount.min(outstanding);
        outstanding -= take;
        portions.push(AllocationPortion {
            credit_id: credit.id,
            expected_remaining: credit.remaining_amount,
            amount: take,
        });
    }

    Ok(portions)
}

/// Automatic credit allocation with optimistic retry
pub struct CreditSelector {
    store: Arc<dyn RetirementStore>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl CreditSelector {
    pub fn new(store: Arc<dyn RetirementStore>, clock: Arc<dyn Clock>, max_attempts: u32) -> Self {
        Self {
            store,
            clock,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Retire `amount` of `purpose` from the company's eligible credits.
    ///
    /// Re-reads and re-plans whenever the store reports that a credit moved
    /// underneath the plan. Nothing is mutated on failure.
    #[instrument(skip(self, provenance))]
    pub async fn allocate(
        &self,
        company_id: Uuid,
        purpose: &str,
        amount: Decimal,
        provenance: &Provenance,
    ) -> Result<Vec<Retirement>> {
        for attempt in 1..=self.max_attempts {
            let now = self.clock.now();
            let credits = self
                .store
                .list_eligible_credits(company_id, purpose, now)
                .await?;
            let portions = plan_allocation(credits, amount)?;
            let commit = AllocationCommit::new(company_id, purpose, portions, provenance, now);

            match self.store.commit_allocation(&commit).await {
                Ok(retirements) => {
                    debug!(
                        "Allocated {} across {} credits on attempt {}",
                        amount,
                        retirements.len(),
                        attempt
                    );
                    return Ok(retirements);
                }
                Err(StoreError::Conflict(reason)) => {
                    debug!("Allocation attempt {} conflicted: {}", attempt, reason);
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            "Giving up allocation for company {} after {} attempts",
            company_id, self.max_attempts
        );
        Err(ApiError::ConcurrencyConflict(format!(
            "credits kept changing during allocation; gave up after {} attempts",
            self.max_attempts
        )))
    }
}
