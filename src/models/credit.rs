use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Company-owned credit pool entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credit {
    pub id: Uuid,
    pub company_id: Uuid,
    /// Scope tag a retirement purpose must match
    pub purpose: String,
    pub remaining_amount: Decimal,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expiry_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Credit {
    pub fn is_expired_at(&self, at: OffsetDateTime) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry < at)
    }

    /// Whether this credit may be drawn for `purpose` on behalf of `company_id` at `at`
    pub fn is_eligible_for(&self, company_id: Uuid, purpose: &str, at: OffsetDateTime) -> bool {
        self.company_id == company_id
            && self.purpose == purpose
            && self.remaining_amount > Decimal::ZERO
            && !self.is_expired_at(at)
    }
}

/// Who a retirement is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum RetiredBy {
    User(Uuid),
    Schedule(Uuid),
}

impl RetiredBy {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Schedule(_) => "schedule",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::User(id) | Self::Schedule(id) => *id,
        }
    }

    pub fn from_parts(kind: &str, id: Uuid) -> Option<Self> {
        match kind {
            "user" => Some(Self::User(id)),
            "schedule" => Some(Self::Schedule(id)),
            _ => None,
        }
    }
}

/// Immutable record of an amount permanently consumed from one credit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Retirement {
    pub id: Uuid,
    pub company_id: Uuid,
    pub credit_id: Uuid,
    pub amount: Decimal,
    pub purpose: String,
    pub retired_by: RetiredBy,
    pub schedule_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub retired_at: OffsetDateTime,
}

/// Attribution stamped on every retirement an allocation produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provenance {
    pub retired_by: RetiredBy,
    pub schedule_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
}

impl Provenance {
    pub fn schedule(schedule_id: Uuid, retired_by: RetiredBy) -> Self {
        Self {
            retired_by,
            schedule_id: Some(schedule_id),
            batch_id: None,
        }
    }

    pub fn batch(batch_id: Uuid, user_id: Uuid) -> Self {
        Self {
            retired_by: RetiredBy::User(user_id),
            schedule_id: None,
            batch_id: Some(batch_id),
        }
    }
}

/// One credit's share of an allocation.
///
/// `expected_remaining` is the remaining amount the plan was computed from; the
/// store refuses the whole commit if any credit no longer holds exactly that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPortion {
    pub credit_id: Uuid,
    pub expected_remaining: Decimal,
    pub amount: Decimal,
}

/// A planned select-and-deduct, applied by the store as one atomic unit
#[derive(Debug, Clone)]
pub struct AllocationCommit {
    pub company_id: Uuid,
    pub purpose: String,
    pub portions: Vec<AllocationPortion>,
    pub retired_by: RetiredBy,
    pub schedule_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub retired_at: OffsetDateTime,
}

impl AllocationCommit {
    pub fn new(
        company_id: Uuid,
        purpose: &str,
        portions: Vec<AllocationPortion>,
        provenance: &Provenance,
        retired_at: OffsetDateTime,
    ) -> Self {
        Self {
            company_id,
            purpose: purpose.to_string(),
            portions,
            retired_by: provenance.retired_by,
            schedule_id: provenance.schedule_id,
            batch_id: provenance.batch_id,
            retired_at,
        }
    }

    /// Retirement rows this commit produces, one per portion
    pub fn retirements(&self) -> Vec<Retirement> {
        self.portions
            .iter()
            .map(|portion| Retirement {
                id: Uuid::now_v7(),
                company_id: self.company_id,
                credit_id: portion.credit_id,
                amount: portion.amount,
                purpose: self.purpose.clone(),
                retired_by: self.retired_by,
                schedule_id: self.schedule_id,
                batch_id: self.batch_id,
                retired_at: self.retired_at,
            })
            .collect()
    }
}
