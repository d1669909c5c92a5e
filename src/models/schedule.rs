use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

use super::common::{parse_start_date, validate_positive_amount};
use crate::error::{ApiError, Result};

/// Recurrence unit of a schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "quarterly" => Some(Self::Quarterly),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }
}

/// Selection mode as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditSelectionMode {
    Automatic,
    Manual,
}

/// How credits are resolved for a retirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "creditSelection", rename_all = "lowercase")]
pub enum CreditSelection {
    /// The credit selector picks credits, earliest expiry first
    Automatic,
    /// Exactly one fixed credit
    Manual {
        #[serde(rename = "creditId")]
        credit_id: Uuid,
    },
}

impl CreditSelection {
    /// Build from the wire pair, enforcing manual ⇔ credit id present
    pub fn from_parts(mode: CreditSelectionMode, credit_id: Option<Uuid>) -> Result<Self> {
        match (mode, credit_id) {
            (CreditSelectionMode::Automatic, None) => Ok(Self::Automatic),
            (CreditSelectionMode::Manual, Some(credit_id)) => Ok(Self::Manual { credit_id }),
            (CreditSelectionMode::Automatic, Some(_)) => Err(ApiError::Validation(
                "creditId must not be set when creditSelection is automatic".to_string(),
            )),
            (CreditSelectionMode::Manual, None) => Err(ApiError::Validation(
                "creditId is required when creditSelection is manual".to_string(),
            )),
        }
    }

    pub fn mode_str(&self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Manual { .. } => "manual",
        }
    }

    pub fn credit_id(&self) -> Option<Uuid> {
        match self {
            Self::Automatic => None,
            Self::Manual { credit_id } => Some(*credit_id),
        }
    }
}

/// Company-scoped recurring retirement directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub purpose: String,
    pub amount: Decimal,
    #[serde(flatten)]
    pub credit_selection: CreditSelection,
    pub frequency: Frequency,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub next_run_date: OffsetDateTime,
    pub is_active: bool,
    pub created_by: Uuid,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_run_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Schedule {
    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        self.is_active && self.next_run_date <= now
    }
}

/// Input to schedule creation, already parsed into domain types
#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub name: String,
    pub description: Option<String>,
    pub purpose: String,
    pub amount: Decimal,
    pub credit_selection: CreditSelection,
    pub frequency: Frequency,
    pub start_date: OffsetDateTime,
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Clone, Default)]
pub struct SchedulePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub purpose: Option<String>,
    pub amount: Option<Decimal>,
    pub frequency: Option<Frequency>,
    pub credit_selection: Option<CreditSelection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleFilter {
    pub is_active: Option<bool>,
    pub frequency: Option<Frequency>,
}

impl ScheduleFilter {
    pub fn matches(&self, schedule: &Schedule) -> bool {
        self.is_active.is_none_or(|active| schedule.is_active == active)
            && self.frequency.is_none_or(|f| schedule.frequency == f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionOutcome {
    Success,
    Failure,
}

impl ExecutionOutcome {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// What started an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionTrigger {
    /// The periodic tick
    Scheduled,
    /// A user-triggered "execute now"
    Manual,
}

impl ExecutionTrigger {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }
}

/// One attempted schedule occurrence; immutable once written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub company_id: Uuid,
    pub trigger: ExecutionTrigger,
    pub outcome: ExecutionOutcome,
    #[serde(with = "time::serde::rfc3339")]
    pub run_at: OffsetDateTime,
    pub retirement_ids: Vec<Uuid>,
    pub retired_amount: Option<Decimal>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl Execution {
    pub fn success(
        schedule: &Schedule,
        trigger: ExecutionTrigger,
        run_at: OffsetDateTime,
        retirement_ids: Vec<Uuid>,
        retired_amount: Decimal,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            schedule_id: schedule.id,
            company_id: schedule.company_id,
            trigger,
            outcome: ExecutionOutcome::Success,
            run_at,
            retirement_ids,
            retired_amount: Some(retired_amount),
            error_code: None,
            error_message: None,
        }
    }

    pub fn failure(
        schedule: &Schedule,
        trigger: ExecutionTrigger,
        run_at: OffsetDateTime,
        error: &ApiError,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            schedule_id: schedule.id,
            company_id: schedule.company_id,
            trigger,
            outcome: ExecutionOutcome::Failure,
            run_at,
            retirement_ids: Vec::new(),
            retired_amount: None,
            error_code: Some(error.code().to_string()),
            error_message: Some(error.to_string()),
        }
    }

    /// First retirement created by a successful execution
    pub fn retirement_id(&self) -> Option<Uuid> {
        self.retirement_ids.first().copied()
    }
}

/// POST /retirement-schedules body
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    #[validate(length(min = 1, max = 100))]
    pub purpose: String,

    #[validate(custom(function = "validate_positive_amount"))]
    pub amount: Decimal,

    pub credit_selection: CreditSelectionMode,

    pub credit_id: Option<Uuid>,

    pub frequency: Frequency,

    #[validate(length(min = 1, max = 64))]
    pub start_date: String,
}

impl CreateScheduleRequest {
    pub fn into_new_schedule(self) -> Result<NewSchedule> {
        Ok(NewSchedule {
            credit_selection: CreditSelection::from_parts(self.credit_selection, self.credit_id)?,
            start_date: parse_start_date(&self.start_date)?,
            name: self.name,
            description: self.description,
            purpose: self.purpose,
            amount: self.amount,
            frequency: self.frequency,
        })
    }
}

/// PATCH /retirement-schedules/{id} body
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScheduleRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    #[validate(length(min = 1, max = 100))]
    pub purpose: Option<String>,

    #[validate(custom(function = "validate_positive_amount"))]
    pub amount: Option<Decimal>,

    pub frequency: Option<Frequency>,

    pub credit_selection: Option<CreditSelectionMode>,

    pub credit_id: Option<Uuid>,
}

impl UpdateScheduleRequest {
    pub fn into_patch(self) -> Result<SchedulePatch> {
        let credit_selection = match (self.credit_selection, self.credit_id) {
            (Some(mode), credit_id) => Some(CreditSelection::from_parts(mode, credit_id)?),
            (None, Some(_)) => {
                return Err(ApiError::Validation(
                    "creditId can only be changed together with creditSelection".to_string(),
                ))
            }
            (None, None) => None,
        };

        Ok(SchedulePatch {
            name: self.name,
            description: self.description,
            purpose: self.purpose,
            amount: self.amount,
            frequency: self.frequency,
            credit_selection,
        })
    }
}
