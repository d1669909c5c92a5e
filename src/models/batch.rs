use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

use super::common::validate_positive_amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Processing,
    Completed,
    Partial,
    Failed,
}

impl BatchStatus {
    /// Terminal status derived from final counts
    pub fn from_counts(total: u32, failed: u32) -> Self {
        if failed == 0 {
            Self::Completed
        } else if failed == total {
            Self::Failed
        } else {
            Self::Partial
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchItemStatus {
    Pending,
    Completed,
    Failed,
}

impl BatchItemStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// One bulk retirement job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: BatchStatus,
    pub total_items: u32,
    pub completed_items: u32,
    pub failed_items: u32,
    pub created_by: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl Batch {
    pub fn resolved_items(&self) -> u32 {
        self.completed_items + self.failed_items
    }
}

/// Per-item state tracked within a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub position: u32,
    /// Raw credit reference; `None` selects credits automatically
    pub credit_id: Option<String>,
    /// `None` only for rows rejected before an amount could be read
    pub amount: Option<Decimal>,
    pub purpose: String,
    pub status: BatchItemStatus,
    pub retirement_ids: Vec<Uuid>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub processed_at: Option<OffsetDateTime>,
}

/// A retirement line that passed shape validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetirementLine {
    pub credit_id: Option<String>,
    pub amount: Decimal,
    pub purpose: String,
}

/// A line as it enters a batch: ready to retire, or rejected up front
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchLine {
    Ready(RetirementLine),
    Rejected {
        credit_id: Option<String>,
        amount: Option<Decimal>,
        purpose: String,
        reason: String,
    },
}

impl BatchLine {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWithItems {
    #[serde(flatten)]
    pub batch: Batch,
    pub items: Vec<BatchItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFilter {
    pub status: Option<BatchStatus>,
}

impl BatchFilter {
    pub fn matches(&self, batch: &Batch) -> bool {
        self.status.is_none_or(|status| batch.status == status)
    }
}

/// POST /retirement-batches body
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBatchRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    #[validate(length(min = 1), nested)]
    pub items: Vec<BatchItemRequest>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemRequest {
    #[validate(length(max = 255))]
    pub credit_id: Option<String>,

    #[validate(custom(function = "validate_positive_amount"))]
    pub amount: Decimal,

    #[validate(length(min = 1, max = 100))]
    pub purpose: String,
}

impl From<BatchItemRequest> for RetirementLine {
    fn from(item: BatchItemRequest) -> Self {
        RetirementLine {
            credit_id: item.credit_id.filter(|id| !id.trim().is_empty()),
            amount: item.amount,
            purpose: item.purpose,
        }
    }
}
