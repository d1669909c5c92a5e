use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::BatchConfig,
    error::{ApiError, Result},
    models::{
        batch::{
            Batch, BatchFilter, BatchItem, BatchItemStatus, BatchLine, BatchStatus, BatchWithItems,
            RetirementLine,
        },
        common::amount_problem,
        credit::Provenance,
    },
    services::{
        csv_decoder,
        execution_runner::{CreditSource, ExecutionRunner, RetirementRequest},
    },
    store::RetirementStore,
};

/// One-shot bulk retirements with per-item outcomes
#[derive(Clone)]
pub struct BatchService {
    store: Arc<dyn RetirementStore>,
    clock: Arc<dyn Clock>,
    runner: Arc<ExecutionRunner>,
    max_items: usize,
}

impl BatchService {
    pub fn new(
        store: Arc<dyn RetirementStore>,
        clock: Arc<dyn Clock>,
        runner: Arc<ExecutionRunner>,
        config: &BatchConfig,
    ) -> Self {
        Self {
            store,
            clock,
            runner,
            max_items: config.max_items,
        }
    }

    /// Create a batch from already structured items and process it to completion
    #[instrument(skip(self, description, items), fields(items = items.len()))]
    pub async fn create_batch(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        name: &str,
        description: Option<String>,
        items: Vec<RetirementLine>,
    ) -> Result<BatchWithItems> {
        self.validate_header(name, items.len())?;
        for (position, item) in items.iter().enumerate() {
            if let Some(reason) = amount_problem(item.amount) {
                return Err(ApiError::Validation(format!(
                    "items[{}]: {}",
                    position, reason
                )));
            }
            if item.purpose.trim().is_empty() {
                return Err(ApiError::Validation(format!(
                    "items[{}]: purpose must not be empty",
                    position
                )));
            }
        }

        let lines = items.into_iter().map(BatchLine::Ready).collect();
        self.process_detached(company_id, user_id, name, description, lines)
            .await
    }

    /// Decode `raw_csv` and process the result as one batch.
    ///
    /// A bad header fails before anything is stored. Rows that fail decoding
    /// become failed items.
    #[instrument(skip(self, description, raw_csv), fields(bytes = raw_csv.len()))]
    pub async fn create_batch_from_csv(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        name: &str,
        description: Option<String>,
        raw_csv: &str,
    ) -> Result<BatchWithItems> {
        let lines = csv_decoder::decode_batch_csv(raw_csv)?;
        self.validate_header(name, lines.len())?;

        let rejected = lines.iter().filter(|l| !l.is_ready()).count();
        if rejected > 0 {
            debug!("{} of {} CSV rows failed decoding", rejected, lines.len());
        }

        self.process_detached(company_id, user_id, name, description, lines)
            .await
    }

    pub async fn list_batches(&self, company_id: Uuid, filter: &BatchFilter) -> Result<Vec<Batch>> {
        Ok(self.store.list_batches(company_id, filter).await?)
    }

    pub async fn get_batch(&self, company_id: Uuid, id: Uuid) -> Result<BatchWithItems> {
        let batch = self
            .store
            .get_batch(id)
            .await?
            .filter(|b| b.company_id == company_id)
            .ok_or_else(|| ApiError::NotFound(format!("Batch {} not found", id)))?;
        let items = self.store.list_batch_items(id).await?;

        Ok(BatchWithItems { batch, items })
    }

    fn validate_header(&self, name: &str, item_count: usize) -> Result<()> {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("name must not be empty".to_string()));
        }
        if item_count == 0 {
            return Err(ApiError::Validation(
                "a batch needs at least one item".to_string(),
            ));
        }
        if item_count > self.max_items {
            return Err(ApiError::Validation(format!(
                "a batch may hold at most {} items, got {}",
                self.max_items, item_count
            )));
        }
        Ok(())
    }

    /// Runs `process` on its own task. Dropping the caller (request timeout,
    /// client disconnect) must not leave a batch half processed.
    async fn process_detached(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        name: &str,
        description: Option<String>,
        lines: Vec<BatchLine>,
    ) -> Result<BatchWithItems> {
        let worker = self.clone();
        let name = name.trim().to_string();
        tokio::spawn(async move {
            worker
                .process(company_id, user_id, name, description, lines)
                .await
        })
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("batch task failed: {}", e)))?
    }

    async fn process(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        name: String,
        description: Option<String>,
        lines: Vec<BatchLine>,
    ) -> Result<BatchWithItems> {
        let now = self.clock.now();
        let mut batch = Batch {
            id: Uuid::now_v7(),
            company_id,
            name,
            description,
            status: BatchStatus::Processing,
            total_items: lines.len() as u32,
            completed_items: 0,
            failed_items: 0,
            created_by: user_id,
            created_at: now,
            completed_at: None,
        };

        let mut items: Vec<BatchItem> = lines
            .iter()
            .enumerate()
            .map(|(position, line)| pending_item(batch.id, position as u32, line))
            .collect();
        self.store.insert_batch(&batch, &items).await?;

        info!(
            "Processing batch {} with {} items for company {}",
            batch.id, batch.total_items, company_id
        );

        // First store write that failed; later items are not attempted
        let mut fatal: Option<ApiError> = None;
        let provenance = Provenance::batch(batch.id, user_id);
        for (item, line) in items.iter_mut().zip(lines) {
            if let Some(cause) = &fatal {
                item.status = BatchItemStatus::Failed;
                item.error_code = Some(cause.code().to_string());
                item.error_message = Some(format!(
                    "not attempted after an earlier write failure: {}",
                    cause
                ));
            } else {
                match line {
                    BatchLine::Ready(line) => {
                        match self.retire(company_id, &line, provenance).await {
                            Ok(retirement_ids) => {
                                item.status = BatchItemStatus::Completed;
                                item.retirement_ids = retirement_ids;
                            }
                            Err(e) => {
                                debug!("Batch {} item {} failed: {}", batch.id, item.position, e);
                                item.status = BatchItemStatus::Failed;
                                item.error_code = Some(e.code().to_string());
                                item.error_message = Some(e.to_string());
                            }
                        }
                    }
                    BatchLine::Rejected { reason, .. } => {
                        let code = ApiError::Validation(reason.clone()).code();
                        item.status = BatchItemStatus::Failed;
                        item.error_code = Some(code.to_string());
                        item.error_message = Some(reason);
                    }
                }
            }
            item.processed_at = Some(self.clock.now());

            if let Err(e) = self.store.record_batch_item(item).await {
                error!(
                    "Batch {} item {}: recording outcome failed: {}",
                    batch.id, item.position, e
                );
                fatal.get_or_insert(e.into());
            }
        }

        // Final counters come from the outcomes held here, so they add up to
        // the total even when a counter write was lost
        let completed = items
            .iter()
            .filter(|i| i.status == BatchItemStatus::Completed)
            .count() as u32;
        batch.completed_items = completed;
        batch.failed_items = batch.total_items - completed;
        batch.status = BatchStatus::from_counts(batch.total_items, batch.failed_items);
        batch.completed_at = Some(self.clock.now());

        let batch = match self.store.finish_batch(&batch).await {
            Ok(stored) => stored,
            Err(e) => {
                error!("Batch {} could not be finished: {}", batch.id, e);
                return Err(fatal.unwrap_or_else(|| e.into()));
            }
        };

        if let Some(cause) = fatal {
            warn!(
                "Batch {} finished {} after a write failure: {} completed, {} failed",
                batch.id,
                batch.status.as_str(),
                batch.completed_items,
                batch.failed_items
            );
            return Err(cause);
        }

        if batch.failed_items > 0 {
            warn!(
                "Batch {} finished {}: {} completed, {} failed",
                batch.id,
                batch.status.as_str(),
                batch.completed_items,
                batch.failed_items
            );
        } else {
            info!(
                "Batch {} completed: {} items retired",
                batch.id, batch.completed_items
            );
        }

        Ok(BatchWithItems { batch, items })
    }

    async fn retire(
        &self,
        company_id: Uuid,
        line: &RetirementLine,
        provenance: Provenance,
    ) -> Result<Vec<Uuid>> {
        let source = match &line.credit_id {
            None => CreditSource::Automatic,
            Some(raw) => Uuid::parse_str(raw.trim())
                .map(CreditSource::Fixed)
                .map_err(|_| ApiError::CreditNotFound(format!("credit {} does not exist", raw)))?,
        };

        let request = RetirementRequest {
            company_id,
            purpose: line.purpose.trim().to_string(),
            amount: line.amount,
            source,
            provenance,
        };
        let outcome = self.runner.run(&request).await?;
        Ok(outcome.retirement_ids())
    }
}

fn pending_item(batch_id: Uuid, position: u32, line: &BatchLine) -> BatchItem {
    let (credit_id, amount, purpose) = match line {
        BatchLine::Ready(line) => (line.credit_id.clone(), Some(line.amount), line.purpose.clone()),
        BatchLine::Rejected {
            credit_id,
            amount,
            purpose,
            ..
        } => (credit_id.clone(), *amount, purpose.clone()),
    };

    BatchItem {
        id: Uuid::now_v7(),
        batch_id,
        position,
        credit_id,
        amount,
        purpose,
        status: BatchItemStatus::Pending,
        retirement_ids: Vec::new(),
        error_code: None,
        error_message: None,
        processed_at: None,
    }
}
