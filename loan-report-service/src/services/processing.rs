//! Source-report processing: fetch a stored document, ingest it, and record
//! the outcome in the processing log.

use crate::config::IngestionConfig;
use crate::ingest::{insert_report, ReportDocument};
use crate::models::{IngestContext, ProcessingStatus};
use crate::services::batch::{BatchItemResult, BatchRegistry};
use crate::services::database::Database;
use crate::services::metrics::{record_error, record_report_processed};
use service_core::error::AppError;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

/// Upper bound on source names picked up by a process-all run.
pub const PROCESS_ALL_LIMIT: i64 = 50;

/// Owner ids supplied by a caller; missing ones come from configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerOverrides {
    pub user_id: Option<i64>,
    pub organization_id: Option<i64>,
    pub company_id: Option<i64>,
}

#[derive(Clone)]
pub struct ReportProcessor {
    db: Arc<Database>,
    ingestion: IngestionConfig,
}

impl ReportProcessor {
    pub fn new(db: Arc<Database>, ingestion: IngestionConfig) -> Self {
        Self { db, ingestion }
    }

    pub fn context(&self, owner: OwnerOverrides) -> IngestContext {
        IngestContext::new(
            owner.user_id.unwrap_or(self.ingestion.default_user_id),
            owner
                .organization_id
                .unwrap_or(self.ingestion.default_organization_id),
            owner.company_id.unwrap_or(self.ingestion.default_company_id),
        )
    }

    /// Ingests the first source document matching `report_name` and returns
    /// the new report id. Both outcomes are written to the processing log.
    #[instrument(skip(self, owner))]
    pub async fn process_named(
        &self,
        report_name: &str,
        owner: OwnerOverrides,
    ) -> Result<i64, AppError> {
        match self.ingest_named(report_name, owner).await {
            Ok(report_id) => {
                self.log(report_name, ProcessingStatus::Success, Some(report_id), None)
                    .await;
                record_report_processed("success");
                info!(report_id, "Source report processed");
                Ok(report_id)
            }
            Err(e) => {
                let message = failure_message(&e);
                self.log(report_name, ProcessingStatus::Failed, None, Some(&message))
                    .await;
                record_report_processed("failed");
                record_error("report_processing");
                error!(error = %message, "Source report processing failed");
                Err(e)
            }
        }
    }

    async fn ingest_named(&self, report_name: &str, owner: OwnerOverrides) -> Result<i64, AppError> {
        let value = self
            .db
            .fetch_source_document(report_name)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No data found")))?;

        let document = ReportDocument::from_value(value)?;
        let ctx = self.context(owner);
        let report_id = insert_report(self.db.as_ref(), &document, &ctx).await?;
        Ok(report_id)
    }

    async fn log(
        &self,
        report_name: &str,
        status: ProcessingStatus,
        report_id: Option<i64>,
        error_message: Option<&str>,
    ) {
        if let Err(e) = self
            .db
            .log_processing(report_name, status, report_id, error_message)
            .await
        {
            warn!(report_name, error = %e, "Failed to write processing log");
        }
    }

    async fn process_item(&self, report_name: &str) -> BatchItemResult {
        match self
            .process_named(report_name, OwnerOverrides::default())
            .await
        {
            Ok(report_id) => BatchItemResult::success(report_name, report_id),
            Err(e) => BatchItemResult::failed(report_name, failure_message(&e)),
        }
    }

    /// Processes `report_names` one after another, publishing each result to
    /// the registry, then marks the batch completed.
    #[instrument(skip(self, registry, report_names), fields(total = report_names.len()))]
    pub async fn run_batch(
        &self,
        registry: &BatchRegistry,
        batch_id: &str,
        report_names: Vec<String>,
    ) {
        for name in &report_names {
            let result = self.process_item(name).await;
            registry.record_result(batch_id, result);
        }
        registry.complete(batch_id);
    }

    /// Runs [`Self::run_batch`] on a detached task.
    pub fn spawn_batch(
        &self,
        registry: BatchRegistry,
        batch_id: String,
        report_names: Vec<String>,
    ) -> JoinHandle<()> {
        let processor = self.clone();
        tokio::spawn(async move {
            processor
                .run_batch(&registry, &batch_id, report_names)
                .await;
        })
    }

    /// Processes up to [`PROCESS_ALL_LIMIT`] distinct source reports.
    #[instrument(skip(self))]
    pub async fn process_all(&self) -> Result<Vec<BatchItemResult>, AppError> {
        let names = self.db.list_source_report_names(PROCESS_ALL_LIMIT).await?;
        info!(count = names.len(), "Processing all source reports");

        let mut results = Vec::with_capacity(names.len());
        for name in &names {
            results.push(self.process_item(name).await);
        }
        Ok(results)
    }
}

/// Message stored in the processing log and returned in batch results.
pub fn failure_message(err: &AppError) -> String {
    match err {
        AppError::NotFound(e) | AppError::BadRequest(e) => e.to_string(),
        AppError::DatabaseError(e) | AppError::InternalError(e) => format!("{:#}", e),
        other => other.to_string(),
    }
}
