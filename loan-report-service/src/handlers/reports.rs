use crate::dtos::{
    ApiResponse, BulkProcessResponse, CompareParams, ProcessBulkRequest, ProcessSingleRequest,
    ProcessSingleResponse,
};
use crate::services::batch::ItemStatus;
use crate::services::comparison::compare_reports as diff_reports;
use crate::services::processing::OwnerOverrides;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use service_core::error::AppError;
use validator::Validate;

const REPORT_LIST_LIMIT: i64 = 50;
const MAPPING_LIST_LIMIT: i64 = 100;

pub async fn source_report_groups(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let groups = state.db.source_report_groups().await?;
    Ok(Json(ApiResponse::success(
        "Source report groups retrieved successfully",
        groups,
    )))
}

pub async fn process_single_report(
    State(state): State<AppState>,
    Json(req): Json<ProcessSingleRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let report_name = req.report_name.trim().to_string();
    if report_name.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("report_name is required")));
    }

    let owner = OwnerOverrides {
        user_id: req.user_id,
        organization_id: req.organization_id,
        company_id: req.company_id,
    };
    let report_id = state.processor.process_named(&report_name, owner).await?;

    Ok(Json(ApiResponse::success(
        "Report processed successfully",
        ProcessSingleResponse {
            report_name,
            report_id,
        },
    )))
}

pub async fn process_bulk_reports(
    State(state): State<AppState>,
    Json(req): Json<ProcessBulkRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let report_names = req.cleaned_names();
    if report_names.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "report_names must contain at least one non-empty name"
        )));
    }
    if report_names.len() > state.config.bulk.max_batch_size {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "At most {} reports can be processed in one batch",
            state.config.bulk.max_batch_size
        )));
    }

    let batch_id = state.registry.create(report_names.len());
    state
        .processor
        .spawn_batch(state.registry.clone(), batch_id.clone(), report_names.clone());

    tracing::info!(batch_id = %batch_id, total = report_names.len(), "Bulk processing started");

    Ok(Json(ApiResponse::success(
        "Bulk processing started",
        BulkProcessResponse {
            batch_id,
            total_reports: report_names.len(),
            report_names,
        },
    )))
}

pub async fn bulk_status(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let status = state
        .registry
        .get(&batch_id)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Batch ID not found")))?;
    Ok(Json(ApiResponse::success("Batch status retrieved", status)))
}

pub async fn process_all_reports(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let results = state.processor.process_all().await?;
    let successful = results
        .iter()
        .filter(|r| r.status == ItemStatus::Success)
        .count();

    Ok(Json(ApiResponse::success(
        format!("Processed {} reports", results.len()),
        json!({
            "total": results.len(),
            "successful": successful,
            "failed": results.len() - successful,
            "results": results,
        }),
    )))
}

pub async fn report_mappings(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let mappings = state.db.report_mappings(MAPPING_LIST_LIMIT).await?;
    Ok(Json(ApiResponse::success(
        "Report mappings retrieved successfully",
        mappings,
    )))
}

pub async fn list_reports(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let reports = state.db.list_reports(REPORT_LIST_LIMIT).await?;
    Ok(Json(ApiResponse::success(
        "Reports retrieved successfully",
        reports,
    )))
}

pub async fn report_summary(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let summary = state.db.report_summary().await?;
    Ok(Json(ApiResponse::success(
        "Report summary retrieved successfully",
        summary,
    )))
}

pub async fn compare_reports(
    State(state): State<AppState>,
    Query(params): Query<CompareParams>,
) -> Result<impl IntoResponse, AppError> {
    let diffs = diff_reports(&state.db, params.report_id_1, params.report_id_2).await?;
    Ok(Json(ApiResponse::success(
        format!("Found {} differences", diffs.len()),
        diffs,
    )))
}
