use crate::dtos::{
    ApiResponse, BulkDownloadRequest, BulkDownloadResponse, DownloadFailure,
    DownloadReportRequest,
};
use crate::services::downloader::ReportDownloader;
use crate::startup::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

/// Downloads one generated report and returns it as a PDF attachment.
pub async fn download_report(
    State(state): State<AppState>,
    Json(req): Json<DownloadReportRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let credentials = state.downloader.credentials(req.email, req.password);
    let path = state.downloader.download(req.report_id, &credentials).await?;
    let bytes = tokio::fs::read(&path).await?;

    tracing::info!(
        report_id = req.report_id,
        size = bytes.len(),
        "Serving downloaded report"
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename=\"{}\"",
                    ReportDownloader::file_name(req.report_id)
                ),
            ),
        ],
        bytes,
    ))
}

/// Downloads each report in turn. Fails with 502 only when none succeeded.
pub async fn download_bulk_reports(
    State(state): State<AppState>,
    Json(req): Json<BulkDownloadRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let credentials = state.downloader.credentials(req.email, req.password);
    let mut manifest = BulkDownloadResponse {
        output_dir: state.downloader.output_dir().display().to_string(),
        ..Default::default()
    };

    for report_id in req.report_ids {
        match state.downloader.download(report_id, &credentials).await {
            Ok(path) => manifest.downloaded.push(
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| ReportDownloader::file_name(report_id)),
            ),
            Err(e) => {
                tracing::warn!(report_id, error = %e, "Bulk download entry failed");
                manifest.failed.push(DownloadFailure {
                    report_id,
                    error: e.to_string(),
                });
            }
        }
    }

    if manifest.downloaded.is_empty() {
        return Err(AppError::BadGateway(
            "No reports could be downloaded".to_string(),
        ));
    }

    Ok(Json(ApiResponse::success(
        format!("Downloaded {} reports", manifest.downloaded.len()),
        manifest,
    )))
}
