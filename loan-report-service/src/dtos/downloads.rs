use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct DownloadReportRequest {
    #[validate(range(min = 1, message = "report_id must be positive"))]
    pub report_id: i64,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkDownloadRequest {
    #[validate(length(
        min = 1,
        max = 50,
        message = "report_ids must contain between 1 and 50 ids"
    ))]
    pub report_ids: Vec<i64>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadFailure {
    pub report_id: i64,
    pub error: String,
}

/// Files written to the output directory, and the ids that could not be fetched.
#[derive(Debug, Default, Serialize)]
pub struct BulkDownloadResponse {
    pub output_dir: String,
    pub downloaded: Vec<String>,
    pub failed: Vec<DownloadFailure>,
}
