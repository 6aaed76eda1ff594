use serde::{Deserialize, Serialize};
use validator::Validate;

/// Envelope for every successful JSON response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProcessSingleRequest {
    #[validate(length(min = 1, message = "report_name is required"))]
    pub report_name: String,
    pub user_id: Option<i64>,
    pub organization_id: Option<i64>,
    pub company_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ProcessSingleResponse {
    pub report_name: String,
    pub report_id: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProcessBulkRequest {
    #[validate(length(
        min = 1,
        max = 50,
        message = "report_names must contain between 1 and 50 names"
    ))]
    pub report_names: Vec<String>,
}

impl ProcessBulkRequest {
    /// Trimmed names with blanks dropped.
    pub fn cleaned_names(&self) -> Vec<String> {
        self.report_names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct BulkProcessResponse {
    pub batch_id: String,
    pub total_reports: usize,
    pub report_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompareParams {
    pub report_id_1: i64,
    pub report_id_2: i64,
}
