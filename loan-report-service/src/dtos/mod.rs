pub mod downloads;
pub mod reports;

pub use downloads::{BulkDownloadRequest, BulkDownloadResponse, DownloadFailure, DownloadReportRequest};
pub use reports::{
    ApiResponse, BulkProcessResponse, CompareParams, ProcessBulkRequest, ProcessSingleRequest,
    ProcessSingleResponse,
};
