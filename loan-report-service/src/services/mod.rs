pub mod batch;
pub mod comparison;
pub mod database;
pub mod downloader;
pub mod metrics;
pub mod processing;

pub use batch::{BatchItemResult, BatchRegistry, BatchState, BatchStatus};
pub use comparison::{compare_reports, diff_values, DiffEntry};
pub use database::Database;
pub use downloader::{Credentials, DownloadError, ReportDownloader};
pub use processing::{OwnerOverrides, ReportProcessor};
