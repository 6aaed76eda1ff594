//! Loan-report document ingestion.

pub mod document;
pub mod error;
pub mod mapper;
pub mod matcher;
pub mod resolver;
pub mod store;

pub use document::ReportDocument;
pub use error::IngestError;
pub use mapper::{insert_report, IngestOutcome, IngestSummary, ReportMapper};
pub use matcher::{find_matching_loans, InsertedLoan, DEFAULT_TOLERANCE};
pub use resolver::{resolve_bank, resolve_foreign_key, ForeignKey, ResolveError};
pub use store::ReportStore;
