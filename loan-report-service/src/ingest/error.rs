use service_core::error::AppError;
use thiserror::Error;

use super::resolver::ResolveError;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Document is missing required section '{0}'")]
    MissingSection(&'static str),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Store error: {0}")]
    Store(#[from] AppError),
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::MissingSection(_) | IngestError::InvalidDocument(_) => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            IngestError::Resolve(e) => e.into(),
            IngestError::Store(e) => e,
        }
    }
}
