//! Name → surrogate id resolution for the lookup tables.

use service_core::error::AppError;
use thiserror::Error;
use tracing::{debug, instrument};

use super::store::ReportStore;

/// The lookup columns a name may be resolved against. Table and column names
/// only ever come from here, never from caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForeignKey {
    Bank,
    BankBranch,
    LoanScheme,
    Nbfc,
}

impl ForeignKey {
    pub fn table(self) -> &'static str {
        match self {
            Self::Bank => "banks",
            Self::BankBranch => "bank_branches",
            Self::LoanScheme => "loan_schemes",
            Self::Nbfc => "nbfc_info",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::Bank | Self::LoanScheme => "name",
            Self::BankBranch => "branch",
            Self::Nbfc => "nbfc_name",
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Empty value for systemisers.{}.{}", .0.table(), .0.column())]
    EmptyValue(ForeignKey),

    #[error("No record found in systemisers.{}.{} for '{value}'", .key.table(), .key.column())]
    NotFound { key: ForeignKey, value: String },

    #[error("Lookup in systemisers.{} failed: {source}", .key.table())]
    Store {
        key: ForeignKey,
        #[source]
        source: AppError,
    },
}

impl From<ResolveError> for AppError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Store { source, .. } => source,
            other => AppError::BadRequest(anyhow::anyhow!(other.to_string())),
        }
    }
}

/// Resolves `value` against `key`. Empty values and unknown names are errors.
#[instrument(skip(store))]
pub async fn resolve_foreign_key<S: ReportStore + ?Sized>(
    store: &S,
    key: ForeignKey,
    value: &str,
) -> Result<i64, ResolveError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ResolveError::EmptyValue(key));
    }

    match store.lookup_id(key, value).await {
        Ok(Some(id)) => {
            debug!(id, "Foreign key resolved");
            Ok(id)
        }
        Ok(None) => Err(ResolveError::NotFound {
            key,
            value: value.to_string(),
        }),
        Err(source) => Err(ResolveError::Store { key, source }),
    }
}

/// Lender lookup: NBFC lenders live in their own table.
pub async fn resolve_bank<S: ReportStore + ?Sized>(
    store: &S,
    name: &str,
    bank_type: Option<&str>,
) -> Result<i64, ResolveError> {
    let key = match bank_type {
        Some(t) if t.trim().eq_ignore_ascii_case("nbfc") => ForeignKey::Nbfc,
        _ => ForeignKey::Bank,
    };
    resolve_foreign_key(store, key, name).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::store::memory::MemoryStore;

    #[tokio::test]
    async fn resolves_known_names() {
        let store = MemoryStore::new().with_lookup(ForeignKey::Bank, "State Bank", 7);
        assert_eq!(
            resolve_foreign_key(&store, ForeignKey::Bank, "State Bank")
                .await
                .unwrap(),
            7
        );
    }

    #[tokio::test]
    async fn empty_value_is_an_error() {
        let store = MemoryStore::new();
        let err = resolve_foreign_key(&store, ForeignKey::LoanScheme, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::EmptyValue(ForeignKey::LoanScheme)));
    }

    #[tokio::test]
    async fn unknown_name_is_not_found() {
        let store = MemoryStore::new();
        let err = resolve_foreign_key(&store, ForeignKey::BankBranch, "Nowhere")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "No record found in systemisers.bank_branches.branch for 'Nowhere'"
        );
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let store = MemoryStore::new().failing_on("lookup_id");
        let err = resolve_foreign_key(&store, ForeignKey::Bank, "Any")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Store { .. }));
        assert!(matches!(AppError::from(err), AppError::DatabaseError(_)));
    }

    #[tokio::test]
    async fn nbfc_lenders_use_nbfc_table() {
        let store = MemoryStore::new()
            .with_lookup(ForeignKey::Nbfc, "Bajaj Finance", 3)
            .with_lookup(ForeignKey::Bank, "Bajaj Finance", 99);
        assert_eq!(
            resolve_bank(&store, "Bajaj Finance", Some("NBFC")).await.unwrap(),
            3
        );
        assert_eq!(resolve_bank(&store, "Bajaj Finance", None).await.unwrap(), 99);
    }
}
