//! Persistence seam for the ingestion mapper.
//!
//! `services::Database` is the Postgres implementation; unit tests use the
//! in-memory store below.

use async_trait::async_trait;
use service_core::error::AppError;

use super::resolver::ForeignKey;
use crate::models::{
    IngestContext, NewAssumption, NewAssumptionDetail, NewFreshLoan, NewLoanAsset,
    NewLoanBifurcation, NewOdCc, NewOdCcEnhancement, NewProjectReport, NewTakeover, NewTermLoan,
};

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Exact-match lookup of a surrogate id by its human-readable name.
    async fn lookup_id(&self, key: ForeignKey, value: &str) -> Result<Option<i64>, AppError>;

    async fn insert_project_report(
        &self,
        ctx: &IngestContext,
        report: &NewProjectReport,
    ) -> Result<i64, AppError>;

    async fn insert_term_loan(&self, ctx: &IngestContext, loan: &NewTermLoan)
        -> Result<i64, AppError>;

    async fn insert_od_cc(&self, ctx: &IngestContext, od_cc: &NewOdCc) -> Result<i64, AppError>;

    async fn insert_takeover(
        &self,
        ctx: &IngestContext,
        takeover: &NewTakeover,
    ) -> Result<i64, AppError>;

    async fn mark_takeover_merged(&self, takeover_id: i64) -> Result<(), AppError>;

    /// Returns the number of rows updated. Only loans of `report_id` are
    /// touched.
    async fn link_term_loan(
        &self,
        ctx: &IngestContext,
        report_id: i64,
        term_loan_id: i64,
        takeover_id: i64,
    ) -> Result<u64, AppError>;

    /// Returns the number of rows updated. Only facilities of `report_id`
    /// are touched.
    async fn link_od_cc(
        &self,
        ctx: &IngestContext,
        report_id: i64,
        od_cc_id: i64,
        takeover_id: i64,
    ) -> Result<u64, AppError>;

    async fn clear_current_bifurcations(&self, report_id: i64) -> Result<u64, AppError>;

    async fn insert_fresh_loan(
        &self,
        ctx: &IngestContext,
        loan: &NewFreshLoan,
    ) -> Result<i64, AppError>;

    async fn insert_loan_asset(
        &self,
        ctx: &IngestContext,
        asset: &NewLoanAsset,
    ) -> Result<i64, AppError>;

    async fn insert_enhancement(
        &self,
        ctx: &IngestContext,
        enhancement: &NewOdCcEnhancement,
    ) -> Result<i64, AppError>;

    async fn insert_bifurcation(
        &self,
        ctx: &IngestContext,
        bifurcation: &NewLoanBifurcation,
    ) -> Result<i64, AppError>;

    async fn insert_assumption(
        &self,
        ctx: &IngestContext,
        assumption: &NewAssumption,
    ) -> Result<i64, AppError>;

    /// Inserts all detail rows in one statement.
    async fn insert_assumption_details(
        &self,
        ctx: &IngestContext,
        assumption_id: i64,
        details: &[NewAssumptionDetail],
    ) -> Result<u64, AppError>;
}
