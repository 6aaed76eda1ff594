//! Database service for loan-report-service.

use crate::ingest::{ForeignKey, ReportStore};
use crate::models::{
    summarize_combinations, FlagCount, IngestContext, NewAssumption, NewAssumptionDetail,
    NewFreshLoan, NewLoanAsset, NewLoanBifurcation, NewOdCc, NewOdCcEnhancement,
    NewProjectReport, NewTakeover, NewTermLoan, ProcessingLogEntry, ProcessingStatus,
    ReportCombination, ReportListItem, SourceReportGroup,
};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use serde_json::Value;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{info, instrument};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

fn db_error(context: &str, e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "loan-report-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Pool that connects on first use. Lets the router come up before the
    /// database does.
    pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(2))
            .connect_lazy(database_url)
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Invalid database URL: {}", e)))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Source documents
    // =========================================================================

    /// First source document whose `report_name` matches the regex `pattern`.
    #[instrument(skip(self))]
    pub async fn fetch_source_document(&self, pattern: &str) -> Result<Option<Value>, AppError> {
        regex::Regex::new(pattern).map_err(|e| {
            AppError::BadRequest(anyhow::anyhow!("Invalid report name pattern: {}", e))
        })?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["fetch_source_document"])
            .start_timer();

        let document = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT user_input_data
            FROM test_suite.json_report_test_data_app
            WHERE report_name ~ $1
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(pattern)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch source document", e))?;

        timer.observe_duration();
        Ok(document)
    }

    /// Source documents grouped by the number in `Report_<n>`, highest first.
    #[instrument(skip(self))]
    pub async fn source_report_groups(&self) -> Result<Vec<SourceReportGroup>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["source_report_groups"])
            .start_timer();

        let groups = sqlx::query_as::<_, SourceReportGroup>(
            r#"
            SELECT
                SUBSTRING(report_name FROM 'Report_([0-9]+)') AS sample_report_id,
                COUNT(*) AS report_count
            FROM test_suite.json_report_test_data_app
            WHERE report_name ~ 'Report_[0-9]+'
            GROUP BY SUBSTRING(report_name FROM 'Report_([0-9]+)')
            ORDER BY SUBSTRING(report_name FROM 'Report_([0-9]+)')::BIGINT DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to group source reports", e))?;

        timer.observe_duration();
        Ok(groups)
    }

    /// Distinct source report names, newest-sorting first.
    #[instrument(skip(self))]
    pub async fn list_source_report_names(&self, limit: i64) -> Result<Vec<String>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_source_report_names"])
            .start_timer();

        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT report_name
            FROM test_suite.json_report_test_data_app
            ORDER BY report_name DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list source reports", e))?;

        timer.observe_duration();
        Ok(names)
    }

    // =========================================================================
    // Processing log
    // =========================================================================

    #[instrument(skip(self, error_message))]
    pub async fn log_processing(
        &self,
        report_name: &str,
        status: ProcessingStatus,
        report_id: Option<i64>,
        error_message: Option<&str>,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["log_processing"])
            .start_timer();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO test_suite.report_processing_log
                (original_report_name, inserted_report_id, status, error_message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING id
            "#,
        )
        .bind(report_name)
        .bind(report_id)
        .bind(status.as_str())
        .bind(error_message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to write processing log", e))?;

        timer.observe_duration();
        info!(log_id = id, status = status.as_str(), "Logged report processing");
        Ok(id)
    }

    #[instrument(skip(self))]
    pub async fn report_mappings(&self, limit: i64) -> Result<Vec<ProcessingLogEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["report_mappings"])
            .start_timer();

        let entries = sqlx::query_as::<_, ProcessingLogEntry>(
            r#"
            SELECT id, original_report_name, inserted_report_id, status, error_message, created_at
            FROM test_suite.report_processing_log
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list processing log", e))?;

        timer.observe_duration();
        Ok(entries)
    }

    // =========================================================================
    // Report queries
    // =========================================================================

    #[instrument(skip(self))]
    pub async fn list_reports(&self, limit: i64) -> Result<Vec<ReportListItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_reports"])
            .start_timer();

        let reports = sqlx::query_as::<_, ReportListItem>(
            r#"
            SELECT
                pr.id,
                pr.created_at,
                pr.is_fresh_term_loan,
                pr.is_od_enhancement,
                pr.is_takeover,
                pr.is_od_renewal,
                pr.is_od_fresh,
                b.name AS bank_name,
                ls.name AS loan_scheme_name
            FROM systemisers.project_reports pr
            LEFT JOIN systemisers.banks b ON pr.bank_id = b.id
            LEFT JOIN systemisers.loan_schemes ls ON pr.loan_scheme_id = ls.id
            ORDER BY pr.created_at DESC, pr.id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list reports", e))?;

        timer.observe_duration();
        Ok(reports)
    }

    #[instrument(skip(self))]
    pub async fn report_summary(&self) -> Result<Vec<ReportCombination>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["report_summary"])
            .start_timer();

        let rows = sqlx::query_as::<_, FlagCount>(
            r#"
            SELECT
                is_fresh_term_loan,
                is_od_enhancement,
                is_takeover,
                is_od_renewal,
                is_od_fresh,
                COUNT(*) AS report_count
            FROM systemisers.project_reports
            GROUP BY is_fresh_term_loan, is_od_enhancement, is_takeover, is_od_renewal, is_od_fresh
            ORDER BY report_count DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to summarise reports", e))?;

        timer.observe_duration();
        Ok(summarize_combinations(&rows))
    }

    /// Everything a report holds, without ids or audit columns, so two
    /// reports built from similar documents can be compared field by field.
    #[instrument(skip(self))]
    pub async fn report_snapshot(&self, report_id: i64) -> Result<Option<Value>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["report_snapshot"])
            .start_timer();

        let snapshot = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT json_build_object(
                'report', json_build_object(
                    'is_fresh_term_loan', pr.is_fresh_term_loan,
                    'is_od_enhancement', pr.is_od_enhancement,
                    'is_takeover', pr.is_takeover,
                    'is_od_renewal', pr.is_od_renewal,
                    'is_od_fresh', pr.is_od_fresh,
                    'bank', b.name,
                    'branch', bb.branch,
                    'loan_scheme', ls.name
                ),
                'term_loans', COALESCE((
                    SELECT json_agg(json_build_object(
                        'name', t.name,
                        'bank', tb.name,
                        'loan_amt', t.loan_amt,
                        'emi_start_date', t.emi_start_date,
                        'is_secure', t.is_secure,
                        'emi_amt', t.emi_amt,
                        'num_installments', t.num_installments,
                        'int_rate', t.int_rate,
                        'installment_type', t.installment_type,
                        'loan_type', t.loan_type,
                        'amount_type', t.amount_type,
                        'takeover', tk.name
                    ) ORDER BY t.id)
                    FROM systemisers.project_report_term_loans t
                    LEFT JOIN systemisers.banks tb ON tb.id = t.bank_id
                    LEFT JOIN systemisers.project_report_takeovers tk ON tk.id = t.takeover_id
                    WHERE t.report_id = pr.id
                ), '[]'::json),
                'od_ccs', COALESCE((
                    SELECT json_agg(json_build_object(
                        'name', o.name,
                        'bank', ob.name,
                        'type', o.type,
                        'os_amt', o.os_amt,
                        'amount', o.amount,
                        'int_rate', o.int_rate,
                        'sanction_date', o.sanction_date,
                        'od_limits', o.od_limits_json,
                        'amount_type_os', o.amount_type_os,
                        'amount_type_od_cc', o.amount_type_od_cc,
                        'takeover', tk.name
                    ) ORDER BY o.id)
                    FROM systemisers.project_report_cc_ods o
                    LEFT JOIN systemisers.banks ob ON ob.id = o.bank_id
                    LEFT JOIN systemisers.project_report_takeovers tk ON tk.id = o.takeover_id
                    WHERE o.report_id = pr.id
                ), '[]'::json),
                'takeovers', COALESCE((
                    SELECT json_agg(json_build_object(
                        'name', k.name,
                        'takeover_type', k.takeover_type,
                        'int_rate', k.int_rate,
                        'num_installments', k.num_installments,
                        'is_merged', k.is_merged,
                        'sanction_date', k.sanction_date
                    ) ORDER BY k.id)
                    FROM systemisers.project_report_takeovers k
                    WHERE k.report_id = pr.id
                ), '[]'::json),
                'fresh_loans', COALESCE((
                    SELECT json_agg(json_build_object(
                        'name', n.name,
                        'num_installments', n.num_installments,
                        'int_rate', n.int_rate,
                        'moratorium_period', n.moratorium_period,
                        'sanction_date', n.sanction_date,
                        'assets', COALESCE((
                            SELECT json_agg(json_build_object(
                                'name', a.name,
                                'type_id', a.type_id,
                                'original_value', a.original_value,
                                'margin', a.margin,
                                'promoter_contribution', a.promoter_contribution
                            ) ORDER BY a.id)
                            FROM systemisers.project_report_loan_assets a
                            WHERE a.project_report_new_loan_id = n.id
                        ), '[]'::json)
                    ) ORDER BY n.id)
                    FROM systemisers.project_report_new_loans n
                    WHERE n.report_id = pr.id
                ), '[]'::json),
                'enhancements', COALESCE((
                    SELECT json_agg(json_build_object(
                        'name', e.name,
                        'amount', e.amount,
                        'int_rate', e.int_rate,
                        'od_cc_type', e.od_cc_type,
                        'enhancement_amount', e.enhancement_amount,
                        'sanction_date', e.sanction_date,
                        'amount_type', e.amount_type
                    ) ORDER BY e.id)
                    FROM systemisers.project_report_new_cc_ods e
                    WHERE e.report_id = pr.id
                ), '[]'::json),
                'bifurcations', COALESCE((
                    SELECT json_agg(json_build_object(
                        'financial_year', l.financial_year,
                        'bank_od', l.bank_od,
                        'rel_party_loan', l.rel_party_loan,
                        'other_loan', l.other_loan,
                        'total_loan', l.total_loan,
                        'term_loans', l.term_loans,
                        'business_loans', l.business_loans,
                        'is_current', l.is_current
                    ) ORDER BY l.id)
                    FROM systemisers.project_report_loan_bifurcations l
                    WHERE l.report_id = pr.id
                ), '[]'::json),
                'assumptions', COALESCE((
                    SELECT json_agg(json_build_object(
                        'version', s.version,
                        'profit_margin', s.profit_margin,
                        'profit_margin_hist_pct', s.profit_margin_hist_pct,
                        'profit_margin_type', s.profit_margin_type,
                        'customer_credit_period', s.customer_credit_period,
                        'supplier_credit_period', s.supplier_credit_period,
                        'customer_credit_hist_pct', s.customer_credit_hist_pct,
                        'supplier_credit_hist_pct', s.supplier_credit_hist_pct,
                        'related_party_amount', s.related_party_amount,
                        'other_loan_amount', s.other_loan_amount,
                        'od_amount', s.od_amount,
                        'description', s.description,
                        'is_current', s.is_current,
                        'details', COALESCE((
                            SELECT json_agg(json_build_object(
                                'assumptions_type_id', d.assumptions_type_id,
                                'financial_year', d.financial_year,
                                'value', d.value,
                                'percentage_increase', d.percentage_increase,
                                'year_type', d.year_type
                            ) ORDER BY d.id)
                            FROM systemisers.project_report_assumptions_details d
                            WHERE d.assumption_id = s.id
                        ), '[]'::json)
                    ) ORDER BY s.id)
                    FROM systemisers.project_report_assumptions s
                    WHERE s.report_id = pr.id
                ), '[]'::json)
            )
            FROM systemisers.project_reports pr
            LEFT JOIN systemisers.banks b ON b.id = pr.bank_id
            LEFT JOIN systemisers.bank_branches bb ON bb.id = pr.branch_id
            LEFT JOIN systemisers.loan_schemes ls ON ls.id = pr.loan_scheme_id
            WHERE pr.id = $1
            "#,
        )
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load report snapshot", e))?;

        timer.observe_duration();
        Ok(snapshot)
    }
}

// =============================================================================
// Ingestion writes
// =============================================================================

#[async_trait]
impl ReportStore for Database {
    #[instrument(skip(self))]
    async fn lookup_id(&self, key: ForeignKey, value: &str) -> Result<Option<i64>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["lookup_id"])
            .start_timer();

        // Table and column come from a closed enum.
        let sql = format!(
            "SELECT id FROM systemisers.{} WHERE {} = $1 ORDER BY id LIMIT 1",
            key.table(),
            key.column()
        );
        let id = sqlx::query_scalar::<_, i64>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to resolve foreign key", e))?;

        timer.observe_duration();
        Ok(id)
    }

    async fn insert_project_report(
        &self,
        ctx: &IngestContext,
        report: &NewProjectReport,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_project_report"])
            .start_timer();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO systemisers.project_reports (
                user_id, organization_id, company_id,
                is_fresh_term_loan, is_od_enhancement, is_takeover, is_od_renewal, is_od_fresh,
                bank_id, loan_scheme_id, branch_id,
                created_by, updated_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $1, $1, $12, $12)
            RETURNING id
            "#,
        )
        .bind(ctx.user_id)
        .bind(ctx.organization_id)
        .bind(ctx.company_id)
        .bind(report.flags.is_fresh_term_loan)
        .bind(report.flags.is_od_enhancement)
        .bind(report.flags.is_takeover)
        .bind(report.flags.is_od_renewal)
        .bind(report.flags.is_od_fresh)
        .bind(report.bank_id)
        .bind(report.loan_scheme_id)
        .bind(report.branch_id)
        .bind(ctx.now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert project report", e))?;

        timer.observe_duration();
        Ok(id)
    }

    async fn insert_term_loan(
        &self,
        ctx: &IngestContext,
        loan: &NewTermLoan,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_term_loan"])
            .start_timer();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO systemisers.project_report_term_loans (
                organization_id, company_id, report_id, loan_amt, emi_start_date,
                is_secure, emi_amt, num_installments, int_rate,
                bank_id, installment_type, name, loan_type, amount_type,
                created_by, updated_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15, $16, $16)
            RETURNING id
            "#,
        )
        .bind(ctx.organization_id)
        .bind(ctx.company_id)
        .bind(loan.report_id)
        .bind(loan.loan_amt)
        .bind(loan.emi_start_date)
        .bind(loan.is_secure)
        .bind(loan.emi_amt)
        .bind(loan.num_installments)
        .bind(loan.int_rate)
        .bind(loan.bank_id)
        .bind(loan.installment_type.code())
        .bind(&loan.name)
        .bind(loan.loan_type.code())
        .bind(loan.amount_type.code())
        .bind(ctx.user_id)
        .bind(ctx.now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert term loan", e))?;

        timer.observe_duration();
        Ok(id)
    }

    async fn insert_od_cc(&self, ctx: &IngestContext, od_cc: &NewOdCc) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_od_cc"])
            .start_timer();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO systemisers.project_report_cc_ods (
                organization_id, company_id, report_id,
                os_amt, amount, type,
                bank_id, int_rate, name, sanction_date,
                od_limits_json, takeover_id,
                amount_type_os, amount_type_od_cc,
                created_by, updated_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NULL, $12, $13, $14, $14, $15, $15)
            RETURNING id
            "#,
        )
        .bind(ctx.organization_id)
        .bind(ctx.company_id)
        .bind(od_cc.report_id)
        .bind(od_cc.os_amt)
        .bind(od_cc.amount)
        .bind(&od_cc.facility_type)
        .bind(od_cc.bank_id)
        .bind(od_cc.int_rate)
        .bind(&od_cc.name)
        .bind(od_cc.sanction_date)
        .bind(&od_cc.od_limits)
        .bind(od_cc.amount_type_os.code())
        .bind(od_cc.amount_type_od_cc.code())
        .bind(ctx.user_id)
        .bind(ctx.now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert OD/CC", e))?;

        timer.observe_duration();
        Ok(id)
    }

    async fn insert_takeover(
        &self,
        ctx: &IngestContext,
        takeover: &NewTakeover,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_takeover"])
            .start_timer();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO systemisers.project_report_takeovers (
                report_id, takeover_type, int_rate, num_installments,
                organization_id, company_id, is_merged, sanction_date, name,
                created_by, updated_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10, $11, $11)
            RETURNING id
            "#,
        )
        .bind(takeover.report_id)
        .bind(takeover.takeover_type.code())
        .bind(takeover.int_rate)
        .bind(takeover.num_installments)
        .bind(ctx.organization_id)
        .bind(ctx.company_id)
        .bind(takeover.is_merged)
        .bind(takeover.sanction_date)
        .bind(&takeover.name)
        .bind(ctx.user_id)
        .bind(ctx.now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert takeover", e))?;

        timer.observe_duration();
        Ok(id)
    }

    async fn mark_takeover_merged(&self, takeover_id: i64) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_takeover_merged"])
            .start_timer();

        sqlx::query(
            "UPDATE systemisers.project_report_takeovers SET is_merged = TRUE WHERE id = $1",
        )
        .bind(takeover_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to mark takeover merged", e))?;

        timer.observe_duration();
        Ok(())
    }

    async fn link_term_loan(
        &self,
        ctx: &IngestContext,
        report_id: i64,
        term_loan_id: i64,
        takeover_id: i64,
    ) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["link_term_loan"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE systemisers.project_report_term_loans
            SET takeover_id = $1, updated_at = $2
            WHERE id = $3 AND report_id = $4
            "#,
        )
        .bind(takeover_id)
        .bind(ctx.now)
        .bind(term_loan_id)
        .bind(report_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to link term loan", e))?;

        timer.observe_duration();
        Ok(result.rows_affected())
    }

    async fn link_od_cc(
        &self,
        ctx: &IngestContext,
        report_id: i64,
        od_cc_id: i64,
        takeover_id: i64,
    ) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["link_od_cc"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE systemisers.project_report_cc_ods
            SET takeover_id = $1, updated_at = $2
            WHERE id = $3 AND report_id = $4
            "#,
        )
        .bind(takeover_id)
        .bind(ctx.now)
        .bind(od_cc_id)
        .bind(report_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to link OD/CC", e))?;

        timer.observe_duration();
        Ok(result.rows_affected())
    }

    async fn clear_current_bifurcations(&self, report_id: i64) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["clear_current_bifurcations"])
            .start_timer();

        let result = sqlx::query(
            "UPDATE systemisers.project_report_loan_bifurcations SET is_current = FALSE WHERE report_id = $1",
        )
        .bind(report_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update loan bifurcation status", e))?;

        timer.observe_duration();
        Ok(result.rows_affected())
    }

    async fn insert_fresh_loan(
        &self,
        ctx: &IngestContext,
        loan: &NewFreshLoan,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_fresh_loan"])
            .start_timer();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO systemisers.project_report_new_loans (
                organization_id, company_id, report_id,
                num_installments, int_rate, moratorium_period,
                name, sanction_date,
                created_by, updated_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9, $10, $10)
            RETURNING id
            "#,
        )
        .bind(ctx.organization_id)
        .bind(ctx.company_id)
        .bind(loan.report_id)
        .bind(loan.num_installments)
        .bind(loan.int_rate)
        .bind(loan.moratorium_period)
        .bind(&loan.name)
        .bind(loan.sanction_date)
        .bind(ctx.user_id)
        .bind(ctx.now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert fresh loan", e))?;

        timer.observe_duration();
        Ok(id)
    }

    async fn insert_loan_asset(
        &self,
        ctx: &IngestContext,
        asset: &NewLoanAsset,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_loan_asset"])
            .start_timer();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO systemisers.project_report_loan_assets (
                organization_id, company_id, name, type_id, original_value, margin,
                project_report_new_loan_id, promoter_contribution,
                created_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING id
            "#,
        )
        .bind(ctx.organization_id)
        .bind(ctx.company_id)
        .bind(&asset.name)
        .bind(asset.type_id)
        .bind(asset.original_value)
        .bind(asset.margin)
        .bind(asset.new_loan_id)
        .bind(asset.promoter_contribution)
        .bind(ctx.user_id)
        .bind(ctx.now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert loan asset", e))?;

        timer.observe_duration();
        Ok(id)
    }

    async fn insert_enhancement(
        &self,
        ctx: &IngestContext,
        enhancement: &NewOdCcEnhancement,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_enhancement"])
            .start_timer();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO systemisers.project_report_new_cc_ods (
                amount, int_rate, od_cc_type, enhancement_amount,
                organization_id, company_id, report_id,
                name, sanction_date, amount_type,
                created_by, updated_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11, $12, $12)
            RETURNING id
            "#,
        )
        .bind(enhancement.amount)
        .bind(enhancement.int_rate)
        .bind(crate::models::codes::OD_CC_ENHANCEMENT_TYPE)
        .bind(enhancement.enhancement_amount)
        .bind(ctx.organization_id)
        .bind(ctx.company_id)
        .bind(enhancement.report_id)
        .bind(&enhancement.name)
        .bind(enhancement.sanction_date)
        .bind(enhancement.amount_type.code())
        .bind(ctx.user_id)
        .bind(ctx.now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert OD/CC enhancement", e))?;

        timer.observe_duration();
        Ok(id)
    }

    async fn insert_bifurcation(
        &self,
        ctx: &IngestContext,
        bifurcation: &NewLoanBifurcation,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_bifurcation"])
            .start_timer();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO systemisers.project_report_loan_bifurcations (
                organization_id, company_id, report_id,
                financial_year, bank_od, rel_party_loan, other_loan,
                is_current, total_loan, term_loans, business_loans,
                created_by, updated_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, $8, $9, $10, $11, $11, $12, $12)
            RETURNING id
            "#,
        )
        .bind(ctx.organization_id)
        .bind(ctx.company_id)
        .bind(bifurcation.report_id)
        .bind(&bifurcation.financial_year)
        .bind(bifurcation.bank_od)
        .bind(bifurcation.rel_party_loan)
        .bind(bifurcation.other_loan)
        .bind(bifurcation.total_loan)
        .bind(bifurcation.term_loans)
        .bind(bifurcation.business_loans)
        .bind(ctx.user_id)
        .bind(ctx.now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert loan bifurcation", e))?;

        timer.observe_duration();
        Ok(id)
    }

    async fn insert_assumption(
        &self,
        ctx: &IngestContext,
        assumption: &NewAssumption,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_assumption"])
            .start_timer();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO systemisers.project_report_assumptions (
                organization_id, company_id, report_id,
                profit_margin, profit_margin_hist_pct, profit_margin_type,
                customer_credit_period, supplier_credit_period, version,
                is_current, related_party_amount, other_loan_amount, description,
                customer_credit_hist_pct, supplier_credit_hist_pct, od_amount,
                created_by, updated_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, $10, $11, $12, $13, $14, $15, $16, $16, $17, $17)
            RETURNING id
            "#,
        )
        .bind(ctx.organization_id)
        .bind(ctx.company_id)
        .bind(assumption.report_id)
        .bind(assumption.profit_margin)
        .bind(assumption.profit_margin_hist_pct)
        .bind(&assumption.profit_margin_type)
        .bind(assumption.customer_credit_period)
        .bind(assumption.supplier_credit_period)
        .bind(assumption.version)
        .bind(assumption.related_party_amount)
        .bind(assumption.other_loan_amount)
        .bind(&assumption.description)
        .bind(assumption.customer_credit_hist_pct)
        .bind(assumption.supplier_credit_hist_pct)
        .bind(assumption.od_amount)
        .bind(ctx.user_id)
        .bind(ctx.now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert assumption", e))?;

        timer.observe_duration();
        Ok(id)
    }

    async fn insert_assumption_details(
        &self,
        ctx: &IngestContext,
        assumption_id: i64,
        details: &[NewAssumptionDetail],
    ) -> Result<u64, AppError> {
        if details.is_empty() {
            return Ok(0);
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_assumption_details"])
            .start_timer();

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO systemisers.project_report_assumptions_details (
                assumption_id, assumptions_type_id, financial_year,
                value, percentage_increase, year_type,
                created_by, created_at, updated_at
            ) ",
        );
        builder.push_values(details, |mut row, detail| {
            row.push_bind(assumption_id)
                .push_bind(detail.assumptions_type_id)
                .push_bind(detail.financial_year.clone())
                .push_bind(detail.value)
                .push_bind(detail.percentage_increase)
                .push_bind(detail.year_type.code())
                .push_bind(ctx.user_id)
                .push_bind(ctx.now)
                .push_bind(ctx.now);
        });

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to insert assumption details", e))?;

        timer.observe_duration();
        Ok(result.rows_affected())
    }
}
