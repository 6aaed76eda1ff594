//! Domain models for loan-report-service.

pub mod codes;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

pub use codes::{AmountType, InstallmentType, LoanType, TakeoverType, YearType};

// ============================================================================
// Ingestion context
// ============================================================================

/// Owner ids and the single timestamp shared by every row of one document.
#[derive(Debug, Clone)]
pub struct IngestContext {
    pub user_id: i64,
    pub organization_id: i64,
    pub company_id: i64,
    pub now: DateTime<Utc>,
}

impl IngestContext {
    pub fn new(user_id: i64, organization_id: i64, company_id: i64) -> Self {
        Self {
            user_id,
            organization_id,
            company_id,
            now: Utc::now(),
        }
    }
}

// ============================================================================
// Project report
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct ReportFlags {
    pub is_fresh_term_loan: bool,
    pub is_od_enhancement: bool,
    pub is_takeover: bool,
    pub is_od_renewal: bool,
    pub is_od_fresh: bool,
}

impl ReportFlags {
    /// Summary bucket for a report. Earlier rules win.
    pub fn combination(&self) -> &'static str {
        let fresh = self.is_fresh_term_loan;
        let enhancement = self.is_od_enhancement;
        let takeover = self.is_takeover;

        if fresh && enhancement && takeover {
            "Fresh + OD Enhancement + Takeover"
        } else if fresh && enhancement {
            "Fresh + OD Enhancement"
        } else if fresh && takeover {
            "Fresh + Takeover"
        } else if enhancement && takeover {
            "OD Enhancement + Takeover"
        } else if fresh {
            "Fresh Term Loan"
        } else if enhancement {
            "OD Enhancement"
        } else if takeover {
            "Takeover"
        } else if self.is_od_renewal {
            "OD Renewal"
        } else if self.is_od_fresh {
            "Fresh OD"
        } else {
            "Other"
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewProjectReport {
    pub flags: ReportFlags,
    pub bank_id: i64,
    pub branch_id: i64,
    pub loan_scheme_id: i64,
}

// ============================================================================
// Existing loans
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewTermLoan {
    pub report_id: i64,
    pub bank_id: i64,
    pub name: Option<String>,
    pub loan_amt: Decimal,
    pub emi_start_date: Option<NaiveDate>,
    pub is_secure: bool,
    pub emi_amt: Option<Decimal>,
    pub num_installments: Option<i32>,
    pub int_rate: Option<Decimal>,
    pub loan_type: LoanType,
    pub installment_type: InstallmentType,
    pub amount_type: AmountType,
}

#[derive(Debug, Clone)]
pub struct NewOdCc {
    pub report_id: i64,
    pub bank_id: i64,
    pub name: Option<String>,
    pub facility_type: Option<String>,
    pub os_amt: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub int_rate: Option<Decimal>,
    pub sanction_date: Option<NaiveDate>,
    /// `{"<year>": limit}`
    pub od_limits: serde_json::Value,
    pub amount_type_os: AmountType,
    pub amount_type_od_cc: AmountType,
}

#[derive(Debug, Clone)]
pub struct NewTakeover {
    pub report_id: i64,
    pub takeover_type: TakeoverType,
    pub name: Option<String>,
    pub int_rate: Option<Decimal>,
    pub num_installments: Option<i32>,
    pub is_merged: bool,
    pub sanction_date: Option<NaiveDate>,
}

// ============================================================================
// Proposed loans
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewFreshLoan {
    pub report_id: i64,
    pub name: Option<String>,
    pub num_installments: Option<i32>,
    pub int_rate: Decimal,
    pub moratorium_period: Option<i32>,
    pub sanction_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct NewLoanAsset {
    pub new_loan_id: i64,
    pub name: Option<String>,
    pub type_id: i32,
    pub original_value: Decimal,
    pub margin: Decimal,
    pub promoter_contribution: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewOdCcEnhancement {
    pub report_id: i64,
    pub name: String,
    pub amount: Decimal,
    pub int_rate: Decimal,
    pub enhancement_amount: Decimal,
    pub sanction_date: Option<NaiveDate>,
    pub amount_type: AmountType,
}

// ============================================================================
// Bifurcations and assumptions
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewLoanBifurcation {
    pub report_id: i64,
    pub financial_year: Option<String>,
    pub bank_od: Option<Decimal>,
    pub rel_party_loan: Option<Decimal>,
    pub other_loan: Option<Decimal>,
    pub total_loan: Option<Decimal>,
    pub term_loans: Option<Decimal>,
    pub business_loans: Option<Decimal>,
}

#[derive(Debug, Clone, Default)]
pub struct NewAssumption {
    pub report_id: i64,
    pub version: i32,
    pub profit_margin: Option<Decimal>,
    pub profit_margin_hist_pct: Option<Decimal>,
    pub profit_margin_type: Option<String>,
    pub customer_credit_period: Option<Decimal>,
    pub supplier_credit_period: Option<Decimal>,
    pub customer_credit_hist_pct: Option<Decimal>,
    pub supplier_credit_hist_pct: Option<Decimal>,
    pub related_party_amount: Option<Decimal>,
    pub other_loan_amount: Option<Decimal>,
    pub od_amount: Option<Decimal>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAssumptionDetail {
    pub assumptions_type_id: Option<i32>,
    pub financial_year: Option<String>,
    pub value: Option<Decimal>,
    pub percentage_increase: Option<Decimal>,
    pub year_type: YearType,
}

// ============================================================================
// Read models
// ============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReportListItem {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub flags: ReportFlags,
    pub bank_name: Option<String>,
    pub loan_scheme_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportCombination {
    pub report_combination: String,
    pub report_count: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct FlagCount {
    #[sqlx(flatten)]
    pub flags: ReportFlags,
    pub report_count: i64,
}

/// Folds per-flag-set counts into combination buckets, largest first.
/// Ties keep the order in which buckets were first seen.
pub fn summarize_combinations(rows: &[FlagCount]) -> Vec<ReportCombination> {
    let mut buckets: Vec<ReportCombination> = Vec::new();
    for row in rows {
        let label = row.flags.combination();
        match buckets.iter_mut().find(|b| b.report_combination == label) {
            Some(bucket) => bucket.report_count += row.report_count,
            None => buckets.push(ReportCombination {
                report_combination: label.to_string(),
                report_count: row.report_count,
            }),
        }
    }
    buckets.sort_by(|a, b| b.report_count.cmp(&a.report_count));
    buckets
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Success,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProcessingLogEntry {
    pub id: i64,
    pub original_report_name: String,
    pub inserted_report_id: Option<i64>,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SourceReportGroup {
    pub sample_report_id: String,
    pub report_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(fresh: bool, enhancement: bool, takeover: bool) -> ReportFlags {
        ReportFlags {
            is_fresh_term_loan: fresh,
            is_od_enhancement: enhancement,
            is_takeover: takeover,
            ..Default::default()
        }
    }

    #[test]
    fn combination_labels_follow_precedence() {
        assert_eq!(
            flags(true, true, true).combination(),
            "Fresh + OD Enhancement + Takeover"
        );
        assert_eq!(flags(true, false, true).combination(), "Fresh + Takeover");
        assert_eq!(
            flags(false, true, true).combination(),
            "OD Enhancement + Takeover"
        );
        assert_eq!(flags(false, false, true).combination(), "Takeover");

        let renewal = ReportFlags {
            is_od_renewal: true,
            is_od_fresh: true,
            ..Default::default()
        };
        assert_eq!(renewal.combination(), "OD Renewal");
        assert_eq!(ReportFlags::default().combination(), "Other");
    }

    #[test]
    fn summary_merges_flag_sets_into_buckets() {
        let rows = vec![
            FlagCount {
                flags: flags(false, false, true),
                report_count: 2,
            },
            FlagCount {
                flags: ReportFlags {
                    is_takeover: true,
                    is_od_renewal: true,
                    ..Default::default()
                },
                report_count: 3,
            },
            FlagCount {
                flags: flags(true, false, false),
                report_count: 4,
            },
        ];

        let summary = summarize_combinations(&rows);
        assert_eq!(
            summary,
            vec![
                ReportCombination {
                    report_combination: "Takeover".to_string(),
                    report_count: 5,
                },
                ReportCombination {
                    report_combination: "Fresh Term Loan".to_string(),
                    report_count: 4,
                },
            ]
        );
    }
}
