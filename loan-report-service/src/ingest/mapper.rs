//! Document → relational rows.
//!
//! Only the report header is mandatory. Every child entry is inserted on its
//! own: a malformed entry, an unknown bank or a failed statement is logged and
//! skipped, and the rest of the document still lands.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use super::document::{
    parse_date, parse_entry, AssetEntry, AssumptionDetailEntry, AssumptionEntry,
    BifurcationEntry, EnhancementEntry, FreshLoanEntry, LegacyTakeoverEntry, OdCcEntry,
    RepaymentTakeoverEntry, ReportDocument, TermLoanEntry,
};
use super::error::IngestError;
use super::matcher::{find_loan_by_name, find_matching_loans, InsertedLoan, DEFAULT_TOLERANCE};
use super::resolver::{resolve_bank, resolve_foreign_key, ForeignKey, ResolveError};
use super::store::ReportStore;
use crate::models::codes::{itr_version_code, OD_CC_ENHANCEMENT_TYPE};
use crate::models::{
    AmountType, IngestContext, InstallmentType, LoanType, NewAssumption, NewAssumptionDetail,
    NewFreshLoan, NewLoanAsset, NewLoanBifurcation, NewOdCc, NewOdCcEnhancement,
    NewProjectReport, NewTakeover, NewTermLoan, ReportFlags, TakeoverType, YearType,
};
use crate::services::metrics::record_ingest_entry;
use service_core::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    TermLoan,
    OdCc,
    RepaymentTakeover,
    LegacyTakeover,
    FreshLoan,
    LoanAsset,
    Enhancement,
    Bifurcation,
    Assumption,
    AssumptionDetail,
}

impl Step {
    fn as_str(self) -> &'static str {
        match self {
            Self::TermLoan => "term_loan",
            Self::OdCc => "od_cc",
            Self::RepaymentTakeover => "repayment_takeover",
            Self::LegacyTakeover => "legacy_takeover",
            Self::FreshLoan => "fresh_loan",
            Self::LoanAsset => "loan_asset",
            Self::Enhancement => "enhancement",
            Self::Bifurcation => "bifurcation",
            Self::Assumption => "assumption",
            Self::AssumptionDetail => "assumption_detail",
        }
    }
}

/// Why an entry was not written.
#[derive(Debug)]
enum Skip {
    /// The entry is incomplete or references an unknown name.
    Invalid(String),
    /// The store rejected a write.
    Failed(AppError),
}

impl Skip {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }
}

impl From<serde_json::Error> for Skip {
    fn from(err: serde_json::Error) -> Self {
        Self::Invalid(format!("malformed entry: {}", err))
    }
}

impl From<AppError> for Skip {
    fn from(err: AppError) -> Self {
        Self::Failed(err)
    }
}

impl From<ResolveError> for Skip {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Store { source, .. } => Self::Failed(source),
            other => Self::Invalid(other.to_string()),
        }
    }
}

/// Row counts for one ingested document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub term_loans: usize,
    pub od_ccs: usize,
    pub takeovers: usize,
    pub linked_loans: usize,
    pub fresh_loans: usize,
    pub loan_assets: usize,
    pub enhancements: usize,
    pub bifurcations: usize,
    pub assumption_details: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub report_id: i64,
    pub summary: IngestSummary,
}

/// Inserts one document and returns the new report id.
pub async fn insert_report<S: ReportStore + ?Sized>(
    store: &S,
    document: &ReportDocument,
    ctx: &IngestContext,
) -> Result<i64, IngestError> {
    ReportMapper::new(store, ctx)
        .run(document)
        .await
        .map(|outcome| outcome.report_id)
}

pub struct ReportMapper<'a, S: ReportStore + ?Sized> {
    store: &'a S,
    ctx: &'a IngestContext,
    term_loans: Vec<InsertedLoan>,
    od_ccs: Vec<InsertedLoan>,
    summary: IngestSummary,
}

impl<'a, S: ReportStore + ?Sized> ReportMapper<'a, S> {
    pub fn new(store: &'a S, ctx: &'a IngestContext) -> Self {
        Self {
            store,
            ctx,
            term_loans: Vec::new(),
            od_ccs: Vec::new(),
            summary: IngestSummary::default(),
        }
    }

    #[instrument(skip_all, fields(user_id = self.ctx.user_id, organization_id = self.ctx.organization_id))]
    pub async fn run(mut self, document: &ReportDocument) -> Result<IngestOutcome, IngestError> {
        let report_id = self.insert_header(document).await?;

        for entry in document.existing_term_loans() {
            let result = self.insert_term_loan(report_id, &entry).await;
            self.record(Step::TermLoan, result);
        }

        for entry in document.existing_od_cc() {
            let result = self.insert_od_cc(report_id, &entry).await;
            self.record(Step::OdCc, result);
        }

        for entry in document.repayment_takeovers() {
            let result = self.insert_repayment_takeover(report_id, &entry).await;
            self.record(Step::RepaymentTakeover, result);
        }

        for entry in document.legacy_term_loan_takeovers() {
            let result = self
                .insert_legacy_takeover(report_id, &entry, TakeoverType::TermLoan)
                .await;
            self.record(Step::LegacyTakeover, result);
        }

        for entry in document.legacy_od_cc_takeovers() {
            let result = self
                .insert_legacy_takeover(report_id, &entry, TakeoverType::OdCc)
                .await;
            self.record(Step::LegacyTakeover, result);
        }

        for entry in document.fresh_term_loans() {
            let result = self.insert_fresh_loan(report_id, &entry).await;
            self.record(Step::FreshLoan, result);
        }

        for entry in document.od_cc_enhancements() {
            let result = self.insert_enhancement(report_id, &entry).await;
            self.record(Step::Enhancement, result);
        }

        for entry in document.loan_bifurcations() {
            let result = self.insert_bifurcation(report_id, &entry).await;
            self.record(Step::Bifurcation, result);
        }

        let assumption = document.assumption();
        let result = self.insert_assumption(report_id, &assumption).await;
        self.record(Step::Assumption, result);

        info!(
            report_id,
            term_loans = self.summary.term_loans,
            od_ccs = self.summary.od_ccs,
            takeovers = self.summary.takeovers,
            linked_loans = self.summary.linked_loans,
            fresh_loans = self.summary.fresh_loans,
            enhancements = self.summary.enhancements,
            bifurcations = self.summary.bifurcations,
            skipped = self.summary.skipped,
            "Project report inserted"
        );

        Ok(IngestOutcome {
            report_id,
            summary: self.summary,
        })
    }

    fn record(&mut self, step: Step, result: Result<(), Skip>) {
        match result {
            Ok(()) => record_ingest_entry(step.as_str(), "inserted"),
            Err(Skip::Invalid(reason)) => {
                self.summary.skipped += 1;
                warn!(step = step.as_str(), reason = %reason, "Skipping entry");
                record_ingest_entry(step.as_str(), "skipped");
            }
            Err(Skip::Failed(err)) => {
                self.summary.skipped += 1;
                error!(step = step.as_str(), error = %err, "Failed to insert entry");
                record_ingest_entry(step.as_str(), "failed");
            }
        }
    }

    // Step 0: header. Resolution failures abort the document.
    async fn insert_header(&mut self, document: &ReportDocument) -> Result<i64, IngestError> {
        let header = document.header()?;

        let bank_id = resolve_bank(
            self.store,
            header.bank.name.as_deref().unwrap_or_default(),
            header.bank_type.as_deref(),
        )
        .await?;
        let branch_id = resolve_foreign_key(
            self.store,
            ForeignKey::BankBranch,
            header.bank_branch.branch.as_deref().unwrap_or_default(),
        )
        .await?;
        let loan_scheme_id = resolve_foreign_key(
            self.store,
            ForeignKey::LoanScheme,
            header.loan_scheme.name.as_deref().unwrap_or_default(),
        )
        .await?;

        let report = NewProjectReport {
            flags: ReportFlags {
                is_fresh_term_loan: header.is_fresh_term_loan,
                is_od_enhancement: header.is_od_enhancement,
                is_takeover: header.is_takeover,
                is_od_renewal: header.is_od_renewal,
                is_od_fresh: header.is_od_fresh,
            },
            bank_id,
            branch_id,
            loan_scheme_id,
        };
        let report_id = self.store.insert_project_report(self.ctx, &report).await?;
        info!(report_id, bank_id, branch_id, loan_scheme_id, "Project report created");
        Ok(report_id)
    }

    // Step 1: existing term loans.
    async fn insert_term_loan(&mut self, report_id: i64, value: &Value) -> Result<(), Skip> {
        let entry: TermLoanEntry = parse_entry(value)?;
        let loan_amt = entry
            .loan_amt
            .ok_or_else(|| Skip::invalid("term loan has no loan_amt"))?;
        let bank_name = non_empty(entry.bank.name.as_deref())
            .ok_or_else(|| Skip::invalid("term loan has no bank name"))?;
        let bank_id = resolve_foreign_key(self.store, ForeignKey::Bank, bank_name).await?;

        let loan = NewTermLoan {
            report_id,
            bank_id,
            name: entry.name.clone(),
            loan_amt,
            emi_start_date: parse_date(entry.emi_start_date.as_deref()),
            is_secure: entry.is_secure,
            emi_amt: entry.emi_amt,
            num_installments: entry.num_installments,
            int_rate: entry.int_rate,
            loan_type: LoanType::from_label(entry.loan_type.as_deref()),
            installment_type: InstallmentType::from_label(entry.installment_type.as_deref()),
            amount_type: AmountType::from_label(entry.amount_type.as_deref()),
        };
        let id = self.store.insert_term_loan(self.ctx, &loan).await?;

        info!(term_loan_id = id, bank = %bank_name, amount = %loan_amt, "Inserted term loan");
        self.term_loans.push(InsertedLoan {
            id,
            name: entry.name,
            bank_name: bank_name.to_string(),
            amount: loan_amt,
        });
        self.summary.term_loans += 1;
        Ok(())
    }

    // Step 2: existing OD/CC facilities.
    async fn insert_od_cc(&mut self, report_id: i64, value: &Value) -> Result<(), Skip> {
        let entry: OdCcEntry = parse_entry(value)?;
        let bank_name = non_empty(entry.bank.name.as_deref())
            .ok_or_else(|| Skip::invalid("OD/CC has no bank name"))?;
        let amount = entry
            .amount
            .ok_or_else(|| Skip::invalid("OD/CC has no amount"))?;
        let bank_id = resolve_foreign_key(self.store, ForeignKey::Bank, bank_name).await?;

        let od_cc = NewOdCc {
            report_id,
            bank_id,
            name: entry.name.clone(),
            facility_type: entry.facility_type.clone(),
            os_amt: entry.os_amount,
            amount: Some(amount),
            int_rate: entry.int_rate,
            sanction_date: parse_date(entry.sanction_date.as_deref()),
            od_limits: entry.od_limits_json(),
            amount_type_os: AmountType::from_label(entry.amount_type_os.as_deref()),
            amount_type_od_cc: AmountType::from_label(entry.amount_type_od_cc.as_deref()),
        };
        let id = self.store.insert_od_cc(self.ctx, &od_cc).await?;

        info!(od_cc_id = id, bank = %bank_name, "Inserted OD/CC");
        self.od_ccs.push(InsertedLoan {
            id,
            name: entry.name,
            bank_name: bank_name.to_string(),
            amount,
        });
        self.summary.od_ccs += 1;
        Ok(())
    }

    // Step 3: takeovers from the repayment summary, matched by bank and amount.
    async fn insert_repayment_takeover(
        &mut self,
        report_id: i64,
        value: &Value,
    ) -> Result<(), Skip> {
        let entry: RepaymentTakeoverEntry = parse_entry(value)?;
        let bank_name = non_empty(entry.bank_name.as_deref());
        let original_amount = entry.original_amount.filter(|a| !a.is_zero());
        let interest_rate = entry.interest_rate.filter(|r| !r.is_zero());
        let duration = entry.duration.filter(|d| *d != 0);
        let (Some(bank_name), Some(original_amount), Some(interest_rate), Some(duration)) =
            (bank_name, original_amount, interest_rate, duration)
        else {
            return Err(Skip::invalid(
                "takeover is missing bank_name, original_amount, interest_rate or duration",
            ));
        };

        let name = takeover_name(bank_name, original_amount);
        let takeover = NewTakeover {
            report_id,
            takeover_type: TakeoverType::TermLoan,
            name: Some(name.clone()),
            int_rate: Some(interest_rate),
            num_installments: Some(duration),
            is_merged: false,
            sanction_date: parse_date(entry.start_date.as_deref()),
        };
        let takeover_id = self.store.insert_takeover(self.ctx, &takeover).await?;
        self.summary.takeovers += 1;
        info!(takeover_id, name = %name, "Inserted takeover");

        let term_loan_matches: Vec<i64> =
            find_matching_loans(&self.term_loans, bank_name, original_amount, DEFAULT_TOLERANCE)
                .iter()
                .map(|l| l.id)
                .collect();
        let (kind, matched) = if term_loan_matches.is_empty() {
            let od_cc_matches = find_matching_loans(
                &self.od_ccs,
                bank_name,
                original_amount,
                DEFAULT_TOLERANCE,
            )
            .iter()
            .map(|l| l.id)
            .collect();
            (TakeoverType::OdCc, od_cc_matches)
        } else {
            (TakeoverType::TermLoan, term_loan_matches)
        };

        if matched.is_empty() {
            info!(
                takeover_id,
                bank = %bank_name,
                amount = %original_amount,
                "No matching loans for takeover"
            );
            return Ok(());
        }

        if matched.len() > 1 {
            self.store.mark_takeover_merged(takeover_id).await?;
            info!(takeover_id, loans = matched.len(), "Takeover marked as merged");
        }

        for loan_id in matched {
            self.link(kind, report_id, loan_id, takeover_id).await;
        }
        Ok(())
    }

    // Step 4: takeovers from the proposed loan details. Targets come from
    // explicit ids, else `existing_loan_id`, else the name heuristic.
    async fn insert_legacy_takeover(
        &mut self,
        report_id: i64,
        value: &Value,
        kind: TakeoverType,
    ) -> Result<(), Skip> {
        let entry: LegacyTakeoverEntry = parse_entry(value)?;

        let (int_rate, num_installments) = match kind {
            TakeoverType::TermLoan => {
                let installments = entry.num_installments.filter(|n| *n != 0);
                let rate = entry.int_rate.filter(|r| !r.is_zero());
                let (Some(installments), Some(rate)) = (installments, rate) else {
                    return Err(Skip::invalid(
                        "legacy takeover term loan is missing num_installments or int_rate",
                    ));
                };
                (rate, installments)
            }
            TakeoverType::OdCc => (entry.int_rate.unwrap_or(Decimal::ZERO), 0),
        };

        let takeover = NewTakeover {
            report_id,
            takeover_type: kind,
            name: entry.name.clone(),
            int_rate: Some(int_rate),
            num_installments: Some(num_installments),
            is_merged: entry.is_merged,
            sanction_date: parse_date(entry.sanction_date.as_deref()),
        };
        let takeover_id = self.store.insert_takeover(self.ctx, &takeover).await?;
        self.summary.takeovers += 1;
        info!(takeover_id, kind = kind.as_str(), "Inserted legacy takeover");

        let explicit = match kind {
            TakeoverType::TermLoan => entry.term_loan_ids.as_ref(),
            TakeoverType::OdCc => entry.od_cc_ids.as_ref(),
        };
        let targets: Vec<i64> = if let Some(ids) = explicit {
            ids.clone()
        } else if let Some(id) = entry.existing_loan_id {
            vec![id]
        } else if let Some(name) = entry.name.as_deref() {
            let loans = match kind {
                TakeoverType::TermLoan => &self.term_loans,
                TakeoverType::OdCc => &self.od_ccs,
            };
            find_loan_by_name(loans, name)
                .map(|l| vec![l.id])
                .unwrap_or_default()
        } else {
            warn!(takeover_id, "Legacy takeover has no name, skipping loan linking");
            Vec::new()
        };

        for loan_id in targets {
            self.link(kind, report_id, loan_id, takeover_id).await;
        }
        Ok(())
    }

    /// Points one loan at a takeover. A successful link retires the report's
    /// current bifurcation rows.
    async fn link(&mut self, kind: TakeoverType, report_id: i64, loan_id: i64, takeover_id: i64) {
        let result = match kind {
            TakeoverType::TermLoan => {
                self.store
                    .link_term_loan(self.ctx, report_id, loan_id, takeover_id)
                    .await
            }
            TakeoverType::OdCc => {
                self.store
                    .link_od_cc(self.ctx, report_id, loan_id, takeover_id)
                    .await
            }
        };

        match result {
            Ok(0) => warn!(
                loan_id,
                takeover_id,
                kind = kind.as_str(),
                "No rows affected when linking loan"
            ),
            Ok(_) => {
                self.summary.linked_loans += 1;
                info!(loan_id, takeover_id, kind = kind.as_str(), "Linked loan to takeover");
                if let Err(e) = self.store.clear_current_bifurcations(report_id).await {
                    error!(report_id, error = %e, "Failed to update loan bifurcation status");
                }
            }
            Err(e) => error!(loan_id, takeover_id, error = %e, "Failed to link loan to takeover"),
        }
    }

    // Step 5: fresh term loans with their assets.
    async fn insert_fresh_loan(&mut self, report_id: i64, value: &Value) -> Result<(), Skip> {
        let entry: FreshLoanEntry = parse_entry(value)?;
        let loan = NewFreshLoan {
            report_id,
            name: entry.name.clone(),
            num_installments: entry.num_installments,
            int_rate: entry.int_rate.unwrap_or(Decimal::ZERO),
            moratorium_period: entry.moratorium_period,
            sanction_date: parse_date(entry.sanction_date.as_deref()),
        };
        let new_loan_id = self.store.insert_fresh_loan(self.ctx, &loan).await?;
        self.summary.fresh_loans += 1;

        for asset in &entry.assets {
            let result = self.insert_loan_asset(new_loan_id, asset).await;
            self.record(Step::LoanAsset, result);
        }
        Ok(())
    }

    async fn insert_loan_asset(&mut self, new_loan_id: i64, value: &Value) -> Result<(), Skip> {
        let entry: AssetEntry = parse_entry(value)?;
        let asset = NewLoanAsset {
            new_loan_id,
            name: entry.name,
            type_id: entry.type_id.unwrap_or(0),
            original_value: entry.original_value.unwrap_or(Decimal::ZERO),
            margin: entry.margin.unwrap_or(Decimal::ZERO),
            promoter_contribution: entry.promoter_contribution.unwrap_or(Decimal::ZERO),
        };
        self.store.insert_loan_asset(self.ctx, &asset).await?;
        self.summary.loan_assets += 1;
        Ok(())
    }

    // Step 6: OD/CC enhancements.
    async fn insert_enhancement(&mut self, report_id: i64, value: &Value) -> Result<(), Skip> {
        let entry: EnhancementEntry = parse_entry(value)?;
        let enhancement = NewOdCcEnhancement {
            report_id,
            name: entry.name.unwrap_or_else(|| "Unnamed".to_string()),
            amount: entry.amount.unwrap_or(Decimal::ZERO),
            int_rate: entry.int_rate.unwrap_or(Decimal::ZERO),
            enhancement_amount: entry.enhancement_amount.unwrap_or(Decimal::ZERO),
            sanction_date: parse_date(entry.sanction_date.as_deref()),
            amount_type: AmountType::from_label(entry.amount_type.as_deref()),
        };
        let id = self.store.insert_enhancement(self.ctx, &enhancement).await?;
        info!(
            enhancement_id = id,
            od_cc_type = OD_CC_ENHANCEMENT_TYPE,
            name = %enhancement.name,
            "Inserted OD/CC enhancement"
        );
        self.summary.enhancements += 1;
        Ok(())
    }

    // Step 7: loan bifurcations, never current on insert.
    async fn insert_bifurcation(&mut self, report_id: i64, value: &Value) -> Result<(), Skip> {
        let entry: BifurcationEntry = parse_entry(value)?;
        let bifurcation = NewLoanBifurcation {
            report_id,
            financial_year: entry.financial_year,
            bank_od: entry.bank_od,
            rel_party_loan: entry.rel_party_loan,
            other_loan: entry.other_loan,
            total_loan: entry.total_loan,
            term_loans: entry.term_loans,
            business_loans: entry.business_loans,
        };
        self.store.insert_bifurcation(self.ctx, &bifurcation).await?;
        self.summary.bifurcations += 1;
        Ok(())
    }

    // Step 8: the assumption row and its yearly details.
    async fn insert_assumption(&mut self, report_id: i64, value: &Value) -> Result<(), Skip> {
        let entry: AssumptionEntry = parse_entry(value)?;
        let assumption = NewAssumption {
            report_id,
            version: itr_version_code(entry.itr_version.as_deref()),
            profit_margin: entry.profit_margin,
            profit_margin_hist_pct: entry.profit_margin_hist_pct,
            profit_margin_type: entry.profit_margin_type.clone(),
            customer_credit_period: entry.customer_credit_period,
            supplier_credit_period: entry.supplier_credit_period,
            customer_credit_hist_pct: entry.customer_credit_hist_pct,
            supplier_credit_hist_pct: entry.supplier_credit_hist_pct,
            related_party_amount: entry.related_party_amount,
            other_loan_amount: entry.other_loan_amount,
            od_amount: entry.od_amount,
            description: entry.description.clone(),
        };
        let assumption_id = self.store.insert_assumption(self.ctx, &assumption).await?;

        let details = self.collect_assumption_details(&entry.details);
        if !details.is_empty() {
            let inserted = self
                .store
                .insert_assumption_details(self.ctx, assumption_id, &details)
                .await?;
            self.summary.assumption_details += inserted as usize;
        }
        info!(assumption_id, details = details.len(), "Inserted assumption");
        Ok(())
    }

    fn collect_assumption_details(&mut self, details: &Value) -> Vec<NewAssumptionDetail> {
        let groups = match details {
            Value::Object(groups) => groups,
            Value::Null => return Vec::new(),
            _ => {
                self.record(
                    Step::AssumptionDetail,
                    Err(Skip::invalid("assumption details is not an object")),
                );
                return Vec::new();
            }
        };

        let mut rows = Vec::new();
        for (group, entries) in groups {
            let Value::Array(entries) = entries else {
                self.record(
                    Step::AssumptionDetail,
                    Err(Skip::invalid(format!("group '{}' is not a list", group))),
                );
                continue;
            };
            for entry in entries {
                if !entry.is_object() {
                    self.record(
                        Step::AssumptionDetail,
                        Err(Skip::invalid(format!("entry in group '{}' is not an object", group))),
                    );
                    continue;
                }
                match parse_entry::<AssumptionDetailEntry>(entry) {
                    Ok(detail) => rows.push(NewAssumptionDetail {
                        assumptions_type_id: detail.assumptions_type_id,
                        financial_year: detail.financial_year,
                        value: detail.value,
                        percentage_increase: detail.percentage_increase,
                        year_type: YearType::from_label(detail.year_type.as_deref()),
                    }),
                    Err(e) => self.record(Step::AssumptionDetail, Err(e.into())),
                }
            }
        }
        rows
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// `TO-TL-{BANK, uppercased, spaces removed}-{amount in lakhs, 2dp}L`
pub fn takeover_name(bank_name: &str, original_amount: Decimal) -> String {
    // Rounded as a float so midpoints like 12.345 land on 12.35.
    let lakhs = original_amount.to_f64().unwrap_or_default() / 100_000.0;
    format!(
        "TO-TL-{}-{:.2}L",
        bank_name.to_uppercase().replace(' ', ""),
        lakhs
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::store::memory::MemoryStore;
    use serde_json::json;
    use std::str::FromStr;

    fn ctx() -> IngestContext {
        IngestContext::new(187, 179, 179)
    }

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_lookup(ForeignKey::Bank, "State Bank of India", 1)
            .with_lookup(ForeignKey::Bank, "HDFC Bank", 2)
            .with_lookup(ForeignKey::BankBranch, "MG Road", 10)
            .with_lookup(ForeignKey::LoanScheme, "MSME", 20)
    }

    fn header() -> Value {
        json!({
            "bank": {"name": "State Bank of India"},
            "bank_branch": {"branch": "MG Road"},
            "loan_scheme": {"name": "MSME"},
            "is_takeover": true
        })
    }

    fn document(extra: Value) -> ReportDocument {
        let mut root = json!({"what_you_want_details": header()});
        if let (Value::Object(root_map), Value::Object(extra_map)) = (&mut root, extra) {
            root_map.extend(extra_map);
        }
        ReportDocument::from_value(root).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn minimal_document_creates_report_and_assumption() {
        let store = store();
        let outcome = ReportMapper::new(&store, &ctx())
            .run(&document(json!({})))
            .await
            .unwrap();

        assert!(outcome.report_id > 0);
        let state = store.state.lock().unwrap();
        assert_eq!(state.reports.len(), 1);
        let (_, report) = &state.reports[0];
        assert_eq!((report.bank_id, report.branch_id, report.loan_scheme_id), (1, 10, 20));
        assert!(report.flags.is_takeover);
        assert_eq!(state.assumptions.len(), 1);
        assert_eq!(state.assumptions[0].1.version, 0);
    }

    #[tokio::test]
    async fn unresolved_header_aborts_document() {
        let store = MemoryStore::new();
        let err = insert_report(&store, &document(json!({})), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Resolve(ResolveError::NotFound { .. })));
        assert!(store.state.lock().unwrap().reports.is_empty());
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let store = store();
        let doc = ReportDocument::from_value(json!({"repayment_summary": {}})).unwrap();
        assert!(matches!(
            insert_report(&store, &doc, &ctx()).await,
            Err(IngestError::MissingSection(_))
        ));
    }

    #[tokio::test]
    async fn incomplete_term_loans_are_skipped() {
        let store = store();
        let doc = document(json!({
            "existing_loan_details_details": {
                "term_loan_details": [
                    {"name": "no amount", "bank": {"name": "HDFC Bank"}},
                    {"name": "no bank", "loan_amt": 100},
                    {"name": "empty bank", "loan_amt": 100, "bank": {"name": ""}},
                    {"name": "unknown bank", "loan_amt": 100, "bank": {"name": "Nowhere Bank"}},
                    {"name": "good", "loan_amt": "250000", "bank": {"name": "HDFC Bank"},
                     "loan_type": "bussiness_loan", "installment_type": "Year", "amount_type": "Lakhs"}
                ]
            }
        }));

        let outcome = ReportMapper::new(&store, &ctx()).run(&doc).await.unwrap();
        assert_eq!(outcome.summary.term_loans, 1);
        assert_eq!(outcome.summary.skipped, 4);

        let state = store.state.lock().unwrap();
        let (_, loan, takeover) = &state.term_loans[0];
        assert_eq!(loan.name.as_deref(), Some("good"));
        assert_eq!(loan.bank_id, 2);
        assert_eq!(loan.loan_type.code(), 1);
        assert_eq!(loan.installment_type.code(), 1);
        assert_eq!(loan.amount_type.code(), 1);
        assert!(takeover.is_none());
    }

    #[tokio::test]
    async fn od_cc_limits_are_keyed_by_year() {
        let store = store();
        let doc = document(json!({
            "existing_loan_details_details": {
                "od_cc_details": [
                    {"name": "CC1", "bank": {"name": "HDFC Bank"}, "amount": 500000,
                     "od_limits": [{"year": 2024, "limit": 500000}], "amount_type_od_cc": "crores"},
                    {"name": "CC2", "bank": {}}
                ]
            }
        }));
        let outcome = ReportMapper::new(&store, &ctx()).run(&doc).await.unwrap();
        assert_eq!(outcome.summary.od_ccs, 1);

        let state = store.state.lock().unwrap();
        let (_, od_cc, _) = &state.od_ccs[0];
        assert_eq!(od_cc.od_limits, json!({"2024": 500000}));
        assert_eq!(od_cc.amount_type_od_cc.code(), 2);
    }

    #[tokio::test]
    async fn od_cc_without_amount_is_skipped() {
        let store = store();
        let doc = document(json!({
            "existing_loan_details_details": {
                "od_cc_details": [
                    {"name": "CC no amount", "bank": {"name": "HDFC Bank"}}
                ]
            }
        }));

        let outcome = ReportMapper::new(&store, &ctx()).run(&doc).await.unwrap();
        assert_eq!(outcome.summary.od_ccs, 0);
        assert_eq!(outcome.summary.skipped, 1);
        assert!(store.state.lock().unwrap().od_ccs.is_empty());
    }

    #[tokio::test]
    async fn repayment_takeover_links_single_term_loan() {
        let store = store();
        let doc = document(json!({
            "existing_loan_details_details": {
                "term_loan_details": [
                    {"name": "TL1", "loan_amt": 1000000, "bank": {"name": "State Bank of India"}},
                    {"name": "TL2", "loan_amt": 400000, "bank": {"name": "HDFC Bank"}}
                ]
            },
            "repayment_summary": {"take_over": [
                {"bank_name": "state bank", "original_amount": 995000,
                 "interest_rate": 9.5, "duration": 60, "start_date": "2022-04-01"}
            ]},
            "loan_bifurcation_details": [{"financial_year": "2023-24", "total_loan": 10}]
        }));

        let outcome = ReportMapper::new(&store, &ctx()).run(&doc).await.unwrap();
        assert_eq!(outcome.summary.takeovers, 1);
        assert_eq!(outcome.summary.linked_loans, 1);

        let state = store.state.lock().unwrap();
        let takeover = &state.takeovers[0];
        assert_eq!(takeover.row.name.as_deref(), Some("TO-TL-STATEBANK-9.95L"));
        assert_eq!(takeover.row.takeover_type, TakeoverType::TermLoan);
        assert_eq!(takeover.row.num_installments, Some(60));
        assert!(!takeover.is_merged);
        assert_eq!(state.term_loans[0].2, Some(takeover.id));
        assert_eq!(state.term_loans[1].2, None);
        assert!(state.bifurcations.iter().all(|b| !b.is_current));
    }

    #[tokio::test]
    async fn multiple_matches_mark_takeover_merged() {
        let store = store();
        let doc = document(json!({
            "existing_loan_details_details": {
                "term_loan_details": [
                    {"name": "A", "loan_amt": 500000, "bank": {"name": "HDFC Bank"}},
                    {"name": "B", "loan_amt": 502000, "bank": {"name": "HDFC Bank"}}
                ]
            },
            "repayment_summary": {"take_over": [
                {"bank_name": "HDFC", "original_amount": "500000", "interest_rate": "10", "duration": "48"}
            ]}
        }));

        ReportMapper::new(&store, &ctx()).run(&doc).await.unwrap();

        let state = store.state.lock().unwrap();
        let takeover = &state.takeovers[0];
        assert!(takeover.is_merged);
        assert!(state
            .term_loans
            .iter()
            .all(|(_, _, t)| *t == Some(takeover.id)));
    }

    #[tokio::test]
    async fn takeover_falls_back_to_od_cc_when_no_term_loan_matches() {
        let store = store();
        let doc = document(json!({
            "existing_loan_details_details": {
                "term_loan_details": [
                    {"name": "TL", "loan_amt": 100, "bank": {"name": "HDFC Bank"}}
                ],
                "od_cc_details": [
                    {"name": "CC", "amount": 300000, "bank": {"name": "HDFC Bank"}}
                ]
            },
            "repayment_summary": {"take_over": [
                {"bank_name": "HDFC Bank", "original_amount": 300000, "interest_rate": 8, "duration": 12}
            ]}
        }));

        ReportMapper::new(&store, &ctx()).run(&doc).await.unwrap();

        let state = store.state.lock().unwrap();
        assert_eq!(state.term_loans[0].2, None);
        assert_eq!(state.od_ccs[0].2, Some(state.takeovers[0].id));
    }

    #[tokio::test]
    async fn takeover_without_required_fields_is_skipped() {
        let store = store();
        let doc = document(json!({
            "repayment_summary": {"take_over": [
                {"bank_name": "HDFC", "original_amount": 0, "interest_rate": 8, "duration": 12},
                {"bank_name": "", "original_amount": 10, "interest_rate": 8, "duration": 12},
                {"bank_name": "HDFC", "original_amount": 10, "interest_rate": 8}
            ]}
        }));
        let outcome = ReportMapper::new(&store, &ctx()).run(&doc).await.unwrap();
        assert_eq!(outcome.summary.takeovers, 0);
        assert_eq!(outcome.summary.skipped, 3);
    }

    #[tokio::test]
    async fn legacy_takeovers_use_ids_then_name_heuristic() {
        let store = store();
        let doc = document(json!({
            "existing_loan_details_details": {
                "term_loan_details": [
                    {"name": "TL-A", "loan_amt": 100, "bank": {"name": "HDFC Bank"}}
                ],
                "od_cc_details": [
                    {"name": "CC-B", "amount": 50, "bank": {"name": "HDFC Bank"}}
                ]
            },
            "proposed_loan_details": {"take_over_details": {
                "term_loan_details": [
                    {"name": "TO-TL-A", "num_installments": 24, "int_rate": 9, "is_merged": true},
                    {"name": "missing rate", "num_installments": 24}
                ],
                "od_cc_details": [
                    {"name": "anything", "od_cc_ids": [3]}
                ]
            }}
        }));

        let outcome = ReportMapper::new(&store, &ctx()).run(&doc).await.unwrap();
        assert_eq!(outcome.summary.takeovers, 2);

        let state = store.state.lock().unwrap();
        let term_takeover = &state.takeovers[0];
        assert!(term_takeover.is_merged);
        assert_eq!(state.term_loans[0].2, Some(term_takeover.id));

        let od_takeover = &state.takeovers[1];
        assert_eq!(od_takeover.row.takeover_type, TakeoverType::OdCc);
        assert_eq!(od_takeover.row.num_installments, Some(0));
        let (od_cc_id, _, linked) = &state.od_ccs[0];
        assert_eq!(*od_cc_id, 3);
        assert_eq!(*linked, Some(od_takeover.id));
    }

    #[tokio::test]
    async fn unnamed_legacy_takeover_links_nothing() {
        let store = store();
        let doc = document(json!({
            "existing_loan_details_details": {
                "term_loan_details": [
                    {"name": "TL-A", "loan_amt": 100, "bank": {"name": "HDFC Bank"}}
                ]
            },
            "proposed_loan_details": {"take_over_details": {
                "term_loan_details": [
                    {"name": null, "num_installments": 24, "int_rate": 9}
                ]
            }}
        }));

        let outcome = ReportMapper::new(&store, &ctx()).run(&doc).await.unwrap();
        assert_eq!(outcome.summary.takeovers, 1);
        assert_eq!(outcome.summary.linked_loans, 0);
        assert_eq!(store.state.lock().unwrap().term_loans[0].2, None);
    }

    #[tokio::test]
    async fn explicit_ids_cannot_reach_another_reports_loans() {
        let store = store();
        let first = document(json!({
            "existing_loan_details_details": {
                "term_loan_details": [
                    {"name": "TL-A", "loan_amt": 100, "bank": {"name": "HDFC Bank"}}
                ]
            }
        }));
        ReportMapper::new(&store, &ctx()).run(&first).await.unwrap();
        let foreign_loan_id = store.state.lock().unwrap().term_loans[0].0;

        let second = document(json!({
            "proposed_loan_details": {"take_over_details": {
                "term_loan_details": [
                    {"name": "TO-X", "num_installments": 24, "int_rate": 9,
                     "term_loan_ids": [foreign_loan_id]}
                ]
            }}
        }));
        let outcome = ReportMapper::new(&store, &ctx()).run(&second).await.unwrap();

        assert_eq!(outcome.summary.takeovers, 1);
        assert_eq!(outcome.summary.linked_loans, 0);
        assert_eq!(store.state.lock().unwrap().term_loans[0].2, None);
    }

    #[tokio::test]
    async fn fresh_loans_enhancements_and_assumptions() {
        let store = store();
        let doc = document(json!({
            "proposed_loan_details": {
                "fresh_term_loan_details": [
                    {"name": "Machinery", "num_installments": 84, "int_rate": "10.5",
                     "assets": [{"name": "Lathe", "type_id": 3, "original_value": 100000, "margin": 25}, "bad"]}
                ],
                "od_cc_enhancement_details": [
                    {"amount": 200000, "enhancement_amount": 50000, "amount_type": "Crores"}
                ]
            },
            "assumption_details": {"assumption_details": [{
                "itr_version": "itr4",
                "details": {
                    "sales": [
                        {"assumptions_type_id": 1, "financial_year": 2024, "value": 10, "year_type": "Projected"},
                        "not an object"
                    ],
                    "broken": {"x": 1}
                }
            }]}
        }));

        let outcome = ReportMapper::new(&store, &ctx()).run(&doc).await.unwrap();
        assert_eq!(outcome.summary.fresh_loans, 1);
        assert_eq!(outcome.summary.loan_assets, 1);
        assert_eq!(outcome.summary.enhancements, 1);
        assert_eq!(outcome.summary.assumption_details, 1);

        let state = store.state.lock().unwrap();
        assert_eq!(state.fresh_loans[0].1.int_rate, dec("10.5"));
        assert_eq!(state.assets[0].margin, dec("25"));

        let enhancement = &state.enhancements[0];
        assert_eq!(enhancement.name, "Unnamed");
        assert_eq!(enhancement.int_rate, Decimal::ZERO);
        assert_eq!(enhancement.amount_type.code(), 2);

        assert_eq!(state.assumptions[0].1.version, 4);
        let (_, detail) = &state.assumption_details[0];
        assert_eq!(detail.financial_year.as_deref(), Some("2024"));
        assert_eq!(detail.year_type.code(), 2);
    }

    #[tokio::test]
    async fn store_failures_skip_only_the_entry() {
        let store = store().failing_on("insert_term_loan");
        let doc = document(json!({
            "existing_loan_details_details": {
                "term_loan_details": [{"loan_amt": 1, "bank": {"name": "HDFC Bank"}}],
                "od_cc_details": [{"amount": 1, "bank": {"name": "HDFC Bank"}}]
            }
        }));

        let outcome = ReportMapper::new(&store, &ctx()).run(&doc).await.unwrap();
        assert_eq!(outcome.summary.term_loans, 0);
        assert_eq!(outcome.summary.od_ccs, 1);
        assert_eq!(outcome.summary.skipped, 1);
    }

    #[test]
    fn takeover_names_are_normalised() {
        assert_eq!(
            takeover_name("Bank of Baroda", dec("1250000")),
            "TO-TL-BANKOFBARODA-12.50L"
        );
        assert_eq!(takeover_name("sbi", dec("99999")), "TO-TL-SBI-1.00L");
    }

    #[test]
    fn takeover_name_midpoints_round_like_float_formatting() {
        assert_eq!(takeover_name("HDFC", dec("1234500")), "TO-TL-HDFC-12.35L");
        assert_eq!(takeover_name("HDFC", dec("1000500")), "TO-TL-HDFC-10.01L");
        assert_eq!(takeover_name("HDFC", dec("1250500")), "TO-TL-HDFC-12.51L");
    }
}
