//! Typed views over a loan-application JSON document.
//!
//! Sections are kept as raw JSON and each list entry is deserialized on its
//! own, so one malformed entry never poisons its siblings.

use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::str::FromStr;

use super::error::IngestError;

#[derive(Debug, Clone)]
pub struct ReportDocument {
    root: Map<String, Value>,
}

impl ReportDocument {
    pub fn from_value(value: Value) -> Result<Self, IngestError> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            // Source rows occasionally hold the document as a JSON string.
            Value::String(text) => {
                let parsed: Value = serde_json::from_str(&text)
                    .map_err(|e| IngestError::InvalidDocument(e.to_string()))?;
                Self::from_value(parsed)
            }
            other => Err(IngestError::InvalidDocument(format!(
                "expected a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn header(&self) -> Result<ReportHeader, IngestError> {
        let section = self
            .root
            .get("what_you_want_details")
            .filter(|v| !v.is_null())
            .ok_or(IngestError::MissingSection("what_you_want_details"))?;
        serde_json::from_value(section.clone())
            .map_err(|e| IngestError::InvalidDocument(format!("what_you_want_details: {}", e)))
    }

    pub fn existing_term_loans(&self) -> Vec<Value> {
        self.list_at(&["existing_loan_details_details", "term_loan_details"])
    }

    pub fn existing_od_cc(&self) -> Vec<Value> {
        self.list_at(&["existing_loan_details_details", "od_cc_details"])
    }

    pub fn repayment_takeovers(&self) -> Vec<Value> {
        self.list_at(&["repayment_summary", "take_over"])
    }

    pub fn legacy_term_loan_takeovers(&self) -> Vec<Value> {
        self.list_at(&[
            "proposed_loan_details",
            "take_over_details",
            "term_loan_details",
        ])
    }

    pub fn legacy_od_cc_takeovers(&self) -> Vec<Value> {
        self.list_at(&["proposed_loan_details", "take_over_details", "od_cc_details"])
    }

    pub fn fresh_term_loans(&self) -> Vec<Value> {
        self.list_at(&["proposed_loan_details", "fresh_term_loan_details"])
    }

    /// Enhancements live under `proposed_loan_details`, or under
    /// `user_input.proposed_loan_details` for documents exported with their
    /// request envelope.
    pub fn od_cc_enhancements(&self) -> Vec<Value> {
        let direct = self.list_at(&["proposed_loan_details", "od_cc_enhancement_details"]);
        if !direct.is_empty() {
            return direct;
        }
        self.list_at(&[
            "user_input",
            "proposed_loan_details",
            "od_cc_enhancement_details",
        ])
    }

    pub fn loan_bifurcations(&self) -> Vec<Value> {
        self.list_at(&["loan_bifurcation_details"])
    }

    /// `assumption_details.assumption_details` is either a list (first
    /// element wins) or an object. Anything else yields an empty object.
    pub fn assumption(&self) -> Value {
        let inner = self
            .root
            .get("assumption_details")
            .and_then(|v| v.get("assumption_details"));
        match inner {
            Some(Value::Array(items)) => items
                .first()
                .filter(|v| v.is_object())
                .cloned()
                .unwrap_or_else(empty_object),
            Some(obj @ Value::Object(_)) => obj.clone(),
            _ => empty_object(),
        }
    }

    fn list_at(&self, path: &[&str]) -> Vec<Value> {
        let Some((first, rest)) = path.split_first() else {
            return Vec::new();
        };
        let mut current = self.root.get(*first);
        for key in rest {
            current = current.and_then(|v| v.get(*key));
        }
        match current {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn parse_entry<T: DeserializeOwned>(value: &Value) -> Result<T, serde_json::Error> {
    T::deserialize(value)
}

// ============================================================================
// Section shapes
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamedRef {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BranchRef {
    #[serde(default, deserialize_with = "lenient_string")]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportHeader {
    #[serde(default, deserialize_with = "or_default")]
    pub bank: NamedRef,
    #[serde(default, deserialize_with = "or_default")]
    pub bank_branch: BranchRef,
    #[serde(default, deserialize_with = "or_default")]
    pub loan_scheme: NamedRef,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bank_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_fresh_term_loan: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_od_enhancement: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_takeover: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_od_renewal: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_od_fresh: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TermLoanEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub bank: NamedRef,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub loan_amt: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub emi_start_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_secure: bool,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub emi_amt: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub num_installments: Option<i32>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub int_rate: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub loan_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub installment_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OdLimit {
    #[serde(deserialize_with = "required_string")]
    pub year: String,
    #[serde(default)]
    pub limit: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OdCcEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub bank: NamedRef,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub facility_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub os_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub amount: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub int_rate: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sanction_date: Option<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub od_limits: Vec<OdLimit>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount_type_os: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount_type_od_cc: Option<String>,
}

impl OdCcEntry {
    /// `[{year, limit}]` becomes `{"<year>": limit}`; later years overwrite
    /// earlier duplicates.
    pub fn od_limits_json(&self) -> Value {
        let mut map = Map::new();
        for limit in &self.od_limits {
            map.insert(limit.year.clone(), limit.limit.clone());
        }
        Value::Object(map)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepaymentTakeoverEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub bank_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub original_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub interest_rate: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub duration: Option<i32>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub start_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyTakeoverEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub num_installments: Option<i32>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub int_rate: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_merged: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sanction_date: Option<String>,
    #[serde(default)]
    pub term_loan_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub od_cc_ids: Option<Vec<i64>>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub existing_loan_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FreshLoanEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub num_installments: Option<i32>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub int_rate: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub moratorium_period: Option<i32>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sanction_date: Option<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub assets: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub type_id: Option<i32>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub original_value: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub margin: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub promoter_contribution: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnhancementEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub amount: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub int_rate: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub enhancement_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sanction_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BifurcationEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub financial_year: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub bank_od: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub rel_party_loan: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub other_loan: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub total_loan: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub term_loans: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub business_loans: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssumptionEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub itr_version: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub profit_margin: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub profit_margin_hist_pct: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub profit_margin_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub customer_credit_period: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub supplier_credit_period: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub customer_credit_hist_pct: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub supplier_credit_hist_pct: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub related_party_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub other_loan_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub od_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    /// `{group: [entry]}`; kept raw so bad groups can be skipped one by one.
    #[serde(default)]
    pub details: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssumptionDetailEntry {
    #[serde(default, deserialize_with = "lenient_i32")]
    pub assumptions_type_id: Option<i32>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub financial_year: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub value: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub percentage_increase: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub year_type: Option<String>,
}

// ============================================================================
// Lenient field decoding
// ============================================================================

/// Treats an explicit `null` like an absent field.
fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected a string, got {}",
            type_name(&other)
        ))),
    }
}

fn required_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_string(deserializer)?.ok_or_else(|| de::Error::custom("value is required"))
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(Decimal::from(i)))
            } else {
                Decimal::from_str(&n.to_string())
                    .ok()
                    .or_else(|| n.as_f64().and_then(Decimal::from_f64))
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("number out of range: {}", n)))
            }
        }
        Some(Value::String(s)) => {
            let trimmed = s.trim().replace(',', "");
            if trimmed.is_empty() {
                return Ok(None);
            }
            Decimal::from_str(&trimmed)
                .or_else(|_| Decimal::from_scientific(&trimmed))
                .map(Some)
                .map_err(|_| de::Error::custom(format!("invalid number: {:?}", s)))
        }
        Some(other) => Err(de::Error::custom(format!(
            "expected a number, got {}",
            type_name(&other)
        ))),
    }
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid integer: {}", n))),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f.trunc() as i64))
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid integer: {:?}", s)))
        }
        Some(other) => Err(de::Error::custom(format!(
            "expected an integer, got {}",
            type_name(&other)
        ))),
    }
}

fn lenient_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_i64(deserializer)?
        .map(|v| i32::try_from(v).map_err(|_| de::Error::custom(format!("integer out of range: {}", v))))
        .transpose()
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(b),
        Some(Value::Number(n)) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Ok(true),
            "false" | "no" | "n" | "0" | "" => Ok(false),
            _ => Err(de::Error::custom(format!("invalid boolean: {:?}", s))),
        },
        Some(other) => Err(de::Error::custom(format!(
            "expected a boolean, got {}",
            type_name(&other)
        ))),
    }
}

/// Accepts ISO dates (optionally with a time part) and the two day-first
/// formats the upstream forms emit.
pub fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    let date_part = raw.split(['T', ' ']).next().unwrap_or(raw);
    ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn header_is_required() {
        let doc = ReportDocument::from_value(json!({"existing_loan_details_details": {}})).unwrap();
        assert!(matches!(
            doc.header(),
            Err(IngestError::MissingSection("what_you_want_details"))
        ));
    }

    #[test]
    fn document_must_be_an_object() {
        assert!(ReportDocument::from_value(json!([1, 2])).is_err());
        let nested = ReportDocument::from_value(json!("{\"what_you_want_details\": {}}"));
        assert!(nested.is_ok());
    }

    #[test]
    fn numbers_accept_strings_and_numbers() {
        let entry: TermLoanEntry = parse_entry(&json!({
            "loan_amt": "1,50,000.50",
            "emi_amt": 1200,
            "int_rate": 9.5,
            "num_installments": "36",
            "is_secure": "true"
        }))
        .unwrap();
        assert_eq!(entry.loan_amt, Some(dec("150000.50")));
        assert_eq!(entry.emi_amt, Some(dec("1200")));
        assert_eq!(entry.int_rate, Some(dec("9.5")));
        assert_eq!(entry.num_installments, Some(36));
        assert!(entry.is_secure);
    }

    #[test]
    fn null_bank_is_treated_as_missing() {
        let entry: TermLoanEntry = parse_entry(&json!({"bank": null, "loan_amt": 5})).unwrap();
        assert!(entry.bank.name.is_none());
    }

    #[test]
    fn malformed_entry_fails_alone() {
        let doc = ReportDocument::from_value(json!({
            "existing_loan_details_details": {
                "term_loan_details": [{"loan_amt": "abc"}, {"loan_amt": 10}]
            }
        }))
        .unwrap();
        let parsed: Vec<Result<TermLoanEntry, _>> =
            doc.existing_term_loans().iter().map(parse_entry).collect();
        assert!(parsed[0].is_err());
        assert!(parsed[1].is_ok());
    }

    #[test]
    fn od_limits_become_year_map() {
        let entry: OdCcEntry = parse_entry(&json!({
            "od_limits": [{"year": 2023, "limit": 500000}, {"year": "2024", "limit": 750000}]
        }))
        .unwrap();
        assert_eq!(
            entry.od_limits_json(),
            json!({"2023": 500000, "2024": 750000})
        );
    }

    #[test]
    fn assumption_accepts_list_or_object() {
        let as_list = ReportDocument::from_value(json!({
            "assumption_details": {"assumption_details": [{"itr_version": "ITR3"}, {"itr_version": "ITR4"}]}
        }))
        .unwrap();
        assert_eq!(as_list.assumption()["itr_version"], "ITR3");

        let as_object = ReportDocument::from_value(json!({
            "assumption_details": {"assumption_details": {"itr_version": "ITR5"}}
        }))
        .unwrap();
        assert_eq!(as_object.assumption()["itr_version"], "ITR5");

        let missing = ReportDocument::from_value(json!({})).unwrap();
        assert_eq!(missing.assumption(), json!({}));
    }

    #[test]
    fn enhancements_fall_back_to_user_input() {
        let doc = ReportDocument::from_value(json!({
            "user_input": {"proposed_loan_details": {"od_cc_enhancement_details": [{"name": "CC"}]}}
        }))
        .unwrap();
        assert_eq!(doc.od_cc_enhancements().len(), 1);
    }

    #[test]
    fn dates_parse_in_known_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 4, 1);
        assert_eq!(parse_date(Some("2023-04-01")), expected);
        assert_eq!(parse_date(Some("2023-04-01T00:00:00.000Z")), expected);
        assert_eq!(parse_date(Some("01-04-2023")), expected);
        assert_eq!(parse_date(Some("01/04/2023")), expected);
        assert_eq!(parse_date(Some("April 2023")), None);
        assert_eq!(parse_date(None), None);
    }
}
