//! Field-level comparison of two stored reports.

use crate::services::database::Database;
use serde::Serialize;
use serde_json::Value;
use service_core::error::AppError;
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry {
    pub diff_key_path: String,
    pub value_1: Value,
    pub value_2: Value,
}

/// Every leaf where `a` and `b` differ. Keys missing on one side compare
/// against `null`; arrays compare by index.
pub fn diff_values(a: &Value, b: &Value) -> Vec<DiffEntry> {
    let mut diffs = Vec::new();
    walk("", a, b, &mut diffs);
    diffs
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn walk(path: &str, a: &Value, b: &Value, diffs: &mut Vec<DiffEntry>) {
    match (a, b) {
        (Value::Object(left), Value::Object(right)) => {
            let mut keys: Vec<&String> = left.keys().chain(right.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                walk(
                    &join_key(path, key),
                    left.get(key).unwrap_or(&Value::Null),
                    right.get(key).unwrap_or(&Value::Null),
                    diffs,
                );
            }
        }
        (Value::Array(left), Value::Array(right)) => {
            for i in 0..left.len().max(right.len()) {
                walk(
                    &format!("{}[{}]", path, i),
                    left.get(i).unwrap_or(&Value::Null),
                    right.get(i).unwrap_or(&Value::Null),
                    diffs,
                );
            }
        }
        _ if numbers_equal(a, b) || a == b => {}
        _ => diffs.push(DiffEntry {
            diff_key_path: path.to_string(),
            value_1: a.clone(),
            value_2: b.clone(),
        }),
    }
}

/// `1500` and `1500.00` come back from NUMERIC columns as different JSON
/// numbers; compare them by value.
fn numbers_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .zip(y.as_f64())
            .map(|(x, y)| x == y)
            .unwrap_or(false),
        _ => false,
    }
}

#[instrument(skip(db))]
pub async fn compare_reports(
    db: &Database,
    report_id_1: i64,
    report_id_2: i64,
) -> Result<Vec<DiffEntry>, AppError> {
    let first = db.report_snapshot(report_id_1).await?.ok_or_else(|| {
        AppError::NotFound(anyhow::anyhow!("Report {} not found", report_id_1))
    })?;
    let second = db.report_snapshot(report_id_2).await?.ok_or_else(|| {
        AppError::NotFound(anyhow::anyhow!("Report {} not found", report_id_2))
    })?;
    Ok(diff_values(&first, &second))
}
