//! Takeover → existing loan matching.

use rust_decimal::Decimal;
use tracing::debug;

/// Default relative amount tolerance (1%).
pub const DEFAULT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// An existing loan inserted earlier in the same document.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertedLoan {
    pub id: i64,
    pub name: Option<String>,
    pub bank_name: String,
    pub amount: Decimal,
}

fn bank_names_overlap(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    a.contains(&b) || b.contains(&a)
}

/// Amounts whose difference or ratio overflows `Decimal` never match.
fn within_tolerance(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    let Some(diff) = a.checked_sub(b) else {
        return false;
    };
    let largest = a.max(b);
    if largest.is_zero() {
        return diff.is_zero();
    }
    diff.abs()
        .checked_div(largest.abs())
        .is_some_and(|ratio| ratio <= tolerance)
}

/// Every loan whose bank name overlaps `bank_name` (substring either way,
/// case-insensitive) and whose amount is within `tolerance` of `amount`,
/// in insertion order.
pub fn find_matching_loans<'a>(
    loans: &'a [InsertedLoan],
    bank_name: &str,
    amount: Decimal,
    tolerance: Decimal,
) -> Vec<&'a InsertedLoan> {
    loans
        .iter()
        .filter(|loan| {
            let matched = bank_names_overlap(bank_name, &loan.bank_name)
                && within_tolerance(loan.amount, amount, tolerance);
            if matched {
                debug!(
                    loan_id = loan.id,
                    loan_bank = %loan.bank_name,
                    loan_amount = %loan.amount,
                    "Found matching loan"
                );
            }
            matched
        })
        .collect()
}

/// Legacy fallback when a takeover carries no explicit target ids: the first
/// loan whose non-empty name appears in the takeover name, or that contains
/// the takeover name's last `-` segment.
pub fn find_loan_by_name<'a>(
    loans: &'a [InsertedLoan],
    takeover_name: &str,
) -> Option<&'a InsertedLoan> {
    let last_segment = takeover_name.rsplit('-').next().unwrap_or(takeover_name);
    loans.iter().find(|loan| match loan.name.as_deref() {
        Some(name) if !name.is_empty() => {
            takeover_name.contains(name) || name.contains(last_segment)
        }
        _ => false,
    })
}
