//! Integer codes stored by the upstream application for its enum columns.
//!
//! Labels are matched case-insensitively; unknown or missing labels fall back
//! to the first variant (code 0) so a typo never rejects a whole entry.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanType {
    TermLoan,
    BusinessLoan,
}

impl LoanType {
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
            // Upstream spelling.
            Some("bussiness_loan") => Self::BusinessLoan,
            _ => Self::TermLoan,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::TermLoan => 0,
            Self::BusinessLoan => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallmentType {
    Month,
    Year,
}

impl InstallmentType {
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
            Some("year") => Self::Year,
            _ => Self::Month,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Month => 0,
            Self::Year => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountType {
    Inr,
    Lakhs,
    Crores,
}

impl AmountType {
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
            Some("lakhs") => Self::Lakhs,
            Some("crores") => Self::Crores,
            _ => Self::Inr,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Inr => 0,
            Self::Lakhs => 1,
            Self::Crores => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearType {
    Actuals,
    Provisional,
    Projected,
}

impl YearType {
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
            Some("provisional") => Self::Provisional,
            Some("projected") => Self::Projected,
            _ => Self::Actuals,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Actuals => 0,
            Self::Provisional => 1,
            Self::Projected => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeoverType {
    OdCc,
    TermLoan,
}

impl TakeoverType {
    pub fn code(self) -> i32 {
        match self {
            Self::OdCc => 0,
            Self::TermLoan => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OdCc => "od_cc",
            Self::TermLoan => "term_loan",
        }
    }
}

/// `ITR1`..`ITR7` map to 1..7; anything else is 0.
pub fn itr_version_code(label: Option<&str>) -> i32 {
    let Some(label) = label else { return 0 };
    let upper = label.trim().to_ascii_uppercase();
    match upper.strip_prefix("ITR").and_then(|n| n.parse::<i32>().ok()) {
        Some(n) if (1..=7).contains(&n) && upper.len() == 4 => n,
        _ => 0,
    }
}

/// Row type written for OD/CC enhancements.
pub const OD_CC_ENHANCEMENT_TYPE: i32 = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_map_to_upstream_codes() {
        assert_eq!(LoanType::from_label(Some("bussiness_loan")).code(), 1);
        assert_eq!(LoanType::from_label(Some("term_loan")).code(), 0);
        assert_eq!(LoanType::from_label(None).code(), 0);
        assert_eq!(InstallmentType::from_label(Some("YEAR")).code(), 1);
        assert_eq!(AmountType::from_label(Some("Lakhs")).code(), 1);
        assert_eq!(AmountType::from_label(Some("crores")).code(), 2);
        assert_eq!(AmountType::from_label(Some("rupees")).code(), 0);
        assert_eq!(YearType::from_label(Some("Projected")).code(), 2);
        assert_eq!(TakeoverType::OdCc.code(), 0);
        assert_eq!(TakeoverType::TermLoan.code(), 1);
    }

    #[test]
    fn itr_versions() {
        assert_eq!(itr_version_code(Some("ITR3")), 3);
        assert_eq!(itr_version_code(Some("itr7")), 7);
        assert_eq!(itr_version_code(Some("ITR8")), 0);
        assert_eq!(itr_version_code(Some("ITR10")), 0);
        assert_eq!(itr_version_code(Some("")), 0);
        assert_eq!(itr_version_code(None), 0);
    }
}
