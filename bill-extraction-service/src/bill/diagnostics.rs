//! Comparison of the reconciled amount with totals printed on the bill.

use super::types::Fixed2;

/// Grand total the model read off a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintedTotal {
    pub page_no: String,
    pub value: Fixed2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotalCheck {
    pub page_no: String,
    pub printed_total: Fixed2,
    /// `printed_total - reconciled_amount`
    pub delta: Fixed2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotalsDiagnostics {
    pub reconciled_amount: Fixed2,
    pub checks: Vec<TotalCheck>,
}

impl TotalsDiagnostics {
    /// True when some printed total equals the reconciled amount exactly.
    pub fn has_match(&self) -> bool {
        self.checks.iter().any(|check| check.delta.is_zero())
    }

    /// Check with the smallest absolute delta
    pub fn closest(&self) -> Option<&TotalCheck> {
        self.checks
            .iter()
            .min_by_key(|check| check.delta.abs())
    }
}

pub fn verify_printed_totals(
    reconciled_amount: Fixed2,
    printed_totals: &[PrintedTotal],
) -> TotalsDiagnostics {
    let checks = printed_totals
        .iter()
        .map(|printed| TotalCheck {
            page_no: printed.page_no.clone(),
            printed_total: printed.value.clone(),
            delta: &printed.value - &reconciled_amount,
        })
        .collect();

    TotalsDiagnostics {
        reconciled_amount,
        checks,
    }
}
