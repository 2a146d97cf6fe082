//! Bill line items and their reconciliation.
//!
//! This module turns the per-crop candidate lists returned by the model into
//! the final page-grouped, deduplicated item list.

mod candidates;
mod diagnostics;
mod reconcile;
mod types;

pub use candidates::{CandidateItem, ParsedReply, parse_model_reply};
pub use diagnostics::{PrintedTotal, TotalsDiagnostics, verify_printed_totals};
pub use reconcile::{CandidateList, aggregate, reconcile};
pub use types::{
    BillItem, CropTier, Fixed2, PageResult, PageType, ReconciledDocument, TokenUsage,
};
