//! Merging of per-crop candidate lists into one item list per page.
//!
//! Every crop of a page is sent to the model separately, so one physical
//! bill row is usually reported several times. Two candidates describe the
//! same row iff their trimmed names are identical and their amounts are
//! equal, where a missing amount only equals another missing amount.
//! The first occurrence in crop priority order wins outright.

use std::collections::HashSet;

use tracing::debug;

use super::candidates::CandidateItem;
use super::types::{BillItem, CropTier, Fixed2, PageResult, PageType, ReconciledDocument};

/// Candidates extracted from one crop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateList {
    pub tier: CropTier,
    /// Position of the crop in its page's crop plan; breaks ties within a tier
    pub ordinal: usize,
    pub items: Vec<CandidateItem>,
}

impl CandidateList {
    pub fn new(tier: CropTier, ordinal: usize, items: Vec<CandidateItem>) -> Self {
        Self {
            tier,
            ordinal,
            items,
        }
    }

    /// Contribution of a crop whose extraction failed
    pub fn empty(tier: CropTier, ordinal: usize) -> Self {
        Self::new(tier, ordinal, Vec::new())
    }
}

type DedupKey = (String, Option<Fixed2>);

/// Reconcile all candidate lists of one page.
///
/// Lists are visited full page first, then columns, then sliding windows,
/// each tier in crop ordinal order, so the output does not depend on the
/// order in which crop extractions finished.
pub fn reconcile(
    page_no: impl Into<String>,
    page_type: PageType,
    mut candidate_lists: Vec<CandidateList>,
) -> PageResult {
    let page_no = page_no.into();
    candidate_lists.sort_by_key(|list| (list.tier, list.ordinal));

    let mut seen: HashSet<DedupKey> = HashSet::new();
    let mut items = Vec::new();
    let mut unnamed = 0usize;
    let mut duplicates = 0usize;

    for list in candidate_lists {
        for candidate in list.items {
            let Some(item) = candidate.into_bill_item() else {
                unnamed += 1;
                continue;
            };
            if seen.insert((item.name.clone(), item.amount.clone())) {
                items.push(item);
            } else {
                duplicates += 1;
            }
        }
    }

    debug!(
        page_no = %page_no,
        kept = items.len(),
        duplicates,
        unnamed,
        "Reconciled page candidates"
    );

    PageResult {
        page_no,
        page_type,
        items,
    }
}

/// Combine reconciled pages into the document result.
///
/// Items are counted per page; the same item on two pages counts twice,
/// since bills legitimately repeat charges across pages.
pub fn aggregate(pages: Vec<PageResult>) -> ReconciledDocument {
    let total_item_count = pages.iter().map(|page| page.items.len()).sum();
    let reconciled_amount = pages
        .iter()
        .flat_map(|page| &page.items)
        .filter_map(|item: &BillItem| item.amount.as_ref())
        .fold(Fixed2::zero(), |sum, amount| sum + amount);

    debug!(
        pages = pages.len(),
        total_item_count,
        reconciled_amount = %reconciled_amount,
        "Aggregated document"
    );

    ReconciledDocument {
        pages,
        total_item_count,
        reconciled_amount,
    }
}
