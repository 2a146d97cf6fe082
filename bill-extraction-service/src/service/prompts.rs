//! Prompt text sent with every crop.

use crate::bill::{CropTier, PageType};
use crate::ingestion::crops::CropSpec;

pub(crate) const SYSTEM_PROMPT: &str = r#"You read images of medical and pharmacy bills and transcribe their line items as JSON.
Reply with one JSON object and nothing else: no commentary, no markdown.
Only report text that is visible in the image. Never invent items or numbers.
If an image shows any line items at all, report them; an empty list means the image has none."#;

const REPLY_SCHEMA: &str = r#"{
  "page_type": "Bill Detail" | "Final Bill" | "Pharmacy" | "Other",
  "printed_total": 1234.50 or null,
  "bill_items": [
    {"item_name": "string", "item_amount": 448.00 or null, "item_rate": 32.00 or null, "item_quantity": 14.00 or null}
  ]
}"#;

fn page_type_hint() -> String {
    [
        PageType::BillDetail,
        PageType::FinalBill,
        PageType::Pharmacy,
        PageType::Other,
    ]
    .iter()
    .map(|t| format!("\"{}\"", t))
    .collect::<Vec<_>>()
    .join(" | ")
}

fn region_description(spec: &CropSpec) -> &'static str {
    match spec.tier {
        CropTier::FullPage => "the whole page",
        CropTier::Column => "a vertical strip of the page; rows may be cut at its left or right edge",
        CropTier::Window => "a window over part of the page; rows may be cut at its edges",
    }
}

/// User prompt for one crop of a page.
pub(crate) fn crop_prompt(page_no: usize, spec: &CropSpec) -> String {
    let b = spec.bbox;
    format!(
        r#"Page {page_no}, crop "{id}": {region}, pixels ({x0},{y0})-({x1},{y1}).

Transcribe every bill line item in this image: medicines, services, tests, procedures, consultations, room and other charges.
- item_name: the description exactly as printed, whitespace trimmed. Join wrapped lines of the same row.
- item_amount: the net amount after discount for the row; in a table, the right-most number on the row.
- item_rate and item_quantity: as printed on the same row.
- Numbers: drop currency symbols and thousands separators, write two decimals. Use null when a value is missing or unreadable.
- Skip rows that are cut off so that their name or amount cannot be read.
- page_type: one of {page_types}.
- printed_total: the grand total printed on the page, or null.

Example: the row "Livi 300mg Tab   14   32.00   448.00" becomes
{{"item_name": "Livi 300mg Tab", "item_quantity": 14.00, "item_rate": 32.00, "item_amount": 448.00}}

Reply with:
{schema}"#,
        id = spec.id,
        region = region_description(spec),
        x0 = b.x0,
        y0 = b.y0,
        x1 = b.x1,
        y1 = b.y1,
        page_types = page_type_hint(),
        schema = REPLY_SCHEMA,
    )
}

/// Shorter prompt used once when the full page came back empty.
pub(crate) fn retry_prompt(page_no: usize) -> String {
    format!(
        r#"Page {page_no} of a medical bill. List every charged item you can see with its amount.
Use null for any number you cannot read. Reply with:
{schema}"#,
        schema = REPLY_SCHEMA,
    )
}
