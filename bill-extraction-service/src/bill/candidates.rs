//! Parsing of raw model replies into candidate line items.
//!
//! Models wrap JSON in markdown fences, prepend prose, return numbers as
//! strings or drop fields. Parsing is lenient per item: one broken item never
//! discards the rest of the crop's reply.

use serde_json::{Map, Value};
use tracing::debug;

use super::types::{BillItem, Fixed2, PageType};
use crate::error::ModelError;

/// A line item as reported for a single crop, before deduplication
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateItem {
    pub name: Option<String>,
    pub amount: Option<Fixed2>,
    pub rate: Option<Fixed2>,
    pub quantity: Option<Fixed2>,
}

impl CandidateItem {
    #[cfg(test)]
    pub fn new(name: impl Into<String>, amount: Option<Fixed2>) -> Self {
        Self {
            name: Some(name.into()),
            amount,
            ..Self::default()
        }
    }

    /// Read one element of a `bill_items` array. Non-objects yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let name = first_field(object, &["item_name", "name"])
            .and_then(Value::as_str)
            .map(str::to_string);
        let number =
            |keys: &[&str]| first_field(object, keys).and_then(Fixed2::from_json);

        Some(Self {
            name,
            amount: number(&["item_amount", "amount"]),
            rate: number(&["item_rate", "rate"]),
            quantity: number(&["item_quantity", "quantity", "qty"]),
        })
    }

    /// Promote to a bill item. Items without a usable name cannot be
    /// deduplicated or displayed, so they are rejected here.
    pub fn into_bill_item(self) -> Option<BillItem> {
        let name = self.name?.trim().to_string();
        if name.is_empty() {
            return None;
        }
        Some(BillItem {
            name,
            amount: self.amount,
            rate: self.rate,
            quantity: self.quantity,
        })
    }
}

impl From<BillItem> for CandidateItem {
    fn from(item: BillItem) -> Self {
        Self {
            name: Some(item.name),
            amount: item.amount,
            rate: item.rate,
            quantity: item.quantity,
        }
    }
}

/// Everything usable from one model reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReply {
    pub page_type: Option<PageType>,
    pub items: Vec<CandidateItem>,
    /// Grand total printed on the page, when the model reported one
    pub printed_total: Option<Fixed2>,
}

/// Parse a model reply into candidates.
///
/// Accepts an object carrying `bill_items` (or `items`), or a bare array of items.
pub fn parse_model_reply(text: &str) -> Result<ParsedReply, ModelError> {
    let body = strip_code_fences(text);
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(source) => match embedded_object(body) {
            Some(inner) => serde_json::from_str(inner)
                .map_err(|source| ModelError::InvalidResponse { source })?,
            None => return Err(ModelError::InvalidResponse { source }),
        },
    };

    match value {
        Value::Array(items) => Ok(ParsedReply {
            items: collect_items(&items),
            ..ParsedReply::default()
        }),
        Value::Object(object) => {
            let items = match first_field(&object, &["bill_items", "items"]) {
                Some(Value::Array(items)) => collect_items(items),
                Some(Value::Null) | None => Vec::new(),
                Some(other) => {
                    return Err(ModelError::MalformedOutput {
                        message: format!("bill_items is not an array: {}", json_kind(other)),
                    });
                }
            };
            let page_type = object
                .get("page_type")
                .and_then(Value::as_str)
                .map(PageType::from_label);
            let printed_total = object.get("printed_total").and_then(Fixed2::from_json);

            Ok(ParsedReply {
                page_type,
                items,
                printed_total,
            })
        }
        other => Err(ModelError::MalformedOutput {
            message: format!("expected an object or array, got {}", json_kind(&other)),
        }),
    }
}

fn collect_items(values: &[Value]) -> Vec<CandidateItem> {
    values
        .iter()
        .filter_map(|value| {
            let item = CandidateItem::from_json(value);
            if item.is_none() {
                debug!(kind = json_kind(value), "Skipping non-object bill item");
            }
            item
        })
        .collect()
}

fn first_field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| object.get(*key))
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// Outermost `{ ... }` span, for replies that wrap the JSON in prose.
fn embedded_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
