//! Bill line items, pages and the fixed-point numbers they carry.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

use bigdecimal::num_bigint::{BigInt, Sign};
use bigdecimal::{BigDecimal, RoundingMode};
use serde::{Serialize, Serializer};
use serde_json::Value;
use serde_json::value::RawValue;

/// Amount prefixes stripped before parsing, matched without regard to case.
const CURRENCY_PREFIXES: [&str; 3] = ["inr", "rs.", "rs"];

/// Exponents beyond this are not amounts anyone printed on a bill.
const MAX_EXPONENT: i64 = 64;

/// Decimal value with exactly two fractional digits.
///
/// Always held at scale 2, so equal amounts hash equally. Serializes as a
/// JSON number that always shows both fractional digits (`448.00`, `-12.50`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fixed2(BigDecimal);

impl Fixed2 {
    pub fn zero() -> Self {
        Self::from_hundredths(0)
    }

    pub fn from_hundredths(hundredths: i64) -> Self {
        Self(BigDecimal::new(BigInt::from(hundredths), 2))
    }

    /// Round to two places, half away from zero.
    pub fn from_decimal(value: &BigDecimal) -> Self {
        Self(value.with_scale_round(2, RoundingMode::HalfUp))
    }

    /// Parse a printed numeric value such as `"1,234.50"`, `"₹ 99"`, `"rs.150"`
    /// or `"1.5e3"`.
    ///
    /// Currency symbols, thousands separators and whitespace are ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let cleaned: String = text
            .chars()
            .filter(|c| !c.is_whitespace() && !matches!(c, ',' | '₹' | '$' | '€' | '£' | '¥'))
            .collect();

        let value = BigDecimal::from_str(strip_currency_prefix(&cleaned)).ok()?;
        let (_, exponent) = value.as_bigint_and_exponent();
        if exponent.abs() > MAX_EXPONENT {
            return None;
        }
        Some(Self::from_decimal(&value))
    }

    /// Interpret a JSON value reported by the model (number or numeric string).
    ///
    /// Numbers go through their shortest printed form, so `1.005` rounds as written.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => Self::parse(&number.to_string()),
            Value::String(text) => Self::parse(text),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.0.sign() == Sign::NoSign
    }

    pub fn abs(&self) -> Fixed2 {
        Self(self.0.abs())
    }
}

fn strip_currency_prefix(text: &str) -> &str {
    CURRENCY_PREFIXES
        .iter()
        .find_map(|prefix| {
            text.get(..prefix.len())
                .filter(|head| head.eq_ignore_ascii_case(prefix))
                .map(|_| &text[prefix.len()..])
        })
        .unwrap_or(text)
}

impl Default for Fixed2 {
    fn default() -> Self {
        Self::zero()
    }
}

impl Add<&Fixed2> for Fixed2 {
    type Output = Fixed2;

    fn add(self, other: &Fixed2) -> Fixed2 {
        Fixed2(self.0 + &other.0)
    }
}

impl Sub for &Fixed2 {
    type Output = Fixed2;

    fn sub(self, other: &Fixed2) -> Fixed2 {
        Fixed2(&self.0 - &other.0)
    }
}

impl fmt::Display for Fixed2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (hundredths, _) = self.0.with_scale(2).into_bigint_and_exponent();
        let sign = if hundredths.sign() == Sign::Minus { "-" } else { "" };
        let magnitude = if hundredths.sign() == Sign::Minus {
            -hundredths
        } else {
            hundredths
        };
        write!(f, "{}{}.{:02}", sign, &magnitude / 100u32, &magnitude % 100u32)
    }
}

impl Serialize for Fixed2 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = RawValue::from_string(self.to_string()).map_err(serde::ser::Error::custom)?;
        raw.serialize(serializer)
    }
}

/// Page classification reported by the model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum PageType {
    #[serde(rename = "Pharmacy")]
    Pharmacy,
    #[serde(rename = "Bill Detail")]
    BillDetail,
    #[serde(rename = "Final Bill")]
    FinalBill,
    #[default]
    #[serde(rename = "Other")]
    Other,
}

impl PageType {
    /// Lenient parse: ignores case, spacing and punctuation. Unknown labels are `Other`.
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "pharmacy" => PageType::Pharmacy,
            "billdetail" | "billdetails" => PageType::BillDetail,
            "finalbill" => PageType::FinalBill,
            _ => PageType::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PageType::Pharmacy => "Pharmacy",
            PageType::BillDetail => "Bill Detail",
            PageType::FinalBill => "Final Bill",
            PageType::Other => "Other",
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority class of a crop. Wider context reads rows more completely,
/// so earlier tiers win during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CropTier {
    FullPage,
    Column,
    Window,
}

impl CropTier {
    pub fn as_str(self) -> &'static str {
        match self {
            CropTier::FullPage => "full_page",
            CropTier::Column => "column",
            CropTier::Window => "sliding_window",
        }
    }
}

/// A single reconciled bill line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillItem {
    #[serde(rename = "item_name")]
    pub name: String,
    #[serde(rename = "item_amount")]
    pub amount: Option<Fixed2>,
    #[serde(rename = "item_rate")]
    pub rate: Option<Fixed2>,
    #[serde(rename = "item_quantity")]
    pub quantity: Option<Fixed2>,
}

/// Deduplicated items of one source page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageResult {
    pub page_no: String,
    pub page_type: PageType,
    #[serde(rename = "bill_items")]
    pub items: Vec<BillItem>,
}

/// Final page-grouped result of one extraction request.
///
/// Only built by [`super::aggregate`]; the counts always agree with `pages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciledDocument {
    #[serde(rename = "pagewise_line_items")]
    pub(super) pages: Vec<PageResult>,
    pub(super) total_item_count: usize,
    #[serde(skip)]
    pub(super) reconciled_amount: Fixed2,
}

impl ReconciledDocument {
    pub fn pages(&self) -> &[PageResult] {
        &self.pages
    }

    pub fn total_item_count(&self) -> usize {
        self.total_item_count
    }

    /// Sum of every non-null item amount. Internal diagnostics only.
    pub fn reconciled_amount(&self) -> Fixed2 {
        self.reconciled_amount.clone()
    }
}

/// Token counters summed across model calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            total_tokens: input_tokens.saturating_add(output_tokens),
            input_tokens,
            output_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: TokenUsage) {
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}
