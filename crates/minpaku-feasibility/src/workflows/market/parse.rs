//! Layered parsing of the search oracle's dual-JSON reply and of the loose
//! currency strings it contains.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

const NOT_AVAILABLE: &str = "N/A";
const PLACEHOLDER_TITLES: &[&str] = &["該当物件なし", "N/A", "物件が見つかりませんでした"];
pub(crate) const SUMMARY_MEDIAN_KEY: &str = "平均単価_中央値";

static LISTING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?s)```json\s*(\[.*?\])\s*```",
        r#"(?s)(\[.*?"url".*?"validated".*?\])"#,
        r"(?s)(\[.*?\])\s*\{",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("valid listing regex"))
    .collect()
});

static SUMMARY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?s)```json\s*(\{.*?"平均単価_中央値".*?\})\s*```"#,
        r#"(\{[^{}]*"平均単価_中央値"[^{}]*\})"#,
        r#"(?s)(\{.*?"平均単価_中央値".*?\})"#,
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("valid summary regex"))
    .collect()
});

static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[¥￥]?([0-9,]+).*?[¥￥]?([0-9,]+)").expect("valid range regex"));
static PER_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*[^\d\s×xX*]*\s*[×xX*]\s*[¥￥]?\s*([\d,]+(?:\.\d+)?)")
        .expect("valid per-item regex")
});
static PER_UNIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[¥￥]?\s*([\d,]+(?:\.\d+)?)\s*円?\s*/\s*(\d+(?:\.\d+)?)")
        .expect("valid per-unit regex")
});

/// `"¥12,000"`, `"12000円"` or `"N/A"` as a number; anything unreadable is 0.
pub fn parse_currency(text: &str) -> f64 {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|ch| !matches!(ch, '¥' | '￥' | ',' | '円') && !ch.is_whitespace())
        .collect();
    if cleaned.eq_ignore_ascii_case(NOT_AVAILABLE) {
        return 0.0;
    }
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite()).unwrap_or(0.0)
}

/// `"¥8,000〜¥25,000"` as `(8000, 25000)`; `(0, 0)` when no two figures
/// can be found.
pub fn parse_price_range(text: &str) -> (f64, f64) {
    RANGE_RE
        .captures(text)
        .map(|caps| (parse_currency(&caps[1]), parse_currency(&caps[2])))
        .unwrap_or((0.0, 0.0))
}

/// Digits of a count such as `"12件"`, 0 when there are none.
pub fn parse_count(text: &str) -> u32 {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// Per-unit price from ratio notations: `"2本×¥10,000"` is 10000 each and
/// `"¥30,000/2泊"` is 15000 per night. Plain figures pass through.
pub fn parse_unit_price(text: &str) -> f64 {
    if let Some(caps) = PER_ITEM_RE.captures(text) {
        return parse_currency(&caps[2]);
    }
    if let Some(caps) = PER_UNIT_RE.captures(text) {
        let total = parse_currency(&caps[1]);
        let units: f64 = caps[2].parse().unwrap_or(0.0);
        return if units > 0.0 { total / units } else { 0.0 };
    }
    parse_currency(text)
}

/// One comparable listing as reported by the search oracle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSample {
    #[serde(deserialize_with = "lenient::text")]
    pub url: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub title: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub summary: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub room_id: Option<String>,
    #[serde(deserialize_with = "lenient::number")]
    pub area_m2: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub listed_capacity: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub estimated_guests: Option<f64>,
    #[serde(deserialize_with = "lenient::price")]
    pub price_per_night: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub reviews_count: Option<f64>,
    #[serde(deserialize_with = "lenient::text")]
    pub source: Option<String>,
    #[serde(deserialize_with = "lenient::flag")]
    pub validated: bool,
    #[serde(deserialize_with = "lenient::text")]
    pub notes: Option<String>,
}

impl ListingSample {
    pub fn has_real_title(&self) -> bool {
        self.title
            .as_deref()
            .map(str::trim)
            .is_some_and(|title| !title.is_empty() && !PLACEHOLDER_TITLES.contains(&title))
    }

    pub fn price(&self) -> f64 {
        self.price_per_night.unwrap_or(0.0)
    }

    /// A real title backed by either a validated source or a positive price.
    pub fn counts_as_found(&self) -> bool {
        self.has_real_title() && (self.validated || self.price() > 0.0)
    }
}

/// The oracle's own aggregate, kept as reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSummary {
    #[serde(rename = "平均単価_中央値", deserialize_with = "lenient::text")]
    pub median: Option<String>,
    #[serde(rename = "価格範囲", deserialize_with = "lenient::text")]
    pub price_range: Option<String>,
    #[serde(rename = "宿泊件数", deserialize_with = "lenient::text")]
    pub listing_count: Option<String>,
    #[serde(rename = "人気度メモ", deserialize_with = "lenient::text")]
    pub popularity_memo: Option<String>,
    #[serde(rename = "推定根拠", deserialize_with = "lenient::text")]
    pub basis: Option<String>,
}

impl MarketSummary {
    pub fn median_value(&self) -> f64 {
        self.median.as_deref().map(parse_currency).unwrap_or(0.0)
    }

    pub fn count_value(&self) -> u32 {
        self.listing_count.as_deref().map(parse_count).unwrap_or(0)
    }

    pub fn reports_listings(&self) -> bool {
        self.count_value() > 0 || self.median_value() > 0.0
    }
}

/// Both JSON documents of one search reply. Either may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchReply {
    pub listings: Vec<ListingSample>,
    pub summary: Option<MarketSummary>,
}

impl SearchReply {
    pub fn parse(text: &str) -> Self {
        Self {
            listings: extract_listings(text),
            summary: extract_summary(text),
        }
    }

    /// A level succeeds when it produced a believable listing or the
    /// summary reports a positive count or price.
    pub fn is_valid(&self) -> bool {
        self.listings.iter().any(ListingSample::counts_as_found)
            || self.summary.as_ref().is_some_and(MarketSummary::reports_listings)
    }
}

/// First pattern whose capture decodes to a non-empty array wins. Entries
/// that are not objects are dropped.
pub fn extract_listings(text: &str) -> Vec<ListingSample> {
    LISTING_PATTERNS
        .iter()
        .filter_map(|pattern| pattern.captures(text))
        .filter_map(|caps| serde_json::from_str::<Vec<Value>>(&caps[1]).ok())
        .find(|entries| !entries.is_empty())
        .map(|entries| {
            entries
                .into_iter()
                .filter(Value::is_object)
                .filter_map(|entry| serde_json::from_value(entry).ok())
                .collect()
        })
        .unwrap_or_default()
}

pub fn extract_summary(text: &str) -> Option<MarketSummary> {
    SUMMARY_PATTERNS
        .iter()
        .filter_map(|pattern| pattern.captures(text))
        .filter_map(|caps| serde_json::from_str::<Map<String, Value>>(&caps[1]).ok())
        .find(|object| object.contains_key(SUMMARY_MEDIAN_KEY))
        .and_then(|object| serde_json::from_value(Value::Object(object)).ok())
}

mod lenient {
    use super::*;

    pub(super) fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(text)) => Some(text.trim().to_string()),
            Some(Value::Number(number)) => Some(number.to_string()),
            _ => None,
        })
    }

    pub(super) fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Number(number)) => number.as_f64(),
            Some(Value::String(text)) => Some(parse_currency(&text)).filter(|value| *value > 0.0),
            _ => None,
        })
    }

    pub(super) fn price<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Number(number)) => number.as_f64(),
            Some(Value::String(text)) => Some(parse_unit_price(&text)),
            _ => None,
        })
    }

    pub(super) fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Bool(flag)) => flag,
            Some(Value::String(text)) => text.trim().eq_ignore_ascii_case("true"),
            _ => false,
        })
    }
}
