//! Deterministic reductions of a free-text Japanese address to the coarser
//! granularities used when a search has to be widened.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Official prefecture names in JIS order.
pub const PREFECTURES: [&str; 47] = [
    "北海道", "青森県", "岩手県", "宮城県", "秋田県", "山形県", "福島県", "茨城県", "栃木県",
    "群馬県", "埼玉県", "千葉県", "東京都", "神奈川県", "新潟県", "富山県", "石川県", "福井県",
    "山梨県", "長野県", "岐阜県", "静岡県", "愛知県", "三重県", "滋賀県", "京都府", "大阪府",
    "兵庫県", "奈良県", "和歌山県", "鳥取県", "島根県", "岡山県", "広島県", "山口県", "徳島県",
    "香川県", "愛媛県", "高知県", "福岡県", "佐賀県", "長崎県", "熊本県", "大分県", "宮崎県",
    "鹿児島県", "沖縄県",
];

/// Wide-area placeholder used when no prefecture can be read from the address.
pub const NATIONWIDE: &str = "日本";

static PREFECTURE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^都道府県]+[都道府県]").expect("valid prefecture regex"));
static CITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^市区]+[市区]").expect("valid city regex"));
static TOWN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^0-9０-９一二三四五六七八九十丁目]+町").expect("valid town regex")
});

/// Geographic granularity of a widening search, narrowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchLevel {
    Block,
    CityOrWard,
    WideArea,
}

impl SearchLevel {
    pub const fn ordered() -> [Self; 3] {
        [Self::Block, Self::CityOrWard, Self::WideArea]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Block => "町名",
            Self::CityOrWard => "市または区",
            Self::WideArea => "広域",
        }
    }
}

/// The raw address and its three derived search forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressForms {
    pub raw: String,
    pub block: String,
    pub city_or_ward: String,
    pub wide_area: String,
}

impl AddressForms {
    pub fn new(address: &str) -> Self {
        let raw = address.trim().to_string();
        Self {
            block: to_block(&raw),
            city_or_ward: to_city_or_ward(&raw),
            wide_area: to_wide_area(&raw),
            raw,
        }
    }

    /// Query string for one rung of the ladder. Empty forms fall through to
    /// the next coarser one that is populated.
    pub fn for_level(&self, level: SearchLevel) -> &str {
        let candidates: &[&str] = match level {
            SearchLevel::Block => &[&self.block, &self.city_or_ward, &self.raw],
            SearchLevel::CityOrWard => &[&self.city_or_ward, &self.raw],
            SearchLevel::WideArea => &[&self.wide_area],
        };
        candidates
            .iter()
            .copied()
            .find(|form| !form.is_empty())
            .unwrap_or(NATIONWIDE)
    }
}

/// Returns the official prefecture name the address starts with.
pub fn prefecture_of(address: &str) -> Option<&'static str> {
    let address = address.trim_start();
    PREFECTURES
        .iter()
        .copied()
        .find(|prefecture| address.starts_with(prefecture))
}

/// Splits the leading prefecture token from the rest of the address.
///
/// Official names are tried first so that `京都府` is not cut at its first
/// `都`; anything else ending in 都/道/府/県 is accepted as a fallback.
fn split_prefecture(address: &str) -> Option<(&str, &str)> {
    if let Some(prefecture) = prefecture_of(address) {
        let start = address.len() - address.trim_start().len();
        let end = start + prefecture.len();
        return Some((&address[..end], &address[end..]));
    }
    PREFECTURE_RE
        .find(address)
        .map(|found| (&address[..found.end()], &address[found.end()..]))
}

/// Prefecture + city/ward + town name (without 丁目 or lot numbers).
///
/// Falls back to prefecture + city when no town token follows the city, and
/// to the untouched address when no prefecture or city can be read.
pub fn to_block(address: &str) -> String {
    let Some((prefecture, rest)) = split_prefecture(address) else {
        return address.to_string();
    };
    let Some(city) = CITY_RE.find(rest) else {
        return address.to_string();
    };
    let after_city = &rest[city.end()..];
    match TOWN_RE.find(after_city) {
        Some(town) => format!("{prefecture}{}{}", city.as_str(), town.as_str().trim()),
        None => format!("{prefecture}{}", city.as_str()),
    }
}

/// Prefecture + first city or ward token.
pub fn to_city_or_ward(address: &str) -> String {
    let Some((prefecture, rest)) = split_prefecture(address) else {
        return address.to_string();
    };
    match CITY_RE.find(rest) {
        Some(city) => format!("{prefecture}{}", city.as_str()),
        None => address.to_string(),
    }
}

/// Prefecture name, or [`NATIONWIDE`] when none can be read.
pub fn to_wide_area(address: &str) -> String {
    split_prefecture(address)
        .map(|(prefecture, _)| prefecture.trim().to_string())
        .unwrap_or_else(|| NATIONWIDE.to_string())
}

/// Guest capacity implied by floor area: one guest per 12 m², between 1 and 10.
pub fn occupancy_from_area(area_m2: Option<f64>) -> u32 {
    match area_m2 {
        Some(area) if area > 0.0 && area.is_finite() => (area / 12.0).round().clamp(1.0, 10.0) as u32,
        _ => 1,
    }
}

/// Monday-to-Sunday stay window used to price comparable listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StayWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// First full week (Monday start) of the month two months after `today`.
pub fn next_next_month_week(today: NaiveDate) -> StayWindow {
    let months = today.year() * 12 + today.month0() as i32 + 2;
    let first = NaiveDate::from_ymd_opt(months.div_euclid(12), months.rem_euclid(12) as u32 + 1, 1)
        .unwrap_or(today);
    let offset = (7 + Weekday::Mon.num_days_from_monday() as i64
        - first.weekday().num_days_from_monday() as i64)
        % 7;
    let start = first + Duration::days(offset);
    StayWindow {
        start,
        end: start + Duration::days(6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coarsens_address_with_town() {
        let forms = AddressForms::new("大阪府大阪市北区梅田町1-2-3");
        assert_eq!(forms.block, "大阪府大阪市北区梅田町");
        assert_eq!(forms.city_or_ward, "大阪府大阪市");
        assert_eq!(forms.wide_area, "大阪府");
    }

    #[test]
    fn block_falls_back_to_city_without_town_token() {
        let forms = AddressForms::new("東京都渋谷区神宮前1-2-3");
        assert_eq!(forms.block, "東京都渋谷区");
        assert_eq!(forms.city_or_ward, "東京都渋谷区");
        assert_eq!(forms.wide_area, "東京都");
    }

    #[test]
    fn kyoto_prefecture_is_not_cut_at_first_to() {
        let forms = AddressForms::new("京都府京都市東山区祇園町南側570");
        assert_eq!(forms.wide_area, "京都府");
        assert_eq!(forms.city_or_ward, "京都府京都市");
        assert_eq!(forms.block, "京都府京都市東山区祇園町");
    }

    #[test]
    fn unknown_prefecture_keeps_raw_and_uses_nationwide() {
        let forms = AddressForms::new("渋谷区神宮前1-2-3");
        assert_eq!(forms.block, "渋谷区神宮前1-2-3");
        assert_eq!(forms.city_or_ward, "渋谷区神宮前1-2-3");
        assert_eq!(forms.wide_area, NATIONWIDE);
    }

    #[test]
    fn town_with_chome_stops_before_numbers() {
        assert_eq!(
            to_block("新潟県長岡市大手通二丁目6"),
            "新潟県長岡市"
        );
        assert_eq!(to_block("新潟県長岡市殿町1丁目2"), "新潟県長岡市殿町");
    }

    #[test]
    fn for_level_skips_empty_forms() {
        let forms = AddressForms::new("");
        assert_eq!(forms.for_level(SearchLevel::Block), NATIONWIDE);
        assert_eq!(forms.for_level(SearchLevel::WideArea), NATIONWIDE);
    }

    #[test]
    fn prefecture_lookup_requires_prefix() {
        assert_eq!(prefecture_of("北海道札幌市中央区"), Some("北海道"));
        assert_eq!(prefecture_of("札幌市中央区"), None);
    }

    #[test]
    fn occupancy_is_clamped() {
        assert_eq!(occupancy_from_area(None), 1);
        assert_eq!(occupancy_from_area(Some(0.0)), 1);
        assert_eq!(occupancy_from_area(Some(30.0)), 3);
        assert_eq!(occupancy_from_area(Some(6.0)), 1);
        assert_eq!(occupancy_from_area(Some(500.0)), 10);
    }

    #[test]
    fn stay_window_is_first_monday_two_months_out() {
        let today = NaiveDate::from_ymd_opt(2025, 11, 20).expect("valid date");
        let window = next_next_month_week(today);
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2026, 1, 5).expect("valid date"));
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2026, 1, 11).expect("valid date"));

        let today = NaiveDate::from_ymd_opt(2025, 7, 1).expect("valid date");
        let window = next_next_month_week(today);
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2025, 9, 1).expect("valid date"));
    }

    #[test]
    fn search_levels_are_narrow_to_wide() {
        let labels: Vec<_> = SearchLevel::ordered().iter().map(|level| level.label()).collect();
        assert_eq!(labels, vec!["町名", "市または区", "広域"]);
    }
}
