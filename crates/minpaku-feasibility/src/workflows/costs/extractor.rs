//! Lease figures read from flyer text: rent, management fee and the move-in
//! costs (deposit, key money, brokerage, guarantee, fire insurance).
//!
//! The oracle's JSON answer is tried first. The regex ladder below covers an
//! unavailable oracle or an unusable answer. Figures quoted in months of
//! rent are only converted when the rent is known; otherwise they are 0.

use super::{first_json_object, LeaseCosts, RentFigures};
use crate::oracle::ReasoningOracle;
use crate::workflows::legal::is_error_shaped;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{info, warn};

const NONE_MARKERS: &[&str] = &["なし", "無し", "0", "0円", "なし。", "無し。"];
const MONTH_UNIT: &str = r"\s*[ヶケヵか]?\s*[月分]";

static MONTHS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"([0-9]+(?:\.[0-9]+)?){MONTH_UNIT}")).expect("valid months regex")
});
static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)\s*[%％]").expect("valid percent regex"));
static DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9][0-9,]*").expect("valid digits regex"));
static RENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:賃料|家賃)[：:\s]*([0-9][0-9,]*(?:\.[0-9]+)?)\s*(万)?").expect("valid rent regex")
});
static MANAGEMENT_FEE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:管理費|共益費)[：:\s]*([0-9][0-9,]*(?:\.[0-9]+)?)\s*(万)?")
        .expect("valid management fee regex")
});
static GUARANTEE_PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"初回保証料[:：]?\s*月額総賃料\s*([0-9]+(?:\.[0-9]+)?)\s*[%％]?")
        .expect("valid guarantee percent regex")
});

/// Regexes for one move-in cost: literal yen figures in priority order and
/// an optional months-of-rent notation, which is checked first.
struct FeeLadder {
    literal: Vec<Regex>,
    months: Option<Regex>,
}

impl FeeLadder {
    fn new(literal: &[&str], months_prefix: Option<&str>) -> Self {
        Self {
            literal: literal
                .iter()
                .map(|pattern| Regex::new(pattern).expect("valid fee regex"))
                .collect(),
            months: months_prefix.map(|prefix| {
                Regex::new(&format!(r"{prefix}[：:\s]*([0-9]+(?:\.[0-9]+)?){MONTH_UNIT}"))
                    .expect("valid fee months regex")
            }),
        }
    }

    fn read(&self, text: &str, rent: u64) -> Option<u64> {
        if let Some(months) = self.months.as_ref().and_then(|re| re.captures(text)) {
            return Some(months_of_rent(&months[1], rent));
        }
        self.literal
            .iter()
            .find_map(|re| re.captures(text))
            .and_then(|caps| parse_yen(&caps[1]))
    }
}

static DEPOSIT: LazyLock<FeeLadder> = LazyLock::new(|| {
    FeeLadder::new(
        &[r"敷金[：:]\s*([0-9,]+)", r"敷[：:]\s*([0-9,]+)", r"敷金\s*([0-9,]+)"],
        Some("敷金"),
    )
});
static KEY_MONEY: LazyLock<FeeLadder> = LazyLock::new(|| {
    FeeLadder::new(
        &[r"礼金[：:]\s*([0-9,]+)", r"礼[：:]\s*([0-9,]+)", r"礼金\s*([0-9,]+)"],
        Some("礼金"),
    )
});
static BROKERAGE: LazyLock<FeeLadder> = LazyLock::new(|| {
    FeeLadder::new(
        &[r"仲介(?:手数料)?[：:]\s*([0-9,]+)", r"仲介手数料\s*([0-9,]+)"],
        Some("仲介(?:手数料)?"),
    )
});
static GUARANTEE: LazyLock<FeeLadder> = LazyLock::new(|| {
    FeeLadder::new(
        &[
            r"保証(?:会社)?[：:]\s*([0-9,]+)",
            r"保証会社\s*([0-9,]+)",
            r"保証金[：:]\s*([0-9,]+)",
        ],
        Some("保証(?:会社|金)?"),
    )
});
static FIRE_INSURANCE: LazyLock<FeeLadder> = LazyLock::new(|| {
    FeeLadder::new(
        &[
            r"火災保険[：:]\s*([0-9,]+)",
            r"火災(?:保険)?[：:]\s*([0-9,]+)",
            r"火災保険\s*([0-9,]+)",
        ],
        None,
    )
});

fn parse_yen(digits: &str) -> Option<u64> {
    digits.replace(',', "").parse().ok()
}

/// `months × rent`, rounded; 0 whenever the rent is unknown.
pub fn months_of_rent(months: &str, rent: u64) -> u64 {
    if rent == 0 {
        return 0;
    }
    months
        .parse::<f64>()
        .map(|months| (months * rent as f64).round().max(0.0) as u64)
        .unwrap_or(0)
}

/// One cost value as the oracle wrote it: a number, a yen string, a
/// months-of-rent string or a percentage of rent.
pub fn parse_cost_value(raw: &Value, rent: u64) -> u64 {
    match raw {
        Value::Number(number) => number
            .as_f64()
            .filter(|value| value.is_finite() && *value > 0.0)
            .map(|value| value.round() as u64)
            .unwrap_or(0),
        Value::String(text) => parse_cost_text(text, rent),
        _ => 0,
    }
}

pub fn parse_cost_text(text: &str, rent: u64) -> u64 {
    let text = text.trim();
    if NONE_MARKERS.contains(&text) {
        return 0;
    }
    if let Some(caps) = MONTHS_RE.captures(text) {
        return months_of_rent(&caps[1], rent);
    }
    if let Some(caps) = PERCENT_RE.captures(text) {
        let share: f64 = caps[1].parse().unwrap_or(0.0);
        return (rent as f64 * share / 100.0).round() as u64;
    }
    DIGITS_RE
        .find(text)
        .and_then(|found| parse_yen(found.as_str()))
        .unwrap_or(0)
}

/// Rent and management fee from flyer text alone. `8.5万` style figures
/// are read in units of 10,000 yen.
pub fn rent_from_text(text: &str) -> RentFigures {
    let read = |re: &Regex| {
        re.captures(text)
            .map(|caps| {
                let figure: f64 = caps[1].replace(',', "").parse().unwrap_or(0.0);
                let scale = if caps.get(2).is_some() { 10_000.0 } else { 1.0 };
                (figure * scale).round() as u64
            })
            .unwrap_or(0)
    };
    RentFigures {
        rent: read(&RENT_RE),
        management_fee: read(&MANAGEMENT_FEE_RE),
    }
}

/// Move-in costs from flyer text alone, converting month notations with
/// `rent` (rent plus management fee).
pub fn lease_costs_from_text(text: &str, rent: u64) -> LeaseCosts {
    let guarantee = GUARANTEE.read(text, rent).or_else(|| {
        GUARANTEE_PERCENT_RE.captures(text).map(|caps| {
            let share: f64 = caps[1].parse().unwrap_or(0.0);
            (rent as f64 * share / 100.0).round() as u64
        })
    });

    LeaseCosts {
        deposit: DEPOSIT.read(text, rent).unwrap_or(0),
        key_money: KEY_MONEY.read(text, rent).unwrap_or(0),
        brokerage_fee: BROKERAGE.read(text, rent).unwrap_or(0),
        guarantee_company: guarantee.unwrap_or(0),
        fire_insurance: FIRE_INSURANCE.read(text, 0).unwrap_or(0),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LeaseExtractor<'a> {
    oracle: Option<&'a dyn ReasoningOracle>,
}

impl<'a> LeaseExtractor<'a> {
    pub fn new(oracle: Option<&'a dyn ReasoningOracle>) -> Self {
        Self { oracle }
    }

    pub fn rent(&self, text: &str) -> RentFigures {
        if text.trim().is_empty() {
            return RentFigures::default();
        }
        if let Some(object) = self.ask(&rent_prompt(text)) {
            let figures = RentFigures {
                rent: object.get("家賃").map(|v| parse_cost_value(v, 0)).unwrap_or(0),
                management_fee: object.get("管理費").map(|v| parse_cost_value(v, 0)).unwrap_or(0),
            };
            if figures.monthly_total() > 0 {
                info!(rent = figures.rent, management_fee = figures.management_fee, "rent extracted by oracle");
                return figures;
            }
        }
        rent_from_text(text)
    }

    pub fn lease_costs(&self, text: &str) -> LeaseCosts {
        if text.trim().is_empty() {
            return LeaseCosts::default();
        }
        let rent = self.rent(text).monthly_total();
        self.lease_costs_with_rent(text, rent)
    }

    /// Like [`Self::lease_costs`] with the monthly rent already known.
    pub fn lease_costs_with_rent(&self, text: &str, rent: u64) -> LeaseCosts {
        if let Some(object) = self.ask(&lease_prompt(text, rent)) {
            let value = |key: &str| object.get(key).map(|v| parse_cost_value(v, rent)).unwrap_or(0);
            let costs = LeaseCosts {
                deposit: value("敷金"),
                key_money: value("礼金"),
                brokerage_fee: value("仲介手数料"),
                guarantee_company: value("保証会社"),
                fire_insurance: value("火災保険"),
            };
            info!(total = costs.total(), "move-in costs extracted by oracle");
            return costs;
        }
        lease_costs_from_text(text, rent)
    }

    fn ask(&self, prompt: &str) -> Option<serde_json::Map<String, Value>> {
        let oracle = self.oracle?;
        match oracle.generate(prompt) {
            Ok(response) if !is_error_shaped(&response.text) => {
                let object = first_json_object(&response.text);
                if object.is_none() {
                    warn!("lease reply carried no JSON object; using text patterns");
                }
                object
            }
            Ok(response) => {
                warn!(reply = %response.text, "lease extraction returned an error reply");
                None
            }
            Err(err) => {
                warn!(error = %err, "lease extraction unavailable");
                None
            }
        }
    }
}

fn rent_prompt(text: &str) -> String {
    format!(
        r#"以下の不動産広告のテキストから、家賃と管理費を抽出してJSON形式で返してください。
各項目が見つからない場合は、該当する項目を0として返してください。

抽出テキスト:
{text}

抽出項目:
- 家賃: 月額家賃の金額（数値のみ、単位なし。見つからない場合は0）
- 管理費: 月額管理費の金額（数値のみ、単位なし。見つからない場合は0）

JSON形式で、以下の構造で返してください:
{{
  "家賃": 0,
  "管理費": 0
}}

数値のみを返してください。JSONのみを返してください。"#
    )
}

fn lease_prompt(text: &str, rent: u64) -> String {
    format!(
        r#"以下の不動産広告のテキストから、初期費用に関する項目を抽出し、必ず金額（円）で返してください。
月数や割合で書かれている場合は、賃料（推定: {rent}円/月）を用いて金額に変換してください。
（例: 敷金2ヶ月 → {rent}×2、礼金1ヶ月 → {rent}×1、仲介手数料1.1ヶ月 → {rent}×1.1、初回保証料:月額総賃料50% → {rent}×0.5）
「なし/無し/0円」は0としてください。数値のみを返してください。

抽出テキスト:
{text}

抽出項目:
- 敷金: 敷金の金額（円）。月数表記なら賃料×月数。なければ0。
- 礼金: 礼金の金額（円）。月数表記なら賃料×月数。なければ0。
- 仲介手数料: 仲介手数料の金額（円）。月数表記なら賃料×月数。なければ0。
- 保証会社: 保証会社の初回保証料の金額（円）。「月額総賃料50%」など割合なら賃料×割合で計算。なければ0。
- 火災保険: 火災保険の金額（円）。なければ0。

JSON形式で、以下の構造で返してください:
{{
  "敷金": 0,
  "礼金": 0,
  "仲介手数料": 0,
  "保証会社": 0,
  "火災保険": 0
}}

数値のみを返してください。JSONのみを返してください。"#
    )
}
