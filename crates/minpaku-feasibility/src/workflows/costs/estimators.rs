use super::{first_json_object, CostEstimate, PropertyProfile};
use crate::oracle::ReasoningOracle;
use crate::workflows::legal::{is_error_shaped, Requirements};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{info, warn};

static FIRST_FIGURE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9][0-9,]*").expect("valid figure regex"));

pub const INSURANCE_DEFAULT: u64 = 5_000;
const DEFAULT_NOTE: &str = "デフォルト値";

/// Cost items priced by the oracle from the property's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostItem {
    FireEquipment,
    Furniture,
    Utilities,
    Insurance,
    Cleaning,
    Supplies,
}

impl CostItem {
    pub fn ordered() -> [Self; 6] {
        [
            Self::FireEquipment,
            Self::Furniture,
            Self::Utilities,
            Self::Insurance,
            Self::Cleaning,
            Self::Supplies,
        ]
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::FireEquipment => "消防設備費用",
            Self::Furniture => "家具・家電購入費用",
            Self::Utilities => "水道光熱費",
            Self::Insurance => "保険費",
            Self::Cleaning => "清掃費",
            Self::Supplies => "消耗品費用",
        }
    }

    /// One-time purchases as opposed to monthly running costs.
    pub fn is_initial(self) -> bool {
        matches!(self, Self::FireEquipment | Self::Furniture)
    }

    /// Insurance has a real market floor; everything else defaults to 0.
    pub fn default_estimate(self) -> CostEstimate {
        match self {
            Self::Insurance => CostEstimate {
                cost: INSURANCE_DEFAULT,
                breakdown: DEFAULT_NOTE.to_string(),
            },
            _ => CostEstimate::default(),
        }
    }

    fn prompt(self, profile: &PropertyProfile, fire_code: Option<&Requirements>) -> String {
        let facts = profile.prompt_lines(self);
        match self {
            Self::FireEquipment => fire_equipment_prompt(fire_code),
            Self::Furniture => format!(
                r#"民泊開業に必要な家具・家電購入費用を推定してください。

物件情報:
{facts}

購入条件:
- コンセプト: 中価格帯
- ターゲット層: 訪日外国人観光客
- 想定購入先: IKEA、ニトリ、楽天市場、ビンテージショップ、リサイクルショップ

必要な家具・家電:
- ベッド
- テーブル・椅子
- 冷蔵庫
- 洗濯機
- エアコン
- テレビ
- その他必要な家具・家電

以下のJSON形式で返してください：
{{
  "cost": 2000000,
  "breakdown": "ベッド: ¥300,000、テーブル・椅子: ¥150,000、冷蔵庫: ¥80,000、洗濯機: ¥100,000、エアコン: ¥200,000、テレビ: ¥50,000、その他: ¥1,120,000"
}}

{tail}"#,
                tail = zero_tail(),
            ),
            Self::Utilities => format!(
                r#"民泊開業に必要な月額水道光熱費を推定してください。

物件情報:
{facts}

以下の項目を考慮してください：
- 電気代（エアコン、照明、家電など）
- ガス代（給湯、調理など）
- 水道代（洗濯、清掃、宿泊客の使用など）

以下のJSON形式で返してください：
{{
  "cost": 50000,
  "breakdown": "電気代: ¥30,000、ガス代: ¥10,000、水道代: ¥10,000"
}}

{tail}"#,
                tail = zero_tail(),
            ),
            Self::Insurance => format!(
                r#"民泊開業に必要な月額保険費を推定してください。

物件情報:
{facts}

以下の項目を考慮してください：
- 火災保険
- 個人賠償責任保険
- その他必要な保険

一般的な相場は月額¥3,000〜¥10,000程度です。物件規模や構造に応じて適切な金額を推定してください。

以下のJSON形式で返してください：
{{
  "cost": 5000,
  "breakdown": "火災保険: ¥3,000、個人賠償責任保険: ¥2,000"
}}

費用が見積もれない場合は {{"cost": 5000, "breakdown": "デフォルト値"}} を返してください（デフォルト¥5,000/月）。JSONのみを返してください。"#
            ),
            Self::Cleaning => format!(
                r#"民泊開業に必要な月額清掃費を推定してください。

物件情報:
{facts}

以下の項目を考慮してください：
- チェックアウト後の清掃費用（1回あたりの単価×回数）
- 月間の平均宿泊回数から清掃回数を推定
- 地域の清掃業者の相場

以下のJSON形式で返してください：
{{
  "cost": 30000,
  "breakdown": "清掃1回あたり: ¥5,000、月間清掃回数: 6回"
}}

{tail}"#,
                tail = zero_tail(),
            ),
            Self::Supplies => format!(
                r#"民泊開業に必要な月額消耗品費用を推定してください。

物件情報:
{facts}

以下の項目を考慮してください：
- トイレットペーパー、ティッシュペーパー
- 洗剤、柔軟剤
- タオル、バスタオル（消耗品としての交換）
- アメニティ（歯ブラシ、シャンプーなど）
- その他消耗品

以下のJSON形式で返してください：
{{
  "cost": 10000,
  "breakdown": "アメニティ: ¥5,000、洗剤類: ¥3,000、タオル交換: ¥2,000"
}}

{tail}"#,
                tail = zero_tail(),
            ),
        }
    }
}

fn zero_tail() -> &'static str {
    r#"費用が見積もれない場合は {"cost": 0, "breakdown": ""} を返してください。JSONのみを返してください。"#
}

fn fire_equipment_prompt(fire_code: Option<&Requirements>) -> String {
    let fire_info = fire_code
        .map(|requirements| {
            let lines: Vec<String> = requirements
                .fields
                .iter()
                .map(|field| format!("{}: {}", field.label, field.value))
                .collect();
            format!("消防法判定結果:\n{}\n", lines.join("\n"))
        })
        .unwrap_or_default();

    format!(
        r#"民泊開業に必要な消防設備費用を推定してください。

{fire_info}
以下の情報を考慮して、消防設備費用を推定してください：
- 消防法上の要件
- 必要な設備の種類と数
- 一般的な設備費用の相場
- **重要**: 自動火災報知設備ではなく特定小規模施設用自動火災報知設備で足りる場合は、無線式の連動型警報機能付感知器を使用することで費用を抑えられる可能性があります。要件を満たす範囲で最も費用効率の良い選択肢を選んでください。

設備の選択指針：
1. 特定小規模施設用自動火災報知設備（無線式連動型警報機能付感知器）が要件を満たす場合は、これを優先的に検討してください（費用を抑えられる）
2. 自動火災報知設備が必要な場合は、標準的な設備を選択してください
3. 消火器、誘導灯、その他の必要な設備も含めてください

以下のJSON形式で返してください：
{{
  "cost": 500000,
  "breakdown": "特定小規模施設用自動火災報知設備（無線式連動型）: ¥200,000、消火器: 2本×¥10,000=¥20,000、誘導灯: 2台×¥15,000=¥30,000、その他: ¥10,000"
}}

{tail}"#,
        tail = zero_tail(),
    )
}

/// Reads `{"cost", "breakdown"}`, then the first figure in the text, then
/// gives up with `fallback`. A zero never replaces a non-zero fallback.
pub fn parse_estimate(text: &str, fallback: &CostEstimate) -> CostEstimate {
    if let Some(object) = first_json_object(text) {
        let cost = object.get("cost").map(json_cost).unwrap_or(0);
        if cost > 0 || fallback.cost == 0 {
            let breakdown = object
                .get("breakdown")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return CostEstimate { cost, breakdown };
        }
    }

    FIRST_FIGURE_RE
        .find(text)
        .and_then(|found| found.as_str().replace(',', "").parse::<u64>().ok())
        .filter(|cost| *cost > 0)
        .map(|cost| CostEstimate {
            cost,
            breakdown: String::new(),
        })
        .unwrap_or_else(|| fallback.clone())
}

fn json_cost(value: &Value) -> u64 {
    match value {
        Value::Number(number) => number
            .as_f64()
            .filter(|cost| cost.is_finite() && *cost > 0.0)
            .map(|cost| cost.round() as u64)
            .unwrap_or(0),
        Value::String(text) => text
            .chars()
            .filter(char::is_ascii_digit)
            .collect::<String>()
            .parse()
            .unwrap_or(0),
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CostEstimator<'a> {
    oracle: Option<&'a dyn ReasoningOracle>,
}

impl<'a> CostEstimator<'a> {
    pub fn new(oracle: Option<&'a dyn ReasoningOracle>) -> Self {
        Self { oracle }
    }

    /// Prices one item. Without an oracle, or when the oracle fails, the
    /// item's default is returned.
    pub fn estimate(
        &self,
        item: CostItem,
        profile: &PropertyProfile,
        fire_code: Option<&Requirements>,
    ) -> CostEstimate {
        let fallback = item.default_estimate();
        let Some(oracle) = self.oracle else {
            return fallback;
        };

        match oracle.generate(&item.prompt(profile, fire_code)) {
            Ok(response) if !is_error_shaped(&response.text) => {
                let estimate = parse_estimate(&response.text, &fallback);
                info!(item = item.label(), cost = estimate.cost, "cost estimated");
                estimate
            }
            Ok(response) => {
                warn!(item = item.label(), reply = %response.text, "cost estimate returned an error reply");
                fallback
            }
            Err(err) => {
                warn!(item = item.label(), error = %err, "cost estimate failed");
                fallback
            }
        }
    }

    pub fn fire_equipment(&self, fire_code: Option<&Requirements>) -> CostEstimate {
        self.estimate(CostItem::FireEquipment, &PropertyProfile::default(), fire_code)
    }

    pub fn furniture(&self, profile: &PropertyProfile) -> CostEstimate {
        self.estimate(CostItem::Furniture, profile, None)
    }

    pub fn utilities(&self, profile: &PropertyProfile) -> CostEstimate {
        self.estimate(CostItem::Utilities, profile, None)
    }

    pub fn insurance(&self, profile: &PropertyProfile) -> CostEstimate {
        self.estimate(CostItem::Insurance, profile, None)
    }

    pub fn cleaning(&self, profile: &PropertyProfile) -> CostEstimate {
        self.estimate(CostItem::Cleaning, profile, None)
    }

    pub fn supplies(&self, profile: &PropertyProfile) -> CostEstimate {
        self.estimate(CostItem::Supplies, profile, None)
    }
}
