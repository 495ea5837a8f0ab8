use std::sync::Mutex;

use crate::oracle::{OracleError, OracleResponse, ReasoningOracle};
use crate::workflows::legal::{PropertyFacts, StatuteInputs};

pub(super) const MINPAKU_KEY: &str = "民泊新法（住宅宿泊事業法）";
pub(super) const RYOKAN_KEY: &str = "旅館業法の許可可能性";
pub(super) const SPECIAL_ZONE_KEY: &str = "特区民泊（国家戦略特別区域法";
pub(super) const FIRE_KEY: &str = "消防法上の必要な設備";
pub(super) const BUILDING_KEY: &str = "建築基準法上の必要な要件";
pub(super) const MUNICIPAL_KEY: &str = "独自の規制や注意点";
pub(super) const ACTIONS_KEY: &str = "「次に取るべきアクション」を箇条書き";
pub(super) const FACTS_KEY: &str = "不動産広告のテキスト";

/// Answers each prompt with the first scripted reply whose key the prompt
/// contains, and records every prompt it receives.
#[derive(Debug, Default)]
pub(super) struct PromptRouter {
    routes: Vec<(&'static str, Result<String, OracleError>)>,
    prompts: Mutex<Vec<String>>,
}

impl PromptRouter {
    pub(super) fn reply(mut self, key: &'static str, text: &str) -> Self {
        self.routes.push((key, Ok(text.to_string())));
        self
    }

    pub(super) fn fail(mut self, key: &'static str, err: OracleError) -> Self {
        self.routes.push((key, Err(err)));
        self
    }

    pub(super) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log mutex poisoned").clone()
    }

    pub(super) fn calls_matching(&self, key: &str) -> usize {
        self.prompts()
            .iter()
            .filter(|prompt| prompt.contains(key))
            .count()
    }
}

impl ReasoningOracle for PromptRouter {
    fn generate(&self, prompt: &str) -> Result<OracleResponse, OracleError> {
        self.prompts
            .lock()
            .expect("prompt log mutex poisoned")
            .push(prompt.to_string());
        self.routes
            .iter()
            .find(|(key, _)| prompt.contains(key))
            .map(|(_, reply)| reply.clone().map(OracleResponse::text))
            .unwrap_or_else(|| Err(OracleError::Request("no scripted reply".to_string())))
    }
}

pub(super) fn facts() -> PropertyFacts {
    PropertyFacts {
        building_use: Some("戸建て".to_string()),
        structure: Some("木造".to_string()),
        floors: Some("2階建".to_string()),
        floor_area: Some("85.5".to_string()),
        ..PropertyFacts::default()
    }
    .with_site("東京都渋谷区神宮前1-2-3", "第一種住居地域")
}

pub(super) fn inputs() -> StatuteInputs {
    StatuteInputs::from_facts(&facts())
}

pub(super) fn full_router() -> PromptRouter {
    PromptRouter::default()
        .reply(
            MINPAKU_KEY,
            "許可判定: 許可\n主な理由: 住居地域で条例制限なし\nその他制限: 年間180日制限あり",
        )
        .reply(
            RYOKAN_KEY,
            "許可判定: 条件付き許可\n主な理由: 学校から100m以内の場合制限あり\nその他制限: 特になし",
        )
        .reply(
            SPECIAL_ZONE_KEY,
            "許可判定: 不許可\n主な理由: 特区指定外エリア\nその他制限: 特になし",
        )
        .reply(
            FIRE_KEY,
            "火災報知器: 住宅用火災警報器で可\n竪穴区画: 不要（2階建のため）\nその他留意点: 消火器設置義務あり",
        )
        .reply(
            BUILDING_KEY,
            "用途変更: 不要（200㎡未満）\n竪穴区画: 不要\n接道義務: 接道義務あり（幅員4m以上の道路に2m以上）\nその他制限: 採光・換気要件あり",
        )
        .reply(MUNICIPAL_KEY, "住居専用地域では\n平日の営業が制限されます")
}
