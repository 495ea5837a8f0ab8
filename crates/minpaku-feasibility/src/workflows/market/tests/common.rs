use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::NaiveDate;

use crate::oracle::{OracleError, OracleResponse, ReasoningOracle};

pub(super) const ADDRESS: &str = "大阪府大阪市北区梅田町1-2-3";

/// Replays queued search replies in order and records every prompt. Plain
/// generation is never expected from the estimator.
#[derive(Debug, Default)]
pub(super) struct ScriptedSearch {
    replies: Mutex<VecDeque<Result<OracleResponse, OracleError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedSearch {
    pub(super) fn then_text(self, text: &str) -> Self {
        self.push(Ok(OracleResponse {
            text: text.to_string(),
            grounding_sources: vec!["https://www.airbnb.jp/rooms/1".to_string()],
        }))
    }

    pub(super) fn then_error(self, err: OracleError) -> Self {
        self.push(Err(err))
    }

    fn push(self, reply: Result<OracleResponse, OracleError>) -> Self {
        self.replies
            .lock()
            .expect("reply queue mutex poisoned")
            .push_back(reply);
        self
    }

    pub(super) fn calls(&self) -> usize {
        self.prompts().len()
    }

    pub(super) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log mutex poisoned").clone()
    }
}

impl ReasoningOracle for ScriptedSearch {
    fn generate(&self, _prompt: &str) -> Result<OracleResponse, OracleError> {
        Err(OracleError::Request("plain generation not scripted".to_string()))
    }

    fn generate_with_search(&self, prompt: &str) -> Result<OracleResponse, OracleError> {
        self.prompts
            .lock()
            .expect("prompt log mutex poisoned")
            .push(prompt.to_string());
        self.replies
            .lock()
            .expect("reply queue mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(OracleError::Request("reply queue exhausted".to_string())))
    }
}

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 10).expect("valid date")
}

pub(super) const EMPTY_REPLY: &str = r#"```json
[]
```
```json
{"平均単価_中央値": "¥0", "価格範囲": "N/A", "宿泊件数": "0件", "人気度メモ": "該当なし", "推定根拠": "見つかりませんでした"}
```"#;

pub(super) const PLACEHOLDER_REPLY: &str = r#"[{"title": "該当物件なし", "price_per_night": 0, "validated": false}]
{"平均単価_中央値": "N/A", "価格範囲": "N/A", "宿泊件数": "0件"}"#;

pub(super) const LISTINGS_REPLY: &str = r#"```json
[
  {"url": "https://www.airbnb.jp/rooms/111", "title": "梅田駅近の一棟貸し", "price_per_night": 12000, "validated": true, "source": "grounding_metadata"},
  {"url": "https://www.airbnb.jp/rooms/222", "title": "北区の町家", "price_per_night": "¥18,000", "validated": true, "source": "grounding_metadata"},
  {"url": "https://www.airbnb.jp/rooms/333", "title": "中崎町ロフト", "price_per_night": "¥45,000/3泊", "validated": "true", "source": "google_search"},
  {"url": "https://example.com/rooms/999", "title": "推測された物件", "price_per_night": 90000, "validated": false, "source": "airbnb_search_snippet"}
]
```
```json
{"平均単価_中央値": "¥16,000", "価格範囲": "¥12,000〜¥90,000", "宿泊件数": "4件", "人気度メモ": "駅近物件のレビューが多い", "推定根拠": "grounding_metadataのリスティングに基づく"}
```"#;
