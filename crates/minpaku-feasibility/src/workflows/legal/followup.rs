use super::is_error_shaped;
use crate::oracle::{OracleError, ReasoningOracle};
use crate::workflows::geocode::GeoCoordinate;

/// Shown to the user when no answer could be produced.
pub const FOLLOWUP_FAILURE_MESSAGE: &str = "❌ 回答の生成に失敗しました。";

#[derive(Debug, thiserror::Error)]
pub enum FollowupError {
    #[error("question is empty")]
    EmptyQuestion,
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("oracle returned an error reply: {0}")]
    ErrorReply(String),
}

/// Everything a follow-up answer may cite: the rendered report, the action
/// list and the resolved site.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowupContext {
    pub formatted_report: String,
    pub next_actions: String,
    pub address: String,
    pub zoning_type: String,
    pub coordinate: GeoCoordinate,
}

impl FollowupContext {
    pub fn prompt(&self, question: &str) -> String {
        format!(
            "あなたは民泊開業の適法性について専門的なアドバイスを提供するAIアシスタントです。

以下の法令判定結果を基に、ユーザーの質問に丁寧に答えてください。

【物件情報】
{report}

【次に取るべきアクション】
{actions}

【その他の情報】
- 所在地: {address}
- 用途地域: {zoning}
- 緯度経度: {lat}, {lng}

ユーザーの質問に対して、上記の法令判定結果を参照しながら、具体的で実用的な回答を提供してください。
回答は簡潔で分かりやすく、必要に応じて法令の根拠や具体的な手続きについても説明してください。

【ユーザーの質問】
{question}

【回答】",
            report = self.formatted_report,
            actions = self.next_actions,
            address = self.address,
            zoning = self.zoning_type,
            lat = self.coordinate.latitude,
            lng = self.coordinate.longitude,
        )
    }

    pub fn answer(
        &self,
        oracle: &dyn ReasoningOracle,
        question: &str,
    ) -> Result<String, FollowupError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(FollowupError::EmptyQuestion);
        }
        let response = oracle.generate(&self.prompt(question))?;
        if is_error_shaped(&response.text) {
            return Err(FollowupError::ErrorReply(response.text));
        }
        Ok(response.text)
    }
}
