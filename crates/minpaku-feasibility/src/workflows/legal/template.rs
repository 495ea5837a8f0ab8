//! Line-template parsing of statute responses.
//!
//! Only lines that begin with an exact label followed by a colon are read.
//! Unlabelled prose is ignored and any label that never appears keeps its
//! default, so a partially conforming answer still yields every field.

use serde::Serialize;

pub const PERMISSION_LABEL: &str = "許可判定";
pub const REASON_LABEL: &str = "主な理由";
pub const RESTRICTIONS_LABEL: &str = "その他制限";

pub const UNDETERMINED: &str = "不明";
pub const NO_RESTRICTIONS: &str = "特になし";

pub const FIRE_CODE_LABELS: &[&str] = &["火災報知器", "竪穴区画", "その他留意点"];
pub const BUILDING_CODE_LABELS: &[&str] = &["用途変更", "竪穴区画", "その他制限", "接道義務"];

const UNAVAILABLE_REPLY: &str = "Gemini APIが利用できません";
const ERROR_PREFIX: &str = "エラー";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Permitted,
    NotPermitted,
    Conditional,
    Undetermined,
}

impl Permission {
    pub fn from_judgement(judgement: &str) -> Self {
        if judgement.contains("不許可") {
            Self::NotPermitted
        } else if judgement.contains("条件") {
            Self::Conditional
        } else if judgement.contains("許可") {
            Self::Permitted
        } else {
            Self::Undetermined
        }
    }

    /// Permitted outright or subject to conditions.
    pub fn grants(self) -> bool {
        matches!(self, Self::Permitted | Self::Conditional)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Permitted => "許可",
            Self::NotPermitted => "不許可",
            Self::Conditional => "条件付き許可",
            Self::Undetermined => UNDETERMINED,
        }
    }
}

/// Parsed answer to a permit question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionDetermination {
    pub permission: Permission,
    /// The judgement exactly as the oracle phrased it.
    pub judgement: String,
    pub reason: String,
    pub restrictions: String,
}

impl Default for PermissionDetermination {
    fn default() -> Self {
        Self {
            permission: Permission::Undetermined,
            judgement: UNDETERMINED.to_string(),
            reason: UNDETERMINED.to_string(),
            restrictions: NO_RESTRICTIONS.to_string(),
        }
    }
}

impl PermissionDetermination {
    pub fn parse(text: &str) -> Self {
        let mut parsed = Self::default();
        for line in text.lines().map(str::trim) {
            if let Some(value) = labeled_value(line, PERMISSION_LABEL) {
                parsed.judgement = value.to_string();
            } else if let Some(value) = labeled_value(line, REASON_LABEL) {
                parsed.reason = value.to_string();
            } else if let Some(value) = labeled_value(line, RESTRICTIONS_LABEL) {
                parsed.restrictions = value.to_string();
            }
        }
        parsed.permission = Permission::from_judgement(&parsed.judgement);
        parsed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementField {
    pub label: &'static str,
    pub value: String,
}

/// Labelled free-text requirements for a building or fire code check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirements {
    pub fields: Vec<RequirementField>,
}

impl Requirements {
    pub fn parse(text: &str, labels: &[&'static str]) -> Self {
        let mut fields: Vec<RequirementField> = labels
            .iter()
            .map(|&label| RequirementField {
                label,
                value: UNDETERMINED.to_string(),
            })
            .collect();

        for line in text.lines().map(str::trim) {
            let hit = fields
                .iter_mut()
                .find_map(|field| labeled_value(line, field.label).map(|value| (field, value)));
            if let Some((field, value)) = hit {
                field.value = value.to_string();
            }
        }
        Self { fields }
    }

    /// Value for `label`, `不明` when the label is not part of this set.
    pub fn get(&self, label: &str) -> &str {
        self.fields
            .iter()
            .find(|field| field.label == label)
            .map(|field| field.value.as_str())
            .unwrap_or(UNDETERMINED)
    }
}

/// Replies that carry a failure message instead of an answer.
pub fn is_error_shaped(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || text == UNAVAILABLE_REPLY || text.starts_with(ERROR_PREFIX)
}

/// Value after `label:` at the start of a line. The full-width `：` is
/// accepted as well; no other separator or leading text is.
fn labeled_value<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(label)?;
    rest.strip_prefix(':')
        .or_else(|| rest.strip_prefix('：'))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn judgement_keywords_map_to_permission() {
        assert_eq!(Permission::from_judgement("不許可"), Permission::NotPermitted);
        assert_eq!(Permission::from_judgement("条件付き許可"), Permission::Conditional);
        assert_eq!(Permission::from_judgement("許可"), Permission::Permitted);
        assert_eq!(Permission::from_judgement("判断できません"), Permission::Undetermined);
    }

    #[test]
    fn labels_require_a_colon() {
        assert_eq!(labeled_value("許可判定: 許可", PERMISSION_LABEL), Some("許可"));
        assert_eq!(labeled_value("許可判定：不許可", PERMISSION_LABEL), Some("不許可"));
        assert_eq!(labeled_value("許可判定は許可です", PERMISSION_LABEL), None);
        assert_eq!(labeled_value("許可判定 - 許可", PERMISSION_LABEL), None);
        assert_eq!(labeled_value("最終許可判定: 許可", PERMISSION_LABEL), None);
    }

    #[test]
    fn error_shaped_replies() {
        assert!(is_error_shaped("エラー: 429 quota"));
        assert!(is_error_shaped("Gemini APIが利用できません"));
        assert!(is_error_shaped("  "));
        assert!(!is_error_shaped("許可判定: 許可"));
    }
}
