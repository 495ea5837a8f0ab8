//! Statute-by-statute legal determination over the reasoning oracle.
//!
//! Each statute gets one oracle call with a fixed line template. A failed
//! call becomes [`Determination::Failed`] for that statute only; the rest of
//! the batch still runs.

mod actions;
mod followup;
mod prompts;
mod report;
mod template;

#[cfg(test)]
mod tests;

pub use actions::{fallback_actions, results_summary, ActionSource, NextActions, NextActionsComposer};
pub use followup::{FollowupContext, FollowupError, FOLLOWUP_FAILURE_MESSAGE};
pub use report::format_report;
pub use template::{
    is_error_shaped, Permission, PermissionDetermination, RequirementField, Requirements,
    BUILDING_CODE_LABELS, FIRE_CODE_LABELS, NO_RESTRICTIONS, PERMISSION_LABEL, REASON_LABEL,
    RESTRICTIONS_LABEL, UNDETERMINED,
};

use crate::oracle::{OracleError, ReasoningOracle};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{info, warn};

static JSON_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]+\}").expect("valid json object regex"));
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid number regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Statute {
    MinpakuLaw,
    RyokanLaw,
    SpecialZoneMinpaku,
    FireCode,
    BuildingStandards,
    Municipal,
}

impl Statute {
    pub fn ordered() -> &'static [Statute] {
        &[
            Statute::MinpakuLaw,
            Statute::RyokanLaw,
            Statute::SpecialZoneMinpaku,
            Statute::FireCode,
            Statute::BuildingStandards,
            Statute::Municipal,
        ]
    }

    pub fn label(self) -> &'static str {
        match self {
            Statute::MinpakuLaw => "民泊新法",
            Statute::RyokanLaw => "旅館業法",
            Statute::SpecialZoneMinpaku => "特区民泊",
            Statute::FireCode => "消防法",
            Statute::BuildingStandards => "建築基準法",
            Statute::Municipal => "自治体の制限",
        }
    }

    fn prompt(self, inputs: &StatuteInputs) -> String {
        match self {
            Statute::MinpakuLaw => prompts::minpaku_law(inputs),
            Statute::RyokanLaw => prompts::ryokan_law(inputs),
            Statute::SpecialZoneMinpaku => prompts::special_zone(inputs),
            Statute::FireCode => prompts::fire_code(inputs),
            Statute::BuildingStandards => prompts::building_standards(inputs),
            Statute::Municipal => prompts::municipal(inputs),
        }
    }
}

/// Outcome of one statute call. `Failed` carries the reason the oracle
/// could not answer; it is never replaced by a default answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Determination<T> {
    Determined(T),
    Failed(String),
}

impl<T> Determination<T> {
    pub fn determined(&self) -> Option<&T> {
        match self {
            Determination::Determined(value) => Some(value),
            Determination::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Determination::Failed(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Determination<U> {
        match self {
            Determination::Determined(value) => Determination::Determined(f(value)),
            Determination::Failed(reason) => Determination::Failed(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LegalDetermination {
    Permission(PermissionDetermination),
    Requirements(Requirements),
    Municipal { restrictions: String },
}

/// Building facts the oracle read off the flyer. Every key is optional;
/// numbers are accepted where the model returns them unquoted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyFacts {
    #[serde(rename = "所在地", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(rename = "建物用途", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub building_use: Option<String>,
    #[serde(rename = "構造", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub structure: Option<String>,
    #[serde(rename = "階数", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub floors: Option<String>,
    #[serde(rename = "延べ床面積", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub floor_area: Option<String>,
    #[serde(rename = "用途地域", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub zoning_type: Option<String>,
}

impl PropertyFacts {
    /// Reads the first `{...}` object in a model reply. Anything unreadable
    /// yields empty facts.
    pub fn from_response(text: &str) -> Self {
        JSON_OBJECT_RE
            .find(text)
            .and_then(|found| serde_json::from_str(found.as_str()).ok())
            .unwrap_or_default()
    }

    pub fn floor_area_m2(&self) -> Option<f64> {
        let raw = self.floor_area.as_deref()?;
        NUMBER_RE
            .find(&raw.replace(',', ""))
            .and_then(|found| found.as_str().parse().ok())
    }

    /// The session's confirmed address and zoning replace whatever the
    /// flyer suggested.
    pub fn with_site(mut self, address: &str, zoning_type: &str) -> Self {
        self.location = Some(address.to_string());
        self.zoning_type = Some(zoning_type.to_string());
        self
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

/// Facts substituted into the statute prompts, `不明` where unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatuteInputs {
    pub zoning_type: String,
    pub address: String,
    pub building_use: String,
    pub structure: String,
    pub floors: String,
    pub floor_area: String,
}

impl StatuteInputs {
    pub fn from_facts(facts: &PropertyFacts) -> Self {
        let or_unknown =
            |value: &Option<String>| value.clone().unwrap_or_else(|| UNDETERMINED.to_string());
        Self {
            zoning_type: or_unknown(&facts.zoning_type),
            address: or_unknown(&facts.location),
            building_use: or_unknown(&facts.building_use),
            structure: or_unknown(&facts.structure),
            floors: or_unknown(&facts.floors),
            floor_area: or_unknown(&facts.floor_area),
        }
    }
}

/// All six statute outcomes for one property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegalBatch {
    pub minpaku: Determination<PermissionDetermination>,
    pub ryokan: Determination<PermissionDetermination>,
    pub special_zone: Determination<PermissionDetermination>,
    pub fire_code: Determination<Requirements>,
    pub building_standards: Determination<Requirements>,
    pub municipal: Determination<String>,
}

impl LegalBatch {
    pub fn failed_statutes(&self) -> Vec<Statute> {
        let flags = [
            (Statute::MinpakuLaw, self.minpaku.is_failed()),
            (Statute::RyokanLaw, self.ryokan.is_failed()),
            (Statute::SpecialZoneMinpaku, self.special_zone.is_failed()),
            (Statute::FireCode, self.fire_code.is_failed()),
            (Statute::BuildingStandards, self.building_standards.is_failed()),
            (Statute::Municipal, self.municipal.is_failed()),
        ];
        flags
            .into_iter()
            .filter_map(|(statute, failed)| failed.then_some(statute))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LegalDeterminationEngine<'a> {
    oracle: &'a dyn ReasoningOracle,
}

impl<'a> LegalDeterminationEngine<'a> {
    pub fn new(oracle: &'a dyn ReasoningOracle) -> Self {
        Self { oracle }
    }

    pub fn extract_property_info(&self, ocr_text: &str) -> Result<PropertyFacts, OracleError> {
        let response = self.oracle.generate(&prompts::property_facts(ocr_text))?;
        let facts = PropertyFacts::from_response(&response.text);
        info!(
            building_use = facts.building_use.as_deref().unwrap_or(UNDETERMINED),
            floor_area = facts.floor_area.as_deref().unwrap_or(UNDETERMINED),
            "property facts extracted"
        );
        Ok(facts)
    }

    pub fn determine(&self, statute: Statute, inputs: &StatuteInputs) -> Determination<LegalDetermination> {
        match statute {
            Statute::MinpakuLaw | Statute::RyokanLaw | Statute::SpecialZoneMinpaku => self
                .permission(statute, inputs)
                .map(LegalDetermination::Permission),
            Statute::FireCode | Statute::BuildingStandards => self
                .requirements(statute, inputs)
                .map(LegalDetermination::Requirements),
            Statute::Municipal => self
                .municipal(inputs)
                .map(|restrictions| LegalDetermination::Municipal { restrictions }),
        }
    }

    /// Runs every statute in order. Calls are sequential and independent.
    pub fn determine_all(&self, inputs: &StatuteInputs) -> LegalBatch {
        LegalBatch {
            minpaku: self.permission(Statute::MinpakuLaw, inputs),
            ryokan: self.permission(Statute::RyokanLaw, inputs),
            special_zone: self.permission(Statute::SpecialZoneMinpaku, inputs),
            fire_code: self.requirements(Statute::FireCode, inputs),
            building_standards: self.requirements(Statute::BuildingStandards, inputs),
            municipal: self.municipal(inputs),
        }
    }

    fn permission(
        &self,
        statute: Statute,
        inputs: &StatuteInputs,
    ) -> Determination<PermissionDetermination> {
        self.ask(statute, inputs)
            .map(|text| PermissionDetermination::parse(&text))
    }

    fn requirements(&self, statute: Statute, inputs: &StatuteInputs) -> Determination<Requirements> {
        let labels = match statute {
            Statute::BuildingStandards => BUILDING_CODE_LABELS,
            _ => FIRE_CODE_LABELS,
        };
        self.ask(statute, inputs)
            .map(|text| Requirements::parse(&text, labels))
    }

    fn municipal(&self, inputs: &StatuteInputs) -> Determination<String> {
        self.ask(Statute::Municipal, inputs).map(|text| {
            let line = text.trim().replace('\n', " ");
            let line = line.trim();
            if line.is_empty() {
                NO_RESTRICTIONS.to_string()
            } else {
                line.to_string()
            }
        })
    }

    fn ask(&self, statute: Statute, inputs: &StatuteInputs) -> Determination<String> {
        match self.oracle.generate(&statute.prompt(inputs)) {
            Ok(response) if is_error_shaped(&response.text) => {
                warn!(statute = statute.label(), reply = %response.text, "statute check returned an error reply");
                Determination::Failed(response.text.trim().to_string())
            }
            Ok(response) => {
                info!(statute = statute.label(), "statute determined");
                Determination::Determined(response.text)
            }
            Err(err) => {
                warn!(statute = statute.label(), error = %err, "statute check failed");
                Determination::Failed(err.to_string())
            }
        }
    }
}
