//! "Next actions" composition. The oracle writes the list when it can; the
//! deterministic generator below covers every case where it cannot, in the
//! order permits, fire code, building code, municipal rules, then the
//! generic professional referral.

use super::{
    is_error_shaped, prompts, Determination, LegalBatch, Permission, PermissionDetermination,
    Requirements, Statute, BUILDING_CODE_LABELS, FIRE_CODE_LABELS, NO_RESTRICTIONS, UNDETERMINED,
};
use crate::oracle::ReasoningOracle;
use serde::Serialize;
use tracing::{info, warn};

const MUNICIPAL_EXCERPT_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    Oracle,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextActions {
    pub text: String,
    pub source: ActionSource,
}

#[derive(Debug, Clone, Copy)]
pub struct NextActionsComposer<'a> {
    oracle: Option<&'a dyn ReasoningOracle>,
}

impl<'a> NextActionsComposer<'a> {
    pub fn new(oracle: Option<&'a dyn ReasoningOracle>) -> Self {
        Self { oracle }
    }

    pub fn compose(&self, zoning_type: &str, batch: &LegalBatch) -> NextActions {
        let Some(oracle) = self.oracle else {
            return fallback(zoning_type, batch);
        };

        let prompt = prompts::next_actions(&results_summary(zoning_type, batch));
        match oracle.generate(&prompt) {
            Ok(response) if !is_error_shaped(&response.text) => {
                info!("next actions composed by oracle");
                NextActions {
                    text: response.text,
                    source: ActionSource::Oracle,
                }
            }
            Ok(response) => {
                warn!(reply = %response.text, "next actions reply was an error; using fallback");
                fallback(zoning_type, batch)
            }
            Err(err) => {
                warn!(error = %err, "next actions unavailable; using fallback");
                fallback(zoning_type, batch)
            }
        }
    }
}

fn fallback(zoning_type: &str, batch: &LegalBatch) -> NextActions {
    NextActions {
        text: fallback_actions(zoning_type, batch),
        source: ActionSource::Fallback,
    }
}

/// One line per determined field, fed to the oracle as context.
pub fn results_summary(zoning_type: &str, batch: &LegalBatch) -> Vec<String> {
    let zoning = if zoning_type.trim().is_empty() {
        UNDETERMINED
    } else {
        zoning_type
    };
    let mut lines = vec![format!("用途地域: {zoning}")];

    for (statute, outcome) in [
        (Statute::MinpakuLaw, &batch.minpaku),
        (Statute::RyokanLaw, &batch.ryokan),
        (Statute::SpecialZoneMinpaku, &batch.special_zone),
    ] {
        let name = statute.label();
        match outcome {
            Determination::Determined(parsed) => {
                lines.push(format!("{name} - 許可判定: {}", parsed.judgement));
                lines.push(format!("{name} - 主な理由: {}", parsed.reason));
                lines.push(format!("{name} - その他制限: {}", parsed.restrictions));
            }
            Determination::Failed(_) => lines.push(format!("{name} - 判定結果: 判定不可")),
        }
    }

    for (statute, outcome, labels) in [
        (Statute::FireCode, &batch.fire_code, FIRE_CODE_LABELS),
        (Statute::BuildingStandards, &batch.building_standards, BUILDING_CODE_LABELS),
    ] {
        let name = statute.label();
        match outcome {
            Determination::Determined(requirements) => lines.extend(
                labels
                    .iter()
                    .map(|label| format!("{name} - {label}: {}", requirements.get(label))),
            ),
            Determination::Failed(_) => lines.push(format!("{name} - 判定結果: 判定不可")),
        }
    }

    let municipal = batch
        .municipal
        .determined()
        .map(String::as_str)
        .unwrap_or(NO_RESTRICTIONS);
    lines.push(format!("自治体の制限: {municipal}"));
    lines
}

/// Rule-based action list built from determination keywords alone.
pub fn fallback_actions(zoning_type: &str, batch: &LegalBatch) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut push = |line: &str| lines.push(line.to_string());

    if zoning_type.trim().is_empty() || zoning_type == UNDETERMINED {
        push("**📍 優先**");
        push("用途地域が判定できませんでした。住所を再確認してください。");
        push("");
    }

    if let Some(minpaku) = batch.minpaku.determined() {
        minpaku_actions(minpaku, &mut push);
    }

    if let Some(ryokan) = batch.ryokan.determined() {
        if ryokan.permission.grants() {
            push("✅ **旅館業法**");
            push("  許可可能。営業日数制限なしですが、設備基準が厳格です。");
            push("");
            push("  • 旅館業許可申請の準備（保健所への申請）");
            push("  • 構造基準・設備基準の確認と工事計画");
            push("");
        }
    }

    if let Some(special) = batch.special_zone.determined() {
        if special.permission.grants() {
            push("✅ **特区民泊**");
            push("  許可可能。該当地域の特区制度を確認してください。");
            push("");
        }
    }

    if let Some(fire) = batch.fire_code.determined() {
        fire_code_actions(fire, &mut push);
    }

    if let Some(building) = batch.building_standards.determined() {
        building_code_actions(building, &mut push);
    }

    if let Some(restrictions) = batch.municipal.determined() {
        let restrictions = restrictions.trim();
        if !restrictions.is_empty() && restrictions != NO_RESTRICTIONS {
            let excerpt: String = restrictions.chars().take(MUNICIPAL_EXCERPT_CHARS).collect();
            push("📋 **自治体規制**");
            push(&format!("  • {excerpt} 詳しくは自治体に確認してください。"));
            push("");
        }
    }

    push("**📝 推奨アクション**");
    push("");
    push("  • 専門家への相談（行政書士：手続き、建築士：設備基準）");
    push("  • 投資シミュレーションタブで収益性を確認");

    lines.join("\n")
}

fn minpaku_actions(parsed: &PermissionDetermination, push: &mut impl FnMut(&str)) {
    match parsed.permission {
        Permission::Permitted => {
            push("✅ **民泊新法**");
            if parsed.restrictions.contains("180日") || parsed.restrictions.contains("日数") {
                push("  許可可能。年間営業日数に制限があるため、収益計画を確認しましょう。");
            } else {
                push("  許可可能。手続きを進めましょう。");
            }
            push("");
            push("  • 住宅宿泊事業届出の準備（管理者選任、宿泊者名簿等）");
            push("  • 必要設備の確認・設置（火災報知器、消火器等）");
            push("  • 近隣への説明・同意取得（推奨）");
        }
        permission if permission == Permission::Conditional || parsed.reason.contains("条件") => {
            push("⚠️ **民泊新法**");
            push("  条件付きで許可可能。条件を確認し、遵守できるか検討しましょう。");
        }
        _ => {
            push("❌ **民泊新法**");
            let detail = if parsed.reason == UNDETERMINED {
                "用途地域や条例を確認してください。"
            } else {
                parsed.reason.as_str()
            };
            push(&format!("  許可困難。{detail}"));
        }
    }
    push("");
}

fn fire_code_actions(requirements: &Requirements, push: &mut impl FnMut(&str)) {
    let detector = requirements.get("火災報知器");
    let vertical = requirements.get("竪穴区画");
    let other = requirements.get("その他留意点");

    push("🔥 **消防法**");
    if requires(vertical) {
        push("  • 竪穴区画工事が必要です。工事費用を確認しましょう。");
    } else if vertical.contains("不要") {
        push("  • 竪穴区画に関する工事は不要です。");
    }
    if other.contains("消火器") || other.contains("設置") {
        push("  • 消火器を設置してください。");
    }
    if detector.contains("住宅用") {
        push("  • 住宅用火災警報器で対応可能です。");
    }
    push("");
}

fn building_code_actions(requirements: &Requirements, push: &mut impl FnMut(&str)) {
    let use_change = requirements.get("用途変更");
    let vertical = requirements.get("竪穴区画");
    let other = requirements.get("その他制限");
    let road_access = requirements.get("接道義務");

    push("🏗️ **建築基準法**");
    if requires(use_change) {
        push("  • 用途変更申請が必要です。行政への相談が必要です。");
    } else if use_change.contains("不要") {
        push("  • 用途変更申請は不要です。");
    }
    if requires(vertical) {
        push("  • 竪穴区画工事が必要です。");
    } else if vertical.contains("不要") {
        push("  • 竪穴区画に関する工事は不要です。");
    }
    if road_access.contains("接道") && (road_access.contains("必要") || road_access.contains("義務")) {
        push("  • 接道要件を確認してください。旅館業申請時に必要です。");
    }
    if other.contains("採光") || other.contains("換気") {
        push("  • 採光・換気要件を確認してください。");
    }
    push("");
}

/// `要` present without `不要`.
fn requires(value: &str) -> bool {
    value.contains('要') && !value.contains("不要")
}
