use super::common::*;
use crate::oracle::OracleError;
use crate::workflows::legal::{
    Determination, LegalDetermination, LegalDeterminationEngine, Permission, PropertyFacts,
    Statute, NO_RESTRICTIONS,
};

#[test]
fn batch_runs_every_statute_once() {
    let router = full_router();
    let engine = LegalDeterminationEngine::new(&router);
    let batch = engine.determine_all(&inputs());

    assert_eq!(router.prompts().len(), Statute::ordered().len());
    assert!(batch.failed_statutes().is_empty());

    let minpaku = batch.minpaku.determined().expect("minpaku determined");
    assert_eq!(minpaku.permission, Permission::Permitted);
    assert_eq!(minpaku.restrictions, "年間180日制限あり");
    assert_eq!(
        batch.ryokan.determined().map(|parsed| parsed.permission),
        Some(Permission::Conditional)
    );
    assert_eq!(
        batch.fire_code.determined().map(|req| req.get("竪穴区画")),
        Some("不要（2階建のため）")
    );
    assert_eq!(
        batch.municipal,
        Determination::Determined("住居専用地域では 平日の営業が制限されます".to_string())
    );
}

#[test]
fn prompts_carry_the_confirmed_site_and_building_facts() {
    let router = full_router();
    LegalDeterminationEngine::new(&router).determine_all(&inputs());

    let prompts = router.prompts();
    assert!(prompts[0].contains("- 用途地域: 第一種住居地域"));
    assert!(prompts[0].contains("- 所在地: 東京都渋谷区神宮前1-2-3"));
    assert!(prompts[3].contains("- 延べ床面積: 85.5㎡"));
    assert!(prompts[5].starts_with("東京都渋谷区神宮前1-2-3の市区町村で"));
}

#[test]
fn one_failed_statute_does_not_abort_the_batch() {
    let router = PromptRouter::default()
        .fail(FIRE_KEY, OracleError::Request("timeout".to_string()))
        .reply(SPECIAL_ZONE_KEY, "エラー: 応答を取得できませんでした")
        .reply(MINPAKU_KEY, "許可判定: 許可")
        .reply(RYOKAN_KEY, "許可判定: 不許可")
        .reply(BUILDING_KEY, "用途変更: 不要")
        .reply(MUNICIPAL_KEY, "特になし");
    let batch = LegalDeterminationEngine::new(&router).determine_all(&inputs());

    assert_eq!(
        batch.failed_statutes(),
        vec![Statute::SpecialZoneMinpaku, Statute::FireCode]
    );
    assert!(matches!(&batch.fire_code, Determination::Failed(reason) if reason.contains("timeout")));
    assert_eq!(
        batch.ryokan.determined().map(|parsed| parsed.permission),
        Some(Permission::NotPermitted)
    );
}

#[test]
fn unavailable_oracle_fails_every_statute_without_defaults() {
    let oracle = crate::oracle::DisabledOracle::new("GEMINI_API_KEY is not set");
    let batch = LegalDeterminationEngine::new(&oracle).determine_all(&inputs());
    assert_eq!(batch.failed_statutes().len(), 6);
}

#[test]
fn determine_dispatches_on_statute_kind() {
    let router = full_router();
    let engine = LegalDeterminationEngine::new(&router);

    assert!(matches!(
        engine.determine(Statute::BuildingStandards, &inputs()),
        Determination::Determined(LegalDetermination::Requirements(req)) if req.fields.len() == 4
    ));

    let blank = PromptRouter::default().reply(MUNICIPAL_KEY, "\n");
    let outcome = LegalDeterminationEngine::new(&blank).determine(Statute::Municipal, &inputs());
    assert!(outcome.is_failed(), "blank replies are error-shaped");

    let quiet = PromptRouter::default().reply(MUNICIPAL_KEY, "特になし");
    assert_eq!(
        LegalDeterminationEngine::new(&quiet).determine(Statute::Municipal, &inputs()),
        Determination::Determined(LegalDetermination::Municipal {
            restrictions: NO_RESTRICTIONS.to_string()
        })
    );
}

#[test]
fn property_facts_read_first_json_object_and_tolerate_numbers() {
    let router = PromptRouter::default().reply(
        FACTS_KEY,
        "```json\n{\"所在地\": \"新潟県新潟市中央区\", \"構造\": \"RC造\", \"延べ床面積\": 62.4}\n```",
    );
    let facts = LegalDeterminationEngine::new(&router)
        .extract_property_info("物件所在地 新潟県新潟市中央区")
        .expect("oracle answered");

    assert_eq!(facts.location.as_deref(), Some("新潟県新潟市中央区"));
    assert_eq!(facts.structure.as_deref(), Some("RC造"));
    assert_eq!(facts.floor_area.as_deref(), Some("62.4"));
    assert_eq!(facts.floor_area_m2(), Some(62.4));
    assert!(facts.building_use.is_none());
}

#[test]
fn unreadable_property_facts_are_empty() {
    assert_eq!(PropertyFacts::from_response("情報が見つかりません"), PropertyFacts::default());
    assert_eq!(PropertyFacts::from_response("{not json}"), PropertyFacts::default());
}
