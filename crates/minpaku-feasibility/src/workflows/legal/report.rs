use super::{
    Determination, LegalBatch, PermissionDetermination, PropertyFacts, Requirements,
    BUILDING_CODE_LABELS, FIRE_CODE_LABELS, NO_RESTRICTIONS, UNDETERMINED,
};

const NOT_DETERMINABLE: &str = "判定不可";
const DETERMINATION_ERROR: &str = "判定エラー";

/// Markdown report of the property facts and every statute outcome,
/// sections 1 to 5, with a blank line between entries.
pub fn format_report(facts: &PropertyFacts, batch: &LegalBatch) -> String {
    let mut lines: Vec<String> = Vec::new();

    push_section(&mut lines, "**1. 物件情報**");
    let fact = |value: &Option<String>| value.clone().unwrap_or_else(|| UNDETERMINED.to_string());
    push_entries(
        &mut lines,
        &[
            format!("所在地: {}", fact(&facts.location)),
            format!("建物用途: {}", fact(&facts.building_use)),
            format!("構造: {}", fact(&facts.structure)),
            format!("階数: {}", fact(&facts.floors)),
            format!("用途地域: {}", fact(&facts.zoning_type)),
            match &facts.floor_area {
                Some(area) if area != UNDETERMINED => format!("延べ床面積: {area}㎡"),
                _ => format!("延べ床面積: {UNDETERMINED}"),
            },
        ],
    );
    lines.push(String::new());

    push_section(&mut lines, "**2. 民泊の許可判定**");
    for (heading, outcome) in [
        ("**2.1 民泊新法**", &batch.minpaku),
        ("**2.2 旅館業**", &batch.ryokan),
        ("**2.3 特区民泊**", &batch.special_zone),
    ] {
        push_section(&mut lines, heading);
        push_entries(&mut lines, &permission_entries(outcome));
        lines.push(String::new());
    }

    push_section(&mut lines, "**3. 消防法上のポイント**");
    push_entries(&mut lines, &requirement_entries(&batch.fire_code, FIRE_CODE_LABELS));
    lines.push(String::new());

    push_section(&mut lines, "**4. 建築基準法上のポイント**");
    push_entries(
        &mut lines,
        &requirement_entries(&batch.building_standards, BUILDING_CODE_LABELS),
    );
    lines.push(String::new());

    push_section(&mut lines, "**5. その他の留意点**");
    lines.push(match &batch.municipal {
        Determination::Determined(restrictions) if !restrictions.trim().is_empty() => {
            restrictions.trim().replace('\n', " ")
        }
        _ => NO_RESTRICTIONS.to_string(),
    });

    lines.join("\n")
}

fn push_section(lines: &mut Vec<String>, heading: &str) {
    lines.push(heading.to_string());
    lines.push(String::new());
}

/// Entries separated by blank lines, followed by one trailing blank line.
fn push_entries(lines: &mut Vec<String>, entries: &[String]) {
    for (idx, entry) in entries.iter().enumerate() {
        if idx > 0 {
            lines.push(String::new());
        }
        lines.push(entry.clone());
    }
    lines.push(String::new());
}

fn permission_entries(outcome: &Determination<PermissionDetermination>) -> Vec<String> {
    match outcome {
        Determination::Determined(parsed) => vec![
            format!("許可判定: {}", parsed.judgement),
            format!("主な理由: {}", parsed.reason),
            format!("その他制限: {}", parsed.restrictions),
        ],
        Determination::Failed(_) => vec![
            format!("許可判定: {NOT_DETERMINABLE}"),
            format!("主な理由: {DETERMINATION_ERROR}"),
            format!("その他制限: {NO_RESTRICTIONS}"),
        ],
    }
}

fn requirement_entries(outcome: &Determination<Requirements>, labels: &[&str]) -> Vec<String> {
    labels
        .iter()
        .map(|label| match outcome {
            Determination::Determined(requirements) => {
                format!("{label}: {}", requirements.get(label))
            }
            Determination::Failed(_) => format!("{label}: {NOT_DETERMINABLE}"),
        })
        .collect()
}
