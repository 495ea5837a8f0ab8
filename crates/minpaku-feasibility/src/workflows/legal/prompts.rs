//! Oracle instructions for the statute checks. The label lines in each
//! template are what [`super::template`] parses back, so the two must move
//! together.

use super::StatuteInputs;

pub(crate) fn property_facts(ocr_text: &str) -> String {
    format!(
        r#"以下の不動産広告のテキストから、以下の項目を抽出してJSON形式で返してください。
各項目が見つからない場合は、該当する項目を省略してください。

抽出テキスト:
{ocr_text}

抽出項目:
- 所在地: 物件の住所または所在地
- 建物用途: 戸建て、マンション、アパートのいずれか（省略可）
- 構造: 木造、鉄骨造、RC造（鉄筋コンクリート造）、SRC造（鉄骨鉄筋コンクリート造）のいずれか（省略可）
- 階数: 例「2階建」「3階建て」「5階建て」などの形式（省略可）
- 延べ床面積: 民泊で使用予定の部屋の延べ床面積（数値のみ、単位なし、省略可）

JSON形式で、以下の構造で返してください:
{{
  "所在地": "住所",
  "建物用途": "戸建て|マンション|アパート",
  "構造": "木造|鉄骨造|RC造|SRC造",
  "階数": "階数表記（例：2階建）",
  "延べ床面積": "面積（数値のみ、単位なし）"
}}

不明な項目は省略してください。JSONのみを返してください。"#
    )
}

pub(crate) fn minpaku_law(inputs: &StatuteInputs) -> String {
    format!(
        "物件情報に基づいて、民泊新法（住宅宿泊事業法）の許可可能性を簡潔に判定してください。

物件情報:
- 用途地域: {zoning}
- 所在地: {address}

以下の形式で厳密に回答してください（各項目は1行で簡潔に）:

許可判定: [許可 / 不許可]
主な理由: [用途地域や条例に基づく簡潔な説明を1行で]
その他制限: [自治体独自の制限がある場合のみ記載、なければ「特になし」]

例:
許可判定: 許可
主な理由: 住居専用地域だが条例制限なし
その他制限: 年間180日制限あり",
        zoning = inputs.zoning_type,
        address = inputs.address,
    )
}

pub(crate) fn ryokan_law(inputs: &StatuteInputs) -> String {
    format!(
        "物件情報に基づいて、旅館業法の許可可能性を簡潔に判定してください。

物件情報:
- 用途地域: {zoning}
- 所在地: {address}

以下の形式で厳密に回答してください（各項目は1行で簡潔に）:

許可判定: [許可 / 不許可 / 条件付き許可]
主な理由: [条例・立地要件などを簡潔に1行で記載]
その他制限: [特記事項のみ、なければ「特になし」]

例:
許可判定: 条件付き許可
主な理由: 学校から100m以内の場合制限あり
その他制限: 特になし",
        zoning = inputs.zoning_type,
        address = inputs.address,
    )
}

pub(crate) fn special_zone(inputs: &StatuteInputs) -> String {
    format!(
        "物件情報に基づいて、特区民泊（国家戦略特別区域法に基づく民泊）の許可可能性を簡潔に判定してください。

物件情報:
- 用途地域: {zoning}
- 所在地: {address}

まず、{address}の市区町村で特区民泊が認められているかを確認してください。
次に、用途地域の情報を用いて許可可能性を判定してください。

以下の形式で厳密に回答してください（各項目は1行で簡潔に）:

許可判定: [許可 / 不許可]
主な理由: [特区指定の有無など簡潔に1行で]
その他制限: [該当自治体の特例がある場合のみ、なければ「特になし」]

例:
許可判定: 不許可
主な理由: 特区指定外エリア
その他制限: 特になし",
        zoning = inputs.zoning_type,
        address = inputs.address,
    )
}

pub(crate) fn fire_code(inputs: &StatuteInputs) -> String {
    format!(
        "以下の建物情報に基づいて、消防法上の必要な設備・要件を簡潔に調査してください。

{building}

以下の形式で厳密に回答してください（各項目は1行で簡潔に）:

火災報知器: [必要設備を簡潔に1行で]
竪穴区画: [要 / 不要 と理由を1行で]
その他留意点: [消火器・誘導灯・防炎物品など主要義務のみ簡潔に1行で]

例:
火災報知器: 住宅用火災警報器で可
竪穴区画: 不要（2階建・延べ150㎡のため）
その他留意点: 消火器設置義務あり",
        building = building_block(inputs),
    )
}

pub(crate) fn building_standards(inputs: &StatuteInputs) -> String {
    format!(
        "以下の建物情報に基づいて、建築基準法上の必要な要件を簡潔に調査してください。

{building}

以下の形式で厳密に回答してください（各項目は1行で簡潔に）:

用途変更: [要 / 不要 と理由を1行で]
竪穴区画: [要 / 不要 と理由を1行で]
その他制限: [主要な注意点を簡潔に1行で]
接道義務: [該当有無と簡潔な説明を1行で]

例:
用途変更: 不要（200㎡未満）
竪穴区画: 不要
接道義務: 旅館業を申請する場合、幅員4m以上の道路に2m以上接する義務あり
その他制限: 採光・換気要件あり",
        building = building_block(inputs),
    )
}

pub(crate) fn municipal(inputs: &StatuteInputs) -> String {
    format!(
        "{address}の市区町村で、民泊運営に関して独自の規制や注意点があるか調査してください。

自治体独自の規制や注意点がある場合のみ簡潔に記載してください。
制限事項がなければ「特になし」と記載してください。

回答は1行で簡潔に記載してください。",
        address = inputs.address,
    )
}

pub(crate) fn next_actions(results_summary: &[String]) -> String {
    format!(
        "以下の法令判定結果を基に、民泊開業に向けた「次に取るべきアクション」を箇条書きで生成してください。

判定結果:
{summary}

重要な注意事項:
1. 判定結果と矛盾するアクションは絶対に出力しない
2. 各判定項目に基づいて具体的なアクションを生成する
   - 例：竪穴区画判定が「不要」なら「竪穴区画に関する工事は不要」と明記
   - 例：消火器判定が「必要」なら「消火器を設置してください」と明記
3. 各法令ごとにアクションを整理:
   - 民泊新法／旅館業法：手続き・届出・設備確認など
   - 消防法：火災報知器、消火器、竪穴区画、誘導灯など
   - 建築基準法：用途変更、竪穴区画、採光・換気、接道義務など
4. 推奨アクションとして、必要な手続き・設備・専門家相談などをまとめて提示
5. 表示形式は箇条書きで簡潔に（各項目は1〜2行程度）

出力形式（Markdown形式）:
- 見出しは **見出し名** 形式
- 箇条書きは各項目を独立した行で表示
- 見出しの後には空行を入れる

「次に取るべきアクション」を生成してください:",
        summary = results_summary.join("\n"),
    )
}

fn building_block(inputs: &StatuteInputs) -> String {
    format!(
        "建物情報:
- 用途: {}
- 構造: {}
- 階数: {}
- 延べ床面積: {}㎡（民泊で使用予定の部屋）",
        inputs.building_use, inputs.structure, inputs.floors, inputs.floor_area
    )
}
