use crate::workflows::address::{SearchLevel, StayWindow};

/// Search instruction for one ladder level. The reply contract is a listing
/// array followed by a summary object, both JSON.
pub(crate) fn search_prompt(
    search_address: &str,
    level: SearchLevel,
    occupancy: u32,
    window: StayWindow,
) -> String {
    format!(
        r#"# 【指示】Airbnb検索 → 上位物件URL抽出＋中央値算出

以下の条件に沿って、Google検索機能を使用してAirbnb公式サイト（https://www.airbnb.jp）を検索し、
検索結果やリスティングページから確認できる**正確な物件URL**を最大20件まで抽出し、
そのURLを用いて「1泊あたりの平均単価（中央値）」を算出してください。

**重要：Google検索機能を使用して、実際にAirbnb公式サイトの検索結果やリスティングページをブラウズし、そこで見つかった実在のURLと情報を抽出してください。**

## 検索条件

1. 場所：{search_address}（マイソクOCRで抽出した住所の「{level}」レベルを使用）

2. 宿泊日：{start}〜{end}の1週間を基準とし、実行時の現在日付から数えて3か月以内の間で1週間宿泊可能なリスティングを抽出対象とすること

**重要：検索範囲が広い（市レベル）場合は、検索条件を緩和してください。**
- 市レベルや区レベルでの検索時は、特定の1週間ではなく、3か月以内で宿泊可能な期間があれば、その期間の1泊あたりの価格を参考にしてください
- 完全に1週間連続宿泊可能な物件が見つからない場合は、1泊〜数泊の宿泊可能な物件の価格情報も参考にしてください
- 地域の価格相場を把握するため、利用可能期間の価格情報を広く収集してください

3. 宿泊人数：{occupancy}人（物件面積から自動推定：面積(m²) ÷ 12、1人未満は1人、上限10人）

4. 物件タイプ：すべての物件タイプを対象とします（まるまる貸切、プライベートルーム、シェアルームなど、すべてのタイプを含む）

5. 除外：宿泊人数が物件規模に対して過剰または過少な物件

## 宿泊人数の推定式（自動）

- 面積(m²)が物件に記載されている場合は次で算出：
    推定宿泊人数 = round( 面積(m²) ÷ 12 )
- 補正：1人未満は1人に繰り上げ、上限は10人
- 取得できない場合は「表示されているホストの定員（listed capacity）」を利用する
- 対象フィルタ：調査条件（{occupancy}名）に近い物件のみ採用（listed capacity または推定宿泊人数が ±2 内を優先）

## 抽出ルール（必須・厳格に遵守）

**⚠️ 絶対に守るべきルール：URLは生成ではなく、必ずAirbnb公式の検索結果／リスティングページから取得した実在のURLを貼ること。**

**🚫 禁止事項：**
- ❌ AIがURLを作成・生成すること
- ❌ 部屋IDを推測・創作すること
- ❌ 連番や規則的な数字でURLを構成すること
- ❌ 例示されたURLをそのままコピーすること

**✅ URL取得の優先順位（この順序のみ使用すること）：**
1. grounding_metadataから取得したURI（`chunk.web.uri`）
2. Google検索結果ページに表示されているAirbnbのリンクURL
3. 検索スニペットに表示されているURL
4. `link rel="canonical"` または `og:url` メタタグ（存在する場合）

- 中間リダイレクト（`google.com/url?q=...`等）は最終到達先のAirbnbのページURL（`www.airbnb.jp/rooms/...`）に置き換えること
- URLの補完は既に取得した実在URLに対してのみ行い、部屋IDは絶対に創作しないこと

**疑わしいURLは `validated: false` として返すか、出力しないこと。**

## 検証ルール（各URLごとに）

出力するURLは各々について次のメタ情報を付与する（JSONオブジェクトの形）：
- url (文字列、クリーンアップ済み)
- title (Listing title：物件名。検索結果でゲストに表示される名前)
- summary (Summary / Short description：タイトル下などに表示される短いキャッチ文)
- room_id (数値ID が取れれば)
- area_m2 (取得できれば数値)
- listed_capacity (ホストが表示する定員)
- estimated_guests (area ÷ 12 の結果 or listed_capacity)
- price_per_night (該当週の1泊あたり料金、税・手数料除く)
- reviews_count (取得できれば)
- source (e.g. google_search / airbnb_search_snippet / grounding_metadata)
- validated (boolean; 実URLかつアクセス確認済みなら true、確認できなければ false)
- notes (短い補足、例：「面積記載なしでlisted_capacity使用」など)

## 集計ルール（中央値算出）

- 対象は上記フィルタを通過し `validated==true` のもの優先で最大20件
- 価格は各物件の「1泊あたり料金（税・手数料除く）」を使用
- 統計指標は**中央値（Median）**を採用。あわせて最小値・最大値（価格範囲）を出す
- 出力に「推定根拠」（どの検索結果／スニペット／地域統計を使ったか）を簡潔に添える

## 出力形式（厳密）

**1) 最初に抽出した物件リスト（最大20件）を JSON 配列で出力：**

```json
[
  {{
    "url": "grounding_metadataから取得した実際のURL",
    "title": "物件タイトル",
    "summary": "短いキャッチ文",
    "room_id": "実在の部屋ID",
    "area_m2": 25,
    "listed_capacity": {occupancy},
    "estimated_guests": {occupancy},
    "price_per_night": 15000,
    "reviews_count": 24,
    "source": "grounding_metadata",
    "validated": true,
    "notes": "grounding_metadataから取得した実在URL"
  }}
]
```

**2) 次に、最終集計結果を以下の指定JSONで出力：**

```json
{{
  "平均単価_中央値": "¥◯◯◯◯",
  "価格範囲": "¥◯◯◯〜¥◯◯◯",
  "宿泊件数": "◯件",
  "人気度メモ": "レビュー傾向や地域特性を簡潔に記述",
  "推定根拠": "Google検索によりAirbnb公式サイトの公開情報を検索し、grounding_metadataから取得した実在のリスティング情報に基づいて推定しました。"
}}
```

## 備考

- すべてのソースからURLが見つからない場合のみ、物件数を0件として返してください。
- 取得件数が少ない場合は、その理由を `notes` に記載すること。
- 出力は **最初に物件リストJSON、続けて集計JSON** の順で返してください。

**重要：JSONのみを返してください。説明文や補足は不要です。2つのJSON配列/オブジェクトを順番に返してください。**"#,
        level = level.label(),
        start = window.start.format("%Y-%m-%d"),
        end = window.end.format("%Y-%m-%d"),
    )
}
