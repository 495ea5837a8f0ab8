//! Flyer OCR through the vision oracle, followed by address-candidate
//! extraction, validation and scoring over the recognised text.

use crate::oracle::{OracleError, VisionOracle};
use crate::workflows::address::PREFECTURES;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{info, warn};

pub const OCR_PROMPT: &str = "あなたは高精度な日本語OCRアシスタントです。
画像内のテキストを以下の制約に従って抽出してください:
– 文字の配置や段落構造を維持する。
– 数字、記号、特殊文字も正確に認識する。
– 文脈を考慮して誤認識を修正する。
– 一文の途中の改行は削除する。
– 住所の場合は都道府県名を含む完全な住所として抽出する（例：「県○○市...」ではなく「新潟県○○市...」のように）。

画像内のすべてのテキストを抽出してください。";

const OCR_CONFIDENCE: f32 = 95.0;
const LOCATION_TERMINATORS: &[&str] = &["交通", "建物"];

/// Municipalities whose prefecture is restored when OCR drops it.
const MUNICIPALITY_PREFECTURES: &[(&str, &str)] = &[
    ("長岡市", "新潟県"),
    ("新潟市", "新潟県"),
    ("上越市", "新潟県"),
    ("三条市", "新潟県"),
    ("柏崎市", "新潟県"),
    ("新発田市", "新潟県"),
    ("小千谷市", "新潟県"),
    ("加茂市", "新潟県"),
    ("十日町市", "新潟県"),
    ("見附市", "新潟県"),
    ("村上市", "新潟県"),
    ("燕市", "新潟県"),
    ("糸魚川市", "新潟県"),
    ("妙高市", "新潟県"),
    ("五泉市", "新潟県"),
    ("阿賀野市", "新潟県"),
    ("佐渡市", "新潟県"),
    ("魚沼市", "新潟県"),
    ("南魚沼市", "新潟県"),
    ("胎内市", "新潟県"),
];

static LOCATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"物件所在地\s*([^\n]+)").expect("valid location regex"));
static FULL_ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[都道府県][^都道府県\s]*?[市区町村][^市区町村\s]*?[町字][^町字\s]*?[0-9]+[丁目]*\s*[0-9\-]+")
        .expect("valid full address regex")
});
static COMPLETE_ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s]*[都道府県].*[市区町村].*[0-9]").expect("valid complete address regex")
});
static LEADING_MUNICIPALITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?[市区町村])").expect("valid municipality regex"));
static TOWN_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[都道府県].*[市区町村].*[町字].*[0-9]").expect("valid town number regex")
});
static LOT_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+\s*[-－]\s*[0-9]+").expect("valid lot regex"));
static DIGIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]").expect("valid digit regex"));

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("画像データが空です")]
    EmptyImage,
    #[error("ファイルサイズが上限を超えています ({size} bytes > {limit} bytes)")]
    FileTooLarge { size: usize, limit: usize },
    #[error("対応していないファイル形式です: {0}")]
    UnsupportedMedia(String),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("画像からテキストを抽出できませんでした")]
    NoText,
}

impl OcrError {
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::Oracle(err) if err.is_quota())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrLine {
    pub text: String,
    pub confidence: f32,
    pub method: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressCandidate {
    pub address: String,
    pub score: usize,
}

/// Recognised lines plus the ranked address candidates found in them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrExtraction {
    pub lines: Vec<OcrLine>,
    pub candidates: Vec<AddressCandidate>,
}

impl OcrExtraction {
    /// Treats already-transcribed flyer text as an extraction.
    pub fn from_text(text: &str) -> Self {
        let lines: Vec<OcrLine> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| OcrLine {
                text: line.to_string(),
                confidence: 100.0,
                method: "text",
            })
            .collect();
        let candidates = address_candidates(text);
        Self { lines, candidates }
    }

    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn best_address(&self) -> Option<&str> {
        self.candidates.first().map(|candidate| candidate.address.as_str())
    }

    /// Explanation shown when no address could be picked out.
    pub fn diagnostic(&self) -> String {
        let mut detail = "住所を抽出できませんでした".to_string();
        if self.lines.is_empty() {
            detail.push_str("（画像からテキストが抽出できませんでした）");
            return detail;
        }
        detail.push_str(&format!("（抽出されたテキスト: {}行）", self.lines.len()));
        const HINTS: &[&str] = &[
            "物件", "所在地", "都", "県", "市", "区", "町", "村", "丁目", "番地",
        ];
        let address_like = self
            .lines
            .iter()
            .filter(|line| HINTS.iter().any(|hint| line.text.contains(hint)))
            .count();
        if address_like > 0 {
            detail.push_str(&format!("（住所らしきテキストを{address_like}件発見）"));
        }
        detail
    }
}

/// Rejects payloads that are empty, oversized, or neither an image nor a PDF.
pub fn validate_upload(bytes: &[u8], media_type: &str, max_bytes: usize) -> Result<(), OcrError> {
    if bytes.is_empty() {
        return Err(OcrError::EmptyImage);
    }
    if bytes.len() > max_bytes {
        return Err(OcrError::FileTooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }
    let parsed: mime::Mime = media_type
        .parse()
        .map_err(|_| OcrError::UnsupportedMedia(media_type.to_string()))?;
    let supported = parsed.type_() == mime::IMAGE
        || (parsed.type_() == mime::APPLICATION && parsed.subtype() == mime::PDF);
    if !supported {
        return Err(OcrError::UnsupportedMedia(media_type.to_string()));
    }
    Ok(())
}

#[derive(Debug)]
pub struct OcrPipeline<'a> {
    oracle: &'a dyn VisionOracle,
    max_bytes: usize,
}

impl<'a> OcrPipeline<'a> {
    pub fn new(oracle: &'a dyn VisionOracle, max_bytes: usize) -> Self {
        Self { oracle, max_bytes }
    }

    /// One [`OcrLine`] per non-empty line of the oracle's transcription.
    pub fn extract_text(&self, image: &[u8], media_type: &str) -> Result<Vec<OcrLine>, OcrError> {
        validate_upload(image, media_type, self.max_bytes)?;
        let response = self.oracle.read_image(OCR_PROMPT, image, media_type).map_err(|err| {
            if err.is_quota() {
                warn!(error = %err, "vision oracle quota exhausted");
            }
            OcrError::Oracle(err)
        })?;

        let lines: Vec<OcrLine> = response
            .text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| OcrLine {
                text: line.to_string(),
                confidence: OCR_CONFIDENCE,
                method: "gemini",
            })
            .collect();
        if lines.is_empty() {
            return Err(OcrError::NoText);
        }
        info!(lines = lines.len(), "ocr text extracted");
        Ok(lines)
    }

    pub fn extract(&self, image: &[u8], media_type: &str) -> Result<OcrExtraction, OcrError> {
        let lines = self.extract_text(image, media_type)?;
        let text = lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let candidates = address_candidates(&text);
        Ok(OcrExtraction { lines, candidates })
    }
}

/// Ranked complete-address candidates, best first.
pub fn address_candidates(text: &str) -> Vec<AddressCandidate> {
    let mut found: Vec<String> = Vec::new();
    let mut labelled: HashSet<String> = HashSet::new();

    for caps in LOCATION_RE.captures_iter(text) {
        let value = cut_at_terminator(&caps[1]);
        if value.is_empty() {
            continue;
        }
        let relaxed = has_any(value, &["都", "道", "府", "県"])
            && has_any(value, &["市", "区", "町", "村"])
            && DIGIT_RE.is_match(value);
        if is_valid_address(value) || relaxed {
            found.push(value.to_string());
            labelled.insert(value.to_string());
        }
    }

    for matched in FULL_ADDRESS_RE.find_iter(text) {
        let value = with_preceding_prefecture(text, matched.start(), matched.as_str().trim());
        if is_valid_address(&value) && !found.contains(&value) {
            found.push(value);
        }
    }

    let mut seen = HashSet::new();
    let mut candidates: Vec<AddressCandidate> = found
        .into_iter()
        .map(|address| {
            let was_labelled = labelled.contains(&address);
            (complete_prefecture(&address), was_labelled)
        })
        .filter(|(address, _)| !starts_with_bare_prefecture_suffix(address))
        .filter(|(address, _)| COMPLETE_ADDRESS_RE.is_match(address))
        .filter(|(address, _)| seen.insert(address.clone()))
        .map(|(address, was_labelled)| AddressCandidate {
            score: score(&address, was_labelled),
            address,
        })
        .collect();

    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    candidates
}

pub fn best_address(text: &str) -> Option<String> {
    address_candidates(text)
        .into_iter()
        .next()
        .map(|candidate| candidate.address)
}

/// Heuristic check that a string reads like a complete address.
pub fn is_valid_address(text: &str) -> bool {
    if text.chars().count() < 5 {
        return false;
    }
    let has_prefecture = has_any(text, &["都", "道", "府", "県"]);
    let has_municipality = has_any(text, &["市", "区", "町", "村"]);
    let has_number = DIGIT_RE.is_match(text);
    let has_address_chars = has_any(text, &["町", "字", "丁目", "番地", "号"]);

    let head: String = text.chars().take(10).collect();
    if (text.starts_with('県') || text.starts_with('市'))
        && !has_any(&head, &["都", "道", "府", "県"])
    {
        return false;
    }

    has_prefecture && has_municipality && (has_address_chars || has_number)
}

/// Restores the prefecture for an address that starts with a bare
/// 都/道/府/県 when the following municipality is known.
pub fn complete_prefecture(address: &str) -> String {
    let Some(rest) = address
        .strip_prefix(['都', '道', '府', '県'])
        .filter(|rest| !rest.is_empty())
    else {
        return address.to_string();
    };
    let municipality = LEADING_MUNICIPALITY_RE
        .captures(rest)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str());
    match municipality.and_then(|name| {
        MUNICIPALITY_PREFECTURES
            .iter()
            .find(|(municipality, _)| *municipality == name)
    }) {
        Some((_, prefecture)) => format!("{prefecture}{rest}"),
        None => address.to_string(),
    }
}

fn score(address: &str, labelled: bool) -> usize {
    let mut score = address.chars().count();
    if labelled {
        score += 1000;
    }
    if TOWN_NUMBER_RE.is_match(address) {
        score += 500;
    }
    if LOT_NUMBER_RE.is_match(address) {
        score += 100;
    }
    score
}

fn cut_at_terminator(value: &str) -> &str {
    let end = LOCATION_TERMINATORS
        .iter()
        .filter_map(|terminator| value.find(terminator))
        .min()
        .unwrap_or(value.len());
    value[..end].trim().trim_start_matches([':', '：']).trim_start()
}

/// The full-address pattern anchors on the prefecture suffix character, so a
/// match can begin mid-name (`県長岡市...`). Reattach the official name when
/// the text right before the match completes it.
fn with_preceding_prefecture(text: &str, start: usize, matched: &str) -> String {
    let before = &text[..start];
    PREFECTURES
        .iter()
        .find_map(|prefecture| {
            let mut chars = prefecture.chars();
            let suffix = chars.next_back()?;
            let stem = chars.as_str();
            (matched.starts_with(suffix) && !stem.is_empty() && before.ends_with(stem))
                .then(|| format!("{stem}{matched}"))
        })
        .unwrap_or_else(|| matched.to_string())
}

fn starts_with_bare_prefecture_suffix(address: &str) -> bool {
    address.starts_with(['都', '道', '府', '県'])
}

fn has_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| text.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{DisabledOracle, OracleResponse};

    #[derive(Debug)]
    struct TranscribingOracle(&'static str);

    impl VisionOracle for TranscribingOracle {
        fn read_image(
            &self,
            _prompt: &str,
            _image: &[u8],
            _mime_type: &str,
        ) -> Result<OracleResponse, OracleError> {
            Ok(OracleResponse::text(self.0))
        }
    }

    #[test]
    fn labelled_location_wins_over_longer_free_text() {
        let text = "物件所在地 新潟県長岡市大手通1-2-3 交通 JR長岡駅徒歩5分\n\
                    お問い合わせ 新潟県新潟市万代町5-10 ビル管理室";
        let candidates = address_candidates(text);
        assert_eq!(candidates[0].address, "新潟県長岡市大手通1-2-3");
        assert!(candidates[0].score > 1000);
        assert_eq!(candidates[1].address, "新潟県新潟市万代町5-10");
    }

    #[test]
    fn location_value_stops_at_building_label() {
        assert_eq!(
            best_address("物件所在地：東京都渋谷区神宮前1-2-3建物構造 RC造").as_deref(),
            Some("東京都渋谷区神宮前1-2-3")
        );
    }

    #[test]
    fn full_pattern_keeps_prefecture_written_before_match() {
        let best = best_address("所在 新潟県長岡市殿町2丁目3-4").expect("address found");
        assert_eq!(best, "新潟県長岡市殿町2丁目3-4");
    }

    #[test]
    fn completes_dropped_niigata_prefecture() {
        assert_eq!(complete_prefecture("県長岡市大手通1-2"), "新潟県長岡市大手通1-2");
        assert_eq!(complete_prefecture("県横浜市中区1-2"), "県横浜市中区1-2");
        assert_eq!(complete_prefecture("東京都渋谷区"), "東京都渋谷区");
    }

    #[test]
    fn address_validation_rules() {
        assert!(is_valid_address("東京都渋谷区神宮前1-2-3"));
        assert!(!is_valid_address("東京都"));
        assert!(!is_valid_address("市役所前バス停 3番"));
        assert!(!is_valid_address("電話 0258-12-3456"));
    }

    #[test]
    fn rejects_bad_uploads() {
        assert!(matches!(
            validate_upload(&[], "image/png", 10),
            Err(OcrError::EmptyImage)
        ));
        assert!(matches!(
            validate_upload(&[0; 11], "image/png", 10),
            Err(OcrError::FileTooLarge { size: 11, limit: 10 })
        ));
        assert!(matches!(
            validate_upload(&[0; 4], "text/plain", 10),
            Err(OcrError::UnsupportedMedia(_))
        ));
        assert!(validate_upload(&[0; 4], "application/pdf", 10).is_ok());
        assert!(validate_upload(&[0; 4], "image/jpeg", 10).is_ok());
    }

    #[test]
    fn pipeline_splits_lines_and_ranks_addresses() {
        let oracle = TranscribingOracle("賃貸マンション\n\n物件所在地 東京都渋谷区神宮前1-2-3\n 賃料 80,000円 ");
        let pipeline = OcrPipeline::new(&oracle, 1024);
        let extraction = pipeline.extract(b"png", "image/png").expect("ocr succeeds");

        assert_eq!(extraction.lines.len(), 3);
        assert_eq!(extraction.lines[2].text, "賃料 80,000円");
        assert_eq!(extraction.lines[0].confidence, 95.0);
        assert_eq!(extraction.best_address(), Some("東京都渋谷区神宮前1-2-3"));
    }

    #[test]
    fn unavailable_oracle_is_reported() {
        let oracle = DisabledOracle::new("no key");
        let pipeline = OcrPipeline::new(&oracle, 1024);
        let err = pipeline.extract_text(b"png", "image/png").expect_err("oracle disabled");
        assert!(matches!(err, OcrError::Oracle(OracleError::Unavailable(_))));
    }

    #[test]
    fn diagnostic_counts_address_like_lines() {
        let extraction = OcrExtraction {
            lines: vec![
                OcrLine {
                    text: "新築".into(),
                    confidence: 95.0,
                    method: "gemini",
                },
                OcrLine {
                    text: "所在地 長岡".into(),
                    confidence: 95.0,
                    method: "gemini",
                },
            ],
            candidates: Vec::new(),
        };
        assert_eq!(
            extraction.diagnostic(),
            "住所を抽出できませんでした（抽出されたテキスト: 2行）（住所らしきテキストを1件発見）"
        );
    }
}
