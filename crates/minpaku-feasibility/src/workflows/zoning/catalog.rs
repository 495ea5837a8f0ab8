use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

static PREFECTURE_KEYS: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();

/// Dataset directory key for a prefecture name. Names outside the table are
/// lowercased, so an already-romanised key passes through.
pub fn prefecture_key(prefecture: &str) -> String {
    let prefecture = prefecture.trim();
    prefecture_keys()
        .get(prefecture)
        .map(|key| key.to_string())
        .unwrap_or_else(|| prefecture.to_lowercase())
}

fn prefecture_keys() -> &'static HashMap<&'static str, &'static str> {
    PREFECTURE_KEYS.get_or_init(|| {
        const NAME_TO_KEY: &[(&str, &str)] = &[
            ("北海道", "hokkaido"),
            ("青森県", "aomori"),
            ("岩手県", "iwate"),
            ("宮城県", "miyagi"),
            ("秋田県", "akita"),
            ("山形県", "yamagata"),
            ("福島県", "fukushima"),
            ("茨城県", "ibaraki"),
            ("栃木県", "tochigi"),
            ("群馬県", "gunma"),
            ("埼玉県", "saitama"),
            ("千葉県", "chiba"),
            ("東京都", "tokyo"),
            ("神奈川県", "kanagawa"),
            ("新潟県", "niigata"),
            ("富山県", "toyama"),
            ("石川県", "ishikawa"),
            ("福井県", "fukui"),
            ("山梨県", "yamanashi"),
            ("長野県", "nagano"),
            ("岐阜県", "gifu"),
            ("静岡県", "shizuoka"),
            ("愛知県", "aichi"),
            ("三重県", "mie"),
            ("滋賀県", "shiga"),
            ("京都府", "kyoto"),
            ("大阪府", "osaka"),
            ("兵庫県", "hyogo"),
            ("奈良県", "nara"),
            ("和歌山県", "wakayama"),
            ("鳥取県", "tottori"),
            ("島根県", "shimane"),
            ("岡山県", "okayama"),
            ("広島県", "hiroshima"),
            ("山口県", "yamaguchi"),
            ("徳島県", "tokushima"),
            ("香川県", "kagawa"),
            ("愛媛県", "ehime"),
            ("高知県", "kochi"),
            ("福岡県", "fukuoka"),
            ("佐賀県", "saga"),
            ("長崎県", "nagasaki"),
            ("熊本県", "kumamoto"),
            ("大分県", "oita"),
            ("宮崎県", "miyazaki"),
            ("鹿児島県", "kagoshima"),
            ("沖縄県", "okinawa"),
        ];
        NAME_TO_KEY.iter().copied().collect()
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefectureFiles {
    pub prefecture: String,
    pub file_count: usize,
    pub files: Vec<PathBuf>,
}

/// Index of `<data_dir>/<prefecture-key>/*.geojson`, built once at startup.
///
/// Keys and files are kept sorted so that scan order, and therefore the
/// first-match tie-break, is stable across runs.
#[derive(Debug, Clone, Default)]
pub struct ZoningCatalog {
    data_dir: PathBuf,
    files: BTreeMap<String, Vec<PathBuf>>,
}

impl ZoningCatalog {
    pub fn scan(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let mut files = BTreeMap::new();

        let entries = match fs::read_dir(&data_dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %data_dir.display(), error = %err, "zoning data directory unreadable");
                return Self { data_dir, files };
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(key) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let datasets = geojson_files_in(&path);
            if !datasets.is_empty() {
                info!(prefecture = key, count = datasets.len(), "found zoning datasets");
                files.insert(key.to_string(), datasets);
            }
        }

        Self { data_dir, files }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn available_prefectures(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    pub fn file_info(&self) -> Vec<PrefectureFiles> {
        self.files
            .iter()
            .map(|(prefecture, files)| PrefectureFiles {
                prefecture: prefecture.clone(),
                file_count: files.len(),
                files: files.clone(),
            })
            .collect()
    }

    pub fn all_files(&self) -> Vec<PathBuf> {
        self.files.values().flatten().cloned().collect()
    }

    /// Files registered for a prefecture, by romanised key first and by the
    /// raw name second.
    pub fn files_for(&self, prefecture: &str) -> Option<&[PathBuf]> {
        self.files
            .get(&prefecture_key(prefecture))
            .or_else(|| self.files.get(prefecture))
            .map(Vec::as_slice)
    }

    /// Candidate files for a lookup: the hinted prefecture when it has data,
    /// otherwise every known file.
    pub fn candidates(&self, prefecture_hint: Option<&str>) -> Vec<PathBuf> {
        let hint = prefecture_hint.map(str::trim).filter(|hint| !hint.is_empty());
        if let Some(hint) = hint {
            if let Some(files) = self.files_for(hint) {
                return files.to_vec();
            }
            warn!(prefecture = hint, "no zoning datasets for prefecture; scanning all files");
        }
        self.all_files()
    }
}

fn geojson_files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| {
                    path.is_file()
                        && path
                            .extension()
                            .and_then(|ext| ext.to_str())
                            .is_some_and(|ext| ext.eq_ignore_ascii_case("geojson"))
                })
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, "{}").expect("write");
    }

    #[test]
    fn maps_prefecture_names_to_keys() {
        assert_eq!(prefecture_key("東京都"), "tokyo");
        assert_eq!(prefecture_key("沖縄県"), "okinawa");
        assert_eq!(prefecture_key("Niigata"), "niigata");
    }

    #[test]
    fn scans_prefecture_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(&dir.path().join("niigata/b.geojson"));
        touch(&dir.path().join("niigata/a.geojson"));
        touch(&dir.path().join("niigata/readme.txt"));
        touch(&dir.path().join("tokyo/13.geojson"));
        fs::create_dir_all(dir.path().join("empty")).expect("mkdir");

        let catalog = ZoningCatalog::scan(dir.path());
        assert_eq!(catalog.available_prefectures(), vec!["niigata", "tokyo"]);

        let niigata = catalog.files_for("新潟県").expect("niigata files");
        let names: Vec<_> = niigata
            .iter()
            .map(|path| path.file_name().and_then(|n| n.to_str()).expect("utf8"))
            .collect();
        assert_eq!(names, vec!["a.geojson", "b.geojson"]);

        let info = catalog.file_info();
        assert_eq!(info[0].file_count, 2);
        assert_eq!(info[1].prefecture, "tokyo");
    }

    #[test]
    fn unknown_hint_falls_back_to_every_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(&dir.path().join("niigata/a.geojson"));
        touch(&dir.path().join("tokyo/13.geojson"));

        let catalog = ZoningCatalog::scan(dir.path());
        assert_eq!(catalog.candidates(Some("大阪府")).len(), 2);
        assert_eq!(catalog.candidates(Some("東京都")).len(), 1);
        assert_eq!(catalog.candidates(None).len(), 2);
    }

    #[test]
    fn missing_directory_yields_empty_catalog() {
        let catalog = ZoningCatalog::scan("/nonexistent/zoning/data");
        assert!(catalog.is_empty());
        assert!(catalog.candidates(Some("東京都")).is_empty());
    }
}
