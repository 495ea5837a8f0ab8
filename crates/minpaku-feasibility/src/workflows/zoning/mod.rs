//! Point-in-polygon zoning lookup across prefecture-partitioned GeoJSON
//! datasets.
//!
//! Datasets live under `<data_dir>/<prefecture-key>/*.geojson`. A lookup
//! narrows the candidate files with the prefecture hint, loads each file
//! once per process, and returns the first containing polygon that carries a
//! classification. Overlapping polygons are not reconciled: file order, then
//! record order, decides.

mod attributes;
mod catalog;
mod dataset;
mod info;
mod projection;

pub use attributes::{zoning_code, zoning_type, UNKNOWN_ZONING, ZONING_CODE_KEYS, ZONING_TYPE_KEYS};
pub use catalog::{prefecture_key, PrefectureFiles, ZoningCatalog};
pub use dataset::{DatasetCache, DatasetError, ScanMode, ZoningDataset};
pub use info::{zoning_info, ZoningInfo};
pub use projection::PlaneRectangular;

use crate::workflows::geocode::GeoCoordinate;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const SAMPLE_FILE_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoningMatch {
    pub zoning_type: String,
    pub zoning_code: String,
    pub properties: Map<String, Value>,
    pub source_dataset: PathBuf,
    pub coordinate: GeoCoordinate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoningMiss {
    pub reason: String,
    pub files_checked: usize,
    pub sample_files: Vec<PathBuf>,
}

/// Lookup result. A miss is an expected outcome where public data is
/// incomplete, so it is not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ZoningOutcome {
    Found(ZoningMatch),
    NotFound(ZoningMiss),
}

impl ZoningOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn as_match(&self) -> Option<&ZoningMatch> {
        match self {
            Self::Found(found) => Some(found),
            Self::NotFound(_) => None,
        }
    }

    /// Classification for downstream prompts, `不明` on a miss.
    pub fn zoning_type(&self) -> &str {
        self.as_match()
            .map(|found| found.zoning_type.as_str())
            .unwrap_or(UNKNOWN_ZONING)
    }
}

#[derive(Debug, Clone)]
pub struct ZoningLookupEngine {
    catalog: ZoningCatalog,
    cache: Arc<DatasetCache>,
}

impl ZoningLookupEngine {
    pub fn new(catalog: ZoningCatalog) -> Self {
        Self::with_cache(catalog, Arc::new(DatasetCache::new()))
    }

    pub fn with_cache(catalog: ZoningCatalog, cache: Arc<DatasetCache>) -> Self {
        Self { catalog, cache }
    }

    pub fn from_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self::new(ZoningCatalog::scan(data_dir))
    }

    pub fn catalog(&self) -> &ZoningCatalog {
        &self.catalog
    }

    pub fn lookup(&self, coordinate: GeoCoordinate, prefecture_hint: Option<&str>) -> ZoningOutcome {
        let files = self.catalog.candidates(prefecture_hint);
        if files.is_empty() {
            warn!(dir = %self.catalog.data_dir().display(), "no zoning datasets available");
            return ZoningOutcome::NotFound(ZoningMiss {
                reason: "対応するGeoJSONファイルが見つかりません".to_string(),
                files_checked: 0,
                sample_files: Vec::new(),
            });
        }

        info!(
            lat = coordinate.latitude,
            lon = coordinate.longitude,
            candidates = files.len(),
            "zoning lookup started"
        );

        let mut files_checked = 0usize;
        for path in &files {
            let dataset = match self.cache.get_or_load(path) {
                Ok(dataset) => dataset,
                Err(err) => {
                    warn!(error = %err, "skipping zoning dataset");
                    continue;
                }
            };
            files_checked += 1;

            let hit = dataset
                .containing(coordinate.longitude, coordinate.latitude)
                .into_iter()
                .find_map(|record| {
                    zoning_type(&record.properties).map(|zoning_type| (zoning_type, record))
                });

            if let Some((zoning_type, record)) = hit {
                info!(%zoning_type, file = %path.display(), "zoning resolved");
                return ZoningOutcome::Found(ZoningMatch {
                    zoning_code: zoning_code(&record.properties),
                    zoning_type,
                    properties: record.properties.clone(),
                    source_dataset: path.clone(),
                    coordinate,
                });
            }
        }

        warn!(files_checked, total = files.len(), "zoning not found");
        ZoningOutcome::NotFound(ZoningMiss {
            reason: format!(
                "指定された座標({}, {})の用途地域が見つかりませんでした。チェックしたファイル数: {}",
                coordinate.latitude, coordinate.longitude, files_checked
            ),
            files_checked,
            sample_files: files.into_iter().take(SAMPLE_FILE_LIMIT).collect(),
        })
    }
}
