use super::projection::PlaneRectangular;
use geo::{BoundingRect, Contains, Geometry, MapCoords, MultiPolygon, Point};
use geojson::GeoJson;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// CRS names that are treated as geographic WGS84 without reprojection.
const GEOGRAPHIC_CRS_MARKERS: &[&str] = &["4326", "crs84", "6668", "4612"];

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid GeoJSON in {}: {source}", path.display())]
    GeoJson {
        path: PathBuf,
        source: Box<geojson::Error>,
    },
    #[error("{} is not a feature collection", path.display())]
    NotFeatureCollection { path: PathBuf },
    #[error("{} uses unsupported coordinate reference system {crs}", path.display())]
    UnsupportedCrs { path: PathBuf, crs: String },
}

/// One polygon with its attribute table.
#[derive(Debug, Clone)]
pub struct ZoningRecord {
    pub geometry: MultiPolygon<f64>,
    pub properties: Map<String, Value>,
}

/// How containment queries walk a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Bounding-box narrowing through an R-tree, then exact containment.
    Indexed,
    /// Every record, in file order. Used when some polygon has no extent.
    Linear,
    /// Some features were malformed and dropped; the rest are scanned in
    /// file order.
    Degraded,
}

type IndexedBox = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// A loaded regional dataset. Immutable after load.
#[derive(Debug)]
pub struct ZoningDataset {
    path: PathBuf,
    records: Vec<ZoningRecord>,
    index: Option<RTree<IndexedBox>>,
    mode: ScanMode,
}

impl ZoningDataset {
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let text = fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self, DatasetError> {
        let document: GeoJson = text.parse().map_err(|source| DatasetError::GeoJson {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;

        let (features, foreign_members) = match document {
            GeoJson::FeatureCollection(collection) => {
                (collection.features, collection.foreign_members)
            }
            GeoJson::Feature(feature) => (vec![feature], None),
            GeoJson::Geometry(_) => {
                return Err(DatasetError::NotFeatureCollection {
                    path: path.to_path_buf(),
                })
            }
        };

        let projection = match foreign_members.as_ref().and_then(|members| members.get("crs")) {
            Some(crs) => plane_zone(path, crs)?,
            None => None,
        };

        let mut records = Vec::with_capacity(features.len());
        let mut unconverted = 0usize;
        for feature in features {
            let Some(geometry) = feature.geometry else {
                continue;
            };
            if has_short_ring(&geometry.value) {
                unconverted += 1;
                debug!(path = %path.display(), "skipping feature with a ring under four positions");
                continue;
            }
            match Geometry::<f64>::try_from(geometry) {
                Ok(geometry) => {
                    if let Some(geometry) = areal(geometry) {
                        let geometry = match projection {
                            Some(zone) => geometry.map_coords(move |coord| zone.to_geographic(coord)),
                            None => geometry,
                        };
                        records.push(ZoningRecord {
                            geometry,
                            properties: feature.properties.unwrap_or_default(),
                        });
                    }
                }
                Err(err) => {
                    unconverted += 1;
                    debug!(path = %path.display(), error = %err, "skipping unconvertible feature");
                }
            }
        }

        let (index, mode) = if unconverted > 0 {
            warn!(
                path = %path.display(),
                unconverted,
                kept = records.len(),
                "dataset partially unreadable; scanning the readable records"
            );
            (None, ScanMode::Degraded)
        } else {
            match build_index(&records) {
                Some(index) => (Some(index), ScanMode::Indexed),
                None => (None, ScanMode::Linear),
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            records,
            index,
            mode,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// Records whose polygon contains the point, in file order.
    pub fn containing(&self, longitude: f64, latitude: f64) -> Vec<&ZoningRecord> {
        let point = Point::new(longitude, latitude);
        let mut candidates: Vec<usize> = match (&self.index, self.mode) {
            (Some(index), ScanMode::Indexed) => index
                .locate_all_at_point(&[longitude, latitude])
                .map(|entry| entry.data)
                .collect(),
            _ => (0..self.records.len()).collect(),
        };
        candidates.sort_unstable();

        candidates
            .into_iter()
            .filter_map(|idx| self.records.get(idx))
            .filter(|record| record.geometry.contains(&point))
            .collect()
    }
}

fn areal(geometry: Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(polygon) => Some(MultiPolygon::new(vec![polygon])),
        Geometry::MultiPolygon(multi) => Some(multi),
        Geometry::GeometryCollection(collection) => {
            let polygons: Vec<_> = collection
                .into_iter()
                .filter_map(areal)
                .flat_map(|multi| multi.0)
                .collect();
            (!polygons.is_empty()).then(|| MultiPolygon::new(polygons))
        }
        _ => None,
    }
}

/// None when any record lacks a bounding box (empty geometry).
fn build_index(records: &[ZoningRecord]) -> Option<RTree<IndexedBox>> {
    let boxes = records
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            record.geometry.bounding_rect().map(|rect| {
                let (min, max) = (rect.min(), rect.max());
                GeomWithData::new(Rectangle::from_corners([min.x, min.y], [max.x, max.y]), idx)
            })
        })
        .collect::<Option<Vec<_>>>()?;
    Some(RTree::bulk_load(boxes))
}

/// A linear ring needs at least four positions. Empty rings are kept and
/// simply have no extent.
fn has_short_ring(value: &geojson::Value) -> bool {
    let short = |ring: &Vec<geojson::Position>| (1..4).contains(&ring.len());
    match value {
        geojson::Value::Polygon(rings) => rings.iter().any(short),
        geojson::Value::MultiPolygon(polygons) => polygons.iter().flatten().any(short),
        geojson::Value::GeometryCollection(members) => {
            members.iter().any(|member| has_short_ring(&member.value))
        }
        _ => false,
    }
}

/// `None` for geographic datasets, the plane zone for JGD projected ones.
fn plane_zone(path: &Path, crs: &Value) -> Result<Option<PlaneRectangular>, DatasetError> {
    let name = crs
        .pointer("/properties/name")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let lowered = name.to_ascii_lowercase();
    if name.is_empty() || GEOGRAPHIC_CRS_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return Ok(None);
    }
    let zone = epsg_code(name).and_then(PlaneRectangular::from_epsg);
    if let Some(zone) = zone {
        debug!(path = %path.display(), zone = zone.number(), "reprojecting plane rectangular dataset");
        return Ok(Some(zone));
    }
    Err(DatasetError::UnsupportedCrs {
        path: path.to_path_buf(),
        crs: name.to_string(),
    })
}

/// Trailing EPSG number of names like `EPSG:6677` or `urn:ogc:def:crs:EPSG::6677`.
fn epsg_code(name: &str) -> Option<u32> {
    let digits: String = name
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let prefix = &name[..name.len() - digits.len()];
    if !prefix.to_ascii_lowercase().contains("epsg") {
        return None;
    }
    digits.parse().ok()
}

/// Process-wide load-once cache of parsed datasets. Failed loads are not
/// cached, so a corrected file is picked up on the next lookup.
#[derive(Debug, Default)]
pub struct DatasetCache {
    loaded: Mutex<HashMap<PathBuf, Arc<ZoningDataset>>>,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&self, path: &Path) -> Result<Arc<ZoningDataset>, DatasetError> {
        if let Some(dataset) = self
            .loaded
            .lock()
            .expect("dataset cache mutex poisoned")
            .get(path)
        {
            return Ok(Arc::clone(dataset));
        }

        let dataset = Arc::new(ZoningDataset::load(path)?);
        debug!(path = %path.display(), records = dataset.len(), mode = ?dataset.mode(), "zoning dataset loaded");
        let mut loaded = self.loaded.lock().expect("dataset cache mutex poisoned");
        Ok(Arc::clone(
            loaded.entry(path.to_path_buf()).or_insert(dataset),
        ))
    }

    pub fn len(&self) -> usize {
        self.loaded.lock().expect("dataset cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
