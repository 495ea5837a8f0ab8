use crate::assess::{run_assessment, Assessment, AssessmentRequest, FlyerSource};
use crate::commands::validate_simulation;
use crate::infra::{blocking, AppState};
use axum::body::Bytes;
use axum::extract::Query;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use minpaku_feasibility::error::AppError;
use minpaku_feasibility::workflows::address::{prefecture_of, AddressForms, NATIONWIDE};
use minpaku_feasibility::workflows::geocode::GeoCoordinate;
use minpaku_feasibility::workflows::ocr::is_valid_address;
use minpaku_feasibility::workflows::simulation::{simulate, SimulationParams, SimulationResult};
use minpaku_feasibility::workflows::zoning::{zoning_info, ZoningInfo, ZoningOutcome};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize)]
pub(crate) struct SimulationResponse {
    pub(crate) result: SimulationResult,
    pub(crate) recommendations: Vec<String>,
    pub(crate) table: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddressRequest {
    pub(crate) address: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AddressResponse {
    pub(crate) forms: AddressForms,
    pub(crate) prefecture: Option<&'static str>,
    pub(crate) valid: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ZoningLookupRequest {
    pub(crate) latitude: f64,
    pub(crate) longitude: f64,
    #[serde(default)]
    pub(crate) prefecture: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ZoningLookupResponse {
    pub(crate) outcome: ZoningOutcome,
    pub(crate) info: ZoningInfo,
}

fn default_true() -> bool {
    true
}

/// Text- or address-driven assessment. At least one of the two must be set.
#[derive(Debug, Deserialize)]
pub(crate) struct FeasibilityRequest {
    #[serde(default)]
    pub(crate) address: Option<String>,
    #[serde(default)]
    pub(crate) flyer_text: Option<String>,
    #[serde(default)]
    pub(crate) area_m2: Option<f64>,
    #[serde(default = "default_true")]
    pub(crate) include_economics: bool,
}

/// Query half of a raw flyer upload; the body carries the file itself.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct FlyerUploadQuery {
    #[serde(default)]
    pub(crate) address: Option<String>,
    #[serde(default)]
    pub(crate) area_m2: Option<f64>,
    #[serde(default)]
    pub(crate) skip_economics: bool,
}

pub(crate) fn feasibility_routes() -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/simulation", post(simulation_endpoint))
        .route("/api/v1/address/normalize", post(address_endpoint))
        .route("/api/v1/zoning/lookup", post(zoning_endpoint))
        .route("/api/v1/feasibility", post(feasibility_endpoint))
        .route("/api/v1/feasibility/flyer", post(flyer_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn simulation_endpoint(
    Json(params): Json<SimulationParams>,
) -> Result<Json<SimulationResponse>, AppError> {
    validate_simulation(&params)?;
    let result = simulate(&params);
    Ok(Json(SimulationResponse {
        recommendations: result.recommendations(),
        table: result.markdown_table(),
        result,
    }))
}

pub(crate) async fn address_endpoint(
    Json(payload): Json<AddressRequest>,
) -> Result<Json<AddressResponse>, AppError> {
    let forms = AddressForms::new(&payload.address);
    if forms.raw.is_empty() {
        return Err(AppError::InvalidInput("address is empty".to_string()));
    }
    Ok(Json(AddressResponse {
        prefecture: prefecture_of(&forms.raw),
        valid: is_valid_address(&forms.raw),
        forms,
    }))
}

pub(crate) async fn zoning_endpoint(
    Extension(state): Extension<AppState>,
    Json(payload): Json<ZoningLookupRequest>,
) -> Result<Json<ZoningLookupResponse>, AppError> {
    let coordinate = GeoCoordinate::new(payload.latitude, payload.longitude)?;
    let prefecture = payload
        .prefecture
        .filter(|prefecture| !prefecture.trim().is_empty() && prefecture != NATIONWIDE);
    let engine = state.services.zoning.clone();

    let outcome = blocking(move || Ok(engine.lookup(coordinate, prefecture.as_deref()))).await?;
    Ok(Json(ZoningLookupResponse {
        info: zoning_info(outcome.zoning_type()),
        outcome,
    }))
}

pub(crate) async fn feasibility_endpoint(
    Extension(state): Extension<AppState>,
    Json(payload): Json<FeasibilityRequest>,
) -> Result<Json<Assessment>, AppError> {
    let FeasibilityRequest {
        address,
        flyer_text,
        area_m2,
        include_economics,
    } = payload;

    let flyer = match flyer_text.filter(|text| !text.trim().is_empty()) {
        Some(text) => FlyerSource::Text(text),
        None if address.as_deref().is_some_and(|address| !address.trim().is_empty()) => {
            FlyerSource::Absent
        }
        None => {
            return Err(AppError::InvalidInput(
                "either address or flyer_text is required".to_string(),
            ))
        }
    };
    let request = AssessmentRequest {
        flyer,
        address,
        area_m2,
        include_economics,
    };

    let services = state.services.clone();
    let assessment = blocking(move || run_assessment(services, request)).await?;
    Ok(Json(assessment))
}

pub(crate) async fn flyer_endpoint(
    Extension(state): Extension<AppState>,
    Query(query): Query<FlyerUploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Assessment>, AppError> {
    let media_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or_default().trim().to_string())
        .ok_or_else(|| AppError::InvalidInput("Content-Type header is required".to_string()))?;
    let request = AssessmentRequest {
        flyer: FlyerSource::Image {
            bytes: body.to_vec(),
            media_type,
        },
        address: query.address,
        area_m2: query.area_m2,
        include_economics: !query.skip_economics,
    };

    let services = state.services.clone();
    let assessment = blocking(move || run_assessment(services, request)).await?;
    Ok(Json(assessment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use minpaku_feasibility::oracle::DisabledOracle;
    use minpaku_feasibility::workflows::geocode::{
        GeocodeError, GeocodeHit, Geocoder, GeocodingProvider, GeocodingProviderKind,
    };
    use minpaku_feasibility::workflows::session::SessionServices;
    use minpaku_feasibility::workflows::zoning::ZoningLookupEngine;
    use std::path::Path;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tower::ServiceExt;

    /// Resolves every Shibuya address to the same point.
    #[derive(Debug)]
    struct ShibuyaGeocoder;

    impl GeocodingProvider for ShibuyaGeocoder {
        fn kind(&self) -> GeocodingProviderKind {
            GeocodingProviderKind::GeocodingJp
        }

        fn geocode(&self, address: &str) -> Result<GeocodeHit, GeocodeError> {
            if !address.contains("渋谷区") {
                return Err(GeocodeError::AllProvidersFailed {
                    address: address.to_string(),
                });
            }
            Ok(GeocodeHit {
                coordinate: GeoCoordinate::new(35.67, 139.70)?,
                formatted_address: address.to_string(),
                provider: self.kind(),
            })
        }
    }

    fn write_zoning(root: &Path) {
        let dir = root.join("tokyo");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(
            dir.join("13.geojson"),
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{"用途地域":"第一種住居地域"},"geometry":{"type":"Polygon","coordinates":[[[139.6,35.6],[139.8,35.6],[139.8,35.7],[139.6,35.7],[139.6,35.6]]]}}]}"#,
        )
        .expect("write dataset");
    }

    fn app(root: &Path, ready: bool) -> Router {
        write_zoning(root);
        let disabled = Arc::new(DisabledOracle::new("GEMINI_API_KEY is not set"));
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
            services: SessionServices {
                reasoning: disabled.clone(),
                vision: disabled,
                geocoder: Arc::new(Geocoder::new(vec![Box::new(ShibuyaGeocoder)])),
                zoning: Arc::new(ZoningLookupEngine::from_data_dir(root)),
                max_upload_bytes: 1024,
            },
        };
        feasibility_routes().layer(Extension(state))
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds");
        let response = app.oneshot(request).await.expect("router responds");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body reads");
        let value = serde_json::from_slice(&bytes).expect("json body");
        (status, value)
    }

    #[tokio::test]
    async fn readiness_reflects_the_flag() {
        let dir = tempfile::tempdir().expect("tempdir");
        let request = Request::builder().uri("/ready").body(Body::empty()).expect("request");
        let response = app(dir.path(), false).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let request = Request::builder().uri("/ready").body(Body::empty()).expect("request");
        let response = app(dir.path(), true).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn simulation_endpoint_fills_defaults() {
        let Json(body) = simulation_endpoint(Json(SimulationParams {
            daily_rate: 10_000.0,
            occupancy_rates: vec![0.5],
            ..SimulationParams::default()
        }))
        .await
        .expect("simulation runs");

        assert_eq!(body.result.rows.len(), 1);
        assert_eq!(body.result.rows[0].operating_days, 182.5);
        assert!(body.table.contains("稼働率"));
        assert!(!body.recommendations.is_empty());
    }

    #[tokio::test]
    async fn simulation_endpoint_rejects_bad_occupancy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (status, body) = post_json(
            app(dir.path(), true),
            "/api/v1/simulation",
            json!({ "daily_rate": 15000, "occupancy_rates": [1.5] }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some_and(|error| error.contains("occupancy")));
    }

    #[tokio::test]
    async fn address_endpoint_returns_search_forms() {
        let Json(body) = address_endpoint(Json(AddressRequest {
            address: "大阪府大阪市北区梅田町1-2-3".to_string(),
        }))
        .await
        .expect("normalizes");

        assert_eq!(body.prefecture, Some("大阪府"));
        assert_eq!(body.forms.block, "大阪府大阪市北区梅田町");
        assert_eq!(body.forms.city_or_ward, "大阪府大阪市");
        assert_eq!(body.forms.wide_area, "大阪府");
    }

    #[tokio::test]
    async fn zoning_lookup_finds_polygon_and_rejects_bad_coordinates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (status, body) = post_json(
            app(dir.path(), true),
            "/api/v1/zoning/lookup",
            json!({ "latitude": 35.65, "longitude": 139.7, "prefecture": "東京都" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"]["status"], "found");
        assert_eq!(body["outcome"]["zoning_type"], "第一種住居地域");
        assert_eq!(body["info"]["building_height_limit"], "20m");

        let (status, _) = post_json(
            app(dir.path(), true),
            "/api/v1/zoning/lookup",
            json!({ "latitude": 135.0, "longitude": 139.7 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn feasibility_requires_address_or_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (status, _) = post_json(
            app(dir.path(), true),
            "/api/v1/feasibility",
            json!({ "address": "  " }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn feasibility_runs_without_a_model_provider() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (status, body) = post_json(
            app(dir.path(), true),
            "/api/v1/feasibility",
            json!({
                "flyer_text": "物件所在地 東京都渋谷区神宮前1-2-3\n賃料：100,000円\n敷金：1ヶ月",
                "area_m2": 40.0
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["state"], "presenting_results");
        assert_eq!(body["report"]["zoning"]["zoning_type"], "第一種住居地域");
        assert_eq!(body["economics"]["market"]["status"], "failed");
        assert_eq!(body["economics"]["daily_rate"], 15000.0);
        assert_eq!(body["economics"]["costs"]["initial"]["deposit"], 100000);
    }

    #[tokio::test]
    async fn unknown_address_is_an_upstream_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (status, _) = post_json(
            app(dir.path(), true),
            "/api/v1/feasibility",
            json!({ "address": "北海道札幌市中央区北1条西2丁目", "include_economics": false }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn flyer_upload_validates_media_type() {
        let dir = tempfile::tempdir().expect("tempdir");
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/feasibility/flyer?area_m2=30")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("not an image"))
            .expect("request builds");
        let response = app(dir.path(), true).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
