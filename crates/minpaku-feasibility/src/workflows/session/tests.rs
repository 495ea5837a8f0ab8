use super::*;
use crate::oracle::OracleResponse;
use crate::workflows::geocode::{GeoCoordinate, GeocodeHit, GeocodingProvider, GeocodingProviderKind};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

const ADDRESS: &str = "東京都渋谷区神宮前1-2-3";
const FLYER: &str = "売店舗・住宅\n物件所在地 東京都渋谷区神宮前1-2-3\n賃料：80,000円\n敷金：2ヶ月\n礼金：なし";
const EMPTY_SEARCH: &str = "```json\n[]\n```\n```json\n{\"宿泊件数\": \"0件\"}\n```";

#[derive(Debug)]
struct FixedGeocoder;

impl GeocodingProvider for FixedGeocoder {
    fn kind(&self) -> GeocodingProviderKind {
        GeocodingProviderKind::GeocodingJp
    }

    fn geocode(&self, address: &str) -> Result<GeocodeHit, GeocodeError> {
        if !address.contains("渋谷区") {
            return Err(GeocodeError::provider(self.kind(), "not found"));
        }
        Ok(GeocodeHit {
            coordinate: GeoCoordinate::new(35.67, 139.70)?,
            formatted_address: address.to_string(),
            provider: self.kind(),
        })
    }
}

#[derive(Debug)]
struct FlyerReader(Result<String, OracleError>);

impl VisionOracle for FlyerReader {
    fn read_image(&self, _: &str, _: &[u8], _: &str) -> Result<OracleResponse, OracleError> {
        self.0.clone().map(OracleResponse::text)
    }
}

/// Plain generation fails transiently; searches return no listings. Counts
/// both kinds of call.
#[derive(Debug, Default)]
struct QuietMarket {
    searches: AtomicUsize,
    generations: AtomicUsize,
}

impl ReasoningOracle for QuietMarket {
    fn generate(&self, _prompt: &str) -> Result<OracleResponse, OracleError> {
        self.generations.fetch_add(1, Ordering::SeqCst);
        Err(OracleError::Request("timeout".to_string()))
    }

    fn generate_with_search(&self, _prompt: &str) -> Result<OracleResponse, OracleError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(OracleResponse::text(EMPTY_SEARCH))
    }
}

#[derive(Debug, Default)]
struct QuotaOracle {
    calls: AtomicUsize,
}

impl ReasoningOracle for QuotaOracle {
    fn generate(&self, _prompt: &str) -> Result<OracleResponse, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(OracleError::QuotaExhausted("429 RESOURCE_EXHAUSTED".to_string()))
    }
}

/// Plain generation answers normally; searches report quota in the reply
/// body instead of failing.
#[derive(Debug, Default)]
struct QuotaInReply {
    generations: AtomicUsize,
}

impl ReasoningOracle for QuotaInReply {
    fn generate(&self, _prompt: &str) -> Result<OracleResponse, OracleError> {
        self.generations.fetch_add(1, Ordering::SeqCst);
        Ok(OracleResponse::text("許可判定: 可能\n主な理由: 条例による制限なし"))
    }

    fn generate_with_search(&self, _prompt: &str) -> Result<OracleResponse, OracleError> {
        Ok(OracleResponse::text("Quota exceeded for quota metric 'Generate requests'"))
    }
}

fn write_zoning(root: &Path) {
    let dir = root.join("tokyo");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(
        dir.join("13.geojson"),
        r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{"A29_005":"商業地域","A29_004":"9"},"geometry":{"type":"Polygon","coordinates":[[[139.6,35.6],[139.8,35.6],[139.8,35.7],[139.6,35.7],[139.6,35.6]]]}}]}"#,
    )
    .expect("write dataset");
}

fn services(
    root: &Path,
    reasoning: Arc<dyn ReasoningOracle>,
    vision: Result<String, OracleError>,
) -> SessionServices {
    write_zoning(root);
    SessionServices {
        reasoning,
        vision: Arc::new(FlyerReader(vision)),
        geocoder: Arc::new(Geocoder::new(vec![Box::new(FixedGeocoder)])),
        zoning: Arc::new(ZoningLookupEngine::from_data_dir(root)),
        max_upload_bytes: 1024,
    }
}

fn session(services: SessionServices) -> FeasibilitySession {
    FeasibilitySession::with_today(
        services,
        NaiveDate::from_ymd_opt(2024, 3, 10).expect("valid date"),
    )
}

fn presenting(session: &mut FeasibilitySession) {
    session.upload(b"flyer".to_vec(), "image/png").expect("upload");
    session.confirm_upload(true).expect("accept");
    session.extract_text().expect("ocr");
    session.confirm_address(Some(ADDRESS)).expect("address");
    session.run_pipeline().expect("pipeline");
}

#[test]
fn flyer_walks_every_state_to_results() {
    let dir = tempfile::tempdir().expect("tempdir");
    let oracle = Arc::new(QuietMarket::default());
    let mut session = session(services(dir.path(), oracle.clone(), Ok(FLYER.to_string())));
    assert_eq!(session.state(), SessionState::AwaitingUpload);

    session.upload(b"flyer".to_vec(), "image/png").expect("upload");
    assert_eq!(session.state(), SessionState::Confirming);
    assert_eq!(session.confirm_upload(true).expect("accept"), SessionState::ExtractingText);

    let extraction = session.extract_text().expect("ocr");
    assert!(extraction.text().contains("賃料"));
    assert_eq!(session.state(), SessionState::ConfirmingAddress);
    assert!(session.address().is_some_and(|address| address.contains("神宮前")));

    assert_eq!(session.confirm_address(Some(ADDRESS)).expect("address"), ADDRESS);
    let report = session.run_pipeline().expect("pipeline");
    assert_eq!(report.zoning_type(), "商業地域");
    assert_eq!(report.address, ADDRESS);
    assert!(report.facts_error.is_some());
    assert_eq!(report.facts.zoning_type.as_deref(), Some("商業地域"));
    assert!(!report.formatted_report.is_empty());
    assert_eq!(session.state(), SessionState::PresentingResults);

    let stages: Vec<String> = session.timings().stats().into_iter().map(|s| s.stage).collect();
    assert!(stages.iter().any(|stage| stage == "OCR"));
    assert!(stages.iter().any(|stage| stage == "ジオコーディング"));
    assert!(stages.iter().any(|stage| stage == "法令判定"));
}

#[test]
fn economics_are_cached_per_address_and_area() {
    let dir = tempfile::tempdir().expect("tempdir");
    let oracle = Arc::new(QuietMarket::default());
    let mut session = session(services(dir.path(), oracle.clone(), Ok(FLYER.to_string())));
    presenting(&mut session);

    let first = session.economics(Some(40.0)).expect("economics");
    assert_eq!(oracle.searches.load(Ordering::SeqCst), 3);
    let estimate = first.market.estimate().expect("zero estimate");
    assert!(!estimate.found_listings());
    assert_eq!(first.daily_rate, 15_000.0);
    assert_eq!(first.costs.initial.deposit, 160_000);
    assert_eq!(first.costs.operating.rent, 80_000);
    assert_eq!(first.simulation.rows.len(), 7);

    let again = session.economics(Some(40.0)).expect("economics");
    assert_eq!(oracle.searches.load(Ordering::SeqCst), 3);
    assert_eq!(again, first);
    assert_eq!(session.cache().len(), 2);

    session.economics(Some(60.0)).expect("economics");
    assert_eq!(oracle.searches.load(Ordering::SeqCst), 6);
}

#[test]
fn quota_disables_the_reasoning_oracle_for_the_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let oracle = Arc::new(QuotaOracle::default());
    let mut session = session(services(dir.path(), oracle.clone(), Ok(FLYER.to_string())));
    presenting(&mut session);

    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    assert!(session.reasoning_tripped().is_some_and(|err| err.is_quota()));

    let economics = session.economics(None).expect("economics");
    assert!(matches!(
        economics.market,
        MarketOutcome::Failed {
            quota_exhausted: true,
            ..
        }
    ));
    assert_eq!(economics.daily_rate, 15_000.0);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    assert!(session.cache().market(&EconomicsKey::new(ADDRESS, None)).is_none());
}

#[test]
fn quota_reported_in_a_search_reply_stops_later_cost_calls() {
    let dir = tempfile::tempdir().expect("tempdir");
    let oracle = Arc::new(QuotaInReply::default());
    let mut session = session(services(dir.path(), oracle.clone(), Ok(FLYER.to_string())));
    presenting(&mut session);
    assert!(session.reasoning_tripped().is_none());
    let before = oracle.generations.load(Ordering::SeqCst);

    let economics = session.economics(Some(40.0)).expect("economics");
    assert!(matches!(
        economics.market,
        MarketOutcome::Failed {
            quota_exhausted: true,
            ..
        }
    ));
    assert!(session.reasoning_tripped().is_some_and(|err| err.is_quota()));
    assert_eq!(oracle.generations.load(Ordering::SeqCst), before);
    assert_eq!(economics.costs.initial.deposit, 160_000);
}

#[test]
fn out_of_order_events_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut session = session(services(
        dir.path(),
        Arc::new(QuietMarket::default()),
        Ok(FLYER.to_string()),
    ));

    let err = session.extract_text().expect_err("no upload yet");
    assert!(matches!(
        err,
        SessionError::InvalidTransition {
            from: SessionState::AwaitingUpload,
            event: SessionEvent::TextExtracted,
        }
    ));
    assert!(matches!(session.run_pipeline(), Err(SessionError::InvalidTransition { .. })));
    assert!(matches!(session.economics(None), Err(SessionError::NoResults)));
    assert_eq!(session.state(), SessionState::AwaitingUpload);
}

#[test]
fn rejected_or_invalid_uploads_stay_before_ocr() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut session = session(services(
        dir.path(),
        Arc::new(QuietMarket::default()),
        Ok(FLYER.to_string()),
    ));

    assert!(matches!(
        session.upload(b"flyer".to_vec(), "text/plain"),
        Err(SessionError::Ocr(OcrError::UnsupportedMedia(_)))
    ));
    assert!(matches!(
        session.upload(vec![0; 2048], "image/png"),
        Err(SessionError::Ocr(OcrError::FileTooLarge { .. }))
    ));
    assert_eq!(session.state(), SessionState::AwaitingUpload);

    session.upload(b"flyer".to_vec(), "application/pdf").expect("upload");
    assert_eq!(session.confirm_upload(false).expect("reject"), SessionState::AwaitingUpload);
    assert!(matches!(session.confirm_upload(true), Err(SessionError::InvalidTransition { .. })));
}

#[test]
fn ocr_failure_returns_to_confirmation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut session = session(services(
        dir.path(),
        Arc::new(QuietMarket::default()),
        Err(OracleError::QuotaExhausted("quota".to_string())),
    ));
    session.upload(b"flyer".to_vec(), "image/jpeg").expect("upload");
    session.confirm_upload(true).expect("accept");

    let err = session.extract_text().expect_err("quota");
    assert!(matches!(&err, SessionError::Ocr(ocr) if ocr.is_quota()));
    assert_eq!(session.state(), SessionState::Confirming);
}

#[test]
fn geocoding_failure_returns_to_address_confirmation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut session = session(services(
        dir.path(),
        Arc::new(QuietMarket::default()),
        Ok(FLYER.to_string()),
    ));
    session.provide_text(FLYER).expect("text");
    session.confirm_address(Some("北海道札幌市中央区北1条西2丁目")).expect("address");

    let err = session.run_pipeline().expect_err("unknown address");
    assert!(matches!(
        err,
        SessionError::Pipeline(PipelineError::Geocode(GeocodeError::AllProvidersFailed { .. }))
    ));
    assert_eq!(session.state(), SessionState::ConfirmingAddress);

    session.confirm_address(Some(ADDRESS)).expect("corrected");
    session.run_pipeline().expect("pipeline");
    assert_eq!(session.state(), SessionState::PresentingResults);
}

#[test]
fn reset_clears_everything_but_the_quota_gate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let oracle = Arc::new(QuotaOracle::default());
    let mut session = session(services(dir.path(), oracle.clone(), Ok(FLYER.to_string())));
    presenting(&mut session);
    session.economics(Some(40.0)).expect("economics");
    assert!(!session.cache().is_empty());

    session.reset();
    assert_eq!(session.state(), SessionState::AwaitingUpload);
    assert!(session.report().is_none());
    assert!(session.extraction().is_none());
    assert!(session.address().is_none());
    assert!(session.cache().is_empty());
    assert!(session.reasoning_tripped().is_some());
}

#[test]
fn reset_is_reachable_from_every_state() {
    for state in SessionState::ordered() {
        assert_eq!(state.next(SessionEvent::Reset), Some(SessionState::AwaitingUpload));
    }
    assert_eq!(SessionState::PresentingResults.next(SessionEvent::Upload), None);
}

#[test]
fn followups_need_results_and_a_question() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut session = session(services(
        dir.path(),
        Arc::new(QuietMarket::default()),
        Ok(FLYER.to_string()),
    ));
    assert!(matches!(session.answer_followup("旅館業は必要？"), Err(SessionError::NoResults)));

    presenting(&mut session);
    assert!(matches!(
        session.answer_followup("  "),
        Err(SessionError::Followup(FollowupError::EmptyQuestion))
    ));
    assert!(matches!(
        session.answer_followup("旅館業は必要？"),
        Err(SessionError::Followup(FollowupError::Oracle(_)))
    ));
}
