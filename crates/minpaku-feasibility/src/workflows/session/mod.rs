//! Per-user feasibility session.
//!
//! A [`FeasibilitySession`] walks one flyer from upload to results through
//! an explicit state machine and owns everything that must live exactly as
//! long as the session: the oracle quota gates, the economics cache and the
//! stage-timing ledger.

mod cache;
mod pipeline;

#[cfg(test)]
mod tests;

pub use cache::{EconomicsCache, EconomicsKey};
pub use pipeline::{Economics, FeasibilityPipeline, MarketOutcome, PipelineError, PipelineReport};

use crate::config::AppConfig;
use crate::oracle::{
    DisabledOracle, GatedOracle, GeminiClient, GeminiSettings, OracleError, ReasoningOracle,
    VisionOracle,
};
use crate::telemetry::StageTimings;
use crate::workflows::geocode::{GeocodeError, Geocoder};
use crate::workflows::legal::FollowupError;
use crate::workflows::ocr::{validate_upload, OcrError, OcrExtraction, OcrPipeline};
use crate::workflows::zoning::ZoningLookupEngine;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingUpload,
    Confirming,
    ExtractingText,
    ConfirmingAddress,
    RunningPipeline,
    PresentingResults,
}

impl SessionState {
    pub fn ordered() -> [Self; 6] {
        [
            Self::AwaitingUpload,
            Self::Confirming,
            Self::ExtractingText,
            Self::ConfirmingAddress,
            Self::RunningPipeline,
            Self::PresentingResults,
        ]
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::AwaitingUpload => "Awaiting upload",
            Self::Confirming => "Confirming upload",
            Self::ExtractingText => "Extracting text",
            Self::ConfirmingAddress => "Confirming address",
            Self::RunningPipeline => "Running pipeline",
            Self::PresentingResults => "Presenting results",
        }
    }

    /// The state `event` leads to, or `None` when it is not allowed here.
    pub fn next(self, event: SessionEvent) -> Option<Self> {
        use SessionEvent as E;
        use SessionState as S;

        match (self, event) {
            (_, E::Reset) => Some(S::AwaitingUpload),
            (S::AwaitingUpload | S::Confirming, E::Upload) => Some(S::Confirming),
            (S::AwaitingUpload, E::ProvideText) => Some(S::ConfirmingAddress),
            (S::Confirming, E::Accept) => Some(S::ExtractingText),
            (S::Confirming, E::Reject) => Some(S::AwaitingUpload),
            (S::ExtractingText, E::TextExtracted) => Some(S::ConfirmingAddress),
            (S::ExtractingText, E::ExtractionFailed) => Some(S::Confirming),
            (S::ConfirmingAddress | S::PresentingResults, E::ConfirmAddress) => {
                Some(S::RunningPipeline)
            }
            (S::RunningPipeline, E::PipelineFinished) => Some(S::PresentingResults),
            (S::RunningPipeline, E::PipelineFailed) => Some(S::ConfirmingAddress),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    Upload,
    ProvideText,
    Accept,
    Reject,
    TextExtracted,
    ExtractionFailed,
    ConfirmAddress,
    PipelineFinished,
    PipelineFailed,
    Reset,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{event:?} is not allowed while {from}")]
    InvalidTransition {
        from: SessionState,
        event: SessionEvent,
    },
    #[error("no upload to process")]
    MissingUpload,
    #[error("住所が確定していません")]
    MissingAddress,
    #[error("results are not available yet")]
    NoResults,
    #[error(transparent)]
    Ocr(#[from] OcrError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Followup(#[from] FollowupError),
}

/// Shared, read-mostly collaborators. Cloning is cheap; every session gets
/// its own quota gates on top of these.
#[derive(Debug, Clone)]
pub struct SessionServices {
    pub reasoning: Arc<dyn ReasoningOracle>,
    pub vision: Arc<dyn VisionOracle>,
    pub geocoder: Arc<Geocoder>,
    pub zoning: Arc<ZoningLookupEngine>,
    pub max_upload_bytes: usize,
}

impl SessionServices {
    /// Gemini when a key is configured, a disabled oracle otherwise.
    pub fn from_config(config: &AppConfig) -> Result<Self, GeocodeError> {
        let providers = &config.providers;
        let (reasoning, vision): (Arc<dyn ReasoningOracle>, Arc<dyn VisionOracle>) =
            match gemini_client(config) {
                Ok(client) => {
                    let client = Arc::new(client);
                    let reasoning: Arc<dyn ReasoningOracle> = client.clone();
                    let vision: Arc<dyn VisionOracle> = client;
                    (reasoning, vision)
                }
                Err(err) => {
                    warn!(error = %err, "model provider unavailable; oracle stages will fall back");
                    let disabled = Arc::new(DisabledOracle::new(err.to_string()));
                    let reasoning: Arc<dyn ReasoningOracle> = disabled.clone();
                    let vision: Arc<dyn VisionOracle> = disabled;
                    (reasoning, vision)
                }
            };

        Ok(Self {
            reasoning,
            vision,
            geocoder: Arc::new(Geocoder::from_config(providers)?),
            zoning: Arc::new(ZoningLookupEngine::from_data_dir(&config.zoning.data_dir)),
            max_upload_bytes: config.uploads.max_bytes(),
        })
    }
}

fn gemini_client(config: &AppConfig) -> Result<GeminiClient, OracleError> {
    let providers = &config.providers;
    let key = providers
        .gemini_api_key
        .clone()
        .ok_or_else(|| OracleError::Unavailable("GEMINI_API_KEY is not set".to_string()))?;
    GeminiClient::new(GeminiSettings::new(
        key,
        providers.gemini_model.clone(),
        providers.oracle_timeout(),
    ))
}

#[derive(Debug, Clone)]
struct Upload {
    bytes: Vec<u8>,
    media_type: String,
}

#[derive(Debug)]
pub struct FeasibilitySession {
    services: SessionServices,
    reasoning: GatedOracle<Arc<dyn ReasoningOracle>>,
    vision: GatedOracle<Arc<dyn VisionOracle>>,
    state: SessionState,
    upload: Option<Upload>,
    extraction: Option<OcrExtraction>,
    address: Option<String>,
    report: Option<PipelineReport>,
    cache: EconomicsCache,
    timings: StageTimings,
    today: NaiveDate,
}

impl FeasibilitySession {
    pub fn new(services: SessionServices) -> Self {
        Self::with_today(services, Local::now().date_naive())
    }

    pub fn with_today(services: SessionServices, today: NaiveDate) -> Self {
        Self {
            reasoning: GatedOracle::new(services.reasoning.clone()),
            vision: GatedOracle::new(services.vision.clone()),
            services,
            state: SessionState::AwaitingUpload,
            upload: None,
            extraction: None,
            address: None,
            report: None,
            cache: EconomicsCache::default(),
            timings: StageTimings::default(),
            today,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn extraction(&self) -> Option<&OcrExtraction> {
        self.extraction.as_ref()
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn report(&self) -> Option<&PipelineReport> {
        self.report.as_ref()
    }

    pub fn timings(&self) -> &StageTimings {
        &self.timings
    }

    pub fn cache(&self) -> &EconomicsCache {
        &self.cache
    }

    /// Quota or availability failure that disabled the reasoning oracle.
    pub fn reasoning_tripped(&self) -> Option<OracleError> {
        self.reasoning.tripped()
    }

    fn advance(&mut self, event: SessionEvent) -> Result<SessionState, SessionError> {
        let next = self
            .state
            .next(event)
            .ok_or(SessionError::InvalidTransition {
                from: self.state,
                event,
            })?;
        info!(from = %self.state, to = %next, ?event, "session transition");
        self.state = next;
        Ok(next)
    }

    fn ensure(&self, event: SessionEvent) -> Result<(), SessionError> {
        match self.state.next(event) {
            Some(_) => Ok(()),
            None => Err(SessionError::InvalidTransition {
                from: self.state,
                event,
            }),
        }
    }

    /// Stores a flyer for confirmation. Invalid payloads leave the state as
    /// it was.
    pub fn upload(&mut self, bytes: Vec<u8>, media_type: &str) -> Result<(), SessionError> {
        self.ensure(SessionEvent::Upload)?;
        validate_upload(&bytes, media_type, self.services.max_upload_bytes)?;
        self.upload = Some(Upload {
            bytes,
            media_type: media_type.to_string(),
        });
        self.extraction = None;
        self.advance(SessionEvent::Upload)?;
        Ok(())
    }

    /// Skips OCR for flyers that are already text.
    pub fn provide_text(&mut self, text: &str) -> Result<&OcrExtraction, SessionError> {
        self.ensure(SessionEvent::ProvideText)?;
        let extraction = OcrExtraction::from_text(text);
        self.address = extraction.best_address().map(str::to_string);
        self.advance(SessionEvent::ProvideText)?;
        Ok(self.extraction.insert(extraction))
    }

    pub fn confirm_upload(&mut self, accept: bool) -> Result<SessionState, SessionError> {
        if accept {
            self.ensure(SessionEvent::Accept)?;
            if self.upload.is_none() {
                return Err(SessionError::MissingUpload);
            }
            self.advance(SessionEvent::Accept)
        } else {
            let state = self.advance(SessionEvent::Reject)?;
            self.upload = None;
            Ok(state)
        }
    }

    /// Runs OCR on the accepted upload. A failure returns the session to
    /// the confirmation step so the user can retry or pick another file.
    pub fn extract_text(&mut self) -> Result<&OcrExtraction, SessionError> {
        self.ensure(SessionEvent::TextExtracted)?;
        let upload = self.upload.clone().ok_or(SessionError::MissingUpload)?;

        let pipeline = OcrPipeline::new(&self.vision, self.services.max_upload_bytes);
        let result = self
            .timings
            .time("OCR", || pipeline.extract(&upload.bytes, &upload.media_type));
        match result {
            Ok(extraction) => {
                self.address = extraction.best_address().map(str::to_string);
                if self.address.is_none() {
                    warn!(detail = %extraction.diagnostic(), "no address candidate in flyer");
                }
                self.advance(SessionEvent::TextExtracted)?;
                Ok(self.extraction.insert(extraction))
            }
            Err(err) => {
                warn!(error = %err, quota = err.is_quota(), "text extraction failed");
                self.advance(SessionEvent::ExtractionFailed)?;
                Err(err.into())
            }
        }
    }

    /// Accepts the extracted address, or a manual correction of it.
    pub fn confirm_address(&mut self, manual: Option<&str>) -> Result<&str, SessionError> {
        self.ensure(SessionEvent::ConfirmAddress)?;
        let address = manual
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .map(str::to_string)
            .or_else(|| self.address.clone())
            .ok_or(SessionError::MissingAddress)?;

        self.report = None;
        self.advance(SessionEvent::ConfirmAddress)?;
        Ok(self.address.insert(address))
    }

    /// Legal half of the pipeline for the confirmed address. A geocoding
    /// failure sends the session back to address confirmation.
    pub fn run_pipeline(&mut self) -> Result<&PipelineReport, SessionError> {
        self.ensure(SessionEvent::PipelineFinished)?;
        let address = self.address.clone().ok_or(SessionError::MissingAddress)?;
        let flyer_text = self.flyer_text();

        let pipeline = FeasibilityPipeline::new(
            &self.reasoning,
            &self.services.geocoder,
            &self.services.zoning,
            self.today,
        );
        match pipeline.run(&address, &flyer_text, &mut self.timings) {
            Ok(report) => {
                self.advance(SessionEvent::PipelineFinished)?;
                Ok(self.report.insert(report))
            }
            Err(err) => {
                warn!(error = %err, %address, "pipeline failed");
                self.advance(SessionEvent::PipelineFailed)?;
                Err(err.into())
            }
        }
    }

    /// Market estimate, costs and simulation for the current results.
    /// Successful market searches and cost sheets are cached by
    /// `(address, area)` for the rest of the session.
    pub fn economics(&mut self, area_m2: Option<f64>) -> Result<Economics, SessionError> {
        let report = match (self.state, self.report.as_ref()) {
            (SessionState::PresentingResults, Some(report)) => report,
            _ => return Err(SessionError::NoResults),
        };
        let area_m2 = area_m2.or_else(|| report.facts.floor_area_m2());
        let key = EconomicsKey::new(&report.address, area_m2);
        let flyer_text = self.flyer_text();

        let pipeline = FeasibilityPipeline::new(
            &self.reasoning,
            &self.services.geocoder,
            &self.services.zoning,
            self.today,
        );
        let market = match self.cache.market(&key) {
            Some(cached) => cached,
            None => {
                let outcome = pipeline.market(&report.address, area_m2, &mut self.timings);
                self.cache.store_market(key.clone(), &outcome);
                outcome
            }
        };
        let costs = match self.cache.costs(&key) {
            Some(cached) => cached,
            None => {
                let sheet = pipeline.costs(report, &flyer_text, area_m2, &mut self.timings);
                self.cache.store_costs(key, &sheet);
                sheet
            }
        };

        Ok(Economics::assemble(area_m2, market, costs))
    }

    pub fn answer_followup(&self, question: &str) -> Result<String, SessionError> {
        let report = self.report.as_ref().ok_or(SessionError::NoResults)?;
        Ok(report.followup_context().answer(&self.reasoning, question)?)
    }

    /// Back to the start from any state. The quota gates survive a reset.
    pub fn reset(&mut self) {
        self.state = self
            .state
            .next(SessionEvent::Reset)
            .unwrap_or(SessionState::AwaitingUpload);
        self.upload = None;
        self.extraction = None;
        self.address = None;
        self.report = None;
        self.cache.clear();
        info!("session reset");
    }

    fn flyer_text(&self) -> String {
        self.extraction
            .as_ref()
            .map(OcrExtraction::text)
            .unwrap_or_default()
    }
}
