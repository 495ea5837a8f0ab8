use minpaku_feasibility::error::AppError;
use minpaku_feasibility::telemetry::StageStats;
use minpaku_feasibility::workflows::session::{
    Economics, FeasibilitySession, PipelineReport, SessionServices, SessionState,
};
use serde::Serialize;
use tracing::info;

/// Where the flyer content for an assessment comes from.
#[derive(Debug, Clone)]
pub(crate) enum FlyerSource {
    Image { bytes: Vec<u8>, media_type: String },
    Text(String),
    /// No flyer; the caller must supply the address.
    Absent,
}

#[derive(Debug, Clone)]
pub(crate) struct AssessmentRequest {
    pub(crate) flyer: FlyerSource,
    pub(crate) address: Option<String>,
    pub(crate) area_m2: Option<f64>,
    pub(crate) include_economics: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct Assessment {
    pub(crate) state: SessionState,
    pub(crate) extracted_address: Option<String>,
    pub(crate) report: PipelineReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) economics: Option<Economics>,
    pub(crate) stage_timings: Vec<StageStats>,
}

/// Drives one session from flyer to results without user interaction: the
/// upload is accepted as is and a supplied address overrides the extracted
/// one. Blocks on every provider call.
pub(crate) fn run_assessment(
    services: SessionServices,
    request: AssessmentRequest,
) -> Result<Assessment, AppError> {
    let AssessmentRequest {
        flyer,
        address,
        area_m2,
        include_economics,
    } = request;

    if let Some(area) = area_m2 {
        if !area.is_finite() || area <= 0.0 {
            return Err(AppError::InvalidInput(format!(
                "area_m2 must be a positive number, got {area}"
            )));
        }
    }

    let mut session = FeasibilitySession::new(services);
    match flyer {
        FlyerSource::Image { bytes, media_type } => {
            session.upload(bytes, &media_type)?;
            session.confirm_upload(true)?;
            session.extract_text()?;
        }
        FlyerSource::Text(text) => {
            session.provide_text(&text)?;
        }
        FlyerSource::Absent => {
            session.provide_text("")?;
        }
    }

    let extracted_address = session.address().map(str::to_string);
    let confirmed = session.confirm_address(address.as_deref())?.to_string();
    info!(address = %confirmed, extracted = ?extracted_address, "address confirmed");

    let report = session.run_pipeline()?.clone();
    let economics = if include_economics {
        Some(session.economics(area_m2)?)
    } else {
        None
    };

    Ok(Assessment {
        state: session.state(),
        extracted_address,
        report,
        economics,
        stage_timings: session.timings().stats(),
    })
}
