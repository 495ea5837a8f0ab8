use crate::oracle::ReasoningOracle;
use crate::telemetry::{StageStats, StageTimings};
use crate::workflows::address::prefecture_of;
use crate::workflows::costs::{CostPlanner, CostSheet, PropertyProfile};
use crate::workflows::geocode::{GeocodeError, GeocodeHit, Geocoder};
use crate::workflows::legal::{
    format_report, FollowupContext, LegalBatch, LegalDeterminationEngine, NextActions,
    NextActionsComposer, PropertyFacts, StatuteInputs,
};
use crate::workflows::market::{PriceEstimate, PriceEstimateError, PriceEstimator};
use crate::workflows::simulation::{simulate, SimulationParams, SimulationResult, DEFAULT_DAILY_RATE};
use crate::workflows::zoning::{zoning_info, ZoningInfo, ZoningLookupEngine, ZoningOutcome};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("住所が指定されていません")]
    MissingAddress,
    #[error(transparent)]
    Geocode(#[from] GeocodeError),
}

/// Everything the legal half of the pipeline produced for one address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub address: String,
    pub geocode: GeocodeHit,
    pub zoning: ZoningOutcome,
    pub zoning_info: ZoningInfo,
    pub facts: PropertyFacts,
    /// Why property facts could not be read from the flyer, if they could not.
    pub facts_error: Option<String>,
    pub legal: LegalBatch,
    pub next_actions: NextActions,
    pub formatted_report: String,
    pub stage_timings: Vec<StageStats>,
}

impl PipelineReport {
    pub fn zoning_type(&self) -> &str {
        self.zoning.zoning_type()
    }

    pub fn followup_context(&self) -> FollowupContext {
        FollowupContext {
            formatted_report: self.formatted_report.clone(),
            next_actions: self.next_actions.text.clone(),
            address: self.address.clone(),
            zoning_type: self.zoning_type().to_string(),
            coordinate: self.geocode.coordinate,
        }
    }
}

/// Market search result as shown to the user. A failed search still lets
/// the simulation run on the default nightly rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MarketOutcome {
    Estimated(PriceEstimate),
    Failed { reason: String, quota_exhausted: bool },
}

impl MarketOutcome {
    pub fn estimate(&self) -> Option<&PriceEstimate> {
        match self {
            Self::Estimated(estimate) => Some(estimate),
            Self::Failed { .. } => None,
        }
    }

    /// Median when the market produced a positive one, else the default.
    pub fn daily_rate(&self) -> f64 {
        self.estimate()
            .map(|estimate| estimate.median_price)
            .filter(|median| *median > 0.0)
            .unwrap_or(DEFAULT_DAILY_RATE)
    }
}

impl From<Result<PriceEstimate, PriceEstimateError>> for MarketOutcome {
    fn from(value: Result<PriceEstimate, PriceEstimateError>) -> Self {
        match value {
            Ok(estimate) => Self::Estimated(estimate),
            Err(err) => Self::Failed {
                quota_exhausted: err.is_quota(),
                reason: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Economics {
    pub area_m2: Option<f64>,
    pub market: MarketOutcome,
    pub costs: CostSheet,
    pub daily_rate: f64,
    pub simulation: SimulationResult,
    pub recommendations: Vec<String>,
}

impl Economics {
    pub fn assemble(area_m2: Option<f64>, market: MarketOutcome, costs: CostSheet) -> Self {
        let daily_rate = market.daily_rate();
        let simulation = simulate(&SimulationParams {
            initial_costs: costs.initial,
            operating_costs: costs.operating,
            daily_rate,
            ..SimulationParams::default()
        });
        let recommendations = simulation.recommendations();
        Self {
            area_m2,
            market,
            costs,
            daily_rate,
            simulation,
            recommendations,
        }
    }
}

/// Sequences the stages for one address. Each stage is timed into the
/// caller's ledger.
#[derive(Debug, Clone, Copy)]
pub struct FeasibilityPipeline<'a> {
    oracle: &'a dyn ReasoningOracle,
    geocoder: &'a Geocoder,
    zoning: &'a ZoningLookupEngine,
    today: NaiveDate,
}

impl<'a> FeasibilityPipeline<'a> {
    pub fn new(
        oracle: &'a dyn ReasoningOracle,
        geocoder: &'a Geocoder,
        zoning: &'a ZoningLookupEngine,
        today: NaiveDate,
    ) -> Self {
        Self {
            oracle,
            geocoder,
            zoning,
            today,
        }
    }

    /// Geocoding, zoning, property facts, legal batch, next actions and the
    /// rendered report. Only a geocoding failure stops the run.
    pub fn run(
        &self,
        address: &str,
        flyer_text: &str,
        timings: &mut StageTimings,
    ) -> Result<PipelineReport, PipelineError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(PipelineError::MissingAddress);
        }
        info!(%address, "feasibility pipeline started");

        let geocode = timings.time("ジオコーディング", || self.geocoder.geocode(address))?;
        let prefecture = prefecture_of(address);
        let zoning = timings.time("用途地域判定", || {
            self.zoning.lookup(geocode.coordinate, prefecture)
        });
        let zoning_type = zoning.zoning_type().to_string();

        let engine = LegalDeterminationEngine::new(self.oracle);
        let (facts, facts_error) = if flyer_text.trim().is_empty() {
            (PropertyFacts::default(), None)
        } else {
            match timings.time("物件情報抽出", || engine.extract_property_info(flyer_text)) {
                Ok(facts) => (facts, None),
                Err(err) => {
                    warn!(error = %err, "property facts unavailable");
                    (PropertyFacts::default(), Some(err.to_string()))
                }
            }
        };
        let facts = facts.with_site(address, &zoning_type);

        let inputs = StatuteInputs::from_facts(&facts);
        let legal = timings.time("法令判定", || engine.determine_all(&inputs));
        let next_actions = timings.time("次のアクション生成", || {
            NextActionsComposer::new(Some(self.oracle)).compose(&zoning_type, &legal)
        });
        let formatted_report = format_report(&facts, &legal);

        info!(
            zoning = %zoning_type,
            failed_statutes = legal.failed_statutes().len(),
            "feasibility pipeline finished"
        );
        Ok(PipelineReport {
            address: address.to_string(),
            geocode,
            zoning_info: zoning_info(&zoning_type),
            zoning,
            facts,
            facts_error,
            legal,
            next_actions,
            formatted_report,
            stage_timings: timings.stats(),
        })
    }

    pub fn market(&self, address: &str, area_m2: Option<f64>, timings: &mut StageTimings) -> MarketOutcome {
        PriceEstimator::new(self.oracle)
            .with_today(self.today)
            .search_timed(address, area_m2, timings)
            .into()
    }

    pub fn costs(
        &self,
        report: &PipelineReport,
        flyer_text: &str,
        area_m2: Option<f64>,
        timings: &mut StageTimings,
    ) -> CostSheet {
        let profile = PropertyProfile::from_facts(&report.facts, &report.address, area_m2);
        timings.time("費用推定", || {
            CostPlanner::new(Some(self.oracle)).plan(
                flyer_text,
                &profile,
                report.legal.fire_code.determined(),
            )
        })
    }

    /// Market search, cost planning and the simulation, uncached.
    pub fn economics(
        &self,
        report: &PipelineReport,
        flyer_text: &str,
        area_m2: Option<f64>,
        timings: &mut StageTimings,
    ) -> Economics {
        let area_m2 = area_m2.or_else(|| report.facts.floor_area_m2());
        let market = self.market(&report.address, area_m2, timings);
        let costs = self.costs(report, flyer_text, area_m2, timings);
        Economics::assemble(area_m2, market, costs)
    }
}
