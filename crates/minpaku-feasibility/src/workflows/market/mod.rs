//! Nightly-rate estimation from comparable listings.
//!
//! The search walks the address ladder from block to wide area, one
//! search-grounded oracle call per level, and stops at the first level whose
//! reply is valid. A quota or unavailable oracle ends the walk at once. An
//! empty market is a successful zero estimate, not an error.

mod parse;
mod prompt;

#[cfg(test)]
mod tests;

pub use parse::{
    extract_listings, extract_summary, parse_count, parse_currency, parse_price_range,
    parse_unit_price, ListingSample, MarketSummary, SearchReply,
};

use crate::oracle::{signals_quota, OracleError, OracleResponse, ReasoningOracle};
use crate::telemetry::StageTimings;
use crate::workflows::address::{
    next_next_month_week, occupancy_from_area, AddressForms, SearchLevel,
};
use crate::workflows::simulation::yen;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{info, warn};

pub const NO_LISTINGS_MEMO: &str = "物件が見つかりませんでした";
pub const NO_LISTINGS_BASIS: &str =
    "すべての検索レベル（町名、市または区）で物件が見つかりませんでした";
const EMPTY_RANGE: &str = "¥0〜¥0";

#[derive(Debug, Clone, thiserror::Error)]
pub enum PriceEstimateError {
    #[error("search stopped at the {} level: {source}", level.label())]
    QuotaExhausted {
        level: SearchLevel,
        source: OracleError,
    },
    #[error("search oracle unavailable: {0}")]
    Unavailable(OracleError),
    #[error("search failed at the {} level: {source}", level.label())]
    Oracle {
        level: SearchLevel,
        source: OracleError,
    },
}

impl PriceEstimateError {
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExhausted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceEstimate {
    pub median_price: f64,
    pub median_label: String,
    pub price_range: String,
    pub min_price: f64,
    pub max_price: f64,
    pub sample_count: u32,
    pub popularity_memo: String,
    pub basis_note: String,
    /// The level that produced the estimate, `None` when every level came
    /// back empty.
    pub search_level: Option<SearchLevel>,
    pub search_address: Option<String>,
    pub listings: Vec<ListingSample>,
    /// The oracle's own aggregate for the winning level, as reported.
    pub reported_summary: Option<MarketSummary>,
    pub grounding_sources: Vec<String>,
    pub oracle_calls: usize,
}

impl PriceEstimate {
    /// Zero-valued result for a market with no usable listings.
    pub fn no_listings(oracle_calls: usize) -> Self {
        Self {
            median_price: 0.0,
            median_label: format_yen(0.0),
            price_range: EMPTY_RANGE.to_string(),
            min_price: 0.0,
            max_price: 0.0,
            sample_count: 0,
            popularity_memo: NO_LISTINGS_MEMO.to_string(),
            basis_note: NO_LISTINGS_BASIS.to_string(),
            search_level: None,
            search_address: None,
            listings: Vec::new(),
            reported_summary: None,
            grounding_sources: Vec::new(),
            oracle_calls,
        }
    }

    pub fn found_listings(&self) -> bool {
        self.search_level.is_some() && self.median_price > 0.0
    }

    /// Aggregates one valid level. Price statistics come from validated
    /// priced listings only; without any, they stay at zero.
    fn from_reply(
        reply: SearchReply,
        level: SearchLevel,
        search_address: &str,
        response: OracleResponse,
        oracle_calls: usize,
    ) -> Self {
        let mut prices: Vec<f64> = reply
            .listings
            .iter()
            .filter(|listing| listing.validated && listing.counts_as_found() && listing.price() > 0.0)
            .map(ListingSample::price)
            .collect();
        prices.sort_by(f64::total_cmp);

        let (median_price, min_price, max_price) = match (prices.first(), prices.last()) {
            (Some(&min), Some(&max)) => (median(&prices), min, max),
            _ => (0.0, 0.0, 0.0),
        };
        let price_range = if prices.is_empty() {
            EMPTY_RANGE.to_string()
        } else {
            format!("{}〜{}", format_yen(min_price), format_yen(max_price))
        };

        let summary = reply.summary.clone().unwrap_or_default();
        Self {
            median_price,
            median_label: format_yen(median_price),
            price_range,
            min_price,
            max_price,
            sample_count: prices.len() as u32,
            popularity_memo: summary.popularity_memo.clone().unwrap_or_default(),
            basis_note: summary.basis.clone().unwrap_or_default(),
            search_level: Some(level),
            search_address: Some(search_address.to_string()),
            listings: reply.listings,
            reported_summary: reply.summary,
            grounding_sources: response.grounding_sources,
            oracle_calls,
        }
    }
}

/// Middle value of an ascending slice; mean of the two middles when even.
pub fn median(sorted: &[f64]) -> f64 {
    match sorted.len() {
        0 => 0.0,
        len if len % 2 == 1 => sorted[len / 2],
        len => (sorted[len / 2 - 1] + sorted[len / 2]) / 2.0,
    }
}

/// Nightly prices are never negative; anything below zero shows as ¥0.
pub fn format_yen(amount: f64) -> String {
    yen(amount.max(0.0))
}

#[derive(Debug, Clone, Copy)]
pub struct PriceEstimator<'a> {
    oracle: &'a dyn ReasoningOracle,
    today: NaiveDate,
}

impl<'a> PriceEstimator<'a> {
    pub fn new(oracle: &'a dyn ReasoningOracle) -> Self {
        Self {
            oracle,
            today: Local::now().date_naive(),
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn search(&self, address: &str, area_m2: Option<f64>) -> Result<PriceEstimate, PriceEstimateError> {
        self.search_timed(address, area_m2, &mut StageTimings::default())
    }

    /// Like [`Self::search`], recording each level's oracle call.
    pub fn search_timed(
        &self,
        address: &str,
        area_m2: Option<f64>,
        timings: &mut StageTimings,
    ) -> Result<PriceEstimate, PriceEstimateError> {
        let forms = AddressForms::new(address);
        let occupancy = occupancy_from_area(area_m2);
        let window = next_next_month_week(self.today);
        let levels = SearchLevel::ordered();
        let mut oracle_calls = 0usize;

        for (idx, level) in levels.iter().copied().enumerate() {
            let is_last = idx + 1 == levels.len();
            let search_address = forms.for_level(level);
            info!(level = level.label(), address = search_address, occupancy, "market search");

            let prompt = prompt::search_prompt(search_address, level, occupancy, window);
            oracle_calls += 1;
            let stage = format!("価格検索（{}）", level.label());
            let response = timings.time(&stage, || self.oracle.generate_with_search(&prompt));

            let response = match response.and_then(reject_error_text) {
                Ok(response) => response,
                Err(err) if err.is_quota() => {
                    warn!(level = level.label(), error = %err, "quota exhausted; search aborted");
                    self.oracle.disable(&err);
                    return Err(PriceEstimateError::QuotaExhausted { level, source: err });
                }
                Err(err @ OracleError::Unavailable(_)) => {
                    return Err(PriceEstimateError::Unavailable(err));
                }
                Err(err) if is_last => {
                    warn!(level = level.label(), error = %err, "search failed at the widest level");
                    return Err(PriceEstimateError::Oracle { level, source: err });
                }
                Err(err) => {
                    warn!(level = level.label(), error = %err, "search failed; widening");
                    continue;
                }
            };

            let reply = SearchReply::parse(&response.text);
            if reply.is_valid() {
                info!(
                    level = level.label(),
                    listings = reply.listings.len(),
                    sources = response.grounding_sources.len(),
                    "market listings found"
                );
                return Ok(PriceEstimate::from_reply(
                    reply,
                    level,
                    search_address,
                    response,
                    oracle_calls,
                ));
            }
            warn!(level = level.label(), listings = reply.listings.len(), "no valid listings; widening");
        }

        Ok(PriceEstimate::no_listings(oracle_calls))
    }
}

/// Providers sometimes answer with an error sentence instead of failing.
fn reject_error_text(response: OracleResponse) -> Result<OracleResponse, OracleError> {
    let text = response.text.trim();
    if text.starts_with("エラー") || text.starts_with("Gemini API") {
        return Err(OracleError::from_message(text));
    }
    if text.is_empty() {
        return Err(OracleError::EmptyResponse);
    }
    if signals_quota(text) && SearchReply::parse(text) == SearchReply::default() {
        return Err(OracleError::QuotaExhausted(text.to_string()));
    }
    Ok(response)
}
