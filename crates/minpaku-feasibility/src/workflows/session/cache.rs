use super::pipeline::MarketOutcome;
use crate::workflows::costs::CostSheet;
use crate::workflows::market::PriceEstimate;
use std::collections::HashMap;

/// Cache key for per-property economics. Area is keyed by its bit pattern so
/// `None` and every distinct float stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EconomicsKey {
    address: String,
    area_bits: Option<u64>,
}

impl EconomicsKey {
    pub fn new(address: &str, area_m2: Option<f64>) -> Self {
        Self {
            address: address.trim().to_string(),
            area_bits: area_m2.map(f64::to_bits),
        }
    }
}

/// Session-lifetime store for market estimates and cost sheets. Failed
/// market searches are never stored, so a later render retries them.
#[derive(Debug, Default)]
pub struct EconomicsCache {
    estimates: HashMap<EconomicsKey, PriceEstimate>,
    costs: HashMap<EconomicsKey, CostSheet>,
}

impl EconomicsCache {
    pub fn market(&self, key: &EconomicsKey) -> Option<MarketOutcome> {
        self.estimates.get(key).cloned().map(MarketOutcome::Estimated)
    }

    pub fn store_market(&mut self, key: EconomicsKey, outcome: &MarketOutcome) {
        if let MarketOutcome::Estimated(estimate) = outcome {
            self.estimates.insert(key, estimate.clone());
        }
    }

    pub fn costs(&self, key: &EconomicsKey) -> Option<CostSheet> {
        self.costs.get(key).cloned()
    }

    pub fn store_costs(&mut self, key: EconomicsKey, sheet: &CostSheet) {
        self.costs.insert(key, sheet.clone());
    }

    pub fn len(&self) -> usize {
        self.estimates.len() + self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimates.is_empty() && self.costs.is_empty()
    }

    pub fn clear(&mut self) {
        self.estimates.clear();
        self.costs.clear();
    }
}
