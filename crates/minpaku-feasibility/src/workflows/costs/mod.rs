//! Initial and monthly cost estimation.
//!
//! Lease figures come from the flyer text ([`LeaseExtractor`]); equipment,
//! furnishing and running costs are priced by the oracle from the property
//! profile ([`CostEstimator`]). [`CostPlanner`] assembles both into the
//! simulation's [`InitialCosts`] and [`OperatingCosts`].

mod estimators;
mod extractor;

pub use estimators::{parse_estimate, CostEstimator, CostItem, INSURANCE_DEFAULT};
pub use extractor::{
    lease_costs_from_text, months_of_rent, parse_cost_text, parse_cost_value, rent_from_text,
    LeaseExtractor,
};

use crate::oracle::ReasoningOracle;
use crate::workflows::address::occupancy_from_area;
use crate::workflows::legal::{PropertyFacts, Requirements};
use crate::workflows::simulation::{saturating_sum, InitialCosts, OperatingCosts};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static JSON_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]+\}").expect("valid json object regex"));

/// Guest count assumed when the floor area is unknown.
const DEFAULT_OCCUPANCY: u32 = 2;

pub(crate) fn first_json_object(text: &str) -> Option<Map<String, Value>> {
    JSON_OBJECT_RE
        .find(text)
        .and_then(|found| serde_json::from_str(found.as_str()).ok())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CostEstimate {
    pub cost: u64,
    pub breakdown: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RentFigures {
    pub rent: u64,
    pub management_fee: u64,
}

impl RentFigures {
    /// Rent plus management fee, the figure month notations multiply.
    pub fn monthly_total(&self) -> u64 {
        self.rent.saturating_add(self.management_fee)
    }
}

/// Move-in costs stated on the flyer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LeaseCosts {
    pub deposit: u64,
    pub key_money: u64,
    pub brokerage_fee: u64,
    pub guarantee_company: u64,
    pub fire_insurance: u64,
}

impl LeaseCosts {
    pub fn total(&self) -> u64 {
        saturating_sum([
            self.deposit,
            self.key_money,
            self.brokerage_fee,
            self.guarantee_company,
            self.fire_insurance,
        ])
    }
}

/// Property attributes the cost prompts mention.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyProfile {
    pub area_m2: Option<f64>,
    pub occupancy: u32,
    pub layout: Option<String>,
    pub address: Option<String>,
    pub structure: Option<String>,
}

impl PropertyProfile {
    pub fn new(area_m2: Option<f64>) -> Self {
        Self {
            area_m2,
            occupancy: occupancy_for(area_m2),
            ..Self::default()
        }
    }

    /// Profile of a confirmed site. The floor count stands in for the
    /// layout, which flyers rarely state in a parseable way.
    pub fn from_facts(facts: &PropertyFacts, address: &str, area_m2: Option<f64>) -> Self {
        let area_m2 = area_m2.or_else(|| facts.floor_area_m2());
        Self {
            area_m2,
            occupancy: occupancy_for(area_m2),
            layout: facts.floors.clone().filter(|floors| !floors.trim().is_empty()),
            address: Some(address.to_string()).filter(|address| !address.trim().is_empty()),
            structure: facts.structure.clone().filter(|structure| !structure.trim().is_empty()),
        }
    }

    fn prompt_lines(&self, item: CostItem) -> String {
        let mut lines = vec![
            match self.area_m2 {
                Some(area) => format!("延べ床面積: {area}m²"),
                None => "延べ床面積: 不明".to_string(),
            },
            format!("宿泊人数: {}人", self.occupancy.max(1)),
            format!("間取り: {}", self.layout.as_deref().unwrap_or("不明")),
        ];
        if matches!(item, CostItem::Insurance | CostItem::Cleaning) {
            lines.push(format!("住所: {}", self.address.as_deref().unwrap_or("不明")));
        }
        if item == CostItem::Insurance {
            lines.push(format!("建物構造: {}", self.structure.as_deref().unwrap_or("不明")));
        }
        lines.join("\n")
    }
}

fn occupancy_for(area_m2: Option<f64>) -> u32 {
    match area_m2 {
        Some(_) => occupancy_from_area(area_m2),
        None => DEFAULT_OCCUPANCY,
    }
}

/// One named amount with the oracle's breakdown text, when it gave one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CostLine {
    pub item: &'static str,
    pub amount: u64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostSheet {
    pub rent: RentFigures,
    pub lease: LeaseCosts,
    pub initial: InitialCosts,
    pub operating: OperatingCosts,
    pub estimates: Vec<(CostItem, CostEstimate)>,
}

impl CostSheet {
    pub fn estimate(&self, item: CostItem) -> Option<&CostEstimate> {
        self.estimates
            .iter()
            .find(|(candidate, _)| *candidate == item)
            .map(|(_, estimate)| estimate)
    }

    pub fn initial_breakdown(&self) -> Vec<CostLine> {
        self.lines(self.initial.items().to_vec(), |label| match label {
            "消防設備" => Some(CostItem::FireEquipment),
            "家具・家電購入費用" => Some(CostItem::Furniture),
            _ => None,
        })
    }

    pub fn operating_breakdown(&self) -> Vec<CostLine> {
        self.lines(self.operating.items().to_vec(), |label| match label {
            "水道光熱費" => Some(CostItem::Utilities),
            "保険費" => Some(CostItem::Insurance),
            "清掃費" => Some(CostItem::Cleaning),
            "消耗品" => Some(CostItem::Supplies),
            _ => None,
        })
    }

    fn lines(
        &self,
        items: Vec<(&'static str, u64)>,
        estimated_by: impl Fn(&str) -> Option<CostItem>,
    ) -> Vec<CostLine> {
        items
            .into_iter()
            .map(|(item, amount)| CostLine {
                item,
                amount,
                note: estimated_by(item)
                    .and_then(|cost_item| self.estimate(cost_item))
                    .map(|estimate| estimate.breakdown.clone())
                    .filter(|note| !note.is_empty()),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CostPlanner<'a> {
    oracle: Option<&'a dyn ReasoningOracle>,
}

impl<'a> CostPlanner<'a> {
    pub fn new(oracle: Option<&'a dyn ReasoningOracle>) -> Self {
        Self { oracle }
    }

    /// Builds both cost sets. Fire equipment is only priced when a fire
    /// code determination is available; estimates of 0 leave the default.
    pub fn plan(
        &self,
        flyer_text: &str,
        profile: &PropertyProfile,
        fire_code: Option<&Requirements>,
    ) -> CostSheet {
        let extractor = LeaseExtractor::new(self.oracle);
        let rent = extractor.rent(flyer_text);
        let lease = if flyer_text.trim().is_empty() {
            LeaseCosts::default()
        } else {
            extractor.lease_costs_with_rent(flyer_text, rent.monthly_total())
        };

        let estimator = CostEstimator::new(self.oracle);
        let estimates: Vec<(CostItem, CostEstimate)> = CostItem::ordered()
            .into_iter()
            .filter(|item| *item != CostItem::FireEquipment || fire_code.is_some())
            .map(|item| (item, estimator.estimate(item, profile, fire_code)))
            .collect();
        let cost_of = |item: CostItem, default: u64| {
            estimates
                .iter()
                .find(|(candidate, _)| *candidate == item)
                .map(|(_, estimate)| estimate.cost)
                .filter(|cost| *cost > 0)
                .unwrap_or(default)
        };

        let initial = InitialCosts {
            deposit: lease.deposit,
            key_money: lease.key_money,
            brokerage_fee: lease.brokerage_fee,
            guarantee_company: lease.guarantee_company,
            fire_insurance: lease.fire_insurance,
            fire_equipment: cost_of(CostItem::FireEquipment, 0),
            furniture: cost_of(CostItem::Furniture, 0),
            ..InitialCosts::default()
        };
        let defaults = OperatingCosts::default();
        let operating = OperatingCosts {
            rent: rent.monthly_total(),
            utilities: cost_of(CostItem::Utilities, defaults.utilities),
            insurance: cost_of(CostItem::Insurance, defaults.insurance),
            cleaning: cost_of(CostItem::Cleaning, defaults.cleaning),
            supplies: cost_of(CostItem::Supplies, defaults.supplies),
            ..defaults
        };

        CostSheet {
            rent,
            lease,
            initial,
            operating,
            estimates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_without_oracle_uses_text_and_defaults() {
        let sheet = CostPlanner::new(None).plan(
            "賃料：80,000円 管理費：5,000円 敷金：1ヶ月 礼金：なし",
            &PropertyProfile::new(Some(40.0)),
            None,
        );

        assert_eq!(sheet.rent.monthly_total(), 85_000);
        assert_eq!(sheet.initial.deposit, 85_000);
        assert_eq!(sheet.initial.key_money, 0);
        assert_eq!(sheet.operating.rent, 85_000);
        assert_eq!(sheet.operating.insurance, INSURANCE_DEFAULT);
        assert_eq!(sheet.operating.communication, 5_000);
        assert!(sheet.estimate(CostItem::FireEquipment).is_none());
        assert_eq!(
            sheet.estimate(CostItem::Insurance).map(|estimate| estimate.breakdown.as_str()),
            Some("デフォルト値")
        );
    }

    #[test]
    fn breakdown_attaches_oracle_notes() {
        let sheet = CostPlanner::new(None).plan("", &PropertyProfile::new(None), None);
        let insurance = sheet
            .operating_breakdown()
            .into_iter()
            .find(|line| line.item == "保険費")
            .expect("insurance line");
        assert_eq!(insurance.amount, INSURANCE_DEFAULT);
        assert_eq!(insurance.note.as_deref(), Some("デフォルト値"));
        assert_eq!(sheet.initial_breakdown().len(), 9);
    }

    #[test]
    fn unknown_area_assumes_two_guests() {
        assert_eq!(PropertyProfile::new(None).occupancy, 2);
        assert_eq!(PropertyProfile::new(Some(130.0)).occupancy, 10);
    }
}
