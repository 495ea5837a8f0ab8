//! Payback simulation over an occupancy sweep.
//!
//! Pure arithmetic: no I/O and no fallbacks. Commission is taken out of
//! revenue, operating costs are monthly figures annualised, and tax only
//! applies to a positive pre-tax profit.

use serde::{Deserialize, Serialize};
use std::io::Write;

pub const DAYS_PER_YEAR: f64 = 365.0;
pub const DEFAULT_DAILY_RATE: f64 = 15_000.0;
pub const DEFAULT_TAX_RATE: f64 = 0.1;
pub const DEFAULT_COMMISSION_RATE: f64 = 0.15;
pub const DEFAULT_COMMUNICATION: u64 = 5_000;
pub const DEFAULT_INSURANCE: u64 = 5_000;
pub const DEFAULT_OCCUPANCY_RATES: &[f64] = &[0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];

const NO_PAYBACK: &str = "回収不可";

/// One-time costs paid before opening, in yen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialCosts {
    pub deposit: u64,
    pub key_money: u64,
    pub brokerage_fee: u64,
    pub guarantee_company: u64,
    pub fire_insurance: u64,
    pub fire_equipment: u64,
    pub furniture: u64,
    pub renovation: u64,
    pub license_fee: u64,
}

impl InitialCosts {
    pub fn items(&self) -> [(&'static str, u64); 9] {
        [
            ("敷金", self.deposit),
            ("礼金", self.key_money),
            ("仲介手数料", self.brokerage_fee),
            ("保証会社", self.guarantee_company),
            ("火災保険", self.fire_insurance),
            ("消防設備", self.fire_equipment),
            ("家具・家電購入費用", self.furniture),
            ("リノベーション費用", self.renovation),
            ("許可・届出費用", self.license_fee),
        ]
    }

    /// Saturates rather than wrapping on absurd inputs.
    pub fn total(&self) -> u64 {
        saturating_sum(self.items().iter().map(|(_, amount)| *amount))
    }
}

pub(crate) fn saturating_sum(amounts: impl IntoIterator<Item = u64>) -> u64 {
    amounts.into_iter().fold(0, u64::saturating_add)
}

/// Monthly running costs in yen. `commission_rate` is a share of revenue,
/// not a monthly amount, and never enters the cost total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatingCosts {
    pub rent: u64,
    pub utilities: u64,
    pub communication: u64,
    pub insurance: u64,
    pub cleaning: u64,
    pub supplies: u64,
    pub commission_rate: f64,
}

impl Default for OperatingCosts {
    fn default() -> Self {
        Self {
            rent: 0,
            utilities: 0,
            communication: DEFAULT_COMMUNICATION,
            insurance: DEFAULT_INSURANCE,
            cleaning: 0,
            supplies: 0,
            commission_rate: DEFAULT_COMMISSION_RATE,
        }
    }
}

impl OperatingCosts {
    /// Every cost zero, commission at its default.
    pub fn zero() -> Self {
        Self {
            communication: 0,
            insurance: 0,
            ..Self::default()
        }
    }

    pub fn items(&self) -> [(&'static str, u64); 6] {
        [
            ("家賃", self.rent),
            ("水道光熱費", self.utilities),
            ("通信費", self.communication),
            ("保険費", self.insurance),
            ("清掃費", self.cleaning),
            ("消耗品", self.supplies),
        ]
    }

    pub fn monthly_total(&self) -> u64 {
        saturating_sum(self.items().iter().map(|(_, amount)| *amount))
    }

    pub fn annual_total(&self) -> f64 {
        self.monthly_total() as f64 * 12.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    pub initial_costs: InitialCosts,
    pub operating_costs: OperatingCosts,
    pub daily_rate: f64,
    pub occupancy_rates: Vec<f64>,
    pub tax_rate: f64,
    /// Overrides `operating_costs.commission_rate` when set.
    pub commission_rate: Option<f64>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            initial_costs: InitialCosts::default(),
            operating_costs: OperatingCosts::default(),
            daily_rate: DEFAULT_DAILY_RATE,
            occupancy_rates: DEFAULT_OCCUPANCY_RATES.to_vec(),
            tax_rate: DEFAULT_TAX_RATE,
            commission_rate: None,
        }
    }
}

impl SimulationParams {
    pub fn effective_commission_rate(&self) -> f64 {
        self.commission_rate
            .unwrap_or(self.operating_costs.commission_rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulationRow {
    pub occupancy_rate: f64,
    pub operating_days: f64,
    pub gross_revenue: f64,
    pub commission: f64,
    /// Revenue after commission.
    pub annual_revenue: f64,
    pub annual_cost: f64,
    pub gross_profit: f64,
    pub tax: f64,
    pub net_profit: f64,
    /// `f64::INFINITY` when the year does not turn a profit.
    #[serde(serialize_with = "finite_or_null")]
    pub payback_years: f64,
}

impl SimulationRow {
    pub fn pays_back(&self) -> bool {
        self.payback_years.is_finite()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub initial_total: u64,
    pub annual_operating_cost: f64,
    pub daily_rate: f64,
    pub tax_rate: f64,
    pub commission_rate: f64,
    pub rows: Vec<SimulationRow>,
    /// Occupancy at which revenue covers operating costs. Commission and
    /// tax are left out of this headline figure.
    pub breakeven_occupancy: f64,
}

pub fn simulate(params: &SimulationParams) -> SimulationResult {
    let initial_total = params.initial_costs.total();
    let annual_cost = params.operating_costs.annual_total();
    let commission_rate = params.effective_commission_rate();

    let rows = params
        .occupancy_rates
        .iter()
        .map(|&rate| {
            simulate_row(
                rate,
                initial_total as f64,
                annual_cost,
                params.daily_rate,
                commission_rate,
                params.tax_rate,
            )
        })
        .collect();

    SimulationResult {
        initial_total,
        annual_operating_cost: annual_cost,
        daily_rate: params.daily_rate,
        tax_rate: params.tax_rate,
        commission_rate,
        rows,
        breakeven_occupancy: breakeven_occupancy(annual_cost, params.daily_rate),
    }
}

fn simulate_row(
    occupancy_rate: f64,
    initial_total: f64,
    annual_cost: f64,
    daily_rate: f64,
    commission_rate: f64,
    tax_rate: f64,
) -> SimulationRow {
    let operating_days = DAYS_PER_YEAR * occupancy_rate;
    let gross_revenue = daily_rate * operating_days;
    let commission = gross_revenue * commission_rate;
    let annual_revenue = gross_revenue - commission;
    let gross_profit = annual_revenue - annual_cost;
    let tax = if gross_profit > 0.0 {
        gross_profit * tax_rate
    } else {
        0.0
    };
    let net_profit = gross_profit - tax;
    let payback_years = if net_profit > 0.0 {
        initial_total / net_profit
    } else {
        f64::INFINITY
    };

    SimulationRow {
        occupancy_rate,
        operating_days,
        gross_revenue,
        commission,
        annual_revenue,
        annual_cost,
        gross_profit,
        tax,
        net_profit,
        payback_years,
    }
}

/// `annual_cost / (daily_rate × 365)`, capped at 1. A non-positive rate can
/// never break even.
pub fn breakeven_occupancy(annual_cost: f64, daily_rate: f64) -> f64 {
    if daily_rate <= 0.0 {
        return 1.0;
    }
    (annual_cost / (daily_rate * DAYS_PER_YEAR)).min(1.0)
}

impl SimulationResult {
    pub fn recommendations(&self) -> Vec<String> {
        let Some(best) = self
            .rows
            .iter()
            .max_by(|a, b| a.net_profit.total_cmp(&b.net_profit))
        else {
            return vec!["シミュレーション結果がありません。".to_string()];
        };

        let mut notes = vec![format!(
            "最も収益性の高い稼働率は{}です。",
            percent(best.occupancy_rate)
        )];

        let shortest = self
            .rows
            .iter()
            .filter(|row| row.pays_back())
            .map(|row| row.payback_years)
            .min_by(f64::total_cmp);
        if let Some(years) = shortest {
            notes.push(format!("最短投資回収年数は{years:.1}年です。"));
            if years > 10.0 {
                notes.push("投資回収年数が長いため、初期投資額の見直しを検討してください。".to_string());
            } else if years < 5.0 {
                notes.push("投資回収年数が短く、収益性が高いです。".to_string());
            }
        }

        let profitable = self.rows.iter().filter(|row| row.net_profit > 0.0).count();
        if (profitable as f64) < self.rows.len() as f64 / 2.0 {
            notes.push(
                "多くの稼働率で赤字となる可能性があります。単価の見直しを検討してください。"
                    .to_string(),
            );
        }
        notes
    }

    /// Display rows with the column headings used in reports.
    pub fn table(&self) -> Vec<[String; 8]> {
        self.rows
            .iter()
            .map(|row| {
                [
                    percent(row.occupancy_rate),
                    format!("{}日", row.operating_days.round()),
                    yen(row.annual_revenue),
                    yen(row.annual_cost),
                    yen(row.gross_profit),
                    yen(row.tax),
                    yen(row.net_profit),
                    if row.pays_back() {
                        format!("{:.1}年", row.payback_years)
                    } else {
                        NO_PAYBACK.to_string()
                    },
                ]
            })
            .collect()
    }

    pub fn markdown_table(&self) -> String {
        let mut lines = vec![
            format!("| {} |", TABLE_HEADERS.join(" | ")),
            format!("|{}", "---|".repeat(TABLE_HEADERS.len())),
        ];
        lines.extend(
            self.table()
                .iter()
                .map(|cells| format!("| {} |", cells.join(" | "))),
        );
        lines.join("\n")
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(TABLE_HEADERS)?;
        for cells in self.table() {
            csv_writer.write_record(&cells)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

pub const TABLE_HEADERS: [&str; 8] = [
    "稼働率",
    "実際の営業日数",
    "年間収益",
    "年間費用",
    "税引前利益",
    "税金",
    "税引後利益",
    "投資回収年数",
];

fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

/// Signed yen with thousands separators, rounded to the yen.
pub fn yen(amount: f64) -> String {
    let rounded = amount.round();
    let digits = (rounded.abs() as u64).to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("¥-{grouped}")
    } else {
        format!("¥{grouped}")
    }
}

fn finite_or_null<S: serde::Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else {
        serializer.serialize_none()
    }
}
