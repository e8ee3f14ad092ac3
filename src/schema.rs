use crate::error::{ProjectionError, Result};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReinvestMode {
    #[schemars(description = "Spend all available cash on new units every period.")]
    All,

    #[schemars(
        description = "Spend at most `fixed_reinvest_amount` per period, capped by available cash."
    )]
    Fixed,

    #[schemars(
        description = "Spend `percent_reinvest_rate` percent of available cash (rounded down) per period."
    )]
    Percent,
}

/// Immutable input of one projection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SimulationConfig {
    #[schemars(description = "Cash available before the initial stocking.")]
    pub initial_capital: f64,

    #[schemars(description = "Purchase cost of one phone.")]
    pub cost_per_phone: f64,

    #[schemars(
        description = "Phones bought and sold at period 0. Clamped to what initial capital affords."
    )]
    pub initial_units: u32,

    #[schemars(description = "Down payment received when a phone is sold.")]
    pub entry_amount: f64,

    #[schemars(description = "Number of monthly installments per sale. 0 means no financing.")]
    pub installment_count: u32,

    #[schemars(description = "Amount of each installment.")]
    pub installment_amount: f64,

    #[schemars(description = "Cash injected every period independent of sales.")]
    pub extra_monthly: f64,

    #[serde(default)]
    #[schemars(description = "Fixed costs deducted every period. 0 disables.")]
    pub fixed_monthly_costs: f64,

    #[serde(default)]
    #[schemars(
        description = "Units sold per withdrawal block. Each period withdraws `floor(total_units_sold / block_size) * withdrawal_amount_per_block`. 0 disables withdrawals."
    )]
    pub withdrawal_block_size: u32,

    #[serde(default)]
    #[schemars(description = "Cash withdrawn per completed block, every period.")]
    pub withdrawal_amount_per_block: f64,

    pub reinvest_mode: ReinvestMode,

    #[serde(default)]
    #[schemars(description = "Reinvestment cap per period for the `fixed` mode.")]
    pub fixed_reinvest_amount: f64,

    #[serde(default)]
    #[schemars(description = "Percentage of cash reinvested per period for the `percent` mode.")]
    pub percent_reinvest_rate: f64,

    #[schemars(description = "Number of periods (months) to simulate.")]
    pub period_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(
        description = "Optional calendar anchor (YYYY-MM-DD). Period 0 falls in this month; results are labelled with month-end dates."
    )]
    pub start_date: Option<NaiveDate>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_capital: 1600.0,
            cost_per_phone: 600.0,
            initial_units: 2,
            entry_amount: 100.0,
            installment_count: 5,
            installment_amount: 200.0,
            extra_monthly: 1600.0,
            fixed_monthly_costs: 0.0,
            withdrawal_block_size: 0,
            withdrawal_amount_per_block: 0.0,
            reinvest_mode: ReinvestMode::All,
            fixed_reinvest_amount: 1600.0,
            percent_reinvest_rate: 100.0,
            period_count: 12,
            start_date: None,
        }
    }
}

impl SimulationConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Total owed by a customer over the life of one financed sale.
    pub fn financed_amount_per_unit(&self) -> f64 {
        self.installment_count as f64 * self.installment_amount
    }
}

/// JSON schema of [`SimulationConfig`], handed to the analysis model so its
/// suggestions use the right field names.
pub fn config_json_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(SimulationConfig)).unwrap_or_default()
}

/// Period-over-period change of cumulative profit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum GrowthRate {
    NotApplicable,
    Percent(f64),
}

impl GrowthRate {
    pub const NOT_APPLICABLE: &'static str = "N/A";

    pub fn between(previous_profit: f64, current_profit: f64) -> Self {
        if previous_profit == 0.0 {
            return Self::NotApplicable;
        }
        Self::Percent((current_profit - previous_profit) / previous_profit.abs() * 100.0)
    }

    pub fn as_percent(&self) -> Option<f64> {
        match self {
            Self::NotApplicable => None,
            Self::Percent(value) => Some(*value),
        }
    }

    /// Rendering without the `%` suffix, as used by tabular exports.
    pub fn bare(&self) -> String {
        match self {
            Self::NotApplicable => Self::NOT_APPLICABLE.to_string(),
            Self::Percent(value) => format!("{:.2}", value),
        }
    }
}

impl fmt::Display for GrowthRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotApplicable => f.write_str(Self::NOT_APPLICABLE),
            Self::Percent(value) => write!(f, "{:.2}%", value),
        }
    }
}

impl FromStr for GrowthRate {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case(Self::NOT_APPLICABLE) {
            return Ok(Self::NotApplicable);
        }
        trimmed
            .trim_end_matches('%')
            .trim()
            .parse::<f64>()
            .map(Self::Percent)
            .map_err(|_| ProjectionError::InvalidGrowthRate(s.to_string()))
    }
}

impl From<GrowthRate> for String {
    fn from(rate: GrowthRate) -> Self {
        rate.to_string()
    }
}

impl TryFrom<String> for GrowthRate {
    type Error = ProjectionError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// One row of the projection, appended once per period and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyResult {
    pub period: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end: Option<NaiveDate>,
    /// Installments collected this period.
    pub collected: f64,
    /// Down payments from units sold this period.
    pub entry_received: f64,
    pub extra_monthly: f64,
    pub fixed_costs: f64,
    pub withdrawal: f64,
    pub reinvest_spend: f64,
    pub units_purchased: u64,
    pub ending_cash: f64,
    pub cumulative_profit: f64,
    pub total_units_sold: u64,
    pub growth_rate: GrowthRate,
    pub units_paid_off: u64,
    pub units_being_paid: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub total_units_sold: u64,
    /// Purchases plus fixed costs over the whole horizon.
    pub total_cost: f64,
    pub total_purchase_cost: f64,
    pub total_fixed_costs: f64,
    pub total_revenue: f64,
    pub total_withdrawals: f64,
    pub final_profit: f64,
    pub average_ticket: f64,
    pub units_being_paid: u64,
    pub units_paid_off: u64,
    pub final_cash: f64,
    /// Installments still owed by customers after the last period.
    pub outstanding_receivables: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub monthly_results: Vec<MonthlyResult>,
    pub summary: SimulationSummary,
}

impl SimulationOutcome {
    pub fn last_period(&self) -> Option<&MonthlyResult> {
        self.monthly_results.last()
    }

    pub fn period(&self, period: u32) -> Option<&MonthlyResult> {
        period
            .checked_sub(1)
            .and_then(|idx| self.monthly_results.get(idx as usize))
    }
}
