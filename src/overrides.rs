use crate::error::Result;
use crate::schema::{ReinvestMode, SimulationConfig};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Adjustments suggested for a scenario. Every field is optional; unset
/// fields keep the current config value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConfigOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "New purchase cost per phone.")]
    pub cost_per_phone: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "New down payment per sale.")]
    pub entry_amount: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "New number of installments per sale.")]
    pub installment_count: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "New installment amount.")]
    pub installment_amount: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "New monthly cash injection.")]
    pub extra_monthly: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "New withdrawal block size (units sold per block).")]
    pub withdrawal_block_size: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "New withdrawal amount per block.")]
    pub withdrawal_amount_per_block: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "New monthly fixed costs.")]
    pub fixed_monthly_costs: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reinvest_mode: Option<ReinvestMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "New per-period reinvestment cap, used by the `fixed` mode.")]
    pub fixed_reinvest_amount: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "New reinvested percentage of cash, used by the `percent` mode.")]
    pub percent_reinvest_rate: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "New projection horizon in periods.")]
    pub period_count: Option<u32>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.cost_per_phone.is_some() {
            fields.push("cost_per_phone");
        }
        if self.entry_amount.is_some() {
            fields.push("entry_amount");
        }
        if self.installment_count.is_some() {
            fields.push("installment_count");
        }
        if self.installment_amount.is_some() {
            fields.push("installment_amount");
        }
        if self.extra_monthly.is_some() {
            fields.push("extra_monthly");
        }
        if self.withdrawal_block_size.is_some() {
            fields.push("withdrawal_block_size");
        }
        if self.withdrawal_amount_per_block.is_some() {
            fields.push("withdrawal_amount_per_block");
        }
        if self.fixed_monthly_costs.is_some() {
            fields.push("fixed_monthly_costs");
        }
        if self.reinvest_mode.is_some() {
            fields.push("reinvest_mode");
        }
        if self.fixed_reinvest_amount.is_some() {
            fields.push("fixed_reinvest_amount");
        }
        if self.percent_reinvest_rate.is_some() {
            fields.push("percent_reinvest_rate");
        }
        if self.period_count.is_some() {
            fields.push("period_count");
        }
        fields
    }

    /// Returns a copy of `config` with the overrides applied.
    pub fn apply(&self, config: &SimulationConfig) -> SimulationConfig {
        let mut next = config.clone();
        if let Some(v) = self.cost_per_phone {
            next.cost_per_phone = v;
        }
        if let Some(v) = self.entry_amount {
            next.entry_amount = v;
        }
        if let Some(v) = self.installment_count {
            next.installment_count = v;
        }
        if let Some(v) = self.installment_amount {
            next.installment_amount = v;
        }
        if let Some(v) = self.extra_monthly {
            next.extra_monthly = v;
        }
        if let Some(v) = self.withdrawal_block_size {
            next.withdrawal_block_size = v;
        }
        if let Some(v) = self.withdrawal_amount_per_block {
            next.withdrawal_amount_per_block = v;
        }
        if let Some(v) = self.fixed_monthly_costs {
            next.fixed_monthly_costs = v;
        }
        if let Some(v) = self.reinvest_mode {
            next.reinvest_mode = v;
        }
        if let Some(v) = self.fixed_reinvest_amount {
            next.fixed_reinvest_amount = v;
        }
        if let Some(v) = self.percent_reinvest_rate {
            next.percent_reinvest_rate = v;
        }
        if let Some(v) = self.period_count {
            next.period_count = v;
        }
        next
    }
}

/// Fenced ```json block in free-text commentary, if any.
fn find_fenced_json(text: &str) -> Option<&str> {
    let fence = text.find("```json")?;
    let body = &text[fence + "```json".len()..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// Outermost `{ ... }` span, for replies that skip the fence.
fn find_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Pulls suggested overrides out of model commentary. Commentary without
/// any JSON object yields `Ok(None)`. A malformed fenced ```json block is
/// an error; braces in plain prose are not.
pub fn extract_overrides(text: &str) -> Result<Option<ConfigOverrides>> {
    let overrides: ConfigOverrides = if let Some(raw) = find_fenced_json(text) {
        serde_json::from_str(raw)?
    } else {
        let Some(raw) = find_brace_span(text) else {
            return Ok(None);
        };
        match serde_json::from_str(raw) {
            Ok(overrides) => overrides,
            Err(e) => {
                debug!("Ignoring non-JSON braces in commentary: {}", e);
                return Ok(None);
            }
        }
    };

    Ok((!overrides.is_empty()).then_some(overrides))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_only_touches_set_fields() {
        let config = SimulationConfig::default();
        let overrides = ConfigOverrides {
            entry_amount: Some(150.0),
            withdrawal_block_size: Some(10),
            withdrawal_amount_per_block: Some(300.0),
            ..Default::default()
        };

        let next = overrides.apply(&config);

        assert_eq!(next.entry_amount, 150.0);
        assert_eq!(next.withdrawal_block_size, 10);
        assert_eq!(next.withdrawal_amount_per_block, 300.0);
        assert_eq!(next.cost_per_phone, config.cost_per_phone);
        assert_eq!(next.period_count, config.period_count);
        assert_eq!(
            overrides.changed_fields(),
            vec![
                "entry_amount",
                "withdrawal_block_size",
                "withdrawal_amount_per_block"
            ]
        );
    }

    #[test]
    fn test_extract_from_fenced_block() {
        let text = "Raising the entry helps.\n\n```json\n{\"entry_amount\": 200, \"reinvest_mode\": \"percent\"}\n```\nGood luck!";

        let overrides = extract_overrides(text).unwrap().unwrap();
        assert_eq!(overrides.entry_amount, Some(200.0));
        assert_eq!(overrides.reinvest_mode, Some(ReinvestMode::Percent));
    }

    #[test]
    fn test_extract_without_json_returns_none() {
        assert!(extract_overrides("Your plan looks healthy.").unwrap().is_none());
        assert!(extract_overrides("Nothing to change: {}").unwrap().is_none());
    }

    #[test]
    fn test_extract_malformed_json_errors() {
        assert!(extract_overrides("```json\n{\"entry_amount\": }\n```").is_err());
    }

    #[test]
    fn test_braces_in_prose_are_not_overrides() {
        assert!(extract_overrides("Keep the {entry} as is.").unwrap().is_none());
        assert!(extract_overrides("Costs {rise} and {fall} over time.").unwrap().is_none());
    }

    #[test]
    fn test_unfenced_object_is_still_extracted() {
        let overrides = extract_overrides("Try {\"extra_monthly\": 800} next.")
            .unwrap()
            .unwrap();
        assert_eq!(overrides.extra_monthly, Some(800.0));
    }

    #[test]
    fn test_mode_change_carries_its_parameters() {
        let text = "Switch to percent at half.\n```json\n{\"reinvest_mode\": \"percent\", \"percent_reinvest_rate\": 50, \"fixed_monthly_costs\": 200}\n```";
        let overrides = extract_overrides(text).unwrap().unwrap();
        assert_eq!(
            overrides.changed_fields(),
            vec!["fixed_monthly_costs", "reinvest_mode", "percent_reinvest_rate"]
        );

        let next = overrides.apply(&SimulationConfig::default());
        assert_eq!(next.reinvest_mode, ReinvestMode::Percent);
        assert_eq!(next.percent_reinvest_rate, 50.0);
        assert_eq!(next.fixed_monthly_costs, 200.0);
        assert_eq!(next.fixed_reinvest_amount, 1600.0);

        let fixed = ConfigOverrides {
            reinvest_mode: Some(ReinvestMode::Fixed),
            fixed_reinvest_amount: Some(900.0),
            ..Default::default()
        }
        .apply(&SimulationConfig::default());
        assert_eq!(fixed.reinvest_mode, ReinvestMode::Fixed);
        assert_eq!(fixed.fixed_reinvest_amount, 900.0);
    }
}
