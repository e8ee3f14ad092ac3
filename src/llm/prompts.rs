use crate::error::Result;
use crate::overrides::ConfigOverrides;
use crate::schema::{SimulationConfig, SimulationSummary};
use serde::Serialize;

pub const ANALYST_SYSTEM_PROMPT: &str = r#"
You are a financial analyst for a small business that buys phones, resells them with a down payment
plus monthly installments, and reinvests the cash it collects into new stock.

## WHAT YOU RECEIVE
A JSON object with two keys:
- `config`: the scenario inputs (capital, unit cost, financing terms, monthly injections,
  fixed costs, withdrawal rule, reinvestment policy, horizon in months).
- `summary`: totals produced by the projection (units sold, revenue, costs, withdrawals,
  final profit, final cash, installments still owed).

## HOW TO ANSWER
1. Start with a short verdict on the health of the scenario.
2. Explain the cash cycle: how long a unit takes to pay back its cost, and whether the down
   payment covers enough of the purchase to keep reinvesting.
3. Point out risks: negative cash, withdrawals growing faster than collections, a large share of
   revenue still sitting in unpaid installments at the end of the horizon.
4. Give at most three concrete recommendations.
5. Use plain language and concrete numbers from the data. Do not invent numbers.

## SUGGESTED ADJUSTMENTS (OPTIONAL)
If you recommend changing inputs, end your answer with ONE fenced ```json block containing only
the fields you would change. Allowed fields follow this JSON schema:
"#;

#[derive(Serialize)]
pub struct AnalysisPayload<'a> {
    pub config: &'a SimulationConfig,
    pub summary: &'a SimulationSummary,
}

/// System prompt including the schema of the adjustments the model may suggest.
pub fn analyst_system_prompt() -> String {
    let schema = serde_json::to_string_pretty(&schemars::schema_for!(ConfigOverrides))
        .unwrap_or_default();
    format!("{}{}\n", ANALYST_SYSTEM_PROMPT, schema)
}

/// Instruction for the first analysis turn, embedding `{config, summary}` as JSON.
pub fn build_analysis_prompt(
    config: &SimulationConfig,
    summary: &SimulationSummary,
) -> Result<String> {
    let payload = serde_json::to_string_pretty(&AnalysisPayload { config, summary })?;

    Ok(format!(
        "Analyze the following phone resale projection over {} months and explain \
         whether the reinvestment strategy is sustainable.\n\n```json\n{}\n```",
        config.period_count, payload
    ))
}

pub fn build_follow_up_prompt(question: &str) -> String {
    format!(
        "Follow-up question about the same projection: {}\n\
         Answer using the data already provided.",
        question.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::simulate;

    #[test]
    fn test_analysis_prompt_embeds_config_and_summary() {
        let config = SimulationConfig::default();
        let outcome = simulate(&config);

        let prompt = build_analysis_prompt(&config, &outcome.summary).unwrap();

        assert!(prompt.contains("over 12 months"));
        let start = prompt.find("```json").unwrap() + "```json".len();
        let end = prompt.rfind("```").unwrap();
        let payload: serde_json::Value = serde_json::from_str(&prompt[start..end]).unwrap();

        assert_eq!(payload["config"]["cost_per_phone"], 600.0);
        assert_eq!(
            payload["summary"]["total_units_sold"],
            outcome.summary.total_units_sold
        );
    }

    #[test]
    fn test_system_prompt_lists_override_fields() {
        let prompt = analyst_system_prompt();
        assert!(prompt.contains("withdrawal_amount_per_block"));
        assert!(prompt.contains("installment_count"));
    }
}
