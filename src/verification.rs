use crate::error::{ProjectionError, Result};
use crate::schema::{SimulationConfig, SimulationOutcome};

/// Re-checks a finished outcome against the accounting identities the
/// engine is expected to hold.
pub struct OutcomeVerifier<'a> {
    config: &'a SimulationConfig,
}

#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    pub periods_checked: usize,
    /// Largest absolute cash conservation drift seen, within tolerance.
    pub max_cash_drift: f64,
    pub warnings: Vec<String>,
}

impl<'a> OutcomeVerifier<'a> {
    pub fn new(config: &'a SimulationConfig) -> Self {
        Self { config }
    }

    /// Cash at the end of period 0, after initial stocking. Recomputed from
    /// the summary and the per-period flows.
    fn opening_cash(&self, outcome: &SimulationOutcome) -> f64 {
        outcome
            .monthly_results
            .iter()
            .fold(outcome.summary.final_cash, |cash, r| {
                cash - r.collected - r.entry_received - r.extra_monthly
                    + r.fixed_costs
                    + r.withdrawal
                    + r.reinvest_spend
            })
    }

    pub fn verify(&self, outcome: &SimulationOutcome, tolerance: f64) -> Result<VerificationReport> {
        let config = self.config;
        let results = &outcome.monthly_results;
        let mut report = VerificationReport::default();

        if results.len() != config.period_count as usize {
            return Err(ProjectionError::OutcomeShape(format!(
                "expected {} monthly results, found {}",
                config.period_count,
                results.len()
            )));
        }

        let mut previous_cash = self.opening_cash(outcome);
        if previous_cash < -tolerance {
            report
                .warnings
                .push(format!("Opening cash is negative: {:.2}", previous_cash));
        }

        let mut previous_units = match results.first() {
            Some(first) => first
                .total_units_sold
                .checked_sub(first.units_purchased)
                .ok_or_else(|| ProjectionError::UnitAccountingViolation {
                    period: first.period,
                    details: format!(
                        "{} units purchased but only {} sold in total",
                        first.units_purchased, first.total_units_sold
                    ),
                })?,
            None => 0,
        };
        let mut revenue = 0.0;
        let mut purchases = 0.0;

        for (idx, result) in results.iter().enumerate() {
            let expected_period = idx as u32 + 1;
            if result.period != expected_period {
                return Err(ProjectionError::OutcomeShape(format!(
                    "row {} is labelled period {}",
                    idx, result.period
                )));
            }

            let expected_cash = previous_cash
                + result.collected
                + result.entry_received
                + result.extra_monthly
                - result.fixed_costs
                - result.withdrawal
                - result.reinvest_spend;
            let drift = (expected_cash - result.ending_cash).abs();
            if drift > tolerance {
                return Err(ProjectionError::CashConservationViolation {
                    period: result.period,
                    expected: expected_cash,
                    actual: result.ending_cash,
                });
            }
            report.max_cash_drift = report.max_cash_drift.max(drift);

            if result.total_units_sold != result.units_paid_off + result.units_being_paid {
                return Err(ProjectionError::UnitAccountingViolation {
                    period: result.period,
                    details: format!(
                        "{} sold != {} paid off + {} being paid",
                        result.total_units_sold, result.units_paid_off, result.units_being_paid
                    ),
                });
            }
            if result.total_units_sold < previous_units {
                return Err(ProjectionError::UnitAccountingViolation {
                    period: result.period,
                    details: format!(
                        "units sold decreased from {} to {}",
                        previous_units, result.total_units_sold
                    ),
                });
            }

            revenue += result.collected + result.entry_received;
            purchases += result.reinvest_spend;
            previous_cash = result.ending_cash;
            previous_units = result.total_units_sold;
            report.periods_checked += 1;
        }

        self.verify_summary(outcome, revenue, purchases, tolerance)?;

        Ok(report)
    }

    /// Ties the last period's cumulative profit to the summary and checks
    /// that per-period flows add up to the summary totals.
    fn verify_summary(
        &self,
        outcome: &SimulationOutcome,
        period_revenue: f64,
        period_purchases: f64,
        tolerance: f64,
    ) -> Result<()> {
        let summary = &outcome.summary;
        let Some(last) = outcome.last_period() else {
            return Ok(());
        };

        let expected_profit =
            summary.total_revenue - summary.total_cost - summary.total_withdrawals;
        if (expected_profit - last.cumulative_profit).abs() > tolerance {
            return Err(ProjectionError::ProfitIdentityViolation {
                period: last.period,
                expected: expected_profit,
                actual: last.cumulative_profit,
            });
        }
        if (summary.final_profit - last.cumulative_profit).abs() > tolerance {
            return Err(ProjectionError::ProfitIdentityViolation {
                period: last.period,
                expected: summary.final_profit,
                actual: last.cumulative_profit,
            });
        }

        // Period-0 stocking contributes revenue and cost outside the rows.
        let stocking_revenue = summary.total_revenue - period_revenue;
        let stocking_cost = summary.total_purchase_cost - period_purchases;
        if stocking_revenue < -tolerance || stocking_cost < -tolerance {
            return Err(ProjectionError::OutcomeShape(format!(
                "period totals exceed summary totals (revenue gap {:.2}, cost gap {:.2})",
                stocking_revenue, stocking_cost
            )));
        }

        let withdrawals: f64 = outcome.monthly_results.iter().map(|r| r.withdrawal).sum();
        if (withdrawals - summary.total_withdrawals).abs() > tolerance {
            return Err(ProjectionError::OutcomeShape(format!(
                "withdrawals sum to {:.2} but summary reports {:.2}",
                withdrawals, summary.total_withdrawals
            )));
        }

        if last.total_units_sold != summary.total_units_sold {
            return Err(ProjectionError::UnitAccountingViolation {
                period: last.period,
                details: format!(
                    "last period reports {} units, summary {}",
                    last.total_units_sold, summary.total_units_sold
                ),
            });
        }

        Ok(())
    }
}

pub fn verify_outcome(
    config: &SimulationConfig,
    outcome: &SimulationOutcome,
    tolerance: f64,
) -> Result<VerificationReport> {
    OutcomeVerifier::new(config).verify(outcome, tolerance)
}
