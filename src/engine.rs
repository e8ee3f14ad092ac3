use crate::schema::*;
use crate::utils::{affordable_units, period_end_date};
use log::{debug, info, warn};
use std::collections::BTreeMap;

/// One future installment owed for one sold unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Receivable {
    pub due_at_period: u32,
    pub amount: f64,
    pub unit_id: u64,
}

/// Installments still owed for a unit. Dropped once the unit is paid off.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSale {
    pub sold_at_period: u32,
    pub remaining_installments: u32,
}

/// Working set of a single run. Never shared between runs.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub cash: f64,
    /// Receivables partitioned by due period.
    pub receivables: BTreeMap<u32, Vec<Receivable>>,
    pub active_sales: BTreeMap<u64, ActiveSale>,
    pub total_revenue: f64,
    pub total_cost: f64,
    pub total_withdrawals: f64,
    pub total_units_sold: u64,
    pub unit_id_counter: u64,
}

impl EngineState {
    fn new(initial_capital: f64) -> Self {
        Self {
            cash: initial_capital,
            ..Self::default()
        }
    }

    pub fn units_being_paid(&self) -> u64 {
        self.active_sales.len() as u64
    }

    pub fn units_paid_off(&self) -> u64 {
        self.total_units_sold - self.units_being_paid()
    }

    pub fn outstanding_receivables(&self) -> f64 {
        self.receivables.values().flatten().map(|r| r.amount).sum()
    }

    /// Removes and sums every receivable due at `period`, settling the
    /// matching active sales.
    fn collect_due(&mut self, period: u32) -> f64 {
        let Some(due) = self.receivables.remove(&period) else {
            return 0.0;
        };

        let mut collected = 0.0;
        for receivable in due {
            collected += receivable.amount;

            if let Some(sale) = self.active_sales.get_mut(&receivable.unit_id) {
                sale.remaining_installments = sale.remaining_installments.saturating_sub(1);
                if sale.remaining_installments == 0 {
                    self.active_sales.remove(&receivable.unit_id);
                }
            }
        }

        collected
    }
}

pub struct ProjectionEngine<'a> {
    config: &'a SimulationConfig,
}

impl<'a> ProjectionEngine<'a> {
    pub fn new(config: &'a SimulationConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> SimulationOutcome {
        let config = self.config;
        info!(
            "Simulating {} periods ({:?} reinvestment, capital {:.2})",
            config.period_count, config.reinvest_mode, config.initial_capital
        );

        let mut state = EngineState::new(config.initial_capital);
        self.stock_initial_units(&mut state);

        let mut monthly_results: Vec<MonthlyResult> =
            Vec::with_capacity(config.period_count as usize);
        let mut in_deficit = state.cash < 0.0;

        for period in 1..=config.period_count {
            let previous_profit = monthly_results.last().map(|r| r.cumulative_profit);
            let result = self.step(&mut state, period, previous_profit);

            if result.ending_cash < 0.0 && !in_deficit {
                warn!(
                    "Cash went negative in period {}: {:.2}",
                    period, result.ending_cash
                );
            }
            in_deficit = result.ending_cash < 0.0;

            monthly_results.push(result);
        }

        let summary = self.summarize(&state);
        info!(
            "Simulation finished: {} units sold, final profit {:.2}, final cash {:.2}",
            summary.total_units_sold, summary.final_profit, summary.final_cash
        );

        SimulationOutcome {
            monthly_results,
            summary,
        }
    }

    /// Registers `count` sales at `period` and returns the down payments
    /// credited. Purchase cost is charged by the caller.
    pub fn sell_units(&self, state: &mut EngineState, count: u64, period: u32) -> f64 {
        let config = self.config;
        let mut entries = 0.0;

        for _ in 0..count {
            state.unit_id_counter += 1;
            let unit_id = state.unit_id_counter;

            state.cash += config.entry_amount;
            state.total_revenue += config.entry_amount;
            entries += config.entry_amount;

            if config.installment_count > 0 {
                state.active_sales.insert(
                    unit_id,
                    ActiveSale {
                        sold_at_period: period,
                        remaining_installments: config.installment_count,
                    },
                );

                for offset in 1..=config.installment_count {
                    let due_at_period = period.saturating_add(offset);
                    state
                        .receivables
                        .entry(due_at_period)
                        .or_default()
                        .push(Receivable {
                            due_at_period,
                            amount: config.installment_amount,
                            unit_id,
                        });
                }
            }

            state.total_units_sold += 1;
        }

        entries
    }

    fn stock_initial_units(&self, state: &mut EngineState) {
        let config = self.config;
        if config.initial_units == 0 || config.cost_per_phone <= 0.0 {
            return;
        }

        let affordable = affordable_units(state.cash, config.cost_per_phone);
        let to_buy = (config.initial_units as u64).min(affordable);
        if to_buy < config.initial_units as u64 {
            debug!(
                "Initial stocking clamped from {} to {} units (cash {:.2})",
                config.initial_units, to_buy, state.cash
            );
        }

        if to_buy > 0 {
            let purchase_cost = to_buy as f64 * config.cost_per_phone;
            state.cash -= purchase_cost;
            state.total_cost += purchase_cost;
            self.sell_units(state, to_buy, 0);
        }
    }

    fn reinvest_amount(&self, cash: f64) -> f64 {
        let config = self.config;
        match config.reinvest_mode {
            // May be negative after fixed costs or withdrawals; no purchase follows.
            ReinvestMode::All => cash,
            ReinvestMode::Fixed => config.fixed_reinvest_amount.min(cash),
            ReinvestMode::Percent => (config.percent_reinvest_rate / 100.0 * cash).floor(),
        }
    }

    fn withdrawal_for(&self, total_units_sold: u64) -> f64 {
        let config = self.config;
        if config.withdrawal_block_size == 0 {
            return 0.0;
        }
        let blocks = total_units_sold / config.withdrawal_block_size as u64;
        blocks as f64 * config.withdrawal_amount_per_block
    }

    fn step(
        &self,
        state: &mut EngineState,
        period: u32,
        previous_profit: Option<f64>,
    ) -> MonthlyResult {
        let config = self.config;

        let collected = state.collect_due(period);
        state.cash += collected;
        state.total_revenue += collected;

        state.cash += config.extra_monthly;
        state.cash -= config.fixed_monthly_costs;

        let withdrawal = self.withdrawal_for(state.total_units_sold);
        state.cash -= withdrawal;
        state.total_withdrawals += withdrawal;

        let reinvest_amount = self.reinvest_amount(state.cash);
        let units_purchased = affordable_units(reinvest_amount, config.cost_per_phone);
        let reinvest_spend = units_purchased as f64 * config.cost_per_phone;

        let mut entry_received = 0.0;
        if units_purchased > 0 {
            state.cash -= reinvest_spend;
            state.total_cost += reinvest_spend;
            entry_received = self.sell_units(state, units_purchased, period);
        }

        let cumulative_profit = state.total_revenue
            - state.total_cost
            - config.fixed_monthly_costs * period as f64
            - state.total_withdrawals;

        let growth_rate = match previous_profit {
            Some(previous) => GrowthRate::between(previous, cumulative_profit),
            None => GrowthRate::NotApplicable,
        };

        debug!(
            "Period {}: collected {:.2}, withdrawal {:.2}, bought {} units, cash {:.2}, profit {:.2}",
            period, collected, withdrawal, units_purchased, state.cash, cumulative_profit
        );

        MonthlyResult {
            period,
            period_end: config.start_date.map(|start| period_end_date(start, period)),
            collected,
            entry_received,
            extra_monthly: config.extra_monthly,
            fixed_costs: config.fixed_monthly_costs,
            withdrawal,
            reinvest_spend,
            units_purchased,
            ending_cash: state.cash,
            cumulative_profit,
            total_units_sold: state.total_units_sold,
            growth_rate,
            units_paid_off: state.units_paid_off(),
            units_being_paid: state.units_being_paid(),
        }
    }

    fn summarize(&self, state: &EngineState) -> SimulationSummary {
        let config = self.config;
        let total_fixed_costs = config.fixed_monthly_costs * config.period_count as f64;
        let total_cost = state.total_cost + total_fixed_costs;
        let average_ticket = if state.total_units_sold > 0 {
            state.total_revenue / state.total_units_sold as f64
        } else {
            0.0
        };

        SimulationSummary {
            total_units_sold: state.total_units_sold,
            total_cost,
            total_purchase_cost: state.total_cost,
            total_fixed_costs,
            total_revenue: state.total_revenue,
            total_withdrawals: state.total_withdrawals,
            final_profit: state.total_revenue - total_cost - state.total_withdrawals,
            average_ticket,
            units_being_paid: state.units_being_paid(),
            units_paid_off: state.units_paid_off(),
            final_cash: state.cash,
            outstanding_receivables: state.outstanding_receivables(),
        }
    }
}

/// Runs the projection. Total over its input: degenerate configs yield
/// degenerate (possibly empty) results rather than errors.
pub fn simulate(config: &SimulationConfig) -> SimulationOutcome {
    ProjectionEngine::new(config).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn financed_config() -> SimulationConfig {
        SimulationConfig {
            initial_capital: 0.0,
            cost_per_phone: 500.0,
            initial_units: 0,
            entry_amount: 50.0,
            installment_count: 3,
            installment_amount: 150.0,
            extra_monthly: 0.0,
            fixed_monthly_costs: 0.0,
            withdrawal_block_size: 0,
            withdrawal_amount_per_block: 0.0,
            reinvest_mode: ReinvestMode::Fixed,
            fixed_reinvest_amount: 0.0,
            percent_reinvest_rate: 0.0,
            period_count: 6,
            start_date: None,
        }
    }

    #[test]
    fn test_sell_units_enqueues_installments_per_unit() {
        let config = financed_config();
        let engine = ProjectionEngine::new(&config);
        let mut state = EngineState::new(0.0);

        let entries = engine.sell_units(&mut state, 2, 4);

        assert_eq!(entries, 100.0);
        assert_eq!(state.cash, 100.0);
        assert_eq!(state.total_revenue, 100.0);
        assert_eq!(state.total_cost, 0.0);
        assert_eq!(state.total_units_sold, 2);
        assert_eq!(state.active_sales.len(), 2);

        let due_periods: Vec<u32> = state.receivables.keys().copied().collect();
        assert_eq!(due_periods, vec![5, 6, 7]);

        for unit_id in [1, 2] {
            let owed: f64 = state
                .receivables
                .values()
                .flatten()
                .filter(|r| r.unit_id == unit_id)
                .map(|r| r.amount)
                .sum();
            assert_eq!(owed, config.financed_amount_per_unit());
        }
    }

    #[test]
    fn test_sell_units_without_financing_leaves_no_active_sale() {
        let mut config = financed_config();
        config.installment_count = 0;
        let engine = ProjectionEngine::new(&config);
        let mut state = EngineState::new(0.0);

        engine.sell_units(&mut state, 3, 1);

        assert!(state.receivables.is_empty());
        assert!(state.active_sales.is_empty());
        assert_eq!(state.units_paid_off(), 3);
    }

    #[test]
    fn test_collect_due_settles_sales_exactly_once() {
        let config = financed_config();
        let engine = ProjectionEngine::new(&config);
        let mut state = EngineState::new(0.0);
        engine.sell_units(&mut state, 1, 0);

        assert_eq!(state.collect_due(1), 150.0);
        assert_eq!(state.collect_due(1), 0.0);
        assert_eq!(state.active_sales[&1].remaining_installments, 2);

        assert_eq!(state.collect_due(2), 150.0);
        assert_eq!(state.collect_due(3), 150.0);
        assert!(state.active_sales.is_empty());
        assert!(state.receivables.is_empty());
    }

    #[test]
    fn test_initial_stocking_clamped_to_cash() {
        let mut config = financed_config();
        config.initial_capital = 1200.0;
        config.initial_units = 10;

        let outcome = simulate(&config);

        assert_eq!(outcome.summary.total_units_sold, 2);
        assert_eq!(outcome.summary.total_purchase_cost, 1000.0);
    }

    #[test]
    fn test_percent_mode_floors_reinvest_amount() {
        let mut config = financed_config();
        config.reinvest_mode = ReinvestMode::Percent;
        config.percent_reinvest_rate = 50.0;
        config.extra_monthly = 2001.0;
        config.entry_amount = 0.0;
        config.installment_count = 0;
        config.period_count = 1;

        let outcome = simulate(&config);
        let first = &outcome.monthly_results[0];

        // floor(0.5 * 2001) = 1000 buys exactly two units
        assert_eq!(first.units_purchased, 2);
        assert_eq!(first.reinvest_spend, 1000.0);
        assert_eq!(first.ending_cash, 1001.0);
    }

    #[test]
    fn test_fixed_mode_caps_at_cash() {
        let mut config = financed_config();
        config.fixed_reinvest_amount = 10_000.0;
        config.extra_monthly = 1200.0;
        config.entry_amount = 0.0;
        config.installment_count = 0;
        config.period_count = 1;

        let outcome = simulate(&config);
        assert_eq!(outcome.monthly_results[0].units_purchased, 2);
        assert_eq!(outcome.monthly_results[0].ending_cash, 200.0);
    }

    #[test]
    fn test_withdrawal_uses_units_sold_before_reinvestment() {
        let mut config = financed_config();
        config.initial_capital = 2000.0;
        config.initial_units = 4;
        config.entry_amount = 0.0;
        config.installment_count = 0;
        config.withdrawal_block_size = 3;
        config.withdrawal_amount_per_block = 25.0;
        config.period_count = 2;

        let outcome = simulate(&config);

        // 4 units sold at stocking: one block of 3 each period
        assert_eq!(outcome.monthly_results[0].withdrawal, 25.0);
        assert_eq!(outcome.monthly_results[1].withdrawal, 25.0);
        assert_eq!(outcome.summary.total_withdrawals, 50.0);
        assert_eq!(outcome.summary.final_cash, -50.0);
    }

    #[test]
    fn test_negative_cash_is_not_corrected_in_all_mode() {
        let mut config = financed_config();
        config.reinvest_mode = ReinvestMode::All;
        config.fixed_monthly_costs = 100.0;
        config.period_count = 3;

        let outcome = simulate(&config);

        for (idx, result) in outcome.monthly_results.iter().enumerate() {
            assert_eq!(result.units_purchased, 0);
            assert_eq!(result.ending_cash, -100.0 * (idx as f64 + 1.0));
        }
        assert_eq!(outcome.summary.total_fixed_costs, 300.0);
        assert_eq!(outcome.summary.final_profit, -300.0);
    }

    #[test]
    fn test_zero_periods_yields_empty_results() {
        let mut config = financed_config();
        config.period_count = 0;
        config.initial_capital = 500.0;
        config.initial_units = 1;

        let outcome = simulate(&config);

        assert!(outcome.monthly_results.is_empty());
        assert_eq!(outcome.summary.total_units_sold, 1);
        assert_eq!(outcome.summary.final_cash, 50.0);
    }

    #[test]
    fn test_period_end_labels_follow_start_date() {
        let mut config = financed_config();
        config.start_date = chrono::NaiveDate::from_ymd_opt(2025, 1, 10);
        config.period_count = 2;

        let outcome = simulate(&config);

        assert_eq!(
            outcome.monthly_results[0].period_end,
            chrono::NaiveDate::from_ymd_opt(2025, 2, 28)
        );
        assert_eq!(
            outcome.monthly_results[1].period_end,
            chrono::NaiveDate::from_ymd_opt(2025, 3, 31)
        );
    }
}
