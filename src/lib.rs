//! # Phone Resale Projection
//!
//! Month-by-month cash flow and profit projection for a business that buys phones,
//! sells them with a down payment plus monthly installments, and reinvests the cash
//! it collects into new stock.
//!
//! ## Core Concepts
//!
//! - **Unit**: one phone sold under the financing plan
//! - **Receivable**: one future installment owed for one unit, collected exactly at its due period
//! - **Reinvestment**: how much of the available cash buys new units each period (`All`, `Fixed`, `Percent`)
//! - **Withdrawal**: cash taken out every period, proportional to completed blocks of units sold
//! - **Period**: one month of the projection; period 0 is the initial stocking
//!
//! The engine is a pure function of [`SimulationConfig`]: no I/O, no randomness, and
//! identical inputs yield identical outputs.
//!
//! ## Example
//!
//! ```rust
//! use phone_resale_projection::*;
//!
//! let config = SimulationConfig {
//!     period_count: 6,
//!     ..SimulationConfig::default()
//! };
//!
//! let outcome = simulate(&config);
//! assert_eq!(outcome.monthly_results.len(), 6);
//!
//! let csv = export_csv_string(&outcome.monthly_results, &ExportOptions::default()).unwrap();
//! assert!(csv.contains("Ending Cash"));
//! ```

pub mod engine;
pub mod error;
pub mod export;
pub mod llm;
pub mod overrides;
pub mod schema;
pub mod utils;
pub mod verification;

pub use engine::{simulate, ActiveSale, EngineState, ProjectionEngine, Receivable};
pub use error::{ProjectionError, Result};
pub use export::{export_csv, export_csv_string, write_csv_file, ExportOptions, EXPORT_HEADERS};
pub use overrides::{extract_overrides, ConfigOverrides};
pub use schema::*;
pub use verification::{verify_outcome, OutcomeVerifier, VerificationReport};

use log::debug;

pub struct ProjectionRunner;

impl ProjectionRunner {
    pub fn run(config: &SimulationConfig) -> SimulationOutcome {
        simulate(config)
    }

    /// Runs the projection and re-checks the accounting identities of the
    /// result within `tolerance`.
    pub fn run_with_verification(
        config: &SimulationConfig,
        tolerance: f64,
    ) -> Result<SimulationOutcome> {
        let outcome = simulate(config);
        let report = verify_outcome(config, &outcome, tolerance)?;

        for warning in &report.warnings {
            debug!("Verification note: {}", warning);
        }
        debug!(
            "Verified {} periods, max cash drift {:.2e}",
            report.periods_checked, report.max_cash_drift
        );

        Ok(outcome)
    }

    /// Applies suggested overrides and runs the adjusted scenario.
    pub fn run_with_overrides(
        config: &SimulationConfig,
        overrides: &ConfigOverrides,
    ) -> (SimulationConfig, SimulationOutcome) {
        let adjusted = overrides.apply(config);
        debug!("Re-running with overrides: {:?}", overrides.changed_fields());
        let outcome = simulate(&adjusted);
        (adjusted, outcome)
    }
}

pub fn simulate_with_verification(
    config: &SimulationConfig,
    tolerance: f64,
) -> Result<SimulationOutcome> {
    ProjectionRunner::run_with_verification(config, tolerance)
}
