use anyhow::Context;
use phone_resale_projection::*;

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            println!("📄 Loading scenario from {}", path);
            SimulationConfig::from_json_file(&path)
                .with_context(|| format!("failed to load scenario {}", path))?
        }
        None => {
            println!("📄 No scenario given, using the reference scenario.");
            SimulationConfig::default()
        }
    };

    let outcome = simulate_with_verification(&config, 0.01)
        .context("projection failed verification")?;

    println!("\n📊 Month-by-month projection");
    println!("═══════════════════════════════════════════════════════════════════════════════");
    println!(
        "{:>6} {:>12} {:>10} {:>10} {:>12} {:>6} {:>12} {:>14} {:>9} {:>7}",
        "Month", "Collected", "Extra", "Withdrawn", "Reinvested", "New", "Cash", "Profit", "Growth", "Units"
    );
    for r in &outcome.monthly_results {
        println!(
            "{:>6} {:>12.2} {:>10.2} {:>10.2} {:>12.2} {:>6} {:>12.2} {:>14.2} {:>9} {:>7}",
            r.period,
            r.collected,
            r.extra_monthly,
            r.withdrawal,
            r.reinvest_spend,
            r.units_purchased,
            r.ending_cash,
            r.cumulative_profit,
            r.growth_rate.to_string(),
            r.total_units_sold
        );
    }

    let s = &outcome.summary;
    println!("\n📋 Summary");
    println!("   Units sold:              {}", s.total_units_sold);
    println!("   Paid off / being paid:   {} / {}", s.units_paid_off, s.units_being_paid);
    println!("   Total cost:              {:.2}", s.total_cost);
    println!("   Total revenue:           {:.2}", s.total_revenue);
    println!("   Withdrawals:             {:.2}", s.total_withdrawals);
    println!("   Average ticket:          {:.2}", s.average_ticket);
    println!("   Final profit:            {:.2}", s.final_profit);
    println!("   Final cash:              {:.2}", s.final_cash);
    println!("   Still owed by customers: {:.2}", s.outstanding_receivables);

    let output = "projection.csv";
    write_csv_file(&outcome.monthly_results, output, &ExportOptions::default())?;
    println!("\n✅ Exported {} rows to {}", outcome.monthly_results.len(), output);

    Ok(())
}
