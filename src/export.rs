use crate::error::Result;
use crate::schema::MonthlyResult;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub const EXPORT_HEADERS: [&str; 15] = [
    "Period",
    "Period End",
    "Collected",
    "Entries",
    "Extra",
    "Fixed Costs",
    "Withdrawal",
    "Reinvested",
    "Units Purchased",
    "Ending Cash",
    "Cumulative Profit",
    "Growth (%)",
    "Total Units Sold",
    "Units Paid Off",
    "Units Being Paid",
];

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub delimiter: u8,
    /// Prefix the output with a UTF-8 byte order mark so spreadsheet
    /// applications pick the right encoding.
    pub include_bom: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            delimiter: b';',
            include_bom: true,
        }
    }
}

fn money(value: f64) -> String {
    format!("{:.2}", value)
}

fn row(result: &MonthlyResult) -> Vec<String> {
    vec![
        result.period.to_string(),
        result
            .period_end
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        money(result.collected),
        money(result.entry_received),
        money(result.extra_monthly),
        money(result.fixed_costs),
        money(result.withdrawal),
        money(result.reinvest_spend),
        result.units_purchased.to_string(),
        money(result.ending_cash),
        money(result.cumulative_profit),
        result.growth_rate.bare(),
        result.total_units_sold.to_string(),
        result.units_paid_off.to_string(),
        result.units_being_paid.to_string(),
    ]
}

pub fn export_csv<W: Write>(
    results: &[MonthlyResult],
    mut writer: W,
    options: &ExportOptions,
) -> Result<()> {
    if options.include_bom {
        writer.write_all(UTF8_BOM)?;
    }

    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .from_writer(writer);

    csv_writer.write_record(EXPORT_HEADERS)?;
    for result in results {
        csv_writer.write_record(row(result))?;
    }
    csv_writer.flush()?;

    Ok(())
}

pub fn export_csv_string(results: &[MonthlyResult], options: &ExportOptions) -> Result<String> {
    let mut buffer = Vec::new();
    export_csv(results, &mut buffer, options)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub fn write_csv_file(
    results: &[MonthlyResult],
    path: impl AsRef<Path>,
    options: &ExportOptions,
) -> Result<()> {
    let file = File::create(path)?;
    export_csv(results, BufWriter::new(file), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::GrowthRate;

    fn sample(period: u32, growth_rate: GrowthRate) -> MonthlyResult {
        MonthlyResult {
            period,
            period_end: None,
            collected: 400.0,
            entry_received: 300.0,
            extra_monthly: 1600.0,
            fixed_costs: 0.0,
            withdrawal: 0.0,
            reinvest_spend: 1800.0,
            units_purchased: 3,
            ending_cash: 700.5,
            cumulative_profit: -2500.0,
            total_units_sold: 5,
            growth_rate,
            units_paid_off: 0,
            units_being_paid: 5,
        }
    }

    #[test]
    fn test_export_formats_money_and_growth() {
        let results = vec![
            sample(1, GrowthRate::NotApplicable),
            sample(2, GrowthRate::Percent(12.5)),
        ];
        let csv = export_csv_string(&results, &ExportOptions::default()).unwrap();

        assert!(csv.starts_with('\u{FEFF}'));
        let lines: Vec<&str> = csv.trim_start_matches('\u{FEFF}').lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Period;Period End;Collected"));
        assert_eq!(
            lines[1],
            "1;;400.00;300.00;1600.00;0.00;0.00;1800.00;3;700.50;-2500.00;N/A;5;0;5"
        );
        assert!(lines[2].contains(";12.50;"));
        assert!(!lines[2].contains("12.50%"));
    }

    #[test]
    fn test_export_without_bom_uses_custom_delimiter() {
        let options = ExportOptions {
            delimiter: b',',
            include_bom: false,
        };
        let csv = export_csv_string(&[sample(1, GrowthRate::Percent(-4.0))], &options).unwrap();

        assert!(csv.starts_with("Period,"));
        assert!(csv.contains(",-4.00,"));
    }
}
