use chrono::{Datelike, Days, NaiveDate};

pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.checked_sub_days(Days::new(1)))
        .unwrap_or(NaiveDate::MAX)
}

/// Month-end date that labels `period` for a run anchored at `start`.
/// Period 0 is the start month itself.
pub fn period_end_date(start: NaiveDate, period: u32) -> NaiveDate {
    let months = start.month0() as i64 + period as i64;
    let year = start.year() as i64 + months.div_euclid(12);
    let month = months.rem_euclid(12) as u32 + 1;

    last_day_of_month(year as i32, month)
}

/// `floor(amount / unit_cost)` as a purchasable quantity. Zero or negative
/// costs, and amounts that cannot cover one unit, buy nothing.
pub fn affordable_units(amount: f64, unit_cost: f64) -> u64 {
    if unit_cost <= 0.0 || !amount.is_finite() {
        return 0;
    }
    let units = (amount / unit_cost).floor();
    if units > 0.0 {
        units as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            last_day_of_month(2023, 4),
            NaiveDate::from_ymd_opt(2023, 4, 30).unwrap()
        );
    }

    #[test]
    fn test_period_end_date_crosses_year() {
        let start = NaiveDate::from_ymd_opt(2024, 11, 15).unwrap();
        assert_eq!(
            period_end_date(start, 0),
            NaiveDate::from_ymd_opt(2024, 11, 30).unwrap()
        );
        assert_eq!(
            period_end_date(start, 3),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()
        );
        assert_eq!(
            period_end_date(start, 14),
            NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()
        );
    }

    #[test]
    fn test_affordable_units() {
        assert_eq!(affordable_units(2200.0, 600.0), 3);
        assert_eq!(affordable_units(599.99, 600.0), 0);
        assert_eq!(affordable_units(-1200.0, 600.0), 0);
        assert_eq!(affordable_units(5000.0, 0.0), 0);
    }
}
