use crate::error::{KpiError, Result};
use chrono::{Datelike, Days, NaiveDate};
use serde::{Serialize, Serializer};
use std::fmt;

pub fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// A calendar month, anchored on its first day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    first: NaiveDate,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|first| Self { first })
            .ok_or_else(|| KpiError::DateError(format!("Invalid month {}-{:02}", year, month)))
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            first: date - Days::new(u64::from(date.day0())),
        }
    }

    /// Parses a strict "YYYY-MM" string.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || {
            KpiError::validation("month", format!("Month must be in YYYY-MM format, got '{}'", value))
        };

        let (year_str, month_str) = value.split_once('-').ok_or_else(invalid)?;
        if year_str.len() != 4
            || month_str.len() != 2
            || !year_str.bytes().all(|b| b.is_ascii_digit())
            || !month_str.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let year: i32 = year_str.parse().map_err(|_| invalid())?;
        let month: u32 = month_str.parse().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }

    pub fn year(&self) -> i32 {
        self.first.year()
    }

    pub fn month(&self) -> u32 {
        self.first.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first
    }

    pub fn days(&self) -> u32 {
        days_in_month(self.year(), self.month())
    }

    pub fn last_day(&self) -> NaiveDate {
        self.first + Days::new(u64::from(self.days() - 1))
    }

    /// The date of day `day` (1-based), if the month has that many days.
    pub fn day(&self, day: u32) -> Option<NaiveDate> {
        if day == 0 || day > self.days() {
            return None;
        }
        Some(self.first + Days::new(u64::from(day - 1)))
    }

    pub fn previous(&self) -> Self {
        Self::from_date(self.first - Days::new(1))
    }

    pub fn next(&self) -> Self {
        Self {
            first: self.last_day() + Days::new(1),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first && date <= self.last_day()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parses "YYYY-MM-DD" without requiring the day to exist in the month.
///
/// Returns the month and the requested day so callers can clamp it,
/// e.g. "2025-06-31" yields (2025-06, 31).
pub fn parse_lenient_date(value: &str) -> Result<(YearMonth, u32)> {
    let invalid = || {
        KpiError::validation("date", format!("Date must be in YYYY-MM-DD format, got '{}'", value))
    };

    let mut parts = value.splitn(3, '-');
    let (Some(year), Some(month), Some(day)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    if year.len() != 4 || month.len() != 2 || day.len() != 2 {
        return Err(invalid());
    }

    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let day: u32 = day.parse().map_err(|_| invalid())?;
    if day == 0 {
        return Err(invalid());
    }

    let year_month = YearMonth::new(year, month).map_err(|_| invalid())?;
    Ok((year_month, day))
}

fn group_thousands(digits: &str, separator: char) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(separator);
        }
        grouped.push(ch);
    }
    grouped
}

/// Whole number with pt-BR grouping: 1234567.6 -> "1.234.568".
pub fn format_integer_pt_br(value: f64) -> String {
    let rounded = value.round();
    let sign = if rounded < 0.0 { "-" } else { "" };
    let digits = format!("{:.0}", rounded.abs());
    format!("{}{}", sign, group_thousands(&digits, '.'))
}

/// BRL currency with two decimals: 1234.5 -> "R$ 1.234,50".
pub fn format_brl(value: f64) -> String {
    let cents = (value.abs() * 100.0).round();
    let sign = if value < 0.0 && cents > 0.0 { "-" } else { "" };
    let whole = format!("{:.0}", (cents / 100.0).trunc());
    let fraction = (cents % 100.0) as u32;
    format!(
        "{}R$ {},{:02}",
        sign,
        group_thousands(&whole, '.'),
        fraction
    )
}

/// Percentage rounded to the nearest whole number: 85.5 -> "86%".
pub fn format_percent(value: f64) -> String {
    format!("{:.0}%", value.round())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2100, 2), 28);
        assert_eq!(days_in_month(2025, 6), 30);
        assert_eq!(days_in_month(2025, 12), 31);
    }

    #[test]
    fn test_year_month_bounds() {
        let feb = YearMonth::parse("2024-02").unwrap();
        assert_eq!(feb.first_day(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(feb.day(30), None);
        assert!(feb.contains(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
        assert!(!feb.contains(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));
    }

    #[test]
    fn test_previous_and_next_cross_year() {
        let jan = YearMonth::new(2025, 1).unwrap();
        assert_eq!(jan.previous(), YearMonth::new(2024, 12).unwrap());
        assert_eq!(jan.previous().next(), jan);
        assert_eq!(jan.to_string(), "2025-01");
    }

    #[test]
    fn test_parse_month_rejects_bad_input() {
        assert!(YearMonth::parse("2025-13").is_err());
        assert!(YearMonth::parse("2025-1").is_err());
        assert!(YearMonth::parse("25-01").is_err());
        assert!(YearMonth::parse("2025/01").is_err());
    }

    #[test]
    fn test_lenient_date_keeps_overflowing_day() {
        let (month, day) = parse_lenient_date("2025-06-31").unwrap();
        assert_eq!(month, YearMonth::new(2025, 6).unwrap());
        assert_eq!(day, 31);
        assert!(parse_lenient_date("2025-06-00").is_err());
        assert!(parse_lenient_date("2025-06").is_err());
        assert!(parse_lenient_date("08/01/2025").is_err());
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_integer_pt_br(1_234_567.6), "1.234.568");
        assert_eq!(format_integer_pt_br(999.4), "999");
        assert_eq!(format_integer_pt_br(-1500.0), "-1.500");
        assert_eq!(format_brl(1234.5), "R$ 1.234,50");
        assert_eq!(format_brl(0.0), "R$ 0,00");
        assert_eq!(format_percent(85.5), "86%");
        assert_eq!(format_percent(92.2), "92%");
    }
}
