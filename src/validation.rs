//! Guard functions applied to procedure inputs before any store access.

use crate::config::DashboardConfig;
use crate::error::{KpiError, Result};
use crate::schema::KpiType;
use chrono::NaiveDate;

/// Parses a strict "YYYY-MM-DD" date. Impossible dates like 2025-02-30 are rejected.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let well_formed = value.len() == 10
        && value.bytes().enumerate().all(|(idx, b)| match idx {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });

    if !well_formed {
        return Err(KpiError::validation(
            "date",
            "Date must be in YYYY-MM-DD format",
        ));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| KpiError::validation("date", format!("'{}' is not a valid date", value)))
}

/// Checks a value against the range rule of its KPI type.
pub fn validate_kpi_value(kpi_type: KpiType, value: f64, config: &DashboardConfig) -> Result<f64> {
    let invalid = |details: String| KpiError::InvalidValue {
        kpi_type: kpi_type.to_string(),
        value,
        details,
    };

    if !value.is_finite() {
        return Err(invalid(format!("{} must be a valid number", kpi_type.title())));
    }

    if kpi_type.is_currency() {
        if value < 0.0 {
            return Err(invalid("Revenue must not be negative".to_string()));
        }
        if value > config.max_revenue {
            return Err(invalid(format!(
                "Revenue must not exceed {:.2}",
                config.max_revenue
            )));
        }
    } else if !(0.0..=100.0).contains(&value) {
        return Err(invalid(format!(
            "{} must be a percentage between 0 and 100",
            kpi_type.title()
        )));
    }

    Ok(value)
}

/// Trims a client or cost-center name and checks it is non-blank and short enough.
pub fn normalize_name(name: &str, config: &DashboardConfig) -> Result<String> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(KpiError::validation("name", "Name must not be blank"));
    }

    if trimmed.chars().count() > config.max_name_length {
        return Err(KpiError::validation(
            "name",
            format!("Name must be at most {} characters", config.max_name_length),
        ));
    }

    Ok(trimmed.to_string())
}

/// Resolves an optional page size against the configured bounds.
pub fn page_limit(limit: Option<usize>, config: &DashboardConfig) -> Result<usize> {
    let limit = limit.unwrap_or(config.default_page_size);
    if limit == 0 || limit > config.max_page_size {
        return Err(KpiError::validation(
            "limit",
            format!("Page size must be between 1 and {}", config.max_page_size),
        ));
    }
    Ok(limit)
}

pub fn validate_percentage_target(kpi_type: KpiType, target: Option<f64>) -> Result<()> {
    if let Some(value) = target {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(KpiError::validation(
                "budget",
                format!("{} target must be between 0 and 100", kpi_type.title()),
            ));
        }
    }
    Ok(())
}
