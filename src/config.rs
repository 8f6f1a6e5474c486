use crate::error::{KpiError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Upper bound accepted for a single REVENUE value.
    pub max_revenue: f64,
    pub max_name_length: usize,
    /// Rendered in pivot cells that have no data, so they never read as zero.
    pub no_data_marker: String,
    /// Include INACTIVE clients without entries when building pivot rows.
    pub pivot_include_inactive_clients: bool,
    pub database_path: Option<PathBuf>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 100,
            max_revenue: 999_999_999.99,
            max_name_length: 100,
            no_data_marker: "-".to_string(),
            pivot_include_inactive_clients: false,
            database_path: None,
        }
    }
}

impl DashboardConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| KpiError::validation("config", format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        log::debug!("Loaded dashboard configuration from {}", path.display());
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_page_size == 0 || self.default_page_size == 0 {
            return Err(KpiError::validation(
                "config",
                "Page sizes must be greater than zero",
            ));
        }

        if self.default_page_size > self.max_page_size {
            return Err(KpiError::validation(
                "config",
                format!(
                    "default_page_size ({}) exceeds max_page_size ({})",
                    self.default_page_size, self.max_page_size
                ),
            ));
        }

        if !self.max_revenue.is_finite() || self.max_revenue <= 0.0 {
            return Err(KpiError::validation(
                "config",
                format!("max_revenue must be positive, got {}", self.max_revenue),
            ));
        }

        if self.max_name_length == 0 {
            return Err(KpiError::validation(
                "config",
                "max_name_length must be greater than zero",
            ));
        }

        if self.no_data_marker.is_empty() {
            return Err(KpiError::validation(
                "config",
                "no_data_marker must not be empty",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DashboardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_page_size, 100);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config =
            DashboardConfig::from_json_str(r#"{"no_data_marker": "n/d", "default_page_size": 20}"#)
                .unwrap();
        assert_eq!(config.no_data_marker, "n/d");
        assert_eq!(config.default_page_size, 20);
        assert_eq!(config.max_page_size, 100);
    }

    #[test]
    fn test_rejects_inconsistent_page_sizes() {
        let result = DashboardConfig::from_json_str(
            r#"{"default_page_size": 200, "max_page_size": 100}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_empty_marker() {
        let result = DashboardConfig::from_json_str(r#"{"no_data_marker": ""}"#);
        assert!(result.is_err());
    }
}
