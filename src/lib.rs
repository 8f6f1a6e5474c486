//! # KPI Dashboard
//!
//! Daily per-client logistics KPIs (revenue, on-time rate, occupancy,
//! third-party usage and availability) with three engines on top of a plain
//! row store:
//!
//! - **Reconciliation**: a daily snapshot replaces one date's values for the
//!   clients it lists, writing only what changed.
//! - **Monthly pivot**: day-by-day tables grouped by cost center, with
//!   totals, daily targets and a prior-month comparison row.
//! - **Dashboard summary**: month-to-date actuals against pro-rated budget
//!   and the same stretch of the previous month.
//!
//! ## Core Concepts
//!
//! - **Currency vs percentage**: REVENUE values add up; every other KPI type
//!   is averaged over the values that exist. Missing values are never zero.
//! - **Full replace**: a KPI field left out of a snapshot is deleted if it was
//!   stored before. A present `0` is a value.
//! - **Key accounts**: shown as their own pivot row instead of folding into
//!   their cost center.
//!
//! ## Example
//!
//! ```rust,ignore
//! use kpi_dashboard::*;
//!
//! let mut store = MemoryStore::new();
//! let config = DashboardConfig::default();
//! let acme = registry::create_client(&mut store, &config, &CreateClient::named("Acme"))?;
//!
//! let saved = upsert_daily_snapshot(
//!     &mut store,
//!     &config,
//!     &UpsertDailySnapshot {
//!         date: "2025-01-08".to_string(),
//!         entries: vec![KpiFormEntry::new(acme.id).with(KpiType::Revenue, 1500.0)],
//!     },
//! )?;
//! assert_eq!(saved.stats.inserted, 1);
//! ```

pub mod api;
pub mod config;
pub mod entries;
pub mod error;
pub mod pivot;
pub mod reconcile;
pub mod registry;
pub mod schema;
pub mod store;
pub mod summary;
pub mod utils;
pub mod validation;

pub use api::{error_envelope, Dashboard, Request};
pub use config::DashboardConfig;
pub use error::{ErrorCode, KpiError, Result, StoreError};
pub use pivot::{
    aggregate, build_monthly_pivot, CellGrid, MonthlyPivot, PivotRow, PivotTable, RowKind,
};
pub use reconcile::{
    flatten_form_entries, plan_reconciliation, project_form, upsert_daily_snapshot,
    ExistingEntries, FormValue, ReconciliationPlan,
};
pub use schema::*;
pub use store::{EntryQuery, KpiStore, MemoryStore, RecordQuery, WriteOp};
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
pub use summary::{compute_dashboard_summary, DashboardSummary, MetricSummary};
pub use utils::*;

/// Opens the SQLite database named by `config.database_path`, or an
/// in-memory one when no path is configured.
#[cfg(feature = "sqlite")]
pub fn open_dashboard(config: DashboardConfig) -> Result<Dashboard<SqliteStore>> {
    config.validate()?;

    let store = match &config.database_path {
        Some(path) => SqliteStore::open(path),
        None => {
            log::info!("No database path configured, using an in-memory database");
            SqliteStore::open_in_memory()
        }
    }
    .map_err(KpiError::storage("open the KPI database"))?;

    Ok(Dashboard::new(store, config))
}
