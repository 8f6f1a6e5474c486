//! Dashboard Summary Engine: month-to-date actuals against pro-rated budget
//! and the same stretch of the previous month.

use crate::error::{KpiError, Result};
use crate::pivot::aggregate;
use crate::schema::{Client, DashboardSummaryQuery, KpiEntry, KpiType};
use crate::store::{EntryQuery, KpiStore, RecordQuery};
use crate::utils::{parse_lenient_date, YearMonth};
use chrono::NaiveDate;
use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricSummary {
    #[serde(rename = "real")]
    pub actual: f64,
    #[serde(rename = "bgt")]
    pub budget: f64,
    #[serde(rename = "pm")]
    pub prior_month: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    #[serde(rename = "receita")]
    pub revenue: MetricSummary,
    pub on_time: MetricSummary,
    #[serde(rename = "ocupacao")]
    pub occupancy: MetricSummary,
    #[serde(rename = "terceiro")]
    pub third_party: MetricSummary,
    #[serde(rename = "disponibilidade")]
    pub availability: MetricSummary,
    pub day_of_month: u32,
    pub days_in_month: u32,
}

impl DashboardSummary {
    pub fn metric(&self, kpi_type: KpiType) -> &MetricSummary {
        match kpi_type {
            KpiType::Revenue => &self.revenue,
            KpiType::OnTime => &self.on_time,
            KpiType::Occupancy => &self.occupancy,
            KpiType::ThirdParty => &self.third_party,
            KpiType::Availability => &self.availability,
        }
    }
}

fn window_end(month: YearMonth, day: u32) -> Result<NaiveDate> {
    month
        .day(day.min(month.days()))
        .ok_or_else(|| KpiError::DateError(format!("Day {} does not exist in {}", day, month)))
}

fn non_empty(ids: &Option<Vec<Uuid>>) -> Option<Vec<Uuid>> {
    ids.clone().filter(|ids| !ids.is_empty())
}

fn fold(kpi_type: KpiType, entries: &[KpiEntry]) -> f64 {
    aggregate(
        kpi_type.aggregation(),
        entries
            .iter()
            .filter(|entry| entry.kpi_type == kpi_type)
            .map(|entry| entry.kpi_value),
    )
    .unwrap_or(0.0)
}

/// Revenue budgets scale with the share of the month elapsed; percentage
/// targets are averaged as they are.
fn budget(kpi_type: KpiType, clients: &[Client], day: u32, days: u32) -> f64 {
    let target = aggregate(
        kpi_type.aggregation(),
        clients.iter().filter_map(|client| client.budget.target(kpi_type)),
    )
    .unwrap_or(0.0);

    if kpi_type.is_currency() {
        target * f64::from(day) / f64::from(days)
    } else {
        target
    }
}

/// Month-to-date figures for the month of `input.date`.
///
/// The day is clamped to the month length, so "2025-06-31" reads as June 30.
/// Client and cost-center filters combine with AND. An empty id list is
/// treated like an absent one.
pub fn compute_dashboard_summary<S: KpiStore + ?Sized>(
    store: &S,
    input: &DashboardSummaryQuery,
) -> Result<DashboardSummary> {
    let (month, requested_day) = parse_lenient_date(&input.date)?;
    let days = month.days();
    let day = requested_day.min(days);

    let prior = month.previous();
    let mtd = EntryQuery::between(month.first_day(), window_end(month, day)?);
    let pmtd = EntryQuery::between(prior.first_day(), window_end(prior, day)?);

    let client_ids = non_empty(&input.client_ids);
    let cost_center_ids = non_empty(&input.cost_center_ids);

    let filtered = client_ids.is_some() || cost_center_ids.is_some();
    let clients = store
        .clients(&RecordQuery {
            ids: client_ids,
            cost_center_ids,
            ..Default::default()
        })
        .map_err(KpiError::storage("load clients"))?;

    let (mtd, pmtd) = if filtered {
        let ids: Vec<_> = clients.iter().map(|client| client.id).collect();
        (mtd.for_clients(ids.clone()), pmtd.for_clients(ids))
    } else {
        (mtd, pmtd)
    };

    let current = store
        .entries(&mtd)
        .map_err(KpiError::storage("load KPI data"))?;
    let previous = store
        .entries(&pmtd)
        .map_err(KpiError::storage("load KPI data"))?;

    let metric = |kpi_type: KpiType| MetricSummary {
        actual: fold(kpi_type, &current),
        budget: budget(kpi_type, &clients, day, days),
        prior_month: fold(kpi_type, &previous),
    };

    info!(
        "Computed dashboard summary for {} day {}/{} over {} clients ({} current, {} prior entries)",
        month,
        day,
        days,
        clients.len(),
        current.len(),
        previous.len()
    );

    Ok(DashboardSummary {
        revenue: metric(KpiType::Revenue),
        on_time: metric(KpiType::OnTime),
        occupancy: metric(KpiType::Occupancy),
        third_party: metric(KpiType::ThirdParty),
        availability: metric(KpiType::Availability),
        day_of_month: day,
        days_in_month: days,
    })
}
