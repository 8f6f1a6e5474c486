//! Monthly Aggregation / Pivot Engine.
//!
//! Every figure in a table (group cells, row totals, the footer rows) goes
//! through [`aggregate`], so the sum-or-mean rule of a KPI type is applied
//! the same way everywhere. Cells are `Option<f64>`: `None` is "no data" and
//! is never folded in as zero.

use crate::config::DashboardConfig;
use crate::error::{KpiError, Result};
use crate::schema::{Aggregation, Client, CostCenter, KpiEntry, KpiType, MonthQuery, RecordStatus};
use crate::store::{EntryQuery, KpiStore, RecordQuery};
use crate::utils::{format_integer_pt_br, format_percent, YearMonth};
use chrono::{Datelike, NaiveDate};
use log::{debug, info};
use schemars::JsonSchema;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

pub const UNASSIGNED_LABEL: &str = "Sem centro de custo";
pub const TOTAL_LABEL: &str = "Total/Média";
pub const DAILY_TARGET_LABEL: &str = "Meta diária";
pub const PRIOR_MONTH_LABEL: &str = "Mês anterior";

/// Folds values with the rule of a KPI type. Returns `None` when there is nothing to fold.
pub fn aggregate<I>(aggregation: Aggregation, values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut count = 0usize;
    let mut sum = 0.0;
    for value in values {
        count += 1;
        sum += value;
    }

    if count == 0 {
        return None;
    }
    match aggregation {
        Aggregation::Sum => Some(sum),
        Aggregation::Mean => Some(sum / count as f64),
    }
}

/// Values of one month keyed by (KPI type, client, day of month).
#[derive(Debug, Clone)]
pub struct CellGrid {
    month: YearMonth,
    cells: BTreeMap<(KpiType, Uuid, u32), f64>,
}

impl CellGrid {
    /// Entries dated outside `month` are ignored.
    pub fn build(month: YearMonth, entries: &[KpiEntry]) -> Self {
        let cells = entries
            .iter()
            .filter(|entry| month.contains(entry.date))
            .map(|entry| ((entry.kpi_type, entry.client_id, entry.date.day()), entry.kpi_value))
            .collect();
        Self { month, cells }
    }

    pub fn get(&self, kpi_type: KpiType, client_id: Uuid, day: u32) -> Option<f64> {
        self.cells.get(&(kpi_type, client_id, day)).copied()
    }

    pub fn client_ids(&self) -> BTreeSet<Uuid> {
        self.cells.keys().map(|(_, client_id, _)| *client_id).collect()
    }

    /// One aggregated cell per day of the grid's month for a set of clients.
    pub fn row_cells(&self, kpi_type: KpiType, members: &[Uuid]) -> Vec<Option<f64>> {
        (1..=self.month.days())
            .map(|day| {
                aggregate(
                    kpi_type.aggregation(),
                    members
                        .iter()
                        .filter_map(|client_id| self.get(kpi_type, *client_id, day)),
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum RowKind {
    CostCenter(Uuid),
    Unassigned,
    KeyAccount(Uuid),
    Total,
    DailyTarget,
    PriorMonth,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PivotRow {
    pub label: String,
    pub kind: RowKind,
    /// One cell per day of the month, `None` when no value contributed.
    pub cells: Vec<Option<f64>>,
    pub total: Option<f64>,
}

impl PivotRow {
    /// A row whose total folds its own day cells.
    fn folded(label: &str, kind: RowKind, aggregation: Aggregation, cells: Vec<Option<f64>>) -> Self {
        let total = aggregate(aggregation, cells.iter().flatten().copied());
        Self {
            label: label.to_string(),
            kind,
            cells,
            total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PivotTable {
    pub kpi_type: KpiType,
    pub rows: Vec<PivotRow>,
    pub total_row: PivotRow,
    pub budget_row: PivotRow,
    pub prior_month_row: PivotRow,
}

impl PivotTable {
    /// Display strings, header first, then group rows and the three footers.
    pub fn render(&self, config: &DashboardConfig) -> Vec<Vec<String>> {
        let format = |value: Option<f64>| match value {
            None => config.no_data_marker.clone(),
            Some(v) if self.kpi_type.is_currency() => format_integer_pt_br(v),
            Some(v) => format_percent(v),
        };

        let days = self.total_row.cells.len();
        let mut header = Vec::with_capacity(days + 2);
        header.push("Cliente".to_string());
        header.extend((1..=days).map(|day| day.to_string()));
        header.push("Total".to_string());

        let mut lines = vec![header];
        for row in self
            .rows
            .iter()
            .chain([&self.total_row, &self.budget_row, &self.prior_month_row])
        {
            let mut line = Vec::with_capacity(days + 2);
            line.push(row.label.clone());
            line.extend(row.cells.iter().map(|cell| format(*cell)));
            line.push(format(row.total));
            lines.push(line);
        }
        lines
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPivot {
    #[schemars(with = "String")]
    pub month: YearMonth,
    pub days_in_month: u32,
    /// Raw entries of the month behind the tables.
    pub entries: Vec<KpiEntry>,
    pub tables: Vec<PivotTable>,
}

impl MonthlyPivot {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn table(&self, kpi_type: KpiType) -> Option<&PivotTable> {
        self.tables.iter().find(|table| table.kpi_type == kpi_type)
    }
}

#[derive(Debug, Clone)]
struct RowGroup {
    label: String,
    kind: RowKind,
    members: Vec<Uuid>,
}

/// Cost-center rows by name, then the unassigned row, then one row per key account.
fn group_rows(clients: &[&Client], cost_centers: &[CostCenter]) -> Vec<RowGroup> {
    let names: BTreeMap<Uuid, &str> = cost_centers
        .iter()
        .map(|cc| (cc.id, cc.name.as_str()))
        .collect();

    let mut by_cost_center: BTreeMap<(&str, Uuid), Vec<Uuid>> = BTreeMap::new();
    let mut unassigned = Vec::new();
    let mut key_accounts: Vec<&Client> = Vec::new();

    for client in clients {
        if client.is_key_account {
            key_accounts.push(*client);
            continue;
        }
        match client
            .cost_center_id
            .and_then(|id| names.get(&id).map(|name| (*name, id)))
        {
            Some(key) => by_cost_center.entry(key).or_default().push(client.id),
            None => unassigned.push(client.id),
        }
    }

    let mut groups: Vec<RowGroup> = by_cost_center
        .into_iter()
        .map(|((name, id), members)| RowGroup {
            label: name.to_string(),
            kind: RowKind::CostCenter(id),
            members,
        })
        .collect();

    if !unassigned.is_empty() {
        groups.push(RowGroup {
            label: UNASSIGNED_LABEL.to_string(),
            kind: RowKind::Unassigned,
            members: unassigned,
        });
    }

    key_accounts.sort_by(|a, b| a.name.cmp(&b.name));
    groups.extend(key_accounts.into_iter().map(|client| RowGroup {
        label: client.name.clone(),
        kind: RowKind::KeyAccount(client.id),
        members: vec![client.id],
    }));

    groups
}

fn budget_row(kpi_type: KpiType, members: &[&Client], days: u32) -> PivotRow {
    let aggregation = kpi_type.aggregation();
    let target = aggregate(
        aggregation,
        members.iter().filter_map(|client| client.budget.target(kpi_type)),
    );

    // Revenue budgets are monthly amounts spread flat over the days; percentage
    // targets repeat as they are.
    let daily = match aggregation {
        Aggregation::Sum => target.map(|monthly| monthly / f64::from(days)),
        Aggregation::Mean => target,
    };

    PivotRow {
        label: DAILY_TARGET_LABEL.to_string(),
        kind: RowKind::DailyTarget,
        cells: vec![daily; days as usize],
        total: target,
    }
}

/// Prior-month figures aligned on day of month. Days the prior month lacks,
/// and days after `cutoff`, stay empty. The total covers the whole prior month
/// up to `cutoff`, including days past the end of the requested month.
fn prior_month_row(
    kpi_type: KpiType,
    prior: &CellGrid,
    members: &[Uuid],
    days: u32,
    cutoff: Option<u32>,
) -> PivotRow {
    let last_day = cutoff.unwrap_or(u32::MAX);
    let prior_cells: Vec<Option<f64>> = prior
        .row_cells(kpi_type, members)
        .into_iter()
        .take(last_day as usize)
        .collect();

    let cells = (1..=days)
        .map(|day| prior_cells.get(day as usize - 1).copied().flatten())
        .collect();
    let total = aggregate(kpi_type.aggregation(), prior_cells.iter().flatten().copied());

    PivotRow {
        label: PRIOR_MONTH_LABEL.to_string(),
        kind: RowKind::PriorMonth,
        cells,
        total,
    }
}

fn build_table(
    kpi_type: KpiType,
    grid: &CellGrid,
    prior: &CellGrid,
    groups: &[RowGroup],
    members: &[&Client],
    days: u32,
    cutoff: Option<u32>,
) -> PivotTable {
    let aggregation = kpi_type.aggregation();

    let rows: Vec<PivotRow> = groups
        .iter()
        .map(|group| {
            PivotRow::folded(
                &group.label,
                group.kind.clone(),
                aggregation,
                grid.row_cells(kpi_type, &group.members),
            )
        })
        .collect();

    let footer_cells = (0..days as usize)
        .map(|idx| aggregate(aggregation, rows.iter().filter_map(|row| row.cells[idx])))
        .collect();
    let total_row = PivotRow::folded(TOTAL_LABEL, RowKind::Total, aggregation, footer_cells);

    let member_ids: Vec<Uuid> = members.iter().map(|client| client.id).collect();

    PivotTable {
        kpi_type,
        total_row,
        budget_row: budget_row(kpi_type, members, days),
        prior_month_row: prior_month_row(kpi_type, prior, &member_ids, days, cutoff),
        rows,
    }
}

/// Builds the five KPI tables of a month.
///
/// Rows cover ACTIVE clients plus any client with entries in the month
/// (INACTIVE clients without entries only when configured). When `month` is
/// the month of `today`, the prior-month row stops at today's day of month.
pub fn build_monthly_pivot<S: KpiStore + ?Sized>(
    store: &S,
    config: &DashboardConfig,
    input: &MonthQuery,
    today: NaiveDate,
) -> Result<MonthlyPivot> {
    let month = YearMonth::parse(&input.month)?;
    let prior_month = month.previous();
    let days = month.days();

    let clients = match input.client_id {
        Some(id) => vec![store
            .client(id)
            .map_err(KpiError::storage("load client"))?
            .ok_or_else(|| KpiError::ClientNotFound(id.to_string()))?],
        None => store
            .clients(&RecordQuery::all())
            .map_err(KpiError::storage("load clients"))?,
    };
    let cost_centers = store
        .cost_centers(&RecordQuery::all())
        .map_err(KpiError::storage("load cost centers"))?;

    let mut query = EntryQuery::between(month.first_day(), month.last_day());
    if let Some(id) = input.client_id {
        query = query.for_clients(vec![id]);
    }
    let entries = store
        .entries(&query)
        .map_err(KpiError::storage("load KPI data"))?;
    let grid = CellGrid::build(month, &entries);

    let with_entries = grid.client_ids();
    let members: Vec<&Client> = clients
        .iter()
        .filter(|client| {
            input.client_id.is_some()
                || client.status == RecordStatus::Active
                || config.pivot_include_inactive_clients
                || with_entries.contains(&client.id)
        })
        .collect();
    let member_ids: Vec<Uuid> = members.iter().map(|client| client.id).collect();

    let prior_entries = store
        .entries(
            &EntryQuery::between(prior_month.first_day(), prior_month.last_day())
                .for_clients(member_ids),
        )
        .map_err(KpiError::storage("load KPI data"))?;
    let prior = CellGrid::build(prior_month, &prior_entries);

    let cutoff = (YearMonth::from_date(today) == month).then(|| today.day());
    let groups = group_rows(&members, &cost_centers);
    debug!(
        "Pivot {}: {} entries, {} prior entries, {} rows, prior cutoff {:?}",
        month,
        entries.len(),
        prior_entries.len(),
        groups.len(),
        cutoff
    );

    let tables = KpiType::ALL
        .into_iter()
        .map(|kpi_type| build_table(kpi_type, &grid, &prior, &groups, &members, days, cutoff))
        .collect();

    info!(
        "Built monthly pivot for {} with {} entries across {} clients",
        month,
        entries.len(),
        members.len()
    );

    Ok(MonthlyPivot {
        month,
        days_in_month: days,
        entries,
        tables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{create_client, create_cost_center};
    use crate::schema::{BudgetTargets, CreateClient, CreateCostCenter, CreateEntry};
    use crate::store::MemoryStore;
    use crate::ErrorCode;

    struct Fixture {
        store: MemoryStore,
        config: DashboardConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: MemoryStore::new(),
                config: DashboardConfig::default(),
            }
        }

        fn cost_center(&mut self, name: &str) -> Uuid {
            create_cost_center(
                &mut self.store,
                &self.config,
                &CreateCostCenter {
                    name: name.to_string(),
                    status: RecordStatus::Active,
                },
            )
            .unwrap()
            .id
        }

        fn client(&mut self, name: &str, cost_center: Option<Uuid>, key_account: bool) -> Uuid {
            let mut input = CreateClient::named(name);
            input.cost_center_id = cost_center;
            input.is_key_account = key_account;
            create_client(&mut self.store, &self.config, &input).unwrap().id
        }

        fn client_with_budget(&mut self, name: &str, budget: BudgetTargets) -> Uuid {
            let mut input = CreateClient::named(name);
            input.budget = budget;
            create_client(&mut self.store, &self.config, &input).unwrap().id
        }

        fn entry(&mut self, client: Uuid, date: &str, kpi_type: KpiType, value: f64) {
            crate::entries::create_entry(
                &mut self.store,
                &self.config,
                &CreateEntry {
                    date: date.to_string(),
                    client_id: client,
                    kpi_type,
                    kpi_value: value,
                },
            )
            .unwrap();
        }

        fn pivot(&self, month: &str, today: NaiveDate) -> MonthlyPivot {
            build_monthly_pivot(
                &self.store,
                &self.config,
                &MonthQuery {
                    month: month.to_string(),
                    client_id: None,
                },
                today,
            )
            .unwrap()
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_aggregate_rules() {
        assert_eq!(aggregate(Aggregation::Sum, [1.0, 2.0, 3.0]), Some(6.0));
        assert_eq!(aggregate(Aggregation::Mean, [80.0, 90.0]), Some(85.0));
        assert_eq!(aggregate(Aggregation::Sum, []), None);
        assert_eq!(aggregate(Aggregation::Mean, [0.0]), Some(0.0));
    }

    #[test]
    fn test_rows_follow_groups() {
        let mut fx = Fixture::new();
        let north = fx.cost_center("North");
        fx.cost_center("Empty");
        let a = fx.client("Acme", Some(north), false);
        let b = fx.client("Bravo", Some(north), false);
        let c = fx.client("Charlie", None, false);
        let k = fx.client("Kilo", Some(north), true);

        fx.entry(a, "2025-01-08", KpiType::Revenue, 100.0);
        fx.entry(b, "2025-01-08", KpiType::Revenue, 50.0);
        fx.entry(c, "2025-01-08", KpiType::Revenue, 10.0);
        fx.entry(k, "2025-01-09", KpiType::Revenue, 1000.0);

        let pivot = fx.pivot("2025-01", day(2025, 3, 1));
        let revenue = pivot.table(KpiType::Revenue).unwrap();

        let labels: Vec<&str> = revenue.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["North", UNASSIGNED_LABEL, "Kilo"]);
        assert_eq!(revenue.rows[0].cells[7], Some(150.0));
        assert_eq!(revenue.rows[0].cells[8], None);
        assert_eq!(revenue.rows[2].kind, RowKind::KeyAccount(k));
        assert_eq!(revenue.total_row.cells[7], Some(160.0));
        assert_eq!(revenue.total_row.total, Some(1160.0));
    }

    #[test]
    fn test_revenue_row_total_is_sum_of_cells() {
        let mut fx = Fixture::new();
        let a = fx.client("Acme", None, false);
        for (d, value) in [(1, 1234.56), (15, 99.9), (31, 0.0)] {
            fx.entry(a, &format!("2025-01-{:02}", d), KpiType::Revenue, value);
        }

        let pivot = fx.pivot("2025-01", day(2025, 3, 1));
        let revenue = pivot.table(KpiType::Revenue).unwrap();
        for row in revenue.rows.iter().chain([&revenue.total_row]) {
            let sum: f64 = row.cells.iter().flatten().sum();
            assert!((row.total.unwrap() - sum).abs() < 0.01);
        }
        assert_eq!(revenue.rows[0].cells[30], Some(0.0));
    }

    #[test]
    fn test_percentage_mean_skips_missing_cells() {
        let mut fx = Fixture::new();
        let north = fx.cost_center("North");
        let a = fx.client("Acme", Some(north), false);
        let b = fx.client("Bravo", Some(north), false);

        fx.entry(a, "2025-01-02", KpiType::OnTime, 80.0);
        fx.entry(b, "2025-01-02", KpiType::OnTime, 100.0);
        fx.entry(a, "2025-01-03", KpiType::OnTime, 70.0);

        let pivot = fx.pivot("2025-01", day(2025, 3, 1));
        let on_time = pivot.table(KpiType::OnTime).unwrap();
        let row = &on_time.rows[0];
        assert_eq!(row.cells[1], Some(90.0));
        assert_eq!(row.cells[2], Some(70.0));
        assert!((row.total.unwrap() - 80.0).abs() < 0.01);
    }

    #[test]
    fn test_daily_target_row() {
        let mut fx = Fixture::new();
        fx.client_with_budget(
            "Acme",
            BudgetTargets {
                revenue: Some(2000.0),
                on_time: Some(90.0),
                ..Default::default()
            },
        );
        fx.client_with_budget(
            "Bravo",
            BudgetTargets {
                revenue: Some(1100.0),
                on_time: Some(95.0),
                ..Default::default()
            },
        );

        let pivot = fx.pivot("2025-01", day(2025, 3, 1));
        let revenue = &pivot.table(KpiType::Revenue).unwrap().budget_row;
        assert!((revenue.cells[0].unwrap() - 100.0).abs() < 0.01);
        assert!((revenue.cells[30].unwrap() - 100.0).abs() < 0.01);
        assert_eq!(revenue.total, Some(3100.0));

        let on_time = &pivot.table(KpiType::OnTime).unwrap().budget_row;
        assert_eq!(on_time.cells[10], Some(92.5));
        assert_eq!(on_time.total, Some(92.5));

        let third_party = &pivot.table(KpiType::ThirdParty).unwrap().budget_row;
        assert_eq!(third_party.total, None);
    }

    #[test]
    fn test_prior_month_truncates_in_current_month() {
        let mut fx = Fixture::new();
        let a = fx.client("Acme", None, false);
        fx.entry(a, "2025-02-05", KpiType::Revenue, 10.0);
        fx.entry(a, "2025-02-20", KpiType::Revenue, 20.0);
        fx.entry(a, "2025-03-01", KpiType::Revenue, 5.0);

        let current = fx.pivot("2025-03", day(2025, 3, 10));
        let prior = &current.table(KpiType::Revenue).unwrap().prior_month_row;
        assert_eq!(prior.cells.len(), 31);
        assert_eq!(prior.cells[4], Some(10.0));
        assert_eq!(prior.cells[19], None);
        assert_eq!(prior.total, Some(10.0));

        let past = fx.pivot("2025-03", day(2025, 5, 1));
        let prior = &past.table(KpiType::Revenue).unwrap().prior_month_row;
        assert_eq!(prior.cells[19], Some(20.0));
        assert_eq!(prior.cells[28], None);
        assert_eq!(prior.total, Some(30.0));
    }

    #[test]
    fn test_prior_month_total_keeps_days_beyond_shorter_month() {
        let mut fx = Fixture::new();
        let a = fx.client("Acme", None, false);
        fx.entry(a, "2025-01-10", KpiType::Revenue, 100.0);
        fx.entry(a, "2025-01-30", KpiType::Revenue, 500.0);
        fx.entry(a, "2025-01-31", KpiType::Revenue, 700.0);
        fx.entry(a, "2025-01-10", KpiType::OnTime, 80.0);
        fx.entry(a, "2025-01-31", KpiType::OnTime, 100.0);

        let pivot = fx.pivot("2025-02", day(2025, 6, 1));
        let revenue = &pivot.table(KpiType::Revenue).unwrap().prior_month_row;
        assert_eq!(revenue.cells.len(), 28);
        assert_eq!(revenue.cells[9], Some(100.0));
        assert_eq!(revenue.total, Some(1300.0));

        let on_time = &pivot.table(KpiType::OnTime).unwrap().prior_month_row;
        assert!((on_time.total.unwrap() - 90.0).abs() < 0.01);

        // In the current month the comparison still stops at today's day.
        let current = fx.pivot("2025-02", day(2025, 2, 15));
        let revenue = &current.table(KpiType::Revenue).unwrap().prior_month_row;
        assert_eq!(revenue.total, Some(100.0));
    }

    #[test]
    fn test_empty_month_renders_markers() {
        let mut fx = Fixture::new();
        fx.client("Acme", None, false);

        let pivot = fx.pivot("2025-02", day(2025, 6, 1));
        assert!(pivot.is_empty());
        assert_eq!(pivot.days_in_month, 28);

        let table = pivot.table(KpiType::Revenue).unwrap();
        assert!(table.rows[0].cells.iter().all(Option::is_none));

        let lines = table.render(&fx.config);
        assert_eq!(lines[0].len(), 30);
        assert!(lines[1][1..].iter().all(|cell| cell == "-"));
    }

    #[test]
    fn test_render_formats_values() {
        let mut fx = Fixture::new();
        let a = fx.client("Acme", None, false);
        fx.entry(a, "2025-01-01", KpiType::Revenue, 1234567.6);
        fx.entry(a, "2025-01-01", KpiType::Occupancy, 85.5);

        let pivot = fx.pivot("2025-01", day(2025, 3, 1));
        let revenue = pivot.table(KpiType::Revenue).unwrap().render(&fx.config);
        assert_eq!(revenue[0][0], "Cliente");
        assert_eq!(revenue[1][0], UNASSIGNED_LABEL);
        assert_eq!(revenue[1][1], "1.234.568");
        assert_eq!(revenue[1][2], "-");

        let occupancy = pivot.table(KpiType::Occupancy).unwrap().render(&fx.config);
        assert_eq!(occupancy[1][1], "86%");
    }

    #[test]
    fn test_inactive_clients_need_entries_or_config() {
        let mut fx = Fixture::new();
        let mut input = CreateClient::named("Dormant");
        input.status = RecordStatus::Inactive;
        create_client(&mut fx.store, &fx.config, &input).unwrap();

        let pivot = fx.pivot("2025-01", day(2025, 3, 1));
        assert!(pivot.table(KpiType::Revenue).unwrap().rows.is_empty());

        fx.config.pivot_include_inactive_clients = true;
        let pivot = fx.pivot("2025-01", day(2025, 3, 1));
        assert_eq!(pivot.table(KpiType::Revenue).unwrap().rows.len(), 1);
    }

    #[test]
    fn test_client_filter() {
        let mut fx = Fixture::new();
        let a = fx.client("Acme", None, false);
        let b = fx.client("Bravo", None, false);
        fx.entry(a, "2025-01-01", KpiType::Revenue, 1.0);
        fx.entry(b, "2025-01-01", KpiType::Revenue, 2.0);

        let only_b = build_monthly_pivot(
            &fx.store,
            &fx.config,
            &MonthQuery {
                month: "2025-01".to_string(),
                client_id: Some(b),
            },
            day(2025, 3, 1),
        )
        .unwrap();
        assert_eq!(only_b.entries.len(), 1);
        assert_eq!(only_b.table(KpiType::Revenue).unwrap().total_row.total, Some(2.0));

        let missing = build_monthly_pivot(
            &fx.store,
            &fx.config,
            &MonthQuery {
                month: "2025-01".to_string(),
                client_id: Some(Uuid::new_v4()),
            },
            day(2025, 3, 1),
        );
        assert_eq!(missing.unwrap_err().code(), ErrorCode::NotFound);
    }
}
