//! Entity store abstraction.
//!
//! The engines only need simple filtered reads (equality, date range, "in"
//! lists, ordering) and batch writes. Two backends ship with the crate: an
//! in-memory store used by tests and demos, and a SQLite store behind the
//! `sqlite` feature.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{MemoryStore, WriteOp};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::schema::{Client, CostCenter, KpiEntry, KpiType, NewKpiEntry, RecordStatus};
use chrono::NaiveDate;
use uuid::Uuid;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Filter for KPI entry reads. Every populated field must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryQuery {
    pub ids: Option<Vec<Uuid>>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub client_ids: Option<Vec<Uuid>>,
    pub kpi_type: Option<KpiType>,
}

impl EntryQuery {
    pub fn on(date: NaiveDate) -> Self {
        Self::between(date, date)
    }

    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            date_from: Some(from),
            date_to: Some(to),
            ..Default::default()
        }
    }

    pub fn by_ids(ids: Vec<Uuid>) -> Self {
        Self {
            ids: Some(ids),
            ..Default::default()
        }
    }

    pub fn for_clients(mut self, client_ids: Vec<Uuid>) -> Self {
        self.client_ids = Some(client_ids);
        self
    }

    pub fn of_type(mut self, kpi_type: KpiType) -> Self {
        self.kpi_type = Some(kpi_type);
        self
    }

    pub fn matches(&self, entry: &KpiEntry) -> bool {
        self.ids.as_ref().map_or(true, |ids| ids.contains(&entry.id))
            && self.date_from.map_or(true, |from| entry.date >= from)
            && self.date_to.map_or(true, |to| entry.date <= to)
            && self
                .client_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&entry.client_id))
            && self.kpi_type.map_or(true, |kind| entry.kpi_type == kind)
    }
}

/// Filter for client and cost-center reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordQuery {
    pub status: Option<RecordStatus>,
    pub search: Option<String>,
    pub ids: Option<Vec<Uuid>>,
    /// Only meaningful for clients.
    pub cost_center_ids: Option<Vec<Uuid>>,
}

impl RecordQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_ids(ids: Vec<Uuid>) -> Self {
        Self {
            ids: Some(ids),
            ..Default::default()
        }
    }

    pub fn in_cost_centers(cost_center_ids: Vec<Uuid>) -> Self {
        Self {
            cost_center_ids: Some(cost_center_ids),
            ..Default::default()
        }
    }

    pub fn matches_name(&self, name: &str) -> bool {
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                name.to_lowercase().contains(&needle.to_lowercase())
            }
            _ => true,
        }
    }

    pub fn matches_client(&self, client: &Client) -> bool {
        self.status.map_or(true, |status| client.status == status)
            && self.ids.as_ref().map_or(true, |ids| ids.contains(&client.id))
            && self.cost_center_ids.as_ref().map_or(true, |ids| {
                client
                    .cost_center_id
                    .map_or(false, |cost_center| ids.contains(&cost_center))
            })
            && self.matches_name(&client.name)
    }

    pub fn matches_cost_center(&self, cost_center: &CostCenter) -> bool {
        self.status.map_or(true, |status| cost_center.status == status)
            && self
                .ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&cost_center.id))
            && self.matches_name(&cost_center.name)
    }
}

/// Sort key shared by every backend: ACTIVE before INACTIVE, then by name.
pub(crate) fn record_order(status: RecordStatus, name: &str) -> (bool, String) {
    (status == RecordStatus::Inactive, name.to_string())
}

/// Row store holding clients, cost centers and KPI entries.
///
/// Record reads are ordered ACTIVE first, then by name. Entry reads are
/// ordered by (date, client id, KPI type). Writes are not transactional
/// across calls.
pub trait KpiStore {
    fn clients(&self, query: &RecordQuery) -> StoreResult<Vec<Client>>;
    fn client(&self, id: Uuid) -> StoreResult<Option<Client>>;
    fn client_by_name(&self, name: &str) -> StoreResult<Option<Client>>;
    fn insert_client(&mut self, client: &Client) -> StoreResult<()>;
    fn update_client(&mut self, client: &Client) -> StoreResult<()>;
    fn delete_client(&mut self, id: Uuid) -> StoreResult<()>;

    fn cost_centers(&self, query: &RecordQuery) -> StoreResult<Vec<CostCenter>>;
    fn cost_center(&self, id: Uuid) -> StoreResult<Option<CostCenter>>;
    fn cost_center_by_name(&self, name: &str) -> StoreResult<Option<CostCenter>>;
    fn insert_cost_center(&mut self, cost_center: &CostCenter) -> StoreResult<()>;
    fn update_cost_center(&mut self, cost_center: &CostCenter) -> StoreResult<()>;
    fn delete_cost_center(&mut self, id: Uuid) -> StoreResult<()>;

    fn entries(&self, query: &EntryQuery) -> StoreResult<Vec<KpiEntry>>;

    fn count_entries(&self, query: &EntryQuery) -> StoreResult<usize> {
        self.entries(query).map(|entries| entries.len())
    }

    /// Inserts new rows, assigning ids and timestamps. Fails on a duplicate
    /// (date, client, type) triple.
    fn insert_entries(&mut self, entries: &[NewKpiEntry]) -> StoreResult<Vec<KpiEntry>>;

    /// Replaces every column of an existing row.
    fn update_entry(&mut self, entry: &KpiEntry) -> StoreResult<()>;

    /// Sets new values on existing rows, returning how many rows changed.
    fn update_entry_values(&mut self, updates: &[(Uuid, f64)]) -> StoreResult<usize>;

    fn delete_entries(&mut self, ids: &[Uuid]) -> StoreResult<usize>;
}
