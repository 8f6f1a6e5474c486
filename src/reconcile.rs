//! KPI Reconciliation Engine.
//!
//! A daily snapshot is a full replacement of one date's values for the
//! clients it names. The diff is computed by [`plan_reconciliation`], a pure
//! function, and [`upsert_daily_snapshot`] executes the resulting batches
//! against the store.

use crate::config::DashboardConfig;
use crate::error::{KpiError, Result};
use crate::schema::{
    KpiEntry, KpiFormData, KpiFormEntry, KpiType, NewKpiEntry, UpsertDailySnapshot,
    UpsertResponse, UpsertStats,
};
use crate::store::{EntryQuery, KpiStore, RecordQuery};
use crate::validation::{parse_date, validate_kpi_value};
use chrono::NaiveDate;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Persisted rows of one date, keyed by (client, KPI type).
pub type ExistingEntries = BTreeMap<(Uuid, KpiType), KpiEntry>;

/// One value taken from the daily form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormValue {
    pub client_id: Uuid,
    pub kpi_type: KpiType,
    pub value: f64,
}

/// The three disjoint write batches needed to reach the submitted snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationPlan {
    pub to_insert: Vec<FormValue>,
    /// Existing entry id and its new value.
    pub to_update: Vec<(Uuid, f64)>,
    pub to_delete: Vec<Uuid>,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Flattens form rows into (client, type, value) triples, skipping absent fields.
///
/// A present zero is kept: it is a real value, not a missing one.
pub fn flatten_form_entries(entries: &[KpiFormEntry]) -> Vec<FormValue> {
    entries
        .iter()
        .flat_map(|entry| {
            KpiType::ALL.into_iter().filter_map(move |kpi_type| {
                entry.value(kpi_type).map(|value| FormValue {
                    client_id: entry.client_id,
                    kpi_type,
                    value,
                })
            })
        })
        .collect()
}

/// Diffs the submitted values against the persisted rows.
///
/// Unchanged values produce no write, so replaying a snapshot yields an
/// empty plan. Persisted keys missing from `incoming` are deleted.
pub fn plan_reconciliation(existing: &ExistingEntries, incoming: &[FormValue]) -> ReconciliationPlan {
    let mut plan = ReconciliationPlan::default();
    let mut touched = BTreeSet::new();

    for value in incoming {
        let key = (value.client_id, value.kpi_type);
        touched.insert(key);

        match existing.get(&key) {
            Some(current) if current.kpi_value == value.value => {}
            Some(current) => plan.to_update.push((current.id, value.value)),
            None => plan.to_insert.push(*value),
        }
    }

    plan.to_delete = existing
        .iter()
        .filter(|(key, _)| !touched.contains(*key))
        .map(|(_, entry)| entry.id)
        .collect();

    plan
}

/// Groups a date's entries into one form row per client.
pub fn project_form(date: NaiveDate, entries: &[KpiEntry]) -> KpiFormData {
    let mut rows: BTreeMap<Uuid, KpiFormEntry> = BTreeMap::new();
    for entry in entries.iter().filter(|e| e.date == date) {
        rows.entry(entry.client_id)
            .or_insert_with(|| KpiFormEntry::new(entry.client_id))
            .set_value(entry.kpi_type, entry.kpi_value);
    }

    KpiFormData {
        date: date.format("%Y-%m-%d").to_string(),
        entries: rows.into_values().collect(),
    }
}

/// Replaces the stored values of `input.date` for every client in `input.entries`.
///
/// All validation happens before the first write. Writes are applied as
/// deletions, insertions, then updates; a storage failure aborts at once and
/// leaves the batches already applied in place.
pub fn upsert_daily_snapshot<S: KpiStore + ?Sized>(
    store: &mut S,
    config: &DashboardConfig,
    input: &UpsertDailySnapshot,
) -> Result<UpsertResponse> {
    if input.entries.is_empty() {
        warn!("Rejected daily snapshot for {} without entries", input.date);
        return Err(KpiError::BadRequest(
            "At least one client entry is required".to_string(),
        ));
    }

    let mut client_ids = Vec::with_capacity(input.entries.len());
    for entry in &input.entries {
        if client_ids.contains(&entry.client_id) {
            warn!("Rejected daily snapshot listing client {} twice", entry.client_id);
            return Err(KpiError::BadRequest(
                "Each client may appear only once per snapshot".to_string(),
            ));
        }
        client_ids.push(entry.client_id);
    }

    let date = parse_date(&input.date)?;

    let values = flatten_form_entries(&input.entries);
    for value in &values {
        validate_kpi_value(value.kpi_type, value.value, config)?;
    }

    let known: BTreeSet<Uuid> = store
        .clients(&RecordQuery::by_ids(client_ids.clone()))
        .map_err(KpiError::storage("load clients"))?
        .into_iter()
        .map(|client| client.id)
        .collect();
    let missing: Vec<String> = client_ids
        .iter()
        .filter(|id| !known.contains(*id))
        .map(Uuid::to_string)
        .collect();
    if !missing.is_empty() {
        warn!("Rejected daily snapshot for {}: unknown clients {:?}", date, missing);
        return Err(KpiError::ClientsNotFound(missing));
    }

    let scope = EntryQuery::on(date).for_clients(client_ids);
    let existing: ExistingEntries = store
        .entries(&scope)
        .map_err(KpiError::storage("load KPI data"))?
        .into_iter()
        .map(|entry| ((entry.client_id, entry.kpi_type), entry))
        .collect();

    let plan = plan_reconciliation(&existing, &values);
    debug!(
        "Reconciling {} for {} clients: {} existing, {} insert, {} update, {} delete",
        date,
        input.entries.len(),
        existing.len(),
        plan.to_insert.len(),
        plan.to_update.len(),
        plan.to_delete.len()
    );

    let mut stats = UpsertStats::default();

    if !plan.to_delete.is_empty() {
        stats.deleted = store
            .delete_entries(&plan.to_delete)
            .map_err(KpiError::storage("save KPI data"))?;
    }

    if !plan.to_insert.is_empty() {
        let rows: Vec<NewKpiEntry> = plan
            .to_insert
            .iter()
            .map(|value| NewKpiEntry {
                date,
                client_id: value.client_id,
                kpi_type: value.kpi_type,
                kpi_value: value.value,
            })
            .collect();
        stats.inserted = store
            .insert_entries(&rows)
            .map_err(KpiError::storage("save KPI data"))?
            .len();
    }

    if !plan.to_update.is_empty() {
        stats.updated = store
            .update_entry_values(&plan.to_update)
            .map_err(KpiError::storage("save KPI data"))?;
    }

    let entries = store
        .entries(&scope)
        .map_err(KpiError::storage("load KPI data"))?;

    info!(
        "Saved KPI snapshot for {}: {} inserted, {} updated, {} deleted",
        date, stats.inserted, stats.updated, stats.deleted
    );

    let message = if plan.is_empty() {
        "No changes to save".to_string()
    } else {
        "KPI data saved successfully".to_string()
    };

    Ok(UpsertResponse {
        success: true,
        message,
        form_projection: project_form(date, &entries),
        entries,
        stats,
    })
}
