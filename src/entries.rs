//! Single KPI entry procedures and read-side queries over entries.

use crate::config::DashboardConfig;
use crate::error::{KpiError, Result, StoreError};
use crate::reconcile::project_form;
use crate::schema::{
    CreateEntry, DailySnapshot, DeletedEntry, EntryPage, EntryStats, GetDailySnapshot, KpiEntry,
    KpiType, ListEntries, MonthEntries, MonthQuery, NewKpiEntry, UpdateEntry,
};
use crate::store::{EntryQuery, KpiStore};
use crate::utils::YearMonth;
use crate::validation::{page_limit, parse_date, validate_kpi_value};
use chrono::{Days, NaiveDate, Utc};
use log::{info, warn};
use std::collections::BTreeMap;
use uuid::Uuid;

fn duplicate(date: NaiveDate, client_id: Uuid, kpi_type: KpiType) -> KpiError {
    KpiError::DuplicateEntry {
        date: date.to_string(),
        client_id: client_id.to_string(),
        kpi_type: kpi_type.to_string(),
    }
}

fn require_client<S: KpiStore + ?Sized>(store: &S, client_id: Uuid) -> Result<()> {
    match store
        .client(client_id)
        .map_err(KpiError::storage("load client"))?
    {
        Some(_) => Ok(()),
        None => Err(KpiError::ClientNotFound(client_id.to_string())),
    }
}

/// Returns the entry occupying (date, client, type), if any, other than `except`.
fn occupant<S: KpiStore + ?Sized>(
    store: &S,
    date: NaiveDate,
    client_id: Uuid,
    kpi_type: KpiType,
    except: Option<Uuid>,
) -> Result<Option<KpiEntry>> {
    let found = store
        .entries(&EntryQuery::on(date).for_clients(vec![client_id]).of_type(kpi_type))
        .map_err(KpiError::storage("load KPI data"))?;
    Ok(found.into_iter().find(|e| Some(e.id) != except))
}

pub fn get_entry<S: KpiStore + ?Sized>(store: &S, id: Uuid) -> Result<KpiEntry> {
    store
        .entries(&EntryQuery::by_ids(vec![id]))
        .map_err(KpiError::storage("load KPI entry"))?
        .into_iter()
        .next()
        .ok_or_else(|| KpiError::EntryNotFound(id.to_string()))
}

pub fn create_entry<S: KpiStore + ?Sized>(
    store: &mut S,
    config: &DashboardConfig,
    input: &CreateEntry,
) -> Result<KpiEntry> {
    let date = parse_date(&input.date)?;
    let kpi_value = validate_kpi_value(input.kpi_type, input.kpi_value, config)?;
    require_client(store, input.client_id)?;

    if occupant(store, date, input.client_id, input.kpi_type, None)?.is_some() {
        warn!(
            "Rejected duplicate {} entry for client {} on {}",
            input.kpi_type, input.client_id, date
        );
        return Err(duplicate(date, input.client_id, input.kpi_type));
    }

    let row = NewKpiEntry {
        date,
        client_id: input.client_id,
        kpi_type: input.kpi_type,
        kpi_value,
    };
    let created = match store.insert_entries(std::slice::from_ref(&row)) {
        Ok(mut rows) => rows.pop(),
        Err(StoreError::UniqueViolation(_)) => {
            return Err(duplicate(date, input.client_id, input.kpi_type))
        }
        Err(e) => return Err(KpiError::storage("create KPI entry")(e)),
    };

    let entry = created.ok_or_else(|| {
        KpiError::storage("create KPI entry")(StoreError::MissingRow(
            "insert returned no row".to_string(),
        ))
    })?;
    info!(
        "Created {} entry {} for client {} on {}",
        entry.kpi_type, entry.id, entry.client_id, entry.date
    );
    Ok(entry)
}

/// Applies a partial update. The value is re-checked against the resulting type.
pub fn update_entry<S: KpiStore + ?Sized>(
    store: &mut S,
    config: &DashboardConfig,
    input: &UpdateEntry,
) -> Result<KpiEntry> {
    let mut entry = get_entry(store, input.id)?;

    if let Some(date) = &input.date {
        entry.date = parse_date(date)?;
    }
    if let Some(client_id) = input.client_id {
        if client_id != entry.client_id {
            require_client(store, client_id)?;
        }
        entry.client_id = client_id;
    }
    if let Some(kpi_type) = input.kpi_type {
        entry.kpi_type = kpi_type;
    }
    if let Some(value) = input.kpi_value {
        entry.kpi_value = value;
    }
    validate_kpi_value(entry.kpi_type, entry.kpi_value, config)?;

    if occupant(store, entry.date, entry.client_id, entry.kpi_type, Some(entry.id))?.is_some() {
        return Err(duplicate(entry.date, entry.client_id, entry.kpi_type));
    }

    entry.updated_at = Utc::now();
    match store.update_entry(&entry) {
        Ok(()) => {}
        Err(StoreError::UniqueViolation(_)) => {
            return Err(duplicate(entry.date, entry.client_id, entry.kpi_type))
        }
        Err(StoreError::MissingRow(_)) => return Err(KpiError::EntryNotFound(entry.id.to_string())),
        Err(e) => return Err(KpiError::storage("update KPI entry")(e)),
    }

    info!("Updated KPI entry {}", entry.id);
    Ok(entry)
}

pub fn delete_entry<S: KpiStore + ?Sized>(store: &mut S, id: Uuid) -> Result<DeletedEntry> {
    let entry = get_entry(store, id)?;
    let client_name = store
        .client(entry.client_id)
        .map_err(KpiError::storage("load client"))?
        .map(|client| client.name);

    let removed = store
        .delete_entries(&[id])
        .map_err(KpiError::storage("delete KPI entry"))?;
    if removed == 0 {
        return Err(KpiError::EntryNotFound(id.to_string()));
    }

    info!("Deleted KPI entry {}", id);
    Ok(DeletedEntry {
        id,
        date: entry.date,
        kpi_type: entry.kpi_type,
        client_name,
    })
}

/// Entries of one date, optionally narrowed, with their form projection.
pub fn get_daily_snapshot<S: KpiStore + ?Sized>(
    store: &S,
    input: &GetDailySnapshot,
) -> Result<DailySnapshot> {
    let date = parse_date(&input.date)?;
    let mut query = EntryQuery::on(date);
    if let Some(client_id) = input.client_id {
        query = query.for_clients(vec![client_id]);
    }
    if let Some(kpi_type) = input.kpi_type {
        query = query.of_type(kpi_type);
    }

    let entries = store
        .entries(&query)
        .map_err(KpiError::storage("load KPI data"))?;
    Ok(DailySnapshot {
        form_projection: project_form(date, &entries),
        entries,
    })
}

/// Paginated entry listing, newest date first.
pub fn list_entries<S: KpiStore + ?Sized>(
    store: &S,
    config: &DashboardConfig,
    input: &ListEntries,
) -> Result<EntryPage> {
    let limit = page_limit(input.limit, config)?;

    let mut query = EntryQuery::default();
    if let Some(start) = &input.start_date {
        query.date_from = Some(parse_date(start)?);
    }
    if let Some(end) = &input.end_date {
        query.date_to = Some(parse_date(end)?);
    }
    if let (Some(from), Some(to)) = (query.date_from, query.date_to) {
        if from > to {
            return Err(KpiError::validation(
                "endDate",
                "End date must not be before start date",
            ));
        }
    }
    query.client_ids = input.client_id.map(|id| vec![id]);
    query.kpi_type = input.kpi_type;

    let mut entries = store
        .entries(&query)
        .map_err(KpiError::storage("list KPI entries"))?;
    entries.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then(a.client_id.cmp(&b.client_id))
            .then(a.kpi_type.cmp(&b.kpi_type))
    });

    let total_count = entries.len();
    let page: Vec<KpiEntry> = entries.into_iter().skip(input.offset).take(limit).collect();
    Ok(EntryPage {
        has_more: input.offset + page.len() < total_count,
        total_count,
        entries: page,
    })
}

/// Entry counts relative to `today`: the day itself, the trailing seven days
/// and the month to date.
pub fn entry_stats<S: KpiStore + ?Sized>(store: &S, today: NaiveDate) -> Result<EntryStats> {
    let all = store
        .entries(&EntryQuery::default())
        .map_err(KpiError::storage("load KPI statistics"))?;

    let week_start = today - Days::new(6);
    let month_start = YearMonth::from_date(today).first_day();
    let within = |from: NaiveDate| all.iter().filter(|e| e.date >= from && e.date <= today).count();

    let mut by_kpi_type: BTreeMap<KpiType, usize> =
        KpiType::ALL.into_iter().map(|kpi| (kpi, 0)).collect();
    for entry in &all {
        *by_kpi_type.entry(entry.kpi_type).or_default() += 1;
    }

    Ok(EntryStats {
        total: all.len(),
        today: within(today),
        this_week: within(week_start),
        this_month: within(month_start),
        by_kpi_type,
    })
}

/// Raw entries of a month, optionally for one client.
pub fn month_entries<S: KpiStore + ?Sized>(store: &S, input: &MonthQuery) -> Result<MonthEntries> {
    let month = YearMonth::parse(&input.month)?;
    let mut query = EntryQuery::between(month.first_day(), month.last_day());
    if let Some(client_id) = input.client_id {
        query = query.for_clients(vec![client_id]);
    }

    let entries = store
        .entries(&query)
        .map_err(KpiError::storage("load KPI data"))?;
    Ok(MonthEntries { entries })
}
