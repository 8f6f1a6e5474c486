//! SQLite-backed entity store.
//!
//! Ids are stored as TEXT, dates as `YYYY-MM-DD` and timestamps as RFC 3339
//! so rows stay readable from the sqlite3 shell. Referential rules (no
//! deleting a client that has entries, no deleting a cost center that has
//! clients) are enforced by the registry, not by foreign keys.

use super::{EntryQuery, KpiStore, RecordQuery, StoreResult};
use crate::error::StoreError;
use crate::schema::{
    BudgetTargets, Client, CostCenter, KpiEntry, KpiType, NewKpiEntry, RecordStatus,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cost_centers (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    status      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS clients (
    id                   TEXT PRIMARY KEY,
    name                 TEXT NOT NULL UNIQUE,
    status               TEXT NOT NULL,
    cost_center_id       TEXT,
    is_key_account       INTEGER NOT NULL DEFAULT 0,
    budget_revenue       REAL,
    budget_on_time       REAL,
    budget_occupancy     REAL,
    budget_availability  REAL,
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS kpi_entries (
    id          TEXT PRIMARY KEY,
    date        TEXT NOT NULL,
    client_id   TEXT NOT NULL,
    kpi_type    TEXT NOT NULL,
    kpi_value   REAL NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE (date, client_id, kpi_type)
);

CREATE INDEX IF NOT EXISTS idx_kpi_entries_client_date ON kpi_entries (client_id, date);
CREATE INDEX IF NOT EXISTS idx_clients_cost_center ON clients (cost_center_id);
";

const CLIENT_COLUMNS: &str = "id, name, status, cost_center_id, is_key_account, budget_revenue,
     budget_on_time, budget_occupancy, budget_availability, created_at, updated_at";

const COST_CENTER_COLUMNS: &str = "id, name, status, created_at, updated_at";

const ENTRY_COLUMNS: &str = "id, date, client_id, kpi_type, kpi_value, created_at, updated_at";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) the database file and applies the schema.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Backend(format!("create {}: {}", parent.display(), e)))?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        log::info!("Opened KPI database at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn query_clients(&self, filter: &SqlFilter) -> StoreResult<Vec<Client>> {
        let sql = format!(
            "SELECT {} FROM clients{} ORDER BY status = 'INACTIVE', name",
            CLIENT_COLUMNS,
            filter.where_clause()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params_from_iter(filter.params.iter()), RawClient::read)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawClient::into_client).collect()
    }

    fn query_cost_centers(&self, filter: &SqlFilter) -> StoreResult<Vec<CostCenter>> {
        let sql = format!(
            "SELECT {} FROM cost_centers{} ORDER BY status = 'INACTIVE', name",
            COST_CENTER_COLUMNS,
            filter.where_clause()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params_from_iter(filter.params.iter()), RawCostCenter::read)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawCostCenter::into_cost_center).collect()
    }
}

impl KpiStore for SqliteStore {
    fn clients(&self, query: &RecordQuery) -> StoreResult<Vec<Client>> {
        let mut filter = SqlFilter::default();
        if let Some(status) = query.status {
            filter.eq("status", status.as_str().to_string());
        }
        if let Some(ids) = &query.ids {
            filter.within("id", ids.iter().map(Uuid::to_string).collect());
        }
        if let Some(ids) = &query.cost_center_ids {
            filter.within("cost_center_id", ids.iter().map(Uuid::to_string).collect());
        }

        // LIKE only folds ASCII case, so the name search runs here.
        let clients = self.query_clients(&filter)?;
        Ok(clients
            .into_iter()
            .filter(|c| query.matches_name(&c.name))
            .collect())
    }

    fn client(&self, id: Uuid) -> StoreResult<Option<Client>> {
        let mut filter = SqlFilter::default();
        filter.eq("id", id.to_string());
        Ok(self.query_clients(&filter)?.into_iter().next())
    }

    fn client_by_name(&self, name: &str) -> StoreResult<Option<Client>> {
        let mut filter = SqlFilter::default();
        filter.eq("name", name.to_string());
        Ok(self.query_clients(&filter)?.into_iter().next())
    }

    fn insert_client(&mut self, client: &Client) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO clients (
                id, name, status, cost_center_id, is_key_account, budget_revenue,
                budget_on_time, budget_occupancy, budget_availability, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                client.id.to_string(),
                client.name,
                client.status.as_str(),
                client.cost_center_id.map(|id| id.to_string()),
                client.is_key_account,
                client.budget.revenue,
                client.budget.on_time,
                client.budget.occupancy,
                client.budget.availability,
                format_timestamp(client.created_at),
                format_timestamp(client.updated_at),
            ],
        )?;
        Ok(())
    }

    fn update_client(&mut self, client: &Client) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE clients SET
                name = ?2, status = ?3, cost_center_id = ?4, is_key_account = ?5,
                budget_revenue = ?6, budget_on_time = ?7, budget_occupancy = ?8,
                budget_availability = ?9, updated_at = ?10
             WHERE id = ?1",
            params![
                client.id.to_string(),
                client.name,
                client.status.as_str(),
                client.cost_center_id.map(|id| id.to_string()),
                client.is_key_account,
                client.budget.revenue,
                client.budget.on_time,
                client.budget.occupancy,
                client.budget.availability,
                format_timestamp(client.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::MissingRow(format!("clients.id = {}", client.id)));
        }
        Ok(())
    }

    fn delete_client(&mut self, id: Uuid) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM clients WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    fn cost_centers(&self, query: &RecordQuery) -> StoreResult<Vec<CostCenter>> {
        let mut filter = SqlFilter::default();
        if let Some(status) = query.status {
            filter.eq("status", status.as_str().to_string());
        }
        if let Some(ids) = &query.ids {
            filter.within("id", ids.iter().map(Uuid::to_string).collect());
        }

        let cost_centers = self.query_cost_centers(&filter)?;
        Ok(cost_centers
            .into_iter()
            .filter(|c| query.matches_name(&c.name))
            .collect())
    }

    fn cost_center(&self, id: Uuid) -> StoreResult<Option<CostCenter>> {
        let mut filter = SqlFilter::default();
        filter.eq("id", id.to_string());
        Ok(self.query_cost_centers(&filter)?.into_iter().next())
    }

    fn cost_center_by_name(&self, name: &str) -> StoreResult<Option<CostCenter>> {
        let mut filter = SqlFilter::default();
        filter.eq("name", name.to_string());
        Ok(self.query_cost_centers(&filter)?.into_iter().next())
    }

    fn insert_cost_center(&mut self, cost_center: &CostCenter) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO cost_centers (id, name, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                cost_center.id.to_string(),
                cost_center.name,
                cost_center.status.as_str(),
                format_timestamp(cost_center.created_at),
                format_timestamp(cost_center.updated_at),
            ],
        )?;
        Ok(())
    }

    fn update_cost_center(&mut self, cost_center: &CostCenter) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE cost_centers SET name = ?2, status = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                cost_center.id.to_string(),
                cost_center.name,
                cost_center.status.as_str(),
                format_timestamp(cost_center.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::MissingRow(format!(
                "cost_centers.id = {}",
                cost_center.id
            )));
        }
        Ok(())
    }

    fn delete_cost_center(&mut self, id: Uuid) -> StoreResult<()> {
        self.conn.execute(
            "DELETE FROM cost_centers WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }

    fn entries(&self, query: &EntryQuery) -> StoreResult<Vec<KpiEntry>> {
        let filter = SqlFilter::for_entries(query);
        let sql = format!(
            "SELECT {} FROM kpi_entries{} ORDER BY date, client_id, kpi_type",
            ENTRY_COLUMNS,
            filter.where_clause()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params_from_iter(filter.params.iter()), RawEntry::read)?
            .collect::<Result<Vec<_>, _>>()?;
        let mut entries = raw
            .into_iter()
            .map(RawEntry::into_entry)
            .collect::<StoreResult<Vec<_>>>()?;
        entries.sort_by_key(|e| (e.date, e.client_id, e.kpi_type));
        Ok(entries)
    }

    fn count_entries(&self, query: &EntryQuery) -> StoreResult<usize> {
        let filter = SqlFilter::for_entries(query);
        let sql = format!("SELECT COUNT(*) FROM kpi_entries{}", filter.where_clause());
        let count: i64 = self.conn.query_row(
            &sql,
            params_from_iter(filter.params.iter()),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn insert_entries(&mut self, entries: &[NewKpiEntry]) -> StoreResult<Vec<KpiEntry>> {
        let now = Utc::now();
        let inserted: Vec<KpiEntry> = entries
            .iter()
            .map(|entry| KpiEntry {
                id: Uuid::new_v4(),
                date: entry.date,
                client_id: entry.client_id,
                kpi_type: entry.kpi_type,
                kpi_value: entry.kpi_value,
                created_at: now,
                updated_at: now,
            })
            .collect();

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO kpi_entries (id, date, client_id, kpi_type, kpi_value, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for entry in &inserted {
                stmt.execute(params![
                    entry.id.to_string(),
                    format_date(entry.date),
                    entry.client_id.to_string(),
                    entry.kpi_type.as_str(),
                    entry.kpi_value,
                    format_timestamp(entry.created_at),
                    format_timestamp(entry.updated_at),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn update_entry(&mut self, entry: &KpiEntry) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE kpi_entries SET date = ?2, client_id = ?3, kpi_type = ?4, kpi_value = ?5,
                    updated_at = ?6
             WHERE id = ?1",
            params![
                entry.id.to_string(),
                format_date(entry.date),
                entry.client_id.to_string(),
                entry.kpi_type.as_str(),
                entry.kpi_value,
                format_timestamp(entry.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::MissingRow(format!("kpi_entries.id = {}", entry.id)));
        }
        Ok(())
    }

    fn update_entry_values(&mut self, updates: &[(Uuid, f64)]) -> StoreResult<usize> {
        let now = format_timestamp(Utc::now());
        let mut changed = 0;
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "UPDATE kpi_entries SET kpi_value = ?2, updated_at = ?3 WHERE id = ?1",
            )?;
            for (id, value) in updates {
                changed += stmt.execute(params![id.to_string(), value, now])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    fn delete_entries(&mut self, ids: &[Uuid]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut filter = SqlFilter::default();
        filter.within("id", ids.iter().map(Uuid::to_string).collect());
        let sql = format!("DELETE FROM kpi_entries{}", filter.where_clause());
        Ok(self
            .conn
            .execute(&sql, params_from_iter(filter.params.iter()))?)
    }
}

/// WHERE clause builder with positional parameters. All bound values are text.
#[derive(Debug, Default)]
struct SqlFilter {
    clauses: Vec<String>,
    params: Vec<String>,
}

impl SqlFilter {
    fn for_entries(query: &EntryQuery) -> Self {
        let mut filter = Self::default();
        if let Some(ids) = &query.ids {
            filter.within("id", ids.iter().map(Uuid::to_string).collect());
        }
        if let Some(from) = query.date_from {
            filter.compare("date", ">=", format_date(from));
        }
        if let Some(to) = query.date_to {
            filter.compare("date", "<=", format_date(to));
        }
        if let Some(ids) = &query.client_ids {
            filter.within("client_id", ids.iter().map(Uuid::to_string).collect());
        }
        if let Some(kpi_type) = query.kpi_type {
            filter.eq("kpi_type", kpi_type.as_str().to_string());
        }
        filter
    }

    fn eq(&mut self, column: &str, value: String) {
        self.compare(column, "=", value);
    }

    fn compare(&mut self, column: &str, op: &str, value: String) {
        self.clauses.push(format!("{} {} ?", column, op));
        self.params.push(value);
    }

    fn within(&mut self, column: &str, values: Vec<String>) {
        if values.is_empty() {
            self.clauses.push("0".to_string());
            return;
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        self.clauses.push(format!("{} IN ({})", column, placeholders));
        self.params.extend(values);
    }

    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

struct RawClient {
    id: String,
    name: String,
    status: String,
    cost_center_id: Option<String>,
    is_key_account: bool,
    budget: BudgetTargets,
    created_at: String,
    updated_at: String,
}

impl RawClient {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            status: row.get(2)?,
            cost_center_id: row.get(3)?,
            is_key_account: row.get(4)?,
            budget: BudgetTargets {
                revenue: row.get(5)?,
                on_time: row.get(6)?,
                occupancy: row.get(7)?,
                availability: row.get(8)?,
            },
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_client(self) -> StoreResult<Client> {
        Ok(Client {
            id: parse_uuid(&self.id)?,
            name: self.name,
            status: parse_status(&self.status)?,
            cost_center_id: self.cost_center_id.as_deref().map(parse_uuid).transpose()?,
            is_key_account: self.is_key_account,
            budget: self.budget,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

struct RawCostCenter {
    id: String,
    name: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl RawCostCenter {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            status: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn into_cost_center(self) -> StoreResult<CostCenter> {
        Ok(CostCenter {
            id: parse_uuid(&self.id)?,
            name: self.name,
            status: parse_status(&self.status)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

struct RawEntry {
    id: String,
    date: String,
    client_id: String,
    kpi_type: String,
    kpi_value: f64,
    created_at: String,
    updated_at: String,
}

impl RawEntry {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            date: row.get(1)?,
            client_id: row.get(2)?,
            kpi_type: row.get(3)?,
            kpi_value: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_entry(self) -> StoreResult<KpiEntry> {
        Ok(KpiEntry {
            id: parse_uuid(&self.id)?,
            date: NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
                .map_err(|e| StoreError::CorruptRow(format!("date '{}': {}", self.date, e)))?,
            client_id: parse_uuid(&self.client_id)?,
            kpi_type: KpiType::parse(&self.kpi_type)
                .ok_or_else(|| StoreError::CorruptRow(format!("kpi_type '{}'", self.kpi_type)))?,
            kpi_value: self.kpi_value,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_uuid(value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::CorruptRow(format!("id '{}': {}", value, e)))
}

fn parse_status(value: &str) -> StoreResult<RecordStatus> {
    RecordStatus::parse(value).ok_or_else(|| StoreError::CorruptRow(format!("status '{}'", value)))
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow(format!("timestamp '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(name: &str) -> Client {
        let now = Utc::now();
        Client {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: RecordStatus::Active,
            cost_center_id: None,
            is_key_account: false,
            budget: BudgetTargets {
                revenue: Some(3000.0),
                on_time: Some(95.0),
                occupancy: None,
                availability: None,
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_client_round_trip_keeps_budget() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let acme = client("Acme");
        store.insert_client(&acme).unwrap();

        let loaded = store.client(acme.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Acme");
        assert_eq!(loaded.budget.revenue, Some(3000.0));
        assert_eq!(loaded.budget.occupancy, None);
        assert_eq!(store.client_by_name("Acme").unwrap().unwrap().id, acme.id);
    }

    #[test]
    fn test_duplicate_client_name_is_unique_violation() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.insert_client(&client("Acme")).unwrap();
        let err = store.insert_client(&client("Acme")).unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[test]
    fn test_entry_triple_is_unique() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let acme = client("Acme");
        store.insert_client(&acme).unwrap();
        let row = NewKpiEntry {
            date: NaiveDate::from_ymd_opt(2025, 1, 8).unwrap(),
            client_id: acme.id,
            kpi_type: KpiType::Revenue,
            kpi_value: 1500.0,
        };
        store.insert_entries(&[row.clone()]).unwrap();
        assert!(store.insert_entries(&[row]).is_err());
    }

    #[test]
    fn test_entry_filters_and_updates() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let acme = client("Acme");
        store.insert_client(&acme).unwrap();
        let jan = |d| NaiveDate::from_ymd_opt(2025, 1, d).unwrap();

        let inserted = store
            .insert_entries(&[
                NewKpiEntry { date: jan(8), client_id: acme.id, kpi_type: KpiType::Revenue, kpi_value: 1500.0 },
                NewKpiEntry { date: jan(8), client_id: acme.id, kpi_type: KpiType::OnTime, kpi_value: 85.5 },
                NewKpiEntry { date: jan(9), client_id: acme.id, kpi_type: KpiType::Revenue, kpi_value: 900.0 },
            ])
            .unwrap();

        let on_8th = store.entries(&EntryQuery::on(jan(8))).unwrap();
        assert_eq!(on_8th.len(), 2);
        assert_eq!(
            store
                .count_entries(&EntryQuery::between(jan(1), jan(31)).of_type(KpiType::Revenue))
                .unwrap(),
            2
        );

        assert_eq!(store.update_entry_values(&[(inserted[0].id, 1800.0)]).unwrap(), 1);
        let reloaded = store.entries(&EntryQuery::by_ids(vec![inserted[0].id])).unwrap();
        assert_eq!(reloaded[0].kpi_value, 1800.0);

        assert_eq!(store.delete_entries(&[inserted[1].id, inserted[2].id]).unwrap(), 2);
        assert_eq!(store.count_entries(&EntryQuery::default()).unwrap(), 1);
        assert!(store
            .entries(&EntryQuery::default().for_clients(vec![]))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_records_ordered_active_first() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut zeta = client("Zeta");
        let mut alpha = client("Alpha");
        alpha.status = RecordStatus::Inactive;
        zeta.status = RecordStatus::Active;
        store.insert_client(&alpha).unwrap();
        store.insert_client(&zeta).unwrap();

        let names: Vec<String> = store
            .clients(&RecordQuery::all())
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Zeta", "Alpha"]);
    }
}
