use super::{record_order, EntryQuery, KpiStore, RecordQuery, StoreResult};
use crate::error::StoreError;
use crate::schema::{Client, CostCenter, KpiEntry, NewKpiEntry};
use chrono::Utc;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Kind of write a [`MemoryStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Insert,
    Update,
    Delete,
}

/// In-process store with the same uniqueness rules as the SQL schema.
#[derive(Debug, Default)]
pub struct MemoryStore {
    clients: BTreeMap<Uuid, Client>,
    cost_centers: BTreeMap<Uuid, CostCenter>,
    entries: BTreeMap<Uuid, KpiEntry>,
    failing_write: Option<WriteOp>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent entry write of `op` fail until cleared with `None`.
    pub fn fail_writes(&mut self, op: Option<WriteOp>) {
        self.failing_write = op;
    }

    fn check_write(&self, op: WriteOp) -> StoreResult<()> {
        if self.failing_write == Some(op) {
            return Err(StoreError::Backend(format!("injected {:?} failure", op)));
        }
        Ok(())
    }

    fn entry_key_taken(&self, entry: &NewKpiEntry, except: Option<Uuid>) -> bool {
        self.entries.values().any(|existing| {
            Some(existing.id) != except
                && existing.date == entry.date
                && existing.client_id == entry.client_id
                && existing.kpi_type == entry.kpi_type
        })
    }
}

impl KpiStore for MemoryStore {
    fn clients(&self, query: &RecordQuery) -> StoreResult<Vec<Client>> {
        let mut clients: Vec<Client> = self
            .clients
            .values()
            .filter(|c| query.matches_client(c))
            .cloned()
            .collect();
        clients.sort_by_key(|c| record_order(c.status, &c.name));
        Ok(clients)
    }

    fn client(&self, id: Uuid) -> StoreResult<Option<Client>> {
        Ok(self.clients.get(&id).cloned())
    }

    fn client_by_name(&self, name: &str) -> StoreResult<Option<Client>> {
        Ok(self.clients.values().find(|c| c.name == name).cloned())
    }

    fn insert_client(&mut self, client: &Client) -> StoreResult<()> {
        if self.clients.values().any(|c| c.name == client.name) {
            return Err(StoreError::UniqueViolation(format!(
                "clients.name = {}",
                client.name
            )));
        }
        self.clients.insert(client.id, client.clone());
        Ok(())
    }

    fn update_client(&mut self, client: &Client) -> StoreResult<()> {
        if self
            .clients
            .values()
            .any(|c| c.name == client.name && c.id != client.id)
        {
            return Err(StoreError::UniqueViolation(format!(
                "clients.name = {}",
                client.name
            )));
        }
        match self.clients.get_mut(&client.id) {
            Some(slot) => {
                *slot = client.clone();
                Ok(())
            }
            None => Err(StoreError::MissingRow(format!("clients.id = {}", client.id))),
        }
    }

    fn delete_client(&mut self, id: Uuid) -> StoreResult<()> {
        self.clients.remove(&id);
        Ok(())
    }

    fn cost_centers(&self, query: &RecordQuery) -> StoreResult<Vec<CostCenter>> {
        let mut cost_centers: Vec<CostCenter> = self
            .cost_centers
            .values()
            .filter(|c| query.matches_cost_center(c))
            .cloned()
            .collect();
        cost_centers.sort_by_key(|c| record_order(c.status, &c.name));
        Ok(cost_centers)
    }

    fn cost_center(&self, id: Uuid) -> StoreResult<Option<CostCenter>> {
        Ok(self.cost_centers.get(&id).cloned())
    }

    fn cost_center_by_name(&self, name: &str) -> StoreResult<Option<CostCenter>> {
        Ok(self.cost_centers.values().find(|c| c.name == name).cloned())
    }

    fn insert_cost_center(&mut self, cost_center: &CostCenter) -> StoreResult<()> {
        if self.cost_centers.values().any(|c| c.name == cost_center.name) {
            return Err(StoreError::UniqueViolation(format!(
                "cost_centers.name = {}",
                cost_center.name
            )));
        }
        self.cost_centers.insert(cost_center.id, cost_center.clone());
        Ok(())
    }

    fn update_cost_center(&mut self, cost_center: &CostCenter) -> StoreResult<()> {
        if self
            .cost_centers
            .values()
            .any(|c| c.name == cost_center.name && c.id != cost_center.id)
        {
            return Err(StoreError::UniqueViolation(format!(
                "cost_centers.name = {}",
                cost_center.name
            )));
        }
        match self.cost_centers.get_mut(&cost_center.id) {
            Some(slot) => {
                *slot = cost_center.clone();
                Ok(())
            }
            None => Err(StoreError::MissingRow(format!(
                "cost_centers.id = {}",
                cost_center.id
            ))),
        }
    }

    fn delete_cost_center(&mut self, id: Uuid) -> StoreResult<()> {
        self.cost_centers.remove(&id);
        Ok(())
    }

    fn entries(&self, query: &EntryQuery) -> StoreResult<Vec<KpiEntry>> {
        let mut entries: Vec<KpiEntry> = self
            .entries
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.date, e.client_id, e.kpi_type));
        Ok(entries)
    }

    fn insert_entries(&mut self, entries: &[NewKpiEntry]) -> StoreResult<Vec<KpiEntry>> {
        self.check_write(WriteOp::Insert)?;

        for (idx, entry) in entries.iter().enumerate() {
            let repeated_in_batch = entries[..idx].iter().any(|earlier| {
                earlier.date == entry.date
                    && earlier.client_id == entry.client_id
                    && earlier.kpi_type == entry.kpi_type
            });
            if repeated_in_batch || self.entry_key_taken(entry, None) {
                return Err(StoreError::UniqueViolation(format!(
                    "kpi_entries ({}, {}, {})",
                    entry.date, entry.client_id, entry.kpi_type
                )));
            }
        }

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

        for entry in &inserted {
            self.entries.insert(entry.id, entry.clone());
        }
        Ok(inserted)
    }

    fn update_entry(&mut self, entry: &KpiEntry) -> StoreResult<()> {
        self.check_write(WriteOp::Update)?;

        let key = NewKpiEntry {
            date: entry.date,
            client_id: entry.client_id,
            kpi_type: entry.kpi_type,
            kpi_value: entry.kpi_value,
        };
        if self.entry_key_taken(&key, Some(entry.id)) {
            return Err(StoreError::UniqueViolation(format!(
                "kpi_entries ({}, {}, {})",
                entry.date, entry.client_id, entry.kpi_type
            )));
        }

        match self.entries.get_mut(&entry.id) {
            Some(slot) => {
                *slot = entry.clone();
                Ok(())
            }
            None => Err(StoreError::MissingRow(format!("kpi_entries.id = {}", entry.id))),
        }
    }

    fn update_entry_values(&mut self, updates: &[(Uuid, f64)]) -> StoreResult<usize> {
        self.check_write(WriteOp::Update)?;

        let now = Utc::now();
        let mut changed = 0;
        for (id, value) in updates {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.kpi_value = *value;
                entry.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn delete_entries(&mut self, ids: &[Uuid]) -> StoreResult<usize> {
        self.check_write(WriteOp::Delete)?;

        Ok(ids
            .iter()
            .filter(|id| self.entries.remove(*id).is_some())
            .count())
    }
}
