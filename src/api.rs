//! Typed procedure surface over the engines.
//!
//! A request is a JSON object naming the procedure and carrying its input:
//!
//! ```json
//! {"procedure": "upsertDailySnapshot",
//!  "input": {"date": "2025-01-08", "entries": [{"clientId": "…", "revenue": 1500}]}}
//! ```
//!
//! Responses use a fixed envelope, `{"ok": true, "data": …}` on success and
//! `{"ok": false, "error": {"code": "NOT_FOUND", "message": "…"}}` on failure.

use crate::config::DashboardConfig;
use crate::error::{ErrorCode, KpiError, Result};
use crate::schema::{
    ById, CreateClient, CreateCostCenter, CreateEntry, DashboardSummaryQuery, GetDailySnapshot,
    ListEntries, ListRecords, MonthQuery, UpdateClient, UpdateCostCenter, UpdateEntry,
    UpsertDailySnapshot, ValidateUniqueName,
};
use crate::store::KpiStore;
use crate::{entries, pivot, reconcile, registry, summary};
use chrono::NaiveDate;
use log::{debug, warn};
use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "procedure", content = "input", rename_all = "camelCase")]
pub enum Request {
    #[schemars(description = "Replace one date's KPI values for the listed clients.")]
    UpsertDailySnapshot(UpsertDailySnapshot),
    GetDailySnapshot(GetDailySnapshot),
    #[schemars(description = "Pivot tables of a month, one per KPI type.")]
    BuildMonthlyPivot(MonthQuery),
    GetMonthEntries(MonthQuery),
    #[schemars(description = "Month-to-date actual, budget and prior-month figures.")]
    ComputeDashboardSummary(DashboardSummaryQuery),

    CreateEntry(CreateEntry),
    UpdateEntry(UpdateEntry),
    DeleteEntry(ById),
    GetEntryById(ById),
    ListEntries(ListEntries),
    EntryStats,

    ListClients(ListRecords),
    GetClientById(ById),
    CreateClient(CreateClient),
    UpdateClient(UpdateClient),
    DeleteClient(ById),
    ValidateClientName(ValidateUniqueName),
    ClientStats,

    ListCostCenters(ListRecords),
    GetCostCenterById(ById),
    CreateCostCenter(CreateCostCenter),
    UpdateCostCenter(UpdateCostCenter),
    DeleteCostCenter(ById),
    ValidateCostCenterName(ValidateUniqueName),
}

impl Request {
    pub fn json_schema() -> RootSchema {
        schemars::schema_for!(Request)
    }

    pub fn procedure(&self) -> &'static str {
        match self {
            Request::UpsertDailySnapshot(_) => "upsertDailySnapshot",
            Request::GetDailySnapshot(_) => "getDailySnapshot",
            Request::BuildMonthlyPivot(_) => "buildMonthlyPivot",
            Request::GetMonthEntries(_) => "getMonthEntries",
            Request::ComputeDashboardSummary(_) => "computeDashboardSummary",
            Request::CreateEntry(_) => "createEntry",
            Request::UpdateEntry(_) => "updateEntry",
            Request::DeleteEntry(_) => "deleteEntry",
            Request::GetEntryById(_) => "getEntryById",
            Request::ListEntries(_) => "listEntries",
            Request::EntryStats => "entryStats",
            Request::ListClients(_) => "listClients",
            Request::GetClientById(_) => "getClientById",
            Request::CreateClient(_) => "createClient",
            Request::UpdateClient(_) => "updateClient",
            Request::DeleteClient(_) => "deleteClient",
            Request::ValidateClientName(_) => "validateClientName",
            Request::ClientStats => "clientStats",
            Request::ListCostCenters(_) => "listCostCenters",
            Request::GetCostCenterById(_) => "getCostCenterById",
            Request::CreateCostCenter(_) => "createCostCenter",
            Request::UpdateCostCenter(_) => "updateCostCenter",
            Request::DeleteCostCenter(_) => "deleteCostCenter",
            Request::ValidateCostCenterName(_) => "validateCostCenterName",
        }
    }
}

fn local_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Owns a store and routes requests to the engines.
pub struct Dashboard<S: KpiStore> {
    store: S,
    config: DashboardConfig,
    clock: fn() -> NaiveDate,
}

impl<S: KpiStore> Dashboard<S> {
    pub fn new(store: S, config: DashboardConfig) -> Self {
        Self {
            store,
            config,
            clock: local_today,
        }
    }

    /// Replaces the source of "today" used by statistics and pivot truncation.
    pub fn with_clock(mut self, clock: fn() -> NaiveDate) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    pub fn handle(&mut self, request: Request) -> Result<Value> {
        debug!("Handling {}", request.procedure());
        let today = (self.clock)();
        let Self { store, config, .. } = self;

        let data = match request {
            Request::UpsertDailySnapshot(input) => {
                serde_json::to_value(reconcile::upsert_daily_snapshot(store, config, &input)?)?
            }
            Request::GetDailySnapshot(input) => {
                serde_json::to_value(entries::get_daily_snapshot(&*store, &input)?)?
            }
            Request::BuildMonthlyPivot(input) => {
                serde_json::to_value(pivot::build_monthly_pivot(&*store, config, &input, today)?)?
            }
            Request::GetMonthEntries(input) => {
                serde_json::to_value(entries::month_entries(&*store, &input)?)?
            }
            Request::ComputeDashboardSummary(input) => {
                serde_json::to_value(summary::compute_dashboard_summary(&*store, &input)?)?
            }

            Request::CreateEntry(input) => {
                serde_json::to_value(entries::create_entry(store, config, &input)?)?
            }
            Request::UpdateEntry(input) => {
                serde_json::to_value(entries::update_entry(store, config, &input)?)?
            }
            Request::DeleteEntry(input) => serde_json::to_value(entries::delete_entry(store, input.id)?)?,
            Request::GetEntryById(input) => serde_json::to_value(entries::get_entry(&*store, input.id)?)?,
            Request::ListEntries(input) => {
                serde_json::to_value(entries::list_entries(&*store, config, &input)?)?
            }
            Request::EntryStats => serde_json::to_value(entries::entry_stats(&*store, today)?)?,

            Request::ListClients(input) => {
                serde_json::to_value(registry::list_clients(&*store, config, &input)?)?
            }
            Request::GetClientById(input) => serde_json::to_value(registry::get_client(&*store, input.id)?)?,
            Request::CreateClient(input) => {
                serde_json::to_value(registry::create_client(store, config, &input)?)?
            }
            Request::UpdateClient(input) => {
                serde_json::to_value(registry::update_client(store, config, &input)?)?
            }
            Request::DeleteClient(input) => {
                serde_json::to_value(registry::delete_client(store, input.id)?)?
            }
            Request::ValidateClientName(input) => {
                serde_json::to_value(registry::validate_client_name(&*store, config, &input)?)?
            }
            Request::ClientStats => serde_json::to_value(registry::client_stats(&*store)?)?,

            Request::ListCostCenters(input) => {
                serde_json::to_value(registry::list_cost_centers(&*store, config, &input)?)?
            }
            Request::GetCostCenterById(input) => {
                serde_json::to_value(registry::get_cost_center(&*store, input.id)?)?
            }
            Request::CreateCostCenter(input) => {
                serde_json::to_value(registry::create_cost_center(store, config, &input)?)?
            }
            Request::UpdateCostCenter(input) => {
                serde_json::to_value(registry::update_cost_center(store, config, &input)?)?
            }
            Request::DeleteCostCenter(input) => {
                serde_json::to_value(registry::delete_cost_center(store, input.id)?)?
            }
            Request::ValidateCostCenterName(input) => {
                serde_json::to_value(registry::validate_cost_center_name(&*store, config, &input)?)?
            }
        };

        Ok(data)
    }

    /// Decodes a JSON request, runs it and encodes the response envelope.
    pub fn handle_json(&mut self, raw: &str) -> String {
        let outcome = serde_json::from_str::<Request>(raw)
            .map_err(|e| KpiError::BadRequest(format!("Malformed request: {}", e)))
            .and_then(|request| self.handle(request));

        let envelope = match outcome {
            Ok(data) => json!({ "ok": true, "data": data }),
            Err(err) => {
                if err.code() != ErrorCode::Internal {
                    warn!("Request rejected: {}", err);
                }
                error_envelope(&err)
            }
        };
        envelope.to_string()
    }
}

pub fn error_envelope(err: &KpiError) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": err.code(),
            "message": err.user_message(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, WriteOp};

    fn fixed_today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 20).unwrap()
    }

    fn dashboard() -> Dashboard<MemoryStore> {
        Dashboard::new(MemoryStore::new(), DashboardConfig::default()).with_clock(fixed_today)
    }

    fn call(dashboard: &mut Dashboard<MemoryStore>, request: Value) -> Value {
        serde_json::from_str(&dashboard.handle_json(&request.to_string())).unwrap()
    }

    #[test]
    fn test_procedure_names_match_wire_tags() {
        let request = Request::ClientStats;
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["procedure"], request.procedure());

        let parsed: Request =
            serde_json::from_value(json!({"procedure": "entryStats"})).unwrap();
        assert_eq!(parsed, Request::EntryStats);
    }

    #[test]
    fn test_create_client_then_upsert() {
        let mut dashboard = dashboard();
        let created = call(
            &mut dashboard,
            json!({"procedure": "createClient", "input": {"name": "Acme", "budget": {"revenue": 3100}}}),
        );
        assert_eq!(created["ok"], true);
        let client_id = created["data"]["id"].as_str().unwrap().to_string();

        let saved = call(
            &mut dashboard,
            json!({
                "procedure": "upsertDailySnapshot",
                "input": {"date": "2025-01-08", "entries": [{"clientId": client_id, "revenue": 1500}]}
            }),
        );
        assert_eq!(saved["ok"], true);
        assert_eq!(saved["data"]["stats"]["inserted"], 1);
        assert_eq!(saved["data"]["formProjection"]["entries"][0]["revenue"], 1500.0);

        let pivot = call(
            &mut dashboard,
            json!({"procedure": "buildMonthlyPivot", "input": {"month": "2025-01"}}),
        );
        assert_eq!(pivot["data"]["month"], "2025-01");
        assert_eq!(pivot["data"]["entries"].as_array().unwrap().len(), 1);
        assert!(pivot["data"]["tables"][0]["rows"][0]["cells"][0].is_null());
    }

    #[test]
    fn test_errors_use_envelope() {
        let mut dashboard = dashboard();

        let malformed = call(&mut dashboard, json!({"procedure": "noSuchThing"}));
        assert_eq!(malformed["ok"], false);
        assert_eq!(malformed["error"]["code"], "BAD_REQUEST");

        let missing = call(
            &mut dashboard,
            json!({"procedure": "getClientById", "input": {"id": uuid::Uuid::new_v4()}}),
        );
        assert_eq!(missing["error"]["code"], "NOT_FOUND");
        assert_eq!(missing["error"]["message"], "Client not found");
    }

    #[test]
    fn test_storage_failure_message_is_generic() {
        let mut dashboard = dashboard();
        let created = call(
            &mut dashboard,
            json!({"procedure": "createClient", "input": {"name": "Acme"}}),
        );
        let client_id = created["data"]["id"].clone();

        dashboard.store_mut().fail_writes(Some(WriteOp::Insert));
        let failed = call(
            &mut dashboard,
            json!({
                "procedure": "upsertDailySnapshot",
                "input": {"date": "2025-01-08", "entries": [{"clientId": client_id, "onTime": 90}]}
            }),
        );
        assert_eq!(failed["error"]["code"], "INTERNAL");
        assert_eq!(failed["error"]["message"], "Failed to save KPI data");
    }

    #[test]
    fn test_entry_stats_use_clock() {
        let mut dashboard = dashboard();
        let created = dashboard
            .handle(Request::CreateClient(crate::schema::CreateClient::named("Acme")))
            .unwrap();
        let client_id: uuid::Uuid = serde_json::from_value(created["id"].clone()).unwrap();

        dashboard
            .handle(Request::CreateEntry(CreateEntry {
                date: "2025-01-20".to_string(),
                client_id,
                kpi_type: crate::schema::KpiType::Availability,
                kpi_value: 99.0,
            }))
            .unwrap();

        let stats = dashboard.handle(Request::EntryStats).unwrap();
        assert_eq!(stats["today"], 1);
        assert_eq!(stats["byKpiType"]["AVAILABILITY"], 1);
    }

    #[test]
    fn test_schema_lists_procedures() {
        let schema = serde_json::to_string(&Request::json_schema()).unwrap();
        assert!(schema.contains("upsertDailySnapshot"));
        assert!(schema.contains("computeDashboardSummary"));
    }
}
