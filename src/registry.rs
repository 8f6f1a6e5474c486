//! Client and cost-center procedures.
//!
//! Names are trimmed before they are stored or compared. Referential rules
//! live here: a client with KPI entries and a cost center with clients
//! cannot be deleted.

use crate::config::DashboardConfig;
use crate::error::{KpiError, Result, StoreError};
use crate::schema::{
    Acknowledgement, BudgetTargets, Client, ClientPage, ClientStats, CostCenter, CostCenterPage,
    CostCenterSummary, CreateClient, CreateCostCenter, KpiType, ListRecords, RecordStatus,
    UniqueNameCheck, UpdateClient, UpdateCostCenter, ValidateUniqueName,
};
use crate::store::{EntryQuery, KpiStore, RecordQuery};
use crate::validation::{normalize_name, page_limit, validate_kpi_value, validate_percentage_target};
use chrono::Utc;
use log::{info, warn};
use uuid::Uuid;

fn paginate<T>(items: Vec<T>, offset: usize, limit: usize) -> (Vec<T>, usize, bool) {
    let total = items.len();
    let page: Vec<T> = items.into_iter().skip(offset).take(limit).collect();
    let has_more = offset + page.len() < total;
    (page, total, has_more)
}

fn record_query(input: &ListRecords) -> RecordQuery {
    RecordQuery {
        status: input.status,
        search: input.search.clone(),
        ..Default::default()
    }
}

fn validate_budget(budget: &BudgetTargets, config: &DashboardConfig) -> Result<()> {
    if let Some(revenue) = budget.revenue {
        validate_kpi_value(KpiType::Revenue, revenue, config)?;
    }
    for kpi_type in [KpiType::OnTime, KpiType::Occupancy, KpiType::Availability] {
        validate_percentage_target(kpi_type, budget.target(kpi_type))?;
    }
    Ok(())
}

/// Maps a store write failure, turning a name collision into a conflict.
fn write_failure<'a>(
    name: &'a str,
    context: &'static str,
) -> impl FnOnce(StoreError) -> KpiError + 'a {
    move |err| match err {
        StoreError::UniqueViolation(_) => KpiError::DuplicateName(name.to_string()),
        other => KpiError::storage(context)(other),
    }
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

pub fn list_clients<S: KpiStore + ?Sized>(
    store: &S,
    config: &DashboardConfig,
    input: &ListRecords,
) -> Result<ClientPage> {
    let limit = page_limit(input.limit, config)?;
    let clients = store
        .clients(&record_query(input))
        .map_err(KpiError::storage("list clients"))?;

    let (clients, total_count, has_more) = paginate(clients, input.offset, limit);
    Ok(ClientPage {
        clients,
        total_count,
        has_more,
    })
}

pub fn get_client<S: KpiStore + ?Sized>(store: &S, id: Uuid) -> Result<Client> {
    store
        .client(id)
        .map_err(KpiError::storage("load client"))?
        .ok_or_else(|| KpiError::ClientNotFound(id.to_string()))
}

fn client_name_taken<S: KpiStore + ?Sized>(store: &S, name: &str, except: Option<Uuid>) -> Result<bool> {
    Ok(store
        .client_by_name(name)
        .map_err(KpiError::storage("check client name"))?
        .map_or(false, |existing| Some(existing.id) != except))
}

fn require_cost_center<S: KpiStore + ?Sized>(store: &S, id: Uuid) -> Result<CostCenter> {
    store
        .cost_center(id)
        .map_err(KpiError::storage("load cost center"))?
        .ok_or_else(|| KpiError::CostCenterNotFound(id.to_string()))
}

pub fn create_client<S: KpiStore + ?Sized>(
    store: &mut S,
    config: &DashboardConfig,
    input: &CreateClient,
) -> Result<Client> {
    let name = normalize_name(&input.name, config)?;
    validate_budget(&input.budget, config)?;

    if client_name_taken(store, &name, None)? {
        warn!("Rejected client with duplicate name '{}'", name);
        return Err(KpiError::DuplicateName(name));
    }
    if let Some(cost_center_id) = input.cost_center_id {
        require_cost_center(store, cost_center_id)?;
    }

    let now = Utc::now();
    let client = Client {
        id: Uuid::new_v4(),
        name,
        status: input.status,
        cost_center_id: input.cost_center_id,
        is_key_account: input.is_key_account,
        budget: input.budget.clone(),
        created_at: now,
        updated_at: now,
    };
    store
        .insert_client(&client)
        .map_err(write_failure(&client.name, "create client"))?;

    info!("Created client '{}' ({})", client.name, client.id);
    Ok(client)
}

pub fn update_client<S: KpiStore + ?Sized>(
    store: &mut S,
    config: &DashboardConfig,
    input: &UpdateClient,
) -> Result<Client> {
    let mut client = get_client(store, input.id)?;

    if let Some(name) = &input.name {
        let name = normalize_name(name, config)?;
        if client_name_taken(store, &name, Some(client.id))? {
            return Err(KpiError::DuplicateName(name));
        }
        client.name = name;
    }
    if let Some(status) = input.status {
        client.status = status;
    }
    if let Some(cost_center_id) = input.cost_center_id {
        if let Some(id) = cost_center_id {
            require_cost_center(store, id)?;
        }
        client.cost_center_id = cost_center_id;
    }
    if let Some(is_key_account) = input.is_key_account {
        client.is_key_account = is_key_account;
    }
    if let Some(budget) = &input.budget {
        validate_budget(budget, config)?;
        client.budget = budget.clone();
    }

    client.updated_at = Utc::now();
    match store.update_client(&client) {
        Ok(()) => {}
        Err(StoreError::MissingRow(_)) => return Err(KpiError::ClientNotFound(client.id.to_string())),
        Err(e) => return Err(write_failure(&client.name, "update client")(e)),
    }

    info!("Updated client '{}' ({})", client.name, client.id);
    Ok(client)
}

pub fn delete_client<S: KpiStore + ?Sized>(store: &mut S, id: Uuid) -> Result<Acknowledgement> {
    let client = get_client(store, id)?;

    let entry_count = store
        .count_entries(&EntryQuery::default().for_clients(vec![id]))
        .map_err(KpiError::storage("check client entries"))?;
    if entry_count > 0 {
        warn!(
            "Blocked deletion of client '{}' with {} KPI entries",
            client.name, entry_count
        );
        return Err(KpiError::DeleteBlocked(format!(
            "Client '{}' has {} KPI entries and cannot be deleted",
            client.name, entry_count
        )));
    }

    store
        .delete_client(id)
        .map_err(KpiError::storage("delete client"))?;

    info!("Deleted client '{}' ({})", client.name, id);
    Ok(Acknowledgement {
        success: true,
        message: format!("Client '{}' deleted", client.name),
    })
}

pub fn validate_client_name<S: KpiStore + ?Sized>(
    store: &S,
    config: &DashboardConfig,
    input: &ValidateUniqueName,
) -> Result<UniqueNameCheck> {
    let name = normalize_name(&input.name, config)?;
    let taken = client_name_taken(store, &name, input.exclude_id)?;
    Ok(UniqueNameCheck {
        is_unique: !taken,
        message: if taken {
            "A client with this name already exists".to_string()
        } else {
            "Name is available".to_string()
        },
    })
}

pub fn client_stats<S: KpiStore + ?Sized>(store: &S) -> Result<ClientStats> {
    let clients = store
        .clients(&RecordQuery::all())
        .map_err(KpiError::storage("load client statistics"))?;
    let active = clients
        .iter()
        .filter(|c| c.status == RecordStatus::Active)
        .count();

    Ok(ClientStats {
        total: clients.len(),
        active,
        inactive: clients.len() - active,
    })
}

// ---------------------------------------------------------------------------
// Cost centers
// ---------------------------------------------------------------------------

fn summarize<S: KpiStore + ?Sized>(store: &S, cost_center: CostCenter) -> Result<CostCenterSummary> {
    let client_count = store
        .clients(&RecordQuery::in_cost_centers(vec![cost_center.id]))
        .map_err(KpiError::storage("count cost center clients"))?
        .len();
    Ok(CostCenterSummary {
        cost_center,
        client_count,
    })
}

fn cost_center_name_taken<S: KpiStore + ?Sized>(
    store: &S,
    name: &str,
    except: Option<Uuid>,
) -> Result<bool> {
    Ok(store
        .cost_center_by_name(name)
        .map_err(KpiError::storage("check cost center name"))?
        .map_or(false, |existing| Some(existing.id) != except))
}

pub fn list_cost_centers<S: KpiStore + ?Sized>(
    store: &S,
    config: &DashboardConfig,
    input: &ListRecords,
) -> Result<CostCenterPage> {
    let limit = page_limit(input.limit, config)?;
    let cost_centers = store
        .cost_centers(&record_query(input))
        .map_err(KpiError::storage("list cost centers"))?;

    let (page, total_count, has_more) = paginate(cost_centers, input.offset, limit);
    let cost_centers = page
        .into_iter()
        .map(|cost_center| summarize(store, cost_center))
        .collect::<Result<Vec<_>>>()?;

    Ok(CostCenterPage {
        cost_centers,
        total_count,
        has_more,
    })
}

pub fn get_cost_center<S: KpiStore + ?Sized>(store: &S, id: Uuid) -> Result<CostCenterSummary> {
    let cost_center = require_cost_center(store, id)?;
    summarize(store, cost_center)
}

pub fn create_cost_center<S: KpiStore + ?Sized>(
    store: &mut S,
    config: &DashboardConfig,
    input: &CreateCostCenter,
) -> Result<CostCenter> {
    let name = normalize_name(&input.name, config)?;
    if cost_center_name_taken(store, &name, None)? {
        warn!("Rejected cost center with duplicate name '{}'", name);
        return Err(KpiError::DuplicateName(name));
    }

    let now = Utc::now();
    let cost_center = CostCenter {
        id: Uuid::new_v4(),
        name,
        status: input.status,
        created_at: now,
        updated_at: now,
    };
    store
        .insert_cost_center(&cost_center)
        .map_err(write_failure(&cost_center.name, "create cost center"))?;

    info!("Created cost center '{}' ({})", cost_center.name, cost_center.id);
    Ok(cost_center)
}

pub fn update_cost_center<S: KpiStore + ?Sized>(
    store: &mut S,
    config: &DashboardConfig,
    input: &UpdateCostCenter,
) -> Result<CostCenter> {
    let mut cost_center = require_cost_center(store, input.id)?;

    if let Some(name) = &input.name {
        let name = normalize_name(name, config)?;
        if cost_center_name_taken(store, &name, Some(cost_center.id))? {
            return Err(KpiError::DuplicateName(name));
        }
        cost_center.name = name;
    }
    if let Some(status) = input.status {
        cost_center.status = status;
    }

    cost_center.updated_at = Utc::now();
    match store.update_cost_center(&cost_center) {
        Ok(()) => {}
        Err(StoreError::MissingRow(_)) => {
            return Err(KpiError::CostCenterNotFound(cost_center.id.to_string()))
        }
        Err(e) => return Err(write_failure(&cost_center.name, "update cost center")(e)),
    }

    info!("Updated cost center '{}' ({})", cost_center.name, cost_center.id);
    Ok(cost_center)
}

pub fn delete_cost_center<S: KpiStore + ?Sized>(store: &mut S, id: Uuid) -> Result<Acknowledgement> {
    let summary = get_cost_center(store, id)?;
    if summary.client_count > 0 {
        warn!(
            "Blocked deletion of cost center '{}' with {} clients",
            summary.cost_center.name, summary.client_count
        );
        return Err(KpiError::DeleteBlocked(format!(
            "Cost center '{}' has {} clients and cannot be deleted",
            summary.cost_center.name, summary.client_count
        )));
    }

    store
        .delete_cost_center(id)
        .map_err(KpiError::storage("delete cost center"))?;

    info!("Deleted cost center '{}' ({})", summary.cost_center.name, id);
    Ok(Acknowledgement {
        success: true,
        message: format!("Cost center '{}' deleted", summary.cost_center.name),
    })
}

pub fn validate_cost_center_name<S: KpiStore + ?Sized>(
    store: &S,
    config: &DashboardConfig,
    input: &ValidateUniqueName,
) -> Result<UniqueNameCheck> {
    let name = normalize_name(&input.name, config)?;
    let taken = cost_center_name_taken(store, &name, input.exclude_id)?;
    Ok(UniqueNameCheck {
        is_unique: !taken,
        message: if taken {
            "A cost center with this name already exists".to_string()
        } else {
            "Name is available".to_string()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CreateEntry, KpiType};
    use crate::store::MemoryStore;
    use crate::ErrorCode;

    fn cost_center(store: &mut MemoryStore, name: &str) -> CostCenter {
        create_cost_center(
            store,
            &DashboardConfig::default(),
            &CreateCostCenter {
                name: name.to_string(),
                status: RecordStatus::Active,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_write_failure_maps_unique_violation_to_conflict() {
        let name = String::from("Acme");
        let err = write_failure(&name, "create client")(StoreError::UniqueViolation(
            "clients.name".to_string(),
        ));
        assert!(matches!(&err, KpiError::DuplicateName(n) if n == "Acme"));
        assert_eq!(err.code(), ErrorCode::Conflict);

        let err = write_failure(&name, "create client")(StoreError::Backend("disk full".to_string()));
        assert_eq!(err.code(), ErrorCode::Internal);
        assert!(!err.user_message().contains("disk full"));
    }

    #[test]
    fn test_client_names_are_trimmed_and_unique() {
        let mut store = MemoryStore::new();
        let config = DashboardConfig::default();

        let acme = create_client(&mut store, &config, &CreateClient::named("  Acme ")).unwrap();
        assert_eq!(acme.name, "Acme");

        let err = create_client(&mut store, &config, &CreateClient::named("Acme")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);

        let check = validate_client_name(
            &store,
            &config,
            &ValidateUniqueName {
                name: "Acme".to_string(),
                exclude_id: Some(acme.id),
            },
        )
        .unwrap();
        assert!(check.is_unique);

        let check = validate_client_name(
            &store,
            &config,
            &ValidateUniqueName {
                name: "Acme".to_string(),
                exclude_id: None,
            },
        )
        .unwrap();
        assert!(!check.is_unique);
    }

    #[test]
    fn test_client_requires_existing_cost_center() {
        let mut store = MemoryStore::new();
        let config = DashboardConfig::default();

        let mut input = CreateClient::named("Acme");
        input.cost_center_id = Some(Uuid::new_v4());
        let err = create_client(&mut store, &config, &input).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_update_client_moves_and_unassigns_cost_center() {
        let mut store = MemoryStore::new();
        let config = DashboardConfig::default();
        let north = cost_center(&mut store, "North");
        let acme = create_client(&mut store, &config, &CreateClient::named("Acme")).unwrap();

        let moved = update_client(
            &mut store,
            &config,
            &UpdateClient {
                id: acme.id,
                cost_center_id: Some(Some(north.id)),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(moved.cost_center_id, Some(north.id));
        assert_eq!(get_cost_center(&store, north.id).unwrap().client_count, 1);

        let renamed = update_client(
            &mut store,
            &config,
            &UpdateClient {
                id: acme.id,
                name: Some("Acme Logística".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(renamed.cost_center_id, Some(north.id));

        let unassigned = update_client(
            &mut store,
            &config,
            &UpdateClient {
                id: acme.id,
                cost_center_id: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(unassigned.cost_center_id, None);
    }

    #[test]
    fn test_budget_targets_are_validated() {
        let mut store = MemoryStore::new();
        let config = DashboardConfig::default();

        let mut input = CreateClient::named("Acme");
        input.budget.on_time = Some(150.0);
        assert_eq!(
            create_client(&mut store, &config, &input).unwrap_err().code(),
            ErrorCode::BadRequest
        );

        input.budget.on_time = Some(95.0);
        input.budget.revenue = Some(-1.0);
        assert_eq!(
            create_client(&mut store, &config, &input).unwrap_err().code(),
            ErrorCode::BadRequest
        );
    }

    #[test]
    fn test_client_with_entries_cannot_be_deleted() {
        let mut store = MemoryStore::new();
        let config = DashboardConfig::default();
        let acme = create_client(&mut store, &config, &CreateClient::named("Acme")).unwrap();
        let entry = crate::entries::create_entry(
            &mut store,
            &config,
            &CreateEntry {
                date: "2025-01-08".to_string(),
                client_id: acme.id,
                kpi_type: KpiType::Revenue,
                kpi_value: 100.0,
            },
        )
        .unwrap();

        let err = delete_client(&mut store, acme.id).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);

        crate::entries::delete_entry(&mut store, entry.id).unwrap();
        assert!(delete_client(&mut store, acme.id).unwrap().success);
        assert_eq!(
            get_client(&store, acme.id).unwrap_err().code(),
            ErrorCode::NotFound
        );
    }

    #[test]
    fn test_cost_center_with_clients_cannot_be_deleted() {
        let mut store = MemoryStore::new();
        let config = DashboardConfig::default();
        let north = cost_center(&mut store, "North");
        let mut input = CreateClient::named("Acme");
        input.cost_center_id = Some(north.id);
        let acme = create_client(&mut store, &config, &input).unwrap();

        assert_eq!(
            delete_cost_center(&mut store, north.id).unwrap_err().code(),
            ErrorCode::Conflict
        );

        delete_client(&mut store, acme.id).unwrap();
        assert!(delete_cost_center(&mut store, north.id).unwrap().success);
    }

    #[test]
    fn test_list_orders_active_first_and_searches() {
        let mut store = MemoryStore::new();
        let config = DashboardConfig::default();
        let mut dormant = CreateClient::named("Alpha");
        dormant.status = RecordStatus::Inactive;
        create_client(&mut store, &config, &dormant).unwrap();
        create_client(&mut store, &config, &CreateClient::named("Zeta Cargo")).unwrap();
        create_client(&mut store, &config, &CreateClient::named("Beta Cargo")).unwrap();

        let all = list_clients(&store, &config, &ListRecords::default()).unwrap();
        let names: Vec<&str> = all.clients.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Beta Cargo", "Zeta Cargo", "Alpha"]);

        let cargo = list_clients(
            &store,
            &config,
            &ListRecords {
                search: Some("CARGO".to_string()),
                limit: Some(1),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(cargo.total_count, 2);
        assert!(cargo.has_more);

        let stats = client_stats(&store).unwrap();
        assert_eq!((stats.total, stats.active, stats.inactive), (3, 2, 1));
    }

    #[test]
    fn test_cost_center_rename_conflict() {
        let mut store = MemoryStore::new();
        let config = DashboardConfig::default();
        cost_center(&mut store, "North");
        let south = cost_center(&mut store, "South");

        let err = update_cost_center(
            &mut store,
            &config,
            &UpdateCostCenter {
                id: south.id,
                name: Some(" North ".to_string()),
                status: None,
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);

        let page = list_cost_centers(&store, &config, &ListRecords::default()).unwrap();
        assert_eq!(page.total_count, 2);
        assert_eq!(page.cost_centers[0].cost_center.name, "North");
        assert_eq!(page.cost_centers[0].client_count, 0);
    }
}
