use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// How a KPI type folds several values into one figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Currency amounts add up.
    Sum,
    /// Percentages are averaged over the values that exist.
    Mean,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KpiType {
    #[schemars(description = "Daily revenue in BRL. Non-negative monetary amount.")]
    Revenue,

    #[schemars(description = "Share of deliveries completed on time, 0-100.")]
    OnTime,

    #[schemars(description = "Fleet occupancy rate, 0-100.")]
    Occupancy,

    #[schemars(description = "Share of volume moved by third-party carriers, 0-100.")]
    ThirdParty,

    #[schemars(description = "Fleet availability rate, 0-100.")]
    Availability,
}

impl KpiType {
    pub const ALL: [KpiType; 5] = [
        KpiType::Revenue,
        KpiType::OnTime,
        KpiType::Occupancy,
        KpiType::ThirdParty,
        KpiType::Availability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KpiType::Revenue => "REVENUE",
            KpiType::OnTime => "ON_TIME",
            KpiType::Occupancy => "OCCUPANCY",
            KpiType::ThirdParty => "THIRD_PARTY",
            KpiType::Availability => "AVAILABILITY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kpi| kpi.as_str() == value)
    }

    pub fn title(&self) -> &'static str {
        match self {
            KpiType::Revenue => "Receita",
            KpiType::OnTime => "On Time",
            KpiType::Occupancy => "Ocupação",
            KpiType::ThirdParty => "Terceiro",
            KpiType::Availability => "Disponibilidade",
        }
    }

    pub fn is_currency(&self) -> bool {
        matches!(self, KpiType::Revenue)
    }

    pub fn aggregation(&self) -> Aggregation {
        if self.is_currency() {
            Aggregation::Sum
        } else {
            Aggregation::Mean
        }
    }
}

impl fmt::Display for KpiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    #[default]
    Active,
    Inactive,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "ACTIVE",
            RecordStatus::Inactive => "INACTIVE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(RecordStatus::Active),
            "INACTIVE" => Some(RecordStatus::Inactive),
            _ => None,
        }
    }
}

/// Monthly targets a client is measured against.
///
/// Revenue is a monthly amount and gets pro-rated by day; the percentage
/// targets already describe a single day and are used as-is. Third-party
/// usage carries no target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BudgetTargets {
    #[serde(default)]
    #[schemars(description = "Monthly revenue budget in BRL.")]
    pub revenue: Option<f64>,

    #[serde(default)]
    #[schemars(description = "On-time target percentage, 0-100.")]
    pub on_time: Option<f64>,

    #[serde(default)]
    #[schemars(description = "Occupancy target percentage, 0-100.")]
    pub occupancy: Option<f64>,

    #[serde(default)]
    #[schemars(description = "Availability target percentage, 0-100.")]
    pub availability: Option<f64>,
}

impl BudgetTargets {
    pub fn target(&self, kpi_type: KpiType) -> Option<f64> {
        match kpi_type {
            KpiType::Revenue => self.revenue,
            KpiType::OnTime => self.on_time,
            KpiType::Occupancy => self.occupancy,
            KpiType::ThirdParty => None,
            KpiType::Availability => self.availability,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub status: RecordStatus,
    pub cost_center_id: Option<Uuid>,
    /// Key accounts get their own pivot row instead of folding into their cost center.
    pub is_key_account: bool,
    pub budget: BudgetTargets,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CostCenter {
    pub id: Uuid,
    pub name: String,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CostCenterSummary {
    #[serde(flatten)]
    pub cost_center: CostCenter,
    pub client_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KpiEntry {
    pub id: Uuid,
    pub date: NaiveDate,
    pub client_id: Uuid,
    pub kpi_type: KpiType,
    pub kpi_value: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row about to be inserted; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewKpiEntry {
    pub date: NaiveDate,
    pub client_id: Uuid,
    pub kpi_type: KpiType,
    pub kpi_value: f64,
}

// ---------------------------------------------------------------------------
// Daily entry form
// ---------------------------------------------------------------------------

/// One client's row in the daily entry form. An absent field means "no value".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KpiFormEntry {
    pub client_id: Uuid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Revenue in BRL, >= 0.")]
    pub revenue: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "On-time percentage, 0-100.")]
    pub on_time: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Occupancy percentage, 0-100.")]
    pub occupancy: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Third-party usage percentage, 0-100.")]
    pub third_party: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Availability percentage, 0-100.")]
    pub availability: Option<f64>,
}

impl KpiFormEntry {
    pub fn new(client_id: Uuid) -> Self {
        Self {
            client_id,
            ..Default::default()
        }
    }

    pub fn value(&self, kpi_type: KpiType) -> Option<f64> {
        match kpi_type {
            KpiType::Revenue => self.revenue,
            KpiType::OnTime => self.on_time,
            KpiType::Occupancy => self.occupancy,
            KpiType::ThirdParty => self.third_party,
            KpiType::Availability => self.availability,
        }
    }

    pub fn set_value(&mut self, kpi_type: KpiType, value: f64) {
        let slot = match kpi_type {
            KpiType::Revenue => &mut self.revenue,
            KpiType::OnTime => &mut self.on_time,
            KpiType::Occupancy => &mut self.occupancy,
            KpiType::ThirdParty => &mut self.third_party,
            KpiType::Availability => &mut self.availability,
        };
        *slot = Some(value);
    }

    pub fn with(mut self, kpi_type: KpiType, value: f64) -> Self {
        self.set_value(kpi_type, value);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KpiFormData {
    #[schemars(description = "Date in YYYY-MM-DD format.")]
    pub date: String,
    pub entries: Vec<KpiFormEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpsertResponse {
    pub success: bool,
    pub message: String,
    pub entries: Vec<KpiEntry>,
    pub form_projection: KpiFormData,
    pub stats: UpsertStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DailySnapshot {
    pub entries: Vec<KpiEntry>,
    pub form_projection: KpiFormData,
}

// ---------------------------------------------------------------------------
// Procedure inputs
// ---------------------------------------------------------------------------

/// Distinguishes a missing field (`None`) from an explicit `null` (`Some(None)`).
fn deserialize_present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpsertDailySnapshot {
    #[schemars(description = "Date in YYYY-MM-DD format.")]
    pub date: String,
    #[schemars(
        description = "Full snapshot of the date for the listed clients. KPI fields left out are deleted if they were stored before."
    )]
    pub entries: Vec<KpiFormEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetDailySnapshot {
    pub date: String,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub kpi_type: Option<KpiType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntry {
    pub date: String,
    pub client_id: Uuid,
    pub kpi_type: KpiType,
    pub kpi_value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntry {
    pub id: Uuid,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub kpi_type: Option<KpiType>,
    #[serde(default)]
    pub kpi_value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListEntries {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub kpi_type: Option<KpiType>,
    #[serde(default)]
    #[schemars(description = "Page size, 1-100. Defaults to 50.")]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntryPage {
    pub entries: Vec<KpiEntry>,
    pub total_count: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeletedEntry {
    pub id: Uuid,
    pub date: NaiveDate,
    pub kpi_type: KpiType,
    pub client_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntryStats {
    pub total: usize,
    pub today: usize,
    pub this_week: usize,
    pub this_month: usize,
    pub by_kpi_type: std::collections::BTreeMap<KpiType, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthQuery {
    #[schemars(description = "Month in YYYY-MM format.")]
    pub month: String,
    #[serde(default)]
    pub client_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthEntries {
    pub entries: Vec<KpiEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummaryQuery {
    #[schemars(description = "Reference date, YYYY-MM-DD. Days past the end of the month are clamped.")]
    pub date: String,
    #[serde(default)]
    pub client_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub cost_center_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateClient {
    pub name: String,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default)]
    pub cost_center_id: Option<Uuid>,
    #[serde(default)]
    pub is_key_account: bool,
    #[serde(default)]
    pub budget: BudgetTargets,
}

impl CreateClient {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: RecordStatus::Active,
            cost_center_id: None,
            is_key_account: false,
            budget: BudgetTargets::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClient {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<RecordStatus>,
    #[serde(default, deserialize_with = "deserialize_present")]
    #[schemars(
        with = "Option<Uuid>",
        description = "New cost center. Omit to keep the current one, null to unassign."
    )]
    pub cost_center_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub is_key_account: Option<bool>,
    #[serde(default)]
    pub budget: Option<BudgetTargets>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListRecords {
    #[serde(default)]
    pub status: Option<RecordStatus>,
    #[serde(default)]
    #[schemars(description = "Case-insensitive substring matched against the name.")]
    pub search: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientPage {
    pub clients: Vec<Client>,
    pub total_count: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CostCenterPage {
    pub cost_centers: Vec<CostCenterSummary>,
    pub total_count: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateUniqueName {
    pub name: String,
    #[serde(default)]
    pub exclude_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UniqueNameCheck {
    pub is_unique: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCostCenter {
    pub name: String,
    #[serde(default)]
    pub status: RecordStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCostCenter {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<RecordStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ById {
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    pub success: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kpi_type_wire_names() {
        let json = serde_json::to_string(&KpiType::ThirdParty).unwrap();
        assert_eq!(json, "\"THIRD_PARTY\"");
        for kpi in KpiType::ALL {
            assert_eq!(KpiType::parse(kpi.as_str()), Some(kpi));
        }
        assert_eq!(KpiType::parse("RECEITA"), None);
    }

    #[test]
    fn test_form_entry_absent_fields_stay_absent() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"clientId":"{}","revenue":0}}"#, id);
        let entry: KpiFormEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry.revenue, Some(0.0));
        assert_eq!(entry.on_time, None);

        let back = serde_json::to_string(&entry).unwrap();
        assert!(back.contains("\"revenue\":0"));
        assert!(!back.contains("onTime"));
    }

    #[test]
    fn test_update_client_distinguishes_null_from_missing() {
        let id = Uuid::new_v4();

        let missing: UpdateClient =
            serde_json::from_str(&format!(r#"{{"id":"{}"}}"#, id)).unwrap();
        assert_eq!(missing.cost_center_id, None);

        let cleared: UpdateClient =
            serde_json::from_str(&format!(r#"{{"id":"{}","costCenterId":null}}"#, id)).unwrap();
        assert_eq!(cleared.cost_center_id, Some(None));
    }

    #[test]
    fn test_third_party_has_no_budget_target() {
        let budget = BudgetTargets {
            revenue: Some(3000.0),
            on_time: Some(95.0),
            occupancy: Some(80.0),
            availability: Some(90.0),
        };
        assert_eq!(budget.target(KpiType::Revenue), Some(3000.0));
        assert_eq!(budget.target(KpiType::ThirdParty), None);
    }
}
