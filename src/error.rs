use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error classes surfaced to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    Conflict,
    BadRequest,
    Internal,
}

#[derive(Error, Debug)]
pub enum KpiError {
    #[error("Client not found: {0}")]
    ClientNotFound(String),

    #[error("One or more clients were not found: {0:?}")]
    ClientsNotFound(Vec<String>),

    #[error("Cost center not found: {0}")]
    CostCenterNotFound(String),

    #[error("KPI entry not found: {0}")]
    EntryNotFound(String),

    #[error("Name already in use: {0}")]
    DuplicateName(String),

    #[error("An entry already exists for {date}, client {client_id}, type {kpi_type}")]
    DuplicateEntry {
        date: String,
        client_id: String,
        kpi_type: String,
    },

    #[error("Delete blocked: {0}")]
    DeleteBlocked(String),

    #[error("Invalid value {value} for {kpi_type}: {details}")]
    InvalidValue {
        kpi_type: String,
        value: f64,
        details: String,
    },

    #[error("Validation error on {field}: {details}")]
    Validation { field: String, details: String },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Storage failure during {context}: {source}")]
    Internal {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl KpiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ClientNotFound(_)
            | Self::ClientsNotFound(_)
            | Self::CostCenterNotFound(_)
            | Self::EntryNotFound(_) => ErrorCode::NotFound,
            Self::DuplicateName(_) | Self::DuplicateEntry { .. } | Self::DeleteBlocked(_) => {
                ErrorCode::Conflict
            }
            Self::InvalidValue { .. }
            | Self::Validation { .. }
            | Self::BadRequest(_)
            | Self::DateError(_) => ErrorCode::BadRequest,
            Self::Internal { .. } | Self::SerializationError(_) | Self::IoError(_) => {
                ErrorCode::Internal
            }
        }
    }

    /// Short message safe to show to an end user. Storage details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::ClientNotFound(_) => "Client not found".to_string(),
            Self::ClientsNotFound(_) => "One or more clients were not found".to_string(),
            Self::CostCenterNotFound(_) => "Cost center not found".to_string(),
            Self::EntryNotFound(_) => "KPI entry not found".to_string(),
            Self::DuplicateName(_) => "A record with this name already exists".to_string(),
            Self::DuplicateEntry { .. } => {
                "An entry already exists for this client, date and KPI type".to_string()
            }
            Self::DeleteBlocked(reason) => reason.clone(),
            Self::InvalidValue { details, .. } => details.clone(),
            Self::Validation { details, .. } => details.clone(),
            Self::BadRequest(details) => details.clone(),
            Self::DateError(details) => details.clone(),
            Self::Internal { context, .. } => format!("Failed to {}", context),
            Self::SerializationError(_) => "Failed to encode the response".to_string(),
            Self::IoError(_) => "Failed to read or write a local file".to_string(),
        }
    }

    pub(crate) fn validation(field: &str, details: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            details: details.into(),
        }
    }

    pub(crate) fn storage(context: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| {
            log::error!("Storage failure while trying to {}: {}", context, source);
            Self::Internal { context, source }
        }
    }
}

/// Failures reported by an entity store implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Row not found: {0}")]
    MissingRow(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        match &value {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::UniqueViolation(value.to_string())
            }
            rusqlite::Error::QueryReturnedNoRows => Self::MissingRow(value.to_string()),
            _ => Self::Backend(value.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, KpiError>;
