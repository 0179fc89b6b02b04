use serde::Serialize;
use thiserror::Error;

/// Fatal, batch-level: the table does not carry the columns the import needs.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("missing required columns: {}", missing.join(", "))]
pub struct SchemaError {
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("score must be a number between 0 and 100, got {0}")]
pub struct InvalidScore(pub String);

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScaleError {
    #[error("grade scale has no bands")]
    Empty,
    #[error("band {index}: {message}")]
    BadBand { index: usize, message: String },
    #[error("lowest band must start at 0 so every score maps to a grade")]
    NotTotal,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store query failed: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
#[error("credential hashing failed: {0}")]
pub struct CredentialError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowErrorReason {
    MissingField,
    InvalidScore,
    Store,
    Credential,
    KindMismatch,
}

impl RowErrorReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingField => "missing_field",
            Self::InvalidScore => "invalid_score",
            Self::Store => "store",
            Self::Credential => "credential",
            Self::KindMismatch => "kind_mismatch",
        }
    }
}

/// Row-level failure. Counted and retained, never propagated past the row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub line: usize,
    pub reason: RowErrorReason,
    pub message: String,
}

impl RowError {
    pub fn new(line: usize, reason: RowErrorReason, message: impl Into<String>) -> Self {
        Self {
            line,
            reason,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("course offering upsert failed: {0}")]
    Offering(#[source] StoreError),
    #[error("invalid batch context: {0}")]
    InvalidContext(String),
}

impl ImportError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Schema(_) => "schema_error",
            Self::Offering(_) => "db_update_failed",
            Self::InvalidContext(_) => "bad_params",
        }
    }
}
