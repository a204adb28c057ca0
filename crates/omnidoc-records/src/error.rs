use thiserror::Error;

/// Errors produced by record operations.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    /// A unique column already holds the submitted value.
    #[error("{0}")]
    Duplicate(String),
}

impl RecordError {
    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub(crate) fn required(field: &str) -> Self {
        Self::Validation(format!("{} is required", field))
    }
}

/// Returns `true` when `err` is a UNIQUE/PRIMARY KEY constraint failure.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

/// Trims an optional string and turns blank values into `None`.
pub(crate) fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Returns the trimmed value of a required field.
pub(crate) fn require(value: &Option<String>, field: &str) -> Result<String, RecordError> {
    non_blank(value).ok_or_else(|| RecordError::required(field))
}
