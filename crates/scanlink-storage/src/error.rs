use thiserror::Error;

/// Storage-specific error types for the employee directory.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Entity not found in database
    #[error("Entity not found: {entity_type} with {field}={value}")]
    NotFound {
        entity_type: String,
        field: String,
        value: String,
    },

    /// A uniqueness or check constraint rejected the write
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backend refused the operation (e.g. injected failure in the memory directory)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub(crate) fn employee_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: "Employee".to_string(),
            field: "employeeid".to_string(),
            value: id.to_string(),
        }
    }

    /// Map sqlx errors, separating constraint violations from other failures.
    pub(crate) fn from_write(error: sqlx::Error) -> Self {
        match error.as_database_error() {
            Some(db) if db.is_unique_violation() || db.is_check_violation() => {
                Self::Constraint(db.message().to_string())
            }
            _ => Self::Database(error),
        }
    }
}

impl From<StorageError> for scanlink_core::Error {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound {
                entity_type, value, ..
            } => scanlink_core::Error::NotFound {
                entity: entity_type,
                id: value,
            },
            other => scanlink_core::Error::Persistence(other.to_string()),
        }
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_core_not_found() {
        let error: scanlink_core::Error = StorageError::employee_not_found(7).into();
        assert_eq!(error, scanlink_core::Error::not_found("Employee", 7));
    }

    #[test]
    fn test_other_errors_map_to_persistence() {
        let error: scanlink_core::Error = StorageError::Constraint("UNIQUE".into()).into();
        assert!(matches!(error, scanlink_core::Error::Persistence(_)));

        let error: scanlink_core::Error = StorageError::Unavailable("down".into()).into();
        assert_eq!(
            error,
            scanlink_core::Error::Persistence("Storage unavailable: down".into())
        );
    }
}
