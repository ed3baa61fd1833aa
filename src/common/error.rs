use thiserror::Error;

/// Errors raised while planning or executing schema migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The database schema disagrees with the ledger, e.g. the table a
    /// migration creates already exists without the version being recorded.
    #[error("Schema conflict on table {table}: {reason}")]
    SchemaConflict { table: String, reason: String },

    /// The database could not be reached.
    #[error("Database connection unavailable")]
    Connectivity(#[source] sqlx::Error),

    #[error("Migration {version} is older than the latest applied migration {latest}")]
    OutOfOrder { version: i64, latest: i64 },

    #[error("Migration {version} ({name}) checksum mismatch: expected {expected}, found {found}")]
    ChecksumMismatch {
        version: i64,
        name: String,
        expected: String,
        found: String,
    },

    /// A statement inside a migration step failed; the step was rolled back.
    #[error("Migration {version} ({name}) failed")]
    StepFailed {
        version: i64,
        name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("No migration with version {0}")]
    UnknownVersion(i64),

    #[error("Migration {version} ({name}) has not been applied")]
    NotApplied { version: i64, name: String },

    #[error("Invalid migration set: {0}")]
    InvalidMigrations(String),

    #[error("Could not acquire migration lock {name} within {timeout_secs}s")]
    LockTimeout { name: String, timeout_secs: u64 },

    #[error("Database error")]
    Database(#[source] sqlx::Error),
}

impl MigrationError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, MigrationError::Connectivity(_))
    }

    /// Attributes a plain database failure to the migration step it broke.
    pub(crate) fn in_step(self, version: i64, name: &str) -> Self {
        match self {
            MigrationError::Database(source) => MigrationError::StepFailed {
                version,
                name: name.to_string(),
                source,
            },
            other => other,
        }
    }
}

impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => MigrationError::Connectivity(err),
            other => MigrationError::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_failures_are_connectivity_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = MigrationError::from(sqlx::Error::Io(io));
        assert!(err.is_connectivity());
        assert!(MigrationError::from(sqlx::Error::PoolTimedOut).is_connectivity());
    }

    #[test]
    fn database_failures_become_step_failures() {
        let err = MigrationError::from(sqlx::Error::RowNotFound).in_step(7, "create_things");
        match err {
            MigrationError::StepFailed { version, name, .. } => {
                assert_eq!(version, 7);
                assert_eq!(name, "create_things");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn connectivity_is_not_rewrapped_as_step_failure() {
        let err = MigrationError::from(sqlx::Error::PoolClosed).in_step(7, "create_things");
        assert!(err.is_connectivity());
    }
}
