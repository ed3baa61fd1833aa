use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::database::HasArguments;
use sqlx::query::Query;
use sqlx::{ColumnIndex, Database, Decode, Encode, Row, Type};

use crate::common::error::MigrationError;
use crate::common::schema::{ColumnInfo, TableDefinition};
use crate::common::timestamps::Timestamps;
use crate::ddl::dialect::Dialect;
use crate::ddl::query::{
    build_insert_statement, build_record_version_query, build_remove_version_query,
    build_update_statement,
};
use crate::migrate::migration::{AppliedMigration, LedgerWrite};

pub mod mysql;
pub mod sqlite;

pub use self::mysql::MySqlBackend;
pub use self::sqlite::SqliteBackend;

/// A database session the migrator drives. Implementations hold one
/// connection for their whole lifetime so session-scoped locks stay valid.
#[async_trait]
pub trait SchemaBackend: Send {
    fn dialect(&self) -> Dialect;

    async fn acquire_lock(&mut self, name: &str, timeout: Duration) -> Result<(), MigrationError>;

    async fn release_lock(&mut self, name: &str) -> Result<(), MigrationError>;

    async fn ensure_ledger(&mut self, ledger_table: &str) -> Result<(), MigrationError>;

    async fn applied_migrations(
        &mut self,
        ledger_table: &str,
    ) -> Result<Vec<AppliedMigration>, MigrationError>;

    async fn table_exists(&mut self, table_name: &str) -> Result<bool, MigrationError>;

    async fn describe_table(&mut self, table_name: &str) -> Result<Vec<ColumnInfo>, MigrationError>;

    /// Runs `statements` followed by the ledger write as one transaction.
    async fn execute_step(
        &mut self,
        statements: &[String],
        ledger_table: &str,
        ledger_write: &LedgerWrite,
    ) -> Result<(), MigrationError>;

    /// Inserts a row, stamping `created_at`/`updated_at` when the table
    /// carries timestamps. Returns the assigned key.
    async fn insert_row(
        &mut self,
        table: &TableDefinition,
        values: &[(&str, Option<String>)],
        now: NaiveDateTime,
    ) -> Result<i64, MigrationError>;

    /// Updates the row with key `id`, stamping only `updated_at`. Returns the
    /// number of rows changed.
    async fn update_row(
        &mut self,
        table: &TableDefinition,
        id: i64,
        values: &[(&str, Option<String>)],
        now: NaiveDateTime,
    ) -> Result<u64, MigrationError>;
}

/// A parameterized row write with its bind values in order: caller values,
/// then timestamp stamps, then (for updates) the key.
pub(crate) struct RowWrite {
    pub(crate) sql: String,
    pub(crate) values: Vec<Option<String>>,
    pub(crate) stamps: Vec<NaiveDateTime>,
}

impl RowWrite {
    pub(crate) fn insert(
        dialect: Dialect,
        table: &TableDefinition,
        values: &[(&str, Option<String>)],
        now: NaiveDateTime,
    ) -> Result<Self, MigrationError> {
        check_writable(table, values)?;
        let stamps = if table.timestamps {
            Timestamps::at(now).on_insert().to_vec()
        } else {
            Vec::new()
        };

        Ok(RowWrite::new(values, stamps, |columns| {
            build_insert_statement(dialect, table.name, columns)
        }))
    }

    pub(crate) fn update(
        dialect: Dialect,
        table: &TableDefinition,
        values: &[(&str, Option<String>)],
        now: NaiveDateTime,
    ) -> Result<Self, MigrationError> {
        let key = table
            .primary_key()
            .ok_or_else(|| MigrationError::SchemaConflict {
                table: table.name.to_string(),
                reason: "table has no primary key to update by".to_string(),
            })?;
        check_writable(table, values)?;
        let stamps = if table.timestamps {
            Timestamps::at(now).on_update().to_vec()
        } else {
            Vec::new()
        };

        Ok(RowWrite::new(values, stamps, |columns| {
            build_update_statement(dialect, table.name, columns, key.name)
        }))
    }

    /// Binds the write's values and stamps; updates still bind the key.
    pub(crate) fn query<'q, DB>(&'q self) -> Query<'q, DB, <DB as HasArguments<'q>>::Arguments>
    where
        DB: Database,
        Option<String>: Encode<'q, DB> + Type<DB>,
        NaiveDateTime: Encode<'q, DB> + Type<DB>,
    {
        let mut query = sqlx::query(&self.sql);
        for value in &self.values {
            query = query.bind(value.clone());
        }
        for stamp in &self.stamps {
            query = query.bind(*stamp);
        }
        query
    }

    fn new(
        values: &[(&str, Option<String>)],
        stamps: Vec<(&'static str, NaiveDateTime)>,
        build: impl FnOnce(&[&str]) -> String,
    ) -> Self {
        let columns: Vec<&str> = values
            .iter()
            .map(|(column, _)| *column)
            .chain(stamps.iter().map(|(column, _)| *column))
            .collect();

        RowWrite {
            sql: build(&columns),
            values: values.iter().map(|(_, value)| value.clone()).collect(),
            stamps: stamps.into_iter().map(|(_, stamp)| stamp).collect(),
        }
    }
}

pub(crate) fn ledger_write_sql(
    dialect: Dialect,
    ledger_table: &str,
    ledger_write: &LedgerWrite,
) -> String {
    match ledger_write {
        LedgerWrite::Record(_) => build_record_version_query(dialect, ledger_table),
        LedgerWrite::Remove { .. } => build_remove_version_query(dialect, ledger_table),
    }
}

pub(crate) fn bind_ledger_write<'q, DB>(
    sql: &'q str,
    ledger_write: &'q LedgerWrite,
) -> Query<'q, DB, <DB as HasArguments<'q>>::Arguments>
where
    DB: Database,
    i64: Encode<'q, DB> + Type<DB>,
    &'q str: Encode<'q, DB> + Type<DB>,
    NaiveDateTime: Encode<'q, DB> + Type<DB>,
{
    let query = sqlx::query(sql);

    match ledger_write {
        LedgerWrite::Record(applied) => query
            .bind(applied.version)
            .bind(applied.name.as_str())
            .bind(applied.checksum.as_str())
            .bind(applied.applied_at),
        LedgerWrite::Remove { version } => query.bind(*version),
    }
}

pub(crate) fn applied_from_row<R>(row: &R) -> Result<AppliedMigration, MigrationError>
where
    R: Row,
    &'static str: ColumnIndex<R>,
    i64: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    String: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    NaiveDateTime: for<'r> Decode<'r, R::Database> + Type<R::Database>,
{
    Ok(AppliedMigration {
        version: row.try_get("version")?,
        name: row.try_get("name")?,
        checksum: row.try_get("checksum")?,
        applied_at: row.try_get("applied_at")?,
    })
}

// The key is assigned by the database and the timestamps by the hook.
fn check_writable(
    table: &TableDefinition,
    values: &[(&str, Option<String>)],
) -> Result<(), MigrationError> {
    let writable = table.writable_columns();

    match values
        .iter()
        .find(|(column, _)| !writable.iter().any(|name| name == column))
    {
        Some((column, _)) => Err(MigrationError::SchemaConflict {
            table: table.name.to_string(),
            reason: format!("column {} cannot be written directly", column),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::migrations::ROLES;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(8, 30, 0))
            .unwrap()
    }

    #[test]
    fn insert_appends_both_timestamps() {
        let write = RowWrite::insert(
            Dialect::Sqlite,
            &ROLES,
            &[("name", Some("admin".to_string())), ("alias", None)],
            now(),
        )
        .unwrap();

        assert_eq!(
            write.sql,
            "INSERT INTO \"roles\" (\"name\", \"alias\", \"created_at\", \"updated_at\") \
             VALUES (?, ?, ?, ?)"
        );
        assert_eq!(write.values, vec![Some("admin".to_string()), None]);
        assert_eq!(write.stamps, vec![now(), now()]);
    }

    #[test]
    fn update_stamps_only_updated_at() {
        let write = RowWrite::update(
            Dialect::MySql,
            &ROLES,
            &[("alias", Some("adm".to_string()))],
            now(),
        )
        .unwrap();

        assert_eq!(
            write.sql,
            "UPDATE `roles` SET `alias` = ?, `updated_at` = ? WHERE `id` = ?"
        );
        assert_eq!(write.stamps, vec![now()]);
    }

    #[test]
    fn insert_rejects_key_and_timestamp_columns() {
        for column in ["id", "created_at", "updated_at", "missing"] {
            let result = RowWrite::insert(
                Dialect::Sqlite,
                &ROLES,
                &[(column, Some("1".to_string()))],
                now(),
            );
            assert!(
                matches!(result, Err(MigrationError::SchemaConflict { .. })),
                "{column} should not be writable"
            );
        }
    }

    #[test]
    fn update_rejects_created_at() {
        let result = RowWrite::update(
            Dialect::MySql,
            &ROLES,
            &[("created_at", Some("2019-09-02 19:15:52".to_string()))],
            now(),
        );
        assert!(matches!(result, Err(MigrationError::SchemaConflict { .. })));
    }

    #[test]
    fn ledger_write_picks_insert_or_delete() {
        let record = LedgerWrite::Record(AppliedMigration {
            version: 20190902191552,
            name: "create_user_role".to_string(),
            checksum: "abc".to_string(),
            applied_at: now(),
        });
        let remove = LedgerWrite::Remove {
            version: 20190902191552,
        };

        assert!(ledger_write_sql(Dialect::Sqlite, "schema_migrations", &record)
            .starts_with("INSERT INTO \"schema_migrations\""));
        assert!(ledger_write_sql(Dialect::MySql, "schema_migrations", &remove)
            .starts_with("DELETE FROM `schema_migrations`"));
    }

    #[test]
    fn update_requires_a_primary_key() {
        let keyless = TableDefinition {
            name: "keyless",
            columns: &[],
            timestamps: false,
        };
        let result = RowWrite::update(Dialect::MySql, &keyless, &[], now());
        assert!(matches!(result, Err(MigrationError::SchemaConflict { .. })));
    }
}
