use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::Sqlite;
use sqlx::{Acquire, Row, SqlitePool};

use crate::backend::{
    applied_from_row, bind_ledger_write, ledger_write_sql, RowWrite, SchemaBackend,
};
use crate::common::error::MigrationError;
use crate::common::schema::{ColumnInfo, TableDefinition};
use crate::ddl::dialect::Dialect;
use crate::ddl::query::build_applied_versions_query;
use crate::migrate::migration::{AppliedMigration, LedgerWrite};

pub struct SqliteBackend {
    connection: PoolConnection<Sqlite>,
}

impl SqliteBackend {
    pub async fn new(pool: &SqlitePool) -> Result<Self, MigrationError> {
        let connection = pool.acquire().await?;
        Ok(SqliteBackend { connection })
    }
}

#[async_trait]
impl SchemaBackend for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    // The single held connection plus SQLite's file lock already serialize
    // writers; there is no named lock to take.
    async fn acquire_lock(&mut self, name: &str, _timeout: Duration) -> Result<(), MigrationError> {
        debug!("Migration lock {} is implicit on SQLite", name);
        Ok(())
    }

    async fn release_lock(&mut self, _name: &str) -> Result<(), MigrationError> {
        Ok(())
    }

    async fn ensure_ledger(&mut self, ledger_table: &str) -> Result<(), MigrationError> {
        let query = self.dialect().ledger_table(ledger_table);

        sqlx::query(&query).execute(&mut *self.connection).await?;

        Ok(())
    }

    async fn applied_migrations(
        &mut self,
        ledger_table: &str,
    ) -> Result<Vec<AppliedMigration>, MigrationError> {
        let query = build_applied_versions_query(self.dialect(), ledger_table);

        let rows = sqlx::query(&query)
            .fetch_all(&mut *self.connection)
            .await?;

        rows.iter().map(applied_from_row).collect()
    }

    async fn table_exists(&mut self, table_name: &str) -> Result<bool, MigrationError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table_name)
                .fetch_one(&mut *self.connection)
                .await?;

        Ok(count > 0)
    }

    async fn describe_table(&mut self, table_name: &str) -> Result<Vec<ColumnInfo>, MigrationError> {
        let rows = sqlx::query(
            "SELECT name, type AS data_type, \"notnull\" AS not_null, pk FROM pragma_table_info(?) ORDER BY cid",
        )
        .bind(table_name)
        .fetch_all(&mut *self.connection)
        .await?;

        rows.iter()
            .map(|row| -> Result<ColumnInfo, MigrationError> {
                let not_null: i64 = row.try_get("not_null")?;
                let pk: i64 = row.try_get("pk")?;

                Ok(ColumnInfo {
                    name: row.try_get("name")?,
                    data_type: row.try_get("data_type")?,
                    nullable: not_null == 0 && pk == 0,
                    primary_key: pk > 0,
                })
            })
            .collect()
    }

    async fn execute_step(
        &mut self,
        statements: &[String],
        ledger_table: &str,
        ledger_write: &LedgerWrite,
    ) -> Result<(), MigrationError> {
        let dialect = self.dialect();
        let mut transaction = self.connection.begin().await?;

        for statement in statements {
            if let Err(err) = sqlx::query(statement).execute(&mut *transaction).await {
                transaction.rollback().await?;
                return Err(err.into());
            }
        }

        let ledger_query = ledger_write_sql(dialect, ledger_table, ledger_write);
        let ledger_result = bind_ledger_write::<Sqlite>(&ledger_query, ledger_write)
            .execute(&mut *transaction)
            .await;

        if let Err(err) = ledger_result {
            transaction.rollback().await?;
            return Err(err.into());
        }

        transaction.commit().await?;
        Ok(())
    }

    async fn insert_row(
        &mut self,
        table: &TableDefinition,
        values: &[(&str, Option<String>)],
        now: NaiveDateTime,
    ) -> Result<i64, MigrationError> {
        let write = RowWrite::insert(self.dialect(), table, values, now)?;

        let result = write
            .query::<Sqlite>()
            .execute(&mut *self.connection)
            .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update_row(
        &mut self,
        table: &TableDefinition,
        id: i64,
        values: &[(&str, Option<String>)],
        now: NaiveDateTime,
    ) -> Result<u64, MigrationError> {
        let write = RowWrite::update(self.dialect(), table, values, now)?;

        let result = write
            .query::<Sqlite>()
            .bind(id)
            .execute(&mut *self.connection)
            .await?;

        Ok(result.rows_affected())
    }
}
