use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::mysql::MySql;
use sqlx::pool::PoolConnection;
use sqlx::{Acquire, MySqlPool, Row};

use crate::backend::{
    applied_from_row, bind_ledger_write, ledger_write_sql, RowWrite, SchemaBackend,
};
use crate::common::error::MigrationError;
use crate::common::schema::{ColumnInfo, TableDefinition};
use crate::ddl::dialect::Dialect;
use crate::ddl::query::build_applied_versions_query;
use crate::migrate::migration::{AppliedMigration, LedgerWrite};

pub struct MySqlBackend {
    connection: PoolConnection<MySql>,
}

impl MySqlBackend {
    pub async fn new(pool: &MySqlPool) -> Result<Self, MigrationError> {
        let connection = pool.acquire().await?;
        Ok(MySqlBackend { connection })
    }
}

#[async_trait]
impl SchemaBackend for MySqlBackend {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn acquire_lock(&mut self, name: &str, timeout: Duration) -> Result<(), MigrationError> {
        debug!("Acquiring migration lock {}", name);

        let granted: Option<i64> = sqlx::query_scalar("SELECT GET_LOCK(?, ?)")
            .bind(name)
            .bind(timeout.as_secs() as i64)
            .fetch_one(&mut *self.connection)
            .await?;

        if granted != Some(1) {
            return Err(MigrationError::LockTimeout {
                name: name.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }

        Ok(())
    }

    async fn release_lock(&mut self, name: &str) -> Result<(), MigrationError> {
        let released: Option<i64> = sqlx::query_scalar("SELECT RELEASE_LOCK(?)")
            .bind(name)
            .fetch_one(&mut *self.connection)
            .await?;

        if released != Some(1) {
            warn!("Migration lock {} was not held when releasing it", name);
        }

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
        let query = "SELECT COUNT(*) FROM information_schema.tables \
                     WHERE table_schema = DATABASE() AND table_name = ?";

        let count: i64 = sqlx::query_scalar(query)
            .bind(table_name)
            .fetch_one(&mut *self.connection)
            .await?;

        Ok(count > 0)
    }

    async fn describe_table(&mut self, table_name: &str) -> Result<Vec<ColumnInfo>, MigrationError> {
        // information_schema exposes binary strings on some servers; cast them.
        let query = "SELECT CAST(COLUMN_NAME AS CHAR) AS column_name, \
                     CAST(COLUMN_TYPE AS CHAR) AS data_type, \
                     CAST(IS_NULLABLE AS CHAR) AS is_nullable, \
                     CAST(COLUMN_KEY AS CHAR) AS column_key \
                     FROM information_schema.columns \
                     WHERE table_schema = DATABASE() AND table_name = ? \
                     ORDER BY ORDINAL_POSITION";

        let rows = sqlx::query(query)
            .bind(table_name)
            .fetch_all(&mut *self.connection)
            .await?;

        rows.iter()
            .map(|row| -> Result<ColumnInfo, MigrationError> {
                let is_nullable: String = row.try_get("is_nullable")?;
                let column_key: String = row.try_get("column_key")?;

                Ok(ColumnInfo {
                    name: row.try_get("column_name")?,
                    data_type: row.try_get("data_type")?,
                    nullable: is_nullable.eq_ignore_ascii_case("yes"),
                    primary_key: column_key == "PRI",
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

        // MySQL commits DDL implicitly, so the ledger write below is the
        // only part the rollback can still undo.
        for statement in statements {
            if let Err(err) = sqlx::query(statement).execute(&mut *transaction).await {
                transaction.rollback().await?;
                return Err(err.into());
            }
        }

        let ledger_query = ledger_write_sql(dialect, ledger_table, ledger_write);
        let ledger_result = bind_ledger_write::<MySql>(&ledger_query, ledger_write)
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
            .query::<MySql>()
            .execute(&mut *self.connection)
            .await?;

        Ok(result.last_insert_id() as i64)
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
            .query::<MySql>()
            .bind(id)
            .execute(&mut *self.connection)
            .await?;

        Ok(result.rows_affected())
    }
}
