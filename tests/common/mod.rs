#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use schema_migrator::backend::SqliteBackend;
use schema_migrator::migrate::migration::Migration;
use schema_migrator::migrate::migration_options::MigrationOptions;
use schema_migrator::migrate::migrator::DatabaseMigrator;
use schema_migrator::migrations;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tempfile::TempDir;

pub const LEDGER: &str = "schema_migrations";

/// A SQLite database file in its own temporary directory. `raw` is a
/// separate pool for inspecting or tampering with the database behind the
/// migrator's back.
pub struct TestDatabase {
    _dir: TempDir,
    pub path: PathBuf,
    migrator_pool: SqlitePool,
    pub raw: SqlitePool,
}

impl TestDatabase {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("test.sqlite3");

        let migrator_pool = connect(&path, 2).await;
        let raw = connect(&path, 1).await;

        TestDatabase {
            _dir: dir,
            path,
            migrator_pool,
            raw,
        }
    }

    pub async fn migrator(&self) -> DatabaseMigrator<SqliteBackend> {
        self.migrator_with(migrations::all(), options(false)).await
    }

    pub async fn migrator_with(
        &self,
        migrations: Vec<Migration>,
        options: MigrationOptions,
    ) -> DatabaseMigrator<SqliteBackend> {
        let backend = SqliteBackend::new(&self.migrator_pool)
            .await
            .expect("Failed to acquire connection");

        DatabaseMigrator::new(backend, migrations, options).expect("Invalid migrations")
    }

    pub async fn table_exists(&self, table_name: &str) -> bool {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table_name)
                .fetch_one(&self.raw)
                .await
                .expect("Failed to query sqlite_master");
        count > 0
    }

    pub async fn ledger_versions(&self) -> Vec<i64> {
        sqlx::query_scalar(&format!("SELECT version FROM {} ORDER BY version", LEDGER))
            .fetch_all(&self.raw)
            .await
            .expect("Failed to read ledger")
    }

    pub async fn execute(&self, sql: &str) {
        sqlx::query(sql)
            .execute(&self.raw)
            .await
            .unwrap_or_else(|err| panic!("Failed to execute {sql}: {err}"));
    }
}

pub fn options(dry_run: bool) -> MigrationOptions {
    MigrationOptions::new(LEDGER, Duration::from_secs(1), dry_run)
}

async fn connect(path: &PathBuf, max_connections: u32) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .expect("Failed to open SQLite database")
}
