use std::time::Duration;

pub const DEFAULT_LEDGER_TABLE: &str = "schema_migrations";
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub(crate) ledger_table: String,
    pub(crate) lock_name: String,
    pub(crate) lock_timeout: Duration,
    pub(crate) dry_run: bool,
}

impl MigrationOptions {
    pub fn new(ledger_table: &str, lock_timeout: Duration, dry_run: bool) -> Self {
        MigrationOptions {
            ledger_table: ledger_table.to_string(),
            lock_name: format!("{}_lock", ledger_table),
            lock_timeout,
            dry_run,
        }
    }
}

impl Default for MigrationOptions {
    fn default() -> Self {
        MigrationOptions::new(DEFAULT_LEDGER_TABLE, DEFAULT_LOCK_TIMEOUT, false)
    }
}
