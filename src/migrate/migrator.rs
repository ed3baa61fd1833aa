use std::collections::HashMap;

use chrono::Utc;
use tokio::time::Instant;

use crate::backend::SchemaBackend;
use crate::common::error::MigrationError;
use crate::common::helpers::format_seconds;
use crate::common::schema::ColumnDiff;
use crate::migrate::migration::{
    validate_migrations, AppliedMigration, LedgerWrite, Migration, SchemaChange,
};
use crate::migrate::migration_options::MigrationOptions;
use crate::migrate::migration_result::{Direction, MigrationResult, MigrationStatus, StepOutcome};

/// Applies and reverts [`Migration`]s against one database, recording each
/// applied version in the ledger table.
///
/// Every public operation takes the migration lock, reads the whole ledger,
/// checks the checksums of applied migrations, and only then plans its steps.
/// Steps run strictly one after another.
pub struct DatabaseMigrator<B: SchemaBackend> {
    backend: B,
    migrations: Vec<Migration>,
    options: MigrationOptions,
    // Table existence after the steps a dry run has planned so far.
    planned_tables: HashMap<&'static str, bool>,
}

impl<B: SchemaBackend> DatabaseMigrator<B> {
    pub fn new(
        backend: B,
        migrations: Vec<Migration>,
        options: MigrationOptions,
    ) -> Result<Self, MigrationError> {
        validate_migrations(&migrations)?;

        Ok(DatabaseMigrator {
            backend,
            migrations,
            options,
            planned_tables: HashMap::new(),
        })
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Applies every pending migration in ascending version order.
    pub async fn run(&mut self) -> Result<Vec<MigrationResult>, MigrationError> {
        self.acquire_lock().await?;
        let result = self.run_pending(None).await;
        self.release_lock(result).await
    }

    /// Applies the migration with `version` alone.
    pub async fn apply(&mut self, version: i64) -> Result<MigrationResult, MigrationError> {
        self.acquire_lock().await?;
        let result = self.apply_version(version).await;
        self.release_lock(result).await
    }

    /// Reverts the migration with `version` alone.
    pub async fn revert(&mut self, version: i64) -> Result<MigrationResult, MigrationError> {
        self.acquire_lock().await?;
        let result = self.revert_version(version).await;
        self.release_lock(result).await
    }

    /// Reverts the `steps` most recently applied migrations, newest first.
    pub async fn rollback(&mut self, steps: usize) -> Result<Vec<MigrationResult>, MigrationError> {
        self.acquire_lock().await?;
        let result = self.rollback_steps(steps).await;
        self.release_lock(result).await
    }

    /// Reverts the `steps` most recently applied migrations and applies them
    /// again.
    pub async fn redo(&mut self, steps: usize) -> Result<Vec<MigrationResult>, MigrationError> {
        self.acquire_lock().await?;
        let result = self.redo_steps(steps).await;
        self.release_lock(result).await
    }

    /// Moves the schema to `target`: reverts applied migrations above it,
    /// then applies pending ones up to and including it. A target of 0
    /// reverts everything.
    pub async fn migrate_to(&mut self, target: i64) -> Result<Vec<MigrationResult>, MigrationError> {
        self.acquire_lock().await?;
        let result = self.migrate_to_target(target).await;
        self.release_lock(result).await
    }

    pub async fn status(&mut self) -> Result<Vec<MigrationStatus>, MigrationError> {
        self.acquire_lock().await?;
        let result = self.load_ledger().await.map(|applied| self.plan_status(&applied));
        self.release_lock(result).await
    }

    /// Highest applied version, or 0 when nothing has been applied.
    pub async fn current_version(&mut self) -> Result<i64, MigrationError> {
        self.acquire_lock().await?;
        let result = self.load_ledger().await.map(|applied| latest_version(&applied));
        self.release_lock(result).await
    }

    /// Compares every table created by an applied migration with the live
    /// database. Returns the differences per table; empty when all match.
    pub async fn verify(&mut self) -> Result<Vec<(String, Vec<ColumnDiff>)>, MigrationError> {
        self.acquire_lock().await?;
        let result = self.verify_tables().await;
        self.release_lock(result).await
    }

    async fn acquire_lock(&mut self) -> Result<(), MigrationError> {
        self.planned_tables.clear();
        self.backend
            .acquire_lock(&self.options.lock_name, self.options.lock_timeout)
            .await
    }

    async fn release_lock<T>(
        &mut self,
        result: Result<T, MigrationError>,
    ) -> Result<T, MigrationError> {
        let released = self.backend.release_lock(&self.options.lock_name).await;

        let value = result?;
        released?;
        Ok(value)
    }

    async fn load_ledger(&mut self) -> Result<Vec<AppliedMigration>, MigrationError> {
        self.backend.ensure_ledger(&self.options.ledger_table).await?;
        let applied = self
            .backend
            .applied_migrations(&self.options.ledger_table)
            .await?;

        for applied_migration in &applied {
            if let Some(migration) = self.find(applied_migration.version) {
                let current_checksum = migration.checksum();
                if current_checksum != applied_migration.checksum {
                    return Err(MigrationError::ChecksumMismatch {
                        version: applied_migration.version,
                        name: applied_migration.name.clone(),
                        expected: applied_migration.checksum.clone(),
                        found: current_checksum,
                    });
                }
            } else {
                warn!(
                    "Applied migration {} ({}) has no definition",
                    applied_migration.version, applied_migration.name
                );
            }
        }

        Ok(applied)
    }

    fn find(&self, version: i64) -> Option<Migration> {
        self.migrations
            .iter()
            .find(|migration| migration.version == version)
            .copied()
    }

    fn find_known(&self, version: i64) -> Result<Migration, MigrationError> {
        self.find(version)
            .ok_or(MigrationError::UnknownVersion(version))
    }

    async fn run_pending(
        &mut self,
        up_to: Option<i64>,
    ) -> Result<Vec<MigrationResult>, MigrationError> {
        let applied = self.load_ledger().await?;
        self.apply_pending(&applied, up_to).await
    }

    async fn apply_pending(
        &mut self,
        applied: &[AppliedMigration],
        up_to: Option<i64>,
    ) -> Result<Vec<MigrationResult>, MigrationError> {
        let pending: Vec<Migration> = self
            .migrations
            .iter()
            .filter(|migration| !is_applied(applied, migration.version))
            .filter(|migration| up_to.map_or(true, |target| migration.version <= target))
            .copied()
            .collect();

        if pending.is_empty() {
            info!("Schema is up to date at version {}", latest_version(applied));
            return Ok(Vec::new());
        }

        // Refuse the whole plan rather than stopping halfway through it.
        for migration in &pending {
            check_order(migration, applied)?;
        }

        let start_time = Instant::now();
        let mut results = Vec::with_capacity(pending.len());

        for migration in pending {
            results.push(self.apply_step(&migration, applied).await?);
        }

        info!(
            "Migrations finished, total time took: {}",
            format_seconds(start_time.elapsed())
        );

        Ok(results)
    }

    async fn apply_version(&mut self, version: i64) -> Result<MigrationResult, MigrationError> {
        let applied = self.load_ledger().await?;
        let migration = self.find_known(version)?;

        self.apply_step(&migration, &applied).await
    }

    async fn revert_version(&mut self, version: i64) -> Result<MigrationResult, MigrationError> {
        let applied = self.load_ledger().await?;
        let migration = self.find_known(version)?;

        self.revert_step(&migration, &applied).await
    }

    async fn rollback_steps(
        &mut self,
        steps: usize,
    ) -> Result<Vec<MigrationResult>, MigrationError> {
        let applied = self.load_ledger().await?;
        self.rollback_from(&applied, steps).await
    }

    async fn rollback_from(
        &mut self,
        applied: &[AppliedMigration],
        steps: usize,
    ) -> Result<Vec<MigrationResult>, MigrationError> {
        let versions: Vec<i64> = applied
            .iter()
            .rev()
            .take(steps)
            .map(|applied_migration| applied_migration.version)
            .collect();

        if versions.is_empty() {
            info!("Nothing to roll back");
            return Ok(Vec::new());
        }

        self.revert_all(&versions, applied).await
    }

    async fn redo_steps(&mut self, steps: usize) -> Result<Vec<MigrationResult>, MigrationError> {
        let applied = self.load_ledger().await?;
        let mut results = self.rollback_from(&applied, steps).await?;
        if results.is_empty() {
            return Ok(results);
        }

        // The ledger as it stands after the rollback, whether or not it ran.
        let remaining = without_reverted(&applied, &results);
        let mut reverted: Vec<i64> = results.iter().map(|result| result.version).collect();
        reverted.sort_unstable();

        for version in reverted {
            let migration = self.find_known(version)?;
            results.push(self.apply_step(&migration, &remaining).await?);
        }

        Ok(results)
    }

    async fn migrate_to_target(
        &mut self,
        target: i64,
    ) -> Result<Vec<MigrationResult>, MigrationError> {
        // Version 0 means "before the first migration".
        if target != 0 {
            self.find_known(target)?;
        }
        let applied = self.load_ledger().await?;

        let above_target: Vec<i64> = applied
            .iter()
            .rev()
            .map(|applied_migration| applied_migration.version)
            .filter(|version| *version > target)
            .collect();

        let mut results = self.revert_all(&above_target, &applied).await?;
        let remaining = without_reverted(&applied, &results);
        results.extend(self.apply_pending(&remaining, Some(target)).await?);

        Ok(results)
    }

    async fn revert_all(
        &mut self,
        versions: &[i64],
        applied: &[AppliedMigration],
    ) -> Result<Vec<MigrationResult>, MigrationError> {
        // Resolve everything first so an unknown version reverts nothing.
        let migrations = versions
            .iter()
            .map(|version| self.find_known(*version))
            .collect::<Result<Vec<_>, _>>()?;

        let mut results = Vec::with_capacity(migrations.len());
        for migration in migrations {
            results.push(self.revert_step(&migration, applied).await?);
        }

        Ok(results)
    }

    async fn apply_step(
        &mut self,
        migration: &Migration,
        applied: &[AppliedMigration],
    ) -> Result<MigrationResult, MigrationError> {
        if is_applied(applied, migration.version) {
            debug!(
                "Skipping migration {} ({}): already applied",
                migration.version, migration.name
            );
            return Ok(result(migration, Direction::Up, StepOutcome::AlreadyApplied));
        }

        check_order(migration, applied)?;
        self.check_table_state(migration, &migration.change).await?;

        let ledger_write = LedgerWrite::Record(AppliedMigration {
            version: migration.version,
            name: migration.name.to_string(),
            checksum: migration.checksum(),
            applied_at: Utc::now().naive_utc(),
        });

        self.execute(migration, &migration.change, Direction::Up, ledger_write)
            .await
    }

    async fn revert_step(
        &mut self,
        migration: &Migration,
        applied: &[AppliedMigration],
    ) -> Result<MigrationResult, MigrationError> {
        let change = migration.change.reverse();

        self.check_table_state(migration, &change).await?;

        if !is_applied(applied, migration.version) {
            return Err(MigrationError::NotApplied {
                version: migration.version,
                name: migration.name.to_string(),
            });
        }

        let ledger_write = LedgerWrite::Remove {
            version: migration.version,
        };

        self.execute(migration, &change, Direction::Down, ledger_write)
            .await
    }

    async fn execute(
        &mut self,
        migration: &Migration,
        change: &SchemaChange,
        direction: Direction,
        ledger_write: LedgerWrite,
    ) -> Result<MigrationResult, MigrationError> {
        let statements = change.statements(self.backend.dialect());

        if self.options.dry_run {
            info!(
                "Dry run, migration {} ({}) {} would execute:",
                migration.version, migration.name, direction
            );
            for statement in &statements {
                info!("  {};", statement);
            }
            self.planned_tables
                .insert(change.table().name, !change.requires_table());
            return Ok(result(migration, direction, StepOutcome::Planned));
        }

        info!(
            "Running migration {} ({}) {} on {}",
            migration.version,
            migration.name,
            direction,
            self.backend.dialect()
        );

        let start_time = Instant::now();

        self.backend
            .execute_step(&statements, &self.options.ledger_table, &ledger_write)
            .await
            .map_err(|err| err.in_step(migration.version, migration.name))?;

        info!(
            "Migration {} ({}) {} finished, took: {}",
            migration.version,
            migration.name,
            direction,
            format_seconds(start_time.elapsed())
        );

        let outcome = match direction {
            Direction::Up => StepOutcome::Applied,
            Direction::Down => StepOutcome::Reverted,
        };

        Ok(result(migration, direction, outcome))
    }

    async fn check_table_state(
        &mut self,
        migration: &Migration,
        change: &SchemaChange,
    ) -> Result<(), MigrationError> {
        let table_name = change.table().name;
        let exists = match self.planned_tables.get(table_name) {
            Some(planned) => *planned,
            None => self.backend.table_exists(table_name).await?,
        };

        if change.requires_table() && !exists {
            return Err(MigrationError::SchemaConflict {
                table: table_name.to_string(),
                reason: format!(
                    "table does not exist, migration {} ({}) cannot drop it",
                    migration.version, migration.name
                ),
            });
        }

        if !change.requires_table() && exists {
            return Err(MigrationError::SchemaConflict {
                table: table_name.to_string(),
                reason: format!(
                    "table already exists but migration {} ({}) is not recorded as applied",
                    migration.version, migration.name
                ),
            });
        }

        Ok(())
    }

    fn plan_status(&self, applied: &[AppliedMigration]) -> Vec<MigrationStatus> {
        let mut statuses: Vec<MigrationStatus> = self
            .migrations
            .iter()
            .map(|migration| MigrationStatus {
                version: migration.version,
                name: Some(migration.name.to_string()),
                direction: if is_applied(applied, migration.version) {
                    Direction::Up
                } else {
                    Direction::Down
                },
            })
            .collect();

        statuses.extend(
            applied
                .iter()
                .filter(|applied_migration| self.find(applied_migration.version).is_none())
                .map(|applied_migration| MigrationStatus {
                    version: applied_migration.version,
                    name: None,
                    direction: Direction::Up,
                }),
        );

        statuses.sort_by_key(|status| status.version);
        statuses
    }

    async fn verify_tables(&mut self) -> Result<Vec<(String, Vec<ColumnDiff>)>, MigrationError> {
        let applied = self.load_ledger().await?;
        let mut report = Vec::new();

        let created: Vec<Migration> = self
            .migrations
            .iter()
            .filter(|migration| is_applied(&applied, migration.version))
            .filter(|migration| matches!(migration.change, SchemaChange::CreateTable(_)))
            .copied()
            .collect();

        for migration in created {
            let table = *migration.change.table();
            let live = self.backend.describe_table(table.name).await?;
            let diffs = table.diff(&live);

            if diffs.is_empty() {
                debug!("Table {} matches migration {}", table.name, migration.version);
            } else {
                for diff in &diffs {
                    warn!("Table {}: {}", table.name, diff);
                }
                report.push((table.name.to_string(), diffs));
            }
        }

        Ok(report)
    }
}

fn is_applied(applied: &[AppliedMigration], version: i64) -> bool {
    applied
        .iter()
        .any(|applied_migration| applied_migration.version == version)
}

fn without_reverted(
    applied: &[AppliedMigration],
    reverted: &[MigrationResult],
) -> Vec<AppliedMigration> {
    applied
        .iter()
        .filter(|applied_migration| {
            !reverted
                .iter()
                .any(|result| result.version == applied_migration.version)
        })
        .cloned()
        .collect()
}

fn latest_version(applied: &[AppliedMigration]) -> i64 {
    applied
        .iter()
        .map(|applied_migration| applied_migration.version)
        .max()
        .unwrap_or(0)
}

fn check_order(migration: &Migration, applied: &[AppliedMigration]) -> Result<(), MigrationError> {
    let latest = latest_version(applied);

    if migration.version < latest {
        return Err(MigrationError::OutOfOrder {
            version: migration.version,
            latest,
        });
    }

    Ok(())
}

fn result(migration: &Migration, direction: Direction, outcome: StepOutcome) -> MigrationResult {
    MigrationResult {
        version: migration.version,
        name: migration.name.to_string(),
        direction,
        outcome,
    }
}
