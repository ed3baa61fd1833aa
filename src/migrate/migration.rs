use std::collections::HashSet;

use chrono::NaiveDateTime;
use sha2::{Digest, Sha256};

use crate::common::error::MigrationError;
use crate::common::schema::TableDefinition;
use crate::ddl::dialect::Dialect;
use crate::ddl::query::{build_create_table_query, build_drop_table_query};

/// A declarative schema change. Each variant knows its inverse, so a
/// migration only describes its forward direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaChange {
    CreateTable(TableDefinition),
    DropTable(TableDefinition),
}

impl SchemaChange {
    pub fn reverse(&self) -> SchemaChange {
        match *self {
            SchemaChange::CreateTable(table) => SchemaChange::DropTable(table),
            SchemaChange::DropTable(table) => SchemaChange::CreateTable(table),
        }
    }

    pub fn table(&self) -> &TableDefinition {
        match self {
            SchemaChange::CreateTable(table) | SchemaChange::DropTable(table) => table,
        }
    }

    /// Whether the target table must exist before this change runs.
    pub fn requires_table(&self) -> bool {
        matches!(self, SchemaChange::DropTable(_))
    }

    pub fn statements(&self, dialect: Dialect) -> Vec<String> {
        match self {
            SchemaChange::CreateTable(table) => vec![build_create_table_query(dialect, table)],
            SchemaChange::DropTable(table) => vec![build_drop_table_query(dialect, table)],
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            SchemaChange::CreateTable(_) => "create_table",
            SchemaChange::DropTable(_) => "drop_table",
        }
    }
}

/// A versioned, one-shot schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub change: SchemaChange,
}

impl Migration {
    /// SHA-256 over everything that shapes the generated DDL, so editing an
    /// applied migration is caught on the next run.
    pub fn checksum(&self) -> String {
        let table = self.change.table();
        let mut hasher = Sha256::new();

        hasher.update(self.version.to_le_bytes());
        update_field(&mut hasher, self.name);
        update_field(&mut hasher, self.change.kind());
        update_field(&mut hasher, table.name);
        for column in table.columns() {
            update_field(&mut hasher, column.name);
            update_field(&mut hasher, &column.column_type.to_string());
            hasher.update([column.nullable as u8]);
        }

        hex::encode(hasher.finalize())
    }
}

// Length-prefixed so adjacent fields cannot shift bytes between each other.
fn update_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

/// A row of the migration ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
    pub applied_at: NaiveDateTime,
}

/// A single write against the ledger, executed in the same transaction as the
/// step's DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerWrite {
    Record(AppliedMigration),
    Remove { version: i64 },
}

/// Checks that versions are unique and strictly increasing.
pub fn validate_migrations(migrations: &[Migration]) -> Result<(), MigrationError> {
    let mut names = HashSet::new();

    for pair in migrations.windows(2) {
        if pair[1].version <= pair[0].version {
            return Err(MigrationError::InvalidMigrations(format!(
                "version {} ({}) must be greater than {} ({})",
                pair[1].version, pair[1].name, pair[0].version, pair[0].name
            )));
        }
    }

    for migration in migrations {
        if !names.insert(migration.name) {
            return Err(MigrationError::InvalidMigrations(format!(
                "duplicate migration name {}",
                migration.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::schema::ColumnSpec;

    const TAGS: TableDefinition = TableDefinition {
        name: "tags",
        columns: &[ColumnSpec::primary_key("id"), ColumnSpec::string("label")],
        timestamps: false,
    };

    const CREATE_TAGS: Migration = Migration {
        version: 1,
        name: "create_tags",
        change: SchemaChange::CreateTable(TAGS),
    };

    const DROP_TAGS: Migration = Migration {
        version: 2,
        name: "drop_tags",
        change: SchemaChange::DropTable(TAGS),
    };

    #[test]
    fn reverse_of_create_is_drop_of_same_table() {
        assert_eq!(CREATE_TAGS.change.reverse(), SchemaChange::DropTable(TAGS));
        assert_eq!(CREATE_TAGS.change.reverse().reverse(), CREATE_TAGS.change);
    }

    #[test]
    fn only_drops_require_an_existing_table() {
        assert!(!CREATE_TAGS.change.requires_table());
        assert!(DROP_TAGS.change.requires_table());
    }

    #[test]
    fn checksum_is_deterministic_and_hex_encoded() {
        let checksum = CREATE_TAGS.checksum();
        assert_eq!(checksum, CREATE_TAGS.checksum());
        assert_eq!(checksum.len(), 64);
        assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn checksum_changes_with_the_change_kind() {
        let same_version = Migration {
            version: 1,
            name: "create_tags",
            change: SchemaChange::DropTable(TAGS),
        };
        assert_ne!(CREATE_TAGS.checksum(), same_version.checksum());
    }

    #[test]
    fn checksum_separates_adjacent_names() {
        const SHIFTED: TableDefinition = TableDefinition {
            name: "tagsid",
            columns: &[ColumnSpec::primary_key(""), ColumnSpec::string("label")],
            timestamps: false,
        };
        let shifted = Migration {
            change: SchemaChange::CreateTable(SHIFTED),
            ..CREATE_TAGS
        };

        assert_ne!(CREATE_TAGS.checksum(), shifted.checksum());
    }

    #[test]
    fn validation_rejects_unsorted_versions() {
        let result = validate_migrations(&[DROP_TAGS, CREATE_TAGS]);
        assert!(matches!(result, Err(MigrationError::InvalidMigrations(_))));
    }

    #[test]
    fn validation_rejects_duplicate_names() {
        let renamed = Migration {
            version: 3,
            ..CREATE_TAGS
        };
        let result = validate_migrations(&[CREATE_TAGS, renamed]);
        assert!(matches!(result, Err(MigrationError::InvalidMigrations(_))));
    }

    #[test]
    fn validation_accepts_increasing_versions() {
        assert!(validate_migrations(&[CREATE_TAGS, DROP_TAGS]).is_ok());
    }
}
