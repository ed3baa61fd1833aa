use std::fmt;

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

const TIMESTAMP_COLUMNS: [ColumnSpec; 2] = [
    ColumnSpec::timestamp(CREATED_AT),
    ColumnSpec::timestamp(UPDATED_AT),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-assigned integer primary key.
    PrimaryKey,
    /// Variable-length text, optionally bounded.
    String { limit: Option<u32> },
    Timestamp,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ColumnType::PrimaryKey => write!(f, "primary_key"),
            ColumnType::String { limit: None } => write!(f, "string"),
            ColumnType::String { limit: Some(limit) } => write!(f, "string({})", limit),
            ColumnType::Timestamp => write!(f, "timestamp"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl ColumnSpec {
    pub const fn primary_key(name: &'static str) -> Self {
        ColumnSpec {
            name,
            column_type: ColumnType::PrimaryKey,
            nullable: false,
        }
    }

    pub const fn string(name: &'static str) -> Self {
        ColumnSpec {
            name,
            column_type: ColumnType::String { limit: None },
            nullable: true,
        }
    }

    pub const fn timestamp(name: &'static str) -> Self {
        ColumnSpec {
            name,
            column_type: ColumnType::Timestamp,
            nullable: false,
        }
    }

    pub fn is_primary_key(&self) -> bool {
        self.column_type == ColumnType::PrimaryKey
    }
}

/// Immutable description of a table: explicit columns plus, when
/// `timestamps` is set, the `created_at`/`updated_at` audit pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
    pub timestamps: bool,
}

impl TableDefinition {
    pub fn columns(&self) -> Vec<ColumnSpec> {
        let mut columns = self.columns.to_vec();
        if self.timestamps {
            columns.extend_from_slice(&TIMESTAMP_COLUMNS);
        }
        columns
    }

    pub fn primary_key(&self) -> Option<&'static ColumnSpec> {
        self.columns.iter().find(|column| column.is_primary_key())
    }

    /// Columns a caller supplies values for on insert, i.e. everything except
    /// the auto-assigned key and the stamped timestamps.
    pub fn writable_columns(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|column| !column.is_primary_key())
            .map(|column| column.name)
            .collect()
    }

    /// Compares the definition with columns read back from a live database.
    pub fn diff(&self, live: &[ColumnInfo]) -> Vec<ColumnDiff> {
        let expected = self.columns();
        let mut diffs = Vec::new();

        for column in &expected {
            match live
                .iter()
                .find(|info| info.name.eq_ignore_ascii_case(column.name))
            {
                None => diffs.push(ColumnDiff::Missing(column.name.to_string())),
                Some(info) => {
                    if info.nullable != column.nullable {
                        diffs.push(ColumnDiff::Nullability {
                            column: column.name.to_string(),
                            expected: column.nullable,
                            found: info.nullable,
                        });
                    }
                    if info.primary_key != column.is_primary_key() {
                        diffs.push(ColumnDiff::PrimaryKey {
                            column: column.name.to_string(),
                            expected: column.is_primary_key(),
                            found: info.primary_key,
                        });
                    }
                }
            }
        }

        for info in live {
            if !expected
                .iter()
                .any(|column| column.name.eq_ignore_ascii_case(&info.name))
            {
                diffs.push(ColumnDiff::Unexpected(info.name.clone()));
            }
        }

        diffs
    }
}

/// A column as reported by the database's catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnDiff {
    Missing(String),
    Unexpected(String),
    Nullability {
        column: String,
        expected: bool,
        found: bool,
    },
    PrimaryKey {
        column: String,
        expected: bool,
        found: bool,
    },
}

impl fmt::Display for ColumnDiff {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ColumnDiff::Missing(column) => write!(f, "column {} is missing", column),
            ColumnDiff::Unexpected(column) => write!(f, "column {} is not defined", column),
            ColumnDiff::Nullability {
                column,
                expected,
                found,
            } => write!(
                f,
                "column {} nullable: expected {}, found {}",
                column, expected, found
            ),
            ColumnDiff::PrimaryKey {
                column,
                expected,
                found,
            } => write!(
                f,
                "column {} primary key: expected {}, found {}",
                column, expected, found
            ),
        }
    }
}
