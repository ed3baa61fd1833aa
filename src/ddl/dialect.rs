use std::fmt;

use crate::common::schema::{ColumnSpec, ColumnType};

/// Length MySQL requires for a `string` column declared without one.
pub const DEFAULT_STRING_LIMIT: u32 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Sqlite,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Dialect::MySql => write!(f, "mysql"),
            Dialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl Dialect {
    pub fn quote(&self, identifier: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", identifier.replace('`', "``")),
            Dialect::Sqlite => format!("\"{}\"", identifier.replace('"', "\"\"")),
        }
    }

    pub fn column_type(&self, column_type: &ColumnType) -> String {
        match (self, column_type) {
            (Dialect::MySql, ColumnType::PrimaryKey) => "BIGINT".to_string(),
            (Dialect::Sqlite, ColumnType::PrimaryKey) => "INTEGER".to_string(),
            (Dialect::MySql, ColumnType::String { limit }) => {
                format!("VARCHAR({})", limit.unwrap_or(DEFAULT_STRING_LIMIT))
            }
            (Dialect::Sqlite, ColumnType::String { limit: None }) => "VARCHAR".to_string(),
            (Dialect::Sqlite, ColumnType::String { limit: Some(limit) }) => {
                format!("VARCHAR({})", limit)
            }
            (Dialect::MySql, ColumnType::Timestamp) => "DATETIME(6)".to_string(),
            (Dialect::Sqlite, ColumnType::Timestamp) => "DATETIME".to_string(),
        }
    }

    pub fn column_definition(&self, column: &ColumnSpec) -> String {
        let mut result_str = String::new();

        result_str.push_str(&self.quote(column.name));
        result_str.push(' ');
        result_str.push_str(&self.column_type(&column.column_type));

        if column.is_primary_key() {
            match self {
                Dialect::MySql => result_str.push_str(" NOT NULL AUTO_INCREMENT PRIMARY KEY"),
                Dialect::Sqlite => result_str.push_str(" PRIMARY KEY AUTOINCREMENT NOT NULL"),
            }
            return result_str;
        }

        result_str.push(' ');
        let nullable_property = if column.nullable { "NULL" } else { "NOT NULL" };
        result_str.push_str(nullable_property);

        result_str
    }

    /// DDL for the table recording applied migration versions.
    pub fn ledger_table(&self, ledger_table: &str) -> String {
        let applied_at_type = self.column_type(&ColumnType::Timestamp);

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             {} BIGINT NOT NULL PRIMARY KEY, \
             {} VARCHAR(255) NOT NULL, \
             {} VARCHAR(64) NOT NULL, \
             {} {} NOT NULL)",
            self.quote(ledger_table),
            self.quote("version"),
            self.quote("name"),
            self.quote("checksum"),
            self.quote("applied_at"),
            applied_at_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted_per_dialect() {
        assert_eq!(Dialect::MySql.quote("roles"), "`roles`");
        assert_eq!(Dialect::Sqlite.quote("roles"), "\"roles\"");
        assert_eq!(Dialect::MySql.quote("we`ird"), "`we``ird`");
    }

    #[test]
    fn unbounded_strings_get_mysql_default_length() {
        let column = ColumnSpec::string("alias");
        assert_eq!(
            Dialect::MySql.column_definition(&column),
            "`alias` VARCHAR(255) NULL"
        );
        assert_eq!(
            Dialect::Sqlite.column_definition(&column),
            "\"alias\" VARCHAR NULL"
        );
    }

    #[test]
    fn primary_key_is_auto_assigned() {
        let column = ColumnSpec::primary_key("id");
        assert_eq!(
            Dialect::MySql.column_definition(&column),
            "`id` BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY"
        );
        assert_eq!(
            Dialect::Sqlite.column_definition(&column),
            "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL"
        );
    }

    #[test]
    fn timestamps_are_not_null_datetimes() {
        let column = ColumnSpec::timestamp("created_at");
        assert_eq!(
            Dialect::MySql.column_definition(&column),
            "`created_at` DATETIME(6) NOT NULL"
        );
    }

    #[test]
    fn ledger_table_is_created_only_when_missing() {
        let ddl = Dialect::Sqlite.ledger_table("schema_migrations");
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"schema_migrations\""));
        assert!(ddl.contains("\"version\" BIGINT NOT NULL PRIMARY KEY"));
        assert!(ddl.contains("\"applied_at\" DATETIME NOT NULL"));
    }
}
