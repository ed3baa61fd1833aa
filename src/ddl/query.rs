use crate::common::schema::TableDefinition;
use crate::ddl::dialect::Dialect;

pub fn build_create_table_query(dialect: Dialect, table: &TableDefinition) -> String {
    let columns = table
        .columns()
        .iter()
        .map(|column| dialect.column_definition(column))
        .collect::<Vec<_>>()
        .join(", ");

    format!("CREATE TABLE {} ({})", dialect.quote(table.name), columns)
}

pub fn build_drop_table_query(dialect: Dialect, table: &TableDefinition) -> String {
    format!("DROP TABLE {}", dialect.quote(table.name))
}

pub fn build_insert_statement(dialect: Dialect, table_name: &str, columns: &[&str]) -> String {
    let column_names_string = columns
        .iter()
        .map(|column| dialect.quote(column))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        dialect.quote(table_name),
        column_names_string,
        placeholders
    )
}

pub fn build_update_statement(
    dialect: Dialect,
    table_name: &str,
    columns: &[&str],
    key_column: &str,
) -> String {
    let assignments = columns
        .iter()
        .map(|column| format!("{} = ?", dialect.quote(column)))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "UPDATE {} SET {} WHERE {} = ?",
        dialect.quote(table_name),
        assignments,
        dialect.quote(key_column)
    )
}

pub fn build_record_version_query(dialect: Dialect, ledger_table: &str) -> String {
    build_insert_statement(
        dialect,
        ledger_table,
        &["version", "name", "checksum", "applied_at"],
    )
}

pub fn build_remove_version_query(dialect: Dialect, ledger_table: &str) -> String {
    format!(
        "DELETE FROM {} WHERE {} = ?",
        dialect.quote(ledger_table),
        dialect.quote("version")
    )
}

pub fn build_applied_versions_query(dialect: Dialect, ledger_table: &str) -> String {
    format!(
        "SELECT version, name, checksum, applied_at FROM {} ORDER BY version ASC",
        dialect.quote(ledger_table)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::schema::ColumnSpec;

    const NOTES: TableDefinition = TableDefinition {
        name: "notes",
        columns: &[ColumnSpec::primary_key("id"), ColumnSpec::string("body")],
        timestamps: true,
    };

    #[test]
    fn create_table_lists_every_column_in_order() {
        assert_eq!(
            build_create_table_query(Dialect::MySql, &NOTES),
            "CREATE TABLE `notes` (\
             `id` BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY, \
             `body` VARCHAR(255) NULL, \
             `created_at` DATETIME(6) NOT NULL, \
             `updated_at` DATETIME(6) NOT NULL)"
        );
    }

    #[test]
    fn drop_table_is_not_guarded() {
        assert_eq!(
            build_drop_table_query(Dialect::Sqlite, &NOTES),
            "DROP TABLE \"notes\""
        );
    }

    #[test]
    fn insert_uses_positional_placeholders() {
        assert_eq!(
            build_insert_statement(Dialect::Sqlite, "notes", &["body", "created_at"]),
            "INSERT INTO \"notes\" (\"body\", \"created_at\") VALUES (?, ?)"
        );
    }

    #[test]
    fn update_binds_key_last() {
        assert_eq!(
            build_update_statement(Dialect::MySql, "notes", &["body", "updated_at"], "id"),
            "UPDATE `notes` SET `body` = ?, `updated_at` = ? WHERE `id` = ?"
        );
    }

    #[test]
    fn ledger_queries_target_configured_table() {
        assert_eq!(
            build_remove_version_query(Dialect::MySql, "schema_migrations"),
            "DELETE FROM `schema_migrations` WHERE `version` = ?"
        );
        assert!(build_record_version_query(Dialect::MySql, "history")
            .starts_with("INSERT INTO `history` (`version`, `name`, `checksum`, `applied_at`)"));
    }
}
