//! Creates `roles`: two free-form text attributes plus audit timestamps.

use crate::common::schema::{ColumnSpec, TableDefinition};
use crate::migrate::migration::{Migration, SchemaChange};

pub const ROLES: TableDefinition = TableDefinition {
    name: "roles",
    columns: &[
        ColumnSpec::primary_key("id"),
        ColumnSpec::string("name"),
        ColumnSpec::string("alias"),
    ],
    timestamps: true,
};

pub const CREATE_USER_ROLE: Migration = Migration {
    version: 20190902191552,
    name: "create_user_role",
    change: SchemaChange::CreateTable(ROLES),
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::schema::ColumnType;
    use crate::ddl::dialect::Dialect;

    #[test]
    fn roles_has_the_five_expected_columns() {
        let columns: Vec<(&str, bool)> = ROLES
            .columns()
            .iter()
            .map(|column| (column.name, column.nullable))
            .collect();

        assert_eq!(
            columns,
            vec![
                ("id", false),
                ("name", true),
                ("alias", true),
                ("created_at", false),
                ("updated_at", false),
            ]
        );
    }

    #[test]
    fn text_columns_are_unconstrained() {
        for column in ROLES.columns().iter().filter(|c| !c.is_primary_key()) {
            if let ColumnType::String { limit } = column.column_type {
                assert_eq!(limit, None, "column {} should have no limit", column.name);
            }
        }
    }

    #[test]
    fn renders_mysql_ddl() {
        assert_eq!(
            CREATE_USER_ROLE.change.statements(Dialect::MySql),
            vec![
                "CREATE TABLE `roles` (\
                 `id` BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY, \
                 `name` VARCHAR(255) NULL, \
                 `alias` VARCHAR(255) NULL, \
                 `created_at` DATETIME(6) NOT NULL, \
                 `updated_at` DATETIME(6) NOT NULL)"
                    .to_string()
            ]
        );
    }

    #[test]
    fn reverts_by_dropping_the_table() {
        assert_eq!(
            CREATE_USER_ROLE.change.reverse().statements(Dialect::Sqlite),
            vec!["DROP TABLE \"roles\"".to_string()]
        );
    }
}
