pub mod migration;
pub mod migration_options;
pub mod migration_result;
pub mod migrator;
