#[macro_use]
extern crate log;

use std::io::Write;
use std::path::Path;
use std::{env, fs, process, thread};

use anyhow::{Context, Result};
use chrono::Local;
use env_logger::Env;
use structopt::StructOpt;
use toml::Value;

use schema_migrator::backend::{MySqlBackend, SchemaBackend, SqliteBackend};
use schema_migrator::common::helpers::{humanize, print_error_chain};
use schema_migrator::config::{Config, DatabaseConfig, SettingsConfig};
use schema_migrator::connection::{
    DatabaseConnectionFactory, SqlxMySqlConnection, SqlxSqliteConnection,
};
use schema_migrator::migrate::migration_options::MigrationOptions;
use schema_migrator::migrate::migration_result::{MigrationResult, MigrationStatus};
use schema_migrator::migrate::migrator::DatabaseMigrator;
use schema_migrator::migrations;

use crate::args::{Args, Command};

mod args;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(errors) = init().await.with_context(|| "Command failed") {
        print_error_chain(&errors);
        process::exit(1);
    }
}

async fn init() -> Result<()> {
    let options = Args::from_args();

    initialize_logger(options.verbose, options.quiet);

    let config = load_config(&options.config).context("Failed to load config file")?;
    let settings = config.settings().clone();

    debug!("Known migrations: {}", migrations::MIGRATIONS.len());
    info!("Initializing connection...");

    match config.database() {
        DatabaseConfig::MySql(mysql_config) => {
            let connection = DatabaseConnectionFactory::<SqlxMySqlConnection>::new(
                mysql_config.clone(),
                settings.connect_attempts,
                settings.connect_retry_delay,
            )
            .create_connection()
            .await?;
            let backend = MySqlBackend::new(&connection.pool).await?;
            run_command(backend, &settings, options).await
        }
        DatabaseConfig::Sqlite(sqlite_config) => {
            let connection = DatabaseConnectionFactory::<SqlxSqliteConnection>::new(
                sqlite_config.clone(),
                settings.connect_attempts,
                settings.connect_retry_delay,
            )
            .create_connection()
            .await?;
            let backend = SqliteBackend::new(&connection.pool).await?;
            run_command(backend, &settings, options).await
        }
    }
}

async fn run_command<B: SchemaBackend>(
    backend: B,
    settings: &SettingsConfig,
    options: Args,
) -> Result<()> {
    let migration_options = MigrationOptions::new(
        &settings.ledger_table,
        settings.lock_timeout,
        options.dry_run,
    );

    let mut migrator = DatabaseMigrator::new(backend, migrations::all(), migration_options)?;

    match options.command {
        Command::Migrate { to: None } => {
            let results = migrator.run().await.context("Migration failed")?;
            report(&results);
        }
        Command::Migrate { to: Some(version) } => {
            let results = migrator
                .migrate_to(version)
                .await
                .with_context(|| format!("Migration to version {} failed", version))?;
            report(&results);
        }
        Command::Rollback { steps } => {
            let results = migrator.rollback(steps).await.context("Rollback failed")?;
            report(&results);
        }
        Command::Redo { steps } => {
            let results = migrator.redo(steps).await.context("Redo failed")?;
            report(&results);
        }
        Command::Up { version } => {
            let result = migrator
                .apply(version)
                .await
                .with_context(|| format!("Applying migration {} failed", version))?;
            report(&[result]);
        }
        Command::Down { version } => {
            let result = migrator
                .revert(version)
                .await
                .with_context(|| format!("Reverting migration {} failed", version))?;
            report(&[result]);
        }
        Command::Status => {
            let statuses = migrator.status().await.context("Reading status failed")?;
            print_status(&settings.ledger_table, &statuses);
        }
        Command::Version => {
            let version = migrator
                .current_version()
                .await
                .context("Reading version failed")?;
            println!("Current version: {}", version);
        }
        Command::Verify => {
            let mismatches = migrator.verify().await.context("Verification failed")?;
            if !mismatches.is_empty() {
                anyhow::bail!("{} table(s) differ from their migrations", mismatches.len());
            }
            info!("All migrated tables match their definitions");
        }
    }

    Ok(())
}

fn report(results: &[MigrationResult]) {
    for result in results {
        debug!(
            "{} ({}) {}: {:?}",
            result.version, result.name, result.direction, result.outcome
        );
    }
}

fn print_status(ledger_table: &str, statuses: &[MigrationStatus]) {
    println!();
    println!("database ledger: {}", ledger_table);
    println!();
    println!(" Status   Migration ID    Migration Name");
    println!("--------------------------------------------------");

    for status in statuses {
        let name = status
            .name
            .as_deref()
            .map(humanize)
            .unwrap_or_else(|| "********** NO FILE **********".to_string());

        println!(
            "{:>6}    {:<14}  {}",
            status.direction.to_string(),
            status.version,
            name
        );
    }

    println!();
}

fn initialize_logger(verbose: bool, quiet: bool) {
    // Set the `RUST_LOG` environment variable to control the logging level

    if quiet {
        env::set_var("RUST_LOG", "warn");
    } else {
        env::set_var("RUST_LOG", if verbose { "debug" } else { "info" });
    }

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .filter_module("sqlx", log::LevelFilter::Error)
        .format(|buf, record| {
            let timestamp = Local::now().format("%H:%M:%S");

            writeln!(
                buf,
                "{} {:<5} [{}] - {}",
                timestamp,
                record.level(),
                thread::current().name().unwrap_or("<unnamed>"),
                record.args()
            )
        })
        .init();
}

fn load_config(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    let value = content.parse::<Value>()?;
    let config = Config::from_toml(value)?;
    Ok(config)
}
