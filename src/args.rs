use std::path::PathBuf;

use structopt::clap::AppSettings;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
name = "schema-migrator",
version = env ! ("CARGO_PKG_VERSION"),
about = "Applies, reverts and inspects versioned schema migrations on MySQL and SQLite databases.",
setting = AppSettings::ColoredHelp,
)]
pub struct Args {
    /// Activate verbose mode
    #[structopt(short = "v", long = "verbose")]
    pub verbose: bool,

    /// Activate quiet mode
    #[structopt(short = "q", long = "quiet")]
    pub quiet: bool,

    /// Path to the configuration file
    #[structopt(
        short = "c",
        long = "config",
        default_value = "config.toml",
        parse(from_os_str)
    )]
    pub config: PathBuf,

    /// Log the statements each step would run without executing them
    #[structopt(short = "n", long = "dry-run")]
    pub dry_run: bool,

    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Apply pending migrations
    Migrate {
        /// Migrate up or down to this version instead of the latest
        #[structopt(long = "to")]
        to: Option<i64>,
    },

    /// Revert the most recently applied migrations
    Rollback {
        /// Number of migrations to revert
        #[structopt(short = "s", long = "steps", default_value = "1")]
        steps: usize,
    },

    /// Revert and re-apply the most recently applied migrations
    Redo {
        /// Number of migrations to redo
        #[structopt(short = "s", long = "steps", default_value = "1")]
        steps: usize,
    },

    /// Apply a single migration
    Up {
        /// Version of the migration
        version: i64,
    },

    /// Revert a single migration
    Down {
        /// Version of the migration
        version: i64,
    },

    /// Show which migrations are applied
    Status,

    /// Print the current schema version
    Version,

    /// Compare tables created by applied migrations with the live database
    Verify,
}
