use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use toml::Value;

use crate::migrate::migration_options::{DEFAULT_LEDGER_TABLE, DEFAULT_LOCK_TIMEOUT};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// MySQL caps lock names at 64 characters and the lock is named `<ledger>_lock`.
const MAX_LEDGER_TABLE_LEN: usize = 59;

#[derive(Debug)]
pub struct Config {
    database: DatabaseConfig,
    settings: SettingsConfig,
}

#[derive(Debug, Clone)]
pub enum DatabaseConfig {
    MySql(MySqlConfig),
    Sqlite(SqliteConfig),
}

#[derive(Debug, Clone)]
pub struct MySqlConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SettingsConfig {
    pub ledger_table: String,
    pub lock_timeout: Duration,
    pub connect_attempts: u32,
    pub connect_retry_delay: Duration,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        SettingsConfig {
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            connect_attempts: 3,
            connect_retry_delay: Duration::from_secs(2),
        }
    }
}

impl Config {
    pub fn from_toml(config: Value) -> Result<Self> {
        let database = parse_database_config(
            config
                .get("database")
                .ok_or(anyhow!("Missing or invalid database settings"))?,
        )?;
        let settings = match config.get("settings") {
            Some(settings) => parse_settings_config(settings)?,
            None => SettingsConfig::default(),
        };

        Ok(Config { database, settings })
    }

    pub fn database(&self) -> &DatabaseConfig {
        &self.database
    }

    pub fn settings(&self) -> &SettingsConfig {
        &self.settings
    }
}

fn parse_database_config(config: &Value) -> Result<DatabaseConfig> {
    let driver = config
        .get("driver")
        .and_then(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing or invalid driver"))?;

    match driver {
        "mysql" => parse_mysql_config(config).map(DatabaseConfig::MySql),
        "sqlite" => parse_sqlite_config(config).map(DatabaseConfig::Sqlite),
        other => bail!("Unsupported driver {}, expected mysql or sqlite", other),
    }
}

fn parse_mysql_config(config: &Value) -> Result<MySqlConfig> {
    let host = config
        .get("host")
        .and_then(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing or invalid host"))?
        .to_string();

    let port = config
        .get("port")
        .and_then(|value| value.as_integer())
        .ok_or_else(|| anyhow!("Missing or invalid port"))?
        .try_into()?;

    let username = config
        .get("username")
        .and_then(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing or invalid username"))?
        .to_string();

    let password = config
        .get("password")
        .and_then(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing or invalid password"))?
        .to_string();

    let database = config
        .get("database")
        .and_then(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing or invalid database"))?
        .to_string();

    let connect_timeout = match config.get("connect_timeout_secs") {
        Some(value) => Duration::from_secs(
            value
                .as_integer()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| anyhow!("Invalid connect timeout, must be at least 1"))?
                .try_into()?,
        ),
        None => DEFAULT_CONNECT_TIMEOUT,
    };

    Ok(MySqlConfig {
        host,
        port,
        username,
        password,
        database,
        connect_timeout,
    })
}

fn parse_sqlite_config(config: &Value) -> Result<SqliteConfig> {
    let path = config
        .get("path")
        .and_then(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing or invalid path"))?;

    Ok(SqliteConfig {
        path: PathBuf::from(path),
    })
}

fn parse_settings_config(config: &Value) -> Result<SettingsConfig> {
    let defaults = SettingsConfig::default();

    let ledger_table = match config.get("ledger_table") {
        Some(value) => value
            .as_str()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| anyhow!("Invalid ledger table name"))?
            .to_string(),
        None => defaults.ledger_table,
    };

    if ledger_table.len() > MAX_LEDGER_TABLE_LEN {
        bail!(
            "Ledger table name {} is too long, at most {} characters are allowed",
            ledger_table,
            MAX_LEDGER_TABLE_LEN
        );
    }

    let lock_timeout = match config.get("lock_timeout_secs") {
        Some(value) => Duration::from_secs(
            value
                .as_integer()
                .ok_or_else(|| anyhow!("Invalid lock timeout"))?
                .try_into()?,
        ),
        None => defaults.lock_timeout,
    };

    let connect_attempts = match config.get("connect_attempts") {
        Some(value) => value
            .as_integer()
            .filter(|attempts| *attempts > 0)
            .ok_or_else(|| anyhow!("Invalid connect attempts, must be at least 1"))?
            .try_into()?,
        None => defaults.connect_attempts,
    };

    let connect_retry_delay = match config.get("connect_retry_secs") {
        Some(value) => Duration::from_secs(
            value
                .as_integer()
                .ok_or_else(|| anyhow!("Invalid connect retry delay"))?
                .try_into()?,
        ),
        None => defaults.connect_retry_delay,
    };

    Ok(SettingsConfig {
        ledger_table,
        lock_timeout,
        connect_attempts,
        connect_retry_delay,
    })
}
