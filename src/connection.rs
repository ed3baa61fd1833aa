use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;

use crate::common::error::MigrationError;
use crate::config::{MySqlConfig, SqliteConfig};

// The migrator holds exactly one connection for its whole run.
const MAX_CONNECTIONS: u32 = 1;

pub struct SqlxMySqlConnection {
    pub pool: MySqlPool,
}

pub struct SqlxSqliteConnection {
    pub pool: SqlitePool,
}

#[async_trait]
pub trait DatabaseConnection: Sized {
    type Config: Send + Sync;

    async fn new(config: &Self::Config) -> Result<Self, MigrationError>;
}

#[async_trait]
impl DatabaseConnection for SqlxMySqlConnection {
    type Config = MySqlConfig;

    async fn new(config: &MySqlConfig) -> Result<Self, MigrationError> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database)
            .disable_statement_logging()
            .clone();

        let pool = MySqlPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(config.connect_timeout)
            .connect_with(options)
            .await?;

        Ok(SqlxMySqlConnection { pool })
    }
}

#[async_trait]
impl DatabaseConnection for SqlxSqliteConnection {
    type Config = SqliteConfig;

    async fn new(config: &SqliteConfig) -> Result<Self, MigrationError> {
        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .disable_statement_logging()
            .clone();

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        Ok(SqlxSqliteConnection { pool })
    }
}

pub struct DatabaseConnectionFactory<C: DatabaseConnection> {
    config: C::Config,
    attempts: u32,
    retry_delay: Duration,
}

impl<C: DatabaseConnection> DatabaseConnectionFactory<C> {
    pub fn new(config: C::Config, attempts: u32, retry_delay: Duration) -> Self {
        DatabaseConnectionFactory {
            config,
            attempts: attempts.max(1),
            retry_delay,
        }
    }

    /// Connects, retrying only while the failure is a connectivity problem.
    pub async fn create_connection(&self) -> Result<C> {
        let mut attempt = 1;

        loop {
            match C::new(&self.config).await {
                Ok(connection) => return Ok(connection),
                Err(err) if err.is_connectivity() && attempt < self.attempts => {
                    warn!(
                        "Connection attempt {}/{} failed, retrying in {}s: {}",
                        attempt,
                        self.attempts,
                        self.retry_delay.as_secs(),
                        err
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("Failed to connect after {} attempt(s)", attempt)
                    })
                }
            }
        }
    }
}
