//! Versioned schema migrations for MySQL and SQLite.
//!
//! A [`migrate::migration::Migration`] pairs a version with a declarative
//! [`migrate::migration::SchemaChange`]. [`migrate::migrator::DatabaseMigrator`]
//! applies and reverts them through a [`backend::SchemaBackend`], recording
//! applied versions in a ledger table so each runs once per database.

#[macro_use]
extern crate log;

pub mod backend;
pub mod common;
pub mod config;
pub mod connection;
pub mod ddl;
pub mod migrate;
pub mod migrations;
