//! Migrations known to this crate, oldest first.
//!
//! New migrations get a later version (a `YYYYMMDDHHMMSS` timestamp), their
//! own `m<version>_<name>.rs` file, and an entry at the end of [`MIGRATIONS`].
//! Applied migrations are never edited.

mod m20190902191552_create_user_role;

use crate::migrate::migration::Migration;

pub use m20190902191552_create_user_role::{CREATE_USER_ROLE, ROLES};

pub const MIGRATIONS: &[Migration] = &[CREATE_USER_ROLE];

pub fn all() -> Vec<Migration> {
    MIGRATIONS.to_vec()
}
