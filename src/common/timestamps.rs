//! Application-level replacement for framework-managed audit columns.
//!
//! Tables defined with `timestamps: true` carry `created_at` and
//! `updated_at`. Writers stamp both on insert and only `updated_at` on
//! update; nothing in the database fills them implicitly.

use chrono::NaiveDateTime;

use crate::common::schema::{CREATED_AT, UPDATED_AT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamps {
    now: NaiveDateTime,
}

impl Timestamps {
    pub fn at(now: NaiveDateTime) -> Self {
        Timestamps { now }
    }

    /// Column/value pairs to add to an `INSERT`.
    pub fn on_insert(&self) -> [(&'static str, NaiveDateTime); 2] {
        [(CREATED_AT, self.now), (UPDATED_AT, self.now)]
    }

    /// Column/value pairs to add to an `UPDATE`.
    pub fn on_update(&self) -> [(&'static str, NaiveDateTime); 1] {
        [(UPDATED_AT, self.now)]
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 9, 2)
            .and_then(|date| date.and_hms_opt(12, 0, 0))
            .unwrap()
    }

    #[test]
    fn insert_sets_both_columns_to_the_same_instant() {
        let stamps = Timestamps::at(noon()).on_insert();
        assert_eq!(stamps, [(CREATED_AT, noon()), (UPDATED_AT, noon())]);
    }

    #[test]
    fn update_only_touches_updated_at() {
        let stamps = Timestamps::at(noon()).on_update();
        assert_eq!(stamps, [(UPDATED_AT, noon())]);
    }
}
