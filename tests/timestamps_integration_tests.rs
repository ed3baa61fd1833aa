mod common;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use common::TestDatabase;
use schema_migrator::backend::SchemaBackend;
use schema_migrator::migrations::ROLES;

fn at(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2019, 9, 2)
        .and_then(|date| date.and_hms_opt(hour, 15, 52))
        .expect("Valid timestamp")
}

async fn stamps(db: &TestDatabase, id: i64) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
    sqlx::query_as("SELECT created_at, updated_at FROM roles WHERE id = ?")
        .bind(id)
        .fetch_one(&db.raw)
        .await
        .expect("Should read timestamps")
}

#[tokio::test]
async fn test_insert_stamps_both_timestamps() {
    let db = TestDatabase::new().await;
    let mut migrator = db.migrator().await;
    migrator.run().await.expect("Should run migrations");

    let id = migrator
        .backend_mut()
        .insert_row(
            &ROLES,
            &[("name", Some("admin".to_string())), ("alias", None)],
            at(19),
        )
        .await
        .expect("Should insert role");

    assert_eq!(stamps(&db, id).await, (Some(at(19)), Some(at(19))));
}

#[tokio::test]
async fn test_update_touches_only_updated_at() {
    let db = TestDatabase::new().await;
    let mut migrator = db.migrator().await;
    migrator.run().await.expect("Should run migrations");

    let backend = migrator.backend_mut();
    let id = backend
        .insert_row(&ROLES, &[("name", Some("editor".to_string()))], at(19))
        .await
        .expect("Should insert role");

    let later = at(19) + Duration::hours(2);
    let changed = backend
        .update_row(&ROLES, id, &[("alias", Some("ed".to_string()))], later)
        .await
        .expect("Should update role");

    assert_eq!(changed, 1);
    assert_eq!(stamps(&db, id).await, (Some(at(19)), Some(later)));
}

#[tokio::test]
async fn test_update_of_missing_row_changes_nothing() {
    let db = TestDatabase::new().await;
    let mut migrator = db.migrator().await;
    migrator.run().await.expect("Should run migrations");

    let changed = migrator
        .backend_mut()
        .update_row(&ROLES, 42, &[("name", None)], at(20))
        .await
        .expect("Update should succeed");

    assert_eq!(changed, 0);
}

#[tokio::test]
async fn test_rows_without_timestamps_are_rejected() {
    let db = TestDatabase::new().await;
    let mut migrator = db.migrator().await;
    migrator.run().await.expect("Should run migrations");

    let result = sqlx::query("INSERT INTO roles (name, alias) VALUES ('viewer', NULL)")
        .execute(&db.raw)
        .await;

    assert!(result.is_err(), "created_at and updated_at are NOT NULL");
}
