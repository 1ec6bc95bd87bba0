//! SQLite employee directory against real databases.
//!
//! Run with: cargo test --package scanlink-storage --test integration_directory

use scanlink_core::{EmployeeId, FingerprintId};
use scanlink_storage::{
    Database, DatabaseConfig, EmployeeDirectory, NewEmployee, SqliteEmployeeDirectory,
    StorageError,
};

fn slot(n: u32) -> FingerprintId {
    FingerprintId::new(n).unwrap()
}

async fn seeded() -> (Database, SqliteEmployeeDirectory) {
    let db = Database::in_memory().await.unwrap();
    let directory = SqliteEmployeeDirectory::new(db.pool().clone());

    for employee in [
        NewEmployee::new(EmployeeId::new(1), "Nguyen Van A").fingerprint(slot(2)),
        NewEmployee::new(EmployeeId::new(2), "Tran Thi B").fingerprint(slot(1)),
        NewEmployee::new(EmployeeId::new(3), "Le Van C").role("wh_manager"),
        NewEmployee::new(EmployeeId::new(7), "Pham Thi D").fingerprint(slot(4)),
    ] {
        directory.insert(&employee).await.unwrap();
    }

    (db, directory)
}

#[tokio::test]
async fn test_find_by_id() {
    let (db, directory) = seeded().await;

    let employee = directory
        .find_by_id(EmployeeId::new(3))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(employee.full_name, "Le Van C");
    assert_eq!(employee.role, "wh_manager");
    assert!(employee.fingerprint_id.is_none());

    assert!(directory.find_by_id(EmployeeId::new(42)).await.unwrap().is_none());
    db.close().await;
}

#[tokio::test]
async fn test_assigned_ids_are_sorted() {
    let (db, directory) = seeded().await;

    let ids = directory.assigned_fingerprint_ids().await.unwrap();
    assert_eq!(ids, vec![slot(1), slot(2), slot(4)]);
    db.close().await;
}

#[tokio::test]
async fn test_find_by_fingerprint_id() {
    let (db, directory) = seeded().await;

    let holder = directory
        .find_by_fingerprint_id(slot(4))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(holder.id, EmployeeId::new(7));
    assert!(directory.find_by_fingerprint_id(slot(3)).await.unwrap().is_none());
    db.close().await;
}

#[tokio::test]
async fn test_set_and_clear_fingerprint() {
    let (db, directory) = seeded().await;

    directory
        .set_fingerprint_id(EmployeeId::new(3), Some(slot(3)))
        .await
        .unwrap();
    directory
        .set_fingerprint_id(EmployeeId::new(7), None)
        .await
        .unwrap();

    let ids = directory.assigned_fingerprint_ids().await.unwrap();
    assert_eq!(ids, vec![slot(1), slot(2), slot(3)]);

    let cleared = directory
        .find_by_id(EmployeeId::new(7))
        .await
        .unwrap()
        .unwrap();
    assert!(!cleared.has_fingerprint());
    db.close().await;
}

#[tokio::test]
async fn test_slot_uniqueness_enforced() {
    let (db, directory) = seeded().await;

    let result = directory
        .set_fingerprint_id(EmployeeId::new(3), Some(slot(1)))
        .await;
    assert!(matches!(result, Err(StorageError::Constraint(_))));

    let core: scanlink_core::Error = result.unwrap_err().into();
    assert!(matches!(core, scanlink_core::Error::Persistence(_)));
    db.close().await;
}

#[tokio::test]
async fn test_set_unknown_employee_is_not_found() {
    let (db, directory) = seeded().await;

    let error = directory
        .set_fingerprint_id(EmployeeId::new(99), None)
        .await
        .unwrap_err();
    let core: scanlink_core::Error = error.into();
    assert_eq!(core, scanlink_core::Error::not_found("Employee", 99));
    db.close().await;
}

#[tokio::test]
async fn test_list_orders_by_id() {
    let (db, directory) = seeded().await;

    let ids: Vec<i64> = directory
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id.get())
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 7]);
    db.close().await;
}

#[tokio::test]
async fn test_file_database_persists_assignments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("scanlink.db");
    let path = path.to_string_lossy().to_string();

    {
        let db = Database::new(DatabaseConfig::new(path.clone())).await.unwrap();
        let directory = SqliteEmployeeDirectory::new(db.pool().clone());
        directory
            .insert(&NewEmployee::new(EmployeeId::new(1), "A"))
            .await
            .unwrap();
        directory
            .set_fingerprint_id(EmployeeId::new(1), Some(slot(5)))
            .await
            .unwrap();
        db.close().await;
    }

    let db = Database::new(DatabaseConfig::new(path)).await.unwrap();
    let directory = SqliteEmployeeDirectory::new(db.pool().clone());
    assert_eq!(
        directory.assigned_fingerprint_ids().await.unwrap(),
        vec![slot(5)]
    );
    db.close().await;
}

#[tokio::test]
async fn test_migration_idempotency() {
    let db = Database::in_memory().await.unwrap();

    db.migrate().await.unwrap();
    db.migrate().await.unwrap();

    let result: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='employees'",
    )
    .fetch_one(db.pool())
    .await
    .unwrap();

    assert_eq!(result.0, 1);
    db.health_check().await.unwrap();
    db.close().await;
}

#[tokio::test]
async fn test_concurrent_reads() {
    let (db, directory) = seeded().await;
    let directory = std::sync::Arc::new(directory);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let directory = directory.clone();
            tokio::spawn(async move { directory.assigned_fingerprint_ids().await })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        assert_eq!(result.unwrap().unwrap().len(), 3);
    }
    db.close().await;
}
