use crate::error::{StorageError, StorageResult};
use crate::models::{Employee, NewEmployee};
use crate::repositories::EmployeeDirectory;
use chrono::Utc;
use scanlink_core::{EmployeeId, FingerprintId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// In-memory [`EmployeeDirectory`] for tests and simulations.
///
/// Enforces the same slot uniqueness as the SQLite schema and can be told to
/// fail writes, which is how device/directory divergence is exercised.
#[derive(Debug, Default)]
pub struct MemoryEmployeeDirectory {
    employees: RwLock<BTreeMap<EmployeeId, Employee>>,
    fail_writes: AtomicBool,
}

impl MemoryEmployeeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory pre-populated with `employees`.
    ///
    /// # Errors
    /// `Constraint` on duplicate ids or slots.
    pub fn with_employees<I>(employees: I) -> StorageResult<Self>
    where
        I: IntoIterator<Item = NewEmployee>,
    {
        let mut map = BTreeMap::new();
        for employee in employees {
            insert_into(&mut map, employee)?;
        }
        Ok(Self {
            employees: RwLock::new(map),
            fail_writes: AtomicBool::new(false),
        })
    }

    /// Insert an employee record.
    ///
    /// # Errors
    /// `Constraint` if the id or slot is already taken.
    pub async fn insert(&self, employee: NewEmployee) -> StorageResult<Employee> {
        insert_into(&mut *self.employees.write().await, employee)
    }

    /// Make every subsequent `set_fingerprint_id` fail with `Unavailable`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of every employee ordered by id.
    pub async fn list(&self) -> Vec<Employee> {
        self.employees.read().await.values().cloned().collect()
    }
}

fn insert_into(
    map: &mut BTreeMap<EmployeeId, Employee>,
    employee: NewEmployee,
) -> StorageResult<Employee> {
    if map.contains_key(&employee.id) {
        return Err(StorageError::Constraint(format!(
            "employee {} already exists",
            employee.id
        )));
    }
    if let Some(slot) = employee.fingerprint_id
        && map.values().any(|e| e.fingerprint_id == Some(slot))
    {
        return Err(StorageError::Constraint(format!(
            "fingerprintid {slot} already assigned"
        )));
    }

    let employee = employee.into_employee(Utc::now());
    map.insert(employee.id, employee.clone());
    Ok(employee)
}

impl EmployeeDirectory for MemoryEmployeeDirectory {
    async fn find_by_id(&self, id: EmployeeId) -> StorageResult<Option<Employee>> {
        Ok(self.employees.read().await.get(&id).cloned())
    }

    async fn find_by_fingerprint_id(
        &self,
        fingerprint_id: FingerprintId,
    ) -> StorageResult<Option<Employee>> {
        Ok(self
            .employees
            .read()
            .await
            .values()
            .find(|e| e.fingerprint_id == Some(fingerprint_id))
            .cloned())
    }

    async fn assigned_fingerprint_ids(&self) -> StorageResult<Vec<FingerprintId>> {
        let mut ids: Vec<FingerprintId> = self
            .employees
            .read()
            .await
            .values()
            .filter_map(|e| e.fingerprint_id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn set_fingerprint_id(
        &self,
        id: EmployeeId,
        fingerprint_id: Option<FingerprintId>,
    ) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }

        let mut map = self.employees.write().await;

        if let Some(slot) = fingerprint_id
            && map
                .values()
                .any(|e| e.id != id && e.fingerprint_id == Some(slot))
        {
            return Err(StorageError::Constraint(format!(
                "fingerprintid {slot} already assigned"
            )));
        }

        let employee = map
            .get_mut(&id)
            .ok_or_else(|| StorageError::employee_not_found(id))?;
        employee.fingerprint_id = fingerprint_id;
        employee.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(n: u32) -> FingerprintId {
        FingerprintId::new(n).unwrap()
    }

    fn directory() -> MemoryEmployeeDirectory {
        MemoryEmployeeDirectory::with_employees([
            NewEmployee::new(EmployeeId::new(1), "A").fingerprint(slot(4)),
            NewEmployee::new(EmployeeId::new(2), "B").fingerprint(slot(1)),
            NewEmployee::new(EmployeeId::new(3), "C"),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_assigned_ids_sorted() {
        let ids = directory().assigned_fingerprint_ids().await.unwrap();
        assert_eq!(ids, vec![slot(1), slot(4)]);
    }

    #[tokio::test]
    async fn test_find_by_fingerprint_id() {
        let directory = directory();
        let found = directory.find_by_fingerprint_id(slot(4)).await.unwrap();
        assert_eq!(found.map(|e| e.id), Some(EmployeeId::new(1)));
        assert!(directory.find_by_fingerprint_id(slot(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_and_clear() {
        let directory = directory();
        directory
            .set_fingerprint_id(EmployeeId::new(3), Some(slot(2)))
            .await
            .unwrap();
        directory
            .set_fingerprint_id(EmployeeId::new(1), None)
            .await
            .unwrap();

        let ids = directory.assigned_fingerprint_ids().await.unwrap();
        assert_eq!(ids, vec![slot(1), slot(2)]);
    }

    #[tokio::test]
    async fn test_set_rejects_taken_slot() {
        let result = directory()
            .set_fingerprint_id(EmployeeId::new(3), Some(slot(4)))
            .await;
        assert!(matches!(result, Err(StorageError::Constraint(_))));
    }

    #[tokio::test]
    async fn test_set_unknown_employee() {
        let result = directory()
            .set_fingerprint_id(EmployeeId::new(99), None)
            .await;
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let directory = directory();
        directory.fail_writes(true);
        assert!(matches!(
            directory.set_fingerprint_id(EmployeeId::new(3), None).await,
            Err(StorageError::Unavailable(_))
        ));
    }

    #[test]
    fn test_duplicate_seed_rejected() {
        let result = MemoryEmployeeDirectory::with_employees([
            NewEmployee::new(EmployeeId::new(1), "A"),
            NewEmployee::new(EmployeeId::new(1), "B"),
        ]);
        assert!(result.is_err());
    }
}
