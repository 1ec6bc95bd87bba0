use crate::error::{StorageError, StorageResult};
use crate::models::{Employee, NewEmployee};
use chrono::{DateTime, Utc};
use scanlink_core::{EmployeeId, FingerprintId};
use sqlx::SqlitePool;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Narrow read/update interface over employee records.
///
/// The fingerprint lifecycle only ever reads employees and sets or clears
/// their assigned slot; everything else about an employee belongs to the
/// host application.
///
/// # Implementation Note
///
/// Methods return `impl Future + Send` so generic callers can move directory
/// calls into spawned tasks. Implementations are free to write `async fn`.
pub trait EmployeeDirectory: Send + Sync + 'static {
    /// Find an employee by id.
    fn find_by_id(
        &self,
        id: EmployeeId,
    ) -> impl Future<Output = StorageResult<Option<Employee>>> + Send;

    /// Find the employee currently holding a slot.
    fn find_by_fingerprint_id(
        &self,
        fingerprint_id: FingerprintId,
    ) -> impl Future<Output = StorageResult<Option<Employee>>> + Send;

    /// Every assigned slot, ascending.
    fn assigned_fingerprint_ids(
        &self,
    ) -> impl Future<Output = StorageResult<Vec<FingerprintId>>> + Send;

    /// Set (`Some`) or clear (`None`) an employee's slot.
    ///
    /// Fails with `NotFound` if the employee does not exist and with
    /// `Constraint` if the slot is held by someone else.
    fn set_fingerprint_id(
        &self,
        id: EmployeeId,
        fingerprint_id: Option<FingerprintId>,
    ) -> impl Future<Output = StorageResult<()>> + Send;
}

impl<D: EmployeeDirectory> EmployeeDirectory for Arc<D> {
    fn find_by_id(
        &self,
        id: EmployeeId,
    ) -> impl Future<Output = StorageResult<Option<Employee>>> + Send {
        (**self).find_by_id(id)
    }

    fn find_by_fingerprint_id(
        &self,
        fingerprint_id: FingerprintId,
    ) -> impl Future<Output = StorageResult<Option<Employee>>> + Send {
        (**self).find_by_fingerprint_id(fingerprint_id)
    }

    fn assigned_fingerprint_ids(
        &self,
    ) -> impl Future<Output = StorageResult<Vec<FingerprintId>>> + Send {
        (**self).assigned_fingerprint_ids()
    }

    fn set_fingerprint_id(
        &self,
        id: EmployeeId,
        fingerprint_id: Option<FingerprintId>,
    ) -> impl Future<Output = StorageResult<()>> + Send {
        (**self).set_fingerprint_id(id, fingerprint_id)
    }
}

/// Raw row as stored in the `employees` table.
#[derive(Debug, sqlx::FromRow)]
struct EmployeeRow {
    employeeid: i64,
    fullname: String,
    role: String,
    fingerprintid: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EmployeeRow> for Employee {
    type Error = StorageError;

    fn try_from(row: EmployeeRow) -> StorageResult<Self> {
        let fingerprint_id = row
            .fingerprintid
            .map(FingerprintId::try_from)
            .transpose()
            .map_err(|e| {
                StorageError::Constraint(format!(
                    "employee {} has invalid fingerprintid: {e}",
                    row.employeeid
                ))
            })?;

        Ok(Employee {
            id: EmployeeId::new(row.employeeid),
            full_name: row.fullname,
            role: row.role,
            fingerprint_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_EMPLOYEE: &str = r#"
    SELECT employeeid, fullname, role, fingerprintid, created_at, updated_at
    FROM employees
"#;

/// SQLite implementation of [`EmployeeDirectory`].
#[derive(Debug, Clone)]
pub struct SqliteEmployeeDirectory {
    pool: SqlitePool,
}

impl SqliteEmployeeDirectory {
    /// Create a new SQLite employee directory
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an employee record.
    ///
    /// # Errors
    /// `Constraint` if the id or slot is already taken.
    pub async fn insert(&self, employee: &NewEmployee) -> StorageResult<Employee> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO employees (employeeid, fullname, role, fingerprintid, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(employee.id.get())
        .bind(&employee.full_name)
        .bind(&employee.role)
        .bind(employee.fingerprint_id.map(i64::from))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from_write)?;

        Ok(employee.clone().into_employee(now))
    }

    /// All employees ordered by id.
    pub async fn list(&self) -> StorageResult<Vec<Employee>> {
        let rows = sqlx::query_as::<_, EmployeeRow>(&format!("{SELECT_EMPLOYEE} ORDER BY employeeid"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Employee::try_from).collect()
    }
}

impl EmployeeDirectory for SqliteEmployeeDirectory {
    async fn find_by_id(&self, id: EmployeeId) -> StorageResult<Option<Employee>> {
        let row = sqlx::query_as::<_, EmployeeRow>(&format!("{SELECT_EMPLOYEE} WHERE employeeid = ?"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Employee::try_from).transpose()
    }

    async fn find_by_fingerprint_id(
        &self,
        fingerprint_id: FingerprintId,
    ) -> StorageResult<Option<Employee>> {
        let row =
            sqlx::query_as::<_, EmployeeRow>(&format!("{SELECT_EMPLOYEE} WHERE fingerprintid = ?"))
                .bind(i64::from(fingerprint_id))
                .fetch_optional(&self.pool)
                .await?;

        row.map(Employee::try_from).transpose()
    }

    async fn assigned_fingerprint_ids(&self) -> StorageResult<Vec<FingerprintId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT fingerprintid
            FROM employees
            WHERE fingerprintid IS NOT NULL
            ORDER BY fingerprintid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        ids.into_iter()
            .map(|id| {
                FingerprintId::try_from(id)
                    .map_err(|e| StorageError::Constraint(format!("invalid fingerprintid: {e}")))
            })
            .collect()
    }

    async fn set_fingerprint_id(
        &self,
        id: EmployeeId,
        fingerprint_id: Option<FingerprintId>,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE employees
            SET fingerprintid = ?, updated_at = ?
            WHERE employeeid = ?
            "#,
        )
        .bind(fingerprint_id.map(i64::from))
        .bind(Utc::now())
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(StorageError::from_write)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::employee_not_found(id));
        }

        debug!(employee_id = %id, fingerprint_id = ?fingerprint_id.map(FingerprintId::get), "Updated fingerprint assignment");
        Ok(())
    }
}
