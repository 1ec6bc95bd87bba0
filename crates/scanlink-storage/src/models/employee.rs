use chrono::{DateTime, Utc};
use scanlink_core::{EmployeeId, FingerprintId};
use serde::{Deserialize, Serialize};

/// The slice of an employee record the fingerprint lifecycle works with.
///
/// # Fields
///
/// * `id` - Primary key shared with the host application
/// * `full_name` - Display name, used in logs and match notifications
/// * `role` - Application role (`employee`, `admin`, ...)
/// * `fingerprint_id` - Assigned scanner slot, `None` when not enrolled
///
/// # Examples
///
/// ```
/// use scanlink_storage::models::Employee;
/// use scanlink_core::{EmployeeId, FingerprintId};
/// use chrono::Utc;
///
/// let employee = Employee {
///     id: EmployeeId::new(7),
///     full_name: "Tran Van A".to_string(),
///     role: "employee".to_string(),
///     fingerprint_id: FingerprintId::new(3).ok(),
///     created_at: Utc::now(),
///     updated_at: Utc::now(),
/// };
///
/// assert!(employee.has_fingerprint());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub full_name: String,
    pub role: String,
    pub fingerprint_id: Option<FingerprintId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    #[must_use]
    pub fn has_fingerprint(&self) -> bool {
        self.fingerprint_id.is_some()
    }
}

/// Input for inserting an employee (seeding, tests, the demo binary).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmployee {
    pub id: EmployeeId,
    pub full_name: String,
    pub role: String,
    pub fingerprint_id: Option<FingerprintId>,
}

impl NewEmployee {
    pub fn new(id: EmployeeId, full_name: impl Into<String>) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            role: "employee".to_string(),
            fingerprint_id: None,
        }
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn fingerprint(mut self, fingerprint_id: FingerprintId) -> Self {
        self.fingerprint_id = Some(fingerprint_id);
        self
    }

    pub(crate) fn into_employee(self, now: DateTime<Utc>) -> Employee {
        Employee {
            id: self.id,
            full_name: self.full_name,
            role: self.role,
            fingerprint_id: self.fingerprint_id,
            created_at: now,
            updated_at: now,
        }
    }
}
