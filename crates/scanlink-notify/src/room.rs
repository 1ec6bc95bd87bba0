use scanlink_core::{
    EmployeeId,
    constants::{ALL_EMPLOYEE_ROOM, EMPLOYEE_ROOM_PREFIX, GLOBAL_ROOM},
};
use std::fmt;

/// A named group of connected clients.
///
/// Rooms are identified structurally rather than by name: the staff room's
/// name happens to share the per-employee prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    Employee(EmployeeId),
    Global,
    AllEmployee,
}

impl Room {
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Room::Employee(id) => format!("{EMPLOYEE_ROOM_PREFIX}{id}"),
            Room::Global => GLOBAL_ROOM.to_string(),
            Room::AllEmployee => ALL_EMPLOYEE_ROOM.to_string(),
        }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl From<EmployeeId> for Room {
    fn from(id: EmployeeId) -> Self {
        Room::Employee(id)
    }
}
