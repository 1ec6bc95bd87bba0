//! Per-employee enrollment state.
//!
//! ```text
//! Idle -> AllocatingSlot -> AwaitingDeviceResult -> Committing -> Committed
//!              |                    |                   |
//!              +--------------------+-------------------+--> Failed
//! ```
//!
//! Besides the current state each session remembers slots that must not be
//! handed out again to the same employee (the slot it just released) and slots
//! of enrollments it superseded. A superseded slot may still be programmed by
//! the device, so it stays reserved for everyone until its result arrives.

use scanlink_core::{DeviceId, EmployeeId, FingerprintId};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;

/// Where an employee's latest enrollment stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EnrollmentState {
    Idle,
    AllocatingSlot,
    AwaitingDeviceResult {
        #[serde(rename = "fingerID")]
        fingerprint_id: FingerprintId,
    },
    Committing {
        #[serde(rename = "fingerID")]
        fingerprint_id: FingerprintId,
    },
    Committed {
        #[serde(rename = "fingerID")]
        fingerprint_id: FingerprintId,
    },
    Failed {
        reason: String,
    },
}

impl EnrollmentState {
    /// Slot the device may still be programming for this session.
    fn in_flight_slot(&self) -> Option<FingerprintId> {
        match self {
            EnrollmentState::AwaitingDeviceResult { fingerprint_id }
            | EnrollmentState::Committing { fingerprint_id } => Some(*fingerprint_id),
            _ => None,
        }
    }

    fn is_in_flight(&self) -> bool {
        matches!(self, EnrollmentState::AllocatingSlot) || self.in_flight_slot().is_some()
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EnrollmentState::Committed { .. } | EnrollmentState::Failed { .. }
        )
    }
}

/// How an enroll result relates to the tracked sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Result for the employee's current enrollment.
    Current {
        fingerprint_id: FingerprintId,
        device_id: DeviceId,
    },
    /// Result for an enrollment that a later one superseded.
    Stale { fingerprint_id: FingerprintId },
    /// Repeat of a result that was already applied.
    Duplicate { fingerprint_id: FingerprintId },
    /// No matching session (e.g. started before a restart).
    Untracked { fingerprint_id: Option<FingerprintId> },
}

#[derive(Debug)]
struct Session {
    state: EnrollmentState,
    device_id: DeviceId,
    released: BTreeSet<FingerprintId>,
    superseded: BTreeSet<FingerprintId>,
}

/// Enrollment sessions for every employee.
#[derive(Debug, Default)]
pub struct EnrollmentSessions {
    sessions: Mutex<HashMap<EmployeeId, Session>>,
    locks: Mutex<HashMap<EmployeeId, Arc<tokio::sync::Mutex<()>>>>,
}

impl EnrollmentSessions {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<EmployeeId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serialize enrollments for one employee.
    pub async fn lock(&self, employee_id: EmployeeId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(employee_id)
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    #[must_use]
    pub fn state(&self, employee_id: EmployeeId) -> EnrollmentState {
        self.sessions()
            .get(&employee_id)
            .map_or(EnrollmentState::Idle, |s| s.state.clone())
    }

    /// Start a new enrollment, superseding any in-flight one.
    ///
    /// Returns the slot of the superseded enrollment, if any.
    pub fn start(&self, employee_id: EmployeeId, device_id: DeviceId) -> Option<FingerprintId> {
        let mut sessions = self.sessions();
        let previous = sessions.remove(&employee_id);

        let mut session = Session {
            state: EnrollmentState::AllocatingSlot,
            device_id,
            released: BTreeSet::new(),
            superseded: BTreeSet::new(),
        };

        let mut superseded_slot = None;
        if let Some(previous) = previous {
            session.superseded = previous.superseded;
            if previous.state.is_in_flight() {
                session.released = previous.released;
                superseded_slot = previous.state.in_flight_slot();
                session.superseded.extend(superseded_slot);
            }
        }

        sessions.insert(employee_id, session);
        superseded_slot
    }

    /// Remember that the employee's previous slot was released.
    pub fn mark_released(&self, employee_id: EmployeeId, fingerprint_id: FingerprintId) {
        if let Some(session) = self.sessions().get_mut(&employee_id) {
            session.released.insert(fingerprint_id);
        }
    }

    /// Slots reserved by sessions: every in-flight slot and every superseded slot.
    #[must_use]
    pub fn reserved(&self) -> BTreeSet<FingerprintId> {
        self.sessions()
            .values()
            .flat_map(|s| s.state.in_flight_slot().into_iter().chain(s.superseded.iter().copied()))
            .collect()
    }

    /// Slots the allocator must skip for `employee_id`.
    #[must_use]
    pub fn exclusions(&self, employee_id: EmployeeId) -> BTreeSet<FingerprintId> {
        let mut excluded = self.reserved();
        if let Some(session) = self.sessions().get(&employee_id) {
            excluded.extend(session.released.iter().copied());
        }
        excluded
    }

    /// Record the slot the device was asked to program.
    pub fn await_result(&self, employee_id: EmployeeId, fingerprint_id: FingerprintId) {
        if let Some(session) = self.sessions().get_mut(&employee_id) {
            session.state = EnrollmentState::AwaitingDeviceResult { fingerprint_id };
        }
    }

    /// Mark the employee's enrollment failed.
    pub fn fail(&self, employee_id: EmployeeId, reason: impl Into<String>) {
        if let Some(session) = self.sessions().get_mut(&employee_id) {
            session.state = EnrollmentState::Failed {
                reason: reason.into(),
            };
        }
    }

    /// Fail an enrollment that was dropped before its command went out.
    ///
    /// Only a session still in `AllocatingSlot` is affected.
    pub fn abandon(&self, employee_id: EmployeeId) {
        if let Some(session) = self.sessions().get_mut(&employee_id)
            && session.state == EnrollmentState::AllocatingSlot
        {
            session.state = EnrollmentState::Failed {
                reason: "enrollment cancelled".to_string(),
            };
        }
    }

    /// Classify an enroll result and advance the current session.
    ///
    /// A success for the current slot moves it to `Committing`; a failure
    /// moves it to `Failed`. A result for a superseded slot releases that
    /// reservation.
    pub fn settle(
        &self,
        employee_id: EmployeeId,
        reported: Option<FingerprintId>,
        failure: Option<&str>,
    ) -> Resolution {
        let mut sessions = self.sessions();
        let Some(session) = sessions.get_mut(&employee_id) else {
            return Resolution::Untracked {
                fingerprint_id: reported,
            };
        };

        if let EnrollmentState::AwaitingDeviceResult { fingerprint_id } = session.state
            && reported.is_none_or(|r| r == fingerprint_id)
        {
            session.state = match failure {
                None => EnrollmentState::Committing { fingerprint_id },
                Some(reason) => EnrollmentState::Failed {
                    reason: reason.to_string(),
                },
            };
            return Resolution::Current {
                fingerprint_id,
                device_id: session.device_id.clone(),
            };
        }

        if let Some(slot) = reported {
            if session.superseded.remove(&slot) {
                return Resolution::Stale {
                    fingerprint_id: slot,
                };
            }
            if let EnrollmentState::Committing { fingerprint_id }
            | EnrollmentState::Committed { fingerprint_id } = session.state
                && fingerprint_id == slot
            {
                return Resolution::Duplicate {
                    fingerprint_id: slot,
                };
            }
        }

        Resolution::Untracked {
            fingerprint_id: reported,
        }
    }

    /// Finish a commit started by [`settle`](Self::settle).
    ///
    /// Returns `false` if a newer enrollment superseded the session meanwhile.
    pub fn finish_commit(
        &self,
        employee_id: EmployeeId,
        fingerprint_id: FingerprintId,
        outcome: Result<(), String>,
    ) -> bool {
        let mut sessions = self.sessions();
        let Some(session) = sessions.get_mut(&employee_id) else {
            return false;
        };

        if session.state == (EnrollmentState::Committing { fingerprint_id }) {
            session.state = match outcome {
                Ok(()) => EnrollmentState::Committed { fingerprint_id },
                Err(reason) => EnrollmentState::Failed { reason },
            };
            session.released.clear();
            true
        } else {
            // The superseding enrollment reserved this slot; its result is in.
            session.superseded.remove(&fingerprint_id);
            false
        }
    }
}
