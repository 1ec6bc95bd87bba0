//! Fingerprint lifecycle: enrollment, deletion and their device results.
//!
//! The employee directory is only written after the device confirms the
//! corresponding action. Results arrive through the inbound router, which
//! calls the `handle_*` methods in delivery order.
//!
//! # Enrollment
//!
//! 1. look up the employee (`NotFound` fails fast)
//! 2. release an existing slot with a confirmed delete, aborting on failure
//! 3. allocate the smallest free slot, skipping slots reserved by in-flight
//!    enrollments and the slot just released
//! 4. emit `enroll_started`, send `enroll_finger`, return immediately
//!
//! The device result commits the slot (`enroll_success`) or reports the
//! failure (`enroll_failure`) to the employee's room.
//!
//! # Deletion
//!
//! [`delete`](FingerprintManager::delete) sends `delete_finger` and returns;
//! [`delete_and_confirm`](FingerprintManager::delete_and_confirm) waits for
//! the device through the correlation table. A `delete_finger` success clears
//! the directory exactly once whether or not a caller is still waiting.

use crate::allocator;
use crate::config::LifecycleConfig;
use crate::correlation::CorrelationTable;
use crate::dispatcher::CommandDispatcher;
use crate::enrollment::{EnrollmentSessions, EnrollmentState, Resolution};
use scanlink_core::{DeviceId, EmployeeId, Error, FingerprintId, Result};
use scanlink_notify::{Notifier, ProgressEvent, Room};
use scanlink_protocol::{Action, CommandBuilder, CommandOutcome, EnrollStep, FingerprintEvent};
use scanlink_storage::{Employee, EmployeeDirectory};
use scanlink_transport::Transport;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// Immediate answer to an enrollment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollTicket {
    pub employee_id: EmployeeId,
    pub fingerprint_id: FingerprintId,
    pub status: &'static str,
}

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The employee had no slot; no command was sent.
    NothingToDelete,
    /// `delete_finger` was sent; the directory is updated when the device answers.
    Dispatched { fingerprint_id: FingerprintId },
    /// The device confirmed and the directory was cleared.
    Confirmed { fingerprint_id: FingerprintId },
}

impl DeleteOutcome {
    #[must_use]
    pub fn fingerprint_id(&self) -> Option<FingerprintId> {
        match self {
            DeleteOutcome::NothingToDelete => None,
            DeleteOutcome::Dispatched { fingerprint_id }
            | DeleteOutcome::Confirmed { fingerprint_id } => Some(*fingerprint_id),
        }
    }
}

/// Orchestrates enroll and delete workflows against devices and the directory.
pub struct FingerprintManager<T, D> {
    dispatcher: Arc<CommandDispatcher<T>>,
    directory: D,
    notifier: Arc<dyn Notifier>,
    pending: CorrelationTable<EmployeeId, ()>,
    deleting: Mutex<HashMap<EmployeeId, FingerprintId>>,
    sessions: EnrollmentSessions,
    config: LifecycleConfig,
}

impl<T, D> std::fmt::Debug for FingerprintManager<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintManager")
            .field("pending", &self.pending)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: Transport, D: EmployeeDirectory> FingerprintManager<T, D> {
    pub fn new(
        transport: T,
        directory: D,
        notifier: Arc<dyn Notifier>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            dispatcher: Arc::new(CommandDispatcher::new(transport, config.scheme.clone())),
            directory,
            notifier,
            pending: CorrelationTable::new(),
            deleting: Mutex::new(HashMap::new()),
            sessions: EnrollmentSessions::new(),
            config,
        }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &CommandDispatcher<T> {
        &self.dispatcher
    }

    #[must_use]
    pub fn directory(&self) -> &D {
        &self.directory
    }

    #[must_use]
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Callers currently blocked in [`delete_and_confirm`](Self::delete_and_confirm).
    #[must_use]
    pub fn pending_confirmations(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn enrollment_state(&self, employee_id: EmployeeId) -> EnrollmentState {
        self.sessions.state(employee_id)
    }

    /// Start enrolling a fingerprint for `employee_id` on `device_id`.
    ///
    /// Enrollments for the same employee run one at a time; a later one
    /// supersedes an earlier one still waiting for its device result.
    ///
    /// # Errors
    /// `NotFound` for an unknown employee, any error from releasing the
    /// existing slot, `Transport` if the command cannot be sent.
    pub async fn enroll(&self, device_id: &DeviceId, employee_id: EmployeeId) -> Result<EnrollTicket> {
        let _guard = self.sessions.lock(employee_id).await;
        let employee = self.find_employee(employee_id).await?;

        let superseded = self.sessions.start(employee_id, device_id.clone());
        let _allocation = AllocationGuard {
            sessions: &self.sessions,
            employee_id,
        };
        if let Some(superseded) = superseded {
            info!(
                employee_id = %employee_id,
                fingerprint_id = %superseded,
                "Superseding in-flight enrollment"
            );
        }

        if let Some(current) = employee.fingerprint_id {
            info!(
                device_id = %device_id,
                employee_id = %employee_id,
                fingerprint_id = %current,
                "Releasing existing fingerprint before enrollment"
            );
            if let Err(error) = self.confirm_delete(device_id, employee_id, current).await {
                warn!(employee_id = %employee_id, %error, "Enrollment aborted: release failed");
                self.sessions.fail(employee_id, error.to_string());
                return Err(error);
            }
            self.sessions.mark_released(employee_id, current);
        }

        let slot = match self.allocate_for(employee_id).await {
            Ok(slot) => slot,
            Err(error) => {
                self.sessions.fail(employee_id, error.to_string());
                return Err(error);
            }
        };
        self.sessions.await_result(employee_id, slot);

        self.emit(
            employee_id,
            ProgressEvent::EnrollStarted {
                employee_id,
                fingerprint_id: slot,
            },
        );

        let command = CommandBuilder::new(Action::EnrollFinger)
            .employee(employee_id)
            .finger(slot);
        if let Err(error) = self.dispatcher.dispatch(device_id, command).await {
            self.sessions.fail(employee_id, error.to_string());
            self.emit(
                employee_id,
                ProgressEvent::EnrollFailure {
                    employee_id,
                    error: error.to_string(),
                },
            );
            return Err(error);
        }

        info!(
            device_id = %device_id,
            employee_id = %employee_id,
            fingerprint_id = %slot,
            "Enrollment started"
        );

        Ok(EnrollTicket {
            employee_id,
            fingerprint_id: slot,
            status: "started",
        })
    }

    /// Send `delete_finger` for the employee's slot without waiting.
    ///
    /// # Errors
    /// `NotFound` for an unknown employee, `Transport` if the command cannot
    /// be sent.
    pub async fn delete(&self, device_id: &DeviceId, employee_id: EmployeeId) -> Result<DeleteOutcome> {
        let employee = self.find_employee(employee_id).await?;
        let Some(slot) = employee.fingerprint_id else {
            info!(employee_id = %employee_id, "No fingerprint assigned, nothing to delete");
            return Ok(DeleteOutcome::NothingToDelete);
        };

        self.dispatch_delete(device_id, employee_id, slot).await?;
        Ok(DeleteOutcome::Dispatched {
            fingerprint_id: slot,
        })
    }

    /// Send `delete_finger` and wait for the device to confirm.
    ///
    /// Resolves once the directory has been cleared.
    ///
    /// # Errors
    /// `NotFound` for an unknown employee, `Conflict` if a confirmation is
    /// already pending for the employee, `Device` if the device reports a
    /// failure, `Timeout` if it stays silent, `Transport` if the command
    /// cannot be sent, `Persistence` if the directory update fails.
    pub async fn delete_and_confirm(
        &self,
        device_id: &DeviceId,
        employee_id: EmployeeId,
    ) -> Result<DeleteOutcome> {
        let employee = self.find_employee(employee_id).await?;
        let Some(slot) = employee.fingerprint_id else {
            info!(employee_id = %employee_id, "No fingerprint assigned, nothing to delete");
            return Ok(DeleteOutcome::NothingToDelete);
        };

        self.confirm_delete(device_id, employee_id, slot).await?;
        Ok(DeleteOutcome::Confirmed {
            fingerprint_id: slot,
        })
    }

    /// Next slot an enrollment would receive right now.
    ///
    /// # Errors
    /// `Persistence` if the directory cannot be read.
    pub async fn next_available_id(&self) -> Result<FingerprintId> {
        let assigned = self.directory.assigned_fingerprint_ids().await?;
        allocator::next_available_id(assigned.into_iter().chain(self.sessions.reserved()))
    }

    /// Relay an enrollment prompt to the employee's room.
    pub fn handle_enroll_step(&self, device_id: &DeviceId, employee_id: EmployeeId, step: EnrollStep) {
        debug!(device_id = %device_id, employee_id = %employee_id, step = step.as_str(), "Enrollment step");
        self.emit(
            employee_id,
            ProgressEvent::EnrollStep {
                employee_id,
                step: step.as_str().to_string(),
            },
        );
    }

    /// Apply an `enroll_finger` result.
    pub async fn handle_enroll_result(
        &self,
        device_id: &DeviceId,
        employee_id: EmployeeId,
        reported: Option<FingerprintId>,
        outcome: &CommandOutcome,
    ) {
        let failure = outcome.failure_message();

        match self.sessions.settle(employee_id, reported, failure.as_deref()) {
            Resolution::Current { fingerprint_id, .. } => match failure {
                None => self.commit(device_id, employee_id, fingerprint_id, true).await,
                Some(message) => {
                    warn!(
                        device_id = %device_id,
                        employee_id = %employee_id,
                        fingerprint_id = %fingerprint_id,
                        error = %message,
                        "Fingerprint enrollment failed"
                    );
                    self.emit(
                        employee_id,
                        ProgressEvent::EnrollFailure {
                            employee_id,
                            error: message,
                        },
                    );
                }
            },
            Resolution::Stale { fingerprint_id } => {
                if failure.is_none() {
                    warn!(
                        device_id = %device_id,
                        employee_id = %employee_id,
                        fingerprint_id = %fingerprint_id,
                        "Superseded enrollment succeeded; deleting its slot"
                    );
                    self.spawn_cleanup(device_id.clone(), employee_id, fingerprint_id);
                } else {
                    debug!(employee_id = %employee_id, fingerprint_id = %fingerprint_id, "Superseded enrollment failed");
                }
            }
            Resolution::Duplicate { fingerprint_id } => {
                debug!(employee_id = %employee_id, fingerprint_id = %fingerprint_id, "Duplicate enrollment result");
            }
            Resolution::Untracked { fingerprint_id } => match (failure, fingerprint_id) {
                (None, Some(fingerprint_id)) => {
                    self.commit(device_id, employee_id, fingerprint_id, false).await;
                }
                (None, None) => {
                    warn!(
                        device_id = %device_id,
                        employee_id = %employee_id,
                        "Enrollment success without slot or session; ignoring"
                    );
                }
                (Some(message), _) => {
                    warn!(device_id = %device_id, employee_id = %employee_id, error = %message, "Fingerprint enrollment failed");
                    self.emit(
                        employee_id,
                        ProgressEvent::EnrollFailure {
                            employee_id,
                            error: message,
                        },
                    );
                }
            },
        }
    }

    /// Apply a `delete_finger` result.
    ///
    /// A waiting caller is answered after the directory update; without one
    /// a success still clears the directory.
    pub async fn handle_delete_result(
        &self,
        device_id: &DeviceId,
        employee_id: EmployeeId,
        reported: Option<FingerprintId>,
        outcome: &CommandOutcome,
    ) {
        let claim = if self.is_awaited_delete(employee_id, reported) {
            self.pending.take(&employee_id)
        } else {
            None
        };

        match (claim, outcome.failure_message()) {
            (Some(claim), None) => match self.release_slot(employee_id, reported).await {
                Ok(()) => {
                    info!(device_id = %device_id, employee_id = %employee_id, "Fingerprint deletion confirmed");
                    if !claim.resolve(()) {
                        debug!(employee_id = %employee_id, "Delete caller stopped waiting");
                    }
                }
                Err(error) => {
                    error!(
                        device_id = %device_id,
                        employee_id = %employee_id,
                        %error,
                        "Device deleted fingerprint but directory update failed"
                    );
                    claim.reject(error);
                }
            },
            (Some(claim), Some(message)) => {
                warn!(device_id = %device_id, employee_id = %employee_id, error = %message, "Fingerprint deletion failed");
                claim.reject(Error::device(Action::DeleteFinger.as_str(), message));
            }
            (None, None) => match self.release_slot(employee_id, reported).await {
                Ok(()) => {
                    info!(device_id = %device_id, employee_id = %employee_id, "Fingerprint deleted");
                }
                Err(error) => {
                    error!(
                        device_id = %device_id,
                        employee_id = %employee_id,
                        %error,
                        "Device deleted fingerprint but directory update failed"
                    );
                }
            },
            (None, Some(message)) => {
                warn!(
                    device_id = %device_id,
                    employee_id = %employee_id,
                    error = %message,
                    "Fingerprint deletion failed with no caller waiting"
                );
            }
        }
    }

    /// Relay a scan to the global room, resolving the slot to an employee.
    pub async fn handle_fingerprint_event(&self, device_id: &DeviceId, event: &FingerprintEvent) {
        let progress = match event {
            FingerprintEvent::Match {
                fingerprint_id,
                confidence,
            } => {
                let employee_id = match self.directory.find_by_fingerprint_id(*fingerprint_id).await {
                    Ok(employee) => employee.map(|e| e.id),
                    Err(error) => {
                        warn!(fingerprint_id = %fingerprint_id, %error, "Could not resolve matched slot");
                        None
                    }
                };
                info!(
                    device_id = %device_id,
                    fingerprint_id = %fingerprint_id,
                    employee_id = ?employee_id.map(EmployeeId::get),
                    "Fingerprint match"
                );
                ProgressEvent::FingerprintMatch {
                    device_id: device_id.to_string(),
                    employee_id,
                    fingerprint_id: *fingerprint_id,
                    confidence: *confidence,
                }
            }
            FingerprintEvent::Unknown => {
                info!(device_id = %device_id, "Unknown fingerprint");
                ProgressEvent::FingerprintUnknown {
                    device_id: device_id.to_string(),
                }
            }
        };

        self.notifier.emit(&Room::Global, progress.into());
    }

    async fn find_employee(&self, employee_id: EmployeeId) -> Result<Employee> {
        self.directory
            .find_by_id(employee_id)
            .await?
            .ok_or_else(|| Error::not_found("Employee", employee_id))
    }

    async fn allocate_for(&self, employee_id: EmployeeId) -> Result<FingerprintId> {
        let assigned = self.directory.assigned_fingerprint_ids().await?;
        let excluded = self.sessions.exclusions(employee_id);
        allocator::next_available_id(assigned.into_iter().chain(excluded))
    }

    async fn dispatch_delete(
        &self,
        device_id: &DeviceId,
        employee_id: EmployeeId,
        slot: FingerprintId,
    ) -> Result<()> {
        let command = CommandBuilder::new(Action::DeleteFinger)
            .finger(slot)
            .employee(employee_id);
        self.dispatcher.dispatch(device_id, command).await?;
        Ok(())
    }

    async fn confirm_delete(
        &self,
        device_id: &DeviceId,
        employee_id: EmployeeId,
        slot: FingerprintId,
    ) -> Result<()> {
        let pending = self.pending.register(employee_id, self.config.confirm_timeout)?;
        self.deleting().insert(employee_id, slot);
        let _awaited = AwaitedDelete {
            deleting: &self.deleting,
            employee_id,
            slot,
        };

        if let Err(error) = self.dispatch_delete(device_id, employee_id, slot).await {
            drop(self.pending.take(&employee_id));
            return Err(error);
        }

        pending.wait().await
    }

    fn deleting(&self) -> std::sync::MutexGuard<'_, HashMap<EmployeeId, FingerprintId>> {
        self.deleting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A result answers the waiting caller unless it names a different slot.
    fn is_awaited_delete(&self, employee_id: EmployeeId, reported: Option<FingerprintId>) -> bool {
        match (self.deleting().get(&employee_id), reported) {
            (Some(awaited), Some(reported)) => *awaited == reported,
            _ => true,
        }
    }

    /// Clear the employee's slot if it still holds the deleted one.
    async fn release_slot(&self, employee_id: EmployeeId, reported: Option<FingerprintId>) -> Result<()> {
        let Some(employee) = self.directory.find_by_id(employee_id).await? else {
            warn!(employee_id = %employee_id, "Deleted fingerprint belongs to unknown employee");
            return Ok(());
        };

        match (employee.fingerprint_id, reported) {
            (None, _) => Ok(()),
            (Some(current), Some(deleted)) if current != deleted => {
                info!(
                    employee_id = %employee_id,
                    fingerprint_id = %current,
                    deleted = %deleted,
                    "Employee holds a newer slot; directory left unchanged"
                );
                Ok(())
            }
            (Some(_), _) => {
                self.directory.set_fingerprint_id(employee_id, None).await?;
                Ok(())
            }
        }
    }

    async fn commit(
        &self,
        device_id: &DeviceId,
        employee_id: EmployeeId,
        slot: FingerprintId,
        tracked: bool,
    ) {
        let result = self.write_enrollment(employee_id, slot).await;

        if tracked {
            let outcome = result.as_ref().map(|_| ()).map_err(ToString::to_string);
            if !self.sessions.finish_commit(employee_id, slot, outcome) {
                debug!(employee_id = %employee_id, fingerprint_id = %slot, "Committed a superseded enrollment");
            }
        }

        match result {
            Ok(replaced) => {
                info!(
                    device_id = %device_id,
                    employee_id = %employee_id,
                    fingerprint_id = %slot,
                    "Fingerprint enrolled"
                );
                self.emit(
                    employee_id,
                    ProgressEvent::EnrollSuccess {
                        employee_id,
                        fingerprint_id: slot,
                    },
                );
                if let Some(old) = replaced {
                    warn!(employee_id = %employee_id, fingerprint_id = %old, "Deleting replaced slot");
                    self.spawn_cleanup(device_id.clone(), employee_id, old);
                }
            }
            Err(error) => {
                error!(
                    device_id = %device_id,
                    employee_id = %employee_id,
                    fingerprint_id = %slot,
                    %error,
                    "Device enrolled fingerprint but directory update failed"
                );
                self.emit(
                    employee_id,
                    ProgressEvent::EnrollFailure {
                        employee_id,
                        error: error.to_string(),
                    },
                );
            }
        }
    }

    /// Assign `slot` to the employee. Returns the slot it replaced, if any.
    async fn write_enrollment(
        &self,
        employee_id: EmployeeId,
        slot: FingerprintId,
    ) -> Result<Option<FingerprintId>> {
        if let Some(holder) = self.directory.find_by_fingerprint_id(slot).await?
            && holder.id != employee_id
        {
            return Err(Error::conflict(format!(
                "fingerprint slot {slot} held by employee {}",
                holder.id
            )));
        }

        let employee = self.find_employee(employee_id).await?;
        self.directory.set_fingerprint_id(employee_id, Some(slot)).await?;
        Ok(employee.fingerprint_id.filter(|old| *old != slot))
    }

    fn spawn_cleanup(&self, device_id: DeviceId, employee_id: EmployeeId, slot: FingerprintId) {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let command = CommandBuilder::new(Action::DeleteFinger)
                .finger(slot)
                .employee(employee_id);
            if let Err(error) = dispatcher.dispatch(&device_id, command).await {
                warn!(device_id = %device_id, fingerprint_id = %slot, %error, "Slot cleanup failed");
            }
        });
    }

    fn emit(&self, employee_id: EmployeeId, event: ProgressEvent) {
        self.notifier.emit(&Room::Employee(employee_id), event.into());
    }
}

/// Fails the session if `enroll` is dropped before the command is sent.
struct AllocationGuard<'a> {
    sessions: &'a EnrollmentSessions,
    employee_id: EmployeeId,
}

impl Drop for AllocationGuard<'_> {
    fn drop(&mut self) {
        self.sessions.abandon(self.employee_id);
    }
}

/// Marks the slot a blocking delete waits on; cleared however the wait ends.
struct AwaitedDelete<'a> {
    deleting: &'a Mutex<HashMap<EmployeeId, FingerprintId>>,
    employee_id: EmployeeId,
    slot: FingerprintId,
}

impl Drop for AwaitedDelete<'_> {
    fn drop(&mut self) {
        let mut deleting = self.deleting.lock().unwrap_or_else(PoisonError::into_inner);
        if deleting.get(&self.employee_id) == Some(&self.slot) {
            deleting.remove(&self.employee_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanlink_notify::Event;
    use scanlink_storage::{MemoryEmployeeDirectory, NewEmployee};
    use scanlink_transport::{InMemoryBroker, Subscription};
    use serde_json::Value;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(Room, Event)>>,
    }

    impl Notifier for Recorder {
        fn emit(&self, room: &Room, event: Event) {
            self.events.lock().unwrap().push((*room, event));
        }
    }

    impl Recorder {
        fn names(&self) -> Vec<String> {
            self.events.lock().unwrap().iter().map(|(_, e)| e.name.clone()).collect()
        }
    }

    type Manager = FingerprintManager<InMemoryBroker, Arc<MemoryEmployeeDirectory>>;

    struct Fixture {
        manager: Arc<Manager>,
        directory: Arc<MemoryEmployeeDirectory>,
        recorder: Arc<Recorder>,
        commands: Subscription,
        broker: InMemoryBroker,
    }

    fn slot(n: u32) -> FingerprintId {
        FingerprintId::new(n).unwrap()
    }

    fn esp01() -> DeviceId {
        DeviceId::new("esp01").unwrap()
    }

    const EMP: EmployeeId = EmployeeId::new(7);

    fn fixture(employees: Vec<NewEmployee>) -> Fixture {
        let broker = InMemoryBroker::new();
        let commands = broker.subscribe(["device/+/command"]);
        let directory = Arc::new(MemoryEmployeeDirectory::with_employees(employees).unwrap());
        let recorder = Arc::new(Recorder::default());
        let manager = Arc::new(FingerprintManager::new(
            broker.clone(),
            directory.clone(),
            recorder.clone(),
            LifecycleConfig::default().confirm_timeout(Duration::from_secs(10)),
        ));
        Fixture {
            manager,
            directory,
            recorder,
            commands,
            broker,
        }
    }

    fn next_command(commands: &mut Subscription) -> Value {
        serde_json::from_slice(&commands.try_recv().unwrap().payload).unwrap()
    }

    async fn fingerprint_of(directory: &MemoryEmployeeDirectory, id: EmployeeId) -> Option<FingerprintId> {
        directory.find_by_id(id).await.unwrap().unwrap().fingerprint_id
    }

    #[tokio::test]
    async fn test_enroll_unknown_employee_sends_nothing() {
        let mut f = fixture(vec![]);
        let result = f.manager.enroll(&esp01(), EMP).await;

        assert_eq!(result, Err(Error::not_found("Employee", 7)));
        assert!(f.commands.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_enroll_allocates_and_dispatches() {
        let mut f = fixture(vec![
            NewEmployee::new(EMP, "A"),
            NewEmployee::new(EmployeeId::new(1), "B").fingerprint(slot(1)),
            NewEmployee::new(EmployeeId::new(2), "C").fingerprint(slot(3)),
        ]);

        let ticket = f.manager.enroll(&esp01(), EMP).await.unwrap();
        assert_eq!(ticket.fingerprint_id, slot(2));
        assert_eq!(ticket.status, "started");

        let command = next_command(&mut f.commands);
        assert_eq!(command["action"], "enroll_finger");
        assert_eq!(command["employeeID"], 7);
        assert_eq!(command["fingerID"], 2);

        assert_eq!(f.recorder.names(), ["enroll_started"]);
        assert_eq!(
            f.manager.enrollment_state(EMP),
            EnrollmentState::AwaitingDeviceResult {
                fingerprint_id: slot(2)
            }
        );
        // Nothing is written before the device confirms.
        assert_eq!(fingerprint_of(&f.directory, EMP).await, None);
    }

    #[tokio::test]
    async fn test_enroll_success_commits() {
        let f = fixture(vec![NewEmployee::new(EMP, "A")]);
        f.manager.enroll(&esp01(), EMP).await.unwrap();

        f.manager
            .handle_enroll_result(&esp01(), EMP, Some(slot(1)), &CommandOutcome::Success)
            .await;

        assert_eq!(fingerprint_of(&f.directory, EMP).await, Some(slot(1)));
        assert_eq!(f.recorder.names(), ["enroll_started", "enroll_success"]);
        assert_eq!(
            f.manager.enrollment_state(EMP),
            EnrollmentState::Committed {
                fingerprint_id: slot(1)
            }
        );
    }

    #[tokio::test]
    async fn test_enroll_failure_leaves_directory() {
        let f = fixture(vec![NewEmployee::new(EMP, "A")]);
        f.manager.enroll(&esp01(), EMP).await.unwrap();

        let outcome = CommandOutcome::Failure {
            status: "error".into(),
            message: Some("Fingers did not match".into()),
        };
        f.manager
            .handle_enroll_result(&esp01(), EMP, Some(slot(1)), &outcome)
            .await;

        assert_eq!(fingerprint_of(&f.directory, EMP).await, None);
        let events = f.recorder.events.lock().unwrap();
        let (room, failure) = events.last().unwrap();
        assert_eq!(*room, Room::Employee(EMP));
        assert_eq!(failure.name, "enroll_failure");
        assert_eq!(failure.payload["error"], "Fingers did not match");
    }

    #[tokio::test]
    async fn test_commit_failure_is_reported() {
        let f = fixture(vec![NewEmployee::new(EMP, "A")]);
        f.manager.enroll(&esp01(), EMP).await.unwrap();
        f.directory.fail_writes(true);

        f.manager
            .handle_enroll_result(&esp01(), EMP, Some(slot(1)), &CommandOutcome::Success)
            .await;

        assert_eq!(f.recorder.names(), ["enroll_started", "enroll_failure"]);
        assert!(matches!(
            f.manager.enrollment_state(EMP),
            EnrollmentState::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_commit_refuses_slot_held_by_other_employee() {
        let f = fixture(vec![
            NewEmployee::new(EMP, "A"),
            NewEmployee::new(EmployeeId::new(8), "B").fingerprint(slot(5)),
        ]);

        // No session: result names a slot someone else holds.
        f.manager
            .handle_enroll_result(&esp01(), EMP, Some(slot(5)), &CommandOutcome::Success)
            .await;

        assert_eq!(fingerprint_of(&f.directory, EMP).await, None);
        assert_eq!(f.recorder.names(), ["enroll_failure"]);
    }

    #[tokio::test]
    async fn test_untracked_success_commits_reported_slot() {
        let f = fixture(vec![NewEmployee::new(EMP, "A")]);

        f.manager
            .handle_enroll_result(&esp01(), EMP, Some(slot(9)), &CommandOutcome::Success)
            .await;

        assert_eq!(fingerprint_of(&f.directory, EMP).await, Some(slot(9)));
    }

    #[tokio::test]
    async fn test_enroll_step_forwarded() {
        let f = fixture(vec![NewEmployee::new(EMP, "A")]);
        f.manager
            .handle_enroll_step(&esp01(), EMP, EnrollStep::RemoveFinger);

        let events = f.recorder.events.lock().unwrap();
        assert_eq!(events[0].1.name, "enroll_step");
        assert_eq!(events[0].1.payload["step"], "remove_finger");
    }

    #[tokio::test]
    async fn test_fire_and_forget_delete_nothing_to_delete() {
        let mut f = fixture(vec![NewEmployee::new(EMP, "A")]);

        let outcome = f.manager.delete(&esp01(), EMP).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::NothingToDelete);
        assert!(f.commands.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_fire_and_forget_delete_then_response_clears() {
        let mut f = fixture(vec![NewEmployee::new(EMP, "A").fingerprint(slot(3))]);

        let outcome = f.manager.delete(&esp01(), EMP).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Dispatched { fingerprint_id: slot(3) });

        let command = next_command(&mut f.commands);
        assert_eq!(command["action"], "delete_finger");
        assert_eq!(command["fingerID"], 3);

        // Directory untouched until the device answers.
        assert_eq!(fingerprint_of(&f.directory, EMP).await, Some(slot(3)));

        f.manager
            .handle_delete_result(&esp01(), EMP, Some(slot(3)), &CommandOutcome::Success)
            .await;
        assert_eq!(fingerprint_of(&f.directory, EMP).await, None);
    }

    #[tokio::test]
    async fn test_stale_delete_does_not_clear_newer_slot() {
        let f = fixture(vec![NewEmployee::new(EMP, "A").fingerprint(slot(4))]);

        f.manager
            .handle_delete_result(&esp01(), EMP, Some(slot(2)), &CommandOutcome::Success)
            .await;
        assert_eq!(fingerprint_of(&f.directory, EMP).await, Some(slot(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_and_confirm_resolves_after_directory_update() {
        let f = fixture(vec![NewEmployee::new(EMP, "A").fingerprint(slot(3))]);

        let manager = f.manager.clone();
        let waiter = tokio::spawn(async move { manager.delete_and_confirm(&esp01(), EMP).await });

        while f.manager.pending_confirmations() == 0 {
            tokio::task::yield_now().await;
        }
        f.manager
            .handle_delete_result(&esp01(), EMP, Some(slot(3)), &CommandOutcome::Success)
            .await;

        assert_eq!(
            waiter.await.unwrap(),
            Ok(DeleteOutcome::Confirmed { fingerprint_id: slot(3) })
        );
        assert_eq!(fingerprint_of(&f.directory, EMP).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_and_confirm_device_failure() {
        let f = fixture(vec![NewEmployee::new(EMP, "A").fingerprint(slot(3))]);

        let manager = f.manager.clone();
        let waiter = tokio::spawn(async move { manager.delete_and_confirm(&esp01(), EMP).await });
        while f.manager.pending_confirmations() == 0 {
            tokio::task::yield_now().await;
        }

        let outcome = CommandOutcome::Failure {
            status: "error".into(),
            message: Some("Slot empty".into()),
        };
        f.manager
            .handle_delete_result(&esp01(), EMP, Some(slot(3)), &outcome)
            .await;

        assert_eq!(
            waiter.await.unwrap(),
            Err(Error::device("delete_finger", "Slot empty"))
        );
        assert_eq!(fingerprint_of(&f.directory, EMP).await, Some(slot(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_and_confirm_timeout_then_late_success() {
        let f = fixture(vec![NewEmployee::new(EMP, "A").fingerprint(slot(3))]);

        let result = f.manager.delete_and_confirm(&esp01(), EMP).await;
        assert_eq!(result, Err(Error::timeout(10_000)));
        assert_eq!(fingerprint_of(&f.directory, EMP).await, Some(slot(3)));
        assert_eq!(f.manager.pending_confirmations(), 0);

        f.manager
            .handle_delete_result(&esp01(), EMP, Some(slot(3)), &CommandOutcome::Success)
            .await;
        assert_eq!(fingerprint_of(&f.directory, EMP).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_and_confirm_transport_failure_leaves_no_pending() {
        let f = fixture(vec![NewEmployee::new(EMP, "A").fingerprint(slot(3))]);
        f.broker.set_offline(true);

        let result = f.manager.delete_and_confirm(&esp01(), EMP).await;
        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(f.manager.pending_confirmations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_delete_and_confirm_clears_awaited_slot() {
        let f = fixture(vec![NewEmployee::new(EMP, "A").fingerprint(slot(3))]);

        let device = esp01();
        let wait = f.manager.delete_and_confirm(&device, EMP);
        assert!(tokio::time::timeout(Duration::from_secs(1), wait).await.is_err());
        assert!(f.manager.deleting().is_empty());

        // The device answer still reconciles the directory.
        f.manager
            .handle_delete_result(&esp01(), EMP, Some(slot(3)), &CommandOutcome::Success)
            .await;
        assert_eq!(fingerprint_of(&f.directory, EMP).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_enroll_during_release_fails_session() {
        let f = fixture(vec![NewEmployee::new(EMP, "A").fingerprint(slot(3))]);

        let device = esp01();
        let enroll = f.manager.enroll(&device, EMP);
        assert!(tokio::time::timeout(Duration::from_secs(1), enroll).await.is_err());

        assert_eq!(
            f.manager.enrollment_state(EMP),
            EnrollmentState::Failed {
                reason: "enrollment cancelled".into()
            }
        );
        assert!(f.manager.deleting().is_empty());
        assert!(f.manager.sessions.reserved().is_empty());
    }

    #[tokio::test]
    async fn test_next_available_id_counts_in_flight_enrollments() {
        let f = fixture(vec![
            NewEmployee::new(EMP, "A"),
            NewEmployee::new(EmployeeId::new(8), "B").fingerprint(slot(1)),
        ]);
        assert_eq!(f.manager.next_available_id().await.unwrap(), slot(2));

        f.manager.enroll(&esp01(), EMP).await.unwrap();
        assert_eq!(f.manager.next_available_id().await.unwrap(), slot(3));
    }

    #[tokio::test]
    async fn test_fingerprint_match_resolves_employee() {
        let f = fixture(vec![NewEmployee::new(EMP, "A").fingerprint(slot(3))]);

        f.manager
            .handle_fingerprint_event(
                &esp01(),
                &FingerprintEvent::Match {
                    fingerprint_id: slot(3),
                    confidence: Some(87.0),
                },
            )
            .await;
        f.manager
            .handle_fingerprint_event(&esp01(), &FingerprintEvent::Unknown)
            .await;

        let events = f.recorder.events.lock().unwrap();
        assert_eq!(events[0].0, Room::Global);
        assert_eq!(events[0].1.name, "fingerprint_match");
        assert_eq!(events[0].1.payload["employeeID"], 7);
        assert_eq!(events[0].1.payload["deviceId"], "esp01");
        assert_eq!(events[1].1.name, "fingerprint_unknown");
    }
}
