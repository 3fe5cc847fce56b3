//! Applies and reverts the scancode map without a logoff.
//!
//! # What happens on `escape(true)` (for beginners)
//!
//! 1. Reclaim anything left over from an earlier timed-out injection.
//! 2. Enable the debug privilege so the session process can be opened.
//! 3. Read the current `Scancode Map` value and remember it byte-for-byte.
//! 4. Merge the configured fix entries into it and write the result.
//! 5. Inject a routine into the session process that borrows the engine's
//!    user token and calls `UpdatePerUserSystemParameters`, which makes the
//!    OS pick up the new map immediately.
//!
//! `escape(false)` writes the remembered bytes back (or deletes the value if
//! there were none) and injects again.
//!
//! A remote routine that does not finish within the timeout is not an error:
//! it usually finishes a little later. The call reports
//! [`EscapeStatus::TimedOutPending`], the coordinator proceeds as if it had
//! worked, and a later poll reports the late completion.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use scanmap_core::{
    InjectParamBlock, OsGeneration, ParamBlockError, ScancodeEntry, ScancodeMap, StatusCode,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::message_target::MessageTarget;
use crate::application::remote_injector::{
    InjectError, InjectOutcome, ProcessMemory, RemoteInjector,
};

/// Registry value holding the map.
pub const SCANCODE_MAP_VALUE: &str = "Scancode Map";

/// Key of the per-user hive, relative to `HKEY_CURRENT_USER`.
pub const USER_KEYBOARD_LAYOUT_KEY: &str = "Control Panel\\Keyboard Layout";

/// Key of the system hive, relative to `HKEY_LOCAL_MACHINE`.
pub const SYSTEM_KEYBOARD_LAYOUT_KEY: &str = "SYSTEM\\CurrentControlSet\\Control\\Keyboard Layout";

/// Exit code of a remote routine that ran to completion.
pub const REMOTE_SUCCESS: u32 = 0;

// ── Collaborator traits ───────────────────────────────────────────────────────

/// Binary value access on one registry key.
///
/// Writes are all-or-nothing: a failed write leaves the old value in place.
#[cfg_attr(test, mockall::automock)]
pub trait Registry: Send + Sync {
    /// `Ok(None)` when the value does not exist.
    fn read_binary(&self, name: &str) -> io::Result<Option<Vec<u8>>>;
    fn write_binary(&self, name: &str, data: &[u8]) -> io::Result<()>;
    /// Succeeds when the value is already absent.
    fn delete_value(&self, name: &str) -> io::Result<()>;
    fn is_writable(&self) -> bool;
    /// Adjusts access control on the key so the session process can read it.
    /// Failures carry one of the ACL status codes.
    fn prepare_access(&self) -> Result<(), StatusCode>;
}

/// Session discovery, privilege and symbol resolution on the host OS.
pub trait SessionPlatform: Send + Sync {
    /// Process id of the session process (winlogon) for the current session.
    fn find_session_process(&self) -> io::Result<u32>;
    fn current_pid(&self) -> u32;
    fn os_generation(&self) -> OsGeneration;
    fn enable_debug_privilege(&self) -> Result<(), PrivilegeError>;
    /// Fills every address slot of `block` from the local process.
    fn resolve_symbols(&self, block: &mut InjectParamBlock) -> io::Result<()>;
    /// Machine code of the routine executed in the session process.
    fn entry_stub(&self) -> io::Result<Vec<u8>>;
}

/// Failures while enabling the debug privilege.
#[derive(Debug, Error)]
pub enum PrivilegeError {
    #[error("cannot open the engine process token: {0}")]
    OpenProcess(io::Error),

    #[error("cannot look up the debug privilege: {0}")]
    Lookup(io::Error),

    #[error("cannot enable the debug privilege: {0}")]
    Adjust(io::Error),
}

impl PrivilegeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PrivilegeError::OpenProcess(_) => StatusCode::OpenCurrentProcess,
            PrivilegeError::Lookup(_) => StatusCode::LookupPrivilege,
            PrivilegeError::Adjust(_) => StatusCode::AdjustPrivilege,
        }
    }
}

// ── Errors and outcomes ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("cannot locate the session process: {0}")]
    SessionPid(io::Error),

    #[error("neither the user nor the system keyboard layout key is writable")]
    NoWritableHive,

    #[error("cannot build the parameter block: {0}")]
    Template(#[from] ParamBlockError),

    #[error("cannot prepare the remote routine: {0}")]
    RemoteImage(io::Error),

    #[error(transparent)]
    Privilege(#[from] PrivilegeError),

    #[error("cannot prepare registry access: {0}")]
    RegistryAccess(StatusCode),

    #[error("cannot read the scancode map: {0}")]
    ReadMap(io::Error),

    #[error("cannot write the scancode map: {0}")]
    WriteMap(io::Error),

    #[error(transparent)]
    Inject(#[from] InjectError),

    #[error("remote routine failed with exit code {exit_code}")]
    RemoteRoutine { exit_code: u32 },
}

impl CoordinatorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoordinatorError::SessionPid(_) => StatusCode::GetSessionPid,
            CoordinatorError::NoWritableHive => StatusCode::WriteScancodeMap,
            CoordinatorError::Template(_) | CoordinatorError::RemoteImage(_) => {
                StatusCode::InsufficientBuffer
            }
            CoordinatorError::Privilege(e) => e.status_code(),
            CoordinatorError::RegistryAccess(code) => *code,
            CoordinatorError::ReadMap(_) => StatusCode::ReadScancodeMap,
            CoordinatorError::WriteMap(_) => StatusCode::WriteScancodeMap,
            CoordinatorError::Inject(e) => e.status_code(),
            // The routine exits with a status number for the step it could not
            // take; any other non-zero exit is the reload call itself failing.
            CoordinatorError::RemoteRoutine { exit_code } => StatusCode::try_from(*exit_code)
                .ok()
                .filter(|code| code.is_fatal())
                .unwrap_or(StatusCode::RemoteRoutineFailed),
        }
    }
}

/// Non-failing result of one `escape` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeStatus {
    Applied,
    Restored,
    AlreadyApplied,
    AlreadyRestored,
    /// The registry was updated but the remote routine had not finished in
    /// time. It may still succeed; see [`InjectionCoordinator::poll_pending`].
    TimedOutPending,
}

impl EscapeStatus {
    pub fn status_code(self) -> StatusCode {
        match self {
            EscapeStatus::TimedOutPending => StatusCode::InjectionTimeout,
            _ => StatusCode::Success,
        }
    }
}

/// What one escape call observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscapeReport {
    pub status: EscapeStatus,
    /// Earlier timed-out injections found finished by the opening poll.
    pub recovered_after_timeout: usize,
}

/// Result of a reclamation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    Clear,
    StillPending(usize),
    RecoveredAfterTimeout(usize),
}

impl PendingStatus {
    pub fn status_code(self) -> StatusCode {
        match self {
            PendingStatus::Clear => StatusCode::Success,
            PendingStatus::StillPending(_) => StatusCode::InjectionTimeout,
            PendingStatus::RecoveredAfterTimeout(_) => StatusCode::InjectionRecovered,
        }
    }
}

/// Observable coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Applied,
    /// The last escape failed with this code.
    Error(StatusCode),
}

// ── Coordinator ───────────────────────────────────────────────────────────────

/// Everything the coordinator needs besides its owner window.
pub struct CoordinatorParts<S, M> {
    pub session: S,
    pub memory: M,
    /// Per-user hive, tried first.
    pub primary: Box<dyn Registry>,
    /// System hive.
    pub fallback: Box<dyn Registry>,
    pub fix_entries: Vec<ScancodeEntry>,
    pub timeout: Duration,
}

struct AppliedMap {
    /// Value before the first apply; `None` if it did not exist.
    previous: Option<Vec<u8>>,
    written: Vec<u8>,
}

pub struct InjectionCoordinator<S: SessionPlatform, M: ProcessMemory> {
    session: S,
    injector: RemoteInjector<M>,
    registry: Box<dyn Registry>,
    owner: Arc<dyn MessageTarget>,
    failure_message_id: u32,
    fix_entries: Vec<ScancodeEntry>,
    timeout: Duration,
    session_pid: u32,
    template: InjectParamBlock,
    stub: Vec<u8>,
    applied: Option<AppliedMap>,
    last_error: Option<StatusCode>,
}

impl<S: SessionPlatform, M: ProcessMemory> InjectionCoordinator<S, M> {
    /// Locates the session process, picks a writable hive and prepares the
    /// parameter block.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::SessionPid`] (1027) if no session process is found.
    /// - [`CoordinatorError::NoWritableHive`] (1026) if neither key is writable.
    /// - [`CoordinatorError::Template`] or [`CoordinatorError::RemoteImage`]
    ///   (1002) if the parameter block or the routine cannot be prepared.
    pub fn init(
        parts: CoordinatorParts<S, M>,
        owner: Arc<dyn MessageTarget>,
        failure_message_id: u32,
    ) -> Result<Self, CoordinatorError> {
        let CoordinatorParts {
            session,
            memory,
            primary,
            fallback,
            fix_entries,
            timeout,
        } = parts;

        let session_pid = session
            .find_session_process()
            .map_err(CoordinatorError::SessionPid)?;

        let registry = if primary.is_writable() {
            primary
        } else if fallback.is_writable() {
            info!("per-user keyboard layout key is read-only; using the system key");
            fallback
        } else {
            return Err(CoordinatorError::NoWritableHive);
        };

        let mut template = InjectParamBlock::template(session.os_generation(), session.current_pid())?;
        session
            .resolve_symbols(&mut template)
            .map_err(CoordinatorError::RemoteImage)?;
        template.validate()?;
        let stub = session.entry_stub().map_err(CoordinatorError::RemoteImage)?;

        info!(session_pid, stub_len = stub.len(), "injection coordinator ready");
        Ok(Self {
            session,
            injector: RemoteInjector::new(memory),
            registry,
            owner,
            failure_message_id,
            fix_entries,
            timeout,
            session_pid,
            template,
            stub,
            applied: None,
            last_error: None,
        })
    }

    pub fn session_pid(&self) -> u32 {
        self.session_pid
    }

    pub fn state(&self) -> CoordinatorState {
        match (self.last_error, &self.applied) {
            (Some(code), _) => CoordinatorState::Error(code),
            (None, Some(_)) => CoordinatorState::Applied,
            (None, None) => CoordinatorState::Idle,
        }
    }

    pub fn injector(&self) -> &RemoteInjector<M> {
        &self.injector
    }

    /// Applies (`true`) or restores (`false`) the scancode map.
    ///
    /// # Errors
    ///
    /// Fatal failures are returned and also posted to the owner window as
    /// `failure_message_id` with the status code in `wParam`.
    pub fn escape(&mut self, apply: bool) -> Result<EscapeReport, CoordinatorError> {
        let recovered_after_timeout = match self.poll_pending() {
            PendingStatus::RecoveredAfterTimeout(n) => n,
            _ => 0,
        };

        let result = if apply { self.fix() } else { self.restore() };
        match result {
            Ok(status) => {
                self.last_error = None;
                Ok(EscapeReport {
                    status,
                    recovered_after_timeout,
                })
            }
            Err(e) => {
                let code = e.status_code();
                error!(%code, apply, "escape failed: {e}");
                self.last_error = Some(code);
                self.report_failure(code);
                Err(e)
            }
        }
    }

    /// Reclaims finished injections without blocking.
    pub fn poll_pending(&self) -> PendingStatus {
        let report = self.injector.reclaim();
        if report.recovered_after_timeout > 0 {
            info!(
                recovered = report.recovered_after_timeout,
                "timed-out remote routine finished late"
            );
            PendingStatus::RecoveredAfterTimeout(report.recovered_after_timeout)
        } else if report.pending > 0 {
            PendingStatus::StillPending(report.pending)
        } else {
            PendingStatus::Clear
        }
    }

    fn fix(&mut self) -> Result<EscapeStatus, CoordinatorError> {
        if self.applied.is_some() {
            debug!("scancode map already applied");
            return Ok(EscapeStatus::AlreadyApplied);
        }
        self.acquire_privileges()?;

        let previous = self
            .registry
            .read_binary(SCANCODE_MAP_VALUE)
            .map_err(CoordinatorError::ReadMap)?;
        let current = match previous.as_deref() {
            Some(bytes) => ScancodeMap::from_bytes(bytes).unwrap_or_else(|e| {
                warn!("existing scancode map is malformed ({e}); replacing it");
                ScancodeMap::empty()
            }),
            None => ScancodeMap::empty(),
        };
        let written = current.merged_with(&self.fix_entries).to_bytes();
        self.registry
            .write_binary(SCANCODE_MAP_VALUE, &written)
            .map_err(CoordinatorError::WriteMap)?;
        debug!(bytes = written.len(), "scancode map written");

        match self.run_injection() {
            Ok(timed_out) => {
                self.applied = Some(AppliedMap { previous, written });
                Ok(if timed_out {
                    EscapeStatus::TimedOutPending
                } else {
                    info!("scancode map applied");
                    EscapeStatus::Applied
                })
            }
            Err(e) => {
                self.roll_back(previous.as_deref());
                Err(e)
            }
        }
    }

    fn restore(&mut self) -> Result<EscapeStatus, CoordinatorError> {
        let Some(applied) = self.applied.take() else {
            debug!("scancode map already restored");
            return Ok(EscapeStatus::AlreadyRestored);
        };

        let outcome = self
            .acquire_privileges()
            .and_then(|()| {
                self.put_value(applied.previous.as_deref())
                    .map_err(CoordinatorError::WriteMap)
            })
            .and_then(|()| match self.run_injection() {
                Ok(timed_out) => Ok(timed_out),
                Err(e) => {
                    self.roll_back(Some(&applied.written));
                    Err(e)
                }
            });

        match outcome {
            Ok(timed_out) => Ok(if timed_out {
                EscapeStatus::TimedOutPending
            } else {
                info!("scancode map restored");
                EscapeStatus::Restored
            }),
            Err(e) => {
                self.applied = Some(applied);
                Err(e)
            }
        }
    }

    fn acquire_privileges(&self) -> Result<(), CoordinatorError> {
        debug!("acquiring privileges");
        self.session.enable_debug_privilege()?;
        self.registry
            .prepare_access()
            .map_err(CoordinatorError::RegistryAccess)
    }

    /// Writes `bytes`, or deletes the value when `bytes` is `None`.
    fn put_value(&self, bytes: Option<&[u8]>) -> io::Result<()> {
        match bytes {
            Some(bytes) => self.registry.write_binary(SCANCODE_MAP_VALUE, bytes),
            None => self.registry.delete_value(SCANCODE_MAP_VALUE),
        }
    }

    fn roll_back(&self, bytes: Option<&[u8]>) {
        match self.put_value(bytes) {
            Ok(()) => info!("registry rolled back after failed injection"),
            Err(e) => error!("registry rollback failed: {e}"),
        }
    }

    /// Runs the remote routine. `Ok(true)` means it timed out and is pending.
    fn run_injection(&self) -> Result<bool, CoordinatorError> {
        let outcome = self.injector.inject(
            self.session_pid,
            self.template.as_wire_bytes(),
            &self.stub,
            self.timeout,
        )?;
        match outcome {
            InjectOutcome::Completed {
                exit_code: REMOTE_SUCCESS,
            } => Ok(false),
            InjectOutcome::Completed { exit_code } => {
                Err(CoordinatorError::RemoteRoutine { exit_code })
            }
            InjectOutcome::TimedOut => Ok(true),
        }
    }

    fn report_failure(&self, code: StatusCode) {
        if let Err(e) = self
            .owner
            .post_message(self.failure_message_id, code.as_u32() as usize, 0)
        {
            warn!("cannot post failure message: {e}");
        }
    }
}

impl<S: SessionPlatform, M: ProcessMemory> Drop for InjectionCoordinator<S, M> {
    fn drop(&mut self) {
        if let PendingStatus::StillPending(n) = self.poll_pending() {
            warn!(pending = n, "coordinator dropped with injections still running");
        }
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::infrastructure::process::mock::{MockProcessMemory, ProcessFault};
    use crate::infrastructure::session::mock::MockSession;
    use crate::infrastructure::window::mock::MockWindow;

    const FAILURE_MSG: u32 = 0x8100;

    fn writable_registry() -> MockRegistry {
        let mut registry = MockRegistry::new();
        registry.expect_is_writable().return_const(true);
        registry.expect_prepare_access().returning(|| Ok(()));
        registry
    }

    fn read_only_registry() -> MockRegistry {
        let mut registry = MockRegistry::new();
        registry.expect_is_writable().return_const(false);
        registry
    }

    fn parts(
        memory: &MockProcessMemory,
        primary: MockRegistry,
        fallback: MockRegistry,
    ) -> CoordinatorParts<MockSession, MockProcessMemory> {
        memory.add_process(612);
        CoordinatorParts {
            session: MockSession::new(612),
            memory: memory.clone(),
            primary: Box::new(primary),
            fallback: Box::new(fallback),
            fix_entries: vec![ScancodeEntry::new(0x3A, 0x1D)],
            timeout: Duration::from_millis(5000),
        }
    }

    #[test]
    fn test_init_fails_without_writable_hive() {
        // Arrange
        let memory = MockProcessMemory::new();
        let parts = parts(&memory, read_only_registry(), read_only_registry());

        // Act
        let result = InjectionCoordinator::init(parts, Arc::new(MockWindow::new()), FAILURE_MSG);

        // Assert
        let err = result.err().unwrap();
        assert_eq!(err.status_code(), StatusCode::WriteScancodeMap);
    }

    #[test]
    fn test_init_fails_without_session_process() {
        let memory = MockProcessMemory::new();
        let mut parts = parts(&memory, writable_registry(), read_only_registry());
        parts.session = MockSession::without_session_process();

        let err = InjectionCoordinator::init(parts, Arc::new(MockWindow::new()), FAILURE_MSG)
            .err()
            .unwrap();

        assert_eq!(err.status_code(), StatusCode::GetSessionPid);
    }

    #[test]
    fn test_init_falls_back_to_system_hive() {
        // Arrange
        let memory = MockProcessMemory::new();
        let mut fallback = writable_registry();
        fallback
            .expect_read_binary()
            .with(eq(SCANCODE_MAP_VALUE))
            .times(1)
            .returning(|_| Ok(None));
        fallback.expect_write_binary().times(1).returning(|_, _| Ok(()));
        let parts = parts(&memory, read_only_registry(), fallback);

        // Act
        let mut coordinator =
            InjectionCoordinator::init(parts, Arc::new(MockWindow::new()), FAILURE_MSG).unwrap();
        let report = coordinator.escape(true).unwrap();

        // Assert
        assert_eq!(report.status, EscapeStatus::Applied);
    }

    #[test]
    fn test_privilege_failure_is_fatal_and_skips_injection() {
        // Arrange
        let memory = MockProcessMemory::new();
        let mut primary = writable_registry();
        primary.expect_read_binary().never();
        primary.expect_write_binary().never();
        let parts = parts(&memory, primary, read_only_registry());
        parts.session.fail_privilege();
        let window = Arc::new(MockWindow::new());
        let mut coordinator =
            InjectionCoordinator::init(parts, window.clone(), FAILURE_MSG).unwrap();

        // Act
        let err = coordinator.escape(true).unwrap_err();

        // Assert
        assert_eq!(err.status_code(), StatusCode::AdjustPrivilege);
        assert_eq!(memory.stats().threads_started, 0);
        assert_eq!(
            window.posted(),
            vec![(FAILURE_MSG, StatusCode::AdjustPrivilege.as_u32() as usize, 0)]
        );
        assert_eq!(
            coordinator.state(),
            CoordinatorState::Error(StatusCode::AdjustPrivilege)
        );
    }

    #[test]
    fn test_registry_access_failure_reports_acl_code() {
        let memory = MockProcessMemory::new();
        let mut primary = MockRegistry::new();
        primary.expect_is_writable().return_const(true);
        primary
            .expect_prepare_access()
            .returning(|| Err(StatusCode::SetSecurityInfo));
        let parts = parts(&memory, primary, read_only_registry());
        let mut coordinator =
            InjectionCoordinator::init(parts, Arc::new(MockWindow::new()), FAILURE_MSG).unwrap();

        let err = coordinator.escape(true).unwrap_err();

        assert_eq!(err.status_code(), StatusCode::SetSecurityInfo);
    }

    #[test]
    fn test_write_failure_is_fatal_and_skips_injection() {
        let memory = MockProcessMemory::new();
        let mut primary = writable_registry();
        primary.expect_read_binary().returning(|_| Ok(None));
        primary
            .expect_write_binary()
            .returning(|_, _| Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")));
        let parts = parts(&memory, primary, read_only_registry());
        let mut coordinator =
            InjectionCoordinator::init(parts, Arc::new(MockWindow::new()), FAILURE_MSG).unwrap();

        let err = coordinator.escape(true).unwrap_err();

        assert_eq!(err.status_code(), StatusCode::WriteScancodeMap);
        assert_eq!(memory.stats().threads_started, 0);
        assert_eq!(
            coordinator.state(),
            CoordinatorState::Error(StatusCode::WriteScancodeMap)
        );
    }

    #[test]
    fn test_injection_failure_rolls_back_by_deleting_new_value() {
        // Arrange
        let memory = MockProcessMemory::new();
        let mut primary = writable_registry();
        primary.expect_read_binary().returning(|_| Ok(None));
        primary.expect_write_binary().times(1).returning(|_, _| Ok(()));
        primary
            .expect_delete_value()
            .with(eq(SCANCODE_MAP_VALUE))
            .times(1)
            .returning(|_| Ok(()));
        let parts = parts(&memory, primary, read_only_registry());
        let mut coordinator =
            InjectionCoordinator::init(parts, Arc::new(MockWindow::new()), FAILURE_MSG).unwrap();
        memory.inject_fault(ProcessFault::Allocate);

        // Act
        let err = coordinator.escape(true).unwrap_err();

        // Assert
        assert_eq!(err.status_code(), StatusCode::RemoteAllocate);
        assert_ne!(coordinator.state(), CoordinatorState::Applied);
    }

    #[test]
    fn test_remote_routine_exit_code_maps_to_status() {
        let memory = MockProcessMemory::new();
        let mut primary = writable_registry();
        primary.expect_read_binary().returning(|_| Ok(None));
        primary.expect_write_binary().returning(|_, _| Ok(()));
        primary.expect_delete_value().returning(|_| Ok(()));
        let parts = parts(&memory, primary, read_only_registry());
        let mut coordinator =
            InjectionCoordinator::init(parts, Arc::new(MockWindow::new()), FAILURE_MSG).unwrap();
        memory.set_exit_code(StatusCode::Impersonate.as_u32());

        let err = coordinator.escape(true).unwrap_err();

        assert_eq!(err.status_code(), StatusCode::Impersonate);
    }

    #[test]
    fn test_failed_reload_reports_remote_routine_failure() {
        // Arrange
        let memory = MockProcessMemory::new();
        let mut primary = writable_registry();
        primary.expect_read_binary().returning(|_| Ok(None));
        primary.expect_write_binary().returning(|_, _| Ok(()));
        primary.expect_delete_value().times(1).returning(|_| Ok(()));
        let parts = parts(&memory, primary, read_only_registry());
        let window = Arc::new(MockWindow::new());
        let mut coordinator =
            InjectionCoordinator::init(parts, window.clone(), FAILURE_MSG).unwrap();
        memory.set_exit_code(1);

        // Act
        let err = coordinator.escape(true).unwrap_err();

        // Assert
        assert_eq!(err.status_code(), StatusCode::RemoteRoutineFailed);
        assert_ne!(err.status_code(), StatusCode::CreateRemoteThread);
        assert_eq!(
            window.posted_with(FAILURE_MSG),
            vec![(StatusCode::RemoteRoutineFailed.as_u32() as usize, 0)]
        );
        assert_eq!(
            coordinator.state(),
            CoordinatorState::Error(StatusCode::RemoteRoutineFailed)
        );
    }

    #[test]
    fn test_timing_exit_code_is_not_mistaken_for_a_status() {
        let err = CoordinatorError::RemoteRoutine {
            exit_code: StatusCode::InjectionTimeout.as_u32(),
        };

        assert_eq!(err.status_code(), StatusCode::RemoteRoutineFailed);
    }

    #[test]
    fn test_malformed_existing_map_is_replaced() {
        let memory = MockProcessMemory::new();
        let mut primary = writable_registry();
        primary
            .expect_read_binary()
            .returning(|_| Ok(Some(vec![1, 2, 3])));
        primary
            .expect_write_binary()
            .withf(|_, data| {
                ScancodeMap::from_bytes(data)
                    .map(|m| m.mappings().collect::<Vec<_>>() == vec![ScancodeEntry::new(0x3A, 0x1D)])
                    .unwrap_or(false)
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let parts = parts(&memory, primary, read_only_registry());
        let mut coordinator =
            InjectionCoordinator::init(parts, Arc::new(MockWindow::new()), FAILURE_MSG).unwrap();

        assert_eq!(coordinator.escape(true).unwrap().status, EscapeStatus::Applied);
    }

    #[test]
    fn test_restore_before_apply_is_a_no_op() {
        let memory = MockProcessMemory::new();
        let mut primary = writable_registry();
        primary.expect_write_binary().never();
        primary.expect_delete_value().never();
        let parts = parts(&memory, primary, read_only_registry());
        let mut coordinator =
            InjectionCoordinator::init(parts, Arc::new(MockWindow::new()), FAILURE_MSG).unwrap();

        let report = coordinator.escape(false).unwrap();

        assert_eq!(report.status, EscapeStatus::AlreadyRestored);
        assert_eq!(memory.stats().threads_started, 0);
    }
}
