//! Runs a small routine inside another process with a remote thread.
//!
//! One injection writes `[stub][pad][param block]` into a fresh region of the
//! target, starts a thread at the stub with the block address as argument,
//! and waits a bounded time for it. The block starts at the first offset past
//! the stub aligned for [`InjectParamBlock`], so the remote routine reads its
//! fields with plain aligned loads.
//!
//! A remote thread is never terminated. When the wait times out, or when a
//! step after allocation fails, everything acquired so far goes onto the
//! reclaim queue. [`RemoteInjector::reclaim`] polls the queue without blocking
//! and frees each resource once its thread has finished. A resource whose
//! thread cannot be waited on [`MAX_WAIT_FAILURES`] times is abandoned: its
//! handles are closed but the region stays mapped, since the thread may still
//! be executing from it.

use std::io;
use std::mem::align_of;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use scanmap_core::{InjectParamBlock, StatusCode};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::thread_watcher::RawHandle;

/// Failed waits after which a queued resource is abandoned.
pub const MAX_WAIT_FAILURES: u32 = 3;

/// Offset of the parameter block in the region for a stub of `stub_len` bytes.
pub fn param_offset(stub_len: usize) -> usize {
    stub_len.next_multiple_of(align_of::<InjectParamBlock>())
}

/// Outcome of a bounded wait on a remote thread.
#[derive(Debug)]
pub enum ThreadWait {
    Completed { exit_code: u32 },
    TimedOut,
    Failed(io::Error),
}

/// Cross-process memory and thread primitives.
pub trait ProcessMemory: Send + Sync {
    /// Opens `pid` with rights to create threads and to allocate, write and
    /// query memory.
    fn open_process(&self, pid: u32) -> io::Result<RawHandle>;
    /// Allocates an executable read-write region and returns its address.
    fn allocate(&self, process: RawHandle, size: usize) -> io::Result<usize>;
    fn write(&self, process: RawHandle, address: usize, bytes: &[u8]) -> io::Result<()>;
    fn create_thread(&self, process: RawHandle, start: usize, param: usize) -> io::Result<RawHandle>;
    fn wait(&self, thread: RawHandle, timeout: Duration) -> ThreadWait;
    fn free(&self, process: RawHandle, address: usize);
    fn close(&self, handle: RawHandle);
}

/// Hard failures of [`RemoteInjector::inject`].
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("cannot open target process {pid}: {source}")]
    OpenProcess { pid: u32, source: io::Error },

    #[error("cannot allocate {size} bytes in the target: {source}")]
    Allocate { size: usize, source: io::Error },

    #[error("cannot write into the target region: {0}")]
    Write(io::Error),

    #[error("cannot start the remote thread: {0}")]
    CreateThread(io::Error),

    #[error("cannot wait on the remote thread in process {pid}: {source}")]
    Wait { pid: u32, source: io::Error },
}

impl InjectError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            InjectError::OpenProcess { .. } => StatusCode::OpenSessionProcess,
            InjectError::Allocate { .. } => StatusCode::RemoteAllocate,
            InjectError::Write(_) => StatusCode::RemoteWrite,
            InjectError::CreateThread(_) => StatusCode::CreateRemoteThread,
            InjectError::Wait { .. } => StatusCode::WaitRemoteThread,
        }
    }
}

/// Result of an injection that got as far as starting the thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectOutcome {
    /// The thread finished within the timeout and everything was released.
    Completed { exit_code: u32 },
    /// The thread is still running; its resources are on the reclaim queue.
    TimedOut,
}

/// Everything one injection holds in the target.
#[derive(Debug)]
pub struct InjectionResource {
    pub pid: u32,
    pub process: RawHandle,
    pub region: usize,
    pub param_address: usize,
    pub thread: Option<RawHandle>,
    timed_out: bool,
    wait_failures: u32,
}

impl InjectionResource {
    /// Releases the thread handle, the region and the process handle.
    ///
    /// Consuming `self` makes a second release impossible.
    pub fn reap(self, memory: &dyn ProcessMemory) {
        if let Some(thread) = self.thread {
            memory.close(thread);
        }
        memory.free(self.process, self.region);
        memory.close(self.process);
        debug!(pid = self.pid, region = self.region, "injection resource reclaimed");
    }

    /// Closes both handles and leaves the region mapped.
    fn abandon(self, memory: &dyn ProcessMemory) {
        if let Some(thread) = self.thread {
            memory.close(thread);
        }
        memory.close(self.process);
        warn!(
            pid = self.pid,
            region = self.region,
            "remote thread cannot be waited on; region left allocated"
        );
    }
}

/// Counts from one pass over the reclaim queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    pub reclaimed: usize,
    /// How many of `reclaimed` had timed out earlier and finished late.
    pub recovered_after_timeout: usize,
    /// Dropped after [`MAX_WAIT_FAILURES`] failed waits.
    pub abandoned: usize,
    pub pending: usize,
}

/// Injection primitive with a poll-based reclaim queue.
pub struct RemoteInjector<M: ProcessMemory> {
    memory: M,
    queue: Mutex<Vec<InjectionResource>>,
}

impl<M: ProcessMemory> RemoteInjector<M> {
    pub fn new(memory: M) -> Self {
        Self {
            memory,
            queue: Mutex::new(Vec::new()),
        }
    }

    fn queue(&self) -> MutexGuard<'_, Vec<InjectionResource>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resources waiting on the reclaim queue.
    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    /// Injects `stub` and `param_block` into `pid` and runs the stub.
    ///
    /// # Errors
    ///
    /// Returns [`InjectError`] for failures before the thread starts and for a
    /// wait that fails outright. Regions allocated before a failure are
    /// queued, not leaked.
    pub fn inject(
        &self,
        pid: u32,
        param_block: &[u8],
        stub: &[u8],
        timeout: Duration,
    ) -> Result<InjectOutcome, InjectError> {
        let process = self
            .memory
            .open_process(pid)
            .map_err(|source| InjectError::OpenProcess { pid, source })?;

        let offset = param_offset(stub.len());
        let size = offset + param_block.len();
        let region = match self.memory.allocate(process, size) {
            Ok(address) => address,
            Err(source) => {
                self.memory.close(process);
                return Err(InjectError::Allocate { size, source });
            }
        };
        debug!(pid, region, size, "allocated remote region");

        let mut resource = InjectionResource {
            pid,
            process,
            region,
            param_address: region + offset,
            thread: None,
            timed_out: false,
            wait_failures: 0,
        };

        let written = self
            .memory
            .write(process, region, stub)
            .and_then(|()| self.memory.write(process, resource.param_address, param_block));
        if let Err(e) = written {
            self.enqueue(resource);
            return Err(InjectError::Write(e));
        }

        let thread = match self
            .memory
            .create_thread(process, region, resource.param_address)
        {
            Ok(thread) => thread,
            Err(e) => {
                self.enqueue(resource);
                return Err(InjectError::CreateThread(e));
            }
        };
        resource.thread = Some(thread);

        match self.memory.wait(thread, timeout) {
            ThreadWait::Completed { exit_code } => {
                resource.reap(&self.memory);
                info!(pid, exit_code, "remote routine completed");
                Ok(InjectOutcome::Completed { exit_code })
            }
            ThreadWait::TimedOut => {
                warn!(pid, ?timeout, "remote routine still running; reclaim deferred");
                resource.timed_out = true;
                self.enqueue(resource);
                Ok(InjectOutcome::TimedOut)
            }
            ThreadWait::Failed(source) => {
                warn!(pid, "waiting on remote routine failed: {source}; reclaim deferred");
                resource.wait_failures = 1;
                self.enqueue(resource);
                Err(InjectError::Wait { pid, source })
            }
        }
    }

    fn enqueue(&self, resource: InjectionResource) {
        self.queue().push(resource);
    }

    /// Frees every queued resource whose thread has finished. Never blocks.
    pub fn reclaim(&self) -> ReclaimReport {
        let queued = std::mem::take(&mut *self.queue());
        let mut report = ReclaimReport::default();
        let mut still_pending = Vec::new();

        for mut resource in queued {
            let done = match resource.thread {
                None => true,
                Some(thread) => match self.memory.wait(thread, Duration::ZERO) {
                    ThreadWait::Completed { .. } => true,
                    ThreadWait::TimedOut => false,
                    ThreadWait::Failed(e) => {
                        resource.wait_failures += 1;
                        warn!(
                            pid = resource.pid,
                            failures = resource.wait_failures,
                            "polling remote thread failed: {e}"
                        );
                        false
                    }
                },
            };
            if !done && resource.wait_failures >= MAX_WAIT_FAILURES {
                resource.abandon(&self.memory);
                report.abandoned += 1;
            } else if done {
                if resource.timed_out {
                    report.recovered_after_timeout += 1;
                }
                resource.reap(&self.memory);
                report.reclaimed += 1;
            } else {
                still_pending.push(resource);
            }
        }

        report.pending = still_pending.len();
        if !still_pending.is_empty() {
            // Anything queued by a concurrent inject stays after ours.
            let mut queue = self.queue();
            still_pending.append(&mut queue);
            *queue = still_pending;
        }
        if report.reclaimed > 0 || report.abandoned > 0 {
            debug!(?report, "reclaim pass");
        }
        report
    }
}

impl<M: ProcessMemory> Drop for RemoteInjector<M> {
    fn drop(&mut self) {
        let report = self.reclaim();
        if report.pending > 0 {
            warn!(
                pending = report.pending,
                "remote threads still running at teardown; their regions stay allocated"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::process::mock::{MockProcessMemory, ProcessFault};

    const STUB: &[u8] = &[0xC3; 16];
    const BLOCK: &[u8] = &[0xAB; 40];

    #[test]
    fn test_completed_injection_releases_everything() {
        // Arrange
        let memory = MockProcessMemory::new();
        memory.add_process(612);
        let injector = RemoteInjector::new(memory.clone());

        // Act
        let outcome = injector.inject(612, BLOCK, STUB, Duration::from_millis(5000));

        // Assert
        assert_eq!(outcome.unwrap(), InjectOutcome::Completed { exit_code: 0 });
        let stats = memory.stats();
        assert_eq!(stats.live_regions, 0);
        assert_eq!(stats.open_handles, 0);
        assert_eq!(stats.double_frees, 0);
        assert_eq!(injector.pending(), 0);
    }

    #[test]
    fn test_stub_precedes_param_block_in_region() {
        // Arrange: the thread outlives the wait so the region stays mapped.
        let memory = MockProcessMemory::new();
        memory.add_process(7);
        memory.set_thread_runtime(Duration::from_secs(60));
        let injector = RemoteInjector::new(memory.clone());

        // Act
        let outcome = injector.inject(7, BLOCK, STUB, Duration::from_millis(10)).unwrap();

        // Assert
        assert_eq!(outcome, InjectOutcome::TimedOut);
        let thread = memory.last_thread().unwrap();
        assert_eq!(thread.param, thread.start + STUB.len());
        assert_eq!(memory.bytes_at(thread.start, STUB.len()), STUB);
        assert_eq!(memory.bytes_at(thread.param, BLOCK.len()), BLOCK);
    }

    #[test]
    fn test_param_block_is_aligned_after_odd_length_stub() {
        // Arrange
        let stub = [0xC3u8; 13];
        let memory = MockProcessMemory::new();
        memory.add_process(7);
        memory.set_thread_runtime(Duration::from_secs(60));
        let injector = RemoteInjector::new(memory.clone());

        // Act
        injector.inject(7, BLOCK, &stub, Duration::from_millis(10)).unwrap();

        // Assert
        let thread = memory.last_thread().unwrap();
        let align = std::mem::align_of::<InjectParamBlock>();
        assert_eq!((thread.param - thread.start) % align, 0);
        assert!(thread.param - thread.start >= stub.len());
        assert_eq!(thread.param % align, 0, "region base is page aligned");
        assert_eq!(memory.bytes_at(thread.start, stub.len()), stub);
        assert_eq!(memory.bytes_at(thread.param, BLOCK.len()), BLOCK);
    }

    #[test]
    fn test_param_offset_rounds_up_to_block_alignment() {
        let align = std::mem::align_of::<InjectParamBlock>();

        assert_eq!(param_offset(0), 0);
        assert_eq!(param_offset(1), align);
        assert_eq!(param_offset(align), align);
        assert_eq!(param_offset(align + 1), 2 * align);
    }

    #[test]
    fn test_open_failure_maps_to_session_process_code() {
        let memory = MockProcessMemory::new();
        let injector = RemoteInjector::new(memory.clone());

        let err = injector
            .inject(999, BLOCK, STUB, Duration::from_millis(10))
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::OpenSessionProcess);
        assert_eq!(memory.stats().open_handles, 0);
    }

    #[test]
    fn test_allocation_failure_closes_process() {
        let memory = MockProcessMemory::new();
        memory.add_process(612);
        memory.inject_fault(ProcessFault::Allocate);
        let injector = RemoteInjector::new(memory.clone());

        let err = injector
            .inject(612, BLOCK, STUB, Duration::from_millis(10))
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::RemoteAllocate);
        assert_eq!(memory.stats().open_handles, 0);
        assert_eq!(injector.pending(), 0);
    }

    #[test]
    fn test_write_failure_queues_region_and_reclaim_frees_it() {
        // Arrange
        let memory = MockProcessMemory::new();
        memory.add_process(612);
        memory.inject_fault(ProcessFault::Write);
        let injector = RemoteInjector::new(memory.clone());

        // Act
        let err = injector
            .inject(612, BLOCK, STUB, Duration::from_millis(10))
            .unwrap_err();

        // Assert
        assert_eq!(err.status_code(), StatusCode::RemoteWrite);
        assert_eq!(memory.stats().live_regions, 1, "region is queued, not freed");
        assert_eq!(injector.pending(), 1);

        let report = injector.reclaim();
        assert_eq!(report.reclaimed, 1);
        assert_eq!(report.recovered_after_timeout, 0);
        assert_eq!(memory.stats().live_regions, 0);
        assert_eq!(memory.stats().open_handles, 0);
    }

    #[test]
    fn test_create_thread_failure_queues_region() {
        let memory = MockProcessMemory::new();
        memory.add_process(612);
        memory.inject_fault(ProcessFault::CreateThread);
        let injector = RemoteInjector::new(memory.clone());

        let err = injector
            .inject(612, BLOCK, STUB, Duration::from_millis(10))
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::CreateRemoteThread);
        assert_eq!(injector.pending(), 1);
        drop(injector);
        assert_eq!(memory.stats().live_regions, 0, "drop runs a final pass");
    }

    #[test]
    fn test_late_thread_times_out_then_reclaims_exactly_once() {
        // Arrange
        let memory = MockProcessMemory::new();
        memory.add_process(612);
        memory.set_thread_runtime(Duration::from_millis(5200));
        let injector = RemoteInjector::new(memory.clone());

        // Act
        let outcome = injector
            .inject(612, BLOCK, STUB, Duration::from_millis(5000))
            .unwrap();
        let early = injector.reclaim();
        memory.advance_to(Duration::from_millis(6000));
        let late = injector.reclaim();
        let again = injector.reclaim();

        // Assert
        assert_eq!(outcome, InjectOutcome::TimedOut);
        assert_eq!(early, ReclaimReport { pending: 1, ..ReclaimReport::default() });
        assert_eq!(
            late,
            ReclaimReport { reclaimed: 1, recovered_after_timeout: 1, ..ReclaimReport::default() }
        );
        assert_eq!(again, ReclaimReport::default());
        let stats = memory.stats();
        assert_eq!(stats.process_handles_closed, 1);
        assert_eq!(stats.regions_freed, 1);
        assert_eq!(stats.thread_handles_closed, 1);
        assert_eq!(stats.double_frees, 0);
        assert_eq!(stats.double_closes, 0);
    }

    #[test]
    fn test_failed_wait_is_an_error_not_a_timeout() {
        // Arrange
        let memory = MockProcessMemory::new();
        memory.add_process(612);
        memory.set_wait_failing(true);
        let injector = RemoteInjector::new(memory.clone());

        // Act
        let err = injector
            .inject(612, BLOCK, STUB, Duration::from_millis(5000))
            .unwrap_err();

        // Assert
        assert!(matches!(err, InjectError::Wait { pid: 612, .. }));
        assert_eq!(err.status_code(), StatusCode::WaitRemoteThread);
        assert_eq!(injector.pending(), 1);
    }

    #[test]
    fn test_repeatedly_failing_wait_is_abandoned_and_leaves_queue() {
        // Arrange
        let memory = MockProcessMemory::new();
        memory.add_process(612);
        memory.set_wait_failing(true);
        let injector = RemoteInjector::new(memory.clone());
        injector
            .inject(612, BLOCK, STUB, Duration::from_millis(5000))
            .unwrap_err();

        // Act
        let reports: Vec<_> = (1..MAX_WAIT_FAILURES).map(|_| injector.reclaim()).collect();

        // Assert
        let (last, earlier) = reports.split_last().unwrap();
        for report in earlier {
            assert_eq!(report.pending, 1);
            assert_eq!(report.abandoned, 0);
        }
        assert_eq!(last.abandoned, 1);
        assert_eq!(last.reclaimed, 0);
        assert_eq!(last.pending, 0);
        assert_eq!(injector.pending(), 0);
        let stats = memory.stats();
        assert_eq!(stats.open_handles, 0, "both handles closed");
        assert_eq!(stats.live_regions, 1, "region stays mapped for the thread");
        assert_eq!(stats.double_closes, 0);
    }

    #[test]
    fn test_wait_that_recovers_is_reclaimed_normally() {
        let memory = MockProcessMemory::new();
        memory.add_process(612);
        memory.set_wait_failing(true);
        let injector = RemoteInjector::new(memory.clone());
        injector
            .inject(612, BLOCK, STUB, Duration::from_millis(5000))
            .unwrap_err();

        memory.set_wait_failing(false);
        let report = injector.reclaim();

        assert_eq!(report.reclaimed, 1);
        assert_eq!(report.abandoned, 0);
        assert_eq!(memory.stats().live_regions, 0);
        assert_eq!(injector.pending(), 0);
    }
}
