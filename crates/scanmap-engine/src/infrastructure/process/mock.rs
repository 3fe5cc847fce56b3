//! Simulated target processes for injector tests.
//!
//! Time only moves when a wait consumes it or when the test calls
//! [`MockProcessMemory::advance_to`]. A remote thread completes at
//! `start time + runtime`; the runtime is set per test.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ProcessMemory, ThreadWait};
use crate::application::thread_watcher::RawHandle;

/// A one-shot failure for the next matching call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessFault {
    Open,
    Allocate,
    Write,
    CreateThread,
}

/// A thread started by `create_thread`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteThread {
    pub pid: u32,
    pub start: usize,
    pub param: usize,
    pub completes_at: Duration,
}

/// Resource accounting, for leak and double-release checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub open_handles: usize,
    pub live_regions: usize,
    pub process_handles_closed: usize,
    pub thread_handles_closed: usize,
    pub regions_freed: usize,
    pub threads_started: usize,
    pub double_frees: usize,
    pub double_closes: usize,
}

enum Handle {
    Process { pid: u32 },
    Thread { index: usize },
}

struct Inner {
    now: Duration,
    runtime: Duration,
    exit_code: u32,
    wait_failing: bool,
    processes: HashSet<u32>,
    faults: HashSet<ProcessFault>,
    next_handle: usize,
    next_address: usize,
    handles: HashMap<usize, Handle>,
    regions: HashMap<usize, Vec<u8>>,
    threads: Vec<RemoteThread>,
    stats: MemoryStats,
}

/// A cloneable view of one simulated machine.
#[derive(Clone)]
pub struct MockProcessMemory {
    inner: Arc<Mutex<Inner>>,
}

impl MockProcessMemory {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                now: Duration::ZERO,
                runtime: Duration::ZERO,
                exit_code: 0,
                wait_failing: false,
                processes: HashSet::new(),
                faults: HashSet::new(),
                next_handle: 0x100,
                next_address: 0x7FF0_0000,
                handles: HashMap::new(),
                regions: HashMap::new(),
                threads: Vec::new(),
                stats: MemoryStats::default(),
            })),
        }
    }

    pub fn add_process(&self, pid: u32) {
        self.inner.lock().expect("lock poisoned").processes.insert(pid);
    }

    /// Makes the next call of the given kind fail once.
    pub fn inject_fault(&self, fault: ProcessFault) {
        self.inner.lock().expect("lock poisoned").faults.insert(fault);
    }

    /// How long each newly started remote thread runs.
    pub fn set_thread_runtime(&self, runtime: Duration) {
        self.inner.lock().expect("lock poisoned").runtime = runtime;
    }

    /// Exit code reported by every remote thread once it completes.
    pub fn set_exit_code(&self, exit_code: u32) {
        self.inner.lock().expect("lock poisoned").exit_code = exit_code;
    }

    /// While set, every wait fails as if the thread handle had gone bad.
    pub fn set_wait_failing(&self, failing: bool) {
        self.inner.lock().expect("lock poisoned").wait_failing = failing;
    }

    /// Moves the clock forward to `at`; never moves it back.
    pub fn advance_to(&self, at: Duration) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.now = inner.now.max(at);
    }

    pub fn now(&self) -> Duration {
        self.inner.lock().expect("lock poisoned").now
    }

    pub fn stats(&self) -> MemoryStats {
        let inner = self.inner.lock().expect("lock poisoned");
        MemoryStats {
            open_handles: inner.handles.len(),
            live_regions: inner.regions.len(),
            ..inner.stats
        }
    }

    pub fn last_thread(&self) -> Option<RemoteThread> {
        self.inner.lock().expect("lock poisoned").threads.last().copied()
    }

    /// Bytes currently stored at `address`, or empty if no region covers it.
    pub fn bytes_at(&self, address: usize, len: usize) -> Vec<u8> {
        let inner = self.inner.lock().expect("lock poisoned");
        inner
            .regions
            .iter()
            .find(|(base, data)| **base <= address && address + len <= **base + data.len())
            .map(|(base, data)| data[address - base..address - base + len].to_vec())
            .unwrap_or_default()
    }
}

impl Default for MockProcessMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn take_fault(&mut self, fault: ProcessFault) -> io::Result<()> {
        if self.faults.remove(&fault) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("injected {fault:?} fault"),
            ));
        }
        Ok(())
    }

    fn new_handle(&mut self, handle: Handle) -> RawHandle {
        self.next_handle += 4;
        self.handles.insert(self.next_handle, handle);
        RawHandle(self.next_handle)
    }
}

impl ProcessMemory for MockProcessMemory {
    fn open_process(&self, pid: u32) -> io::Result<RawHandle> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.take_fault(ProcessFault::Open)?;
        if !inner.processes.contains(&pid) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no process with id {pid}"),
            ));
        }
        Ok(inner.new_handle(Handle::Process { pid }))
    }

    fn allocate(&self, process: RawHandle, size: usize) -> io::Result<usize> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.take_fault(ProcessFault::Allocate)?;
        if !matches!(inner.handles.get(&process.0), Some(Handle::Process { .. })) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "bad process handle"));
        }
        let address = inner.next_address;
        inner.next_address += size.next_multiple_of(0x1000).max(0x1000);
        inner.regions.insert(address, vec![0; size]);
        Ok(address)
    }

    fn write(&self, _process: RawHandle, address: usize, bytes: &[u8]) -> io::Result<()> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.take_fault(ProcessFault::Write)?;
        let region = inner
            .regions
            .iter_mut()
            .find(|(base, data)| **base <= address && address + bytes.len() <= **base + data.len());
        match region {
            Some((base, data)) => {
                let offset = address - *base;
                data[offset..offset + bytes.len()].copy_from_slice(bytes);
                Ok(())
            }
            None => Err(io::Error::new(io::ErrorKind::InvalidInput, "write outside any region")),
        }
    }

    fn create_thread(&self, process: RawHandle, start: usize, param: usize) -> io::Result<RawHandle> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.take_fault(ProcessFault::CreateThread)?;
        let pid = match inner.handles.get(&process.0) {
            Some(Handle::Process { pid }) => *pid,
            _ => return Err(io::Error::new(io::ErrorKind::InvalidInput, "bad process handle")),
        };
        let completes_at = inner.now + inner.runtime;
        inner.threads.push(RemoteThread {
            pid,
            start,
            param,
            completes_at,
        });
        inner.stats.threads_started += 1;
        let index = inner.threads.len() - 1;
        Ok(inner.new_handle(Handle::Thread { index }))
    }

    fn wait(&self, thread: RawHandle, timeout: Duration) -> ThreadWait {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.wait_failing {
            return ThreadWait::Failed(io::Error::other("injected wait failure"));
        }
        let completes_at = match inner.handles.get(&thread.0) {
            Some(Handle::Thread { index }) => inner.threads[*index].completes_at,
            _ => {
                return ThreadWait::Failed(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "bad thread handle",
                ))
            }
        };
        let deadline = inner.now + timeout;
        if completes_at <= deadline {
            inner.now = inner.now.max(completes_at);
            ThreadWait::Completed {
                exit_code: inner.exit_code,
            }
        } else {
            inner.now = deadline;
            ThreadWait::TimedOut
        }
    }

    fn free(&self, _process: RawHandle, address: usize) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.regions.remove(&address).is_some() {
            inner.stats.regions_freed += 1;
        } else {
            inner.stats.double_frees += 1;
        }
    }

    fn close(&self, handle: RawHandle) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        match inner.handles.remove(&handle.0) {
            Some(Handle::Process { .. }) => inner.stats.process_handles_closed += 1,
            Some(Handle::Thread { .. }) => inner.stats.thread_handles_closed += 1,
            None => inner.stats.double_closes += 1,
        }
    }
}
