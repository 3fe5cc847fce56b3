//! In-memory registry key for tests.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use scanmap_core::StatusCode;

use super::Registry;

#[derive(Debug)]
struct KeyState {
    values: HashMap<String, Vec<u8>>,
    writable: bool,
    fail_reads: bool,
    fail_writes: bool,
    access_failure: Option<StatusCode>,
    writes: usize,
    deletes: usize,
}

/// One registry key. Clones share the same values.
#[derive(Debug, Clone)]
pub struct MemoryRegistry {
    state: Arc<Mutex<KeyState>>,
}

impl MemoryRegistry {
    /// An empty, writable key.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(KeyState {
                values: HashMap::new(),
                writable: true,
                fail_reads: false,
                fail_writes: false,
                access_failure: None,
                writes: 0,
                deletes: 0,
            })),
        }
    }

    /// A key that reports itself as not writable.
    pub fn read_only() -> Self {
        let registry = Self::new();
        registry.lock().writable = false;
        registry
    }

    fn lock(&self) -> MutexGuard<'_, KeyState> {
        self.state.lock().expect("lock poisoned")
    }

    /// Stores `data` directly, bypassing the write counters.
    pub fn seed(&self, name: &str, data: &[u8]) {
        self.lock().values.insert(name.to_string(), data.to_vec());
    }

    pub fn value(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().values.get(name).cloned()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Makes `prepare_access` fail with `code` (or succeed with `None`).
    pub fn set_access_failure(&self, code: Option<StatusCode>) {
        self.lock().access_failure = code;
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Successful deletes so far, including deletes of absent values.
    pub fn delete_count(&self) -> usize {
        self.lock().deletes
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry for MemoryRegistry {
    fn read_binary(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let state = self.lock();
        if state.fail_reads {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read denied"));
        }
        Ok(state.values.get(name).cloned())
    }

    fn write_binary(&self, name: &str, data: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        if state.fail_writes || !state.writable {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "write denied"));
        }
        state.values.insert(name.to_string(), data.to_vec());
        state.writes += 1;
        Ok(())
    }

    fn delete_value(&self, name: &str) -> io::Result<()> {
        let mut state = self.lock();
        if state.fail_writes || !state.writable {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "delete denied"));
        }
        state.values.remove(name);
        state.deletes += 1;
        Ok(())
    }

    fn is_writable(&self) -> bool {
        self.lock().writable
    }

    fn prepare_access(&self) -> Result<(), StatusCode> {
        match self.lock().access_failure {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }
}
