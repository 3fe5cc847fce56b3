//! Scripted session platform for tests.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use scanmap_core::{InjectParamBlock, OsGeneration};

use super::{PrivilegeError, SessionPlatform};

/// Fake addresses handed out by `resolve_symbols`.
const FAKE_SYMBOL_BASE: usize = 0x7FFA_0000_1000;

/// Bytes returned as the routine image.
pub const MOCK_STUB: &[u8] = &[0xCC; 32];

/// A session with a fixed session process. Clones share failure switches.
#[derive(Debug, Clone)]
pub struct MockSession {
    session_pid: Option<u32>,
    current_pid: u32,
    generation: OsGeneration,
    privilege_fails: Arc<AtomicBool>,
    privilege_calls: Arc<AtomicUsize>,
}

impl MockSession {
    /// A session whose session process is `session_pid`.
    pub fn new(session_pid: u32) -> Self {
        Self {
            session_pid: Some(session_pid),
            current_pid: 4242,
            generation: OsGeneration::SessionAware,
            privilege_fails: Arc::new(AtomicBool::new(false)),
            privilege_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A session where no session process can be found.
    pub fn without_session_process() -> Self {
        Self {
            session_pid: None,
            ..Self::new(0)
        }
    }

    pub fn with_generation(mut self, generation: OsGeneration) -> Self {
        self.generation = generation;
        self
    }

    /// Makes every later privilege request fail at the adjust step.
    pub fn fail_privilege(&self) {
        self.privilege_fails.store(true, Ordering::SeqCst);
    }

    pub fn privilege_calls(&self) -> usize {
        self.privilege_calls.load(Ordering::SeqCst)
    }
}

impl SessionPlatform for MockSession {
    fn find_session_process(&self) -> io::Result<u32> {
        self.session_pid
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no winlogon in this session"))
    }

    fn current_pid(&self) -> u32 {
        self.current_pid
    }

    fn os_generation(&self) -> OsGeneration {
        self.generation
    }

    fn enable_debug_privilege(&self) -> Result<(), PrivilegeError> {
        self.privilege_calls.fetch_add(1, Ordering::SeqCst);
        if self.privilege_fails.load(Ordering::SeqCst) {
            return Err(PrivilegeError::Adjust(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "privilege not held",
            )));
        }
        Ok(())
    }

    fn resolve_symbols(&self, block: &mut InjectParamBlock) -> io::Result<()> {
        let slots = [
            &mut block.get_module_handle,
            &mut block.get_proc_address,
            &mut block.update_legacy,
            &mut block.update_session,
            &mut block.open_process,
            &mut block.close_handle,
        ];
        for (i, slot) in slots.into_iter().enumerate() {
            *slot = FAKE_SYMBOL_BASE + i * 0x10;
        }
        Ok(())
    }

    fn entry_stub(&self) -> io::Result<Vec<u8>> {
        Ok(MOCK_STUB.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_block_validates() {
        // Arrange
        let session = MockSession::new(612).with_generation(OsGeneration::Legacy);
        let mut block = InjectParamBlock::template(session.os_generation(), 1).unwrap();

        // Act
        session.resolve_symbols(&mut block).unwrap();

        // Assert
        assert!(block.validate().is_ok());
    }

    #[test]
    fn test_failure_switch_is_shared_by_clones() {
        let session = MockSession::new(612);
        let view = session.clone();

        view.fail_privilege();

        assert!(session.enable_debug_privilege().is_err());
        assert_eq!(view.privilege_calls(), 1);
    }
}
