//! Recording message target for tests.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::MessageTarget;

/// Records every post in order. Can be switched to fail.
#[derive(Debug, Default)]
pub struct MockWindow {
    posted: Mutex<Vec<(u32, usize, isize)>>,
    failing: AtomicBool,
}

impl MockWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(message_id, wparam, lparam)` posted so far.
    pub fn posted(&self) -> Vec<(u32, usize, isize)> {
        self.posted.lock().expect("lock poisoned").clone()
    }

    /// Posts with `message_id` only.
    pub fn posted_with(&self, message_id: u32) -> Vec<(usize, isize)> {
        self.posted()
            .into_iter()
            .filter(|(id, _, _)| *id == message_id)
            .map(|(_, w, l)| (w, l))
            .collect()
    }

    /// While set, posts fail and are not recorded.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl MessageTarget for MockWindow {
    fn post_message(&self, message_id: u32, wparam: usize, lparam: isize) -> io::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "window is gone"));
        }
        self.posted
            .lock()
            .expect("lock poisoned")
            .push((message_id, wparam, lparam));
        Ok(())
    }
}
