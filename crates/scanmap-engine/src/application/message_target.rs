//! The one way the engine core talks to a window.

use std::io;

/// A window that accepts posted messages.
///
/// Posting never blocks on the receiving thread. Implementations are called
/// from any thread, including the watcher thread and hook contexts.
pub trait MessageTarget: Send + Sync {
    fn post_message(&self, message_id: u32, wparam: usize, lparam: isize) -> io::Result<()>;
}
