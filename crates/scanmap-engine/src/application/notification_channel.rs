//! Buffered text relay from any producer thread to the engine window.
//!
//! Producers write under [`SyncObject::acquire`]; the text is staged in a
//! fixed buffer and moved into an accumulator on flush. Releasing the guard
//! posts one notification to the attached window carrying the channel id. The
//! consumer then drains the accumulator with
//! [`NotificationChannel::acquire_string`].
//!
//! The accumulator is a one-slot mailbox: several releases before a drain
//! post several notifications, but the first drain takes all the text and the
//! later ones see an empty string.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

use crate::application::message_target::MessageTarget;
use crate::application::sync::SyncObject;

/// Size of the staging buffer in bytes.
pub const STAGING_CAPACITY: usize = 1024;

struct ChannelState {
    staging: Vec<u8>,
    accumulated: String,
    window: Option<Arc<dyn MessageTarget>>,
    debug_level: u32,
}

impl ChannelState {
    /// Moves every complete character from staging into the accumulator.
    ///
    /// A trailing partial UTF-8 sequence stays at the start of staging and is
    /// completed by the next write.
    fn flush_staging(&mut self) {
        if self.staging.is_empty() {
            return;
        }
        let complete = match std::str::from_utf8(&self.staging) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => {
                // Staging only ever receives &str slices, so an invalid
                // sequence in the middle cannot happen; keep whatever decodes.
                let text = String::from_utf8_lossy(&self.staging).into_owned();
                self.accumulated.push_str(&text);
                self.staging.clear();
                return;
            }
        };
        if let Ok(text) = std::str::from_utf8(&self.staging[..complete]) {
            self.accumulated.push_str(text);
        }
        self.staging.drain(..complete);
    }

    fn push_bytes(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let room = STAGING_CAPACITY - self.staging.len();
            let take = room.min(bytes.len());
            self.staging.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            if self.staging.len() == STAGING_CAPACITY {
                self.flush_staging();
            }
        }
    }
}

/// Thread-safe notification relay. Always handled through an `Arc`.
pub struct NotificationChannel {
    message_id: u32,
    state: Mutex<ChannelState>,
}

impl NotificationChannel {
    /// Creates a channel that posts `message_id` to its window on release.
    pub fn new(message_id: u32) -> Arc<Self> {
        Arc::new(Self {
            message_id,
            state: Mutex::new(ChannelState {
                staging: Vec::with_capacity(STAGING_CAPACITY),
                accumulated: String::new(),
                window: None,
                debug_level: 0,
            }),
        })
    }

    /// Identity sent as `lParam`; the channel's address, stable behind its `Arc`.
    pub fn id(&self) -> isize {
        self as *const Self as isize
    }

    pub fn message_id(&self) -> u32 {
        self.message_id
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes at a level above this threshold are discarded.
    pub fn debug_level(&self) -> u32 {
        self.lock().debug_level
    }

    pub fn set_debug_level(&self, level: u32) {
        self.lock().debug_level = level;
    }

    /// Starts posting to `window`, immediately if text is already pending.
    pub fn attach_window(&self, window: Arc<dyn MessageTarget>) {
        let pending = {
            let mut state = self.lock();
            state.window = Some(Arc::clone(&window));
            !state.accumulated.is_empty()
        };
        if pending {
            self.post(window.as_ref());
        }
    }

    /// Flushes staged text and stops posting. Pending text stays readable.
    pub fn detach_window(&self) {
        let mut state = self.lock();
        state.flush_staging();
        state.window = None;
    }

    /// Locks the accumulated text for the consumer. Dropping the guard clears it.
    ///
    /// The channel lock is not reentrant: while the guard is alive, any write
    /// to this channel from the same thread (including [`Self::log`]) blocks
    /// forever. Consumers that log while handling the text should use
    /// [`Self::take_string`] instead.
    pub fn acquire_string(&self) -> ReceivedText<'_> {
        ReceivedText { state: self.lock() }
    }

    /// Drains the accumulated text and releases the lock before returning.
    pub fn take_string(&self) -> String {
        std::mem::take(&mut self.lock().accumulated)
    }

    /// Convenience for a single formatted write at `level`.
    pub fn log(&self, level: u32, args: fmt::Arguments<'_>) {
        let mut guard = self.acquire_with_level(level);
        let _ = fmt::Write::write_fmt(&mut guard, args);
    }

    fn post(&self, window: &dyn MessageTarget) {
        match window.post_message(self.message_id, 0, self.id()) {
            Ok(()) => trace!(message_id = self.message_id, "posted channel notification"),
            Err(e) => warn!("failed to post channel notification: {e}"),
        }
    }
}

impl SyncObject for NotificationChannel {
    type Guard<'a> = ScopedAcquire<'a>;

    fn acquire_with_level(&self, level: u32) -> ScopedAcquire<'_> {
        let state = self.lock();
        let enabled = level <= state.debug_level;
        ScopedAcquire {
            channel: self,
            state: Some(state),
            enabled,
        }
    }
}

impl fmt::Debug for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationChannel")
            .field("message_id", &self.message_id)
            .finish_non_exhaustive()
    }
}

/// Writer-side guard. Every write made through one guard reaches the
/// consumer as a contiguous unit.
pub struct ScopedAcquire<'a> {
    channel: &'a NotificationChannel,
    state: Option<MutexGuard<'a, ChannelState>>,
    enabled: bool,
}

impl ScopedAcquire<'_> {
    /// `false` when this guard's level is filtered out; writes are dropped.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Moves complete characters from staging into the accumulator now,
    /// without ending the contiguous unit this guard is writing.
    pub fn flush(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.flush_staging();
        }
    }
}

impl fmt::Write for ScopedAcquire<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if !self.enabled {
            return Ok(());
        }
        if let Some(state) = self.state.as_mut() {
            state.push_bytes(s.as_bytes());
        }
        Ok(())
    }
}

impl Drop for ScopedAcquire<'_> {
    fn drop(&mut self) {
        let Some(mut state) = self.state.take() else {
            return;
        };
        state.flush_staging();
        let window = if state.accumulated.is_empty() {
            None
        } else {
            state.window.clone()
        };
        drop(state);

        if let Some(window) = window {
            self.channel.post(window.as_ref());
        }
    }
}

/// Consumer-side guard dereferencing to the accumulated text.
pub struct ReceivedText<'a> {
    state: MutexGuard<'a, ChannelState>,
}

impl Deref for ReceivedText<'_> {
    type Target = str;

    fn deref(&self) -> &str {
        &self.state.accumulated
    }
}

impl Drop for ReceivedText<'_> {
    fn drop(&mut self) {
        self.state.accumulated.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write;
    use std::thread;

    use super::*;
    use crate::infrastructure::window::mock::MockWindow;

    const MSG: u32 = 0x8001;

    #[test]
    fn test_release_posts_once_with_channel_id() {
        // Arrange
        let channel = NotificationChannel::new(MSG);
        let window = Arc::new(MockWindow::new());
        channel.attach_window(window.clone());

        // Act
        {
            let mut g = channel.acquire();
            write!(g, "hello").unwrap();
            write!(g, " world").unwrap();
        }

        // Assert
        assert_eq!(window.posted(), vec![(MSG, 0, channel.id())]);
        assert_eq!(&*channel.acquire_string(), "hello world");
        assert_eq!(&*channel.acquire_string(), "", "draining clears the text");
    }

    #[test]
    fn test_release_without_text_does_not_post() {
        let channel = NotificationChannel::new(MSG);
        let window = Arc::new(MockWindow::new());
        channel.attach_window(window.clone());

        drop(channel.acquire());

        assert!(window.posted().is_empty());
    }

    #[test]
    fn test_write_above_threshold_is_discarded_but_succeeds() {
        // Arrange
        let channel = NotificationChannel::new(MSG);
        channel.set_debug_level(1);

        // Act
        {
            let mut g = channel.acquire_with_level(2);
            assert!(!g.is_enabled());
            assert!(write!(g, "verbose detail").is_ok());
        }
        {
            let mut g = channel.acquire_with_level(1);
            write!(g, "kept").unwrap();
        }

        // Assert
        assert_eq!(&*channel.acquire_string(), "kept");
    }

    #[test]
    fn test_split_multibyte_char_is_carried_across_flush() {
        // Arrange: the two-byte 'é' straddles the staging boundary.
        let channel = NotificationChannel::new(MSG);
        let prefix = "a".repeat(STAGING_CAPACITY - 1);

        // Act
        {
            let mut g = channel.acquire();
            g.write_str(&prefix).unwrap();
            g.write_str("é").unwrap();

            // Assert (mid-write): only the complete prefix was flushed.
            let state = g.state.as_ref().unwrap();
            assert_eq!(state.accumulated.len(), STAGING_CAPACITY - 1);
            assert_eq!(state.staging.len(), 2);
        }

        let text = channel.acquire_string();
        assert_eq!(text.len(), STAGING_CAPACITY + 1);
        assert!(text.ends_with("aé"));
    }

    #[test]
    fn test_attach_window_posts_pending_text_and_detach_stops() {
        // Arrange
        let channel = NotificationChannel::new(MSG);
        channel.log(0, format_args!("early"));
        let window = Arc::new(MockWindow::new());

        // Act
        channel.attach_window(window.clone());
        channel.detach_window();
        channel.log(0, format_args!("late"));

        // Assert
        assert_eq!(window.posted().len(), 1);
        assert_eq!(&*channel.acquire_string(), "earlylate");
    }

    #[test]
    fn test_concurrent_writers_never_interleave() {
        // Arrange
        let channel = NotificationChannel::new(MSG);
        let writers: Vec<_> = (0..8)
            .map(|w| {
                let channel = Arc::clone(&channel);
                thread::spawn(move || {
                    for i in 0..200 {
                        let mut g = channel.acquire();
                        write!(g, "<{w}:").unwrap();
                        for _ in 0..10 {
                            write!(g, "{w}").unwrap();
                        }
                        write!(g, ":{i}>").unwrap();
                    }
                })
            })
            .collect();

        // Act
        for h in writers {
            h.join().unwrap();
        }

        // Assert: every record is whole and carries its writer's digits only.
        let text = channel.acquire_string();
        let records: Vec<&str> = text
            .split('>')
            .filter(|r| !r.is_empty())
            .collect();
        assert_eq!(records.len(), 8 * 200);
        for record in records {
            let body = record.strip_prefix('<').unwrap();
            let mut parts = body.split(':');
            let w = parts.next().unwrap();
            let digits = parts.next().unwrap();
            assert_eq!(digits, w.repeat(10));
        }
    }

    #[test]
    fn test_taken_text_can_be_relogged_from_the_consumer_thread() {
        // Arrange
        let channel = NotificationChannel::new(MSG);
        channel.log(0, format_args!("first\n"));

        // Act
        let text = channel.take_string();
        for line in text.lines() {
            channel.log(0, format_args!("seen {line}\n"));
        }

        // Assert
        assert_eq!(text, "first\n");
        assert_eq!(channel.take_string(), "seen first\n");
        assert_eq!(channel.take_string(), "");
    }

    #[test]
    fn test_explicit_flush_moves_complete_text_but_keeps_the_guard() {
        // Arrange
        let channel = NotificationChannel::new(MSG);
        let window = Arc::new(MockWindow::new());
        channel.attach_window(window.clone());

        // Act
        {
            let mut g = channel.acquire();
            write!(g, "abc").unwrap();
            g.flush();

            // Assert (mid-write): text moved, nothing posted yet.
            let state = g.state.as_ref().unwrap();
            assert_eq!(state.accumulated, "abc");
            assert!(state.staging.is_empty());
            assert!(window.posted().is_empty());
        }

        assert_eq!(window.posted().len(), 1);
    }
}
