//! Simulated threads and events for watcher tests.
//!
//! Thread handles stay signaled once their thread has exited; events are
//! auto-reset and are consumed by the wait that observes them. Closing a
//! handle that is not open is counted as a double close; signaling one is
//! counted as a stale signal.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Condvar, Mutex};

use super::{RawHandle, ThreadPlatform, WaitResult};

enum Object {
    Event { signaled: bool },
    Thread { thread_id: u32 },
}

#[derive(Default)]
struct Inner {
    next_handle: usize,
    objects: HashMap<usize, Object>,
    spawned: HashSet<u32>,
    exited: HashSet<u32>,
    double_closes: usize,
    stale_signals: usize,
}

/// A cloneable handle onto one simulated OS.
#[derive(Clone, Default)]
pub struct MockThreadPlatform {
    inner: Arc<(Mutex<Inner>, Condvar)>,
}

impl MockThreadPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `thread_id` exist so it can be opened.
    pub fn spawn_thread(&self, thread_id: u32) {
        let (lock, _) = &*self.inner;
        lock.lock().expect("lock poisoned").spawned.insert(thread_id);
    }

    /// Marks `thread_id` as exited, signaling every handle to it.
    pub fn exit_thread(&self, thread_id: u32) {
        let (lock, cvar) = &*self.inner;
        lock.lock().expect("lock poisoned").exited.insert(thread_id);
        cvar.notify_all();
    }

    /// Handles opened and not yet closed, events included.
    pub fn open_handle_count(&self) -> usize {
        self.inner.0.lock().expect("lock poisoned").objects.len()
    }

    pub fn double_close_count(&self) -> usize {
        self.inner.0.lock().expect("lock poisoned").double_closes
    }

    /// Signals sent to a handle that was not an open event.
    pub fn stale_signal_count(&self) -> usize {
        self.inner.0.lock().expect("lock poisoned").stale_signals
    }

    fn insert(&self, object: Object) -> RawHandle {
        let mut inner = self.inner.0.lock().expect("lock poisoned");
        inner.next_handle += 4;
        let handle = inner.next_handle;
        inner.objects.insert(handle, object);
        RawHandle(handle)
    }
}

impl ThreadPlatform for MockThreadPlatform {
    fn create_wake_event(&self) -> io::Result<RawHandle> {
        Ok(self.insert(Object::Event { signaled: false }))
    }

    fn open_thread(&self, thread_id: u32) -> io::Result<RawHandle> {
        let known = self
            .inner
            .0
            .lock()
            .expect("lock poisoned")
            .spawned
            .contains(&thread_id);
        if !known {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no thread with id {thread_id}"),
            ));
        }
        Ok(self.insert(Object::Thread { thread_id }))
    }

    fn signal(&self, event: RawHandle) {
        let (lock, cvar) = &*self.inner;
        let mut inner = lock.lock().expect("lock poisoned");
        match inner.objects.get_mut(&event.0) {
            Some(Object::Event { signaled }) => *signaled = true,
            _ => inner.stale_signals += 1,
        }
        drop(inner);
        cvar.notify_all();
    }

    fn wait_any(&self, handles: &[RawHandle]) -> WaitResult {
        let (lock, cvar) = &*self.inner;
        let mut inner = lock.lock().expect("lock poisoned");
        loop {
            let exited = inner.exited.clone();
            for (index, handle) in handles.iter().enumerate() {
                match inner.objects.get_mut(&handle.0) {
                    Some(Object::Event { signaled }) if *signaled => {
                        *signaled = false;
                        return WaitResult::Signaled(index);
                    }
                    Some(Object::Thread { thread_id }) if exited.contains(thread_id) => {
                        return WaitResult::Signaled(index);
                    }
                    Some(_) => {}
                    None => {
                        return WaitResult::Failed(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            format!("handle {:#x} is not open", handle.0),
                        ))
                    }
                }
            }
            inner = cvar.wait(inner).expect("lock poisoned");
        }
    }

    fn close(&self, handle: RawHandle) {
        let mut inner = self.inner.0.lock().expect("lock poisoned");
        if inner.objects.remove(&handle.0).is_none() {
            inner.double_closes += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_auto_reset() {
        // Arrange
        let platform = MockThreadPlatform::new();
        let event = platform.create_wake_event().unwrap();
        platform.spawn_thread(5);
        let thread = platform.open_thread(5).unwrap();
        platform.exit_thread(5);

        // Act
        platform.signal(event);
        let first = platform.wait_any(&[event, thread]);
        let second = platform.wait_any(&[event, thread]);

        // Assert
        assert!(matches!(first, WaitResult::Signaled(0)));
        assert!(matches!(second, WaitResult::Signaled(1)));
    }

    #[test]
    fn test_close_twice_is_counted() {
        let platform = MockThreadPlatform::new();
        let event = platform.create_wake_event().unwrap();

        platform.close(event);
        platform.close(event);

        assert_eq!(platform.open_handle_count(), 0);
        assert_eq!(platform.double_close_count(), 1);
    }

    #[test]
    fn test_signal_after_close_is_counted() {
        let platform = MockThreadPlatform::new();
        let event = platform.create_wake_event().unwrap();

        platform.close(event);
        platform.signal(event);

        assert_eq!(platform.stale_signal_count(), 1);
    }

    #[test]
    fn test_open_unknown_thread_fails() {
        let platform = MockThreadPlatform::new();
        assert!(platform.open_thread(123).is_err());
    }
}
