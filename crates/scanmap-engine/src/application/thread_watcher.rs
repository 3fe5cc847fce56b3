//! Background monitor for the lifetime of hooked worker threads.
//!
//! # How the loop works (for beginners)
//!
//! The OS lets one thread block on many handles at once and tells it which
//! one fired. The watcher keeps a list `[wake, t1, …, tn]` and waits on all of
//! them:
//!
//! - index 0 is an auto-reset event the watcher signals itself whenever the
//!   set changes or shutdown is requested. It only makes the loop rebuild the
//!   list.
//! - index k ≥ 1 means thread k has exited. The entry is removed under the
//!   lock, the handle is closed, and the observer hears about it after the
//!   lock is released.
//!
//! The wait itself happens outside the lock, so `attach` never blocks on it.
//! The wake event is signaled and closed only under the lock, and closing
//! it is preceded by setting `abort`, so no signal reaches a closed handle.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::application::notification_channel::NotificationChannel;

/// Most handles a single OS wait accepts, the wake event included.
pub const MAX_WAIT_HANDLES: usize = 64;

/// Pause after a failed wait before the set is rebuilt.
const WAIT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// An opaque OS handle value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub usize);

/// Result of one multi-handle wait.
#[derive(Debug)]
pub enum WaitResult {
    /// Index into the slice passed to [`ThreadPlatform::wait_any`].
    Signaled(usize),
    Failed(io::Error),
}

/// OS primitives the watcher needs.
pub trait ThreadPlatform: Send + Sync + 'static {
    /// An auto-reset event, initially unsignaled.
    fn create_wake_event(&self) -> io::Result<RawHandle>;
    /// A handle that becomes signaled when the thread exits.
    fn open_thread(&self, thread_id: u32) -> io::Result<RawHandle>;
    fn signal(&self, event: RawHandle);
    /// Blocks until one handle is signaled. Lowest index wins ties.
    fn wait_any(&self, handles: &[RawHandle]) -> WaitResult;
    fn close(&self, handle: RawHandle);
}

/// Engine callbacks. Both run on the watcher thread.
pub trait ThreadObserver: Send + Sync {
    fn on_thread_attach(&self, thread_id: u32);
    fn on_thread_detach(&self, thread_id: u32);
}

#[derive(Default)]
struct WatchState {
    entries: Vec<(u32, RawHandle)>,
    pending_attach: Vec<u32>,
    abort: bool,
}

struct Shared<P: ThreadPlatform> {
    platform: P,
    observer: Arc<dyn ThreadObserver>,
    log: Option<Arc<NotificationChannel>>,
    wake: RawHandle,
    state: Mutex<WatchState>,
}

impl<P: ThreadPlatform> Shared<P> {
    fn lock(&self) -> MutexGuard<'_, WatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Watches attached threads and reports each exit exactly once.
pub struct ThreadWatcher<P: ThreadPlatform> {
    shared: Arc<Shared<P>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<P: ThreadPlatform> ThreadWatcher<P> {
    /// Creates the watcher and its wake event. The loop starts on first attach.
    pub fn new(
        platform: P,
        observer: Arc<dyn ThreadObserver>,
        log: Option<Arc<NotificationChannel>>,
    ) -> io::Result<Self> {
        let wake = platform.create_wake_event()?;
        Ok(Self {
            shared: Arc::new(Shared {
                platform,
                observer,
                log,
                wake,
                state: Mutex::new(WatchState::default()),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Starts monitoring `thread_id`. Failures are logged, never returned.
    pub fn attach(&self, thread_id: u32) {
        let handle = match self.shared.platform.open_thread(thread_id) {
            Ok(h) => h,
            Err(e) => {
                warn!(thread_id, "cannot open thread for watching: {e}");
                if let Some(log) = &self.shared.log {
                    log.log(0, format_args!("ThreadWatcher: cannot open thread {thread_id}: {e}\n"));
                }
                return;
            }
        };

        let mut state = self.shared.lock();
        if state.abort {
            drop(state);
            self.shared.platform.close(handle);
            return;
        }
        state.entries.push((thread_id, handle));
        state.pending_attach.push(thread_id);
        if state.entries.len() >= MAX_WAIT_HANDLES {
            warn!(
                tracked = state.entries.len(),
                "more threads than one wait can hold; the excess waits for free slots"
            );
        }

        if let Err(e) = self.ensure_started() {
            warn!("cannot start thread watcher loop: {e}");
        }
        self.shared.platform.signal(self.shared.wake);
    }

    /// Thread ids currently tracked, in attach order.
    pub fn tracked(&self) -> Vec<u32> {
        self.shared.lock().entries.iter().map(|(id, _)| *id).collect()
    }

    /// Stops the loop, joins it and closes every remaining handle.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.lock();
            if state.abort {
                return;
            }
            state.abort = true;
            self.shared.platform.signal(self.shared.wake);
        }

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!("thread watcher loop panicked");
            }
        }

        let remaining = {
            let mut state = self.shared.lock();
            state.pending_attach.clear();
            self.shared.platform.close(self.shared.wake);
            std::mem::take(&mut state.entries)
        };
        for (_, handle) in &remaining {
            self.shared.platform.close(*handle);
        }
        info!(closed = remaining.len(), "thread watcher stopped");
    }

    fn ensure_started(&self) -> io::Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        *worker = Some(
            thread::Builder::new()
                .name("scanmap-thread-watcher".to_string())
                .spawn(move || watch_loop(&shared))?,
        );
        debug!("thread watcher loop started");
        Ok(())
    }
}

impl<P: ThreadPlatform> Drop for ThreadWatcher<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn watch_loop<P: ThreadPlatform>(shared: &Shared<P>) {
    loop {
        let (handles, attached) = {
            let mut state = shared.lock();
            if state.abort {
                break;
            }
            let attached = std::mem::take(&mut state.pending_attach);
            let handles: Vec<RawHandle> = std::iter::once(shared.wake)
                .chain(
                    state
                        .entries
                        .iter()
                        .take(MAX_WAIT_HANDLES - 1)
                        .map(|(_, h)| *h),
                )
                .collect();
            (handles, attached)
        };

        for thread_id in attached {
            shared.observer.on_thread_attach(thread_id);
        }

        match shared.platform.wait_any(&handles) {
            WaitResult::Signaled(0) => continue,
            WaitResult::Signaled(index) => {
                let Some(&signaled) = handles.get(index) else {
                    warn!(index, "wait reported an index outside the handle set");
                    continue;
                };
                let removed = {
                    let mut state = shared.lock();
                    if state.abort {
                        break;
                    }
                    state
                        .entries
                        .iter()
                        .position(|(_, h)| *h == signaled)
                        .map(|pos| state.entries.remove(pos))
                };
                if let Some((thread_id, handle)) = removed {
                    shared.platform.close(handle);
                    debug!(thread_id, "watched thread exited");
                    shared.observer.on_thread_detach(thread_id);
                }
            }
            WaitResult::Failed(e) => {
                warn!("thread watcher wait failed: {e}");
                if shared.lock().abort {
                    break;
                }
                thread::sleep(WAIT_RETRY_DELAY);
            }
        }
    }
    debug!("thread watcher loop exiting");
}
