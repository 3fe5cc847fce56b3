//! Thread-handle primitives behind the [`ThreadWatcher`].
//!
//! On Windows the watcher waits on real thread handles with
//! `WaitForMultipleObjects`; tests use [`mock::MockThreadPlatform`], which
//! simulates threads and auto-reset events with a condition variable.
//!
//! [`ThreadWatcher`]: crate::application::thread_watcher::ThreadWatcher

pub use crate::application::thread_watcher::{RawHandle, ThreadPlatform, WaitResult};

pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;
