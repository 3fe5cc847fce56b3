//! Windows thread handles and events for the watcher.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "windows")]

use std::ffi::c_void;
use std::io;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_FAILED, WAIT_OBJECT_0};
use windows::Win32::System::Threading::{
    CreateEventW, OpenThread, SetEvent, WaitForMultipleObjects, INFINITE, THREAD_SYNCHRONIZE,
};

use super::{RawHandle, ThreadPlatform, WaitResult};

fn to_handle(raw: RawHandle) -> HANDLE {
    HANDLE(raw.0 as *mut c_void)
}

fn from_handle(handle: HANDLE) -> RawHandle {
    RawHandle(handle.0 as usize)
}

/// Waits on real thread handles with `WaitForMultipleObjects`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsThreadPlatform;

impl WindowsThreadPlatform {
    pub fn new() -> Self {
        Self
    }
}

impl ThreadPlatform for WindowsThreadPlatform {
    fn create_wake_event(&self) -> io::Result<RawHandle> {
        // SAFETY: No security attributes and no name; the returned handle is
        // owned by the caller and closed through `close`.
        let event = unsafe { CreateEventW(None, false, false, PCWSTR::null()) }
            .map_err(|_| io::Error::last_os_error())?;
        Ok(from_handle(event))
    }

    fn open_thread(&self, thread_id: u32) -> io::Result<RawHandle> {
        // SAFETY: SYNCHRONIZE is the only right needed to wait on the thread.
        let thread = unsafe { OpenThread(THREAD_SYNCHRONIZE, false, thread_id) }
            .map_err(|_| io::Error::last_os_error())?;
        Ok(from_handle(thread))
    }

    fn signal(&self, event: RawHandle) {
        // SAFETY: `event` was created by `create_wake_event` and is still open.
        if let Err(e) = unsafe { SetEvent(to_handle(event)) } {
            tracing::warn!("SetEvent failed: {e}");
        }
    }

    fn wait_any(&self, handles: &[RawHandle]) -> WaitResult {
        let handles: Vec<HANDLE> = handles.iter().map(|h| to_handle(*h)).collect();
        // SAFETY: Every handle in the slice is open for the duration of the
        // wait; the watcher only closes handles it has removed from the set.
        let result = unsafe { WaitForMultipleObjects(&handles, false, INFINITE) };
        if result == WAIT_FAILED {
            return WaitResult::Failed(io::Error::last_os_error());
        }
        let index = result.0.wrapping_sub(WAIT_OBJECT_0.0) as usize;
        if index < handles.len() {
            WaitResult::Signaled(index)
        } else {
            WaitResult::Failed(io::Error::other(format!(
                "unexpected wait result {:#x}",
                result.0
            )))
        }
    }

    fn close(&self, handle: RawHandle) {
        // SAFETY: The watcher closes each handle it owns exactly once.
        if let Err(e) = unsafe { CloseHandle(to_handle(handle)) } {
            tracing::warn!("CloseHandle failed: {e}");
        }
    }
}
