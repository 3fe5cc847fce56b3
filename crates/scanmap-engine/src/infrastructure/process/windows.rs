//! Windows implementation of remote memory and remote threads.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "windows")]

use std::ffi::c_void;
use std::io;
use std::time::Duration;

use tracing::warn;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows::Win32::System::Diagnostics::Debug::WriteProcessMemory;
use windows::Win32::System::Memory::{
    VirtualAllocEx, VirtualFreeEx, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READWRITE,
};
use windows::Win32::System::Threading::{
    CreateRemoteThread, GetExitCodeThread, OpenProcess, WaitForSingleObject,
    LPTHREAD_START_ROUTINE, PROCESS_CREATE_THREAD, PROCESS_QUERY_INFORMATION,
    PROCESS_VM_OPERATION, PROCESS_VM_WRITE,
};

use super::{ProcessMemory, ThreadWait};
use crate::application::thread_watcher::RawHandle;

/// `WAIT_TIMEOUT` as returned by `WaitForSingleObject`.
const WAIT_TIMEOUT_CODE: u32 = 0x102;

fn to_handle(raw: RawHandle) -> HANDLE {
    HANDLE(raw.0 as *mut c_void)
}

fn from_handle(handle: HANDLE) -> RawHandle {
    RawHandle(handle.0 as usize)
}

/// Real cross-process primitives.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsProcessMemory;

impl WindowsProcessMemory {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessMemory for WindowsProcessMemory {
    fn open_process(&self, pid: u32) -> io::Result<RawHandle> {
        let rights = PROCESS_CREATE_THREAD
            | PROCESS_VM_OPERATION
            | PROCESS_VM_WRITE
            | PROCESS_QUERY_INFORMATION;
        // SAFETY: Plain handle acquisition; ownership passes to the caller.
        let process = unsafe { OpenProcess(rights, false, pid) }
            .map_err(|_| io::Error::last_os_error())?;
        Ok(from_handle(process))
    }

    fn allocate(&self, process: RawHandle, size: usize) -> io::Result<usize> {
        // SAFETY: `process` was opened with PROCESS_VM_OPERATION.
        let address = unsafe {
            VirtualAllocEx(
                to_handle(process),
                None,
                size,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_EXECUTE_READWRITE,
            )
        };
        if address.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(address as usize)
    }

    fn write(&self, process: RawHandle, address: usize, bytes: &[u8]) -> io::Result<()> {
        let mut written = 0usize;
        // SAFETY: `address..address + bytes.len()` lies inside a region this
        // adapter allocated in `process`, which was opened with PROCESS_VM_WRITE.
        unsafe {
            WriteProcessMemory(
                to_handle(process),
                address as *const c_void,
                bytes.as_ptr() as *const c_void,
                bytes.len(),
                Some(&mut written),
            )
        }
        .map_err(|_| io::Error::last_os_error())?;
        if written != bytes.len() {
            return Err(io::Error::other(format!(
                "partial write: {written} of {} bytes",
                bytes.len()
            )));
        }
        Ok(())
    }

    fn create_thread(&self, process: RawHandle, start: usize, param: usize) -> io::Result<RawHandle> {
        // SAFETY: `start` is the address of routine bytes copied into the
        // target; reinterpreting it as a thread start routine is exactly what
        // CreateRemoteThread expects. The pointer is never called locally.
        let routine: LPTHREAD_START_ROUTINE = unsafe {
            Some(std::mem::transmute::<
                usize,
                unsafe extern "system" fn(*mut c_void) -> u32,
            >(start))
        };
        // SAFETY: `process` was opened with PROCESS_CREATE_THREAD.
        let thread = unsafe {
            CreateRemoteThread(
                to_handle(process),
                None,
                0,
                routine,
                Some(param as *const c_void),
                0,
                None,
            )
        }
        .map_err(|_| io::Error::last_os_error())?;
        Ok(from_handle(thread))
    }

    fn wait(&self, thread: RawHandle, timeout: Duration) -> ThreadWait {
        let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX - 1);
        // SAFETY: `thread` is an open thread handle owned by the injector.
        let result = unsafe { WaitForSingleObject(to_handle(thread), millis) };
        if result.0 == WAIT_OBJECT_0.0 {
            let mut exit_code = 0u32;
            // SAFETY: The thread has finished; its exit code is readable.
            if let Err(e) = unsafe { GetExitCodeThread(to_handle(thread), &mut exit_code) } {
                warn!("GetExitCodeThread failed: {e}");
            }
            ThreadWait::Completed { exit_code }
        } else if result.0 == WAIT_TIMEOUT_CODE {
            ThreadWait::TimedOut
        } else {
            ThreadWait::Failed(io::Error::last_os_error())
        }
    }

    fn free(&self, process: RawHandle, address: usize) {
        // SAFETY: The region's thread has finished or never started, so
        // nothing in the target executes from it any more.
        if let Err(e) =
            unsafe { VirtualFreeEx(to_handle(process), address as *mut c_void, 0, MEM_RELEASE) }
        {
            warn!("VirtualFreeEx at {address:#x} failed: {e}");
        }
    }

    fn close(&self, handle: RawHandle) {
        // SAFETY: Each handle is closed once, by the resource that owns it.
        if let Err(e) = unsafe { CloseHandle(to_handle(handle)) } {
            warn!("CloseHandle failed: {e}");
        }
    }
}
