//! Windows session discovery and privilege handling.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "windows")]

use std::io;

use scanmap_core::{InjectParamBlock, OsGeneration};
use tracing::{debug, info};
use windows::core::{w, PCSTR, PCWSTR};
use windows::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_NOT_ALL_ASSIGNED, HANDLE, HMODULE, LUID,
};
use windows::Win32::Security::{
    AdjustTokenPrivileges, LookupPrivilegeValueW, LUID_AND_ATTRIBUTES, SE_DEBUG_NAME,
    SE_PRIVILEGE_ENABLED, TOKEN_ADJUST_PRIVILEGES, TOKEN_PRIVILEGES, TOKEN_QUERY,
};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
    TH32CS_SNAPPROCESS,
};
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress, LoadLibraryW};
use windows::Win32::System::RemoteDesktop::ProcessIdToSessionId;
use windows::Win32::System::SystemInformation::{GetVersionExW, OSVERSIONINFOW};
use windows::Win32::System::Threading::{GetCurrentProcess, GetCurrentProcessId, OpenProcessToken};

use super::{remote, PrivilegeError, SessionPlatform};

/// Executable name of the session process.
const SESSION_PROCESS: &str = "winlogon.exe";

/// A handle closed on drop.
struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: The handle is owned by this guard and closed once.
        let _ = unsafe { CloseHandle(self.0) };
    }
}

fn session_of(pid: u32) -> io::Result<u32> {
    let mut session = 0u32;
    // SAFETY: `session` is a valid out-pointer.
    unsafe { ProcessIdToSessionId(pid, &mut session) }.map_err(|_| io::Error::last_os_error())?;
    Ok(session)
}

fn exe_name(entry: &PROCESSENTRY32W) -> String {
    let len = entry
        .szExeFile
        .iter()
        .position(|&c| c == 0)
        .unwrap_or(entry.szExeFile.len());
    String::from_utf16_lossy(&entry.szExeFile[..len])
}

fn resolve(module: HMODULE, name: &[u8]) -> io::Result<usize> {
    // SAFETY: Every name buffer in the block is NUL-terminated by `template`.
    let address = unsafe { GetProcAddress(module, PCSTR(name.as_ptr())) };
    address.map(|f| f as usize).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("export {} not found", scanmap_core::inject_params::ascii_name(name)),
        )
    })
}

/// The real session of the interactive user.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsSession;

impl WindowsSession {
    pub fn new() -> Self {
        Self
    }
}

impl SessionPlatform for WindowsSession {
    fn find_session_process(&self) -> io::Result<u32> {
        let own_session = session_of(self.current_pid())?;

        // SAFETY: Snapshot handle is owned by the guard below.
        let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
            .map_err(|_| io::Error::last_os_error())?;
        let snapshot = OwnedHandle(snapshot);

        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };
        // SAFETY: `entry.dwSize` is set as the API requires.
        let mut more = unsafe { Process32FirstW(snapshot.0, &mut entry) }.is_ok();
        while more {
            if exe_name(&entry).eq_ignore_ascii_case(SESSION_PROCESS)
                && session_of(entry.th32ProcessID).ok() == Some(own_session)
            {
                debug!(pid = entry.th32ProcessID, session = own_session, "found session process");
                return Ok(entry.th32ProcessID);
            }
            // SAFETY: Same snapshot and entry as above.
            more = unsafe { Process32NextW(snapshot.0, &mut entry) }.is_ok();
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no {SESSION_PROCESS} in session {own_session}"),
        ))
    }

    fn current_pid(&self) -> u32 {
        // SAFETY: No preconditions.
        unsafe { GetCurrentProcessId() }
    }

    fn os_generation(&self) -> OsGeneration {
        let mut info = OSVERSIONINFOW {
            dwOSVersionInfoSize: std::mem::size_of::<OSVERSIONINFOW>() as u32,
            ..Default::default()
        };
        // SAFETY: The size field is set as the API requires.
        match unsafe { GetVersionExW(&mut info) } {
            Ok(()) if info.dwMajorVersion < 6 => OsGeneration::Legacy,
            _ => OsGeneration::SessionAware,
        }
    }

    fn enable_debug_privilege(&self) -> Result<(), PrivilegeError> {
        let mut token = HANDLE::default();
        // SAFETY: The pseudo handle needs no closing; `token` is owned below.
        unsafe {
            OpenProcessToken(
                GetCurrentProcess(),
                TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY,
                &mut token,
            )
        }
        .map_err(|_| PrivilegeError::OpenProcess(io::Error::last_os_error()))?;
        let token = OwnedHandle(token);

        let mut luid = LUID::default();
        // SAFETY: `SE_DEBUG_NAME` is a static wide string.
        unsafe { LookupPrivilegeValueW(PCWSTR::null(), SE_DEBUG_NAME, &mut luid) }
            .map_err(|_| PrivilegeError::Lookup(io::Error::last_os_error()))?;

        let privileges = TOKEN_PRIVILEGES {
            PrivilegeCount: 1,
            Privileges: [LUID_AND_ATTRIBUTES {
                Luid: luid,
                Attributes: SE_PRIVILEGE_ENABLED,
            }],
        };
        // SAFETY: `privileges` lives across the call; no previous state is requested.
        unsafe { AdjustTokenPrivileges(token.0, false, Some(&privileges), 0, None, None) }
            .map_err(|_| PrivilegeError::Adjust(io::Error::last_os_error()))?;
        // SAFETY: No preconditions.
        if unsafe { GetLastError() } == ERROR_NOT_ALL_ASSIGNED {
            return Err(PrivilegeError::Adjust(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "SeDebugPrivilege is not held by this account",
            )));
        }
        info!("debug privilege enabled");
        Ok(())
    }

    fn resolve_symbols(&self, block: &mut InjectParamBlock) -> io::Result<()> {
        // SAFETY: kernel32 is mapped into every process.
        let kernel32 = unsafe { GetModuleHandleW(w!("kernel32.dll")) }
            .map_err(|_| io::Error::last_os_error())?;
        // SAFETY: Loading a system DLL by name; it stays loaded for the
        // lifetime of the process.
        let user32 =
            unsafe { LoadLibraryW(w!("user32.dll")) }.map_err(|_| io::Error::last_os_error())?;

        block.get_module_handle = resolve(kernel32, &block.name_get_module_handle)?;
        block.get_proc_address = resolve(kernel32, &block.name_get_proc_address)?;
        block.open_process = resolve(kernel32, &block.name_open_process)?;
        block.close_handle = resolve(kernel32, &block.name_close_handle)?;
        let update = resolve(user32, &block.name_update)?;
        match block.generation() {
            Some(OsGeneration::SessionAware) => block.update_session = update,
            _ => block.update_legacy = update,
        }
        Ok(())
    }

    fn entry_stub(&self) -> io::Result<Vec<u8>> {
        remote::stub_bytes()
    }
}
