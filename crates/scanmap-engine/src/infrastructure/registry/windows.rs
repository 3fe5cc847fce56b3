//! Registry access through the Win32 `Reg*` functions.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "windows")]

use std::io;

use scanmap_core::StatusCode;
use tracing::{debug, warn};
use windows::core::PCWSTR;
use windows::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_SUCCESS, WIN32_ERROR};
use windows::Win32::System::Registry::{
    RegCloseKey, RegDeleteValueW, RegOpenKeyExW, RegQueryValueExW, RegSetValueExW, HKEY,
    HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_READ, KEY_WRITE, REG_BINARY, REG_SAM_FLAGS,
    REG_VALUE_TYPE,
};

use super::Registry;
use crate::application::injection_coordinator::{
    SYSTEM_KEYBOARD_LAYOUT_KEY, USER_KEYBOARD_LAYOUT_KEY,
};

/// Root of a [`WindowsRegistry`] key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hive {
    CurrentUser,
    LocalMachine,
}

impl Hive {
    fn root(self) -> HKEY {
        match self {
            Hive::CurrentUser => HKEY_CURRENT_USER,
            Hive::LocalMachine => HKEY_LOCAL_MACHINE,
        }
    }
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn os_error(status: WIN32_ERROR) -> io::Error {
    io::Error::from_raw_os_error(status.0 as i32)
}

/// An open key, closed on drop.
struct OpenKey(HKEY);

impl Drop for OpenKey {
    fn drop(&mut self) {
        // SAFETY: The key was opened by `WindowsRegistry::open` and is closed once.
        let status = unsafe { RegCloseKey(self.0) };
        if status != ERROR_SUCCESS {
            warn!("RegCloseKey failed: {}", os_error(status));
        }
    }
}

/// One keyboard layout key in a real hive.
#[derive(Debug, Clone)]
pub struct WindowsRegistry {
    hive: Hive,
    subkey: String,
}

impl WindowsRegistry {
    pub fn new(hive: Hive, subkey: impl Into<String>) -> Self {
        Self {
            hive,
            subkey: subkey.into(),
        }
    }

    /// `HKCU\Control Panel\Keyboard Layout`.
    pub fn per_user() -> Self {
        Self::new(Hive::CurrentUser, USER_KEYBOARD_LAYOUT_KEY)
    }

    /// `HKLM\SYSTEM\CurrentControlSet\Control\Keyboard Layout`.
    pub fn system() -> Self {
        Self::new(Hive::LocalMachine, SYSTEM_KEYBOARD_LAYOUT_KEY)
    }

    fn open(&self, access: REG_SAM_FLAGS) -> io::Result<OpenKey> {
        let subkey = wide(&self.subkey);
        let mut key = HKEY::default();
        // SAFETY: `subkey` is NUL-terminated and outlives the call; `key` is
        // a valid out-pointer.
        let status = unsafe {
            RegOpenKeyExW(self.hive.root(), PCWSTR(subkey.as_ptr()), 0, access, &mut key)
        };
        if status != ERROR_SUCCESS {
            return Err(os_error(status));
        }
        Ok(OpenKey(key))
    }
}

impl Registry for WindowsRegistry {
    fn read_binary(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let key = self.open(KEY_READ)?;
        let name = wide(name);
        let mut value_type = REG_VALUE_TYPE::default();
        let mut size = 0u32;

        // SAFETY: Size query only; every out-pointer is valid.
        let status = unsafe {
            RegQueryValueExW(
                key.0,
                PCWSTR(name.as_ptr()),
                None,
                Some(&mut value_type),
                None,
                Some(&mut size),
            )
        };
        if status == ERROR_FILE_NOT_FOUND {
            return Ok(None);
        }
        if status != ERROR_SUCCESS {
            return Err(os_error(status));
        }

        let mut data = vec![0u8; size as usize];
        // SAFETY: `data` holds `size` bytes, as reported by the query above.
        let status = unsafe {
            RegQueryValueExW(
                key.0,
                PCWSTR(name.as_ptr()),
                None,
                Some(&mut value_type),
                Some(data.as_mut_ptr()),
                Some(&mut size),
            )
        };
        if status != ERROR_SUCCESS {
            return Err(os_error(status));
        }
        data.truncate(size as usize);
        if value_type != REG_BINARY {
            warn!(?value_type, "scancode map value is not REG_BINARY");
        }
        Ok(Some(data))
    }

    fn write_binary(&self, name: &str, data: &[u8]) -> io::Result<()> {
        let key = self.open(KEY_WRITE)?;
        let name = wide(name);
        // SAFETY: `name` and `data` outlive the call.
        let status =
            unsafe { RegSetValueExW(key.0, PCWSTR(name.as_ptr()), 0, REG_BINARY, Some(data)) };
        if status != ERROR_SUCCESS {
            return Err(os_error(status));
        }
        debug!(hive = ?self.hive, bytes = data.len(), "registry value written");
        Ok(())
    }

    fn delete_value(&self, name: &str) -> io::Result<()> {
        let key = self.open(KEY_WRITE)?;
        let name = wide(name);
        // SAFETY: `name` is NUL-terminated and outlives the call.
        let status = unsafe { RegDeleteValueW(key.0, PCWSTR(name.as_ptr())) };
        if status != ERROR_SUCCESS && status != ERROR_FILE_NOT_FOUND {
            return Err(os_error(status));
        }
        Ok(())
    }

    fn is_writable(&self) -> bool {
        self.open(KEY_READ | KEY_WRITE).is_ok()
    }

    fn prepare_access(&self) -> Result<(), StatusCode> {
        // The session process reads the key through the impersonated user
        // token, so read access for the current user is all that is needed.
        self.open(KEY_READ).map(drop).map_err(|e| {
            warn!(hive = ?self.hive, "keyboard layout key is not readable: {e}");
            StatusCode::GetSecurityInfo
        })
    }
}
