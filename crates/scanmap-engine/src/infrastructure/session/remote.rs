//! The routine that runs inside the session process.
//!
//! [`remote_entry`] is copied byte-for-byte into winlogon and started there
//! with a pointer to the copied [`InjectParamBlock`]. It may only touch the
//! block and call through the addresses stored in it: no statics, no calls
//! into this image, no panics. Field access goes through `addr_of!` and
//! function pointers come from `transmute`, neither of which emits a call.
//!
//! The routine borrows the engine's token, calls
//! `UpdatePerUserSystemParameters` as that user and reverts.
//!
//! # Safety
//!
//! Everything here is `unsafe` by nature; each block states what it relies on.

#![cfg(target_os = "windows")]
#![allow(clippy::missing_safety_doc)]

use std::io;
use std::mem::transmute;
use std::ptr::addr_of;

use scanmap_core::{InjectParamBlock, StatusCode};

type GetModuleHandleFn = unsafe extern "system" fn(*const u16) -> usize;
type GetProcAddressFn = unsafe extern "system" fn(usize, *const u8) -> usize;
type UpdateLegacyFn = unsafe extern "system" fn(i32) -> i32;
type UpdateSessionFn = unsafe extern "system" fn(u32, i32) -> i32;
type OpenProcessFn = unsafe extern "system" fn(u32, i32, u32) -> usize;
type OpenProcessTokenFn = unsafe extern "system" fn(usize, u32, *mut usize) -> i32;
type ImpersonateFn = unsafe extern "system" fn(usize) -> i32;
type RevertToSelfFn = unsafe extern "system" fn() -> i32;
type CloseHandleFn = unsafe extern "system" fn(usize) -> i32;

const PROCESS_QUERY_INFORMATION: u32 = 0x0400;
/// TOKEN_DUPLICATE | TOKEN_IMPERSONATE | TOKEN_QUERY
const TOKEN_ACCESS: u32 = 0x0002 | 0x0004 | 0x0008;

/// Exit code when the reload call itself reports failure.
pub const UPDATE_FAILED: u32 = 1;

/// Largest image accepted by [`stub_bytes`].
const MAX_STUB_SIZE: usize = 4096;

/// First byte of an incremental-linking jump thunk.
const JMP_REL32: u8 = 0xE9;

/// Runs inside the session process.
///
/// Returns 0 on success or a status code number on failure.
///
/// # Safety
///
/// `block` must point to a fully resolved block in the current process and
/// every non-null slot must be the address of the matching system export.
#[inline(never)]
pub unsafe extern "system" fn remote_entry(block: *mut InjectParamBlock) -> u32 {
    let get_module_handle = *addr_of!((*block).get_module_handle);
    let get_proc_address = *addr_of!((*block).get_proc_address);
    let open_process = *addr_of!((*block).open_process);
    let close_handle = *addr_of!((*block).close_handle);
    let session_aware = *addr_of!((*block).os_generation) == 1;
    let update = if session_aware {
        *addr_of!((*block).update_session)
    } else {
        *addr_of!((*block).update_legacy)
    };
    if get_module_handle == 0
        || get_proc_address == 0
        || open_process == 0
        || close_handle == 0
        || update == 0
    {
        return StatusCode::InsufficientBuffer as u32;
    }

    let get_module_handle: GetModuleHandleFn = transmute(get_module_handle);
    let get_proc_address: GetProcAddressFn = transmute(get_proc_address);
    let open_process: OpenProcessFn = transmute(open_process);
    let close_handle: CloseHandleFn = transmute(close_handle);

    let advapi32 = get_module_handle(addr_of!((*block).module_name) as *const u16);
    if advapi32 == 0 {
        return StatusCode::InsufficientBuffer as u32;
    }
    let open_token = get_proc_address(advapi32, addr_of!((*block).name_open_process_token) as *const u8);
    let impersonate = get_proc_address(advapi32, addr_of!((*block).name_impersonate) as *const u8);
    let revert = get_proc_address(advapi32, addr_of!((*block).name_revert_to_self) as *const u8);
    if open_token == 0 || impersonate == 0 || revert == 0 {
        return StatusCode::InsufficientBuffer as u32;
    }
    let open_token: OpenProcessTokenFn = transmute(open_token);
    let impersonate: ImpersonateFn = transmute(impersonate);
    let revert: RevertToSelfFn = transmute(revert);

    let process = open_process(PROCESS_QUERY_INFORMATION, 0, *addr_of!((*block).pid));
    if process == 0 {
        return StatusCode::OpenEngineProcess as u32;
    }
    let mut token = 0usize;
    if open_token(process, TOKEN_ACCESS, &mut token) == 0 {
        close_handle(process);
        return StatusCode::OpenEngineToken as u32;
    }
    if impersonate(token) == 0 {
        close_handle(token);
        close_handle(process);
        return StatusCode::Impersonate as u32;
    }

    let updated = if session_aware {
        let update: UpdateSessionFn = transmute(update);
        update(0, 1)
    } else {
        let update: UpdateLegacyFn = transmute(update);
        update(1)
    };

    let reverted = revert();
    close_handle(token);
    close_handle(process);
    if reverted == 0 {
        return StatusCode::RevertToSelf as u32;
    }
    if updated == 0 {
        return UPDATE_FAILED;
    }
    0
}

/// Marks the end of [`remote_entry`] in the image.
#[inline(never)]
pub extern "system" fn remote_entry_end() -> u32 {
    0x5CA4_3A9D
}

/// Copies the machine code of [`remote_entry`].
///
/// # Errors
///
/// Returns [`io::ErrorKind::InvalidData`] when the end marker does not follow
/// the routine, the span is implausibly large, or the address is a linker
/// thunk rather than the routine body.
pub fn stub_bytes() -> io::Result<Vec<u8>> {
    let start = remote_entry as usize;
    let end = remote_entry_end as usize;
    if end <= start || end - start > MAX_STUB_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("remote routine span {start:#x}..{end:#x} is not contiguous"),
        ));
    }
    // SAFETY: Both addresses lie in this image's code section and
    // `start..end` was checked to be a short forward range.
    let bytes = unsafe { std::slice::from_raw_parts(start as *const u8, end - start) };
    if bytes.first() == Some(&JMP_REL32) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "remote routine address is a jump thunk; build without incremental linking",
        ));
    }
    Ok(bytes.to_vec())
}
