//! Parameter block handed to the routine that runs inside the session process.
//!
//! The block is copied byte-for-byte into another address space, so it holds
//! no pointers into the engine: only fixed-size name buffers and function
//! addresses that are valid in every process of the same bitness (system DLLs
//! load at the same base in all of them for the lifetime of a boot).
//!
//! The layout is `#[repr(C)]` with no padding, which lets `zerocopy` view it as
//! plain bytes for the remote write.

use thiserror::Error;
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

/// Capacity of the UTF-16 module name buffer, NUL included.
pub const MODULE_NAME_UNITS: usize = 64;

/// Capacity of each ASCII function name buffer, NUL included.
pub const FUNCTION_NAME_SIZE: usize = 32;

/// DLL the remote routine looks up for the token functions.
pub const RELOAD_MODULE: &str = "advapi32.dll";

/// Which arity of `UpdatePerUserSystemParameters` the session process expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum OsGeneration {
    /// `UpdatePerUserSystemParameters(bool)`.
    Legacy = 0,
    /// `UpdatePerUserSystemParameters(u32, bool)`; the first argument is unused.
    SessionAware = 1,
}

impl TryFrom<u32> for OsGeneration {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            0 => Ok(OsGeneration::Legacy),
            1 => Ok(OsGeneration::SessionAware),
            _ => Err(()),
        }
    }
}

/// Errors raised while filling or checking an [`InjectParamBlock`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamBlockError {
    #[error("name {name:?} does not fit in {capacity} units")]
    NameTooLong { name: String, capacity: usize },

    #[error("function slot `{0}` has not been resolved")]
    UnresolvedSlot(&'static str),
}

/// Cross-process parameter block.
///
/// Name buffers are filled by [`InjectParamBlock::template`]; the address
/// slots are filled by the engine after resolving each symbol locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct InjectParamBlock {
    pub os_generation: u32,
    /// Engine process whose token the remote routine impersonates.
    pub pid: u32,
    pub module_name: [u16; MODULE_NAME_UNITS],
    pub name_get_module_handle: [u8; FUNCTION_NAME_SIZE],
    pub name_get_proc_address: [u8; FUNCTION_NAME_SIZE],
    pub name_update: [u8; FUNCTION_NAME_SIZE],
    pub name_open_process: [u8; FUNCTION_NAME_SIZE],
    pub name_close_handle: [u8; FUNCTION_NAME_SIZE],
    pub name_open_process_token: [u8; FUNCTION_NAME_SIZE],
    pub name_impersonate: [u8; FUNCTION_NAME_SIZE],
    pub name_revert_to_self: [u8; FUNCTION_NAME_SIZE],

    // ── Resolved addresses ───────────────────────────────────────────────────
    pub get_module_handle: usize,
    pub get_proc_address: usize,
    pub update_legacy: usize,
    pub update_session: usize,
    pub open_process: usize,
    pub close_handle: usize,
}

/// Names written into the template, in field order.
pub const FUNCTION_NAMES: [&str; 8] = [
    "GetModuleHandleW",
    "GetProcAddress",
    "UpdatePerUserSystemParameters",
    "OpenProcess",
    "CloseHandle",
    "OpenProcessToken",
    "ImpersonateLoggedOnUser",
    "RevertToSelf",
];

impl InjectParamBlock {
    /// A block with every name buffer filled and every address slot null.
    pub fn template(os_generation: OsGeneration, pid: u32) -> Result<Self, ParamBlockError> {
        let mut block = Self::new_zeroed();
        block.os_generation = os_generation as u32;
        block.pid = pid;
        fill_wide(&mut block.module_name, RELOAD_MODULE)?;

        let [gmh, gpa, upd, op, ch, opt, imp, rev] = FUNCTION_NAMES;
        fill_ascii(&mut block.name_get_module_handle, gmh)?;
        fill_ascii(&mut block.name_get_proc_address, gpa)?;
        fill_ascii(&mut block.name_update, upd)?;
        fill_ascii(&mut block.name_open_process, op)?;
        fill_ascii(&mut block.name_close_handle, ch)?;
        fill_ascii(&mut block.name_open_process_token, opt)?;
        fill_ascii(&mut block.name_impersonate, imp)?;
        fill_ascii(&mut block.name_revert_to_self, rev)?;
        Ok(block)
    }

    pub fn generation(&self) -> Option<OsGeneration> {
        OsGeneration::try_from(self.os_generation).ok()
    }

    /// Checks that every slot the remote routine calls through is non-null.
    ///
    /// Only the update slot matching `os_generation` is required.
    pub fn validate(&self) -> Result<(), ParamBlockError> {
        let update = match self.generation() {
            Some(OsGeneration::SessionAware) => ("update_session", self.update_session),
            _ => ("update_legacy", self.update_legacy),
        };
        let slots = [
            ("get_module_handle", self.get_module_handle),
            ("get_proc_address", self.get_proc_address),
            update,
            ("open_process", self.open_process),
            ("close_handle", self.close_handle),
        ];
        match slots.iter().find(|(_, addr)| *addr == 0) {
            Some((name, _)) => Err(ParamBlockError::UnresolvedSlot(name)),
            None => Ok(()),
        }
    }

    /// Byte view written into the target process.
    pub fn as_wire_bytes(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Copies an ASCII name into `buf`, leaving room for the NUL.
fn fill_ascii(buf: &mut [u8; FUNCTION_NAME_SIZE], name: &str) -> Result<(), ParamBlockError> {
    if !name.is_ascii() || name.len() >= buf.len() {
        return Err(ParamBlockError::NameTooLong {
            name: name.to_string(),
            capacity: buf.len(),
        });
    }
    buf.fill(0);
    buf[..name.len()].copy_from_slice(name.as_bytes());
    Ok(())
}

fn fill_wide(buf: &mut [u16; MODULE_NAME_UNITS], name: &str) -> Result<(), ParamBlockError> {
    let units: Vec<u16> = name.encode_utf16().collect();
    if units.len() >= buf.len() {
        return Err(ParamBlockError::NameTooLong {
            name: name.to_string(),
            capacity: buf.len(),
        });
    }
    buf.fill(0);
    buf[..units.len()].copy_from_slice(&units);
    Ok(())
}

/// Reads a NUL-terminated ASCII name back out of a buffer.
pub fn ascii_name(buf: &[u8]) -> &str {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..end]).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(generation: OsGeneration) -> InjectParamBlock {
        let mut block = InjectParamBlock::template(generation, 4242).unwrap();
        block.get_module_handle = 0x1000;
        block.get_proc_address = 0x2000;
        block.update_legacy = 0x3000;
        block.update_session = 0x3000;
        block.open_process = 0x4000;
        block.close_handle = 0x5000;
        block
    }

    #[test]
    fn test_template_fills_every_name() {
        let block = InjectParamBlock::template(OsGeneration::SessionAware, 612).unwrap();

        assert_eq!(block.pid, 612);
        assert_eq!(block.generation(), Some(OsGeneration::SessionAware));
        assert_eq!(ascii_name(&block.name_update), "UpdatePerUserSystemParameters");
        assert_eq!(ascii_name(&block.name_revert_to_self), "RevertToSelf");
        let module: String = char::decode_utf16(block.module_name.iter().copied().take_while(|&u| u != 0))
            .map(|c| c.unwrap())
            .collect();
        assert_eq!(module, RELOAD_MODULE);
    }

    #[test]
    fn test_template_leaves_slots_null() {
        let block = InjectParamBlock::template(OsGeneration::Legacy, 1).unwrap();
        assert_eq!(
            block.validate(),
            Err(ParamBlockError::UnresolvedSlot("get_module_handle"))
        );
    }

    #[test]
    fn test_template_starts_from_an_all_zero_block() {
        // Arrange
        let block = InjectParamBlock::template(OsGeneration::SessionAware, 7).unwrap();

        // Act
        let slots = [
            block.get_module_handle,
            block.get_proc_address,
            block.update_legacy,
            block.update_session,
            block.open_process,
            block.close_handle,
        ];

        // Assert
        assert!(slots.iter().all(|&slot| slot == 0));
        let tail = &block.name_update[FUNCTION_NAMES[2].len()..];
        assert!(tail.iter().all(|&b| b == 0));
        assert_eq!(block.as_wire_bytes().len(), std::mem::size_of::<InjectParamBlock>());
    }

    #[test]
    fn test_validate_requires_only_matching_update_slot() {
        let mut block = resolved(OsGeneration::Legacy);
        block.update_session = 0;
        assert!(block.validate().is_ok());

        block.os_generation = OsGeneration::SessionAware as u32;
        assert_eq!(
            block.validate(),
            Err(ParamBlockError::UnresolvedSlot("update_session"))
        );
    }

    #[test]
    fn test_fill_ascii_rejects_name_without_room_for_nul() {
        let mut buf = [0u8; FUNCTION_NAME_SIZE];
        let name = "A".repeat(FUNCTION_NAME_SIZE);
        assert!(matches!(
            fill_ascii(&mut buf, &name),
            Err(ParamBlockError::NameTooLong { capacity: 32, .. })
        ));
        assert!(fill_ascii(&mut buf, &name[..31]).is_ok());
    }

    #[test]
    fn test_wire_bytes_cover_whole_block_and_read_back() {
        let block = resolved(OsGeneration::SessionAware);
        let bytes = block.as_wire_bytes();

        assert_eq!(bytes.len(), std::mem::size_of::<InjectParamBlock>());
        let back = InjectParamBlock::read_from_bytes(bytes).unwrap();
        assert_eq!(back, block);
    }
}
