//! Window handles narrowed to 32 bits for cross-process records.
//!
//! The window manager keeps handle values inside the low 32 bits on every
//! supported platform, so a 32-bit and a 64-bit process can exchange them in
//! a fixed-width field. Reconstruction zero-extends back to pointer width.
//! Widening this type would break the layout of every record that embeds it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A window handle stored as a fixed-width 32-bit value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Hwnd32(pub u32);

impl Hwnd32 {
    /// The null window.
    pub const NULL: Hwnd32 = Hwnd32(0);

    /// Narrows a native handle value. Bits above 32 are discarded.
    pub const fn from_raw(raw: usize) -> Self {
        Hwnd32(raw as u32)
    }

    /// Reconstructs the native handle value (zero-extended).
    pub const fn to_raw(self) -> usize {
        self.0 as usize
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Hwnd32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}
