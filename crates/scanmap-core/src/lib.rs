//! # scanmap-core
//!
//! Shared data definitions for the scanmap remapping engine: the status code
//! taxonomy, the binary scancode map, the notify records that hook contexts
//! send to the engine, the cross-process injection parameter block, and the
//! process-wide hook configuration record.
//!
//! This crate makes no OS calls. Everything that touches a process, a thread,
//! a window or the registry lives in `scanmap-engine`.
//!
//! # Architecture overview (for beginners)
//!
//! A scancode map is a small binary table the OS reads from the registry to
//! remap physical keys before any application sees them. Normally it only
//! takes effect after logoff. The engine avoids that by writing the table and
//! then running a tiny routine inside the session process (winlogon) that asks
//! the OS to reload per-user parameters.
//!
//! - **`scancode_map`** – The registry blob: a 12-byte header plus 4-byte
//!   entries, ending in a zero sentinel.
//!
//! - **`inject_params`** – The `#[repr(C)]` block copied into the session
//!   process. It has no pointers into the engine, only names and addresses
//!   that are identical in every process of the same bitness.
//!
//! - **`notify`** – Tagged event records with a fixed slot size, encoded with
//!   explicit field widths so 32-bit and 64-bit processes agree on the layout.
//!
//! - **`status`** – One flat numeric taxonomy for every outcome the engine
//!   reports to its owner window.
//!
//! - **`hook_data`** – Lock-free settings read by hook callbacks.

pub mod hook_data;
pub mod hwnd;
pub mod inject_params;
pub mod ipc;
pub mod notify;
pub mod scancode_map;
pub mod status;

// Re-export the most-used types at the crate root so callers can write
// `scanmap_core::ScancodeMap` instead of `scanmap_core::scancode_map::ScancodeMap`.
pub use hook_data::{hook_data, HookData, MouseHookType, Point};
pub use hwnd::Hwnd32;
pub use inject_params::{InjectParamBlock, OsGeneration, ParamBlockError};
pub use notify::{decode_record, encode_record, NotifyCodecError, NotifyPayload, NotifyRecord};
pub use scancode_map::{ScancodeEntry, ScancodeMap, ScancodeMapError};
pub use status::{StatusCategory, StatusCode};
