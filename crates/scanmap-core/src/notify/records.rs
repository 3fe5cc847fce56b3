//! Notify record types exchanged between hook contexts and the engine.
//!
//! Every record has the same two-word header followed by a payload whose
//! interpretation depends on the type tag. All variants fit inside
//! [`NOTIFY_MESSAGE_SIZE`] bytes, which is the size of the focus variant,
//! so receivers can use one fixed slot size for every record.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hwnd::Hwnd32;

// ── Layout constants ──────────────────────────────────────────────────────────

/// Capacity of every text field in UTF-16 code units, NUL included.
pub const MAX_PATH_CHARS: usize = 260 * 4;

/// Size of one encoded text field in bytes.
pub const TEXT_FIELD_SIZE: usize = MAX_PATH_CHARS * 2;

/// Size of the common header: type tag (4) + debug param (4).
pub const NOTIFY_HEADER_SIZE: usize = 8;

/// Size of the largest variant, used as the fixed slot size.
pub const NOTIFY_MESSAGE_SIZE: usize = NOTIFY_HEADER_SIZE + 4 + 4 + 2 * TEXT_FIELD_SIZE;

// ── Type tags ─────────────────────────────────────────────────────────────────

/// Discriminant stored in the first header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum NotifyType {
    SetFocus = 0,
    Name = 1,
    LockState = 2,
    Sync = 3,
    ThreadAttach = 4,
    ThreadDetach = 5,
    Command64 = 6,
    Command32 = 7,
    Show = 8,
    Log = 9,
}

impl TryFrom<u32> for NotifyType {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            0 => Ok(NotifyType::SetFocus),
            1 => Ok(NotifyType::Name),
            2 => Ok(NotifyType::LockState),
            3 => Ok(NotifyType::Sync),
            4 => Ok(NotifyType::ThreadAttach),
            5 => Ok(NotifyType::ThreadDetach),
            6 => Ok(NotifyType::Command64),
            7 => Ok(NotifyType::Command32),
            8 => Ok(NotifyType::Show),
            9 => Ok(NotifyType::Log),
            _ => Err(()),
        }
    }
}

// ── Payloads ──────────────────────────────────────────────────────────────────

/// Focus change: which thread/window gained focus, with its class and title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusInfo {
    pub thread_id: u32,
    pub hwnd: Hwnd32,
    pub class_name: String,
    pub title_name: String,
}

/// Toggle state of the lock keys and the IME.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockState {
    pub num_lock: bool,
    pub caps_lock: bool,
    pub scroll_lock: bool,
    pub kana_lock: bool,
    pub ime_lock: bool,
    pub ime_comp: bool,
}

/// A window message observed by a hook in a 32-bit process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command32 {
    pub hwnd: Hwnd32,
    pub message: u32,
    pub wparam: u32,
    pub lparam: i32,
}

/// A window message observed by a hook in a 64-bit process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command64 {
    pub hwnd: Hwnd32,
    pub message: u32,
    pub wparam: u64,
    pub lparam: i64,
}

/// Window show state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum ShowState {
    Normal = 0,
    Maximized = 1,
    Minimized = 2,
}

impl TryFrom<u32> for ShowState {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            0 => Ok(ShowState::Normal),
            1 => Ok(ShowState::Maximized),
            2 => Ok(ShowState::Minimized),
            _ => Err(()),
        }
    }
}

/// Show-state change of the foreground window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowInfo {
    pub show: ShowState,
    pub is_mdi: bool,
}

/// Type-specific body of a [`NotifyRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyPayload {
    SetFocus(FocusInfo),
    Name(FocusInfo),
    LockState(LockState),
    Sync,
    ThreadAttach { thread_id: u32 },
    ThreadDetach { thread_id: u32 },
    Command64(Command64),
    Command32(Command32),
    Show(ShowInfo),
    Log(String),
}

/// A tagged event record.
///
/// `debug_param` only correlates records in diagnostics; no behavior depends
/// on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyRecord {
    pub debug_param: u32,
    pub payload: NotifyPayload,
}

impl NotifyRecord {
    pub fn new(payload: NotifyPayload) -> Self {
        Self {
            debug_param: 0,
            payload,
        }
    }

    pub fn notify_type(&self) -> NotifyType {
        match self.payload {
            NotifyPayload::SetFocus(_) => NotifyType::SetFocus,
            NotifyPayload::Name(_) => NotifyType::Name,
            NotifyPayload::LockState(_) => NotifyType::LockState,
            NotifyPayload::Sync => NotifyType::Sync,
            NotifyPayload::ThreadAttach { .. } => NotifyType::ThreadAttach,
            NotifyPayload::ThreadDetach { .. } => NotifyType::ThreadDetach,
            NotifyPayload::Command64(_) => NotifyType::Command64,
            NotifyPayload::Command32(_) => NotifyType::Command32,
            NotifyPayload::Show(_) => NotifyType::Show,
            NotifyPayload::Log(_) => NotifyType::Log,
        }
    }

    /// Size of the header plus this variant's fixed-width payload.
    pub fn wire_size(&self) -> usize {
        NOTIFY_HEADER_SIZE + payload_size(self.notify_type())
    }
}

/// Fixed payload size of each variant.
pub fn payload_size(notify_type: NotifyType) -> usize {
    match notify_type {
        NotifyType::SetFocus | NotifyType::Name => 4 + 4 + 2 * TEXT_FIELD_SIZE,
        NotifyType::LockState => 6,
        NotifyType::Sync => 0,
        NotifyType::ThreadAttach | NotifyType::ThreadDetach => 4,
        NotifyType::Command64 => 4 + 4 + 8 + 8,
        NotifyType::Command32 => 4 + 4 + 4 + 4,
        NotifyType::Show => 4 + 1,
        NotifyType::Log => TEXT_FIELD_SIZE,
    }
}

impl fmt::Display for NotifyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            NotifyPayload::SetFocus(i) => write!(
                f,
                "focus: thread {} hwnd {} class {:?} title {:?}",
                i.thread_id, i.hwnd, i.class_name, i.title_name
            ),
            NotifyPayload::Name(i) => write!(
                f,
                "name: thread {} hwnd {} class {:?} title {:?}",
                i.thread_id, i.hwnd, i.class_name, i.title_name
            ),
            NotifyPayload::LockState(s) => write!(
                f,
                "lock state: num={} caps={} scroll={} kana={} ime={} comp={}",
                s.num_lock, s.caps_lock, s.scroll_lock, s.kana_lock, s.ime_lock, s.ime_comp
            ),
            NotifyPayload::Sync => write!(f, "sync"),
            NotifyPayload::ThreadAttach { thread_id } => write!(f, "thread attach: {thread_id}"),
            NotifyPayload::ThreadDetach { thread_id } => write!(f, "thread detach: {thread_id}"),
            NotifyPayload::Command64(c) => write!(
                f,
                "command64: hwnd {} msg 0x{:04X} wparam {} lparam {}",
                c.hwnd, c.message, c.wparam, c.lparam
            ),
            NotifyPayload::Command32(c) => write!(
                f,
                "command32: hwnd {} msg 0x{:04X} wparam {} lparam {}",
                c.hwnd, c.message, c.wparam, c.lparam
            ),
            NotifyPayload::Show(s) => write!(f, "show: {:?} mdi={}", s.show, s.is_mdi),
            NotifyPayload::Log(msg) => write!(f, "{msg}"),
        }
    }
}
