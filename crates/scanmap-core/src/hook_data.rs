//! Process-wide hook configuration shared between the engine and hook contexts.
//!
//! The engine writes these fields rarely (on configuration reload, when the
//! tray window is created, when mouse-hook mode changes); hook callbacks read
//! them on every event, from arbitrary threads.
//!
//! # Consistency model
//!
//! Each field is an independent atomic. A reader always sees a whole value for
//! any single field, but there is no cross-field atomicity: a reader racing a
//! writer may observe the new sync key together with the old extended flag.
//! Last writer wins per field. There is no lock: hook callbacks never block on
//! the engine.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU16, AtomicU32, AtomicU8, Ordering};

use crate::hwnd::Hwnd32;

/// Mouse-hook features requested by the engine (bit set).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MouseHookType(pub u8);

impl MouseHookType {
    pub const NONE: u8 = 0;
    pub const WHEEL: u8 = 1 << 0;
    pub const WINDOW_MOVE: u8 = 1 << 1;

    pub fn wheel(&self) -> bool {
        self.0 & Self::WHEEL != 0
    }

    pub fn window_move(&self) -> bool {
        self.0 & Self::WINDOW_MOVE != 0
    }
}

/// A screen position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Shared hook configuration. See the module docs for the consistency model.
#[derive(Debug)]
pub struct HookData {
    sync_key: AtomicU16,
    sync_key_is_extended: AtomicBool,
    does_notify_command: AtomicBool,
    hwnd_task_tray: AtomicU32,
    correct_kana_lock_handling: AtomicBool,
    mouse_hook_type: AtomicU8,
    mouse_hook_param: AtomicI32,
    hwnd_mouse_hook_target: AtomicU32,
    mouse_pos_x: AtomicI32,
    mouse_pos_y: AtomicI32,
}

static HOOK_DATA: HookData = HookData::new();

/// The process-wide instance.
pub fn hook_data() -> &'static HookData {
    &HOOK_DATA
}

impl HookData {
    /// A zeroed record. Use [`hook_data`] for the shared instance.
    pub const fn new() -> Self {
        Self {
            sync_key: AtomicU16::new(0),
            sync_key_is_extended: AtomicBool::new(false),
            does_notify_command: AtomicBool::new(false),
            hwnd_task_tray: AtomicU32::new(0),
            correct_kana_lock_handling: AtomicBool::new(false),
            mouse_hook_type: AtomicU8::new(MouseHookType::NONE),
            mouse_hook_param: AtomicI32::new(0),
            hwnd_mouse_hook_target: AtomicU32::new(0),
            mouse_pos_x: AtomicI32::new(0),
            mouse_pos_y: AtomicI32::new(0),
        }
    }

    pub fn sync_key(&self) -> (u16, bool) {
        (
            self.sync_key.load(Ordering::Relaxed),
            self.sync_key_is_extended.load(Ordering::Relaxed),
        )
    }

    /// Stores the key code and the extended flag as two separate writes.
    pub fn set_sync_key(&self, key: u16, is_extended: bool) {
        self.sync_key.store(key, Ordering::Relaxed);
        self.sync_key_is_extended.store(is_extended, Ordering::Relaxed);
    }

    pub fn does_notify_command(&self) -> bool {
        self.does_notify_command.load(Ordering::Relaxed)
    }

    pub fn set_does_notify_command(&self, enabled: bool) {
        self.does_notify_command.store(enabled, Ordering::Relaxed);
    }

    pub fn hwnd_task_tray(&self) -> Hwnd32 {
        Hwnd32(self.hwnd_task_tray.load(Ordering::Relaxed))
    }

    pub fn set_hwnd_task_tray(&self, hwnd: Hwnd32) {
        self.hwnd_task_tray.store(hwnd.0, Ordering::Relaxed);
    }

    pub fn correct_kana_lock_handling(&self) -> bool {
        self.correct_kana_lock_handling.load(Ordering::Relaxed)
    }

    pub fn set_correct_kana_lock_handling(&self, enabled: bool) {
        self.correct_kana_lock_handling.store(enabled, Ordering::Relaxed);
    }

    pub fn mouse_hook(&self) -> (MouseHookType, i32) {
        (
            MouseHookType(self.mouse_hook_type.load(Ordering::Relaxed)),
            self.mouse_hook_param.load(Ordering::Relaxed),
        )
    }

    pub fn set_mouse_hook(&self, kind: MouseHookType, param: i32) {
        self.mouse_hook_type.store(kind.0, Ordering::Relaxed);
        self.mouse_hook_param.store(param, Ordering::Relaxed);
    }

    pub fn hwnd_mouse_hook_target(&self) -> Hwnd32 {
        Hwnd32(self.hwnd_mouse_hook_target.load(Ordering::Relaxed))
    }

    pub fn set_hwnd_mouse_hook_target(&self, hwnd: Hwnd32) {
        self.hwnd_mouse_hook_target.store(hwnd.0, Ordering::Relaxed);
    }

    pub fn mouse_pos(&self) -> Point {
        Point {
            x: self.mouse_pos_x.load(Ordering::Relaxed),
            y: self.mouse_pos_y.load(Ordering::Relaxed),
        }
    }

    pub fn set_mouse_pos(&self, pos: Point) {
        self.mouse_pos_x.store(pos.x, Ordering::Relaxed);
        self.mouse_pos_y.store(pos.y, Ordering::Relaxed);
    }
}

impl Default for HookData {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fields_update_independently() {
        // Arrange
        let data = HookData::new();

        // Act
        data.set_sync_key(0x1D, true);
        data.set_hwnd_task_tray(Hwnd32(0x0001_0203));
        data.set_mouse_hook(MouseHookType(MouseHookType::WHEEL), 3);

        // Assert
        assert_eq!(data.sync_key(), (0x1D, true));
        assert_eq!(data.hwnd_task_tray(), Hwnd32(0x0001_0203));
        let (kind, param) = data.mouse_hook();
        assert!(kind.wheel());
        assert!(!kind.window_move());
        assert_eq!(param, 3);
        assert_eq!(data.hwnd_mouse_hook_target(), Hwnd32::NULL);
        assert!(!data.does_notify_command());
    }

    #[test]
    fn test_shared_instance_is_process_wide() {
        hook_data().set_correct_kana_lock_handling(true);
        assert!(hook_data().correct_kana_lock_handling());
        hook_data().set_correct_kana_lock_handling(false);
    }

    #[test]
    fn test_readers_never_see_torn_single_field() {
        let data = Arc::new(HookData::new());
        let writer = {
            let data = Arc::clone(&data);
            thread::spawn(move || {
                for i in 0..10_000 {
                    let v = if i % 2 == 0 { -1 } else { 1 };
                    data.set_mouse_pos(Point { x: v, y: v });
                }
            })
        };

        for _ in 0..10_000 {
            let pos = data.mouse_pos();
            assert!(matches!(pos.x, -1 | 0 | 1));
            assert!(matches!(pos.y, -1 | 0 | 1));
        }
        writer.join().unwrap();
    }
}
