//! A message-only thread standing in for the engine window.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "windows")]

use std::io;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use scanmap_core::ipc::{EngineMessage, ENGINE_MESSAGE_NAME};
use scanmap_core::StatusCode;
use tracing::{debug, error, info, warn};
use windows::core::PCWSTR;
use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    GetMessageW, PeekMessageW, PostThreadMessageW, RegisterWindowMessageW, MSG, PM_NOREMOVE,
    WM_QUIT, WM_USER,
};

use super::MessageTarget;
use crate::application::notification_channel::NotificationChannel;

/// Posts to one thread's message queue.
#[derive(Debug, Clone, Copy)]
pub struct ThreadTarget {
    thread_id: u32,
}

impl MessageTarget for ThreadTarget {
    fn post_message(&self, message_id: u32, wparam: usize, lparam: isize) -> io::Result<()> {
        // SAFETY: Posting to a thread queue passes plain integers; the target
        // thread may already be gone, which is reported as an error.
        unsafe {
            PostThreadMessageW(self.thread_id, message_id, WPARAM(wparam), LPARAM(lparam))
        }
        .map_err(|_| io::Error::last_os_error())
    }
}

/// Obtains the id of the registered engine message.
///
/// # Errors
///
/// Returns the OS error when registration fails.
pub fn register_engine_message() -> io::Result<u32> {
    let name: Vec<u16> = ENGINE_MESSAGE_NAME
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();
    // SAFETY: `name` is NUL-terminated and outlives the call.
    let id = unsafe { RegisterWindowMessageW(PCWSTR(name.as_ptr())) };
    if id == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(id)
}

/// Message loop thread that drains the notification channel and logs
/// failure reports.
pub struct MessagePump {
    thread_id: u32,
    worker: Option<JoinHandle<()>>,
}

impl MessagePump {
    /// Starts the thread and waits until its queue exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine message cannot be registered or the
    /// thread cannot be started.
    pub fn spawn(channel: Arc<NotificationChannel>, failure_message_id: u32) -> io::Result<Self> {
        let engine_message_id = register_engine_message()?;
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("scanmap-message-pump".to_string())
            .spawn(move || {
                let mut msg = MSG::default();
                // SAFETY: The first peek creates this thread's message queue so
                // posts made right after `spawn` returns are not lost.
                unsafe {
                    let _ = PeekMessageW(&mut msg, HWND::default(), WM_USER, WM_USER, PM_NOREMOVE);
                }
                // SAFETY: No preconditions.
                let thread_id = unsafe { GetCurrentThreadId() };
                if ready_tx.send(thread_id).is_err() {
                    return;
                }
                run_loop(&channel, failure_message_id, engine_message_id);
            })?;

        let thread_id = ready_rx
            .recv()
            .map_err(|_| io::Error::other("message pump exited before it was ready"))?;
        debug!(thread_id, engine_message_id, "message pump started");
        Ok(Self {
            thread_id,
            worker: Some(worker),
        })
    }

    pub fn target(&self) -> Arc<dyn MessageTarget> {
        Arc::new(ThreadTarget {
            thread_id: self.thread_id,
        })
    }

    /// Ends the loop and joins the thread. Later calls do nothing.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let target = ThreadTarget {
            thread_id: self.thread_id,
        };
        if let Err(e) = target.post_message(WM_QUIT, 0, 0) {
            warn!("cannot stop message pump: {e}");
            return;
        }
        if worker.join().is_err() {
            warn!("message pump panicked");
        }
    }
}

impl Drop for MessagePump {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(channel: &NotificationChannel, failure_message_id: u32, engine_message_id: u32) {
    let mut msg = MSG::default();
    loop {
        // SAFETY: `msg` is a valid out-pointer for the duration of the call.
        let ret = unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) };
        match ret.0 {
            0 => break,
            -1 => {
                error!("GetMessageW failed: {}", io::Error::last_os_error());
                break;
            }
            _ => {}
        }

        if msg.message == channel.message_id() {
            let text = channel.take_string();
            for line in text.lines().filter(|l| !l.is_empty()) {
                info!(target: "scanmap::notify", "{line}");
            }
        } else if msg.message == failure_message_id {
            match u32::try_from(msg.wParam.0).ok().and_then(|v| StatusCode::try_from(v).ok()) {
                Some(code) => error!(%code, "escape failure reported"),
                None => error!(wparam = msg.wParam.0, "unknown failure code reported"),
            }
        } else if msg.message == engine_message_id {
            let kind = u32::try_from(msg.wParam.0)
                .ok()
                .and_then(|v| EngineMessage::try_from(v).ok());
            debug!(?kind, lparam = msg.lParam.0, "engine message received");
        }
    }
    // Drain whatever arrived after the last notification.
    let text = channel.take_string();
    for line in text.lines().filter(|l| !l.is_empty()) {
        info!(target: "scanmap::notify", "{line}");
    }
    debug!("message pump exiting");
}
