//! Delivery of posted messages to the engine's message loop.
//!
//! The core only ever posts `(message_id, wParam, lParam)` through
//! [`MessageTarget`]. On Windows the target is a thread with its own message
//! queue ([`windows::MessagePump`]); tests record posts with
//! [`mock::MockWindow`].

pub use crate::application::message_target::MessageTarget;

pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;
