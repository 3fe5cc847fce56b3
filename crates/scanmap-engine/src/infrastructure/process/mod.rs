//! Cross-process memory and remote threads behind the [`RemoteInjector`].
//!
//! The Windows adapter uses `VirtualAllocEx`, `WriteProcessMemory` and
//! `CreateRemoteThread`. [`mock::MockProcessMemory`] simulates target
//! processes on a virtual clock so timeouts can be tested without sleeping.
//!
//! [`RemoteInjector`]: crate::application::remote_injector::RemoteInjector

pub use crate::application::remote_injector::{ProcessMemory, ThreadWait};

pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;
