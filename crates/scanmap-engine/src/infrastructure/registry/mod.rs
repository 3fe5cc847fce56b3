//! Binary registry values behind the [`Registry`] trait.
//!
//! [`memory::MemoryRegistry`] keeps values in a shared map and is used by the
//! integration tests; [`windows::WindowsRegistry`] talks to a real hive.

pub use crate::application::injection_coordinator::Registry;

pub mod memory;

#[cfg(target_os = "windows")]
pub mod windows;
