//! Session discovery, privileges and the routine injected into the session
//! process.
//!
//! [`mock::MockSession`] stands in for the OS in tests. On Windows,
//! [`windows::WindowsSession`] finds winlogon, enables `SeDebugPrivilege` and
//! resolves the parameter block; [`remote`] holds the routine itself.

pub use crate::application::injection_coordinator::{PrivilegeError, SessionPlatform};

pub mod mock;

#[cfg(target_os = "windows")]
pub mod remote;
#[cfg(target_os = "windows")]
pub mod windows;
