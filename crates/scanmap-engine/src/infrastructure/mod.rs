//! Infrastructure layer of the scanmap engine.
//!
//! Contains the OS-facing adapters behind the application traits. Each seam
//! has an always-compiled test double and, on Windows, the real adapter.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `scanmap_core`, but MUST NOT be imported by the `application` layer outside
//! of its tests.

pub mod process;
pub mod registry;
pub mod session;
pub mod storage;
pub mod threads;
pub mod window;
