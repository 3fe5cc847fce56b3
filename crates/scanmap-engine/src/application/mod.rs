//! Application layer of the scanmap engine.
//!
//! # What is the "application" layer? (for beginners)
//!
//! This layer holds the engine's coordination logic. It talks to the OS only
//! through traits (`Registry`, `SessionPlatform`, `ProcessMemory`,
//! `ThreadPlatform`, `MessageTarget`), so every use case here runs unchanged
//! against the mocks in `infrastructure`.
//!
//! # Sub-modules
//!
//! - **`injection_coordinator`** – Applies and restores the scancode map and
//!   makes the session pick it up without a logoff.
//! - **`remote_injector`** – Runs a routine in another process and reclaims
//!   what it allocated once the routine has finished.
//! - **`thread_watcher`** – Reports when hooked worker threads exit.
//! - **`thread_relay`** – Turns watcher callbacks into notify records.
//! - **`notification_channel`** – Buffered text relay from any thread to the
//!   engine window.
//! - **`sync`** – The scope-bound lock abstraction the channel implements.
//! - **`message_target`** – The one way the core posts to a window.

pub mod injection_coordinator;
pub mod message_target;
pub mod notification_channel;
pub mod remote_injector;
pub mod sync;
pub mod thread_relay;
pub mod thread_watcher;
