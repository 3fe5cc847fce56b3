//! Names of the interprocess surfaces owned by the hook collaborator.
//!
//! Only the names live here; the pipe and mailslot protocols are defined by
//! the hook side. Every name is scoped to the product namespace and carries
//! the crate version so two installed versions never share a channel.

/// Namespace prefix shared by all named objects.
pub const NAMESPACE: &str = "Scanmap\\scanmap";

/// Duplex pipe used to deliver commands to the engine.
pub const HOOK_PIPE_NAME: &str = concat!(
    "\\\\.\\pipe\\Scanmap\\scanmap\\{4B22D464-7A4E-494B-982A-C2B2BBAAF9F3}",
    env!("CARGO_PKG_VERSION")
);

/// Broadcast slot for fire-and-forget notify records.
pub const NOTIFY_MAILSLOT_NAME: &str = concat!(
    "\\\\.\\mailslot\\Scanmap\\scanmap\\{330F7914-EB5B-49BE-ACCE-D2B8DF585B32}",
    env!("CARGO_PKG_VERSION")
);

/// Name registered with the window-message registry to obtain a message id.
pub const ENGINE_MESSAGE_NAME: &str = "Scanmap\\scanmap\\WM_SCANMAP_MESSAGE";

/// `wParam` values carried by the registered engine message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EngineMessage {
    NotifyName = 0,
    FuncRecenter = 1,
    FuncSetImeStatus = 2,
    FuncSetImeString = 3,
}

impl TryFrom<u32> for EngineMessage {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            0 => Ok(EngineMessage::NotifyName),
            1 => Ok(EngineMessage::FuncRecenter),
            2 => Ok(EngineMessage::FuncSetImeStatus),
            3 => Ok(EngineMessage::FuncSetImeString),
            _ => Err(()),
        }
    }
}
