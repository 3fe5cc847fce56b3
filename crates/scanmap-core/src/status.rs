//! Flat numeric status taxonomy shared by every fallible coordination call.
//!
//! The numbers are stable: the UI layer receives them as the `wParam` of the
//! configured failure message and renders its own diagnostics from them.
//!
//! | Range       | Category                                    |
//! |-------------|---------------------------------------------|
//! | 0           | success                                     |
//! | 1001, 1004–1018 | identity / privilege / access control   |
//! | 1002–1003   | resources (buffer, memory)                  |
//! | 1019        | opening the session process                 |
//! | 1020–1022   | remote allocation, write, thread creation   |
//! | 1023–1024   | injection timing (not failures)             |
//! | 1025–1026   | registry I/O on the scancode map            |
//! | 1027        | session process discovery                   |
//! | 1028–1029   | remote routine failure, lost remote thread  |

use std::fmt;

use serde::{Deserialize, Serialize};

/// One status value of the coordination taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum StatusCode {
    Success = 0,
    GetUserName = 1001,
    InsufficientBuffer = 1002,
    NoMemory = 1003,
    GetLogonUserName = 1004,
    GetSecurityInfo = 1005,
    GetDacl = 1006,
    InitializeAcl = 1007,
    GetAce = 1008,
    AddAce = 1009,
    AddAllowedAce = 1010,
    SetSecurityInfo = 1011,
    OpenEngineProcess = 1012,
    OpenEngineToken = 1013,
    Impersonate = 1014,
    RevertToSelf = 1015,
    OpenCurrentProcess = 1016,
    LookupPrivilege = 1017,
    AdjustPrivilege = 1018,
    OpenSessionProcess = 1019,
    RemoteAllocate = 1020,
    RemoteWrite = 1021,
    CreateRemoteThread = 1022,
    /// The remote thread did not finish in time; it may still succeed.
    InjectionTimeout = 1023,
    /// A previously timed-out injection was later observed to complete.
    InjectionRecovered = 1024,
    ReadScancodeMap = 1025,
    WriteScancodeMap = 1026,
    GetSessionPid = 1027,
    /// The remote routine ran but reported a failure of its own.
    RemoteRoutineFailed = 1028,
    /// The remote thread could not be waited on; its fate is unknown.
    WaitRemoteThread = 1029,
}

/// Coarse grouping used to decide how a caller reacts to a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    Success,
    /// Cannot determine the user, open/adjust a token, or impersonate.
    Identity,
    /// Out of memory, short buffer, or a remote step that failed.
    Resource,
    /// The session process cannot be found or opened.
    Discovery,
    /// Timeout or late completion of an injection. Never fatal.
    Timing,
    /// Scancode map read/write.
    Registry,
}

impl StatusCode {
    /// Every defined code, in numeric order.
    pub const ALL: [StatusCode; 30] = [
        StatusCode::Success,
        StatusCode::GetUserName,
        StatusCode::InsufficientBuffer,
        StatusCode::NoMemory,
        StatusCode::GetLogonUserName,
        StatusCode::GetSecurityInfo,
        StatusCode::GetDacl,
        StatusCode::InitializeAcl,
        StatusCode::GetAce,
        StatusCode::AddAce,
        StatusCode::AddAllowedAce,
        StatusCode::SetSecurityInfo,
        StatusCode::OpenEngineProcess,
        StatusCode::OpenEngineToken,
        StatusCode::Impersonate,
        StatusCode::RevertToSelf,
        StatusCode::OpenCurrentProcess,
        StatusCode::LookupPrivilege,
        StatusCode::AdjustPrivilege,
        StatusCode::OpenSessionProcess,
        StatusCode::RemoteAllocate,
        StatusCode::RemoteWrite,
        StatusCode::CreateRemoteThread,
        StatusCode::InjectionTimeout,
        StatusCode::InjectionRecovered,
        StatusCode::ReadScancodeMap,
        StatusCode::WriteScancodeMap,
        StatusCode::GetSessionPid,
        StatusCode::RemoteRoutineFailed,
        StatusCode::WaitRemoteThread,
    ];

    /// Numeric value as posted to the owner window.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn category(self) -> StatusCategory {
        use StatusCode::*;
        match self {
            Success => StatusCategory::Success,
            InsufficientBuffer | NoMemory | RemoteAllocate | RemoteWrite | CreateRemoteThread
            | RemoteRoutineFailed | WaitRemoteThread => StatusCategory::Resource,
            OpenSessionProcess | GetSessionPid => StatusCategory::Discovery,
            InjectionTimeout | InjectionRecovered => StatusCategory::Timing,
            ReadScancodeMap | WriteScancodeMap => StatusCategory::Registry,
            GetUserName | GetLogonUserName | GetSecurityInfo | GetDacl | InitializeAcl
            | GetAce | AddAce | AddAllowedAce | SetSecurityInfo | OpenEngineProcess
            | OpenEngineToken | Impersonate | RevertToSelf | OpenCurrentProcess
            | LookupPrivilege | AdjustPrivilege => StatusCategory::Identity,
        }
    }

    /// `true` for codes that end the current call. Timing codes are not fatal.
    pub fn is_fatal(self) -> bool {
        !matches!(
            self.category(),
            StatusCategory::Success | StatusCategory::Timing
        )
    }
}

impl TryFrom<u32> for StatusCode {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        StatusCode::ALL
            .iter()
            .copied()
            .find(|code| code.as_u32() == value)
            .ok_or(())
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.as_u32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_roundtrip_through_u32() {
        for code in StatusCode::ALL {
            assert_eq!(StatusCode::try_from(code.as_u32()), Ok(code));
        }
    }

    #[test]
    fn test_unknown_status_value_is_rejected() {
        assert!(StatusCode::try_from(999).is_err());
        assert!(StatusCode::try_from(1030).is_err());
    }

    #[test]
    fn test_timing_codes_are_not_fatal() {
        assert!(!StatusCode::InjectionTimeout.is_fatal());
        assert!(!StatusCode::InjectionRecovered.is_fatal());
        assert!(!StatusCode::Success.is_fatal());
    }

    #[test]
    fn test_privilege_and_registry_codes_are_fatal() {
        assert_eq!(StatusCode::Impersonate.category(), StatusCategory::Identity);
        assert!(StatusCode::AdjustPrivilege.is_fatal());
        assert_eq!(StatusCode::WriteScancodeMap.category(), StatusCategory::Registry);
        assert!(StatusCode::WriteScancodeMap.is_fatal());
        assert_eq!(StatusCode::GetSessionPid.category(), StatusCategory::Discovery);
    }

    #[test]
    fn test_remote_failures_are_distinct_from_thread_creation() {
        assert_eq!(StatusCode::try_from(1028), Ok(StatusCode::RemoteRoutineFailed));
        assert_eq!(StatusCode::try_from(1029), Ok(StatusCode::WaitRemoteThread));
        assert_ne!(StatusCode::RemoteRoutineFailed, StatusCode::CreateRemoteThread);
        assert!(StatusCode::RemoteRoutineFailed.is_fatal());
    }

    #[test]
    fn test_display_includes_numeric_value() {
        assert_eq!(StatusCode::InjectionTimeout.to_string(), "InjectionTimeout (1023)");
    }
}
