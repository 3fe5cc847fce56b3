//! Fixed-width binary codec for [`NotifyRecord`]s.
//!
//! Wire format:
//! ```text
//! [type:4][debug_param:4][payload:N][zero padding up to NOTIFY_MESSAGE_SIZE]
//! ```
//! All integers are little-endian. Text fields are UTF-16LE buffers of
//! `MAX_PATH_CHARS` units, NUL-terminated; longer text is truncated on a
//! character boundary. Booleans are one byte (0 or 1).
//!
//! Fields are written one by one with explicit widths; the in-memory layout of
//! the Rust types never reaches the wire, so producers and consumers of
//! different bitness agree on every offset.

use thiserror::Error;

use crate::hwnd::Hwnd32;
use crate::notify::records::{
    payload_size, Command32, Command64, FocusInfo, LockState, NotifyPayload, NotifyRecord,
    NotifyType, ShowInfo, ShowState, MAX_PATH_CHARS, NOTIFY_HEADER_SIZE, NOTIFY_MESSAGE_SIZE,
    TEXT_FIELD_SIZE,
};

/// Errors that can occur while decoding a record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotifyCodecError {
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("unknown notify type: {0}")]
    UnknownType(u32),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `record` into one fixed-size slot of [`NOTIFY_MESSAGE_SIZE`] bytes.
pub fn encode_record(record: &NotifyRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(NOTIFY_MESSAGE_SIZE);
    buf.extend_from_slice(&(record.notify_type() as u32).to_le_bytes());
    buf.extend_from_slice(&record.debug_param.to_le_bytes());

    match &record.payload {
        NotifyPayload::SetFocus(info) | NotifyPayload::Name(info) => encode_focus(&mut buf, info),
        NotifyPayload::LockState(state) => encode_lock_state(&mut buf, state),
        NotifyPayload::Sync => {}
        NotifyPayload::ThreadAttach { thread_id } | NotifyPayload::ThreadDetach { thread_id } => {
            buf.extend_from_slice(&thread_id.to_le_bytes())
        }
        NotifyPayload::Command64(c) => {
            buf.extend_from_slice(&c.hwnd.0.to_le_bytes());
            buf.extend_from_slice(&c.message.to_le_bytes());
            buf.extend_from_slice(&c.wparam.to_le_bytes());
            buf.extend_from_slice(&c.lparam.to_le_bytes());
        }
        NotifyPayload::Command32(c) => {
            buf.extend_from_slice(&c.hwnd.0.to_le_bytes());
            buf.extend_from_slice(&c.message.to_le_bytes());
            buf.extend_from_slice(&c.wparam.to_le_bytes());
            buf.extend_from_slice(&c.lparam.to_le_bytes());
        }
        NotifyPayload::Show(s) => {
            buf.extend_from_slice(&(s.show as u32).to_le_bytes());
            buf.push(u8::from(s.is_mdi));
        }
        NotifyPayload::Log(msg) => write_text(&mut buf, msg),
    }

    debug_assert_eq!(buf.len(), record.wire_size());
    buf.resize(NOTIFY_MESSAGE_SIZE, 0);
    buf
}

/// Decodes one record from the start of `bytes`.
///
/// Accepts both a full slot and a buffer trimmed to the variant's wire size.
///
/// # Errors
///
/// Returns [`NotifyCodecError`] if the header or payload is truncated, the
/// type tag is unknown, or a field holds an out-of-range value.
pub fn decode_record(bytes: &[u8]) -> Result<NotifyRecord, NotifyCodecError> {
    require_len(bytes, NOTIFY_HEADER_SIZE)?;
    let tag = read_u32(bytes, 0);
    let notify_type = NotifyType::try_from(tag).map_err(|_| NotifyCodecError::UnknownType(tag))?;
    let debug_param = read_u32(bytes, 4);

    require_len(bytes, NOTIFY_HEADER_SIZE + payload_size(notify_type))?;
    let p = &bytes[NOTIFY_HEADER_SIZE..];

    let payload = match notify_type {
        NotifyType::SetFocus => NotifyPayload::SetFocus(decode_focus(p)?),
        NotifyType::Name => NotifyPayload::Name(decode_focus(p)?),
        NotifyType::LockState => NotifyPayload::LockState(decode_lock_state(p)?),
        NotifyType::Sync => NotifyPayload::Sync,
        NotifyType::ThreadAttach => NotifyPayload::ThreadAttach {
            thread_id: read_u32(p, 0),
        },
        NotifyType::ThreadDetach => NotifyPayload::ThreadDetach {
            thread_id: read_u32(p, 0),
        },
        NotifyType::Command64 => NotifyPayload::Command64(Command64 {
            hwnd: Hwnd32(read_u32(p, 0)),
            message: read_u32(p, 4),
            wparam: read_u64(p, 8),
            lparam: read_u64(p, 16) as i64,
        }),
        NotifyType::Command32 => NotifyPayload::Command32(Command32 {
            hwnd: Hwnd32(read_u32(p, 0)),
            message: read_u32(p, 4),
            wparam: read_u32(p, 8),
            lparam: read_u32(p, 12) as i32,
        }),
        NotifyType::Show => {
            let raw = read_u32(p, 0);
            let show = ShowState::try_from(raw).map_err(|_| {
                NotifyCodecError::MalformedPayload(format!("unknown show state: {raw}"))
            })?;
            NotifyPayload::Show(ShowInfo {
                show,
                is_mdi: read_bool(p, 4, "Show.is_mdi")?,
            })
        }
        NotifyType::Log => NotifyPayload::Log(read_text(p, 0)?),
    };

    Ok(NotifyRecord {
        debug_param,
        payload,
    })
}

// ── Per-variant helpers ───────────────────────────────────────────────────────

fn encode_focus(buf: &mut Vec<u8>, info: &FocusInfo) {
    buf.extend_from_slice(&info.thread_id.to_le_bytes());
    buf.extend_from_slice(&info.hwnd.0.to_le_bytes());
    write_text(buf, &info.class_name);
    write_text(buf, &info.title_name);
}

fn decode_focus(p: &[u8]) -> Result<FocusInfo, NotifyCodecError> {
    Ok(FocusInfo {
        thread_id: read_u32(p, 0),
        hwnd: Hwnd32(read_u32(p, 4)),
        class_name: read_text(p, 8)?,
        title_name: read_text(p, 8 + TEXT_FIELD_SIZE)?,
    })
}

fn encode_lock_state(buf: &mut Vec<u8>, s: &LockState) {
    for flag in [
        s.num_lock,
        s.caps_lock,
        s.scroll_lock,
        s.kana_lock,
        s.ime_lock,
        s.ime_comp,
    ] {
        buf.push(u8::from(flag));
    }
}

fn decode_lock_state(p: &[u8]) -> Result<LockState, NotifyCodecError> {
    Ok(LockState {
        num_lock: read_bool(p, 0, "LockState.num_lock")?,
        caps_lock: read_bool(p, 1, "LockState.caps_lock")?,
        scroll_lock: read_bool(p, 2, "LockState.scroll_lock")?,
        kana_lock: read_bool(p, 3, "LockState.kana_lock")?,
        ime_lock: read_bool(p, 4, "LockState.ime_lock")?,
        ime_comp: read_bool(p, 5, "LockState.ime_comp")?,
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize) -> Result<(), NotifyCodecError> {
    if buf.len() < needed {
        Err(NotifyCodecError::InsufficientData {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

// Callers check lengths up front with `require_len`.
fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

fn read_bool(buf: &[u8], offset: usize, context: &str) -> Result<bool, NotifyCodecError> {
    match buf[offset] {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(NotifyCodecError::MalformedPayload(format!(
            "{context}: invalid boolean byte {other}"
        ))),
    }
}

/// Writes `text` as a NUL-terminated UTF-16LE field of exactly
/// [`TEXT_FIELD_SIZE`] bytes, truncating without splitting a surrogate pair.
fn write_text(buf: &mut Vec<u8>, text: &str) {
    let mut units: Vec<u16> = text.encode_utf16().take(MAX_PATH_CHARS).collect();
    if units.len() > MAX_PATH_CHARS - 1 {
        units.truncate(MAX_PATH_CHARS - 1);
        if matches!(units.last(), Some(0xD800..=0xDBFF)) {
            units.pop();
        }
    }
    let start = buf.len();
    for unit in units {
        buf.extend_from_slice(&unit.to_le_bytes());
    }
    buf.resize(start + TEXT_FIELD_SIZE, 0);
}

fn read_text(buf: &[u8], offset: usize) -> Result<String, NotifyCodecError> {
    let units: Vec<u16> = buf[offset..offset + TEXT_FIELD_SIZE]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16(&units)
        .map_err(|e| NotifyCodecError::MalformedPayload(format!("invalid UTF-16 text: {e}")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(record: &NotifyRecord) -> NotifyRecord {
        let bytes = encode_record(record);
        assert_eq!(bytes.len(), NOTIFY_MESSAGE_SIZE);
        decode_record(&bytes).expect("decode must succeed")
    }

    #[test]
    fn test_focus_record_roundtrip() {
        let record = NotifyRecord {
            debug_param: 7,
            payload: NotifyPayload::SetFocus(FocusInfo {
                thread_id: 1234,
                hwnd: Hwnd32(0x0002_01A4),
                class_name: "Notepad".to_string(),
                title_name: "無題 - メモ帳".to_string(),
            }),
        };
        assert_eq!(roundtrip(&record), record);
    }

    #[test]
    fn test_header_layout_is_little_endian() {
        let record = NotifyRecord {
            debug_param: 0x0102_0304,
            payload: NotifyPayload::ThreadDetach { thread_id: 0xAABB },
        };

        let bytes = encode_record(&record);

        assert_eq!(&bytes[0..4], &5u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[8..12], &0xAABBu32.to_le_bytes());
        assert!(bytes[12..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_command64_keeps_full_width_params() {
        let record = NotifyRecord::new(NotifyPayload::Command64(Command64 {
            hwnd: Hwnd32(0x10),
            message: 0x0111,
            wparam: u64::MAX - 1,
            lparam: -5,
        }));
        assert_eq!(roundtrip(&record), record);
    }

    #[test]
    fn test_command32_roundtrip() {
        let record = NotifyRecord::new(NotifyPayload::Command32(Command32 {
            hwnd: Hwnd32(0x20),
            message: 0x0112,
            wparam: 0xF060,
            lparam: -1,
        }));
        assert_eq!(roundtrip(&record), record);
    }

    #[test]
    fn test_lock_state_and_show_roundtrip() {
        let lock = NotifyRecord::new(NotifyPayload::LockState(LockState {
            caps_lock: true,
            kana_lock: true,
            ..LockState::default()
        }));
        let show = NotifyRecord::new(NotifyPayload::Show(ShowInfo {
            show: ShowState::Maximized,
            is_mdi: true,
        }));
        assert_eq!(roundtrip(&lock), lock);
        assert_eq!(roundtrip(&show), show);
        assert_eq!(roundtrip(&NotifyRecord::new(NotifyPayload::Sync)).payload, NotifyPayload::Sync);
    }

    #[test]
    fn test_decode_accepts_compact_buffer() {
        let record = NotifyRecord::new(NotifyPayload::ThreadAttach { thread_id: 9 });
        let bytes = encode_record(&record);
        let decoded = decode_record(&bytes[..record.wire_size()]).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_long_log_text_is_truncated_to_field() {
        let long = "x".repeat(MAX_PATH_CHARS + 100);
        let record = NotifyRecord::new(NotifyPayload::Log(long));

        let decoded = roundtrip(&record);

        match decoded.payload {
            NotifyPayload::Log(text) => assert_eq!(text.len(), MAX_PATH_CHARS - 1),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_truncation_does_not_split_surrogate_pair() {
        // Each '😀' is a surrogate pair; MAX_PATH_CHARS - 1 is odd.
        let text = "😀".repeat(MAX_PATH_CHARS);
        let decoded = roundtrip(&NotifyRecord::new(NotifyPayload::Log(text)));
        match decoded.payload {
            NotifyPayload::Log(t) => {
                assert_eq!(t.chars().count(), (MAX_PATH_CHARS - 2) / 2);
                assert!(t.chars().all(|c| c == '😀'));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_short_header() {
        assert_eq!(
            decode_record(&[0u8; 4]),
            Err(NotifyCodecError::InsufficientData { needed: 8, available: 4 })
        );
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let mut bytes = encode_record(&NotifyRecord::new(NotifyPayload::Sync));
        bytes[0] = 42;
        assert_eq!(decode_record(&bytes), Err(NotifyCodecError::UnknownType(42)));
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        let bytes = encode_record(&NotifyRecord::new(NotifyPayload::Log("hi".into())));
        let result = decode_record(&bytes[..100]);
        assert!(matches!(result, Err(NotifyCodecError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_rejects_bad_boolean() {
        let mut bytes = encode_record(&NotifyRecord::new(NotifyPayload::LockState(
            LockState::default(),
        )));
        bytes[NOTIFY_HEADER_SIZE + 2] = 7;
        assert!(matches!(
            decode_record(&bytes),
            Err(NotifyCodecError::MalformedPayload(_))
        ));
    }
}
