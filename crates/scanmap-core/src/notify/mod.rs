//! Notify records: the tagged events hook contexts send to the engine.

pub mod codec;
pub mod records;

pub use codec::{decode_record, encode_record, NotifyCodecError};
pub use records::*;
