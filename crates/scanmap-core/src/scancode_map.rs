//! The binary `Scancode Map` table understood by the OS keyboard driver.
//!
//! Layout (all little-endian, as stored in the registry value):
//!
//! ```text
//! [header1:4][header2:4][count:4][entry:4] * count
//! entry = (original_scancode << 16) | replacement_scancode
//! ```
//!
//! `count` includes the terminating all-zero entry. Extended scancodes carry
//! their `0xE0` prefix in the high byte of the 16-bit code (e.g. `0xE05B`).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Size of the three fixed header words.
pub const SCANCODE_MAP_HEADER_SIZE: usize = 12;

/// Size of one packed entry.
pub const SCANCODE_MAP_ENTRY_SIZE: usize = 4;

/// Errors raised while decoding a raw scancode map.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScancodeMapError {
    #[error("scancode map too short: need at least {needed} bytes, got {available}")]
    TooShort { needed: usize, available: usize },

    #[error("scancode map body of {0} bytes is not a whole number of entries")]
    RaggedBody(usize),

    #[error("scancode map declares {declared} entries but carries {actual}")]
    CountMismatch { declared: u32, actual: usize },
}

/// One (original → replacement) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScancodeEntry {
    pub original: u16,
    pub replacement: u16,
}

impl ScancodeEntry {
    /// The all-zero terminator.
    pub const SENTINEL: ScancodeEntry = ScancodeEntry {
        original: 0,
        replacement: 0,
    };

    pub const fn new(original: u16, replacement: u16) -> Self {
        Self {
            original,
            replacement,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }

    fn to_word(self) -> u32 {
        (u32::from(self.original) << 16) | u32::from(self.replacement)
    }

    fn from_word(word: u32) -> Self {
        Self {
            original: (word >> 16) as u16,
            replacement: (word & 0xFFFF) as u16,
        }
    }
}

/// An immutable scancode map table.
///
/// Entries are kept exactly as decoded (including the sentinel and any
/// entries after it) so that [`ScancodeMap::to_bytes`] reproduces the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScancodeMap {
    header1: u32,
    header2: u32,
    entries: Vec<ScancodeEntry>,
}

impl ScancodeMap {
    /// Builds a table from mappings, appending the zero sentinel.
    pub fn from_mappings<I>(mappings: I) -> Self
    where
        I: IntoIterator<Item = ScancodeEntry>,
    {
        let mut entries: Vec<ScancodeEntry> = mappings
            .into_iter()
            .filter(|e| !e.is_sentinel())
            .collect();
        entries.push(ScancodeEntry::SENTINEL);
        Self {
            header1: 0,
            header2: 0,
            entries,
        }
    }

    /// A table containing only the sentinel.
    pub fn empty() -> Self {
        Self::from_mappings(std::iter::empty())
    }

    /// Decodes a raw registry blob.
    ///
    /// # Errors
    ///
    /// Returns [`ScancodeMapError`] when the blob is shorter than the header,
    /// has a partial trailing entry, or its count does not match its length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ScancodeMapError> {
        if bytes.len() < SCANCODE_MAP_HEADER_SIZE {
            return Err(ScancodeMapError::TooShort {
                needed: SCANCODE_MAP_HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let body = bytes.len() - SCANCODE_MAP_HEADER_SIZE;
        if body % SCANCODE_MAP_ENTRY_SIZE != 0 {
            return Err(ScancodeMapError::RaggedBody(body));
        }

        let header1 = read_u32(bytes, 0);
        let header2 = read_u32(bytes, 4);
        let count = read_u32(bytes, 8);
        let actual = body / SCANCODE_MAP_ENTRY_SIZE;
        if count as usize != actual {
            return Err(ScancodeMapError::CountMismatch {
                declared: count,
                actual,
            });
        }

        let entries = bytes[SCANCODE_MAP_HEADER_SIZE..]
            .chunks_exact(SCANCODE_MAP_ENTRY_SIZE)
            .map(|c| ScancodeEntry::from_word(u32::from_le_bytes([c[0], c[1], c[2], c[3]])))
            .collect();

        Ok(Self {
            header1,
            header2,
            entries,
        })
    }

    /// Encodes the table into its registry representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.byte_len());
        buf.extend_from_slice(&self.header1.to_le_bytes());
        buf.extend_from_slice(&self.header2.to_le_bytes());
        buf.extend_from_slice(&self.entry_count().to_le_bytes());
        for entry in &self.entries {
            buf.extend_from_slice(&entry.to_word().to_le_bytes());
        }
        buf
    }

    /// Number of entries as written in the header, sentinel included.
    pub fn entry_count(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Encoded size in bytes.
    pub fn byte_len(&self) -> usize {
        SCANCODE_MAP_HEADER_SIZE + self.entries.len() * SCANCODE_MAP_ENTRY_SIZE
    }

    /// All raw entries, sentinel included.
    pub fn entries(&self) -> &[ScancodeEntry] {
        &self.entries
    }

    /// The effective mappings: everything before the first sentinel.
    pub fn mappings(&self) -> impl Iterator<Item = ScancodeEntry> + '_ {
        self.entries.iter().copied().take_while(|e| !e.is_sentinel())
    }

    /// Returns a new table with `fix` layered over the current mappings.
    ///
    /// Each original scancode keeps only its last mapping, with `fix` counted
    /// after the current mappings. Survivors keep their relative order, so
    /// the fix entries follow whatever existing mappings they did not replace.
    pub fn merged_with(&self, fix: &[ScancodeEntry]) -> ScancodeMap {
        let combined: Vec<ScancodeEntry> = self.mappings().chain(fix.iter().copied()).collect();
        let survivors = combined
            .iter()
            .enumerate()
            .filter(|&(i, e)| !combined[i + 1..].iter().any(|later| later.original == e.original))
            .map(|(_, e)| *e);
        let mut merged = ScancodeMap::from_mappings(survivors);
        debug!(
            before = self.entry_count(),
            after = merged.entry_count(),
            fix = fix.len(),
            "merged fix entries into scancode map"
        );
        merged.header1 = self.header1;
        merged.header2 = self.header2;
        merged
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
