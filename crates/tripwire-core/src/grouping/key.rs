//! Grouping keys
//!
//! Two fingerprints are derived per exception: one from the type and the
//! first backtrace frame, one from the type and the message. A later
//! exception matching either is counted as the same group.

use std::fmt;

use crate::models::ExceptionRecord;

/// Prefix shared by every counter key
pub const KEY_PREFIX: &str = "exception";

/// CRC-32 (IEEE), zlib-compatible
pub(crate) fn crc32(data: &[u8]) -> u32 {
    zlib_rs::crc32::crc32(0, data)
}

/// A fingerprint stored as `exception:<crc32>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupingKey(u32);

impl GroupingKey {
    /// Fingerprint from the type name and first backtrace frame
    ///
    /// A missing or empty backtrace hashes as an empty frame.
    pub fn from_backtrace(exception: &ExceptionRecord) -> Self {
        let input = format!("{}\npath:{}", exception.type_name, exception.first_frame());
        Self(crc32(input.as_bytes()))
    }

    /// Fingerprint from the type name and message
    pub fn from_message(exception: &ExceptionRecord) -> Self {
        let input = format!("{}\nmessage:{}", exception.type_name, exception.message);
        Self(crc32(input.as_bytes()))
    }

    /// The raw checksum
    pub fn checksum(self) -> u32 {
        self.0
    }

    /// The store key
    pub fn to_key(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GroupingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{KEY_PREFIX}:{}", self.0)
    }
}

/// Both fingerprints for one exception
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupingKeys {
    /// Type name and first backtrace frame
    pub backtrace: GroupingKey,
    /// Type name and message
    pub message: GroupingKey,
}

impl GroupingKeys {
    /// Derive both fingerprints; pure and deterministic
    pub fn for_exception(exception: &ExceptionRecord) -> Self {
        Self {
            backtrace: GroupingKey::from_backtrace(exception),
            message: GroupingKey::from_message(exception),
        }
    }
}
