//! Error types for devpub-core.

use thiserror::Error;

/// All errors that can arise while encoding or decoding a wire record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// A field does not fit its fixed slot (the terminator needs one byte).
    #[error("{field} is {len} bytes, record slot holds at most {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// A field contains a NUL byte and would be cut short by clients.
    #[error("{field} contains an interior NUL byte")]
    InteriorNul { field: &'static str },

    /// A received record does not have the fixed record length.
    #[error("record is {len} bytes, expected {expected}")]
    BadLength { len: usize, expected: usize },

    /// A received field has no terminator inside its slot.
    #[error("{field} is not NUL-terminated")]
    Unterminated { field: &'static str },

    /// A received field is not valid UTF-8.
    #[error("{field} is not valid UTF-8")]
    NotUtf8 { field: &'static str },
}
