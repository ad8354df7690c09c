//! Error types for record decoding

use thiserror::Error;

/// Errors that can occur when decoding a recording
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedRecord {
    /// Input ended before a field could be read
    #[error("Truncated record: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// A declared payload length is negative
    #[error("Negative length field: {0}")]
    NegativeLength(i32),

    /// A declared payload length exceeds the bytes left in the input
    #[error("Length overrun: {field} declares {declared} bytes, {remaining} remaining")]
    LengthOverrun {
        field: &'static str,
        declared: usize,
        remaining: usize,
    },

    /// Modality tag not recognized
    #[error("Unknown modality tag: {0:#X}")]
    UnknownTag(i32),

    /// Skeleton payload could not be deserialized into bodies
    #[error("Skeleton payload: {0}")]
    Skeleton(String),
}

impl From<bincode::Error> for MalformedRecord {
    fn from(e: bincode::Error) -> Self {
        MalformedRecord::Skeleton(e.to_string())
    }
}
