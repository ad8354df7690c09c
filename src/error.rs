//! Error types for capture and replay sessions

use std::io;

use kinlog_core::{MalformedRecord, Modalities, Modality};
use thiserror::Error;

/// Errors surfaced by capture and replay operations
#[derive(Error, Debug)]
pub enum Error {
    /// Operation attempted after close/dispose or before required setup
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// Record call for a stream that was not enabled when the session opened
    #[error("{0} recording is not enabled on this session")]
    UnsupportedModality(Modality),

    /// Playback start requested while playback is running
    #[error("Replay already started")]
    AlreadyStarted,

    /// Composite replay needs color, depth and skeleton streams
    #[error("Recording does not contain all streams (mask {:#05b})", .0.bits())]
    IncompleteRecording(Modalities),

    /// Recording could not be decoded
    #[error("Malformed record at byte {offset}: {source}")]
    MalformedRecord {
        offset: usize,
        #[source]
        source: MalformedRecord,
    },

    /// Sink or source failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
