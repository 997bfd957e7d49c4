//! Error type shared by the resource and song model.

use std::fmt;

use thiserror::Error;

use crate::song::Song;

/// Result alias for model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of resource looked up in a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Pcm,
    Instrument,
    Song,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Pcm => "pcm",
            ResourceKind::Instrument => "instrument",
            ResourceKind::Song => "song",
        })
    }
}

/// Errors raised by buffers, instruments and songs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("sample buffer must not be empty")]
    EmptyBuffer,

    #[error("loop region {start}..{end} is invalid for a buffer of {len} samples")]
    InvalidLoop { start: usize, end: usize, len: usize },

    #[error("tempo {0} is out of range (1..=65535)")]
    InvalidTempo(u32),

    #[error("song has no commands")]
    EmptySong,

    #[error("drum {index} (pcm {id}) is unresolved")]
    UnresolvedDrum { index: usize, id: u16 },

    #[error("instrument {index} is unresolved")]
    UnresolvedInstrument { index: usize },

    #[error("{kind} {id} not found in store")]
    MissingResource { kind: ResourceKind, id: u16 },

    #[error("{what} index {index} out of range")]
    IndexOutOfRange { what: &'static str, index: usize },

    #[error("{0} table is full")]
    TableFull(&'static str),

    #[error("{what} {index} is still referenced by command {command}")]
    InUse {
        what: &'static str,
        index: usize,
        command: usize,
    },

    #[error("instrument encoding of {0} bytes does not fit in a song")]
    EncodingTooLong(usize),
}

/// A failed [`Song::lock`]. Carries the song back to the caller unchanged.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct LockError {
    pub error: Error,
    pub song: Song,
}

impl From<LockError> for Error {
    fn from(e: LockError) -> Self {
        e.error
    }
}
