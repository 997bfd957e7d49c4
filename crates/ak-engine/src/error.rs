//! Engine error type.

use thiserror::Error;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, MixerError>;

/// Errors raised by the mixer, sequencer and song printer.
#[derive(Debug, Error)]
pub enum MixerError {
    #[error("output buffer of {len} samples does not hold whole {channels}-channel frames")]
    InvalidBufferLength { len: usize, channels: usize },

    #[error("channel not found")]
    ChannelNotFound,

    #[error("channel pool exhausted ({0} channels live)")]
    PoolExhausted(usize),

    #[error("command {position} refers to a missing resource")]
    BrokenCommand { position: usize },

    #[error("song prints to zero samples")]
    EmptyPrint,

    #[error("song too long to print ({0} samples)")]
    PrintTooLong(u64),

    #[error("printer already started (progress {0})")]
    PrinterBusy(i32),

    #[error("song print failed")]
    PrintFailed,

    #[error("print worker panicked")]
    WorkerPanicked,

    #[error("failed to start print worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Song(#[from] ak_ir::Error),
}
