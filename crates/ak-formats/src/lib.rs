//! Codecs for akmix.
//!
//! Decodes and encodes the binary song format and the instrument envelope
//! format, and reads and writes 16-bit PCM WAV files.

mod instrument_format;
mod reader;
mod song_format;
mod wav_format;

pub use instrument_format::{decode_instrument, harmonics_wave, InstrumentSpec};
pub use song_format::{decode_song, encode_song, opcode, SONG_MAGIC};
pub use wav_format::{load_wav, samples_to_wav, write_wav};

use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, FormatError>;

/// Error type for format parsing and encoding.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Invalid file header or magic bytes
    #[error("invalid header")]
    InvalidHeader,

    /// Unexpected end of data
    #[error("unexpected end of data")]
    UnexpectedEof,

    /// Unsupported format variant
    #[error("unsupported format: {0}")]
    Unsupported(&'static str),

    #[error("extra header of {0} bytes exceeds the limit")]
    ExtraHeaderTooLarge(u32),

    #[error("unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    #[error("{what} {index} has no binary encoding")]
    Unencodable { what: &'static str, index: usize },

    #[error(transparent)]
    Model(#[from] ak_ir::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Binary(binrw::Error),
}

impl From<binrw::Error> for FormatError {
    fn from(e: binrw::Error) -> Self {
        match e {
            binrw::Error::BadMagic { .. } => FormatError::InvalidHeader,
            e if e.is_eof() => FormatError::UnexpectedEof,
            e => FormatError::Binary(e),
        }
    }
}
