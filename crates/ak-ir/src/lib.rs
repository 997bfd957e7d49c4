//! Core resource and song types for the akmix audio engine.
//!
//! This crate defines the sampled buffers, instruments and songs that the
//! engine plays. Codecs build these types and the mixer consumes them; none
//! of them know about output devices or threads.

mod audio_traits;
mod error;
mod instrument;
mod sample;
pub mod song;
mod store;

pub use audio_traits::{LoopRegion, PcmSource};
pub use error::{Error, LockError, ResourceKind, Result};
pub use instrument::Instrument;
pub use sample::{Pcm, Wave};
pub use song::{
    AdjustParam, Command, DrumSlot, InstrumentSlot, LockedSong, Song, DEFAULT_TEMPO, MAX_DRUMS,
    MAX_INSTRUMENTS,
};
pub use store::{MemoryStore, ResourceId, ResourceStore};
