//! Playback engine for akmix.
//!
//! Mixes tuned and sampled channels into interleaved PCM, sequences songs
//! frame by frame, and prints whole songs to buffers in the background.

mod channel;
mod channel_pool;
mod envelope;
mod error;
mod frequency;
mod intent;
mod mixer;
pub mod sequencer;
mod slider;
mod songprinter;
mod sync;

pub use channel::{Channel, TunedVoice, VerbatimVoice, Voice};
pub use channel_pool::{ChannelId, MAX_CHANNELS};
pub use envelope::{EnvelopePhase, Lifecycle};
pub use error::{MixerError, Result};
pub use frequency::{pitch_to_increment, rate_from_pitch};
pub use intent::{Intent, INTENT_COUNT, INTENT_TRIM_UNITY};
pub use mixer::{
    ChannelLayout, ClipCount, Mixer, MixerConfig, EARLY_PLAYBACK_DELAY, EARLY_PLAYBACK_PROGRESS,
    SONG_FADE_MS,
};
pub use sequencer::{execute_from, ChannelInfo, Performer, SequencerState, Step};
pub use slider::{Lerp, Slider};
pub use songprinter::{
    PrintedPcm, SongPrinter, MAX_PRINT_SAMPLES, PRINT_CHUNK_SAMPLES, PROGRESS_DONE,
    PROGRESS_FAILED, PROGRESS_IDLE,
};
pub use sync::{sync_queue, SyncReceiver, SyncSender};
