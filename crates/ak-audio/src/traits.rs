//! Audio output trait and error types.

use thiserror::Error;

/// Error type for audio operations.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Failed to initialize audio device
    #[error("device init error: {0}")]
    DeviceInit(String),
    /// Failed to create audio stream
    #[error("stream create error: {0}")]
    StreamCreate(String),
    /// Playback error
    #[error("playback error: {0}")]
    Playback(String),
    /// No audio device available
    #[error("no audio device available")]
    NoDevice,
    #[error("{0} output channels requested, only 1 or 2 supported")]
    UnsupportedChannels(u16),
    #[error("output already started")]
    AlreadyStarted,
}

/// Fills an interleaved 16-bit buffer. Runs on the driver's thread.
pub type RenderCallback = Box<dyn FnMut(&mut [i16]) + Send + 'static>;

/// Trait for audio output backends.
pub trait AudioOutput {
    /// Get the sample rate.
    fn sample_rate(&self) -> u32;

    /// Samples per frame.
    fn channels(&self) -> u16;

    /// Start calling `render` for every buffer the device wants.
    fn start(&mut self, render: RenderCallback) -> Result<(), AudioError>;

    /// Stop playback. The callback is dropped.
    fn stop(&mut self) -> Result<(), AudioError>;
}
