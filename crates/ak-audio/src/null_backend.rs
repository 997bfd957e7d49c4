//! Deviceless output driven by hand.

use crate::traits::{AudioError, AudioOutput, RenderCallback};

/// An output with no device. Buffers are rendered only when [`NullOutput::pump`]
/// is called, which makes it useful for headless runs and tests.
pub struct NullOutput {
    sample_rate: u32,
    channels: u16,
    render: Option<RenderCallback>,
    buffer: Vec<i16>,
}

impl NullOutput {
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self, AudioError> {
        if !(1..=2).contains(&channels) {
            return Err(AudioError::UnsupportedChannels(channels));
        }
        Ok(Self {
            sample_rate,
            channels,
            render: None,
            buffer: Vec::new(),
        })
    }

    /// Run the callback for `frames` frames and return what it wrote.
    /// Returns an empty slice if not started.
    pub fn pump(&mut self, frames: usize) -> &[i16] {
        let Some(render) = self.render.as_mut() else {
            return &[];
        };
        self.buffer.resize(frames * self.channels as usize, 0);
        render(self.buffer.as_mut_slice());
        &self.buffer
    }
}

impl AudioOutput for NullOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn start(&mut self, render: RenderCallback) -> Result<(), AudioError> {
        if self.render.is_some() {
            return Err(AudioError::AlreadyStarted);
        }
        self.render = Some(render);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.render = None;
        Ok(())
    }
}
