//! CPAL-based audio output backend.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};

use crate::traits::{AudioError, AudioOutput, RenderCallback};

/// Output on the host's default device.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl CpalOutput {
    /// Open the default device with `channels` interleaved channels at its
    /// preferred rate.
    pub fn new(channels: u16) -> Result<Self, AudioError> {
        if !(1..=2).contains(&channels) {
            return Err(AudioError::UnsupportedChannels(channels));
        }
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        let mut config: StreamConfig = config.into();
        config.channels = channels;

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn channels(&self) -> u16 {
        self.config.channels
    }

    fn start(&mut self, mut render: RenderCallback) -> Result<(), AudioError> {
        if self.stream.is_some() {
            return Err(AudioError::AlreadyStarted);
        }

        // About 200ms of room so the callback does not allocate.
        let capacity = self.config.sample_rate.0 as usize / 5 * self.config.channels as usize;
        let mut scratch: Vec<i16> = Vec::with_capacity(capacity);

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0);
                    render(scratch.as_mut_slice());
                    for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = sample as f32 / 32768.0;
                    }
                },
                |err| log::error!("audio stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        log::info!(
            "audio output started: {} Hz, {} channels",
            self.config.sample_rate.0,
            self.config.channels
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        if let Some(stream) = self.stream.take() {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}
