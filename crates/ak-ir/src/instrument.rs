//! Tuned instrument definition.

use std::sync::Arc;

use crate::error::Result;
use crate::sample::Wave;

/// Envelope and waveform for tuned notes.
///
/// Durations are in output frames. Immutable once built; share it with
/// `Arc<Instrument>`.
#[derive(Clone, Debug)]
pub struct Instrument {
    attack: u32,
    drawback: u32,
    decay: u32,
    attack_trim: f32,
    drawback_trim: f32,
    wave: Arc<Wave>,
}

impl Instrument {
    /// Build from frame counts. Trims are clamped to 0..=1.
    pub fn new(
        attack: u32,
        drawback: u32,
        decay: u32,
        attack_trim: f32,
        drawback_trim: f32,
        wave: Arc<Wave>,
    ) -> Self {
        Self {
            attack,
            drawback,
            decay,
            attack_trim: attack_trim.clamp(0.0, 1.0),
            drawback_trim: drawback_trim.clamp(0.0, 1.0),
            wave,
        }
    }

    /// Build from millisecond durations at the given output rate.
    #[allow(clippy::too_many_arguments)]
    pub fn from_millis(
        sample_rate: u32,
        attack_ms: u32,
        attack_trim: f32,
        drawback_ms: u32,
        drawback_trim: f32,
        decay_ms: u32,
        wave: Arc<Wave>,
    ) -> Self {
        let frames = |ms: u32| (ms as u64 * sample_rate as u64 / 1000) as u32;
        Self::new(
            frames(attack_ms),
            frames(drawback_ms),
            frames(decay_ms),
            attack_trim,
            drawback_trim,
            wave,
        )
    }

    /// A plain sine tone: 1000ms attack to 0.7, 1000ms drawback to 0.6, 2000ms decay.
    pub fn default_tone(sample_rate: u32) -> Result<Self> {
        let wave = Arc::new(Wave::sine(sample_rate as usize)?);
        Ok(Self::from_millis(sample_rate, 1000, 0.7, 1000, 0.6, 2000, wave))
    }

    pub fn attack(&self) -> u32 {
        self.attack
    }

    pub fn drawback(&self) -> u32 {
        self.drawback
    }

    pub fn decay(&self) -> u32 {
        self.decay
    }

    pub fn attack_trim(&self) -> f32 {
        self.attack_trim
    }

    pub fn drawback_trim(&self) -> f32 {
        self.drawback_trim
    }

    /// Attack peak as an 8-bit level.
    pub fn attack_level(&self) -> u8 {
        (self.attack_trim * 255.0).round() as u8
    }

    /// Sustain level as an 8-bit level.
    pub fn sustain_level(&self) -> u8 {
        (self.drawback_trim * 255.0).round() as u8
    }

    pub fn wave(&self) -> &Arc<Wave> {
        &self.wave
    }
}
