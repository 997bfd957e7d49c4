//! Amplitude envelope of a tuned note.
//!
//! The envelope is a pure function of a frame counter (the lifecycle
//! position) and four boundaries captured when the note starts.

use ak_ir::Instrument;

/// Envelope stage for a lifecycle position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopePhase {
    RampUp,
    Drawback,
    Hold,
    Decay,
    Terminal,
}

/// Boundaries and levels of one note's envelope.
///
/// `attack_end < drawback_end < decay_start < end` always holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lifecycle {
    attack_end: u64,
    drawback_end: u64,
    decay_start: u64,
    end: u64,
    peak: u8,
    sustain: u8,
}

impl Lifecycle {
    /// Capture the envelope for a note lasting `duration` frames before decay.
    ///
    /// Each boundary is at least one frame past the previous one.
    pub fn new(instrument: &Instrument, duration: u32) -> Self {
        let attack_end = (instrument.attack() as u64).max(1);
        let drawback_end = (attack_end + instrument.drawback() as u64).max(attack_end + 1);
        let decay_start = (duration as u64).max(drawback_end + 1);
        let end = (decay_start + instrument.decay() as u64).max(decay_start + 1);
        Self {
            attack_end,
            drawback_end,
            decay_start,
            end,
            peak: instrument.attack_level(),
            sustain: instrument.sustain_level(),
        }
    }

    pub fn attack_end(&self) -> u64 {
        self.attack_end
    }

    pub fn drawback_end(&self) -> u64 {
        self.drawback_end
    }

    pub fn decay_start(&self) -> u64 {
        self.decay_start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn phase(&self, position: u64) -> EnvelopePhase {
        if position < self.attack_end {
            EnvelopePhase::RampUp
        } else if position < self.drawback_end {
            EnvelopePhase::Drawback
        } else if position < self.decay_start {
            EnvelopePhase::Hold
        } else if position < self.end {
            EnvelopePhase::Decay
        } else {
            EnvelopePhase::Terminal
        }
    }

    /// Amplitude at `position`, 0..=255.
    pub fn level(&self, position: u64) -> u8 {
        let peak = self.peak as i64;
        let sustain = self.sustain as i64;
        let level = match self.phase(position) {
            EnvelopePhase::RampUp => peak * position as i64 / self.attack_end as i64,
            EnvelopePhase::Drawback => {
                let t = (position - self.attack_end) as i64;
                let span = (self.drawback_end - self.attack_end) as i64;
                peak + (sustain - peak) * t / span
            }
            EnvelopePhase::Hold => sustain,
            EnvelopePhase::Decay => {
                let left = (self.end - position) as i64;
                sustain * left / (self.end - self.decay_start) as i64
            }
            EnvelopePhase::Terminal => 0,
        };
        level.clamp(0, 255) as u8
    }
}
