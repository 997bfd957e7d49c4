//! Instrument envelope format.
//!
//! Ten header bytes (attack, drawback and decay in milliseconds as u16 BE,
//! attack trim, drawback trim, one reserved byte, harmonic count) followed by
//! one u16 BE coefficient per harmonic. Trailing bytes are ignored.

use std::io::Cursor;
use std::sync::Arc;

use ak_ir::{Instrument, Wave};
use binrw::{BinRead, BinWrite};

use crate::{FormatError, Result};

#[derive(BinRead, BinWrite)]
#[brw(big)]
struct InstrumentRecord {
    attack_ms: u16,
    drawback_ms: u16,
    decay_ms: u16,
    attack_trim: u8,
    drawback_trim: u8,
    #[brw(pad_before = 1)]
    coefficient_count: u8,
    #[br(count = coefficient_count)]
    coefficients: Vec<u16>,
}

/// Decoded instrument parameters, independent of output rate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstrumentSpec {
    pub attack_ms: u16,
    pub drawback_ms: u16,
    pub decay_ms: u16,
    /// Peak level, 0xff = full scale.
    pub attack_trim: u8,
    /// Sustain level, 0xff = full scale.
    pub drawback_trim: u8,
    /// Harmonic weights, 0xffff = 1.0. Empty means a pure sine.
    pub coefficients: Vec<u16>,
}

impl InstrumentSpec {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let record = InstrumentRecord::read(&mut Cursor::new(data))?;
        Ok(Self {
            attack_ms: record.attack_ms,
            drawback_ms: record.drawback_ms,
            decay_ms: record.decay_ms,
            attack_trim: record.attack_trim,
            drawback_trim: record.drawback_trim,
            coefficients: record.coefficients,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let coefficient_count = u8::try_from(self.coefficients.len()).map_err(|_| {
            FormatError::Unencodable {
                what: "harmonic",
                index: self.coefficients.len() - 1,
            }
        })?;
        let record = InstrumentRecord {
            attack_ms: self.attack_ms,
            drawback_ms: self.drawback_ms,
            decay_ms: self.decay_ms,
            attack_trim: self.attack_trim,
            drawback_trim: self.drawback_trim,
            coefficient_count,
            coefficients: self.coefficients.clone(),
        };
        let mut out = Cursor::new(Vec::with_capacity(10 + 2 * self.coefficients.len()));
        record.write(&mut out)?;
        Ok(out.into_inner())
    }

    /// Build a playable instrument for output at `sample_rate`.
    pub fn build(&self, sample_rate: u32) -> Result<Instrument> {
        let weights: Vec<f32> = if self.coefficients.is_empty() {
            vec![1.0]
        } else {
            self.coefficients
                .iter()
                .map(|&c| c as f32 / 65535.0)
                .collect()
        };
        let wave = harmonics_wave(&weights, sample_rate as usize)?;
        Ok(Instrument::from_millis(
            sample_rate,
            self.attack_ms as u32,
            self.attack_trim as f32 / 255.0,
            self.drawback_ms as u32,
            self.drawback_trim as f32 / 255.0,
            self.decay_ms as u32,
            Arc::new(wave),
        ))
    }
}

/// Decode an instrument encoding and build it for `sample_rate`.
pub fn decode_instrument(data: &[u8], sample_rate: u32) -> Result<Instrument> {
    InstrumentSpec::parse(data)?.build(sample_rate)
}

/// One cycle of a harmonic series over `len` samples.
///
/// Harmonic `n` (1-based) contributes a sine at `n` cycles weighted
/// `weights[n - 1] / n`. Harmonics at or above `len` are dropped.
pub fn harmonics_wave(weights: &[f32], len: usize) -> Result<Wave> {
    let sine = Wave::sine(len)?;
    let sine = sine.samples();
    let mut out = vec![0.0f32; len];
    for (i, &weight) in weights.iter().enumerate().take(len.saturating_sub(1)) {
        let harmonic = i + 1;
        let weight = weight / harmonic as f32;
        let mut src = 0;
        for sample in out.iter_mut() {
            *sample += sine[src] * weight;
            src += harmonic;
            if src >= len {
                src -= len;
            }
        }
    }
    Wave::new(out).map_err(FormatError::from)
}
