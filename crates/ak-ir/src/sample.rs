//! Sampled buffer types.
//!
//! Buffers are validated at construction and never change afterwards.
//! Sharing one means wrapping it in an `Arc`, which is the only read-only
//! grant the engine needs.

use std::f32::consts::TAU;
use std::fmt;

use crate::audio_traits::{LoopRegion, PcmSource};
use crate::error::{Error, Result};

/// A 16-bit playback buffer with an optional loop region.
#[derive(Clone, PartialEq, Eq)]
pub struct Pcm {
    samples: Box<[i16]>,
    loop_region: Option<LoopRegion>,
}

impl Pcm {
    /// Create a buffer from raw samples. Fails if `samples` is empty.
    pub fn new(samples: Vec<i16>) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::EmptyBuffer);
        }
        Ok(Self {
            samples: samples.into_boxed_slice(),
            loop_region: None,
        })
    }

    /// Attach a loop region `[start, end)`.
    pub fn with_loop(mut self, start: usize, end: usize) -> Result<Self> {
        let len = self.samples.len();
        if start >= end || end > len {
            return Err(Error::InvalidLoop { start, end, len });
        }
        self.loop_region = Some(LoopRegion { start, end });
        Ok(self)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }
}

impl PcmSource for Pcm {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn loop_region(&self) -> Option<LoopRegion> {
        self.loop_region
    }

    fn read_i16(&self, pos: usize) -> i16 {
        self.samples[pos]
    }
}

impl fmt::Debug for Pcm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pcm")
            .field("len", &self.samples.len())
            .field("loop_region", &self.loop_region)
            .finish()
    }
}

/// A floating-point waveform, used by instruments.
///
/// A tuned instrument's wave holds exactly one cycle, so stepping through it
/// at `hz` samples per frame plays it at `hz` when the wave is as long as the
/// output rate.
#[derive(Clone, PartialEq)]
pub struct Wave {
    samples: Box<[f32]>,
}

impl Wave {
    /// Create a waveform from raw samples. Fails if `samples` is empty.
    pub fn new(samples: Vec<f32>) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::EmptyBuffer);
        }
        Ok(Self {
            samples: samples.into_boxed_slice(),
        })
    }

    /// One cycle of a sine wave spread over `len` samples.
    pub fn sine(len: usize) -> Result<Self> {
        let step = TAU / len.max(1) as f32;
        Self::new((0..len).map(|i| (i as f32 * step).sin()).collect())
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

impl PcmSource for Wave {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn read_i16(&self, pos: usize) -> i16 {
        (self.samples[pos].clamp(-1.0, 1.0) * 32767.0) as i16
    }

    fn read_f32(&self, pos: usize) -> f32 {
        self.samples[pos]
    }
}

impl fmt::Debug for Wave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wave").field("len", &self.samples.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pcm_is_rejected() {
        assert_eq!(Pcm::new(Vec::new()), Err(Error::EmptyBuffer));
    }

    #[test]
    fn pcm_loop_must_fit() {
        let pcm = Pcm::new(vec![0; 10]).unwrap();
        assert!(pcm.clone().with_loop(2, 10).is_ok());
        assert!(pcm.clone().with_loop(5, 5).is_err());
        assert!(pcm.with_loop(0, 11).is_err());
    }

    #[test]
    fn pcm_reads_through_source_trait() {
        let pcm = Pcm::new(vec![1, -2, 3]).unwrap().with_loop(1, 3).unwrap();
        let src: &dyn PcmSource = &pcm;
        assert_eq!(src.len(), 3);
        assert_eq!(src.read_i16(1), -2);
        assert_eq!(src.loop_region(), Some(LoopRegion { start: 1, end: 3 }));
    }

    #[test]
    fn sine_wave_has_one_cycle() {
        let wave = Wave::sine(400).unwrap();
        assert_eq!(wave.len(), 400);
        assert!(wave.read_f32(0).abs() < 1e-6);
        assert!((wave.read_f32(100) - 1.0).abs() < 1e-3);
        assert!((wave.read_f32(300) + 1.0).abs() < 1e-3);
        assert!(wave.loop_region().is_none());
    }

    #[test]
    fn wave_reads_as_i16() {
        let wave = Wave::new(vec![1.0, -1.0, 0.5]).unwrap();
        assert_eq!(wave.read_i16(0), 32767);
        assert_eq!(wave.read_i16(1), -32767);
        assert_eq!(wave.read_i16(2), 16383);
    }
}
