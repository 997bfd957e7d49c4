//! Read access to sampled buffers.

/// Half-open loop region `[start, end)` within a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopRegion {
    pub start: usize,
    pub end: usize,
}

/// Read-only access to a fixed-size sampled buffer.
///
/// Integer playback buffers, floating-point waveforms and printed songs all
/// implement this so the mixer can treat them alike.
pub trait PcmSource: Send + Sync {
    /// Number of samples in the buffer. Never zero.
    fn len(&self) -> usize;

    /// Always false; buffers are non-empty by construction.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embedded loop region, if any.
    fn loop_region(&self) -> Option<LoopRegion> {
        None
    }

    /// Read a sample as i16. `pos` must be below `len()`.
    fn read_i16(&self, pos: usize) -> i16;

    /// Read a sample as f32 in -1..1.
    fn read_f32(&self, pos: usize) -> f32 {
        self.read_i16(pos) as f32 / 32768.0
    }
}
