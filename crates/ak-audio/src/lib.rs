//! Audio output drivers for akmix.
//!
//! A driver owns the device and periodically calls a render callback with an
//! interleaved 16-bit buffer to fill.

mod cpal_backend;
mod null_backend;
mod traits;

pub use cpal_backend::CpalOutput;
pub use null_backend::NullOutput;
pub use traits::{AudioError, AudioOutput, RenderCallback};
