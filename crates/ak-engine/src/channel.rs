//! Per-channel playback state.
//!
//! A channel is either tuned (an instrument's waveform shaped by its
//! envelope) or verbatim (a sampled buffer played as-is). The kind and the
//! resource never change after creation; only positions, trim and pan move.

use std::sync::Arc;

use ak_ir::{Instrument, PcmSource};

use crate::envelope::Lifecycle;
use crate::frequency::pitch_to_increment;
use crate::intent::Intent;
use crate::slider::Slider;

/// A tuned note.
pub struct TunedVoice {
    instrument: Arc<Instrument>,
    /// Fractional read position in the waveform.
    phase: f32,
    /// Phase increment per frame.
    rate: f32,
    rate_slider: Option<Slider<f32>>,
    /// Last pitch requested, for display and adjustment.
    pitch: u8,
    /// Frames since note start.
    position: u64,
    lifecycle: Lifecycle,
}

impl TunedVoice {
    pub fn new(instrument: Arc<Instrument>, pitch: u8, duration: u32, sample_rate: u32) -> Self {
        let lifecycle = Lifecycle::new(&instrument, duration);
        let rate = pitch_to_increment(pitch, instrument.wave().len(), sample_rate);
        Self {
            instrument,
            phase: 0.0,
            rate,
            rate_slider: None,
            pitch,
            position: 0,
            lifecycle,
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Jump to the start of decay unless already there.
    fn stop(&mut self) {
        self.position = self.position.max(self.lifecycle.decay_start());
    }

    fn render(&mut self) -> (i32, bool) {
        let wave = self.instrument.wave();
        let len = wave.len() as f32;
        let norm = wave.read_f32(self.phase as usize);
        let level = self.lifecycle.level(self.position) as f32;
        let sample = (norm * 32767.0 * level / 255.0) as i32;

        self.phase += self.rate;
        if self.phase >= len {
            self.phase %= len;
        }
        self.position += 1;
        (sample, self.position < self.lifecycle.end())
    }
}

/// A sampled buffer.
pub struct VerbatimVoice {
    pcm: Arc<dyn PcmSource>,
    position: usize,
    looping: bool,
}

impl VerbatimVoice {
    pub fn new(pcm: Arc<dyn PcmSource>, looping: bool) -> Self {
        Self {
            pcm,
            position: 0,
            looping,
        }
    }

    /// Start from `position` instead of the beginning. Looping buffers wrap
    /// a position past their end.
    pub fn at(mut self, position: usize) -> Self {
        let len = self.pcm.len();
        self.position = if self.looping && len > 0 {
            position % len
        } else {
            position.min(len)
        };
        self
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn render(&mut self) -> (i32, bool) {
        let len = self.pcm.len();
        if self.position >= len {
            return (0, false);
        }
        let sample = self.pcm.read_i16(self.position) as i32;
        self.position += 1;

        if !self.looping {
            return (sample, self.position < len);
        }
        match self.pcm.loop_region() {
            Some(region) if self.position >= region.end => self.position = region.start,
            Some(_) => {}
            None if self.position >= len => self.position = 0,
            None => {}
        }
        (sample, true)
    }
}

/// Channel variant.
pub enum Voice {
    Tuned(TunedVoice),
    Verbatim(VerbatimVoice),
}

/// A live mixer channel.
pub struct Channel {
    pub(crate) intent: Intent,
    pub(crate) trim: u8,
    pub(crate) pan: i8,
    trim_slider: Option<Slider<i32>>,
    pan_slider: Option<Slider<i32>>,
    stop_at_silence: bool,
    /// Song playback that started this channel, if any.
    pub(crate) song: Option<u32>,
    pub(crate) voice: Voice,
}

impl Channel {
    pub fn new(voice: Voice, trim: u8, pan: i8, intent: Intent) -> Self {
        Self {
            intent,
            trim,
            pan,
            trim_slider: None,
            pan_slider: None,
            stop_at_silence: false,
            song: None,
            voice,
        }
    }

    pub fn is_tuned(&self) -> bool {
        matches!(self.voice, Voice::Tuned(_))
    }

    pub fn voice(&self) -> &Voice {
        &self.voice
    }

    /// Pitch of a tuned channel, 0 for verbatim ones.
    pub fn pitch(&self) -> u8 {
        match &self.voice {
            Voice::Tuned(tuned) => tuned.pitch,
            Voice::Verbatim(_) => 0,
        }
    }

    /// Tuned: skip to decay. Verbatim: finish the current pass and end.
    pub fn stop(&mut self) {
        match &mut self.voice {
            Voice::Tuned(tuned) => tuned.stop(),
            Voice::Verbatim(verbatim) => verbatim.looping = false,
        }
    }

    /// Fade trim to zero over `frames` and end the channel there.
    pub fn fade_out(&mut self, frames: u32) {
        self.trim_slider = Some(Slider::new(self.trim as i32, 0, frames));
        self.stop_at_silence = true;
    }

    /// Move toward new values over `frames`, or at once when `frames` is 0.
    /// Properties already at their target are left alone.
    pub fn adjust(&mut self, pitch: u8, trim: u8, pan: i8, frames: u32, sample_rate: u32) {
        if frames == 0 {
            self.trim = trim;
            self.trim_slider = None;
            self.pan = pan;
            self.pan_slider = None;
            if let Voice::Tuned(tuned) = &mut self.voice {
                tuned.pitch = pitch;
                tuned.rate = pitch_to_increment(pitch, tuned.instrument.wave().len(), sample_rate);
                tuned.rate_slider = None;
            }
            return;
        }
        if trim != self.trim {
            self.trim_slider = Some(Slider::new(self.trim as i32, trim as i32, frames));
        }
        if pan != self.pan {
            self.pan_slider = Some(Slider::new(self.pan as i32, pan as i32, frames));
        }
        if let Voice::Tuned(tuned) = &mut self.voice {
            if pitch != tuned.pitch {
                let target = pitch_to_increment(pitch, tuned.instrument.wave().len(), sample_rate);
                tuned.rate_slider = Some(Slider::new(tuned.rate, target, frames));
                tuned.pitch = pitch;
            }
        }
    }

    /// Step sliders by one frame. Returns false if the channel faded out.
    pub(crate) fn advance_sliders(&mut self) -> bool {
        if let Some(slider) = &mut self.trim_slider {
            let (value, done) = slider.step();
            self.trim = value.clamp(0, 255) as u8;
            if done {
                self.trim_slider = None;
                if self.stop_at_silence && self.trim == 0 {
                    return false;
                }
            }
        }
        if let Some(slider) = &mut self.pan_slider {
            let (value, done) = slider.step();
            self.pan = value.clamp(-128, 127) as i8;
            if done {
                self.pan_slider = None;
            }
        }
        if let Voice::Tuned(tuned) = &mut self.voice {
            if let Some(slider) = &mut tuned.rate_slider {
                let (value, done) = slider.step();
                tuned.rate = value;
                if done {
                    tuned.rate_slider = None;
                }
            }
        }
        true
    }

    /// Produce this frame's raw sample and advance. The flag is false once
    /// the channel has reached its end.
    pub(crate) fn render(&mut self) -> (i32, bool) {
        match &mut self.voice {
            Voice::Tuned(tuned) => tuned.render(),
            Voice::Verbatim(verbatim) => verbatim.render(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ak_ir::{Pcm, Wave};

    fn verbatim(samples: Vec<i16>, looping: bool) -> Channel {
        let pcm = Arc::new(Pcm::new(samples).unwrap());
        Channel::new(Voice::Verbatim(VerbatimVoice::new(pcm, looping)), 0xff, 0, Intent::SFX)
    }

    fn tuned(duration: u32) -> Channel {
        let wave = Arc::new(Wave::new(vec![1.0; 100]).unwrap());
        let instrument = Arc::new(Instrument::new(2, 2, 3, 1.0, 1.0, wave));
        let voice = TunedVoice::new(instrument, 48, duration, 44100);
        Channel::new(Voice::Tuned(voice), 0xff, 0, Intent::BGM)
    }

    fn run(channel: &mut Channel, frames: usize) -> Vec<(i32, bool)> {
        (0..frames).map(|_| channel.render()).collect()
    }

    #[test]
    fn one_shot_buffer_ends_with_last_sample() {
        let mut ch = verbatim(vec![1, 2, 3], false);
        assert_eq!(run(&mut ch, 3), vec![(1, true), (2, true), (3, false)]);
    }

    #[test]
    fn looping_buffer_wraps_whole() {
        let mut ch = verbatim(vec![1, 2, 3], true);
        let samples: Vec<i32> = run(&mut ch, 7).into_iter().map(|(s, _)| s).collect();
        assert_eq!(samples, vec![1, 2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn looping_buffer_uses_loop_region() {
        let pcm = Arc::new(Pcm::new(vec![1, 2, 3, 4]).unwrap().with_loop(1, 3).unwrap());
        let mut ch = Channel::new(Voice::Verbatim(VerbatimVoice::new(pcm, true)), 0xff, 0, Intent::SFX);
        let samples: Vec<i32> = run(&mut ch, 6).into_iter().map(|(s, _)| s).collect();
        assert_eq!(samples, vec![1, 2, 3, 2, 3, 2]);
    }

    #[test]
    fn looping_start_past_the_end_wraps() {
        let pcm = Arc::new(Pcm::new(vec![1, 2, 3]).unwrap());
        let mut ch = Channel::new(
            Voice::Verbatim(VerbatimVoice::new(pcm.clone(), true).at(3)),
            0xff,
            0,
            Intent::SFX,
        );
        assert_eq!(run(&mut ch, 2), vec![(1, true), (2, true)]);

        let one_shot = VerbatimVoice::new(pcm, false).at(7);
        assert_eq!(one_shot.position(), 3);
    }

    #[test]
    fn stopping_a_loop_finishes_the_pass() {
        let mut ch = verbatim(vec![1, 2, 3], true);
        run(&mut ch, 4);
        ch.stop();
        assert_eq!(run(&mut ch, 2), vec![(2, true), (3, false)]);
    }

    #[test]
    fn tuned_note_runs_its_lifecycle() {
        let mut ch = tuned(6);
        let frames = run(&mut ch, 9);
        assert!(frames[..8].iter().all(|(_, alive)| *alive));
        assert!(!frames[8].1);
        assert_eq!(frames[0].0, 0);
        assert_eq!(frames[2].0, 32767);
    }

    #[test]
    fn stopping_a_note_jumps_to_decay() {
        let mut ch = tuned(50);
        run(&mut ch, 3);
        ch.stop();
        let Voice::Tuned(voice) = ch.voice() else { unreachable!() };
        assert_eq!(voice.position(), 50);
        let remaining = voice.lifecycle().end() - voice.lifecycle().decay_start();
        let frames = run(&mut ch, remaining as usize);
        assert!(!frames.last().unwrap().1);
        assert!(frames[..frames.len() - 1].iter().all(|(_, alive)| *alive));
    }

    #[test]
    fn fade_out_ends_at_silence() {
        let mut ch = verbatim(vec![100; 50], true);
        ch.fade_out(3);
        assert!(ch.advance_sliders());
        assert!(ch.advance_sliders());
        assert!(!ch.advance_sliders());
        assert_eq!(ch.trim, 0);
    }

    #[test]
    fn adjust_slides_only_changed_values() {
        let mut ch = tuned(100);
        ch.adjust(48, 0x7f, 0, 2, 44100);
        ch.advance_sliders();
        assert_eq!(ch.trim, 191);
        assert_eq!(ch.pan, 0);
        ch.advance_sliders();
        assert_eq!(ch.trim, 0x7f);
    }

    #[test]
    fn instant_adjust_changes_pitch() {
        let mut ch = tuned(100);
        ch.adjust(60, 0x10, -5, 0, 44100);
        assert_eq!(ch.pitch(), 60);
        assert_eq!(ch.trim, 0x10);
        assert_eq!(ch.pan, -5);
    }
}
