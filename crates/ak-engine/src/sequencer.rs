//! Resumable song interpreter.
//!
//! A song's playback state is a command position and a delay counter held
//! by the caller, plus the per-reference channel table in
//! [`SequencerState`]. [`execute_from`] runs commands from a position up to
//! the next wait and reports where to resume.

use std::sync::Arc;

use ak_ir::{AdjustParam, Command, Instrument, PcmSource, Song};

use crate::channel_pool::ChannelId;
use crate::error::{MixerError, Result};
use crate::intent::Intent;

/// Number of channel reference slots addressable by commands.
pub const REFERENCE_SLOTS: usize = 256;

/// Snapshot of a live channel's adjustable properties.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
    pub pitch: u8,
    pub trim: u8,
    pub pan: i8,
    pub intent: Intent,
    pub tuned: bool,
}

/// What a song needs from the mixer it plays on.
pub trait Performer {
    fn sample_rate(&self) -> u32;

    /// Start a tuned note. `Ok(None)` when `duration` is zero.
    fn play_note(
        &mut self,
        instrument: &Arc<Instrument>,
        pitch: u8,
        trim: u8,
        pan: i8,
        duration: u32,
        intent: Intent,
    ) -> Result<Option<ChannelId>>;

    fn play_pcm(
        &mut self,
        pcm: Arc<dyn PcmSource>,
        trim: u8,
        pan: i8,
        looping: bool,
        intent: Intent,
    ) -> Result<ChannelId>;

    fn channel(&self, id: ChannelId) -> Option<ChannelInfo>;

    fn adjust_channel(&mut self, id: ChannelId, pitch: u8, trim: u8, pan: i8, duration: u32) -> Result<()>;

    /// Post a sync token for main-thread delivery.
    fn sync(&mut self, token: u16);
}

/// Per-playback state that outlives a single [`execute_from`] call.
#[derive(Clone, Debug)]
pub struct SequencerState {
    pub intent: Intent,
    /// Beats completed in the current pass.
    pub beat: usize,
    refs: [Option<ChannelId>; REFERENCE_SLOTS],
}

impl SequencerState {
    pub fn new(intent: Intent) -> Self {
        Self {
            intent,
            beat: 0,
            refs: [None; REFERENCE_SLOTS],
        }
    }

    /// Channel last started under `reference`.
    pub fn channel_for(&self, reference: u8) -> Option<ChannelId> {
        self.refs[reference as usize]
    }

    /// Every channel currently recorded in the reference table.
    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.refs.iter().flatten().copied()
    }

    pub fn reset(&mut self) {
        self.beat = 0;
        self.refs = [None; REFERENCE_SLOTS];
    }
}

/// Where to resume after a call to [`execute_from`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Step {
    pub position: usize,
    pub delay: u32,
}

/// Run `song` from `position` until it waits.
///
/// A position past the end restarts the song. `Beat` and `Delay` yield with
/// their wait; reaching the last command yields with no wait and resumes at
/// the top.
pub fn execute_from(
    song: &Song,
    position: usize,
    state: &mut SequencerState,
    performer: &mut impl Performer,
) -> Result<Step> {
    let commands = song.commands();
    let mut position = if position >= commands.len() {
        state.beat = 0;
        0
    } else {
        position
    };
    let frames_per_beat = song.frames_per_beat(performer.sample_rate());

    while let Some(command) = commands.get(position) {
        let at = position;
        position += 1;
        match *command {
            Command::Noop => {}
            Command::Beat => {
                state.beat += 1;
                return Ok(Step {
                    position,
                    delay: frames_per_beat,
                });
            }
            Command::Delay(frames) => {
                return Ok(Step {
                    position,
                    delay: frames as u32,
                });
            }
            Command::Sync(token) => performer.sync(token),
            Command::Note {
                reference,
                instrument,
                trim,
                pan,
                pitch,
                duration,
            } => {
                let instrument = song
                    .instruments()
                    .get(instrument as usize)
                    .and_then(|slot| slot.instrument.as_ref())
                    .ok_or(MixerError::BrokenCommand { position: at })?;
                let frames = (duration as u32).saturating_mul(frames_per_beat);
                let id = performer.play_note(instrument, pitch, trim, pan, frames, state.intent)?;
                state.refs[reference as usize] = id;
            }
            Command::Drum {
                reference,
                drum,
                trim,
                pan,
            } => {
                let pcm = song
                    .drums()
                    .get(drum as usize)
                    .and_then(|slot| slot.pcm.clone())
                    .ok_or(MixerError::BrokenCommand { position: at })?;
                let id = performer.play_pcm(pcm, trim, pan, false, state.intent)?;
                state.refs[reference as usize] = Some(id);
            }
            Command::Adjust {
                param,
                reference,
                value,
                duration,
            } => {
                // The referenced channel may have ended on its own.
                let Some(id) = state.refs[reference as usize] else {
                    continue;
                };
                let Some(info) = performer.channel(id) else {
                    state.refs[reference as usize] = None;
                    continue;
                };
                let (pitch, trim, pan) = match param {
                    AdjustParam::Pitch => (value, info.trim, info.pan),
                    AdjustParam::Trim => (info.pitch, value, info.pan),
                    AdjustParam::Pan => (info.pitch, info.trim, value as i8),
                };
                let frames = (duration as u32).saturating_mul(frames_per_beat);
                performer.adjust_channel(id, pitch, trim, pan, frames)?;
            }
        }
    }

    state.beat = 0;
    Ok(Step {
        position: 0,
        delay: 0,
    })
}
