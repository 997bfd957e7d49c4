//! The real-time mixer.
//!
//! `Mixer::update` is the only real-time entry point. Every other method is
//! a control operation; callers serialize them against `update` with the
//! same lock the audio callback runs under. The mixer itself does no
//! locking.

use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ak_ir::{Instrument, LockedSong, PcmSource};

use crate::channel::{Channel, TunedVoice, VerbatimVoice, Voice};
use crate::channel_pool::{ChannelId, ChannelPool};
use crate::error::{MixerError, Result};
use crate::intent::{Intent, INTENT_COUNT, INTENT_TRIM_UNITY};
use crate::sequencer::{execute_from, ChannelInfo, Performer, SequencerState};
use crate::songprinter::{SongPrinter, PROGRESS_DONE};
use crate::sync::SyncSender;

/// Fade applied to the outgoing song when another one starts.
pub const SONG_FADE_MS: u32 = 250;

/// A printed song may start playing before it is finished once it is at
/// least this far along...
pub const EARLY_PLAYBACK_PROGRESS: i32 = 50;

/// ...and this much time has passed since it was requested.
pub const EARLY_PLAYBACK_DELAY: Duration = Duration::from_millis(250);

/// Output sample layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelLayout {
    Mono,
    /// Interleaved L, R.
    Stereo,
}

impl ChannelLayout {
    /// Samples per frame.
    pub fn channels(self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

/// Mixer settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MixerConfig {
    pub sample_rate: u32,
    pub layout: ChannelLayout,
    /// Render songs ahead of time on a worker and play the result.
    pub print_songs: bool,
    /// Channels reserved up front.
    pub channel_capacity: usize,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            layout: ChannelLayout::Stereo,
            print_songs: true,
            channel_capacity: 64,
        }
    }
}

/// Clipped-sample counts since the last query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClipCount {
    pub left: u32,
    pub right: u32,
}

/// A song interpreted frame by frame.
struct SongPlayer {
    song: LockedSong,
    position: usize,
    delay: u32,
    state: SequencerState,
}

/// A song being printed, then played as a looping buffer.
struct PrintedSong {
    song: LockedSong,
    printer: SongPrinter,
    intent: Intent,
    /// Sample to start playback at.
    start: usize,
    requested: Instant,
    channel: Option<ChannelId>,
    failed: bool,
}

/// Channel pool, song playback and the final mix.
pub struct Mixer {
    config: MixerConfig,
    channels: ChannelPool,
    intent_trims: [u8; INTENT_COUNT],
    clip: ClipCount,
    song: Option<SongPlayer>,
    printed: Option<PrintedSong>,
    /// Bumped on every song start; song channels carry the value they started under.
    song_generation: u32,
    sync: Option<SyncSender>,
}

impl Mixer {
    pub fn new(config: MixerConfig) -> Self {
        Self {
            config,
            channels: ChannelPool::with_capacity(config.channel_capacity),
            intent_trims: [INTENT_TRIM_UNITY; INTENT_COUNT],
            clip: ClipCount::default(),
            song: None,
            printed: None,
            song_generation: 0,
            sync: None,
        }
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Choose printed or direct playback for songs started from now on.
    pub fn set_print_songs(&mut self, print: bool) {
        self.config.print_songs = print;
    }

    /// Route `Sync` commands into `sender`. Returns the previous sender.
    pub fn attach_sync(&mut self, sender: SyncSender) -> Option<SyncSender> {
        self.sync.replace(sender)
    }

    // --- Real-time path ---

    /// Fill `out` completely with the next frames of audio.
    ///
    /// `out` must hold whole frames for the configured layout. On error the
    /// buffer is zeroed.
    pub fn update(&mut self, out: &mut [i16]) -> Result<()> {
        let stride = self.config.layout.channels();
        if out.len() % stride != 0 {
            out.fill(0);
            return Err(MixerError::InvalidBufferLength {
                len: out.len(),
                channels: stride,
            });
        }
        self.poll_printed();

        #[cfg(feature = "alloc_check")]
        let result = assert_no_alloc::assert_no_alloc(|| self.render(out, stride));
        #[cfg(not(feature = "alloc_check"))]
        let result = self.render(out, stride);

        if result.is_err() {
            out.fill(0);
        }
        result
    }

    fn render(&mut self, out: &mut [i16], stride: usize) -> Result<()> {
        let stereo = stride == 2;
        for frame in out.chunks_exact_mut(stride) {
            self.advance_song()?;
            let (left, right) = self.mix_frame(stereo);
            frame[0] = clip(left, &mut self.clip.left);
            if stereo {
                frame[1] = clip(right, &mut self.clip.right);
            }
        }
        Ok(())
    }

    /// Run the direct-mode song if its delay has run out.
    fn advance_song(&mut self) -> Result<()> {
        let Some(mut player) = self.song.take() else {
            return Ok(());
        };
        let mut result = Ok(());
        if player.delay == 0 {
            match execute_from(&player.song, player.position, &mut player.state, self) {
                Ok(step) => {
                    player.position = step.position;
                    player.delay = step.delay;
                }
                Err(e) => result = Err(e),
            }
        }
        player.delay = player.delay.saturating_sub(1);
        self.song = Some(player);
        result
    }

    fn mix_frame(&mut self, stereo: bool) -> (i32, i32) {
        let trims = &self.intent_trims;
        let mut left = 0i32;
        let mut right = 0i32;
        self.channels.retain(|_, channel| {
            if !channel.advance_sliders() {
                return false;
            }
            let (raw, alive) = channel.render();
            if raw == 0 {
                return alive;
            }
            let intent_trim = trims[channel.intent.index()];
            if intent_trim == 0 {
                return alive;
            }
            let mut sample = raw;
            if intent_trim != INTENT_TRIM_UNITY {
                sample = (sample * intent_trim as i32) >> 8;
            }
            sample = (sample * channel.trim as i32) >> 8;
            if stereo {
                let (l, r) = pan_split(sample, channel.pan);
                left += l;
                right += r;
            } else {
                left += sample;
            }
            alive
        });
        (left, right)
    }

    /// Start the printed song's channel once its buffer is usable.
    /// Checked once per `update`.
    fn poll_printed(&mut self) {
        let Some(printed) = self.printed.as_mut() else {
            return;
        };
        if let Some(id) = printed.channel {
            if self.channels.contains(id) {
                return;
            }
            log::debug!("printed song channel ended, starting over");
            printed.channel = None;
            printed.start = 0;
        }
        if printed.failed {
            return;
        }
        let progress = printed.printer.progress();
        let pcm = if progress == PROGRESS_DONE {
            printed.printer.pcm()
        } else if progress < 0 {
            log::error!("song print failed, song stays silent");
            printed.failed = true;
            None
        } else if progress >= EARLY_PLAYBACK_PROGRESS
            && printed.requested.elapsed() >= EARLY_PLAYBACK_DELAY
        {
            log::debug!("starting printed song early at {}%", progress);
            Some(printed.printer.pcm_even_if_incomplete())
        } else {
            None
        };
        let Some(pcm) = pcm else {
            return;
        };

        let voice = VerbatimVoice::new(pcm, true).at(printed.start);
        let mut channel = Channel::new(Voice::Verbatim(voice), 0xff, 0, printed.intent);
        channel.song = Some(self.song_generation);
        match self.channels.insert(channel) {
            Ok(id) => printed.channel = Some(id),
            Err(e) => log::warn!("cannot start printed song: {}", e),
        }
    }

    // --- Channels ---

    /// Start a tuned note. Returns `None` without playing anything when
    /// `duration` is zero.
    pub fn play_note(
        &mut self,
        instrument: &Arc<Instrument>,
        pitch: u8,
        trim: u8,
        pan: i8,
        duration: u32,
        intent: Intent,
    ) -> Result<Option<ChannelId>> {
        if duration < 1 {
            return Ok(None);
        }
        let voice = TunedVoice::new(instrument.clone(), pitch, duration, self.config.sample_rate);
        self.channels
            .insert(Channel::new(Voice::Tuned(voice), trim, pan, intent))
            .map(Some)
    }

    /// Start a sampled buffer. Looping plays the buffer's loop region, or
    /// the whole buffer if it has none.
    pub fn play_pcm(
        &mut self,
        pcm: Arc<dyn PcmSource>,
        trim: u8,
        pan: i8,
        looping: bool,
        intent: Intent,
    ) -> Result<ChannelId> {
        let voice = VerbatimVoice::new(pcm, looping);
        self.channels
            .insert(Channel::new(Voice::Verbatim(voice), trim, pan, intent))
    }

    /// Tuned channels skip to their decay; looping buffers finish their
    /// current pass.
    pub fn stop_channel(&mut self, id: ChannelId) -> Result<()> {
        self.channels
            .get_mut(id)
            .ok_or(MixerError::ChannelNotFound)?
            .stop();
        Ok(())
    }

    /// Fade every channel out over `duration` frames, or cut at once if 0.
    pub fn stop_all(&mut self, duration: u32) {
        self.stop_where(duration, |_| true);
    }

    /// Like [`Mixer::stop_all`] but only for tuned channels.
    pub fn stop_all_instruments(&mut self, duration: u32) {
        self.stop_where(duration, Channel::is_tuned);
    }

    /// Like [`Mixer::stop_all`] but only for channels tagged `intent`.
    pub fn stop_by_intent(&mut self, intent: Intent, duration: u32) {
        self.stop_where(duration, |c| c.intent == intent);
    }

    fn stop_where(&mut self, duration: u32, matches: impl Fn(&Channel) -> bool) {
        if duration == 0 {
            self.channels.retain(|_, c| !matches(c));
            return;
        }
        for (_, channel) in self.channels.iter_mut() {
            if matches(channel) {
                channel.fade_out(duration);
            }
        }
    }

    /// Move a channel toward new pitch, trim and pan over `duration` frames,
    /// or set them at once when `duration` is 0.
    pub fn adjust_channel(&mut self, id: ChannelId, pitch: u8, trim: u8, pan: i8, duration: u32) -> Result<()> {
        let rate = self.config.sample_rate;
        self.channels
            .get_mut(id)
            .ok_or(MixerError::ChannelNotFound)?
            .adjust(pitch, trim, pan, duration, rate);
        Ok(())
    }

    pub fn channel(&self, id: ChannelId) -> Option<ChannelInfo> {
        self.channels.get(id).map(|c| ChannelInfo {
            pitch: c.pitch(),
            trim: c.trim,
            pan: c.pan,
            intent: c.intent,
            tuned: c.is_tuned(),
        })
    }

    pub fn count_channels(&self) -> usize {
        self.channels.len()
    }

    /// Set the group trim for `intent`. 0xff leaves it untouched, 0 mutes it.
    pub fn set_intent_trim(&mut self, intent: Intent, trim: u8) {
        self.intent_trims[intent.index()] = trim;
    }

    pub fn intent_trim(&self, intent: Intent) -> u8 {
        self.intent_trims[intent.index()]
    }

    /// Clip counts since the last call.
    pub fn take_clip(&mut self) -> ClipCount {
        mem::take(&mut self.clip)
    }

    // --- Songs ---

    /// Play `song`, fading out whatever song was playing.
    ///
    /// Asking for the current song again does nothing unless `restart` is
    /// set, in which case it starts over.
    pub fn play_song(&mut self, song: &LockedSong, restart: bool, intent: Intent) -> Result<()> {
        if self.current_song().is_some_and(|current| current.same_song(song)) {
            if restart {
                self.restart_song();
            }
            return Ok(());
        }
        self.start_song(song, 0, 0, intent)
    }

    /// Play `song` starting after `beat` beats.
    pub fn play_song_from_beat(&mut self, song: &LockedSong, beat: usize, intent: Intent) -> Result<()> {
        let position = song.position_for_beat(beat).ok_or(ak_ir::Error::IndexOutOfRange {
            what: "beat",
            index: beat,
        })?;
        self.start_song(song, position, beat, intent)
    }

    fn start_song(&mut self, song: &LockedSong, position: usize, beat: usize, intent: Intent) -> Result<()> {
        self.stop_song(self.song_fade_frames());
        self.song_generation = self.song_generation.wrapping_add(1);
        if self.config.print_songs {
            let mut printer = SongPrinter::new(song.clone(), self.config.sample_rate)?;
            printer.begin()?;
            let start = song.frames_before(position, self.config.sample_rate) as usize;
            log::debug!(
                "printing song: tempo {}, {} commands, {} samples",
                song.tempo(),
                song.commands().len(),
                printer.sample_count()
            );
            self.printed = Some(PrintedSong {
                song: song.clone(),
                printer,
                intent,
                start,
                requested: Instant::now(),
                channel: None,
                failed: false,
            });
        } else {
            log::debug!(
                "playing song: tempo {}, {} commands, from position {}",
                song.tempo(),
                song.commands().len(),
                position
            );
            let mut state = SequencerState::new(intent);
            state.beat = beat;
            self.song = Some(SongPlayer {
                song: song.clone(),
                position,
                delay: 0,
                state,
            });
        }
        Ok(())
    }

    fn restart_song(&mut self) {
        if let Some(player) = self.song.as_mut() {
            player.position = 0;
            player.delay = 0;
            player.state.reset();
        }
        if let Some(printed) = self.printed.as_mut() {
            printed.start = 0;
            if let Some(id) = printed.channel.take() {
                self.channels.kill(id);
            }
        }
    }

    /// Stop the current song, fading every channel it started over
    /// `duration` frames.
    pub fn stop_song(&mut self, duration: u32) {
        let player = self.song.take();
        let printed = self.printed.take();
        if player.is_none() && printed.is_none() {
            return;
        }
        let generation = self.song_generation;
        self.stop_where(duration, |c| c.song == Some(generation));
    }

    /// Mark `id` as belonging to the current song.
    fn claim_for_song(&mut self, id: ChannelId) {
        if let Some(channel) = self.channels.get_mut(id) {
            channel.song = Some(self.song_generation);
        }
    }

    fn song_fade_frames(&self) -> u32 {
        ((self.config.sample_rate as u64 * SONG_FADE_MS as u64 / 1000) as u32).max(1)
    }

    pub fn current_song(&self) -> Option<&LockedSong> {
        self.song
            .as_ref()
            .map(|p| &p.song)
            .or_else(|| self.printed.as_ref().map(|p| &p.song))
    }

    /// Print progress of the current song, if it is being printed.
    pub fn song_progress(&self) -> Option<i32> {
        self.printed.as_ref().map(|p| p.printer.progress())
    }

    /// Next command position of a directly played song.
    pub fn song_position(&self) -> Option<usize> {
        self.song.as_ref().map(|p| p.position)
    }

    /// Beats completed in the current pass of a directly played song.
    pub fn song_beat(&self) -> Option<usize> {
        self.song.as_ref().map(|p| p.state.beat)
    }

    /// True once a printed song's buffer is playing.
    pub fn printed_song_playing(&self) -> bool {
        self.printed
            .as_ref()
            .and_then(|p| p.channel)
            .is_some_and(|id| self.channels.contains(id))
    }
}

impl Performer for Mixer {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn play_note(
        &mut self,
        instrument: &Arc<Instrument>,
        pitch: u8,
        trim: u8,
        pan: i8,
        duration: u32,
        intent: Intent,
    ) -> Result<Option<ChannelId>> {
        let id = Mixer::play_note(self, instrument, pitch, trim, pan, duration, intent)?;
        if let Some(id) = id {
            self.claim_for_song(id);
        }
        Ok(id)
    }

    fn play_pcm(
        &mut self,
        pcm: Arc<dyn PcmSource>,
        trim: u8,
        pan: i8,
        looping: bool,
        intent: Intent,
    ) -> Result<ChannelId> {
        let id = Mixer::play_pcm(self, pcm, trim, pan, looping, intent)?;
        self.claim_for_song(id);
        Ok(id)
    }

    fn channel(&self, id: ChannelId) -> Option<ChannelInfo> {
        Mixer::channel(self, id)
    }

    fn adjust_channel(&mut self, id: ChannelId, pitch: u8, trim: u8, pan: i8, duration: u32) -> Result<()> {
        Mixer::adjust_channel(self, id, pitch, trim, pan, duration)
    }

    fn sync(&mut self, token: u16) {
        if let Some(sender) = self.sync.as_mut() {
            sender.send(token);
        }
    }
}

/// Split a sample across L/R. Pan 0 is full on both sides; the far side
/// fades linearly toward the extremes.
fn pan_split(sample: i32, pan: i8) -> (i32, i32) {
    match pan {
        0 => (sample, sample),
        p if p < 0 => (sample, (sample * (128 + p as i32)) >> 7),
        p => ((sample * (127 - p as i32)) >> 7, sample),
    }
}

fn clip(total: i32, counter: &mut u32) -> i16 {
    if total > i16::MAX as i32 {
        *counter = counter.saturating_add(1);
        i16::MAX
    } else if total < i16::MIN as i32 {
        *counter = counter.saturating_add(1);
        i16::MIN
    } else {
        total as i16
    }
}
