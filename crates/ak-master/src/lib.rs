//! Facade over the akmix engine.
//!
//! A [`Controller`] owns the mixer behind a lock shared with the output
//! driver, looks resources up by id, and reports what happened on the audio
//! thread (sync tokens, clipping, render failures) when [`Controller::update`]
//! runs on the main thread.

use std::sync::Arc;

use ak_audio::{AudioError, AudioOutput, CpalOutput};
use ak_engine::{sync_queue, SongPrinter, SyncReceiver};
use parking_lot::Mutex;
use thiserror::Error;

// Re-export common types so callers don't need ak-ir/ak-engine directly.
pub use ak_engine::{
    ChannelId, ChannelLayout, ClipCount, Intent, Mixer, MixerConfig, MixerError, SONG_FADE_MS,
};
pub use ak_formats::FormatError;
pub use ak_ir::{LockedSong, MemoryStore, ResourceId, ResourceKind, Song};

/// Result alias for controller operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} {id} not found")]
    NotFound { kind: ResourceKind, id: ResourceId },

    #[error("output runs at {output} Hz, mixer at {mixer} Hz")]
    RateMismatch { output: u32, mixer: u32 },

    #[error("output has {output} channels, mixer has {mixer}")]
    LayoutMismatch { output: u16, mixer: usize },

    /// A failure latched by [`Controller::render`].
    #[error("render failed: {0}")]
    Render(MixerError),

    #[error(transparent)]
    Mixer(#[from] MixerError),

    #[error(transparent)]
    Model(#[from] ak_ir::Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Audio(#[from] AudioError),
}

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    pub mixer: MixerConfig,
    /// Sync tokens buffered between two calls to [`Controller::update`].
    pub sync_queue_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mixer: MixerConfig::default(),
            sync_queue_capacity: 64,
        }
    }
}

/// Handle returned by [`Controller::watch_sync_tokens`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchId(u32);

pub type SyncWatcher = Box<dyn FnMut(u16)>;
pub type ClipCallback = Box<dyn FnMut(ClipCount)>;

/// State shared with the output driver.
struct RenderState {
    mixer: Mixer,
    error: Option<MixerError>,
}

pub struct Controller {
    shared: Arc<Mutex<RenderState>>,
    store: MemoryStore,
    sync: SyncReceiver,
    watchers: Vec<(WatchId, SyncWatcher)>,
    next_watch: u32,
    clip_callback: Option<ClipCallback>,
    output: Option<Box<dyn AudioOutput>>,
}

impl Controller {
    pub fn new(config: ControllerConfig, store: MemoryStore) -> Self {
        let mut mixer = Mixer::new(config.mixer);
        let (tx, rx) = sync_queue(config.sync_queue_capacity);
        mixer.attach_sync(tx);
        Self {
            shared: Arc::new(Mutex::new(RenderState { mixer, error: None })),
            store,
            sync: rx,
            watchers: Vec::new(),
            next_watch: 0,
            clip_callback: None,
            output: None,
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut MemoryStore {
        &mut self.store
    }

    /// Run `f` with the mixer locked.
    pub fn with_mixer<R>(&self, f: impl FnOnce(&mut Mixer) -> R) -> R {
        f(&mut self.shared.lock().mixer)
    }

    // --- Driver side ---

    /// Fill `out` with the next frames. This is the body of the output
    /// callback; failures zero the buffer and are reported by [`update`].
    ///
    /// [`update`]: Controller::update
    pub fn render(&self, out: &mut [i16]) {
        render_shared(&self.shared, out);
    }

    /// A callback that renders through this controller, for handing to an
    /// [`AudioOutput`].
    pub fn render_callback(&self) -> impl FnMut(&mut [i16]) + Send + 'static {
        let shared = self.shared.clone();
        move |out| render_shared(&shared, out)
    }

    /// Drive `output` from this controller's mixer. The output's rate and
    /// channel count must match the mixer's.
    pub fn start_output(&mut self, mut output: impl AudioOutput + 'static) -> Result<()> {
        let (rate, layout) = self.with_mixer(|m| (m.sample_rate(), m.config().layout));
        if output.sample_rate() != rate {
            return Err(Error::RateMismatch {
                output: output.sample_rate(),
                mixer: rate,
            });
        }
        if output.channels() as usize != layout.channels() {
            return Err(Error::LayoutMismatch {
                output: output.channels(),
                mixer: layout.channels(),
            });
        }
        self.stop_output()?;
        output.start(Box::new(self.render_callback()))?;
        self.output = Some(Box::new(output));
        Ok(())
    }

    /// Open the default cpal device and start it.
    pub fn start_default_output(&mut self) -> Result<()> {
        let channels = self.with_mixer(|m| m.config().layout.channels()) as u16;
        let output = CpalOutput::new(channels)?;
        self.start_output(output)
    }

    pub fn stop_output(&mut self) -> Result<()> {
        if let Some(mut output) = self.output.take() {
            output.stop()?;
        }
        Ok(())
    }

    pub fn output(&mut self) -> Option<&mut (dyn AudioOutput + 'static)> {
        self.output.as_deref_mut()
    }

    // --- Main thread ---

    /// Deliver sync tokens to watchers and clip counts to the clip callback,
    /// then report a render failure latched since the last call.
    pub fn update(&mut self) -> Result<()> {
        let (error, clip) = {
            let mut state = self.shared.lock();
            (state.error.take(), state.mixer.take_clip())
        };

        let watchers = &mut self.watchers;
        self.sync.drain(|token| {
            for (_, watcher) in watchers.iter_mut() {
                watcher(token);
            }
        });

        if clip != ClipCount::default() {
            if let Some(callback) = self.clip_callback.as_mut() {
                callback(clip);
            }
        }

        match error {
            Some(e) => Err(Error::Render(e)),
            None => Ok(()),
        }
    }

    pub fn watch_sync_tokens(&mut self, watcher: impl FnMut(u16) + 'static) -> WatchId {
        let id = WatchId(self.next_watch);
        self.next_watch = self.next_watch.wrapping_add(1);
        self.watchers.push((id, Box::new(watcher)));
        id
    }

    /// Returns false if `id` was not watching.
    pub fn unwatch_sync_tokens(&mut self, id: WatchId) -> bool {
        let before = self.watchers.len();
        self.watchers.retain(|(w, _)| *w != id);
        self.watchers.len() != before
    }

    /// Called from [`update`](Controller::update) with the clips counted
    /// since the last call, if any.
    pub fn set_clip_callback(&mut self, callback: Option<ClipCallback>) {
        self.clip_callback = callback;
    }

    // --- Resources ---

    /// Decode a WAV file into the store under `id`.
    pub fn load_wav(&mut self, id: ResourceId, data: &[u8]) -> Result<()> {
        let (pcm, rate) = ak_formats::load_wav(data)?;
        let mixer_rate = self.with_mixer(|m| m.sample_rate());
        if rate != mixer_rate {
            log::warn!("pcm {id} recorded at {rate} Hz plays at {mixer_rate} Hz");
        }
        self.store.insert_pcm(id, pcm);
        Ok(())
    }

    /// Decode an instrument envelope into the store under `id`.
    pub fn load_instrument(&mut self, id: ResourceId, data: &[u8]) -> Result<()> {
        let rate = self.with_mixer(|m| m.sample_rate());
        let instrument = ak_formats::decode_instrument(data, rate)?;
        self.store.insert_instrument(id, instrument);
        Ok(())
    }

    /// Decode a song, link it against the store and keep it under `id`.
    pub fn load_song(&mut self, id: ResourceId, data: &[u8]) -> Result<LockedSong> {
        let rate = self.with_mixer(|m| m.sample_rate());
        let song = ak_formats::decode_song(data, rate)?;
        Ok(self.store.insert_song(id, song)?)
    }

    // --- Playback ---

    pub fn play_sound(&self, id: ResourceId) -> Result<ChannelId> {
        self.play_sound_as(id, 0xff, 0, Intent::SFX)
    }

    pub fn play_sound_as(&self, id: ResourceId, trim: u8, pan: i8, intent: Intent) -> Result<ChannelId> {
        self.play_pcm(id, trim, pan, false, intent)
    }

    pub fn play_loop(&self, id: ResourceId) -> Result<ChannelId> {
        self.play_loop_as(id, 0xff, 0, Intent::SFX)
    }

    pub fn play_loop_as(&self, id: ResourceId, trim: u8, pan: i8, intent: Intent) -> Result<ChannelId> {
        self.play_pcm(id, trim, pan, true, intent)
    }

    fn play_pcm(&self, id: ResourceId, trim: u8, pan: i8, looping: bool, intent: Intent) -> Result<ChannelId> {
        let pcm = ak_ir::ResourceStore::pcm(&self.store, id).ok_or(Error::NotFound {
            kind: ResourceKind::Pcm,
            id,
        })?;
        Ok(self.with_mixer(|m| m.play_pcm(pcm, trim, pan, looping, intent))?)
    }

    /// Play the stored song `id`, restarting it if it is already playing.
    pub fn play_song(&self, id: ResourceId) -> Result<()> {
        self.play_song_as(id, true, Intent::BGM)
    }

    pub fn play_song_as(&self, id: ResourceId, restart: bool, intent: Intent) -> Result<()> {
        let song = self.store.song(id).ok_or(Error::NotFound {
            kind: ResourceKind::Song,
            id,
        })?;
        Ok(self.with_mixer(|m| m.play_song(&song, restart, intent))?)
    }

    /// Fade the current song out over [`SONG_FADE_MS`].
    pub fn stop_song(&self) {
        self.with_mixer(|m| {
            let fade = (m.sample_rate() as u64 * SONG_FADE_MS as u64 / 1000) as u32;
            m.stop_song(fade);
        });
    }

    pub fn stop_channel(&self, id: ChannelId) -> Result<()> {
        Ok(self.with_mixer(|m| m.stop_channel(id))?)
    }

    pub fn set_trim_for_intent(&self, intent: Intent, trim: u8) {
        self.with_mixer(|m| m.set_intent_trim(intent, trim));
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Err(e) = self.stop_output() {
            log::warn!("failed to stop output: {e}");
        }
    }
}

fn render_shared(shared: &Mutex<RenderState>, out: &mut [i16]) {
    let mut state = shared.lock();
    if let Err(e) = state.mixer.update(out) {
        if state.error.is_none() {
            log::error!("mixer update failed: {e}");
            state.error = Some(e);
        }
    }
}

/// Print `song` at `sample_rate` and encode the result as a mono WAV file.
pub fn render_song_to_wav(song: &LockedSong, sample_rate: u32) -> Result<Vec<u8>> {
    let mut printer = SongPrinter::new(song.clone(), sample_rate)?;
    printer.finish()?;
    let pcm = printer.pcm().ok_or(MixerError::PrintFailed)?;
    Ok(ak_formats::samples_to_wav(&pcm.to_vec(), 1, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use ak_audio::NullOutput;
    use ak_ir::{Command, Pcm};

    const RATE: u32 = 1000;

    fn config() -> ControllerConfig {
        ControllerConfig {
            mixer: MixerConfig {
                sample_rate: RATE,
                layout: ChannelLayout::Mono,
                print_songs: false,
                channel_capacity: 8,
            },
            sync_queue_capacity: 4,
        }
    }

    fn store_with_pcm() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert_pcm(7, Pcm::new(vec![1000; 4]).unwrap());
        store
    }

    fn sync_song(tokens: &[u16]) -> Song {
        let mut song = Song::new();
        for &t in tokens {
            song.add_command(Command::Sync(t)).unwrap();
        }
        song.add_command(Command::Delay(100)).unwrap();
        song
    }

    #[test]
    fn play_sound_reads_from_the_store() {
        let controller = Controller::new(config(), store_with_pcm());
        controller.play_sound(7).unwrap();
        let mut out = [0i16; 6];
        controller.render(&mut out);
        // 0xff channel trim scales by 255/256.
        assert_eq!(out, [996, 996, 996, 996, 0, 0]);
    }

    #[test]
    fn missing_resources_are_reported() {
        let controller = Controller::new(config(), MemoryStore::new());
        assert!(matches!(
            controller.play_loop(3),
            Err(Error::NotFound { kind: ResourceKind::Pcm, id: 3 })
        ));
        assert!(matches!(
            controller.play_song(3),
            Err(Error::NotFound { kind: ResourceKind::Song, id: 3 })
        ));
    }

    #[test]
    fn intent_trim_applies_to_sounds() {
        let controller = Controller::new(config(), store_with_pcm());
        controller.set_trim_for_intent(Intent::SFX, 0);
        controller.play_sound(7).unwrap();
        let mut out = [0i16; 2];
        controller.render(&mut out);
        assert_eq!(out, [0, 0]);
    }

    #[test]
    fn render_failures_are_latched_until_update() {
        let mut cfg = config();
        cfg.mixer.layout = ChannelLayout::Stereo;
        let mut controller = Controller::new(cfg, store_with_pcm());
        controller.play_loop(7).unwrap();

        let mut odd = [5i16; 3];
        controller.render(&mut odd);
        assert_eq!(odd, [0, 0, 0]);
        controller.render(&mut odd);

        assert!(matches!(
            controller.update(),
            Err(Error::Render(MixerError::InvalidBufferLength { len: 3, channels: 2 }))
        ));
        assert!(controller.update().is_ok());
    }

    #[test]
    fn sync_tokens_reach_watchers_on_update() {
        let mut store = MemoryStore::new();
        store.insert_song(1, sync_song(&[11, 12])).unwrap();
        let mut controller = Controller::new(config(), store);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let id = controller.watch_sync_tokens(move |t| sink.borrow_mut().push(t));

        controller.play_song(1).unwrap();
        let mut out = [0i16; 4];
        controller.render(&mut out);
        assert!(seen.borrow().is_empty());

        controller.update().unwrap();
        assert_eq!(*seen.borrow(), vec![11, 12]);

        assert!(controller.unwatch_sync_tokens(id));
        assert!(!controller.unwatch_sync_tokens(id));
    }

    #[test]
    fn clip_callback_only_fires_when_clipping() {
        let mut store = MemoryStore::new();
        store.insert_pcm(1, Pcm::new(vec![30000; 4]).unwrap());
        let mut controller = Controller::new(config(), store);

        let clips = Rc::new(RefCell::new(Vec::new()));
        let sink = clips.clone();
        controller.set_clip_callback(Some(Box::new(move |c| sink.borrow_mut().push(c))));

        controller.update().unwrap();
        assert!(clips.borrow().is_empty());

        controller.play_sound(1).unwrap();
        controller.play_sound(1).unwrap();
        let mut out = [0i16; 2];
        controller.render(&mut out);
        assert_eq!(out, [i16::MAX, i16::MAX]);

        controller.update().unwrap();
        assert_eq!(clips.borrow().len(), 1);
        assert_eq!(clips.borrow()[0].left, 2);
    }

    #[test]
    fn stop_song_fades_the_song() {
        let mut store = MemoryStore::new();
        let song = store.insert_song(1, sync_song(&[])).unwrap();
        let controller = Controller::new(config(), store);
        controller.play_song(1).unwrap();
        assert_eq!(song.lock_count(), 3);

        controller.stop_song();
        assert!(controller.with_mixer(|m| m.current_song().is_none()));
        assert_eq!(song.lock_count(), 2);
    }

    #[test]
    fn output_must_match_the_mixer() {
        let mut controller = Controller::new(config(), store_with_pcm());
        assert!(matches!(
            controller.start_output(NullOutput::new(RATE * 2, 1).unwrap()),
            Err(Error::RateMismatch { .. })
        ));
        assert!(matches!(
            controller.start_output(NullOutput::new(RATE, 2).unwrap()),
            Err(Error::LayoutMismatch { output: 2, mixer: 1 })
        ));
    }

    #[test]
    fn render_song_to_wav_is_a_mono_file() {
        let mut song = Song::new();
        song.set_tempo(120).unwrap();
        song.add_command(Command::Beat).unwrap();
        let song = song.lock().unwrap();

        let wav = render_song_to_wav(&song, RATE).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 1);
        assert_eq!(wav.len(), 44 + 2 * 500);
    }
}
