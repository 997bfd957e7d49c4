//! Offline rendering of a song into a flat buffer.
//!
//! A [`SongPrinter`] owns its own mono [`Mixer`] and drives it over the whole
//! song, either on a worker thread (`begin`, then poll `progress`) or on the
//! caller's thread (`finish` without `begin`). Progress is published as an
//! integer: -1 failed, 0 idle, 1..=99 rendering, 100 ready.

use std::sync::atomic::{AtomicBool, AtomicI16, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ak_ir::{LockedSong, PcmSource};

use crate::error::{MixerError, Result};
use crate::intent::Intent;
use crate::mixer::{ChannelLayout, Mixer, MixerConfig};

/// Samples rendered between cancellation checks.
pub const PRINT_CHUNK_SAMPLES: usize = 10_000;

pub const PROGRESS_FAILED: i32 = -1;
pub const PROGRESS_IDLE: i32 = 0;
pub const PROGRESS_DONE: i32 = 100;

/// Longest song a printer accepts, in samples.
pub const MAX_PRINT_SAMPLES: u64 = u32::MAX as u64;

/// Printer output buffer.
///
/// Zero-initialized and written once front to back by the printer. Readers
/// may look at it before it is complete; samples not yet written read as
/// silence.
pub struct PrintedPcm {
    samples: Box<[AtomicI16]>,
}

impl PrintedPcm {
    fn new(len: usize) -> Self {
        Self {
            samples: (0..len).map(|_| AtomicI16::new(0)).collect(),
        }
    }

    fn write(&self, offset: usize, samples: &[i16]) {
        for (slot, &sample) in self.samples[offset..].iter().zip(samples) {
            slot.store(sample, Ordering::Relaxed);
        }
    }

    /// Copy out the current contents.
    pub fn to_vec(&self) -> Vec<i16> {
        self.samples
            .iter()
            .map(|s| s.load(Ordering::Relaxed))
            .collect()
    }
}

impl PcmSource for PrintedPcm {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn read_i16(&self, pos: usize) -> i16 {
        self.samples[pos].load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for PrintedPcm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrintedPcm")
            .field("len", &self.samples.len())
            .finish()
    }
}

/// State shared with the worker.
struct PrintJob {
    song: LockedSong,
    sample_rate: u32,
    output: Arc<PrintedPcm>,
    progress: AtomicI32,
    cancel: AtomicBool,
    /// Keeps the worker waiting before its next chunk until cleared or cancelled.
    #[cfg(test)]
    held: AtomicBool,
}

impl PrintJob {
    /// Render the whole song, publishing progress. Leaves progress at 100 on
    /// success and -1 on failure; a cancelled job leaves it untouched.
    fn run(&self) -> Result<()> {
        match self.render() {
            Ok(true) => {
                self.progress.store(PROGRESS_DONE, Ordering::Release);
                log::info!("song printed: {} samples", self.output.len());
                Ok(())
            }
            Ok(false) => {
                log::debug!("song print cancelled");
                Ok(())
            }
            Err(e) => {
                log::error!("song print failed: {}", e);
                self.progress.store(PROGRESS_FAILED, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Returns false if cancelled before the end.
    fn render(&self) -> Result<bool> {
        let mut mixer = Mixer::new(MixerConfig {
            sample_rate: self.sample_rate,
            layout: ChannelLayout::Mono,
            print_songs: false,
            channel_capacity: 32,
        });
        mixer.play_song(&self.song, true, Intent::BGM)?;

        let total = self.output.len();
        let mut scratch = vec![0i16; PRINT_CHUNK_SAMPLES.min(total)];
        let mut written = 0;
        while written < total {
            #[cfg(test)]
            while self.held.load(Ordering::Acquire) && !self.cancel.load(Ordering::Acquire) {
                thread::yield_now();
            }
            if self.cancel.load(Ordering::Acquire) {
                return Ok(false);
            }
            let n = (total - written).min(PRINT_CHUNK_SAMPLES);
            let chunk = &mut scratch[..n];
            mixer.update(chunk)?;
            self.output.write(written, chunk);
            written += n;

            let percent = (written as u64 * 100 / total as u64) as i32;
            self.progress
                .store(percent.clamp(1, PROGRESS_DONE - 1), Ordering::Release);
        }
        Ok(true)
    }
}

/// Renders one song to a buffer, synchronously or on a worker thread.
pub struct SongPrinter {
    job: Arc<PrintJob>,
    worker: Option<JoinHandle<()>>,
}

impl SongPrinter {
    /// Bind a printer to `song`. Fails if the song has no duration.
    pub fn new(song: LockedSong, sample_rate: u32) -> Result<Self> {
        let frames = song.duration_frames(sample_rate);
        if frames == 0 {
            return Err(MixerError::EmptyPrint);
        }
        if frames > MAX_PRINT_SAMPLES {
            return Err(MixerError::PrintTooLong(frames));
        }
        Ok(Self {
            job: Arc::new(PrintJob {
                song,
                sample_rate,
                output: Arc::new(PrintedPcm::new(frames as usize)),
                progress: AtomicI32::new(PROGRESS_IDLE),
                cancel: AtomicBool::new(false),
                #[cfg(test)]
                held: AtomicBool::new(false),
            }),
            worker: None,
        })
    }

    pub fn song(&self) -> &LockedSong {
        &self.job.song
    }

    pub fn progress(&self) -> i32 {
        self.job.progress.load(Ordering::Acquire)
    }

    /// Length of the output buffer.
    pub fn sample_count(&self) -> usize {
        self.job.output.len()
    }

    /// Start rendering on a worker thread.
    pub fn begin(&mut self) -> Result<()> {
        let progress = self.progress();
        if progress != PROGRESS_IDLE || self.worker.is_some() {
            return Err(MixerError::PrinterBusy(progress));
        }
        self.job.cancel.store(false, Ordering::Release);
        self.job.progress.store(1, Ordering::Release);

        let job = self.job.clone();
        let worker = thread::Builder::new()
            .name("ak-songprinter".into())
            .spawn(move || {
                let _ = job.run();
            });
        match worker {
            Ok(handle) => {
                log::debug!("song print started: {} samples", self.sample_count());
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.job.progress.store(PROGRESS_IDLE, Ordering::Release);
                Err(MixerError::Spawn(e))
            }
        }
    }

    /// Block until the print is ready.
    ///
    /// Joins the worker if one is running; otherwise renders on this thread.
    pub fn finish(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                self.job.progress.store(PROGRESS_FAILED, Ordering::Release);
                return Err(MixerError::WorkerPanicked);
            }
        } else if self.progress() == PROGRESS_IDLE {
            self.job.cancel.store(false, Ordering::Release);
            self.job.progress.store(1, Ordering::Release);
            self.job.run()?;
        }
        match self.progress() {
            PROGRESS_DONE => Ok(()),
            _ => Err(MixerError::PrintFailed),
        }
    }

    /// Abort an in-progress print and return to idle. Returns false, doing
    /// nothing, unless a print was underway.
    pub fn cancel(&mut self) -> bool {
        let progress = self.progress();
        if progress <= PROGRESS_IDLE || progress >= PROGRESS_DONE {
            return false;
        }
        self.job.cancel.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.job.cancel.store(false, Ordering::Release);
        self.job.progress.store(PROGRESS_IDLE, Ordering::Release);
        true
    }

    /// The printed buffer, once complete.
    pub fn pcm(&self) -> Option<Arc<PrintedPcm>> {
        (self.progress() == PROGRESS_DONE).then(|| self.job.output.clone())
    }

    /// The buffer as it stands, complete or not.
    pub fn pcm_even_if_incomplete(&self) -> Arc<PrintedPcm> {
        self.job.output.clone()
    }
}

#[cfg(test)]
impl SongPrinter {
    /// Pause or resume the worker between chunks.
    pub(crate) fn hold(&self, held: bool) {
        self.job.held.store(held, Ordering::Release);
    }

    /// Write `samples` at the front of the buffer and publish `progress`,
    /// as a worker part way through would.
    pub(crate) fn publish_partial(&self, progress: i32, samples: &[i16]) {
        self.job.output.write(0, samples);
        self.job.progress.store(progress, Ordering::Release);
    }
}

impl Drop for SongPrinter {
    fn drop(&mut self) {
        self.job.cancel.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ak_ir::{Command, Instrument, Song, Wave};

    const RATE: u32 = 1000;

    fn song(beats: usize) -> LockedSong {
        let mut song = Song::new();
        song.set_tempo(120).unwrap();
        let wave = Arc::new(Wave::sine(RATE as usize).unwrap());
        song.add_instrument(Vec::new(), Arc::new(Instrument::new(10, 10, 10, 1.0, 0.8, wave)))
            .unwrap();
        song.add_command(Command::Note {
            reference: 0,
            instrument: 0,
            trim: 0xff,
            pan: 0,
            pitch: 48,
            duration: beats as u8,
        })
        .unwrap();
        for _ in 0..beats {
            song.add_command(Command::Beat).unwrap();
        }
        song.lock().unwrap()
    }

    #[test]
    fn buffer_covers_every_beat() {
        let printer = SongPrinter::new(song(3), RATE).unwrap();
        assert_eq!(printer.sample_count(), 1500);
        assert_eq!(printer.progress(), PROGRESS_IDLE);
        assert!(printer.pcm().is_none());
    }

    #[test]
    fn song_without_beats_cannot_print() {
        let mut s = Song::new();
        s.add_command(Command::Noop).unwrap();
        assert!(matches!(
            SongPrinter::new(s.lock().unwrap(), RATE),
            Err(MixerError::EmptyPrint)
        ));
    }

    #[test]
    fn finish_without_begin_renders_in_place() {
        let mut printer = SongPrinter::new(song(2), RATE).unwrap();
        printer.finish().unwrap();
        assert_eq!(printer.progress(), PROGRESS_DONE);
        let pcm = printer.pcm().unwrap();
        assert!(pcm.to_vec().iter().any(|&s| s != 0));
    }

    #[test]
    fn begin_then_finish_matches_synchronous_render() {
        let mut sync = SongPrinter::new(song(2), RATE).unwrap();
        sync.finish().unwrap();
        let mut threaded = SongPrinter::new(song(2), RATE).unwrap();
        threaded.begin().unwrap();
        assert!(threaded.progress() > PROGRESS_IDLE);
        threaded.finish().unwrap();
        assert_eq!(
            sync.pcm().unwrap().to_vec(),
            threaded.pcm().unwrap().to_vec()
        );
    }

    #[test]
    fn begin_twice_is_refused() {
        let mut printer = SongPrinter::new(song(1), RATE).unwrap();
        printer.begin().unwrap();
        assert!(matches!(printer.begin(), Err(MixerError::PrinterBusy(_))));
        printer.finish().unwrap();
        assert!(matches!(printer.begin(), Err(MixerError::PrinterBusy(100))));
    }

    #[test]
    fn cancel_after_completion_is_noop() {
        let mut printer = SongPrinter::new(song(1), RATE).unwrap();
        assert!(!printer.cancel());
        printer.finish().unwrap();
        assert!(!printer.cancel());
        assert_eq!(printer.progress(), PROGRESS_DONE);
    }

    #[test]
    fn cancel_returns_to_idle_and_can_retry() {
        let mut printer = SongPrinter::new(song(200), 44100).unwrap();
        printer.hold(true);
        printer.begin().unwrap();
        assert!(printer.cancel());
        assert_eq!(printer.progress(), PROGRESS_IDLE);
        assert!(printer.pcm().is_none());

        printer.hold(false);
        printer.begin().unwrap();
        printer.finish().unwrap();
        assert_eq!(printer.progress(), PROGRESS_DONE);
    }

    #[test]
    fn dropping_a_running_printer_joins_it() {
        let mut printer = SongPrinter::new(song(200), 44100).unwrap();
        printer.begin().unwrap();
        drop(printer);
    }
}
