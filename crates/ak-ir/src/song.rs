//! Song model: resource tables plus a flat command sequence.
//!
//! A `Song` is freely editable. Locking consumes it and yields a
//! [`LockedSong`], a shared read-only view that the mixer can play. Every
//! clone of a `LockedSong` counts as one lock; the editable song comes back
//! only when the last one is unlocked.

use std::ops::Deref;
use std::sync::Arc;

use crate::error::{Error, LockError, ResourceKind, Result};
use crate::instrument::Instrument;
use crate::sample::Pcm;
use crate::store::{ResourceId, ResourceStore};

/// Tempo of a new song, in beats per minute.
pub const DEFAULT_TEMPO: u16 = 100;

/// Drum table capacity (indices are one byte).
pub const MAX_DRUMS: usize = 255;

/// Instrument table capacity (indices are one byte).
pub const MAX_INSTRUMENTS: usize = 255;

/// Which channel property an [`Command::Adjust`] changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdjustParam {
    Pitch,
    Trim,
    Pan,
}

/// One step of a song.
///
/// `reference` names a slot in the player's channel table: `Note` and `Drum`
/// store the channel they start there and `Adjust` reaches it later.
/// Durations on `Note` and `Adjust` are in beats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Noop,
    /// Wait one beat.
    Beat,
    /// Wait a number of frames.
    Delay(u16),
    /// Post a token to the sync queue.
    Sync(u16),
    Note {
        reference: u8,
        instrument: u8,
        trim: u8,
        pan: i8,
        pitch: u8,
        duration: u8,
    },
    Drum {
        reference: u8,
        drum: u8,
        trim: u8,
        pan: i8,
    },
    Adjust {
        param: AdjustParam,
        reference: u8,
        value: u8,
        duration: u8,
    },
}

/// A drum table entry: a store id and, once linked, the buffer itself.
#[derive(Clone, Debug)]
pub struct DrumSlot {
    pub pcm_id: ResourceId,
    pub pcm: Option<Arc<Pcm>>,
}

/// An instrument table entry.
///
/// Inline instruments carry their envelope encoding so the song can be
/// written back out. External ones carry a store id until linked.
#[derive(Clone, Debug)]
pub struct InstrumentSlot {
    pub encoding: Vec<u8>,
    pub external_id: Option<ResourceId>,
    pub instrument: Option<Arc<Instrument>>,
}

/// An editable song.
#[derive(Clone, Debug)]
pub struct Song {
    tempo: u16,
    drums: Vec<DrumSlot>,
    instruments: Vec<InstrumentSlot>,
    commands: Vec<Command>,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            drums: Vec::new(),
            instruments: Vec::new(),
            commands: Vec::new(),
        }
    }
}

impl Song {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Tempo ---

    pub fn tempo(&self) -> u16 {
        self.tempo
    }

    pub fn set_tempo(&mut self, tempo: u32) -> Result<()> {
        if !(1..=u16::MAX as u32).contains(&tempo) {
            return Err(Error::InvalidTempo(tempo));
        }
        self.tempo = tempo as u16;
        Ok(())
    }

    /// Frames in one beat at the given output rate. Never zero.
    pub fn frames_per_beat(&self, sample_rate: u32) -> u32 {
        ((sample_rate as u64 * 60) / self.tempo.max(1) as u64).max(1) as u32
    }

    // --- Commands ---

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn command(&self, index: usize) -> Option<&Command> {
        self.commands.get(index)
    }

    /// Append a command, returning its position.
    pub fn add_command(&mut self, command: Command) -> Result<usize> {
        self.check_command(&command)?;
        self.commands.push(command);
        Ok(self.commands.len() - 1)
    }

    pub fn insert_command(&mut self, index: usize, command: Command) -> Result<()> {
        if index > self.commands.len() {
            return Err(Error::IndexOutOfRange { what: "command", index });
        }
        self.check_command(&command)?;
        self.commands.insert(index, command);
        Ok(())
    }

    pub fn set_command(&mut self, index: usize, command: Command) -> Result<()> {
        self.check_command(&command)?;
        let slot = self
            .commands
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { what: "command", index })?;
        *slot = command;
        Ok(())
    }

    pub fn remove_command(&mut self, index: usize) -> Result<Command> {
        if index >= self.commands.len() {
            return Err(Error::IndexOutOfRange { what: "command", index });
        }
        Ok(self.commands.remove(index))
    }

    /// Remove all commands and resources, keeping the tempo.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.drums.clear();
        self.instruments.clear();
    }

    fn check_command(&self, command: &Command) -> Result<()> {
        match *command {
            Command::Note { instrument, .. } if instrument as usize >= self.instruments.len() => {
                Err(Error::IndexOutOfRange {
                    what: "instrument",
                    index: instrument as usize,
                })
            }
            Command::Drum { drum, .. } if drum as usize >= self.drums.len() => {
                Err(Error::IndexOutOfRange {
                    what: "drum",
                    index: drum as usize,
                })
            }
            _ => Ok(()),
        }
    }

    // --- Drums ---

    pub fn drums(&self) -> &[DrumSlot] {
        &self.drums
    }

    /// Add an unresolved drum, to be filled in by [`Song::link`].
    pub fn add_drum(&mut self, pcm_id: ResourceId) -> Result<usize> {
        self.push_drum(DrumSlot { pcm_id, pcm: None })
    }

    /// Add a drum whose buffer is already at hand.
    pub fn add_resolved_drum(&mut self, pcm_id: ResourceId, pcm: Arc<Pcm>) -> Result<usize> {
        self.push_drum(DrumSlot {
            pcm_id,
            pcm: Some(pcm),
        })
    }

    fn push_drum(&mut self, slot: DrumSlot) -> Result<usize> {
        if self.drums.len() >= MAX_DRUMS {
            return Err(Error::TableFull("drum"));
        }
        self.drums.push(slot);
        Ok(self.drums.len() - 1)
    }

    /// Point a drum at a different store id. The entry becomes unresolved.
    pub fn set_drum(&mut self, index: usize, pcm_id: ResourceId) -> Result<()> {
        let slot = self
            .drums
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { what: "drum", index })?;
        *slot = DrumSlot { pcm_id, pcm: None };
        Ok(())
    }

    /// Remove a drum. Fails while any command plays it; later drum indices
    /// in commands shift down by one.
    pub fn remove_drum(&mut self, index: usize) -> Result<DrumSlot> {
        if index >= self.drums.len() {
            return Err(Error::IndexOutOfRange { what: "drum", index });
        }
        if let Some(command) = self
            .commands
            .iter()
            .position(|c| matches!(c, Command::Drum { drum, .. } if *drum as usize == index))
        {
            return Err(Error::InUse { what: "drum", index, command });
        }
        for command in &mut self.commands {
            if let Command::Drum { drum, .. } = command {
                if *drum as usize > index {
                    *drum -= 1;
                }
            }
        }
        Ok(self.drums.remove(index))
    }

    // --- Instruments ---

    pub fn instruments(&self) -> &[InstrumentSlot] {
        &self.instruments
    }

    /// Add an inline instrument along with the encoding it was decoded from.
    pub fn add_instrument(&mut self, encoding: Vec<u8>, instrument: Arc<Instrument>) -> Result<usize> {
        if encoding.len() > u8::MAX as usize {
            return Err(Error::EncodingTooLong(encoding.len()));
        }
        self.push_instrument(InstrumentSlot {
            encoding,
            external_id: None,
            instrument: Some(instrument),
        })
    }

    /// Add an instrument to be looked up in a store by [`Song::link`].
    pub fn add_external_instrument(&mut self, id: ResourceId) -> Result<usize> {
        self.push_instrument(InstrumentSlot {
            encoding: Vec::new(),
            external_id: Some(id),
            instrument: None,
        })
    }

    fn push_instrument(&mut self, slot: InstrumentSlot) -> Result<usize> {
        if self.instruments.len() >= MAX_INSTRUMENTS {
            return Err(Error::TableFull("instrument"));
        }
        self.instruments.push(slot);
        Ok(self.instruments.len() - 1)
    }

    pub fn set_instrument(
        &mut self,
        index: usize,
        encoding: Vec<u8>,
        instrument: Arc<Instrument>,
    ) -> Result<()> {
        if encoding.len() > u8::MAX as usize {
            return Err(Error::EncodingTooLong(encoding.len()));
        }
        let slot = self
            .instruments
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { what: "instrument", index })?;
        *slot = InstrumentSlot {
            encoding,
            external_id: None,
            instrument: Some(instrument),
        };
        Ok(())
    }

    /// Remove an instrument. Fails while any note uses it; later instrument
    /// indices in commands shift down by one.
    pub fn remove_instrument(&mut self, index: usize) -> Result<InstrumentSlot> {
        if index >= self.instruments.len() {
            return Err(Error::IndexOutOfRange { what: "instrument", index });
        }
        if let Some(command) = self.commands.iter().position(
            |c| matches!(c, Command::Note { instrument, .. } if *instrument as usize == index),
        ) {
            return Err(Error::InUse { what: "instrument", index, command });
        }
        for command in &mut self.commands {
            if let Command::Note { instrument, .. } = command {
                if *instrument as usize > index {
                    *instrument -= 1;
                }
            }
        }
        Ok(self.instruments.remove(index))
    }

    // --- Timing ---

    /// Number of `Beat` commands.
    pub fn count_beats(&self) -> usize {
        self.commands.iter().filter(|c| matches!(c, Command::Beat)).count()
    }

    /// Length of one pass through the song in frames.
    pub fn duration_frames(&self, sample_rate: u32) -> u64 {
        self.frames_before(self.commands.len(), sample_rate)
    }

    /// Frames elapsed before the command at `position` executes.
    pub fn frames_before(&self, position: usize, sample_rate: u32) -> u64 {
        let beat = self.frames_per_beat(sample_rate) as u64;
        self.commands[..position.min(self.commands.len())]
            .iter()
            .map(|c| match c {
                Command::Beat => beat,
                Command::Delay(n) => *n as u64,
                _ => 0,
            })
            .sum()
    }

    /// Command position just after `beat` beats have elapsed.
    /// `None` if the song is shorter than that.
    pub fn position_for_beat(&self, beat: usize) -> Option<usize> {
        if beat == 0 {
            return Some(0);
        }
        let mut seen = 0;
        for (i, command) in self.commands.iter().enumerate() {
            if matches!(command, Command::Beat) {
                seen += 1;
                if seen == beat {
                    return Some(i + 1);
                }
            }
        }
        None
    }

    /// Number of beats elapsed before the command at `position`.
    pub fn beat_at_position(&self, position: usize) -> usize {
        self.commands[..position.min(self.commands.len())]
            .iter()
            .filter(|c| matches!(c, Command::Beat))
            .count()
    }

    // --- Linking and locking ---

    /// True when no drum or instrument is waiting on a store.
    pub fn is_linked(&self) -> bool {
        self.first_unresolved().is_none()
    }

    fn first_unresolved(&self) -> Option<Error> {
        if let Some(index) = self.drums.iter().position(|d| d.pcm.is_none()) {
            return Some(Error::UnresolvedDrum {
                index,
                id: self.drums[index].pcm_id,
            });
        }
        self.instruments
            .iter()
            .position(|i| i.instrument.is_none())
            .map(|index| Error::UnresolvedInstrument { index })
    }

    /// Resolve every placeholder against `store`.
    ///
    /// Entries that are already resolved are left alone, so linking twice is
    /// harmless. Stops at the first id the store does not have.
    pub fn link(&mut self, store: &dyn ResourceStore) -> Result<()> {
        for drum in self.drums.iter_mut().filter(|d| d.pcm.is_none()) {
            match store.pcm(drum.pcm_id) {
                Some(pcm) => drum.pcm = Some(pcm),
                None => {
                    log::error!("song link failed: pcm {} not found", drum.pcm_id);
                    return Err(Error::MissingResource {
                        kind: ResourceKind::Pcm,
                        id: drum.pcm_id,
                    });
                }
            }
        }
        for (index, slot) in self
            .instruments
            .iter_mut()
            .enumerate()
            .filter(|(_, s)| s.instrument.is_none())
        {
            let Some(id) = slot.external_id else {
                log::error!("song link failed: instrument {} has no source", index);
                return Err(Error::UnresolvedInstrument { index });
            };
            match store.instrument(id) {
                Some(instrument) => slot.instrument = Some(instrument),
                None => {
                    log::error!("song link failed: instrument {} not found", id);
                    return Err(Error::MissingResource {
                        kind: ResourceKind::Instrument,
                        id,
                    });
                }
            }
        }
        Ok(())
    }

    /// Freeze the song for playback.
    ///
    /// Fails if there are no commands or anything is unresolved; the song is
    /// handed back inside the error.
    pub fn lock(self) -> std::result::Result<LockedSong, LockError> {
        let problem = if self.commands.is_empty() {
            Some(Error::EmptySong)
        } else {
            self.first_unresolved()
        };
        match problem {
            Some(error) => Err(LockError { error, song: self }),
            None => Ok(LockedSong(Arc::new(self))),
        }
    }
}

/// A shared, read-only song ready for playback.
#[derive(Clone, Debug)]
pub struct LockedSong(Arc<Song>);

impl LockedSong {
    /// Number of outstanding locks, one per live clone.
    pub fn lock_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Give up this lock. Returns the editable song if it was the last one;
    /// otherwise the lock is dropped and the count falls by one.
    pub fn unlock(self) -> Option<Song> {
        Arc::try_unwrap(self.0).ok()
    }

    /// True if both views are locks on the same song.
    pub fn same_song(&self, other: &LockedSong) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for LockedSong {
    type Target = Song;

    fn deref(&self) -> &Song {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Wave;
    use crate::store::MemoryStore;

    fn tone() -> Arc<Instrument> {
        let wave = Arc::new(Wave::sine(16).unwrap());
        Arc::new(Instrument::new(1, 1, 1, 1.0, 0.5, wave))
    }

    fn note(instrument: u8) -> Command {
        Command::Note {
            reference: 0,
            instrument,
            trim: 0x80,
            pan: 0,
            pitch: 48,
            duration: 1,
        }
    }

    fn drum(drum: u8) -> Command {
        Command::Drum {
            reference: 1,
            drum,
            trim: 0x80,
            pan: 0,
        }
    }

    #[test]
    fn new_song_uses_default_tempo() {
        let song = Song::new();
        assert_eq!(song.tempo(), DEFAULT_TEMPO);
        assert_eq!(song.frames_per_beat(44100), 26460);
    }

    #[test]
    fn tempo_range_is_enforced() {
        let mut song = Song::new();
        assert_eq!(song.set_tempo(0), Err(Error::InvalidTempo(0)));
        assert_eq!(song.set_tempo(70000), Err(Error::InvalidTempo(70000)));
        song.set_tempo(120).unwrap();
        assert_eq!(song.frames_per_beat(44100), 22050);
    }

    #[test]
    fn commands_must_reference_existing_tables() {
        let mut song = Song::new();
        assert!(song.add_command(note(0)).is_err());
        assert!(song.add_command(drum(0)).is_err());
        song.add_instrument(vec![0; 10], tone()).unwrap();
        song.add_resolved_drum(7, Arc::new(Pcm::new(vec![1]).unwrap())).unwrap();
        assert_eq!(song.add_command(note(0)), Ok(0));
        assert_eq!(song.add_command(drum(0)), Ok(1));
    }

    #[test]
    fn command_editing() {
        let mut song = Song::new();
        song.add_command(Command::Beat).unwrap();
        song.insert_command(0, Command::Sync(3)).unwrap();
        song.set_command(1, Command::Delay(10)).unwrap();
        assert_eq!(song.commands(), &[Command::Sync(3), Command::Delay(10)]);
        assert_eq!(song.remove_command(0), Ok(Command::Sync(3)));
        assert!(song.remove_command(5).is_err());
        assert!(song.insert_command(9, Command::Noop).is_err());
    }

    #[test]
    fn remove_drum_refuses_while_played_and_shifts_others() {
        let mut song = Song::new();
        song.add_drum(1).unwrap();
        song.add_drum(2).unwrap();
        song.add_command(drum(1)).unwrap();
        assert!(matches!(song.remove_drum(1), Err(Error::InUse { command: 0, .. })));
        song.remove_drum(0).unwrap();
        assert_eq!(song.commands()[0], drum(0));
        assert_eq!(song.drums()[0].pcm_id, 2);
    }

    #[test]
    fn remove_instrument_shifts_notes() {
        let mut song = Song::new();
        song.add_instrument(Vec::new(), tone()).unwrap();
        song.add_instrument(Vec::new(), tone()).unwrap();
        song.add_command(note(1)).unwrap();
        assert!(song.remove_instrument(1).is_err());
        song.remove_instrument(0).unwrap();
        assert_eq!(song.commands()[0], note(0));
    }

    #[test]
    fn drum_table_is_bounded() {
        let mut song = Song::new();
        for id in 0..MAX_DRUMS {
            song.add_drum(id as u16).unwrap();
        }
        assert_eq!(song.add_drum(999), Err(Error::TableFull("drum")));
    }

    #[test]
    fn oversized_instrument_encoding_is_rejected() {
        let mut song = Song::new();
        assert_eq!(
            song.add_instrument(vec![0; 256], tone()),
            Err(Error::EncodingTooLong(256))
        );
    }

    #[test]
    fn beat_positions() {
        let mut song = Song::new();
        for c in [Command::Sync(1), Command::Beat, Command::Noop, Command::Beat] {
            song.add_command(c).unwrap();
        }
        assert_eq!(song.count_beats(), 2);
        assert_eq!(song.position_for_beat(0), Some(0));
        assert_eq!(song.position_for_beat(1), Some(2));
        assert_eq!(song.position_for_beat(2), Some(4));
        assert_eq!(song.position_for_beat(3), None);
        assert_eq!(song.beat_at_position(3), 1);
        assert_eq!(song.beat_at_position(99), 2);
    }

    #[test]
    fn duration_counts_beats_and_delays() {
        let mut song = Song::new();
        song.set_tempo(120).unwrap();
        song.add_command(Command::Beat).unwrap();
        song.add_command(Command::Delay(100)).unwrap();
        song.add_command(Command::Beat).unwrap();
        assert_eq!(song.duration_frames(44100), 44200);
        assert_eq!(song.frames_before(1, 44100), 22050);
        assert_eq!(song.frames_before(2, 44100), 22150);
    }

    #[test]
    fn lock_rejects_empty_song() {
        let err = Song::new().lock().unwrap_err();
        assert_eq!(err.error, Error::EmptySong);
    }

    #[test]
    fn lock_rejects_unresolved_references() {
        let mut song = Song::new();
        song.add_drum(4).unwrap();
        song.add_command(Command::Beat).unwrap();
        let err = song.lock().unwrap_err();
        assert_eq!(err.error, Error::UnresolvedDrum { index: 0, id: 4 });

        let mut song = err.song;
        song.remove_drum(0).unwrap();
        song.add_external_instrument(9).unwrap();
        let err = song.lock().unwrap_err();
        assert_eq!(err.error, Error::UnresolvedInstrument { index: 0 });
    }

    #[test]
    fn lock_is_reentrant_and_unlock_returns_song_last() {
        let mut song = Song::new();
        song.add_command(Command::Beat).unwrap();
        let first = song.lock().unwrap();
        let second = first.clone();
        assert_eq!(first.lock_count(), 2);
        assert!(first.same_song(&second));

        assert!(first.unlock().is_none());
        assert_eq!(second.lock_count(), 1);
        let mut song = second.unlock().unwrap();
        song.add_command(Command::Beat).unwrap();
        assert_eq!(song.commands().len(), 2);
    }

    #[test]
    fn link_resolves_from_store_and_is_idempotent() {
        let mut store = MemoryStore::new();
        store.insert_pcm(3, Pcm::new(vec![1, 2, 3]).unwrap());
        store.insert_instrument(8, Instrument::clone(&tone()));

        let mut song = Song::new();
        song.add_drum(3).unwrap();
        song.add_external_instrument(8).unwrap();
        assert!(!song.is_linked());
        song.link(&store).unwrap();
        assert!(song.is_linked());

        let pcm = song.drums()[0].pcm.clone().unwrap();
        song.link(&MemoryStore::new()).unwrap();
        assert!(Arc::ptr_eq(&pcm, song.drums()[0].pcm.as_ref().unwrap()));
    }

    #[test]
    fn link_reports_missing_id() {
        let mut song = Song::new();
        song.add_drum(42).unwrap();
        assert_eq!(
            song.link(&MemoryStore::new()),
            Err(Error::MissingResource {
                kind: ResourceKind::Pcm,
                id: 42
            })
        );
        assert!(!song.is_linked());
    }
}
