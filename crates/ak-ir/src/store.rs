//! Lookup of shared resources by numeric id.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::instrument::Instrument;
use crate::sample::Pcm;
use crate::song::{LockedSong, Song};

/// Numeric id of a stored resource.
pub type ResourceId = u16;

/// Source of resources for [`Song::link`].
pub trait ResourceStore {
    fn pcm(&self, id: ResourceId) -> Option<Arc<Pcm>>;
    fn instrument(&self, id: ResourceId) -> Option<Arc<Instrument>>;
}

/// An in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    pcms: BTreeMap<ResourceId, Arc<Pcm>>,
    instruments: BTreeMap<ResourceId, Arc<Instrument>>,
    songs: BTreeMap<ResourceId, LockedSong>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a buffer, replacing any previous one with the same id.
    pub fn insert_pcm(&mut self, id: ResourceId, pcm: Pcm) -> Arc<Pcm> {
        let pcm = Arc::new(pcm);
        self.pcms.insert(id, pcm.clone());
        pcm
    }

    pub fn insert_instrument(&mut self, id: ResourceId, instrument: Instrument) -> Arc<Instrument> {
        let instrument = Arc::new(instrument);
        self.instruments.insert(id, instrument.clone());
        instrument
    }

    /// Link `song` against this store, lock it and keep it under `id`.
    pub fn insert_song(&mut self, id: ResourceId, mut song: Song) -> Result<LockedSong> {
        song.link(&*self)?;
        let song = song.lock()?;
        self.songs.insert(id, song.clone());
        Ok(song)
    }

    pub fn song(&self, id: ResourceId) -> Option<LockedSong> {
        self.songs.get(&id).cloned()
    }

    pub fn remove_pcm(&mut self, id: ResourceId) -> Option<Arc<Pcm>> {
        self.pcms.remove(&id)
    }

    pub fn remove_instrument(&mut self, id: ResourceId) -> Option<Arc<Instrument>> {
        self.instruments.remove(&id)
    }

    pub fn remove_song(&mut self, id: ResourceId) -> Option<LockedSong> {
        self.songs.remove(&id)
    }
}

impl ResourceStore for MemoryStore {
    fn pcm(&self, id: ResourceId) -> Option<Arc<Pcm>> {
        self.pcms.get(&id).cloned()
    }

    fn instrument(&self, id: ResourceId) -> Option<Arc<Instrument>> {
        self.instruments.get(&id).cloned()
    }
}
