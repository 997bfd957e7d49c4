//! ChannelPool: allocation and lookup of live channels.

use slotmap::SlotMap;

use crate::channel::Channel;
use crate::error::{MixerError, Result};

slotmap::new_key_type! {
    /// Identifier of a live channel. Stale ids never alias a reused slot.
    pub struct ChannelId;
}

/// Upper bound on simultaneous channels.
pub const MAX_CHANNELS: usize = 1024;

/// Pool of live channels keyed by generation-checked ids.
pub struct ChannelPool {
    channels: SlotMap<ChannelId, Channel>,
}

impl ChannelPool {
    /// Create an empty pool with room for `capacity` channels before it
    /// has to grow.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: SlotMap::with_capacity_and_key(capacity.min(MAX_CHANNELS)),
        }
    }

    /// Add a channel, returning its id.
    pub fn insert(&mut self, channel: Channel) -> Result<ChannelId> {
        if self.channels.len() >= MAX_CHANNELS {
            return Err(MixerError::PoolExhausted(self.channels.len()));
        }
        Ok(self.channels.insert(channel))
    }

    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(id)
    }

    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(id)
    }

    /// Remove a channel immediately. Returns false if it was already gone.
    pub fn kill(&mut self, id: ChannelId) -> bool {
        self.channels.remove(id).is_some()
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.channels.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ChannelId, &mut Channel)> + '_ {
        self.channels.iter_mut()
    }

    /// Keep only channels for which `f` returns true.
    pub fn retain(&mut self, mut f: impl FnMut(ChannelId, &mut Channel) -> bool) {
        self.channels.retain(|id, channel| f(id, channel));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{VerbatimVoice, Voice};
    use crate::intent::Intent;
    use ak_ir::Pcm;
    use std::sync::Arc;

    fn channel() -> Channel {
        let pcm = Arc::new(Pcm::new(vec![1; 10]).unwrap());
        Channel::new(Voice::Verbatim(VerbatimVoice::new(pcm, false)), 0xff, 0, Intent::SFX)
    }

    #[test]
    fn pool_new_is_empty() {
        let pool = ChannelPool::with_capacity(8);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn pool_insert_returns_distinct_ids() {
        let mut pool = ChannelPool::with_capacity(8);
        let a = pool.insert(channel()).unwrap();
        let b = pool.insert(channel()).unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
        assert!(pool.get(a).is_some());
    }

    #[test]
    fn pool_kill_frees_slot() {
        let mut pool = ChannelPool::with_capacity(8);
        let id = pool.insert(channel()).unwrap();
        assert!(pool.kill(id));
        assert!(!pool.kill(id));
        assert!(pool.get(id).is_none());
    }

    #[test]
    fn stale_id_does_not_alias_reused_slot() {
        let mut pool = ChannelPool::with_capacity(1);
        let old = pool.insert(channel()).unwrap();
        pool.kill(old);
        let new = pool.insert(channel()).unwrap();
        assert_ne!(old, new);
        assert!(!pool.contains(old));
        assert!(pool.get_mut(old).is_none());
        assert!(pool.contains(new));
    }

    #[test]
    fn pool_refuses_past_limit() {
        let mut pool = ChannelPool::with_capacity(0);
        for _ in 0..MAX_CHANNELS {
            pool.insert(channel()).unwrap();
        }
        assert!(matches!(pool.insert(channel()), Err(MixerError::PoolExhausted(_))));
    }

    #[test]
    fn pool_retain_removes_rejected() {
        let mut pool = ChannelPool::with_capacity(4);
        let keep = pool.insert(channel()).unwrap();
        let drop = pool.insert(channel()).unwrap();
        pool.retain(|id, _| id == keep);
        assert!(pool.contains(keep));
        assert!(!pool.contains(drop));
    }
}
