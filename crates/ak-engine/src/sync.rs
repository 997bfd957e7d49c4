//! Sync tokens posted by songs for main-thread delivery.
//!
//! A lock-free single-producer, single-consumer queue. The producer lives
//! on the real-time side (attached to a mixer); the consumer is drained by
//! whoever owns the main loop.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Real-time end of the queue.
pub struct SyncSender {
    producer: HeapProd<u16>,
    dropped: u64,
}

/// Main-thread end of the queue.
pub struct SyncReceiver {
    consumer: HeapCons<u16>,
}

/// Create a queue holding up to `capacity` undelivered tokens.
pub fn sync_queue(capacity: usize) -> (SyncSender, SyncReceiver) {
    let (producer, consumer) = HeapRb::<u16>::new(capacity.max(1)).split();
    (
        SyncSender {
            producer,
            dropped: 0,
        },
        SyncReceiver { consumer },
    )
}

impl SyncSender {
    /// Post a token. Returns false if the queue was full and it was dropped.
    pub fn send(&mut self, token: u16) -> bool {
        if self.producer.try_push(token).is_ok() {
            return true;
        }
        self.dropped += 1;
        if self.dropped == 1 {
            log::warn!("sync queue full, dropping token {}", token);
        }
        false
    }

    /// Tokens lost to overflow so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl SyncReceiver {
    pub fn recv(&mut self) -> Option<u16> {
        self.consumer.try_pop()
    }

    pub fn len(&self) -> usize {
        self.consumer.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    /// Hand every pending token to `f`, oldest first.
    pub fn drain(&mut self, mut f: impl FnMut(u16)) {
        while let Some(token) = self.consumer.try_pop() {
            f(token);
        }
    }
}
