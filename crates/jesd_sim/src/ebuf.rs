//! Boundary (elastic) buffer between the device domain and a lane domain.
//!
//! The buffer is a dual-port ring with free-running pointers: the producer
//! writes one word on every device tick and the consumer reads one word on
//! every lane tick. There is no occupancy check and no backpressure; the two
//! domains run at the same nominal rate, and the write pointer starts half a
//! ring ahead of the read pointer so the phase difference between them is
//! absorbed in both directions.
//!
//! Each side takes the link enable through its own synchronizer and parks its
//! pointer while disabled. Stored words are left in place across a restart
//! and are simply overwritten once writing resumes.
//!
//! If the clocks drift apart by more than half the depth, the pointers cross
//! and words are repeated or skipped. That is a configuration limit, not a
//! checked failure.

use crate::cdc::{BitSync, MIN_SYNC_STAGES};
use crate::error::LinkError;

/// A fixed-depth, lossless, order-preserving clock-domain crossing for words.
#[derive(Debug, Clone)]
pub struct BoundaryBuffer<W> {
    storage: Vec<W>,
    write_ptr: usize,
    read_ptr: usize,
    write_active: BitSync<bool>,
    read_active: BitSync<bool>,
}

impl<W: Copy> BoundaryBuffer<W> {
    /// Creates a buffer of `depth` words filled with `fill`.
    ///
    /// `depth` must be a power of two of at least 2; `sync_stages` sets the
    /// synchronizer length on each side's enable input.
    pub fn new(depth: usize, sync_stages: usize, fill: W) -> Result<Self, LinkError> {
        if depth < 2 || !depth.is_power_of_two() {
            return Err(LinkError::InvalidBufferDepth(depth));
        }
        if sync_stages < MIN_SYNC_STAGES {
            return Err(LinkError::TooFewSyncStages(sync_stages));
        }
        Ok(Self {
            storage: vec![fill; depth],
            write_ptr: depth / 2,
            read_ptr: 0,
            write_active: BitSync::new(sync_stages, false),
            read_active: BitSync::new(sync_stages, false),
        })
    }

    /// Returns the buffer depth in words.
    pub fn depth(&self) -> usize {
        self.storage.len()
    }

    /// Producer-domain tick: stores `word` if the write side is enabled.
    pub fn push(&mut self, enable: bool, word: W) {
        if self.write_active.observe(enable) {
            self.storage[self.write_ptr] = word;
            self.write_ptr = (self.write_ptr + 1) % self.storage.len();
        } else {
            self.write_ptr = self.storage.len() / 2;
        }
    }

    /// Consumer-domain tick: returns the next word, or `None` while disabled.
    pub fn pop(&mut self, enable: bool) -> Option<W> {
        if self.read_active.observe(enable) {
            let word = self.storage[self.read_ptr];
            self.read_ptr = (self.read_ptr + 1) % self.storage.len();
            Some(word)
        } else {
            self.read_ptr = 0;
            None
        }
    }

    /// Distance from the read pointer to the write pointer, in words.
    ///
    /// Reads both domains' pointers directly, so it is only meaningful to a
    /// test or debug observer between ticks, never to logic in either domain.
    pub fn pointer_distance(&self) -> usize {
        let depth = self.storage.len();
        (self.write_ptr + depth - self.read_ptr) % depth
    }
}
