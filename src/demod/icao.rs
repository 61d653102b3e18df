//! Recently-seen ICAO address cache
//!
//! Addresses from checksum-validated DF 11/17 frames are remembered for 60
//! seconds and gate the AP brute-force path: an unmasked address is only
//! trusted when the aircraft was heard recently. Eviction is lazy, on
//! lookup; there is no background sweep, so entries that are never queried
//! again can outlive the window. Not an LRU.

use std::collections::HashMap;
use std::time::{Duration, Instant};

const ADDRESS_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
pub struct IcaoCache {
    entries: HashMap<u32, Instant>,
}

impl IcaoCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Record `addr` as seen now, overwriting any previous timestamp.
    pub fn insert(&mut self, addr: u32) {
        self.insert_at(addr, Instant::now());
    }

    pub fn insert_at(&mut self, addr: u32, seen: Instant) {
        self.entries.insert(addr, seen);
    }

    /// True when `addr` was seen within the TTL. A stale entry is evicted
    /// and reported absent.
    pub fn contains(&mut self, addr: u32) -> bool {
        self.contains_at(addr, Instant::now())
    }

    pub fn contains_at(&mut self, addr: u32, now: Instant) -> bool {
        match self.entries.get(&addr) {
            None => false,
            Some(&seen) => {
                if now.duration_since(seen) > ADDRESS_TTL {
                    self.entries.remove(&addr);
                    false
                } else {
                    true
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
