// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Cross-pool free list of whole arena blocks.
//!
//! Blocks are bucketed by size so a pool looking for a block of its arena
//! size pops one without scanning. With the `threadsafe` feature each bucket
//! is a lock-free queue; the bucket map itself is only write-locked the first
//! time a size is seen.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

#[cfg(feature = "threadsafe")]
#[derive(Debug, Default)]
struct Bucket(crossbeam::queue::SegQueue<Box<[u8]>>);

#[cfg(feature = "threadsafe")]
impl Bucket {
    fn push(&self, block: Box<[u8]>) {
        self.0.push(block);
    }

    fn pop(&self) -> Option<Box<[u8]>> {
        self.0.pop()
    }
}

#[cfg(not(feature = "threadsafe"))]
#[derive(Debug, Default)]
struct Bucket(parking_lot::Mutex<Vec<Box<[u8]>>>);

#[cfg(not(feature = "threadsafe"))]
impl Bucket {
    fn push(&self, block: Box<[u8]>) {
        self.0.lock().push(block);
    }

    fn pop(&self) -> Option<Box<[u8]>> {
        self.0.lock().pop()
    }
}

/// A shared stack of released arena blocks.
#[derive(Debug, Default)]
pub struct FreeList {
    buckets: RwLock<FxHashMap<usize, Arc<Bucket>>>,
    len: AtomicUsize,
}

static GLOBAL: OnceLock<Arc<FreeList>> = OnceLock::new();

impl FreeList {
    /// Creates an empty free list.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide free list shared by pools created with
    /// [`ArenaPool::new`](super::ArenaPool::new).
    pub fn global() -> Arc<FreeList> {
        GLOBAL.get_or_init(|| Arc::new(FreeList::new())).clone()
    }

    /// Number of blocks waiting for reuse.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Whether no blocks are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a block for reuse by any pool with a matching arena size.
    pub fn push(&self, block: Box<[u8]>) {
        let size = block.len();
        let bucket = self.bucket(size);
        bucket.push(block);
        self.len.fetch_add(1, Ordering::AcqRel);
    }

    /// Takes a block whose usable size is exactly `size`.
    pub fn reclaim(&self, size: usize) -> Option<Box<[u8]>> {
        let bucket = self.buckets.read().get(&size).cloned()?;
        let block = bucket.pop()?;
        self.len.fetch_sub(1, Ordering::AcqRel);
        Some(block)
    }

    /// Frees every block on the list, returning how many were freed.
    pub fn drain(&self) -> usize {
        let buckets: Vec<Arc<Bucket>> = self.buckets.read().values().cloned().collect();
        let mut freed = 0;
        for bucket in buckets {
            while bucket.pop().is_some() {
                self.len.fetch_sub(1, Ordering::AcqRel);
                freed += 1;
            }
        }
        if freed > 0 {
            tracing::debug!(freed, "drained arena free list");
        }
        freed
    }

    fn bucket(&self, size: usize) -> Arc<Bucket> {
        if let Some(bucket) = self.buckets.read().get(&size) {
            return bucket.clone();
        }
        self.buckets.write().entry(size).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(size: usize) -> Box<[u8]> {
        vec![0u8; size].into_boxed_slice()
    }

    #[test]
    fn test_reclaim_matches_size() {
        let free = FreeList::new();
        free.push(block(64));
        free.push(block(128));
        assert_eq!(free.len(), 2);
        assert!(free.reclaim(32).is_none());
        assert_eq!(free.reclaim(128).map(|b| b.len()), Some(128));
        assert_eq!(free.len(), 1);
    }

    #[test]
    fn test_drain() {
        let free = FreeList::new();
        for _ in 0..4 {
            free.push(block(16));
        }
        assert_eq!(free.drain(), 4);
        assert!(free.is_empty());
        assert!(free.reclaim(16).is_none());
    }

    #[test]
    fn test_concurrent_push_and_reclaim() {
        let free = Arc::new(FreeList::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let free = free.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        free.push(block(32));
                        free.reclaim(32);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let remaining = free.len();
        assert_eq!(free.drain(), remaining);
    }
}
