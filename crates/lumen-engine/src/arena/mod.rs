// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Lifetime-based arena pools with mark/release.
//!
//! A pool owns a chain of arenas. Allocation bumps the `avail` cursor of the
//! current arena and moves on to the next one (reclaimed from the shared
//! [`FreeList`] or freshly allocated) when it runs out. Memory is never freed
//! individually: a [`ArenaMark`] captures the allocation point and
//! [`ArenaPool::release`] rolls everything allocated after it back.
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────┐   ┌────────────────────────────┐   ┌──────────────────────┐
//! │ head (0) │ → │ [span][span][span]  [free] │ → │ [span]        [free] │
//! └──────────┘   └────────────────────────────┘   └──────────────────────┘
//!   zero-length    base        avail ↑    limit     current
//! ```
//!
//! Allocations are addressed by [`ArenaSpan`] handles (arena index, offset,
//! length) rather than raw pointers. A span stays valid until the mark that
//! precedes it is released.

mod buf;
mod free_list;
mod stats;

pub use buf::ArenaBuf;
pub use free_list::FreeList;
pub use stats::ArenaStats;

use std::sync::Arc;

use crate::error::{Error, Result};

/// Default alignment, the size of a double.
pub const DEFAULT_ALIGN: usize = std::mem::size_of::<f64>();

/// A contiguous bump-allocated block.
#[derive(Debug)]
struct Arena {
    block: Box<[u8]>,
    base: usize,
    avail: usize,
    limit: usize,
    /// Pool epoch when this arena joined the chain.
    born: u64,
    /// Release floors and the epoch of each, floors strictly increasing.
    cuts: Vec<(usize, u64)>,
}

impl Arena {
    fn head() -> Self {
        Self {
            block: Box::default(),
            base: 0,
            avail: 0,
            limit: 0,
            born: 0,
            cuts: Vec::new(),
        }
    }

    fn new(block: Box<[u8]>, born: u64) -> Self {
        let limit = block.len();
        Self {
            block,
            base: 0,
            avail: 0,
            limit,
            born,
            cuts: Vec::new(),
        }
    }

    #[inline]
    fn room(&self) -> usize {
        self.limit - self.avail
    }

    /// Records a release down to `floor`. A later cut at or below an
    /// earlier floor subsumes it.
    fn cut(&mut self, floor: usize, epoch: u64) {
        while self.cuts.last().is_some_and(|&(f, _)| f >= floor) {
            self.cuts.pop();
        }
        self.cuts.push((floor, epoch));
    }

    /// Whether `span` still names the bytes it was handed out for.
    fn holds(&self, span: &ArenaSpan) -> bool {
        if span.epoch < self.born || span.offset + span.len > self.avail {
            return false;
        }
        let key = span.offset + span.len.max(1);
        let n = self.cuts.partition_point(|&(floor, _)| floor < key);
        n == 0 || self.cuts[n - 1].1 <= span.epoch
    }
}

/// Handle to bytes allocated from an [`ArenaPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaSpan {
    arena: usize,
    offset: usize,
    len: usize,
    epoch: u64,
}

impl ArenaSpan {
    /// Number of bytes the span covers.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the span covers no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A captured allocation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaMark {
    arena: usize,
    avail: usize,
}

/// A pool of arenas with stack-like reclamation.
///
/// A pool is not thread-safe; each one belongs to a single compilation.
/// Only the [`FreeList`] it returns blocks to is shared.
#[derive(Debug)]
pub struct ArenaPool {
    name: String,
    arenas: Vec<Arena>,
    current: usize,
    arena_size: usize,
    mask: usize,
    free_list: Arc<FreeList>,
    stats: ArenaStats,
    epoch: u64,
}

impl ArenaPool {
    /// Creates a pool backed by the process-wide free list.
    ///
    /// `align` is rounded up to a power of two; zero selects [`DEFAULT_ALIGN`].
    pub fn new(name: impl Into<String>, arena_size: usize, align: usize) -> Self {
        Self::with_free_list(name, arena_size, align, FreeList::global())
    }

    /// Creates a pool that recycles blocks through `free_list`.
    pub fn with_free_list(
        name: impl Into<String>,
        arena_size: usize,
        align: usize,
        free_list: Arc<FreeList>,
    ) -> Self {
        let align = if align == 0 { DEFAULT_ALIGN } else { align };
        Self {
            name: name.into(),
            arenas: vec![Arena::head()],
            current: 0,
            arena_size: arena_size.max(1),
            mask: align.next_power_of_two() - 1,
            free_list,
            stats: ArenaStats::default(),
            epoch: 0,
        }
    }

    /// The pool's name, used in statistics output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Growth chunk size.
    pub fn arena_size(&self) -> usize {
        self.arena_size
    }

    /// Alignment mask (alignment minus one).
    pub fn mask(&self) -> usize {
        self.mask
    }

    /// Rounds `n` up to the pool's alignment.
    #[inline]
    pub fn align(&self, n: usize) -> usize {
        (n + self.mask) & !self.mask
    }

    /// Number of arenas in the chain, not counting the head.
    pub fn arena_count(&self) -> usize {
        self.arenas.len() - 1
    }

    /// Bytes handed out and not yet released.
    pub fn used(&self) -> usize {
        self.arenas.iter().map(|a| a.avail - a.base).sum()
    }

    /// Allocation statistics.
    pub fn stats(&self) -> &ArenaStats {
        &self.stats
    }

    /// Allocates `nbytes` (rounded up to the alignment).
    ///
    /// Fresh memory is zeroed; memory recycled by a release or reclaimed from
    /// the free list keeps whatever it held.
    pub fn allocate(&mut self, nbytes: usize) -> Result<ArenaSpan> {
        let nb = self.align(nbytes);
        let mut a = self.current;
        while self.arenas[a].room() < nb {
            if a + 1 < self.arenas.len() {
                a += 1;
                self.current = a;
                continue;
            }
            let block = match self.reclaim(nb) {
                Some(block) => block,
                None => self.new_block(nb)?,
            };
            self.arenas.push(Arena::new(block, self.epoch));
            self.stats.narenas += 1;
            a = self.arenas.len() - 1;
            self.current = a;
        }

        let arena = &mut self.arenas[a];
        let offset = arena.avail;
        arena.avail += nb;
        self.stats.count_allocation(nb);
        Ok(ArenaSpan {
            arena: a,
            offset,
            len: nbytes,
            epoch: self.epoch,
        })
    }

    fn reclaim(&mut self, nb: usize) -> Option<Box<[u8]>> {
        if nb > self.arena_size {
            return None;
        }
        let block = self.free_list.reclaim(self.arena_size)?;
        self.stats.nreclaims += 1;
        tracing::debug!(pool = %self.name, size = self.arena_size, "reclaimed arena from free list");
        Some(block)
    }

    fn new_block(&mut self, nb: usize) -> Result<Box<[u8]>> {
        let size = self.arena_size.max(nb);
        let mut block = Vec::new();
        block.try_reserve_exact(size).map_err(|_| Error::OutOfMemory)?;
        block.resize(size, 0u8);
        self.stats.nmallocs += 1;
        tracing::debug!(pool = %self.name, size, "allocated new arena");
        Ok(block.into_boxed_slice())
    }

    /// Grows an allocation by `incr` bytes.
    ///
    /// When `span` is the last allocation in its arena and the arena has room
    /// the span is extended in place. Otherwise a new span is allocated and
    /// the old contents copied; the old bytes are reclaimed only by a
    /// release.
    pub fn grow(&mut self, span: ArenaSpan, incr: usize) -> Result<ArenaSpan> {
        self.check(span)?;
        let new_len = span.len + incr;
        let end = span.offset + self.align(span.len);
        let new_end = span.offset + self.align(new_len);
        let arena = &mut self.arenas[span.arena];
        if end == arena.avail && new_end <= arena.limit {
            arena.avail = new_end;
            self.stats.count_inplace_growth(span.len, incr);
            return Ok(ArenaSpan {
                len: new_len,
                epoch: self.epoch,
                ..span
            });
        }

        let grown = self.allocate(new_len)?;
        self.copy_span(span, grown);
        self.stats.count_growth(span.len, incr);
        Ok(grown)
    }

    fn copy_span(&mut self, from: ArenaSpan, to: ArenaSpan) {
        let n = from.len.min(to.len);
        if from.arena == to.arena {
            self.arenas[from.arena]
                .block
                .copy_within(from.offset..from.offset + n, to.offset);
            return;
        }
        let (src, dst) = if from.arena < to.arena {
            let (lo, hi) = self.arenas.split_at_mut(to.arena);
            (&lo[from.arena], &mut hi[0])
        } else {
            let (lo, hi) = self.arenas.split_at_mut(from.arena);
            (&hi[0], &mut lo[to.arena])
        };
        dst.block[to.offset..to.offset + n].copy_from_slice(&src.block[from.offset..from.offset + n]);
    }

    fn check(&self, span: ArenaSpan) -> Result<()> {
        match self.arenas.get(span.arena) {
            Some(arena) if arena.holds(&span) => Ok(()),
            _ => Err(Error::InvalidHandle {
                kind: "arena span",
                index: span.arena,
            }),
        }
    }

    /// The bytes of a live span, or `None` if it was released.
    pub fn bytes(&self, span: ArenaSpan) -> Option<&[u8]> {
        let arena = self.arenas.get(span.arena)?;
        if !arena.holds(&span) {
            return None;
        }
        Some(&arena.block[span.offset..span.offset + span.len])
    }

    /// Mutable bytes of a live span, or `None` if it was released.
    pub fn bytes_mut(&mut self, span: ArenaSpan) -> Option<&mut [u8]> {
        let arena = self.arenas.get_mut(span.arena)?;
        if !arena.holds(&span) {
            return None;
        }
        Some(&mut arena.block[span.offset..span.offset + span.len])
    }

    /// Captures the current allocation point.
    pub fn mark(&self) -> ArenaMark {
        ArenaMark {
            arena: self.current,
            avail: self.arenas[self.current].avail,
        }
    }

    /// Frees everything allocated after `mark`.
    ///
    /// Marks must be released in the reverse order they were taken. A mark
    /// that no longer lies inside the chain is ignored.
    pub fn release(&mut self, mark: ArenaMark) {
        let last = self.arenas.len() - 1;
        let Some(arena) = self.arenas.get(mark.arena) else {
            return;
        };
        if mark.avail < arena.base || mark.avail > arena.avail {
            return;
        }
        let avail = self.align(mark.avail).min(arena.limit);
        self.epoch += 1;
        let epoch = self.epoch;
        let arena = &mut self.arenas[mark.arena];
        arena.avail = avail;
        arena.cut(avail, epoch);
        self.stats.nreleases += 1;
        if mark.arena == last {
            self.stats.nfastrels += 1;
        }
        self.free_tail(mark.arena, true);
    }

    /// Returns every arena to the free list for reuse by any pool.
    pub fn free_pool(&mut self) {
        self.free_tail(0, false);
        self.stats.ndeallocs += 1;
    }

    /// Frees every arena outright.
    pub fn finish_pool(&mut self) {
        self.free_tail(0, true);
    }

    fn free_tail(&mut self, head: usize, really_free: bool) {
        let tail = self.arenas.split_off(head + 1);
        self.stats.narenas -= tail.len();
        self.epoch += 1;
        if !really_free && !tail.is_empty() {
            tracing::debug!(pool = %self.name, count = tail.len(), "returning arenas to free list");
            for arena in tail {
                self.free_list.push(arena.block);
            }
        }
        self.current = head;
    }
}
