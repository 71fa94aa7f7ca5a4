// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Arena pool metering.

use std::fmt;

/// Per-pool allocation counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArenaStats {
    /// Arenas currently chained into the pool
    pub narenas: usize,
    /// Allocation requests
    pub nallocs: usize,
    /// Arenas reclaimed from the free list
    pub nreclaims: usize,
    /// Fresh blocks obtained from the system allocator
    pub nmallocs: usize,
    /// Whole-pool deallocations
    pub ndeallocs: usize,
    /// Growths that had to copy
    pub ngrows: usize,
    /// Growths satisfied in place
    pub ninplace: usize,
    /// Releases to a mark
    pub nreleases: usize,
    /// Releases whose mark was in the last arena
    pub nfastrels: usize,
    /// Total bytes handed out
    pub nbytes: usize,
    /// Largest single allocation
    pub maxalloc: usize,
    /// Running sum of squared allocation sizes
    pub variance: f64,
}

impl ArenaStats {
    pub(crate) fn count_allocation(&mut self, nb: usize) {
        self.nallocs += 1;
        self.nbytes += nb;
        self.maxalloc = self.maxalloc.max(nb);
        self.variance += (nb * nb) as f64;
    }

    pub(crate) fn count_inplace_growth(&mut self, _size: usize, _incr: usize) {
        self.ninplace += 1;
    }

    pub(crate) fn count_growth(&mut self, size: usize, incr: usize) {
        self.ngrows += 1;
        self.nbytes += incr;
        self.variance -= (size * size) as f64;
        let size = size + incr;
        self.maxalloc = self.maxalloc.max(size);
        self.variance += (size * size) as f64;
    }

    /// Mean allocation size.
    pub fn mean(&self) -> f64 {
        if self.nallocs == 0 {
            return 0.0;
        }
        self.nbytes as f64 / self.nallocs as f64
    }

    /// Standard deviation of allocation sizes.
    pub fn std_dev(&self) -> f64 {
        if self.nallocs == 0 {
            return 0.0;
        }
        let mean = self.mean();
        (self.variance / self.nallocs as f64 - mean * mean).abs().sqrt()
    }
}

impl fmt::Display for ArenaStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "              number of arenas: {}", self.narenas)?;
        writeln!(f, "         number of allocations: {}", self.nallocs)?;
        writeln!(f, " number of free arena reclaims: {}", self.nreclaims)?;
        writeln!(f, "        number of malloc calls: {}", self.nmallocs)?;
        writeln!(f, "       number of deallocations: {}", self.ndeallocs)?;
        writeln!(f, "  number of allocation growths: {}", self.ngrows)?;
        writeln!(f, "    number of in-place growths: {}", self.ninplace)?;
        writeln!(f, "number of released allocations: {}", self.nreleases)?;
        writeln!(f, "       number of fast releases: {}", self.nfastrels)?;
        writeln!(f, "         total bytes allocated: {}", self.nbytes)?;
        writeln!(f, "          mean allocation size: {}", self.mean())?;
        writeln!(f, "            standard deviation: {}", self.std_dev())?;
        write!(f, "       maximum allocation size: {}", self.maxalloc)
    }
}
