// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Growable byte buffers carved from an [`ArenaPool`].

use super::{ArenaPool, ArenaSpan};
use crate::error::{Error, Result};

/// A byte vector whose storage lives in an arena pool.
///
/// The buffer does not own its pool; every access takes the pool that
/// allocated it. Storage grows by `chunk` bytes at first and doubles once
/// the buffer is larger than that. Growth goes through [`ArenaPool::grow`],
/// so the old storage is only reclaimed when the pool is released to a mark
/// taken before the buffer was created.
#[derive(Debug, Clone, Copy)]
pub struct ArenaBuf {
    span: Option<ArenaSpan>,
    len: usize,
    chunk: usize,
}

impl ArenaBuf {
    /// Creates an empty buffer; nothing is allocated until the first push.
    pub fn new(chunk: usize) -> Self {
        Self {
            span: None,
            len: 0,
            chunk: chunk.max(1),
        }
    }

    /// Bytes in use.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no bytes are in use.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated capacity.
    pub fn capacity(&self) -> usize {
        self.span.map_or(0, |s| s.len())
    }

    /// Makes room for `additional` more bytes.
    pub fn reserve(&mut self, pool: &mut ArenaPool, additional: usize) -> Result<()> {
        let needed = self.len + additional;
        if needed <= self.capacity() {
            return Ok(());
        }
        let target = if needed <= self.chunk {
            self.chunk
        } else {
            needed.next_power_of_two()
        };
        self.span = Some(match self.span {
            None => pool.allocate(target)?,
            Some(span) => pool.grow(span, target - span.len())?,
        });
        Ok(())
    }

    /// Appends one byte.
    pub fn push(&mut self, pool: &mut ArenaPool, byte: u8) -> Result<()> {
        self.extend(pool, &[byte])
    }

    /// Appends `bytes`.
    pub fn extend(&mut self, pool: &mut ArenaPool, bytes: &[u8]) -> Result<()> {
        self.reserve(pool, bytes.len())?;
        let at = self.len;
        self.storage_mut(pool)?[at..at + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    /// Inserts `bytes` at `at`, shifting the tail up.
    pub fn insert(&mut self, pool: &mut ArenaPool, at: usize, bytes: &[u8]) -> Result<()> {
        self.reserve(pool, bytes.len())?;
        let len = self.len;
        let n = bytes.len();
        let storage = self.storage_mut(pool)?;
        storage.copy_within(at..len, at + n);
        storage[at..at + n].copy_from_slice(bytes);
        self.len += n;
        Ok(())
    }

    /// The bytes in use.
    pub fn as_slice<'p>(&self, pool: &'p ArenaPool) -> Result<&'p [u8]> {
        match self.span {
            None => Ok(&[]),
            Some(span) => match pool.bytes(span) {
                Some(bytes) => Ok(&bytes[..self.len]),
                None => Err(stale(span)),
            },
        }
    }

    /// The bytes in use, mutably.
    pub fn as_mut_slice<'p>(&self, pool: &'p mut ArenaPool) -> Result<&'p mut [u8]> {
        let len = self.len;
        Ok(&mut self.storage_mut(pool)?[..len])
    }

    fn storage_mut<'p>(&self, pool: &'p mut ArenaPool) -> Result<&'p mut [u8]> {
        match self.span {
            None => Ok(&mut []),
            Some(span) => pool.bytes_mut(span).ok_or_else(|| stale(span)),
        }
    }
}

fn stale(span: ArenaSpan) -> Error {
    Error::InvalidHandle {
        kind: "arena span",
        index: span.arena,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::FreeList;
    use std::sync::Arc;

    fn pool() -> ArenaPool {
        ArenaPool::with_free_list("buf", 64, 0, Arc::new(FreeList::new()))
    }

    #[test]
    fn test_push_and_grow() {
        let mut p = pool();
        let mut buf = ArenaBuf::new(4);
        for i in 0..20u8 {
            buf.push(&mut p, i).unwrap();
        }
        assert_eq!(buf.len(), 20);
        assert_eq!(buf.capacity(), 32);
        let expected: Vec<u8> = (0..20).collect();
        assert_eq!(buf.as_slice(&p).unwrap(), &expected[..]);
    }

    #[test]
    fn test_insert_shifts_tail() {
        let mut p = pool();
        let mut buf = ArenaBuf::new(8);
        buf.extend(&mut p, &[1, 2, 5]).unwrap();
        buf.insert(&mut p, 2, &[3, 4]).unwrap();
        assert_eq!(buf.as_slice(&p).unwrap(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_released_buffer_is_stale() {
        let mut p = pool();
        let mark = p.mark();
        let mut buf = ArenaBuf::new(8);
        buf.push(&mut p, 1).unwrap();
        p.release(mark);
        assert!(buf.as_slice(&p).is_err());
    }
}
