// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Exception-range notes.

use serde::Serialize;

use crate::arena::{ArenaBuf, ArenaPool};
use crate::error::Result;

/// A guarded bytecode range and the handler that catches exceptions
/// raised inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TryNote {
    /// First guarded byte
    pub start: u32,
    /// Guarded length in bytes
    pub length: u32,
    /// Handler entry point
    pub catch_start: u32,
}

impl TryNote {
    /// Whether `pc` lies inside the guarded range.
    pub fn covers(&self, pc: usize) -> bool {
        let pc = pc as u64;
        let start = self.start as u64;
        pc >= start && pc < start + self.length as u64
    }
}

/// Encoded size of one note.
pub const TRY_NOTE_SIZE: usize = 12;

/// Try notes accumulated by a code generator, stored in its temp pool.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TryNoteBuf {
    buf: ArenaBuf,
}

impl TryNoteBuf {
    pub fn new(chunk_notes: usize) -> Self {
        Self {
            buf: ArenaBuf::new(chunk_notes.max(1) * TRY_NOTE_SIZE),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len() / TRY_NOTE_SIZE
    }

    pub fn push(&mut self, pool: &mut ArenaPool, note: TryNote) -> Result<()> {
        let mut bytes = [0u8; TRY_NOTE_SIZE];
        bytes[0..4].copy_from_slice(&note.start.to_be_bytes());
        bytes[4..8].copy_from_slice(&note.length.to_be_bytes());
        bytes[8..12].copy_from_slice(&note.catch_start.to_be_bytes());
        self.buf.extend(pool, &bytes)
    }

    pub fn to_vec(&self, pool: &ArenaPool) -> Result<Vec<TryNote>> {
        Ok(decode_notes(self.buf.as_slice(pool)?))
    }
}

fn decode_notes(bytes: &[u8]) -> Vec<TryNote> {
    let word = |b: &[u8]| u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
    bytes
        .chunks_exact(TRY_NOTE_SIZE)
        .map(|c| TryNote {
            start: word(&c[0..4]),
            length: word(&c[4..8]),
            catch_start: word(&c[8..12]),
        })
        .collect()
}

/// Serialises notes as a big-endian count followed by the notes.
pub fn encode_try_notes(notes: &[TryNote]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + notes.len() * TRY_NOTE_SIZE);
    out.extend_from_slice(&(notes.len() as u32).to_be_bytes());
    for note in notes {
        out.extend_from_slice(&note.start.to_be_bytes());
        out.extend_from_slice(&note.length.to_be_bytes());
        out.extend_from_slice(&note.catch_start.to_be_bytes());
    }
    out
}

/// Inverse of [`encode_try_notes`]; `None` when the input is truncated.
pub fn decode_try_notes(bytes: &[u8]) -> Option<Vec<TryNote>> {
    let count = u32::from_be_bytes(bytes.get(0..4)?.try_into().ok()?) as usize;
    let body = bytes.get(4..4 + count.checked_mul(TRY_NOTE_SIZE)?)?;
    Some(decode_notes(body))
}
