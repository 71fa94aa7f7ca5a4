// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Source notes.
//!
//! A note is one byte: a 5-bit type and a 3-bit delta counting bytecode
//! bytes since the previous note. Deltas of 8 or more are spilled into
//! `xdelta` filler notes carrying 6 bits each. A note type has a fixed
//! number of offset operands; an operand is a single byte when it fits in 7
//! bits and three bytes (high bit set on the first) otherwise. The stream
//! ends with a zero byte.

use std::fmt;

use crate::arena::{ArenaBuf, ArenaPool};
use crate::error::Result;

/// Source note types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SrcNoteType {
    /// Terminator, or filler for operand bytes
    Null = 0,
    /// `ifeq` of an if without else
    If,
    /// `ifeq` of an if with else
    IfElse,
    /// `ifeq` closing a while loop test
    While,
    /// for loop: offsets to the condition, update and loop-closing goto
    For,
    /// `goto` of an unlabelled continue
    Continue,
    /// Name or property assignment inside a var declaration
    Var,
    /// Distance from a comma operand's pop to the next expression
    PcDelta,
    /// Compound assignment operator
    AssignOp,
    /// `ifeq` of a conditional expression
    Cond,
    /// Parenthesised expression
    Paren,
    /// Bytecode the decompiler skips
    Hidden,
    /// Distance back to the start of the base expression
    PcBase,
    /// Labelled statement
    Label,
    /// Labelled block statement
    LabelBrace,
    /// End of a labelled block
    EndBrace,
    /// Labelled break
    Break2Label,
    /// Labelled continue
    Cont2Label,
    /// Switch: total length and first case offset
    Switch,
    /// Function definition, atom index operand
    FuncDef,
    /// try: offset to the end of the guarded block
    TryFin,
    /// catch: offset to the end of the guard expression
    Catch,
    /// Source line advanced by one
    Newline,
    /// Absolute source line
    SetLine,
    /// Extended delta filler
    XDelta,
}

const TYPES: [SrcNoteType; 25] = [
    SrcNoteType::Null,
    SrcNoteType::If,
    SrcNoteType::IfElse,
    SrcNoteType::While,
    SrcNoteType::For,
    SrcNoteType::Continue,
    SrcNoteType::Var,
    SrcNoteType::PcDelta,
    SrcNoteType::AssignOp,
    SrcNoteType::Cond,
    SrcNoteType::Paren,
    SrcNoteType::Hidden,
    SrcNoteType::PcBase,
    SrcNoteType::Label,
    SrcNoteType::LabelBrace,
    SrcNoteType::EndBrace,
    SrcNoteType::Break2Label,
    SrcNoteType::Cont2Label,
    SrcNoteType::Switch,
    SrcNoteType::FuncDef,
    SrcNoteType::TryFin,
    SrcNoteType::Catch,
    SrcNoteType::Newline,
    SrcNoteType::SetLine,
    SrcNoteType::XDelta,
];

impl SrcNoteType {
    /// Decodes a type number.
    pub fn from_u8(n: u8) -> Option<Self> {
        TYPES.get(n as usize).copied()
    }

    /// Number of offset operands.
    pub fn arity(self) -> usize {
        use SrcNoteType::*;
        match self {
            For => 3,
            Switch => 2,
            PcDelta | PcBase | Label | LabelBrace | Break2Label | Cont2Label | FuncDef | TryFin
            | Catch | SetLine => 1,
            _ => 0,
        }
    }

    /// Name used by the disassembler.
    pub fn name(self) -> &'static str {
        use SrcNoteType::*;
        match self {
            Null => "null",
            If => "if",
            IfElse => "if-else",
            While => "while",
            For => "for",
            Continue => "continue",
            Var => "var",
            PcDelta => "pcdelta",
            AssignOp => "assignop",
            Cond => "cond",
            Paren => "paren",
            Hidden => "hidden",
            PcBase => "pcbase",
            Label => "label",
            LabelBrace => "labelbrace",
            EndBrace => "endbrace",
            Break2Label => "break2label",
            Cont2Label => "cont2label",
            Switch => "switch",
            FuncDef => "funcdef",
            TryFin => "tryfin",
            Catch => "catch",
            Newline => "newline",
            SetLine => "setline",
            XDelta => "xdelta",
        }
    }
}

impl fmt::Display for SrcNoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bits of delta in an ordinary note.
pub const DELTA_BITS: u32 = 3;
/// Deltas at or above this need xdelta filler.
pub const DELTA_LIMIT: usize = 1 << DELTA_BITS;
const DELTA_MASK: u8 = (DELTA_LIMIT - 1) as u8;
/// Largest delta an xdelta note carries.
pub const XDELTA_MASK: usize = (1 << 6) - 1;
const THREE_BYTE_FLAG: u8 = 0x80;
/// Operands at or above this cannot be encoded.
pub const OFFSET_LIMIT: usize = (THREE_BYTE_FLAG as usize) << 16;

/// Packs a type and a delta below [`DELTA_LIMIT`].
#[inline]
pub fn make_note(kind: SrcNoteType, delta: usize) -> u8 {
    ((kind as u8) << DELTA_BITS) | (delta as u8 & DELTA_MASK)
}

/// Packs an xdelta filler note.
#[inline]
pub fn make_xdelta(delta: usize) -> u8 {
    ((SrcNoteType::XDelta as u8) << DELTA_BITS) | (delta & XDELTA_MASK) as u8
}

/// Type of the note byte `sn`.
#[inline]
pub fn note_type(sn: u8) -> SrcNoteType {
    if is_xdelta(sn) {
        SrcNoteType::XDelta
    } else {
        // Ordinary types never reach the xdelta range.
        SrcNoteType::from_u8(sn >> DELTA_BITS).unwrap_or(SrcNoteType::Null)
    }
}

/// Delta carried by the note byte `sn`.
#[inline]
pub fn note_delta(sn: u8) -> usize {
    if is_xdelta(sn) {
        (sn as usize) & XDELTA_MASK
    } else {
        (sn & DELTA_MASK) as usize
    }
}

#[inline]
fn is_xdelta(sn: u8) -> bool {
    sn >> 6 == 0b11
}

/// Decodes the operand at `at`, returning it with its encoded width.
pub fn read_offset(notes: &[u8], at: usize) -> (usize, usize) {
    let b0 = notes[at];
    if b0 & THREE_BYTE_FLAG != 0 {
        let value = (((b0 & !THREE_BYTE_FLAG) as usize) << 16)
            | ((notes[at + 1] as usize) << 8)
            | notes[at + 2] as usize;
        (value, 3)
    } else {
        (b0 as usize, 1)
    }
}

/// Encoded length of the note starting at `at`, operands included.
pub fn note_length(notes: &[u8], at: usize) -> usize {
    let arity = note_type(notes[at]).arity();
    let mut len = 1;
    for _ in 0..arity {
        len += read_offset(notes, at + len).1;
    }
    len
}

/// Appends a note `delta` bytes after the previous one, spilling into
/// xdelta filler as needed. Returns the index of the note byte.
pub fn append_note(
    notes: &mut ArenaBuf,
    pool: &mut ArenaPool,
    kind: SrcNoteType,
    mut delta: usize,
) -> Result<usize> {
    while delta >= DELTA_LIMIT {
        let x = delta.min(XDELTA_MASK);
        notes.push(pool, make_xdelta(x))?;
        delta -= x;
    }
    let index = notes.len();
    notes.push(pool, make_note(kind, delta))?;
    for _ in 0..kind.arity() {
        notes.push(pool, 0)?;
    }
    Ok(index)
}

/// Sets operand `which` of the note at `index`. The caller has checked
/// `offset < OFFSET_LIMIT`. Widening a one-byte operand inserts two bytes
/// into the stream.
pub fn set_offset(
    notes: &mut ArenaBuf,
    pool: &mut ArenaPool,
    index: usize,
    which: usize,
    offset: usize,
) -> Result<()> {
    debug_assert!(offset < OFFSET_LIMIT);
    let mut at = index + 1;
    {
        let bytes = notes.as_slice(pool)?;
        for _ in 0..which {
            at += read_offset(bytes, at).1;
        }
    }
    let wide = notes.as_slice(pool)?[at] & THREE_BYTE_FLAG != 0;
    if offset > (!THREE_BYTE_FLAG) as usize || wide {
        if !wide {
            notes.insert(pool, at + 1, &[0, 0])?;
        }
        let bytes = notes.as_mut_slice(pool)?;
        bytes[at] = THREE_BYTE_FLAG | (offset >> 16) as u8;
        bytes[at + 1] = (offset >> 8) as u8;
        bytes[at + 2] = offset as u8;
    } else {
        notes.as_mut_slice(pool)?[at] = offset as u8;
    }
    Ok(())
}

/// A decoded note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcNote {
    /// Note type
    pub kind: SrcNoteType,
    /// Delta from the previous note
    pub delta: usize,
    /// Absolute bytecode offset the note annotates
    pub pc: usize,
    /// Offset operands
    pub operands: Vec<usize>,
}

/// Iterates the notes of a terminated stream.
#[derive(Debug, Clone)]
pub struct SrcNotes<'a> {
    notes: &'a [u8],
    at: usize,
    pc: usize,
}

impl<'a> SrcNotes<'a> {
    /// Starts at the beginning of `notes`.
    pub fn new(notes: &'a [u8]) -> Self {
        Self { notes, at: 0, pc: 0 }
    }
}

impl Iterator for SrcNotes<'_> {
    type Item = SrcNote;

    fn next(&mut self) -> Option<SrcNote> {
        let sn = *self.notes.get(self.at)?;
        if sn == 0 {
            return None;
        }
        let kind = note_type(sn);
        let delta = note_delta(sn);
        self.pc += delta;
        let mut operands = Vec::with_capacity(kind.arity());
        let mut len = 1;
        for _ in 0..kind.arity() {
            let (value, width) = read_offset(self.notes, self.at + len);
            operands.push(value);
            len += width;
        }
        self.at += len;
        Some(SrcNote {
            kind,
            delta,
            pc: self.pc,
            operands,
        })
    }
}

/// Maps a bytecode offset to a source line.
pub fn pc_to_line(notes: &[u8], first_line: u32, target: usize) -> u32 {
    let mut line = first_line;
    for note in SrcNotes::new(notes) {
        if note.pc > target {
            break;
        }
        match note.kind {
            SrcNoteType::SetLine => line = note.operands[0] as u32,
            SrcNoteType::Newline => line += 1,
            _ => {}
        }
    }
    line
}
