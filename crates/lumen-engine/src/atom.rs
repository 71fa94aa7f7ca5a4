// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Atom interning.
//!
//! The [`AtomTable`] interns literal values for a whole compilation; each
//! compiled unit keeps an [`AtomList`] mapping the atoms it references to
//! dense `u16` indices, which become bytecode immediates.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Serialize;

/// Handle to an interned atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AtomId(u32);

impl AtomId {
    /// Raw table index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a compiled function registered with the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FunctionId(pub(crate) u32);

impl FunctionId {
    /// Raw registry index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An interned literal value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum AtomValue {
    /// Identifier or string literal
    String(Arc<str>),
    /// Integer literal that does not fit an inline opcode
    Int(i32),
    /// Non-integral number, stored by bit pattern
    Double(u64),
    /// Boolean literal (switch case keys)
    Boolean(bool),
    /// Function literal
    Function(FunctionId),
}

impl AtomValue {
    /// Builds a number atom, preferring the integer form.
    pub fn number(value: f64) -> Self {
        match number_to_int(value) {
            Some(i) => AtomValue::Int(i),
            None => AtomValue::Double(value.to_bits()),
        }
    }

    /// The string payload, if this is a string atom.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AtomValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AtomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomValue::String(s) => write!(f, "{:?}", s),
            AtomValue::Int(i) => write!(f, "{}", i),
            AtomValue::Double(bits) => write!(f, "{}", f64::from_bits(*bits)),
            AtomValue::Boolean(b) => write!(f, "{}", b),
            AtomValue::Function(id) => write!(f, "function#{}", id.0),
        }
    }
}

/// Returns `value` as an `i32` when it is integral, in range and not `-0`.
pub fn number_to_int(value: f64) -> Option<i32> {
    if value.fract() != 0.0 || value < i32::MIN as f64 || value > i32::MAX as f64 {
        return None;
    }
    if value == 0.0 && value.is_sign_negative() {
        return None;
    }
    Some(value as i32)
}

/// Interns atoms for one compilation context.
#[derive(Debug, Default)]
pub struct AtomTable {
    map: FxHashMap<AtomValue, AtomId>,
    atoms: Vec<AtomValue>,
}

impl AtomTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `value`, returning the existing atom when already present.
    pub fn intern(&mut self, value: AtomValue) -> AtomId {
        if let Some(&id) = self.map.get(&value) {
            return id;
        }
        let id = AtomId(self.atoms.len() as u32);
        self.atoms.push(value.clone());
        self.map.insert(value, id);
        id
    }

    /// Interns a string.
    pub fn intern_str(&mut self, s: &str) -> AtomId {
        if let Some(&id) = self.map.get(&AtomValue::String(Arc::from(s))) {
            return id;
        }
        self.intern(AtomValue::String(Arc::from(s)))
    }

    /// Looks a string up without interning it.
    pub fn lookup_str(&self, s: &str) -> Option<AtomId> {
        self.map.get(&AtomValue::String(Arc::from(s))).copied()
    }

    /// The value of an atom.
    pub fn get(&self, id: AtomId) -> Option<&AtomValue> {
        self.atoms.get(id.index())
    }

    /// Number of interned atoms.
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// Whether no atoms are interned.
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

/// Upper bound on literals per compiled unit.
pub const ATOM_INDEX_LIMIT: usize = 1 << 16;

/// Per-unit map from atoms to dense bytecode indices.
#[derive(Debug, Default, Clone)]
pub struct AtomList {
    index: FxHashMap<AtomId, u16>,
    order: Vec<AtomId>,
}

impl AtomList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of `atom`, assigning the next one on first use.
    ///
    /// Returns `None` once [`ATOM_INDEX_LIMIT`] atoms are indexed.
    pub fn index_of(&mut self, atom: AtomId) -> Option<u16> {
        if let Some(&i) = self.index.get(&atom) {
            return Some(i);
        }
        if self.order.len() >= ATOM_INDEX_LIMIT {
            return None;
        }
        let i = self.order.len() as u16;
        self.order.push(atom);
        self.index.insert(atom, i);
        Some(i)
    }

    /// Atoms in index order.
    pub fn atoms(&self) -> &[AtomId] {
        &self.order
    }

    /// Number of indexed atoms.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
