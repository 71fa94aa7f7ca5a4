// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Property descriptors and the symbols that index them.

use std::fmt;
use std::ops::BitOr;

use serde::Serialize;

use super::{PropId, ScopeId, SymbolId};
use crate::atom::AtomId;

/// A property name: a small integer or an interned atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PropertyKey {
    /// Integer-indexed property
    Int(i32),
    /// Named property
    Atom(AtomId),
}

impl From<AtomId> for PropertyKey {
    fn from(atom: AtomId) -> Self {
        PropertyKey::Atom(atom)
    }
}

/// Native accessor kinds a property can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PropertyOp {
    /// Plain data property stored in its slot
    #[default]
    Stub,
    /// Formal parameter of a function, addressed by `short_id`
    Argument,
    /// Local variable of a function, addressed by `short_id`
    Variable,
}

/// Property attribute bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize)]
pub struct Attrs(u8);

impl Attrs {
    /// No attributes.
    pub const NONE: Attrs = Attrs(0);
    /// Visible to `for-in`.
    pub const ENUMERATE: Attrs = Attrs(0x01);
    /// Assignments are ignored.
    pub const READONLY: Attrs = Attrs(0x02);
    /// Cannot be deleted.
    pub const PERMANENT: Attrs = Attrs(0x04);
    /// Exported to importing scripts.
    pub const EXPORTED: Attrs = Attrs(0x08);

    /// Whether every bit in `other` is set.
    pub fn contains(self, other: Attrs) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bit pattern.
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Attrs {
    type Output = Attrs;

    fn bitor(self, rhs: Attrs) -> Attrs {
        Attrs(self.0 | rhs.0)
    }
}

impl fmt::Display for Attrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Attrs::ENUMERATE, "enumerate"),
            (Attrs::READONLY, "readonly"),
            (Attrs::PERMANENT, "permanent"),
            (Attrs::EXPORTED, "exported"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", set.join("|"))
    }
}

/// A reference-counted property descriptor.
///
/// The descriptor sits on its owning scope's insertion-ordered list and is
/// indexed by one or more [`Symbol`]s. It is destroyed when its reference
/// count falls to zero.
#[derive(Debug, Clone)]
pub struct ScopeProperty {
    pub(crate) nrefs: u32,
    pub(crate) key: PropertyKey,
    pub(crate) getter: PropertyOp,
    pub(crate) setter: PropertyOp,
    pub(crate) slot: u32,
    pub(crate) attrs: Attrs,
    pub(crate) short_id: u16,
    pub(crate) owner: ScopeId,
    pub(crate) prev: Option<PropId>,
    pub(crate) next: Option<PropId>,
    pub(crate) symbols: Vec<SymbolId>,
}

impl ScopeProperty {
    /// The key the property was created under.
    pub fn key(&self) -> PropertyKey {
        self.key
    }

    /// Getter kind.
    pub fn getter(&self) -> PropertyOp {
        self.getter
    }

    /// Setter kind.
    pub fn setter(&self) -> PropertyOp {
        self.setter
    }

    /// Slot in the owning object.
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Attribute bits.
    pub fn attrs(&self) -> Attrs {
        self.attrs
    }

    /// Argument or variable index for [`PropertyOp::Argument`] and
    /// [`PropertyOp::Variable`] properties.
    pub fn short_id(&self) -> u16 {
        self.short_id
    }

    /// Strong references held by symbols.
    pub fn nrefs(&self) -> u32 {
        self.nrefs
    }

    /// Symbols currently indexing this descriptor.
    pub fn symbols(&self) -> &[SymbolId] {
        &self.symbols
    }
}

/// A per-scope index entry pointing at a shared descriptor.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub(crate) key: PropertyKey,
    pub(crate) value: Option<PropId>,
    pub(crate) scope: ScopeId,
}

impl Symbol {
    /// Indexed key.
    pub fn key(&self) -> PropertyKey {
        self.key
    }

    /// The descriptor, if the symbol still points at one.
    pub fn value(&self) -> Option<PropId> {
        self.value
    }

    /// The scope whose store holds this symbol.
    pub fn scope(&self) -> ScopeId {
        self.scope
    }
}
