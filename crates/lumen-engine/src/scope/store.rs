// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Property-store backends.
//!
//! Small scopes keep their symbols in a self-organizing list: lookups move
//! the hit to the front and additions prepend. Once an addition would bring
//! the list to [`HASH_THRESHOLD`] entries the store is rebuilt as a hash
//! table and never goes back.

use rustc_hash::FxHashMap;

use super::SymbolId;
use super::property::{PropertyKey, Symbol};
use super::slab::Slab;

/// Entry count at which a list store becomes a hash store.
pub const HASH_THRESHOLD: usize = 5;

/// Which backend a scope is currently using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Self-organizing list
    List,
    /// Hash table
    Hash,
}

#[derive(Debug)]
pub(crate) enum PropertyStore {
    List(Vec<SymbolId>),
    Hash(FxHashMap<PropertyKey, SymbolId>),
}

impl Default for PropertyStore {
    fn default() -> Self {
        PropertyStore::List(Vec::new())
    }
}

fn key_of(symbols: &Slab<Symbol>, sym: SymbolId) -> Option<PropertyKey> {
    symbols.get(sym.0).map(|s| s.key)
}

impl PropertyStore {
    pub fn kind(&self) -> StoreKind {
        match self {
            PropertyStore::List(_) => StoreKind::List,
            PropertyStore::Hash(_) => StoreKind::Hash,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PropertyStore::List(list) => list.len(),
            PropertyStore::Hash(table) => table.len(),
        }
    }

    /// Finds the symbol for `key`, moving it to the front of a list store.
    pub fn lookup(&mut self, key: PropertyKey, symbols: &Slab<Symbol>) -> Option<SymbolId> {
        match self {
            PropertyStore::List(list) => {
                let pos = list.iter().position(|&s| key_of(symbols, s) == Some(key))?;
                let sym = list.remove(pos);
                list.insert(0, sym);
                Some(sym)
            }
            PropertyStore::Hash(table) => table.get(&key).copied(),
        }
    }

    /// Finds the symbol for `key` without reordering.
    pub fn find(&self, key: PropertyKey, symbols: &Slab<Symbol>) -> Option<SymbolId> {
        match self {
            PropertyStore::List(list) => list.iter().copied().find(|&s| key_of(symbols, s) == Some(key)),
            PropertyStore::Hash(table) => table.get(&key).copied(),
        }
    }

    /// Whether adding one more entry must first upgrade the store.
    pub fn needs_upgrade(&self) -> bool {
        matches!(self, PropertyStore::List(list) if list.len() + 1 >= HASH_THRESHOLD)
    }

    /// Rebuilds a list store as a hash store.
    pub fn upgrade(&mut self, symbols: &Slab<Symbol>) {
        if let PropertyStore::List(list) = self {
            let mut table = FxHashMap::with_capacity_and_hasher(list.len() * 2, Default::default());
            for &sym in list.iter() {
                if let Some(key) = key_of(symbols, sym) {
                    table.insert(key, sym);
                }
            }
            *self = PropertyStore::Hash(table);
        }
    }

    /// Indexes a freshly allocated symbol.
    pub fn insert(&mut self, key: PropertyKey, sym: SymbolId) {
        match self {
            PropertyStore::List(list) => list.insert(0, sym),
            PropertyStore::Hash(table) => {
                table.insert(key, sym);
            }
        }
    }

    /// Unindexes `key`, returning its symbol.
    pub fn remove(&mut self, key: PropertyKey, symbols: &Slab<Symbol>) -> Option<SymbolId> {
        match self {
            PropertyStore::List(list) => {
                let pos = list.iter().position(|&s| key_of(symbols, s) == Some(key))?;
                Some(list.remove(pos))
            }
            PropertyStore::Hash(table) => table.remove(&key),
        }
    }

    /// Empties the store, resetting it to an empty list.
    pub fn take_all(&mut self) -> Vec<SymbolId> {
        match std::mem::take(self) {
            PropertyStore::List(list) => list,
            PropertyStore::Hash(table) => table.into_values().collect(),
        }
    }

    /// Symbols in store order (list order for a list store).
    pub fn symbols(&self) -> Vec<SymbolId> {
        match self {
            PropertyStore::List(list) => list.clone(),
            PropertyStore::Hash(table) => table.values().copied().collect(),
        }
    }
}
