// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Objects, scopes and the property store.
//!
//! An [`ObjectSpace`] owns every object, scope, property descriptor and
//! symbol of a compilation, addressed by typed indices. A scope is the
//! property table behind one or more objects of the same shape: a new object
//! whose prototype has the same class shares the prototype's scope until it
//! defines a property of its own, at which point [`ObjectSpace::get_mutable_scope`]
//! gives it a private one.
//!
//! Property descriptors ([`ScopeProperty`]) are reference counted by the
//! symbols that index them, so one descriptor can be reachable under several
//! keys or from several scopes. A descriptor is destroyed when the last
//! symbol lets go of it; its slot is only returned to the owning object while
//! that scope still has one.

mod property;
mod slab;
mod store;

pub use property::{Attrs, PropertyKey, PropertyOp, ScopeProperty, Symbol};
pub use store::{HASH_THRESHOLD, StoreKind};

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::{Error, Result};
use slab::Slab;
use store::PropertyStore;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(pub(crate) u32);

        impl $name {
            const KIND: &'static str = $kind;

            /// Raw slab index.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

handle!(
    /// Handle to an object.
    ObjectId,
    "object"
);
handle!(
    /// Handle to a scope.
    ScopeId,
    "scope"
);
handle!(
    /// Handle to a property descriptor.
    PropId,
    "property"
);
handle!(
    /// Handle to a symbol.
    SymbolId,
    "symbol"
);

/// Reserved slot holding the prototype.
pub const SLOT_PROTO: u32 = 0;
/// Reserved slot holding the parent (scope chain link).
pub const SLOT_PARENT: u32 = 1;
/// Reserved slot holding the class.
pub const SLOT_CLASS: u32 = 2;
/// Reserved slot for classes with private data.
pub const SLOT_PRIVATE: u32 = 3;
/// Slot count of a fresh object map.
pub const INITIAL_NSLOTS: u32 = 5;

/// Static description of an object class.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Class {
    /// Class name
    pub name: &'static str,
    /// Whether instances reserve [`SLOT_PRIVATE`]
    pub has_private: bool,
}

impl Class {
    /// Plain objects.
    pub const OBJECT: Class = Class {
        name: "Object",
        has_private: false,
    };

    /// Function objects; the private slot holds the compiled function.
    pub const FUNCTION: Class = Class {
        name: "Function",
        has_private: true,
    };

    /// First slot available to properties.
    pub fn first_free_slot(&self) -> u32 {
        if self.has_private { SLOT_PRIVATE + 1 } else { SLOT_PRIVATE }
    }
}

/// Value stored in an object slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotValue {
    /// Unset
    Void,
    /// Object reference (prototype, parent)
    Object(ObjectId),
    /// The object's class
    Class(&'static Class),
}

/// Object-map header shared by every object using a scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMap {
    /// Objects holding the map
    pub nrefs: u32,
    /// Class of the objects using the map
    pub class: &'static Class,
    /// Allocated slot count
    pub nslots: u32,
    /// Next slot to hand out
    pub freeslot: u32,
}

impl ObjectMap {
    fn new(nrefs: u32, class: &'static Class) -> Self {
        Self {
            nrefs,
            class,
            nslots: INITIAL_NSLOTS,
            freeslot: class.first_free_slot(),
        }
    }
}

#[derive(Debug)]
struct Object {
    map: ScopeId,
    slots: Vec<SlotValue>,
}

/// A property table.
#[derive(Debug)]
pub struct Scope {
    map: ObjectMap,
    object: Option<ObjectId>,
    first: Option<PropId>,
    last: Option<PropId>,
    store: PropertyStore,
}

impl Scope {
    /// The object-map header.
    pub fn map(&self) -> &ObjectMap {
        &self.map
    }

    /// The owning object; `None` once the scope has been shared and its
    /// owner moved to a private scope.
    pub fn object(&self) -> Option<ObjectId> {
        self.object
    }

    /// Active store backend.
    pub fn store_kind(&self) -> StoreKind {
        self.store.kind()
    }

    /// Number of indexed keys.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the scope indexes no keys.
    pub fn is_empty(&self) -> bool {
        self.store.len() == 0
    }
}

/// Weak cache of `(scope, key)` lookups.
#[derive(Debug, Default)]
struct PropertyCache {
    entries: FxHashMap<(ScopeId, PropertyKey), PropId>,
    hits: usize,
    misses: usize,
}

impl PropertyCache {
    fn get(&mut self, scope: ScopeId, key: PropertyKey) -> Option<PropId> {
        let hit = self.entries.get(&(scope, key)).copied();
        match hit {
            Some(_) => self.hits += 1,
            None => self.misses += 1,
        }
        hit
    }

    fn fill(&mut self, scope: ScopeId, key: PropertyKey, prop: PropId) {
        self.entries.insert((scope, key), prop);
    }

    fn flush_key(&mut self, scope: ScopeId, key: PropertyKey) {
        self.entries.remove(&(scope, key));
    }

    fn flush_prop(&mut self, prop: PropId) {
        self.entries.retain(|_, p| *p != prop);
    }

    fn flush_scope(&mut self, scope: ScopeId) {
        self.entries.retain(|(s, _), _| *s != scope);
    }
}

/// Owner of all objects, scopes and properties of a compilation.
#[derive(Debug, Default)]
pub struct ObjectSpace {
    objects: Slab<Object>,
    scopes: Slab<Scope>,
    props: Slab<ScopeProperty>,
    symbols: Slab<Symbol>,
    cache: PropertyCache,
}

fn invalid<T>(kind: &'static str, index: u32) -> Result<T> {
    Err(Error::InvalidHandle {
        kind,
        index: index as usize,
    })
}

impl ObjectSpace {
    /// Creates an empty space.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Handle access
    // ========================================================================

    fn object(&self, id: ObjectId) -> Result<&Object> {
        match self.objects.get(id.0) {
            Some(obj) => Ok(obj),
            None => invalid(ObjectId::KIND, id.0),
        }
    }

    fn object_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        match self.objects.get_mut(id.0) {
            Some(obj) => Ok(obj),
            None => invalid(ObjectId::KIND, id.0),
        }
    }

    /// Looks up a scope.
    pub fn scope(&self, id: ScopeId) -> Result<&Scope> {
        match self.scopes.get(id.0) {
            Some(scope) => Ok(scope),
            None => invalid(ScopeId::KIND, id.0),
        }
    }

    fn scope_mut(&mut self, id: ScopeId) -> Result<&mut Scope> {
        match self.scopes.get_mut(id.0) {
            Some(scope) => Ok(scope),
            None => invalid(ScopeId::KIND, id.0),
        }
    }

    /// Looks up a property descriptor.
    pub fn property(&self, id: PropId) -> Result<&ScopeProperty> {
        match self.props.get(id.0) {
            Some(prop) => Ok(prop),
            None => invalid(PropId::KIND, id.0),
        }
    }

    fn property_mut(&mut self, id: PropId) -> Result<&mut ScopeProperty> {
        match self.props.get_mut(id.0) {
            Some(prop) => Ok(prop),
            None => invalid(PropId::KIND, id.0),
        }
    }

    /// Looks up a symbol.
    pub fn symbol(&self, id: SymbolId) -> Result<&Symbol> {
        match self.symbols.get(id.0) {
            Some(sym) => Ok(sym),
            None => invalid(SymbolId::KIND, id.0),
        }
    }

    /// Whether the property descriptor is still alive.
    pub fn is_live_property(&self, id: PropId) -> bool {
        self.props.contains(id.0)
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of live scopes.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Cache hit and miss counts.
    pub fn cache_stats(&self) -> (usize, usize) {
        (self.cache.hits, self.cache.misses)
    }

    // ========================================================================
    // Objects and maps
    // ========================================================================

    /// Creates an object.
    ///
    /// When `proto` has the same class the new object shares its scope.
    pub fn new_object(
        &mut self,
        class: &'static Class,
        proto: Option<ObjectId>,
        parent: Option<ObjectId>,
    ) -> Result<ObjectId> {
        let shared = match proto {
            Some(p) => {
                let map = self.object(p)?.map;
                (self.scope(map)?.map.class == class).then_some(map)
            }
            None => None,
        };

        let id = ObjectId(self.objects.next_key());
        let map = match shared {
            Some(map) => map,
            None => self.new_scope(class, Some(id)),
        };
        self.hold_object_map(map)?;
        let nslots = self.scope(map)?.map.nslots;

        let mut slots = vec![SlotValue::Void; nslots as usize];
        slots[SLOT_PROTO as usize] = proto.map_or(SlotValue::Void, SlotValue::Object);
        slots[SLOT_PARENT as usize] = parent.map_or(SlotValue::Void, SlotValue::Object);
        slots[SLOT_CLASS as usize] = SlotValue::Class(class);
        let inserted = self.objects.insert(Object { map, slots });
        debug_assert_eq!(inserted, id.0);
        Ok(id)
    }

    /// Releases an object's hold on its map.
    pub fn finalize_object(&mut self, obj: ObjectId) -> Result<()> {
        let map = self.object(obj)?.map;
        self.drop_object_map(map, obj)?;
        self.objects.remove(obj.0);
        Ok(())
    }

    /// The scope an object currently uses.
    pub fn object_scope(&self, obj: ObjectId) -> Result<ScopeId> {
        Ok(self.object(obj)?.map)
    }

    /// The object's prototype.
    pub fn prototype(&self, obj: ObjectId) -> Result<Option<ObjectId>> {
        Ok(match self.slot(obj, SLOT_PROTO)? {
            SlotValue::Object(proto) => Some(proto),
            _ => None,
        })
    }

    /// Reads a slot.
    pub fn slot(&self, obj: ObjectId, slot: u32) -> Result<SlotValue> {
        match self.object(obj)?.slots.get(slot as usize) {
            Some(value) => Ok(*value),
            None => invalid("slot", slot),
        }
    }

    /// Allocated slot count of the object.
    pub fn slot_count(&self, obj: ObjectId) -> Result<usize> {
        Ok(self.object(obj)?.slots.len())
    }

    /// Creates a scope with an empty list store.
    pub fn new_scope(&mut self, class: &'static Class, object: Option<ObjectId>) -> ScopeId {
        ScopeId(self.scopes.insert(Scope {
            map: ObjectMap::new(0, class),
            object,
            first: None,
            last: None,
            store: PropertyStore::default(),
        }))
    }

    /// Adds a reference to a map.
    pub fn hold_object_map(&mut self, map: ScopeId) -> Result<()> {
        self.scope_mut(map)?.map.nrefs += 1;
        Ok(())
    }

    /// Drops `obj`'s reference to `map`.
    ///
    /// The scope is destroyed when its last reference goes; otherwise, if
    /// `obj` owned it, the scope is severed from its object. Returns the
    /// scope if it survives.
    pub fn drop_object_map(&mut self, map: ScopeId, obj: ObjectId) -> Result<Option<ScopeId>> {
        let scope = self.scope_mut(map)?;
        scope.map.nrefs = scope.map.nrefs.saturating_sub(1);
        if scope.map.nrefs == 0 {
            self.destroy_scope(map)?;
            return Ok(None);
        }
        if scope.object == Some(obj) {
            scope.object = None;
        }
        Ok(Some(map))
    }

    /// Returns a scope owned by `obj` alone, cloning-on-write a shared one.
    pub fn get_mutable_scope(&mut self, obj: ObjectId) -> Result<ScopeId> {
        let map = self.object(obj)?.map;
        let scope = self.scope(map)?;
        if scope.object == Some(obj) {
            return Ok(map);
        }
        let class = scope.map.class;
        let fresh = self.new_scope(class, Some(obj));
        self.hold_object_map(fresh)?;
        let nslots = self.scope(fresh)?.map.nslots as usize;
        let object = self.object_mut(obj)?;
        object.map = fresh;
        object.slots.resize(nslots.max(SLOT_PRIVATE as usize + 1), SlotValue::Void);
        self.drop_object_map(map, obj)?;
        tracing::trace!(object = obj.0, scope = fresh.0, "gave object a private scope");
        Ok(fresh)
    }

    /// Hands out the next free slot of `obj`, growing its slot vector by
    /// half when full.
    pub fn alloc_slot(&mut self, obj: ObjectId) -> Result<u32> {
        let map = self.object(obj)?.map;
        let header = &mut self.scope_mut(map)?.map;
        let slot = header.freeslot;
        if slot >= header.nslots {
            header.nslots = slot + (slot + 1) / 2;
        }
        header.freeslot += 1;
        let nslots = header.nslots as usize;

        let object = self.object_mut(obj)?;
        if object.slots.len() < nslots {
            object.slots.resize(nslots, SlotValue::Void);
        }
        object.slots[slot as usize] = SlotValue::Void;
        Ok(slot)
    }

    /// Returns a slot to `obj`, shrinking the vector when mostly unused.
    pub fn free_slot(&mut self, obj: ObjectId, slot: u32) -> Result<()> {
        let map = self.object(obj)?.map;
        if let Some(value) = self.object_mut(obj)?.slots.get_mut(slot as usize) {
            *value = SlotValue::Void;
        }
        let header = &mut self.scope_mut(map)?.map;
        if header.freeslot == slot + 1 {
            header.freeslot = slot;
        }
        if header.nslots > INITIAL_NSLOTS && header.freeslot < header.nslots / 2 {
            let nslots = header.freeslot + header.freeslot / 2;
            header.nslots = nslots.max(INITIAL_NSLOTS);
            let nslots = header.nslots as usize;
            self.object_mut(obj)?.slots.truncate(nslots);
        }
        Ok(())
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Creates a descriptor in `scope`, allocating a slot from its object
    /// and appending it to the scope's ordered list. The descriptor starts
    /// unreferenced.
    pub fn new_scope_property(
        &mut self,
        scope: ScopeId,
        key: PropertyKey,
        getter: PropertyOp,
        setter: PropertyOp,
        attrs: Attrs,
        short_id: u16,
    ) -> Result<PropId> {
        let Some(obj) = self.scope(scope)?.object else {
            return invalid(ObjectId::KIND, u32::MAX);
        };
        let slot = self.alloc_slot(obj)?;
        let prev = self.scope(scope)?.last;
        let id = PropId(self.props.insert(ScopeProperty {
            nrefs: 0,
            key,
            getter,
            setter,
            slot,
            attrs,
            short_id,
            owner: scope,
            prev,
            next: None,
            symbols: Vec::new(),
        }));
        match prev {
            Some(p) => self.property_mut(p)?.next = Some(id),
            None => self.scope_mut(scope)?.first = Some(id),
        }
        self.scope_mut(scope)?.last = Some(id);
        Ok(id)
    }

    /// Adds a strong reference to `prop`.
    pub fn hold_property(&mut self, prop: PropId) -> Result<()> {
        self.property_mut(prop)?.nrefs += 1;
        Ok(())
    }

    /// Drops a strong reference; returns the descriptor if it survives.
    pub fn drop_property(&mut self, prop: PropId) -> Result<Option<PropId>> {
        let p = self.property_mut(prop)?;
        p.nrefs = p.nrefs.saturating_sub(1);
        if p.nrefs == 0 {
            self.destroy_property(prop)?;
            return Ok(None);
        }
        Ok(Some(prop))
    }

    /// Frees a descriptor. Its slot goes back to the owning object only
    /// while the owning scope still has one; cache entries for it are always
    /// purged.
    pub fn destroy_property(&mut self, prop: PropId) -> Result<()> {
        let Some(p) = self.props.remove(prop.0) else {
            return invalid(PropId::KIND, prop.0);
        };
        if let Some(scope) = self.scopes.get(p.owner.0) {
            if let Some(obj) = scope.object.filter(|o| self.objects.contains(o.0)) {
                self.free_slot(obj, p.slot)?;
            }
            // Unlinked even from a severed scope so no stale handle stays
            // on the ordered list.
            match p.prev {
                Some(prev) => self.property_mut(prev)?.next = p.next,
                None => self.scope_mut(p.owner)?.first = p.next,
            }
            match p.next {
                Some(next) => self.property_mut(next)?.prev = p.prev,
                None => self.scope_mut(p.owner)?.last = p.prev,
            }
        }
        self.cache.flush_prop(prop);
        Ok(())
    }

    /// Indexes `prop` under `key` in `scope`, replacing whatever the key
    /// pointed at before.
    fn store_add(&mut self, scope: ScopeId, key: PropertyKey, prop: Option<PropId>) -> Result<SymbolId> {
        let existing = self.scope(scope)?.store.find(key, &self.symbols);
        let sym = match existing {
            Some(sym) => {
                let value = self.symbol(sym)?.value;
                if value == prop {
                    return Ok(sym);
                }
                if value.is_some() {
                    self.free_symbol_value(sym)?;
                }
                sym
            }
            None => {
                let symbols = &self.symbols;
                let s = match self.scopes.get_mut(scope.0) {
                    Some(s) => s,
                    None => return invalid(ScopeId::KIND, scope.0),
                };
                if s.store.needs_upgrade() {
                    s.store.upgrade(symbols);
                    tracing::debug!(scope = scope.0, entries = s.store.len(), "property store upgraded to hash table");
                }
                let sym = SymbolId(self.symbols.insert(Symbol {
                    key,
                    value: None,
                    scope,
                }));
                self.scope_mut(scope)?.store.insert(key, sym);
                sym
            }
        };
        if let Some(p) = prop {
            self.hold_property(p)?;
            self.property_mut(p)?.symbols.push(sym);
            if let Some(s) = self.symbols.get_mut(sym.0) {
                s.value = Some(p);
            }
        }
        Ok(sym)
    }

    /// Detaches a symbol from its descriptor, dropping the reference.
    fn free_symbol_value(&mut self, sym: SymbolId) -> Result<()> {
        let value = match self.symbols.get_mut(sym.0) {
            Some(s) => s.value.take(),
            None => return invalid(SymbolId::KIND, sym.0),
        };
        if let Some(prop) = value {
            if let Some(survivor) = self.drop_property(prop)? {
                self.property_mut(survivor)?.symbols.retain(|&s| s != sym);
            }
        }
        Ok(())
    }

    /// Defines an own property of `obj`.
    pub fn define_property(
        &mut self,
        obj: ObjectId,
        key: PropertyKey,
        getter: PropertyOp,
        setter: PropertyOp,
        attrs: Attrs,
        short_id: u16,
    ) -> Result<PropId> {
        let scope = self.get_mutable_scope(obj)?;
        let prop = self.new_scope_property(scope, key, getter, setter, attrs, short_id)?;
        self.store_add(scope, key, Some(prop))?;
        self.cache.flush_key(scope, key);
        Ok(prop)
    }

    /// Makes `prop` reachable from `obj` under an additional key.
    pub fn alias_property(&mut self, obj: ObjectId, prop: PropId, alias: PropertyKey) -> Result<SymbolId> {
        self.property(prop)?;
        let scope = self.get_mutable_scope(obj)?;
        let sym = self.store_add(scope, alias, Some(prop))?;
        self.cache.flush_key(scope, alias);
        Ok(sym)
    }

    /// Looks `key` up in one scope's store.
    pub fn lookup(&mut self, scope: ScopeId, key: PropertyKey) -> Result<Option<PropId>> {
        let symbols = &self.symbols;
        let s = match self.scopes.get_mut(scope.0) {
            Some(s) => s,
            None => return invalid(ScopeId::KIND, scope.0),
        };
        Ok(s.store.lookup(key, symbols).and_then(|sym| symbols.get(sym.0)).and_then(|sym| sym.value))
    }

    /// Resolves `key` on `obj` or its prototype chain, through the cache.
    pub fn find_property(&mut self, obj: ObjectId, key: PropertyKey) -> Result<Option<PropId>> {
        let mut cursor = Some(obj);
        while let Some(o) = cursor {
            let scope = self.object(o)?.map;
            if let Some(prop) = self.cache.get(scope, key) {
                return Ok(Some(prop));
            }
            if let Some(prop) = self.lookup(scope, key)? {
                self.cache.fill(scope, key, prop);
                return Ok(Some(prop));
            }
            cursor = self.prototype(o)?;
        }
        Ok(None)
    }

    /// Removes `obj`'s own property `key`. Returns whether it existed.
    pub fn remove_property(&mut self, obj: ObjectId, key: PropertyKey) -> Result<bool> {
        let scope = self.get_mutable_scope(obj)?;
        let symbols = &self.symbols;
        let removed = match self.scopes.get_mut(scope.0) {
            Some(s) => s.store.remove(key, symbols),
            None => return invalid(ScopeId::KIND, scope.0),
        };
        self.cache.flush_key(scope, key);
        let Some(sym) = removed else {
            return Ok(false);
        };
        self.free_symbol_value(sym)?;
        self.symbols.remove(sym.0);
        Ok(true)
    }

    /// Frees every symbol of `scope`, leaving an empty list store.
    pub fn clear_scope(&mut self, scope: ScopeId) -> Result<()> {
        let syms = self.scope_mut(scope)?.store.take_all();
        for sym in syms {
            self.free_symbol_value(sym)?;
            self.symbols.remove(sym.0);
        }
        self.cache.flush_scope(scope);
        Ok(())
    }

    fn destroy_scope(&mut self, scope: ScopeId) -> Result<()> {
        self.clear_scope(scope)?;
        self.scopes.remove(scope.0);
        tracing::trace!(scope = scope.0, "destroyed scope");
        Ok(())
    }

    /// Keys of `scope` in store order.
    pub fn store_keys(&self, scope: ScopeId) -> Result<Vec<PropertyKey>> {
        let s = self.scope(scope)?;
        Ok(s.store
            .symbols()
            .into_iter()
            .filter_map(|sym| self.symbols.get(sym.0).map(|s| s.key))
            .collect())
    }

    /// Descriptors of `scope` in insertion order.
    pub fn properties(&self, scope: ScopeId) -> Result<Vec<PropId>> {
        let mut out = Vec::new();
        let mut cursor = self.scope(scope)?.first;
        while let Some(p) = cursor {
            out.push(p);
            cursor = self.property(p)?.next;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomTable;

    fn define(space: &mut ObjectSpace, obj: ObjectId, key: PropertyKey) -> PropId {
        space
            .define_property(obj, key, PropertyOp::Stub, PropertyOp::Stub, Attrs::ENUMERATE, 0)
            .unwrap()
    }

    fn keys(atoms: &mut AtomTable, names: &[&str]) -> Vec<PropertyKey> {
        names.iter().map(|n| PropertyKey::Atom(atoms.intern_str(n))).collect()
    }

    #[test]
    fn test_new_object_reserves_slots() {
        let mut space = ObjectSpace::new();
        let obj = space.new_object(&Class::OBJECT, None, None).unwrap();
        let fun = space.new_object(&Class::FUNCTION, None, None).unwrap();
        let scope = space.object_scope(obj).unwrap();
        assert_eq!(space.scope(scope).unwrap().map().freeslot, 3);
        let fscope = space.object_scope(fun).unwrap();
        assert_eq!(space.scope(fscope).unwrap().map().freeslot, 4);
        assert_eq!(space.slot(obj, SLOT_CLASS).unwrap(), SlotValue::Class(&Class::OBJECT));
        assert_eq!(space.slot_count(obj).unwrap(), INITIAL_NSLOTS as usize);
    }

    #[test]
    fn test_list_and_hash_lookups_agree() {
        let mut atoms = AtomTable::new();
        let names = keys(&mut atoms, &["a", "b", "c", "d", "e"]);
        let mut space = ObjectSpace::new();
        let obj = space.new_object(&Class::OBJECT, None, None).unwrap();
        let scope = space.object_scope(obj).unwrap();

        let mut props = Vec::new();
        for key in &names[..4] {
            props.push(define(&mut space, obj, *key));
        }
        assert_eq!(space.scope(scope).unwrap().store_kind(), StoreKind::List);
        let slots_before: Vec<u32> = props.iter().map(|p| space.property(*p).unwrap().slot()).collect();

        props.push(define(&mut space, obj, names[4]));
        assert_eq!(space.scope(scope).unwrap().store_kind(), StoreKind::Hash);

        for (key, prop) in names.iter().zip(&props) {
            assert_eq!(space.lookup(scope, *key).unwrap(), Some(*prop));
        }
        for (prop, slot) in props.iter().zip(slots_before) {
            assert_eq!(space.property(*prop).unwrap().slot(), slot);
        }
        assert_eq!(space.properties(scope).unwrap(), props);
    }

    #[test]
    fn test_list_lookup_moves_hit_to_front() {
        let mut atoms = AtomTable::new();
        let names = keys(&mut atoms, &["x", "y", "z"]);
        let mut space = ObjectSpace::new();
        let obj = space.new_object(&Class::OBJECT, None, None).unwrap();
        let scope = space.object_scope(obj).unwrap();
        for key in &names {
            define(&mut space, obj, *key);
        }
        assert_eq!(space.store_keys(scope).unwrap(), vec![names[2], names[1], names[0]]);

        space.lookup(scope, names[0]).unwrap();
        let order = space.store_keys(scope).unwrap();
        assert_eq!(order[0], names[0]);
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn test_remove_frees_slot_and_unlinks() {
        let mut atoms = AtomTable::new();
        let names = keys(&mut atoms, &["p", "q"]);
        let mut space = ObjectSpace::new();
        let obj = space.new_object(&Class::OBJECT, None, None).unwrap();
        let scope = space.object_scope(obj).unwrap();
        let p = define(&mut space, obj, names[0]);
        let q = define(&mut space, obj, names[1]);

        assert!(space.remove_property(obj, names[1]).unwrap());
        assert!(!space.is_live_property(q));
        assert_eq!(space.scope(scope).unwrap().map().freeslot, 4);
        assert_eq!(space.properties(scope).unwrap(), vec![p]);
        assert_eq!(space.lookup(scope, names[1]).unwrap(), None);
        assert!(!space.remove_property(obj, names[1]).unwrap());
    }

    #[test]
    fn test_alias_keeps_property_alive() {
        let mut atoms = AtomTable::new();
        let names = keys(&mut atoms, &["orig", "alias"]);
        let mut space = ObjectSpace::new();
        let obj = space.new_object(&Class::OBJECT, None, None).unwrap();
        let prop = define(&mut space, obj, names[0]);
        space.alias_property(obj, prop, names[1]).unwrap();
        assert_eq!(space.property(prop).unwrap().nrefs(), 2);

        space.remove_property(obj, names[0]).unwrap();
        assert!(space.is_live_property(prop));
        assert_eq!(space.property(prop).unwrap().symbols().len(), 1);
        let scope = space.object_scope(obj).unwrap();
        assert_eq!(space.lookup(scope, names[1]).unwrap(), Some(prop));

        space.remove_property(obj, names[1]).unwrap();
        assert!(!space.is_live_property(prop));
    }

    #[test]
    fn test_redefine_replaces_descriptor() {
        let mut atoms = AtomTable::new();
        let key = PropertyKey::Atom(atoms.intern_str("v"));
        let mut space = ObjectSpace::new();
        let obj = space.new_object(&Class::OBJECT, None, None).unwrap();
        let first = define(&mut space, obj, key);
        let second = define(&mut space, obj, key);
        assert!(!space.is_live_property(first));
        let scope = space.object_scope(obj).unwrap();
        assert_eq!(space.lookup(scope, key).unwrap(), Some(second));
    }

    #[test]
    fn test_shared_map_then_private_scope() {
        let mut atoms = AtomTable::new();
        let names = keys(&mut atoms, &["shared", "own"]);
        let mut space = ObjectSpace::new();
        let proto = space.new_object(&Class::OBJECT, None, None).unwrap();
        let inherited = define(&mut space, proto, names[0]);
        let obj = space.new_object(&Class::OBJECT, Some(proto), None).unwrap();

        let shared = space.object_scope(obj).unwrap();
        assert_eq!(shared, space.object_scope(proto).unwrap());
        assert_eq!(space.scope(shared).unwrap().map().nrefs, 2);
        assert_eq!(space.find_property(obj, names[0]).unwrap(), Some(inherited));

        define(&mut space, obj, names[1]);
        let own = space.object_scope(obj).unwrap();
        assert_ne!(own, shared);
        assert_eq!(space.scope(shared).unwrap().map().nrefs, 1);
        assert_eq!(space.scope(shared).unwrap().object(), Some(proto));
        assert_eq!(space.find_property(obj, names[0]).unwrap(), Some(inherited));
    }

    #[test]
    fn test_severed_scope_skips_slot_free() {
        let mut atoms = AtomTable::new();
        let key = PropertyKey::Atom(atoms.intern_str("k"));
        let mut space = ObjectSpace::new();
        let obj = space.new_object(&Class::OBJECT, None, None).unwrap();
        let scope = space.object_scope(obj).unwrap();
        define(&mut space, obj, key);
        space.hold_object_map(scope).unwrap();

        space.drop_object_map(scope, obj).unwrap();
        assert_eq!(space.scope(scope).unwrap().object(), None);
        space.clear_scope(scope).unwrap();
        assert!(space.scope(scope).unwrap().is_empty());
        assert!(space.properties(scope).unwrap().is_empty());
        assert_eq!(space.scope(scope).unwrap().map().freeslot, 4);
    }

    #[test]
    fn test_dropping_last_map_reference_destroys_scope() {
        let mut space = ObjectSpace::new();
        let obj = space.new_object(&Class::OBJECT, None, None).unwrap();
        let scope = space.object_scope(obj).unwrap();
        assert_eq!(space.scope_count(), 1);
        space.finalize_object(obj).unwrap();
        assert!(space.scope(scope).is_err());
        assert_eq!(space.object_count(), 0);
        assert_eq!(space.scope_count(), 0);
    }

    #[test]
    fn test_slot_vector_grows_and_shrinks() {
        let mut atoms = AtomTable::new();
        let names: Vec<PropertyKey> = (0..8).map(|i| PropertyKey::Atom(atoms.intern_str(&format!("p{i}")))).collect();
        let mut space = ObjectSpace::new();
        let obj = space.new_object(&Class::OBJECT, None, None).unwrap();
        for key in &names {
            define(&mut space, obj, *key);
        }
        assert!(space.slot_count(obj).unwrap() >= 11);
        for key in names.iter().rev() {
            space.remove_property(obj, *key).unwrap();
        }
        let scope = space.object_scope(obj).unwrap();
        assert_eq!(space.scope(scope).unwrap().map().freeslot, 3);
        assert_eq!(space.scope(scope).unwrap().map().nslots, 7);
        assert_eq!(space.slot_count(obj).unwrap(), 7);
    }

    #[test]
    fn test_cache_flushed_on_destroy() {
        let mut atoms = AtomTable::new();
        let key = PropertyKey::Atom(atoms.intern_str("c"));
        let mut space = ObjectSpace::new();
        let obj = space.new_object(&Class::OBJECT, None, None).unwrap();
        define(&mut space, obj, key);
        assert!(space.find_property(obj, key).unwrap().is_some());
        assert!(space.find_property(obj, key).unwrap().is_some());
        assert_eq!(space.cache_stats().0, 1);

        space.remove_property(obj, key).unwrap();
        assert_eq!(space.find_property(obj, key).unwrap(), None);
    }

    #[test]
    fn test_int_keys() {
        let mut space = ObjectSpace::new();
        let obj = space.new_object(&Class::OBJECT, None, None).unwrap();
        let p = define(&mut space, obj, PropertyKey::Int(0));
        let scope = space.object_scope(obj).unwrap();
        assert_eq!(space.lookup(scope, PropertyKey::Int(0)).unwrap(), Some(p));
        assert_eq!(space.lookup(scope, PropertyKey::Int(1)).unwrap(), None);
    }
}
