//! The intern pool.
//!
//! Storage is a slot vector with a free list. Structural keys are
//! deduplicated through a hash map from key to slot. Container types are
//! keyed by their declaring instruction and carry mutable per-type data
//! (owner, namespace, fields).

mod format;

use crate::key::{ErrorSet, IntType, Key, Signedness, SimpleType, SimpleValue};
use crate::{ContainerKey, Index};
use kiln_ir::{DeclIndex, Name, NamespaceIndex};
use rustc_hash::FxHashMap;

/// Failure to access or create a pool entry.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InternError {
    #[error("{index:?} refers to a removed entry")]
    Stale { index: Index },
    #[error("type {key:?} is still being created")]
    WipPending { key: ContainerKey },
    #[error("{index:?} is not a container type")]
    NotAContainer { index: Index },
    #[error("intern pool exceeded {max} slots", max = u32::MAX)]
    SlotOverflow,
}

/// Resolution state of a container's field types.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum FieldsState {
    #[default]
    Unresolved,
    /// Resolution is on the stack; re-entry is a dependency loop.
    Resolving,
    Resolved,
    Failed,
}

/// A resolved container field.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Field {
    pub name: Name,
    pub ty: Index,
}

/// Per-type data of a finished container type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Container {
    pub key: ContainerKey,
    pub owner_decl: DeclIndex,
    pub namespace: NamespaceIndex,
    pub fields: Vec<Field>,
    pub fields_state: FieldsState,
}

#[derive(Clone, Debug)]
enum Entry {
    Key(Key),
    Wip(ContainerKey),
    Container(Container),
}

#[derive(Clone, Debug)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// A container type that has been reserved but not finished.
///
/// Must be passed to exactly one of `InternPool::finish` or
/// `InternPool::cancel`.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a WIP type must be finished or cancelled"]
pub struct WipType {
    index: Index,
    key: ContainerKey,
}

impl WipType {
    /// The index the type will have once finished. Only its creator may
    /// use it, e.g. to let the type refer to itself.
    pub fn index(&self) -> Index {
        self.index
    }

    pub fn key(&self) -> ContainerKey {
        self.key
    }
}

/// Outcome of `get_or_begin_type`.
#[derive(Debug, PartialEq, Eq)]
pub enum GetOrBegin {
    Existing(Index),
    Wip(WipType),
}

/// Structural intern table for types and values.
pub struct InternPool {
    slots: Vec<Slot>,
    free: Vec<u32>,
    map: FxHashMap<Key, u32>,
    live: usize,
}

impl Default for InternPool {
    fn default() -> Self {
        Self::new()
    }
}

impl InternPool {
    pub fn new() -> Self {
        let mut pool = InternPool {
            slots: Vec::with_capacity(256),
            free: Vec::new(),
            map: FxHashMap::default(),
            live: 0,
        };
        let statics = [
            Key::SimpleType(SimpleType::Void),
            Key::SimpleType(SimpleType::Bool),
            Key::SimpleType(SimpleType::Type),
            Key::SimpleType(SimpleType::ComptimeInt),
            Key::SimpleType(SimpleType::Noreturn),
            Key::SimpleType(SimpleType::AnyError),
            Key::IntType(IntType {
                signedness: Signedness::Unsigned,
                bits: 8,
            }),
            Key::IntType(IntType {
                signedness: Signedness::Signed,
                bits: 32,
            }),
            Key::IntType(IntType {
                signedness: Signedness::Unsigned,
                bits: 64,
            }),
            Key::SimpleValue(SimpleValue::Void),
            Key::SimpleValue(SimpleValue::True),
            Key::SimpleValue(SimpleValue::False),
            Key::ErrorSetType(ErrorSet::new(std::iter::empty())),
        ];
        for key in statics {
            pool.intern(key);
        }
        debug_assert_eq!(pool.slots.len(), Index::STATIC_LEN as usize);
        pool
    }

    fn alloc(&mut self, entry: Entry) -> Result<Index, InternError> {
        if let Some(slot) = self.free.pop() {
            let record = &mut self.slots[slot as usize];
            record.entry = Some(entry);
            self.live += 1;
            return Ok(Index::new(slot, record.generation));
        }
        let slot = u32::try_from(self.slots.len()).map_err(|_| InternError::SlotOverflow)?;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        self.live += 1;
        Ok(Index::new(slot, 0))
    }

    fn entry(&self, index: Index) -> Result<&Entry, InternError> {
        self.slots
            .get(index.slot() as usize)
            .filter(|slot| slot.generation == index.generation())
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(InternError::Stale { index })
    }

    fn index_of_slot(&self, slot: u32) -> Index {
        Index::new(slot, self.slots[slot as usize].generation)
    }

    /// Intern a structural key, returning the existing index if present.
    ///
    /// # Panics
    /// Panics for `Key::ContainerType`, which must go through
    /// `get_or_begin_type`, and if the pool runs out of slots.
    pub fn intern(&mut self, key: Key) -> Index {
        self.try_intern(key).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_intern(&mut self, key: Key) -> Result<Index, InternError> {
        assert!(
            !matches!(key, Key::ContainerType(_)),
            "container types are created with get_or_begin_type"
        );
        if let Some(&slot) = self.map.get(&key) {
            return Ok(self.index_of_slot(slot));
        }
        let index = self.alloc(Entry::Key(key.clone()))?;
        self.map.insert(key, index.slot());
        Ok(index)
    }

    /// Look up a key without inserting it.
    pub fn find(&self, key: &Key) -> Option<Index> {
        let &slot = self.map.get(key)?;
        match self.slots[slot as usize].entry {
            Some(Entry::Wip(_)) => None,
            _ => Some(self.index_of_slot(slot)),
        }
    }

    /// The key of a live entry.
    pub fn key(&self, index: Index) -> Result<Key, InternError> {
        Ok(match self.entry(index)? {
            Entry::Key(key) => key.clone(),
            Entry::Wip(key) => Key::ContainerType(*key),
            Entry::Container(container) => Key::ContainerType(container.key),
        })
    }

    pub fn is_live(&self, index: Index) -> bool {
        self.entry(index).is_ok()
    }

    pub fn is_type(&self, index: Index) -> bool {
        match self.entry(index) {
            Ok(Entry::Key(key)) => key.is_type(),
            Ok(Entry::Wip(_) | Entry::Container(_)) => true,
            Err(_) => false,
        }
    }

    /// The type of a value (or `type` for types).
    pub fn type_of(&self, index: Index) -> Result<Index, InternError> {
        Ok(match self.entry(index)? {
            Entry::Key(key) => key.type_of(),
            Entry::Wip(_) | Entry::Container(_) => Index::TYPE_TYPE,
        })
    }

    /// Find or reserve the container type declared by `key`.
    ///
    /// A key whose type is still work-in-progress is `WipPending`: only
    /// the creator may see a WIP type, through `WipType::index`.
    pub fn get_or_begin_type(&mut self, key: ContainerKey) -> Result<GetOrBegin, InternError> {
        let map_key = Key::ContainerType(key);
        if let Some(&slot) = self.map.get(&map_key) {
            return match self.slots[slot as usize].entry {
                Some(Entry::Wip(_)) => Err(InternError::WipPending { key }),
                _ => Ok(GetOrBegin::Existing(self.index_of_slot(slot))),
            };
        }
        let index = self.alloc(Entry::Wip(key))?;
        self.map.insert(map_key, index.slot());
        tracing::trace!(?key, ?index, "begin container type");
        Ok(GetOrBegin::Wip(WipType { index, key }))
    }

    /// Publish a WIP type with its owner and namespace.
    ///
    /// # Panics
    /// Panics if the reserved slot no longer holds this WIP entry.
    pub fn finish(&mut self, wip: WipType, owner_decl: DeclIndex, namespace: NamespaceIndex) -> Index {
        let slot = self
            .slots
            .get_mut(wip.index.slot() as usize)
            .filter(|slot| slot.generation == wip.index.generation());
        match slot {
            Some(Slot {
                entry: entry @ Some(Entry::Wip(_)),
                ..
            }) => {
                *entry = Some(Entry::Container(Container {
                    key: wip.key,
                    owner_decl,
                    namespace,
                    fields: Vec::new(),
                    fields_state: FieldsState::Unresolved,
                }));
            }
            _ => panic!("finishing {:?}, which is not a pending WIP type", wip.index),
        }
        wip.index
    }

    /// Abandon a WIP type, releasing its key and slot.
    pub fn cancel(&mut self, wip: WipType) {
        tracing::trace!(key = ?wip.key, index = ?wip.index, "cancel container type");
        self.remove(wip.index);
    }

    /// Remove an entry. Later lookups of `index` report `Stale`.
    ///
    /// Static entries and already-removed indices are left alone.
    pub fn remove(&mut self, index: Index) -> bool {
        if index.is_static() {
            return false;
        }
        let Some(slot) = self
            .slots
            .get_mut(index.slot() as usize)
            .filter(|slot| slot.generation == index.generation())
        else {
            return false;
        };
        let Some(entry) = slot.entry.take() else {
            return false;
        };
        slot.generation = slot.generation.wrapping_add(1);
        let key = match entry {
            Entry::Key(key) => key,
            Entry::Wip(key) => Key::ContainerType(key),
            Entry::Container(container) => Key::ContainerType(container.key),
        };
        if self.map.get(&key) == Some(&index.slot()) {
            self.map.remove(&key);
        }
        self.free.push(index.slot());
        self.live -= 1;
        true
    }

    pub fn container(&self, index: Index) -> Result<&Container, InternError> {
        match self.entry(index)? {
            Entry::Container(container) => Ok(container),
            _ => Err(InternError::NotAContainer { index }),
        }
    }

    pub fn container_mut(&mut self, index: Index) -> Result<&mut Container, InternError> {
        let slot = self
            .slots
            .get_mut(index.slot() as usize)
            .filter(|slot| slot.generation == index.generation())
            .ok_or(InternError::Stale { index })?;
        match slot.entry.as_mut() {
            Some(Entry::Container(container)) => Ok(container),
            Some(_) => Err(InternError::NotAContainer { index }),
            None => Err(InternError::Stale { index }),
        }
    }

    /// Live entries, including the static ones.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

impl std::fmt::Debug for InternPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternPool")
            .field("live", &self.live)
            .field("slots", &self.slots.len())
            .field("free", &self.free.len())
            .finish()
    }
}

#[cfg(test)]
mod tests;
