use std::collections::HashMap;

use lru::LruCache;

use super::CacheKey;
use super::Computation;
use super::InputHash;
use super::wrapper::ResolverValue;
use crate::configuration::EvictionPolicy;
use crate::resolvers::ResolverId;
use crate::store::DataId;

/// A resolver field instance: one resolver field read on one record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(super) struct FieldInstance {
    resolver: ResolverId,
    owner: DataId,
    storage_key: String,
}

impl FieldInstance {
    fn new(key: &CacheKey) -> Self {
        Self {
            resolver: key.resolver,
            owner: key.owner.clone(),
            storage_key: key.storage_key.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub(super) struct Shared {
    value: ResolverValue,
    /// Number of field instances whose last input is this entry.
    slots: usize,
}

/// Outputs by (resolver, input), each kept alive by the field instances that last read it.
///
/// Lookups only look at the resolver and its input, so equal inputs read on different records
/// share one output. A field instance reading a new input moves its slot, and an output no slot
/// points to anymore is dropped.
#[derive(Default)]
pub(super) struct SlotTable {
    slots: HashMap<FieldInstance, InputHash>,
    entries: HashMap<Computation, Shared>,
}

impl SlotTable {
    fn get(&mut self, key: &CacheKey) -> (Option<ResolverValue>, Vec<ResolverValue>) {
        let Some(shared) = self.entries.get(&(key.resolver, key.input)) else {
            return (None, Vec::new());
        };
        let value = shared.value.clone();
        (Some(value), self.point(FieldInstance::new(key), key.input))
    }

    fn put(&mut self, key: CacheKey, value: ResolverValue) -> Vec<ResolverValue> {
        let mut released = Vec::new();
        match self.entries.get_mut(&(key.resolver, key.input)) {
            Some(shared) => released.push(std::mem::replace(&mut shared.value, value)),
            None => {
                self.entries
                    .insert((key.resolver, key.input), Shared { value, slots: 0 });
            }
        }
        released.extend(self.point(FieldInstance::new(&key), key.input));
        released
    }

    /// Points the slot of `instance` to the entry for `input`, which must exist.
    fn point(&mut self, instance: FieldInstance, input: InputHash) -> Vec<ResolverValue> {
        let resolver = instance.resolver;
        let previous = self.slots.insert(instance, input);
        if previous == Some(input) {
            return Vec::new();
        }
        if let Some(shared) = self.entries.get_mut(&(resolver, input)) {
            shared.slots += 1;
        }
        previous
            .and_then(|previous| self.unpoint((resolver, previous)))
            .into_iter()
            .collect()
    }

    /// Drops one slot of an entry, removing the entry with its last slot.
    fn unpoint(&mut self, computation: Computation) -> Option<ResolverValue> {
        let shared = self.entries.get_mut(&computation)?;
        shared.slots = shared.slots.saturating_sub(1);
        if shared.slots > 0 {
            return None;
        }
        self.entries.remove(&computation).map(|shared| shared.value)
    }

    fn remove(&mut self, key: &CacheKey) -> Option<ResolverValue> {
        let computation = (key.resolver, key.input);
        let shared = self.entries.remove(&computation)?;
        self.slots
            .retain(|instance, input| (instance.resolver, *input) != computation);
        Some(shared.value)
    }

    fn remove_resolver(&mut self, resolver: ResolverId) -> Vec<ResolverValue> {
        self.slots.retain(|instance, _| instance.resolver != resolver);
        let computations = self
            .entries
            .keys()
            .filter(|(id, _)| *id == resolver)
            .copied()
            .collect::<Vec<_>>();
        computations
            .iter()
            .filter_map(|computation| self.entries.remove(computation))
            .map(|shared| shared.value)
            .collect()
    }

    fn remove_owner(&mut self, owner: &str) -> Vec<ResolverValue> {
        let instances = self
            .slots
            .keys()
            .filter(|instance| instance.owner == owner)
            .cloned()
            .collect::<Vec<_>>();
        instances
            .into_iter()
            .filter_map(|instance| {
                let input = self.slots.remove(&instance)?;
                self.unpoint((instance.resolver, input))
            })
            .collect()
    }
}

/// Where cached outputs live, per eviction policy.
///
/// Every method returning a [`ResolverValue`] hands back the values that left the storage, so
/// that the caller can release the derived records they own.
pub(super) enum CacheStorage {
    /// Outputs last read by each resolver field instance.
    SingleSlot(SlotTable),
    /// Outputs by (resolver, input), optionally bounded.
    Keyed(LruCache<Computation, ResolverValue>),
}

impl CacheStorage {
    pub(super) fn new(policy: &EvictionPolicy) -> Self {
        match policy {
            EvictionPolicy::SingleSlot => CacheStorage::SingleSlot(SlotTable::default()),
            EvictionPolicy::Unbounded => CacheStorage::Keyed(LruCache::unbounded()),
            EvictionPolicy::Lru { capacity } => CacheStorage::Keyed(LruCache::new(*capacity)),
        }
    }

    /// Looks up the output for `key`, returning it with the values that a hit displaced.
    pub(super) fn get(&mut self, key: &CacheKey) -> (Option<ResolverValue>, Vec<ResolverValue>) {
        match self {
            CacheStorage::SingleSlot(table) => table.get(key),
            CacheStorage::Keyed(entries) => (
                entries.get(&(key.resolver, key.input)).cloned(),
                Vec::new(),
            ),
        }
    }

    /// Stores a value, returning the values it replaced or evicted.
    pub(super) fn put(&mut self, key: CacheKey, value: ResolverValue) -> Vec<ResolverValue> {
        match self {
            CacheStorage::SingleSlot(table) => table.put(key, value),
            CacheStorage::Keyed(entries) => entries
                .push((key.resolver, key.input), value)
                .filter(|(computation, _)| *computation != (key.resolver, key.input))
                .map(|(_, previous)| previous)
                .into_iter()
                .collect(),
        }
    }

    pub(super) fn remove(&mut self, key: &CacheKey) -> Option<ResolverValue> {
        match self {
            CacheStorage::SingleSlot(table) => table.remove(key),
            CacheStorage::Keyed(entries) => entries.pop(&(key.resolver, key.input)),
        }
    }

    pub(super) fn remove_resolver(&mut self, resolver: ResolverId) -> Vec<ResolverValue> {
        match self {
            CacheStorage::SingleSlot(table) => table.remove_resolver(resolver),
            CacheStorage::Keyed(entries) => {
                let keys = entries
                    .iter()
                    .map(|(key, _)| *key)
                    .filter(|(id, _)| *id == resolver)
                    .collect::<Vec<_>>();
                keys.iter().filter_map(|key| entries.pop(key)).collect()
            }
        }
    }

    /// Drops the field instances read on `owner`, once it has left the arena of derived
    /// records. Keyed policies do not track owners.
    pub(super) fn remove_owner(&mut self, owner: &str) -> Vec<ResolverValue> {
        match self {
            CacheStorage::SingleSlot(table) => table.remove_owner(owner),
            CacheStorage::Keyed(_) => Vec::new(),
        }
    }

    pub(super) fn values_for(&self, resolver: ResolverId) -> Vec<ResolverValue> {
        match self {
            CacheStorage::SingleSlot(table) => table
                .entries
                .iter()
                .filter(|((id, _), _)| *id == resolver)
                .map(|(_, shared)| shared.value.clone())
                .collect(),
            CacheStorage::Keyed(entries) => entries
                .iter()
                .filter(|((id, _), _)| *id == resolver)
                .map(|(_, value)| value.clone())
                .collect(),
        }
    }

    pub(super) fn len(&self) -> usize {
        match self {
            CacheStorage::SingleSlot(table) => table.entries.len(),
            CacheStorage::Keyed(entries) => entries.len(),
        }
    }

    pub(super) fn clear(&mut self) {
        match self {
            CacheStorage::SingleSlot(table) => {
                table.slots.clear();
                table.entries.clear();
            }
            CacheStorage::Keyed(entries) => entries.clear(),
        }
    }
}
