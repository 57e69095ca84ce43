//! Resolver output cache.

use std::collections::HashSet;

use parking_lot::Condvar;
use parking_lot::Mutex;
use serde::Serialize;

use self::storage::CacheStorage;
pub use self::wrapper::ResolverValue;
pub use self::wrapper::WrappedObject;
pub(crate) use self::wrapper::WrapperArena;
use crate::configuration::EvictionPolicy;
use crate::error::ReaderError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::json_ext::hash_object;
use crate::resolvers::ResolverId;
use crate::store::DataId;

mod storage;
mod wrapper;

/// Structural hash of a resolver input: its dependency data and its arguments.
///
/// Field-for-field equal inputs have the same hash, whatever the order of their object keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InputHash(blake3::Hash);

impl InputHash {
    pub fn new(data: &Value, args: &Object) -> Self {
        let mut hasher = blake3::Hasher::new();
        data.hash_stable(&mut hasher);
        hash_object(args, &mut hasher);
        Self(hasher.finalize())
    }
}

/// A resolver applied to one input.
type Computation = (ResolverId, InputHash);

/// Identifies one resolver computation.
///
/// Outputs are looked up by resolver and input. `owner` and `storage_key` locate the resolver
/// field instance, which the single slot policy uses to decide which output a new input replaces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheKey {
    pub resolver: ResolverId,
    /// The record the resolver field is read on.
    pub owner: DataId,
    pub storage_key: String,
    pub input: InputHash,
}

/// Resolver output cache statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of cached outputs.
    pub entries: usize,
    /// Number of derived records owned by cached outputs.
    pub live_wrappers: usize,
    pub hits: u64,
    pub misses: u64,
}

struct CacheState {
    storage: CacheStorage,
    arena: WrapperArena,
    /// Computations running outside the lock.
    in_flight: HashSet<Computation>,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn lookup(&mut self, key: &CacheKey) -> Option<ResolverValue> {
        let (value, displaced) = self.storage.get(key);
        self.release(displaced);
        value
    }

    /// Releases the derived records owned by values that left the storage.
    ///
    /// Resolver fields read on a derived record go with it, along with the outputs only they
    /// kept alive.
    fn release(&mut self, values: impl IntoIterator<Item = ResolverValue>) {
        let mut pending = values.into_iter().collect::<Vec<_>>();
        while let Some(value) = pending.pop() {
            for owner in self.arena.release(&value) {
                pending.extend(self.storage.remove_owner(&owner));
            }
        }
    }
}

/// Removes a computation from the in-flight set when dropped, waking up its waiters.
///
/// Waiters then either find the output or, when the computation failed, run it themselves.
struct InFlight<'a> {
    cache: &'a ResolverOutputCache,
    computation: Computation,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.cache.state.lock().in_flight.remove(&self.computation);
        self.cache.computed.notify_all();
    }
}

/// Memoizes resolver outputs by resolver identity and input.
///
/// Resolvers run outside the cache lock, so distinct computations proceed in parallel. Readers of
/// a computation already running wait for it, so a given output is computed at most once.
pub struct ResolverOutputCache {
    state: Mutex<CacheState>,
    computed: Condvar,
}

impl ResolverOutputCache {
    pub(crate) fn new(policy: &EvictionPolicy) -> Self {
        Self {
            state: Mutex::new(CacheState {
                storage: CacheStorage::new(policy),
                arena: WrapperArena::default(),
                in_flight: HashSet::new(),
                hits: 0,
                misses: 0,
            }),
            computed: Condvar::new(),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<ResolverValue> {
        self.state.lock().lookup(key)
    }

    /// Stores a value, replacing the output previously cached for `key`.
    pub fn put(&self, key: CacheKey, value: ResolverValue) {
        let mut state = self.state.lock();
        let replaced = state.storage.put(key, value);
        state.release(replaced);
    }

    /// Wraps a value into a derived record owned by the cache.
    #[cfg(test)]
    pub(crate) fn wrap(&self, typename: &str, key: &str, value: Value) -> WrappedObject {
        self.state.lock().arena.wrap(typename, key, value)
    }

    pub fn invalidate(&self, key: &CacheKey) {
        let mut state = self.state.lock();
        if let Some(value) = state.storage.remove(key) {
            tracing::debug!(resolver = %key.resolver, owner = %key.owner, "invalidated resolver output");
            state.release([value]);
        }
    }

    pub fn invalidate_resolver(&self, resolver: ResolverId) {
        let mut state = self.state.lock();
        let removed = state.storage.remove_resolver(resolver);
        tracing::debug!(%resolver, entries = removed.len(), "invalidated resolver outputs");
        state.release(removed);
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.storage.clear();
        state.arena.clear();
    }

    pub fn entries_for(&self, resolver: ResolverId) -> Vec<ResolverValue> {
        self.state.lock().storage.values_for(resolver)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.storage.len(),
            live_wrappers: state.arena.len(),
            hits: state.hits,
            misses: state.misses,
        }
    }

    /// Returns the cached output for `key`, or computes and caches it.
    ///
    /// `compute` runs without the cache lock. `normalize` turns its output into a cached value
    /// under the lock, with the wrapper arena. Nothing is cached when either fails, so the next
    /// read runs them again.
    pub(crate) fn get_or_try_insert_with<C, N>(
        &self,
        key: CacheKey,
        compute: C,
        normalize: N,
    ) -> Result<ResolverValue, ReaderError>
    where
        C: FnOnce() -> Result<Value, ReaderError>,
        N: FnOnce(Value, &mut WrapperArena) -> Result<ResolverValue, ReaderError>,
    {
        let computation = (key.resolver, key.input);
        let mut state = self.state.lock();
        loop {
            if let Some(value) = state.lookup(&key) {
                state.hits += 1;
                tracing::trace!(resolver = %key.resolver, owner = %key.owner, "resolver cache hit");
                return Ok(value);
            }
            if state.in_flight.insert(computation) {
                break;
            }
            tracing::trace!(resolver = %key.resolver, owner = %key.owner, "waiting for resolver output");
            self.computed.wait(&mut state);
        }
        state.misses += 1;
        tracing::debug!(resolver = %key.resolver, owner = %key.owner, storage_key = %key.storage_key, "resolver cache miss");
        drop(state);

        let _in_flight = InFlight {
            cache: self,
            computation,
        };
        let output = compute()?;

        let mut state = self.state.lock();
        let value = normalize(output, &mut state.arena)?;
        let replaced = state.storage.put(key, value.clone());
        if !replaced.is_empty() {
            tracing::debug!(
                replaced = replaced.len(),
                "resolver outputs replaced or evicted"
            );
        }
        state.release(replaced);
        Ok(value)
    }
}
