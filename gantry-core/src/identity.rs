use crate::{ArcRecord, Result, Value, util::Lru};
use std::any::TypeId;

/// Starting capacity of a per-query identity cache.
pub const IDENTITY_CACHE_CAPACITY: usize = 1024;
/// Upper bound the adaptive growth may reach.
pub const IDENTITY_CACHE_HARD_CAP: usize = 50_000;
/// Number of resolutions between growth decisions.
const ADAPT_WINDOW: u64 = 256;

/// A (possibly composite) key value usable as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyValue(pub Box<[Value]>);

impl KeyValue {
    pub fn single(value: Value) -> Self {
        Self(Box::new([value]))
    }

    /// Null in any component means "no identity" (e.g. an unmatched LEFT
    /// JOIN block).
    pub fn is_null(&self) -> bool {
        self.0.iter().any(Value::is_null)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IdentityStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub capacity: usize,
}

/// Per-query map `(type, key) -> canonical instance` keeping the loaded
/// graph consistent: rows bearing the same identity resolve to the same
/// shared instance. Dropped when the query completes, never shared across
/// queries.
///
/// The bound adapts: when evictions keep chasing misses over a window of
/// resolutions the working set clearly exceeds the capacity, which then
/// doubles up to [`IDENTITY_CACHE_HARD_CAP`].
pub struct IdentityCache {
    lru: Lru<(TypeId, KeyValue), ArcRecord>,
    hits: u64,
    misses: u64,
    evictions: u64,
    window_ops: u64,
    window_misses: u64,
    window_evictions: u64,
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new(IDENTITY_CACHE_CAPACITY)
    }
}

impl IdentityCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            lru: Lru::new(capacity.min(IDENTITY_CACHE_HARD_CAP)),
            hits: 0,
            misses: 0,
            evictions: 0,
            window_ops: 0,
            window_misses: 0,
            window_evictions: 0,
        }
    }

    /// Return the canonical instance for `(type_id, key)`, materializing
    /// through `make` on a miss. The boolean is true on a hit, in which case
    /// the caller discards its freshly read row.
    pub fn resolve(
        &mut self,
        type_id: TypeId,
        key: KeyValue,
        make: impl FnOnce() -> Result<ArcRecord>,
    ) -> Result<(ArcRecord, bool)> {
        self.window_ops += 1;
        if self.window_ops >= ADAPT_WINDOW {
            self.adapt();
        }
        if let Some(instance) = self.lru.get(&(type_id, key.clone())) {
            self.hits += 1;
            return Ok((instance.clone(), true));
        }
        self.misses += 1;
        self.window_misses += 1;
        let instance = make()?;
        if self.lru.insert((type_id, key), instance.clone()).is_some() {
            self.evictions += 1;
            self.window_evictions += 1;
        }
        Ok((instance, false))
    }

    pub fn stats(&self) -> IdentityStats {
        IdentityStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            capacity: self.lru.capacity(),
        }
    }

    fn adapt(&mut self) {
        if self.window_evictions * 2 > self.window_misses.max(1) {
            let capacity = (self.lru.capacity() * 2).min(IDENTITY_CACHE_HARD_CAP);
            self.lru.set_capacity(capacity);
        }
        self.window_ops = 0;
        self.window_misses = 0;
        self.window_evictions = 0;
    }
}
