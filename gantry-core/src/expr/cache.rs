use super::predicate::Shape;
use crate::{
    CompiledPredicate, Dialect, EntityMapping, Predicate, Result, TranslateOptions, util::Lru,
};
use std::any::TypeId;
use std::sync::{Arc, Mutex};

/// Default bound of the compiled-predicate cache.
pub const TRANSLATION_CACHE_CAPACITY: usize = 1000;

#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    type_id: TypeId,
    dialect: &'static str,
    options: (bool, bool),
    shape: Shape,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
}

struct CacheInner {
    lru: Lru<CacheKey, Arc<CompiledPredicate>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Bounded, synchronized cache of compiled predicate fragments, keyed by
/// predicate structure (values erased). A hit reuses the rendered fragment
/// and slot transforms; only the bound values are re-extracted. Compilation
/// happens under the lock so one structure compiles exactly once; the
/// critical section stays O(1) on hits.
pub struct TranslationCache {
    inner: Mutex<CacheInner>,
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new(TRANSLATION_CACHE_CAPACITY)
    }
}

impl TranslationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                lru: Lru::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("translation cache poisoned");
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            len: inner.lru.len(),
        }
    }

    pub(crate) fn get_or_compile(
        &self,
        mapping: &EntityMapping,
        dialect: &dyn Dialect,
        options: TranslateOptions,
        predicate: &Predicate,
        compile: impl FnOnce() -> Result<CompiledPredicate>,
    ) -> Result<Arc<CompiledPredicate>> {
        let key = CacheKey {
            type_id: mapping.type_id,
            dialect: dialect.name(),
            options: (options.ignore_case, options.empty_string_as_null),
            shape: predicate.shape(options.empty_string_as_null),
        };
        let mut inner = self.inner.lock().expect("translation cache poisoned");
        if let Some(compiled) = inner.lru.get(&key) {
            let compiled = compiled.clone();
            inner.hits += 1;
            return Ok(compiled);
        }
        inner.misses += 1;
        let compiled = Arc::new(compile()?);
        if inner.lru.insert(key, compiled.clone()).is_some() {
            inner.evictions += 1;
        }
        Ok(compiled)
    }
}
