mod common;

#[cfg(test)]
mod tests {
    use crate::common::{SQLSERVER, User, registry};
    use gantry_core::{
        Lru, Predicate, TranslateOptions, TranslationCache, translate_predicate,
    };

    #[test]
    fn lru_evicts_least_recently_used() {
        let mut lru = Lru::new(2);
        assert!(lru.insert("a", 1).is_none());
        assert!(lru.insert("b", 2).is_none());
        // Touch `a` so `b` becomes the eviction candidate.
        assert_eq!(lru.get(&"a"), Some(&1));
        let evicted = lru.insert("c", 3).expect("over capacity");
        assert_eq!(evicted, ("b", 2));
        assert!(lru.contains(&"a"));
        assert!(lru.contains(&"c"));
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn lru_replaces_in_place() {
        let mut lru = Lru::new(2);
        lru.insert("a", 1);
        lru.insert("a", 9);
        assert_eq!(lru.len(), 1);
        assert_eq!(lru.get(&"a"), Some(&9));
    }

    #[test]
    fn lru_shrink_evicts_immediately() {
        let mut lru = Lru::new(4);
        for i in 0..4 {
            lru.insert(i, i);
        }
        lru.set_capacity(2);
        assert_eq!(lru.len(), 2);
        assert!(lru.contains(&3));
        assert!(lru.contains(&2));
    }

    fn translate_through(
        cache: &TranslationCache,
        predicate: &Predicate,
    ) -> gantry_core::Translation {
        let registry = registry();
        let mapping = registry.mapping::<User>().unwrap();
        translate_predicate(
            predicate,
            &mapping,
            &SQLSERVER,
            TranslateOptions::default(),
            cache,
        )
        .unwrap()
    }

    #[test]
    fn predicates_differing_only_in_values_share_an_entry() {
        let cache = TranslationCache::default();
        let first = translate_through(&cache, &Predicate::eq("name", "Ada"));
        let second = translate_through(&cache, &Predicate::eq("name", "Grace"));
        assert_eq!(first.fragment, second.fragment);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.len, 1);
        // The hit still re-binds the fresh value.
        assert_eq!(
            second.params.get("p0"),
            Some(&gantry_core::Value::Varchar(Some("Grace".into())))
        );
    }

    #[test]
    fn different_shapes_compile_separately() {
        let cache = TranslationCache::default();
        translate_through(&cache, &Predicate::eq("name", "a"));
        translate_through(&cache, &Predicate::ne("name", "a"));
        translate_through(&cache, &Predicate::eq("is_active", true));
        assert_eq!(cache.stats().misses, 3);
        assert_eq!(cache.stats().len, 3);
    }

    #[test]
    fn empty_and_non_empty_in_are_distinct_shapes() {
        let cache = TranslationCache::default();
        let empty = translate_through(&cache, &Predicate::in_list("id", Vec::<i32>::new()));
        let full = translate_through(&cache, &Predicate::in_list("id", vec![1]));
        assert_eq!(empty.fragment, "1=0");
        assert_eq!(full.fragment, "a.[id] IN @p0");
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn null_and_value_comparisons_are_distinct_shapes() {
        let cache = TranslationCache::default();
        let null = translate_through(&cache, &Predicate::eq("name", gantry_core::Value::Varchar(None)));
        let bound = translate_through(&cache, &Predicate::eq("name", "x"));
        assert_eq!(null.fragment, "a.[username] IS NULL");
        assert_eq!(bound.fragment, "a.[username] = @p0");
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn cache_bound_evicts_old_shapes() {
        let cache = TranslationCache::new(2);
        translate_through(&cache, &Predicate::eq("name", "a"));
        translate_through(&cache, &Predicate::ne("name", "a"));
        translate_through(&cache, &Predicate::gt("id", 1));
        let stats = cache.stats();
        assert_eq!(stats.len, 2);
        assert_eq!(stats.evictions, 1);
        // The first shape was evicted; translating it again misses.
        translate_through(&cache, &Predicate::eq("name", "a"));
        assert_eq!(cache.stats().misses, 4);
    }
}
