//! Caches of derived GPU objects that depend on other resources
//!
//! A derived object (a VAO, a framebuffer) is built from several resources
//! and must die with any of them. Entries keep the ids they depend on and a
//! reverse index maps each id back to the keys that use it, so eviction is a
//! lookup rather than a walk over every entry.

use std::collections::hash_map::Entry;
use std::hash::Hash;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

struct CacheEntry<D, V> {
    value: V,
    dependencies: SmallVec<[D; 4]>,
}

/// Map from `K` to `V` with eviction by dependency `D`
pub struct DependencyCache<K, D, V> {
    entries: FxHashMap<K, CacheEntry<D, V>>,
    dependents: FxHashMap<D, SmallVec<[K; 4]>>,
    hits: u64,
    misses: u64,
}

impl<K, D, V> Default for DependencyCache<K, D, V> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
            dependents: FxHashMap::default(),
            hits: 0,
            misses: 0,
        }
    }
}

impl<K, D, V> DependencyCache<K, D, V>
where
    K: Eq + Hash + Clone,
    D: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the entry for `key`, creating it with `create` on a miss
    ///
    /// The new entry is registered with every id in `dependencies`. A failed
    /// `create` leaves the cache untouched.
    pub fn get_or_insert_with<E>(
        &mut self,
        key: K,
        dependencies: impl IntoIterator<Item = D>,
        create: impl FnOnce(&K) -> Result<V, E>,
    ) -> Result<&V, E> {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => {
                self.hits += 1;
                Ok(&entry.into_mut().value)
            }
            Entry::Vacant(entry) => {
                let value = create(entry.key())?;
                self.misses += 1;

                let mut deps: SmallVec<[D; 4]> = SmallVec::new();
                for dep in dependencies {
                    if !deps.contains(&dep) {
                        deps.push(dep);
                    }
                }

                for dep in &deps {
                    self.dependents
                        .entry(dep.clone())
                        .or_default()
                        .push(entry.key().clone());
                }

                let inserted = entry.insert(CacheEntry {
                    value,
                    dependencies: deps,
                });
                Ok(&inserted.value)
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove every entry depending on `dependency` and hand each to `destroy`
    ///
    /// Returns the number of evicted entries. Calling it again for the same
    /// dependency is a no-op.
    pub fn evict_dependency(&mut self, dependency: &D, mut destroy: impl FnMut(V)) -> usize {
        let Some(keys) = self.dependents.remove(dependency) else {
            return 0;
        };

        let mut evicted = 0;
        for key in keys {
            let Some(entry) = self.entries.remove(&key) else {
                continue;
            };

            // Unregister from the other resources this entry used
            for other in entry.dependencies.iter().filter(|d| *d != dependency) {
                if let Some(list) = self.dependents.get_mut(other) {
                    list.retain(|k| *k != key);
                    if list.is_empty() {
                        self.dependents.remove(other);
                    }
                }
            }

            destroy(entry.value);
            evicted += 1;
        }

        evicted
    }

    /// Number of entries that depend on `dependency`
    pub fn num_dependents(&self, dependency: &D) -> usize {
        self.dependents.get(dependency).map_or(0, SmallVec::len)
    }

    /// Remove all entries, handing each to `destroy`
    pub fn clear(&mut self, mut destroy: impl FnMut(V)) {
        self.dependents.clear();
        for (_, entry) in self.entries.drain() {
            destroy(entry.value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookups served from the cache
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that created a new entry
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Cache = DependencyCache<&'static str, u32, u32>;

    fn create(value: u32) -> impl FnOnce(&&'static str) -> Result<u32, ()> {
        move |_| Ok(value)
    }

    #[test]
    fn hit_returns_existing_value() {
        let mut cache = Cache::new();
        assert_eq!(*cache.get_or_insert_with("a", [1, 2], create(10)).unwrap(), 10);
        assert_eq!(*cache.get_or_insert_with("a", [1, 2], create(20)).unwrap(), 10);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn failed_creation_inserts_nothing() {
        let mut cache = Cache::new();
        let result = cache.get_or_insert_with("a", [1], |_| Err::<u32, _>("no memory"));
        assert_eq!(result, Err("no memory"));
        assert!(cache.is_empty());
        assert_eq!(cache.num_dependents(&1), 0);
    }

    #[test]
    fn eviction_unregisters_from_other_dependencies() {
        let mut cache = Cache::new();
        cache.get_or_insert_with("a", [1, 2], create(10)).unwrap();
        cache.get_or_insert_with("b", [2, 3], create(20)).unwrap();

        let mut destroyed = Vec::new();
        assert_eq!(cache.evict_dependency(&2, |v| destroyed.push(v)), 2);
        destroyed.sort();
        assert_eq!(destroyed, vec![10, 20]);
        assert_eq!(cache.num_dependents(&1), 0);
        assert_eq!(cache.num_dependents(&3), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn duplicate_dependencies_register_once() {
        let mut cache = Cache::new();
        cache.get_or_insert_with("a", [4, 4, 4], create(1)).unwrap();
        assert_eq!(cache.num_dependents(&4), 1);
    }

    #[test]
    fn clear_destroys_everything() {
        let mut cache = Cache::new();
        cache.get_or_insert_with("a", [1], create(1)).unwrap();
        cache.get_or_insert_with("b", [1], create(2)).unwrap();
        let mut count = 0;
        cache.clear(|_| count += 1);
        assert_eq!(count, 2);
        assert_eq!(cache.num_dependents(&1), 0);
    }
}
