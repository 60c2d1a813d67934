//! Per-scope dependency caching.
//!
//! A [`DependencyCache`] backs the `shared` and `weak_shared` facilities of a
//! component: values keyed by their type (plus an optional name) that are
//! constructed once per cache, or once per strong owner generation in the
//! weak case. It follows the same locking protocol as the builders in
//! [`crate::builder`].

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::ReentrantMutex;

use crate::logging::targets;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    type_id: TypeId,
    name: Option<&'static str>,
}

impl CacheKey {
    fn of<T: ?Sized + 'static>(name: Option<&'static str>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name,
        }
    }
}

type Entries = HashMap<CacheKey, Box<dyn Any + Send + Sync>>;

/// Type-keyed store of per-scope singletons.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use canopy_core::DependencyCache;
///
/// let cache = DependencyCache::new();
/// let first = cache.shared(|| Arc::new(String::from("api client")));
/// let second: Arc<String> = cache.shared(|| unreachable!());
/// assert!(Arc::ptr_eq(&first, &second));
/// ```
#[derive(Default)]
pub struct DependencyCache {
    strong: ReentrantMutex<RefCell<Entries>>,
    weak: ReentrantMutex<RefCell<Entries>>,
}

impl DependencyCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached `T`, constructing it with `build` on first use.
    ///
    /// The value lives as long as the cache.
    pub fn shared<T, F>(&self, build: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        self.shared_entry(CacheKey::of::<T>(None), build)
    }

    /// Like [`shared`](Self::shared), for several values of one type told
    /// apart by `name`.
    pub fn shared_named<T, F>(&self, name: &'static str, build: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        self.shared_entry(CacheKey::of::<T>(Some(name)), build)
    }

    fn shared_entry<T, F>(&self, key: CacheKey, build: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let guard = self.strong.lock();
        let cached = guard
            .borrow()
            .get(&key)
            .and_then(|entry| entry.downcast_ref::<T>())
            .cloned();
        if let Some(existing) = cached {
            return existing;
        }

        tracing::trace!(
            target: targets::BUILDER,
            value = std::any::type_name::<T>(),
            name = key.name,
            "constructing shared dependency"
        );
        let built = build();

        let mut entries = guard.borrow_mut();
        if let Some(existing) = entries.get(&key).and_then(|entry| entry.downcast_ref::<T>()) {
            return existing.clone();
        }
        entries.insert(key, Box::new(built.clone()));
        built
    }

    /// Return the live `T`, constructing it with `build` if no strong owner
    /// is holding one.
    ///
    /// The cache itself never keeps the value alive.
    pub fn weak_shared<T, F>(&self, build: F) -> Arc<T>
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce() -> Arc<T>,
    {
        self.weak_entry(CacheKey::of::<T>(None), build)
    }

    /// Like [`weak_shared`](Self::weak_shared), keyed additionally by `name`.
    pub fn weak_shared_named<T, F>(&self, name: &'static str, build: F) -> Arc<T>
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce() -> Arc<T>,
    {
        self.weak_entry(CacheKey::of::<T>(Some(name)), build)
    }

    fn weak_entry<T, F>(&self, key: CacheKey, build: F) -> Arc<T>
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce() -> Arc<T>,
    {
        let guard = self.weak.lock();
        let live = Self::upgrade_entry::<T>(&guard.borrow(), &key);
        if let Some(existing) = live {
            return existing;
        }

        tracing::trace!(
            target: targets::BUILDER,
            value = std::any::type_name::<T>(),
            name = key.name,
            "constructing weakly shared dependency"
        );
        let built = build();

        let mut entries = guard.borrow_mut();
        if let Some(existing) = Self::upgrade_entry::<T>(&entries, &key) {
            return existing;
        }
        entries.insert(key, Box::new(Arc::downgrade(&built)));
        built
    }

    fn upgrade_entry<T: ?Sized + Send + Sync + 'static>(
        entries: &Entries,
        key: &CacheKey,
    ) -> Option<Arc<T>> {
        entries
            .get(key)
            .and_then(|entry| entry.downcast_ref::<Weak<T>>())
            .and_then(Weak::upgrade)
    }

    /// Number of strongly held values.
    pub fn shared_count(&self) -> usize {
        self.strong.lock().borrow().len()
    }

    /// Whether a weakly shared `T` is currently alive.
    pub fn is_weak_alive<T: ?Sized + Send + Sync + 'static>(&self) -> bool {
        let guard = self.weak.lock();
        let entries = guard.borrow();
        Self::upgrade_entry::<T>(&entries, &CacheKey::of::<T>(None)).is_some()
    }
}

impl fmt::Debug for DependencyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyCache")
            .field("shared", &self.shared_count())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(DependencyCache: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Storage;

    #[test]
    fn test_shared_is_constructed_once_per_type() {
        let cache = DependencyCache::new();
        let calls = AtomicUsize::new(0);

        let a = cache.shared(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Arc::new(Storage)
        });
        let b = cache.shared(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Arc::new(Storage)
        });
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let number: u32 = cache.shared(|| 9);
        assert_eq!(number, 9);
        assert_eq!(cache.shared_count(), 2);
    }

    #[test]
    fn test_named_entries_are_distinct() {
        let cache = DependencyCache::new();
        let player1 = cache.shared_named("player1", || String::from("Ada"));
        let player2 = cache.shared_named("player2", || String::from("Grace"));
        assert_eq!(player1, "Ada");
        assert_eq!(player2, "Grace");
        assert_eq!(cache.shared_named("player1", || String::from("ignored")), "Ada");
    }

    #[test]
    fn test_shared_may_resolve_other_entries() {
        let cache = DependencyCache::new();
        let composed: String = cache.shared(|| {
            let base: u8 = cache.shared(|| 4);
            format!("base={base}")
        });
        assert_eq!(composed, "base=4");
        assert_eq!(cache.shared_count(), 2);
    }

    #[test]
    fn test_weak_shared_rebuilds_after_release() {
        let cache = DependencyCache::new();
        let calls = AtomicUsize::new(0);
        let build = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Arc::new(Storage)
        };

        let first = cache.weak_shared(build);
        let second = cache.weak_shared(build);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        drop(first);
        assert!(cache.is_weak_alive::<Storage>());
        drop(second);
        assert!(!cache.is_weak_alive::<Storage>());
        let _third = cache.weak_shared(build);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_shared_constructs_once() {
        let cache = DependencyCache::new();
        let calls = AtomicUsize::new(0);

        let values: Vec<Arc<Storage>> = (0..64)
            .into_par_iter()
            .map(|_| {
                cache.shared(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Arc::new(Storage)
                })
            })
            .collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
    }
}
