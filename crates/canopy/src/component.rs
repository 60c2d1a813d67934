//! Components: dependency scopes for units.
//!
//! A [`Component`] receives everything it needs from its parent through its
//! dependency `D`, and caches the values it creates for its own subtree.
//! Children get those values through their own dependency type, so shared
//! state always travels explicitly down the tree.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use canopy::Component;
//! use canopy::CurrentValueRelay;
//!
//! struct RootDependency;
//!
//! struct GameDependency {
//!     score: Arc<CurrentValueRelay<u32>>,
//! }
//!
//! let root = Component::new(RootDependency);
//! let score = root.shared(|| Arc::new(CurrentValueRelay::new(0u32)));
//!
//! let game = Component::new(GameDependency { score: score.clone() });
//! game.dependency().score.send(3);
//! assert_eq!(score.value(), 3);
//! ```

use std::fmt;
use std::sync::Arc;

use canopy_core::DependencyCache;

/// A dependency scope with per-component caching.
pub struct Component<D> {
    dependency: D,
    cache: DependencyCache,
}

impl<D> Component<D> {
    /// Create a component from the dependency its parent provides.
    pub fn new(dependency: D) -> Self {
        Self {
            dependency,
            cache: DependencyCache::new(),
        }
    }

    /// The parent-provided dependency.
    pub fn dependency(&self) -> &D {
        &self.dependency
    }

    /// A value created once for this component's lifetime.
    pub fn shared<T, F>(&self, build: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        self.cache.shared(build)
    }

    /// A named value created once for this component's lifetime.
    pub fn shared_named<T, F>(&self, name: &'static str, build: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        self.cache.shared_named(name, build)
    }

    /// A value shared while someone holds it, rebuilt afterwards.
    pub fn weak_shared<T, F>(&self, build: F) -> Arc<T>
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce() -> Arc<T>,
    {
        self.cache.weak_shared(build)
    }

    /// A named value shared while someone holds it, rebuilt afterwards.
    pub fn weak_shared_named<T, F>(&self, name: &'static str, build: F) -> Arc<T>
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce() -> Arc<T>,
    {
        self.cache.weak_shared_named(name, build)
    }

    /// The underlying cache.
    pub fn cache(&self) -> &DependencyCache {
        &self.cache
    }
}

impl<D: fmt::Debug> fmt::Debug for Component<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("dependency", &self.dependency)
            .field("cache", &self.cache)
            .finish()
    }
}
