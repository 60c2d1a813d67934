//! Builders and caches.
//!
//! Builders are the factories that application composition code hands to
//! parent units. Two families exist:
//!
//! - **Plain builders** ([`AnyBuilder`], [`AnyDynamicBuilder`]) construct a
//!   fresh instance on every call.
//! - **Caches** ([`CachedBuilder`], [`TryCachedBuilder`], [`WeakCachedBuilder`])
//!   construct at most once and hand out the stored instance afterwards.
//!
//! Caches are the only part of the lifecycle engine that may be called from
//! several threads at once. Each one is guarded by a re-entrant mutex, so a
//! construction closure may itself resolve other caches (or other entries of
//! a [`DependencyCache`](crate::component::DependencyCache)) on the same
//! thread without deadlocking. Concurrent callers on other threads wait and
//! then observe the first completed construction.
//!
//! # Example
//!
//! ```
//! use canopy_core::builder::{AnyDynamicBuilder, CachedBuilder, Cacheable, Constructible, DynamicConstructible};
//!
//! let greeting = AnyDynamicBuilder::new(|name: String| format!("hello, {name}"));
//! let deferred = greeting.bind("canopy".to_string());
//! assert_eq!(deferred.build(), "hello, canopy");
//!
//! let config = CachedBuilder::new(|| vec![1, 2, 3]);
//! assert!(!config.is_built());
//! assert_eq!(config.get_or_create(), vec![1, 2, 3]);
//! assert!(config.is_built());
//! ```

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::ReentrantMutex;

use crate::logging::targets;

/// Something that builds a new `Output` on every call.
pub trait Constructible {
    /// What gets built.
    type Output;

    /// Build a new instance.
    fn build(&self) -> Self::Output;
}

/// Something that builds a new `Output` from a dependency only known at build
/// time, such as data passed along when navigating.
pub trait DynamicConstructible {
    /// The build-time dependency.
    type Dependency;
    /// What gets built.
    type Output;

    /// Build a new instance from `dependency`.
    fn build(&self, dependency: Self::Dependency) -> Self::Output;

    /// Capture `dependency` now and defer the build.
    fn bind(&self, dependency: Self::Dependency) -> AnyBuilder<Self::Output>
    where
        Self: Clone + Send + Sync + 'static,
        Self::Dependency: Clone + Send + Sync + 'static,
    {
        let builder = self.clone();
        AnyBuilder::new(move || builder.build(dependency.clone()))
    }
}

/// Something that constructs its `Output` at most once.
pub trait Cacheable {
    /// What gets cached.
    type Output;

    /// Return the cached instance, constructing it on first use.
    fn get_or_create(&self) -> Self::Output;
}

/// Read-only sugar over [`Cacheable`].
pub trait LazyValue: Cacheable {
    /// Same as [`Cacheable::get_or_create`].
    fn value(&self) -> Self::Output {
        self.get_or_create()
    }
}

impl<C: Cacheable + ?Sized> LazyValue for C {}

// =============================================================================
// Plain builders
// =============================================================================

/// Type-erased builder producing a new `R` per call.
pub struct AnyBuilder<R> {
    builder: Arc<dyn Fn() -> R + Send + Sync>,
}

impl<R> AnyBuilder<R> {
    /// Wrap a construction closure.
    pub fn new<F>(builder: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
    {
        Self {
            builder: Arc::new(builder),
        }
    }
}

impl<R> Clone for AnyBuilder<R> {
    fn clone(&self) -> Self {
        Self {
            builder: self.builder.clone(),
        }
    }
}

impl<R> fmt::Debug for AnyBuilder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyBuilder")
            .field("output", &std::any::type_name::<R>())
            .finish()
    }
}

impl<R> Constructible for AnyBuilder<R> {
    type Output = R;

    fn build(&self) -> R {
        (self.builder)()
    }
}

/// Type-erased builder producing a new `R` per call from a dependency `D`.
pub struct AnyDynamicBuilder<D, R> {
    builder: Arc<dyn Fn(D) -> R + Send + Sync>,
}

impl<D, R> AnyDynamicBuilder<D, R> {
    /// Wrap a construction closure.
    pub fn new<F>(builder: F) -> Self
    where
        F: Fn(D) -> R + Send + Sync + 'static,
    {
        Self {
            builder: Arc::new(builder),
        }
    }
}

impl<D, R> Clone for AnyDynamicBuilder<D, R> {
    fn clone(&self) -> Self {
        Self {
            builder: self.builder.clone(),
        }
    }
}

impl<D, R> fmt::Debug for AnyDynamicBuilder<D, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyDynamicBuilder")
            .field("dependency", &std::any::type_name::<D>())
            .field("output", &std::any::type_name::<R>())
            .finish()
    }
}

impl<D, R> DynamicConstructible for AnyDynamicBuilder<D, R> {
    type Dependency = D;
    type Output = R;

    fn build(&self, dependency: D) -> R {
        (self.builder)(dependency)
    }
}

// =============================================================================
// Caches
// =============================================================================

/// Store `built` unless a nested construction got there first, and return
/// whichever value ends up stored.
fn store_first<R: Clone>(slot: &RefCell<Option<R>>, built: R) -> R {
    let mut slot = slot.borrow_mut();
    match slot.as_ref() {
        Some(existing) => existing.clone(),
        None => {
            *slot = Some(built.clone());
            built
        }
    }
}

/// Strongly caches the first instance it constructs.
///
/// The cached value lives as long as the builder does, which is normally the
/// lifetime of the scope or component that owns it.
pub struct CachedBuilder<R> {
    builder: Box<dyn Fn() -> R + Send + Sync>,
    instance: ReentrantMutex<RefCell<Option<R>>>,
}

impl<R: Clone> CachedBuilder<R> {
    /// Create an empty cache around a construction closure.
    pub fn new<F>(builder: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
    {
        Self {
            builder: Box::new(builder),
            instance: ReentrantMutex::new(RefCell::new(None)),
        }
    }

    /// The cached instance, without constructing it.
    pub fn get(&self) -> Option<R> {
        self.instance.lock().borrow().clone()
    }

    /// Whether the instance has been constructed.
    pub fn is_built(&self) -> bool {
        self.instance.lock().borrow().is_some()
    }
}

impl<R: Clone> Cacheable for CachedBuilder<R> {
    type Output = R;

    fn get_or_create(&self) -> R {
        let guard = self.instance.lock();
        let cached = guard.borrow().clone();
        if let Some(existing) = cached {
            return existing;
        }

        tracing::trace!(
            target: targets::BUILDER,
            output = std::any::type_name::<R>(),
            "constructing cached instance"
        );
        let built = (self.builder)();
        store_first(&guard, built)
    }
}

impl<R: Clone> Constructible for CachedBuilder<R> {
    type Output = R;

    fn build(&self) -> R {
        self.get_or_create()
    }
}

impl<R> fmt::Debug for CachedBuilder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let built = self.instance.try_lock().and_then(|guard| {
            let built = guard.try_borrow().ok().map(|slot| slot.is_some());
            built
        });
        f.debug_struct("CachedBuilder")
            .field("output", &std::any::type_name::<R>())
            .field("built", &built)
            .finish()
    }
}

/// A strong cache whose construction may fail.
///
/// Errors are returned to the caller unchanged and are not cached; the next
/// call tries again.
pub struct TryCachedBuilder<R, E> {
    builder: Box<dyn Fn() -> Result<R, E> + Send + Sync>,
    instance: ReentrantMutex<RefCell<Option<R>>>,
}

impl<R: Clone, E> TryCachedBuilder<R, E> {
    /// Create an empty cache around a fallible construction closure.
    pub fn new<F>(builder: F) -> Self
    where
        F: Fn() -> Result<R, E> + Send + Sync + 'static,
    {
        Self {
            builder: Box::new(builder),
            instance: ReentrantMutex::new(RefCell::new(None)),
        }
    }

    /// The cached instance, without constructing it.
    pub fn get(&self) -> Option<R> {
        self.instance.lock().borrow().clone()
    }

    /// Whether the instance has been constructed.
    pub fn is_built(&self) -> bool {
        self.instance.lock().borrow().is_some()
    }
}

impl<R: Clone, E> Cacheable for TryCachedBuilder<R, E> {
    type Output = Result<R, E>;

    fn get_or_create(&self) -> Result<R, E> {
        let guard = self.instance.lock();
        let cached = guard.borrow().clone();
        if let Some(existing) = cached {
            return Ok(existing);
        }

        match (self.builder)() {
            Ok(built) => Ok(store_first(&guard, built)),
            Err(err) => {
                tracing::debug!(
                    target: targets::BUILDER,
                    output = std::any::type_name::<R>(),
                    "construction failed; not cached"
                );
                Err(err)
            }
        }
    }
}

impl<R, E> fmt::Debug for TryCachedBuilder<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TryCachedBuilder")
            .field("output", &std::any::type_name::<R>())
            .field("error", &std::any::type_name::<E>())
            .finish_non_exhaustive()
    }
}

/// Caches a non-owning reference to the instance it constructs.
///
/// While some other owner keeps the instance alive, every call returns it.
/// Once the last strong reference is gone the next call constructs anew.
pub struct WeakCachedBuilder<T: ?Sized> {
    builder: Box<dyn Fn() -> Arc<T> + Send + Sync>,
    instance: ReentrantMutex<RefCell<Option<Weak<T>>>>,
}

impl<T: ?Sized> WeakCachedBuilder<T> {
    /// Create an empty cache around a construction closure.
    pub fn new<F>(builder: F) -> Self
    where
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        Self {
            builder: Box::new(builder),
            instance: ReentrantMutex::new(RefCell::new(None)),
        }
    }

    /// The live instance, without constructing it.
    pub fn instance(&self) -> Option<Arc<T>> {
        self.instance.lock().borrow().as_ref().and_then(Weak::upgrade)
    }
}

impl<T: ?Sized> Cacheable for WeakCachedBuilder<T> {
    type Output = Arc<T>;

    fn get_or_create(&self) -> Arc<T> {
        let guard = self.instance.lock();
        let live = guard.borrow().as_ref().and_then(Weak::upgrade);
        if let Some(existing) = live {
            return existing;
        }

        tracing::trace!(
            target: targets::BUILDER,
            output = std::any::type_name::<T>(),
            "constructing weakly cached instance"
        );
        let built = (self.builder)();

        let mut slot = guard.borrow_mut();
        if let Some(existing) = slot.as_ref().and_then(Weak::upgrade) {
            return existing;
        }
        *slot = Some(Arc::downgrade(&built));
        built
    }
}

impl<T: ?Sized> fmt::Debug for WeakCachedBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakCachedBuilder")
            .field("output", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(CachedBuilder<Arc<String>>: Send, Sync);
static_assertions::assert_impl_all!(WeakCachedBuilder<String>: Send, Sync);
static_assertions::assert_impl_all!(AnyBuilder<u32>: Send, Sync, Clone);
