//! Lifecycle owners and the subscriber capability.
//!
//! A [`LifecycleOwner`] holds the active/inactive state of one node and
//! notifies its subscribers on every transition. Anything that wants
//! lifecycle hooks (interactor logic, router adapters, view bindings, test
//! trackers) implements [`LifecycleSubscriber`] and subscribes.
//!
//! # Guarantees
//!
//! - `activate()` on an inactive owner notifies every live subscriber exactly
//!   once, in subscription order. On an active owner it does nothing.
//!   `deactivate()` mirrors this.
//! - A subscriber added while the owner is active immediately receives
//!   `did_become_active`, so attaching mid-activity never misses activation.
//! - Subscribers are held weakly. Subscribing never extends a subscriber's
//!   lifetime; dropped subscribers are pruned on the next notification.
//! - If a callback triggers another transition on the same owner, delivery of
//!   the now-stale notification stops and the nested transition wins.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use canopy_core::{LifecycleContext, LifecycleOwner, LifecycleSubscriber};
//!
//! #[derive(Default)]
//! struct Counter(AtomicUsize);
//!
//! impl LifecycleSubscriber for Counter {
//!     fn did_become_active(&self, _: &LifecycleContext) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let owner = LifecycleOwner::new();
//! let counter = Arc::new(Counter::default());
//! owner.subscribe(&counter);
//!
//! owner.activate();
//! owner.activate();
//! assert_eq!(counter.0.load(Ordering::SeqCst), 1);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::logging::targets;
use crate::scope::ScopeId;
use crate::view::ViewId;

/// Where a lifecycle notification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleSource {
    /// A standalone [`LifecycleOwner`].
    Owner,
    /// The owner embedded in a scope.
    Scope(ScopeId),
    /// A view lifecycle.
    View(ViewId),
}

/// Passed to every subscriber callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleContext {
    /// The lifecycle that fired.
    pub source: LifecycleSource,
    /// Whether that lifecycle is active after the transition.
    pub is_active: bool,
}

impl LifecycleContext {
    /// The scope that fired, if the source is a scope.
    pub fn scope_id(&self) -> Option<ScopeId> {
        match self.source {
            LifecycleSource::Scope(id) => Some(id),
            _ => None,
        }
    }

    /// Whether the notification came from a view lifecycle.
    pub fn is_view(&self) -> bool {
        matches!(self.source, LifecycleSource::View(_))
    }
}

/// Capability for receiving lifecycle notifications.
///
/// The same vocabulary is used by scopes and views: for a view,
/// `did_become_active` means "appeared" and `did_become_inactive` means
/// "disappeared". `did_load` is only sent by views.
pub trait LifecycleSubscriber: Send + Sync {
    /// The view finished loading.
    fn did_load(&self, _context: &LifecycleContext) {}

    /// The lifecycle became active.
    fn did_become_active(&self, _context: &LifecycleContext) {}

    /// The lifecycle became inactive.
    fn did_become_inactive(&self, _context: &LifecycleContext) {}
}

/// Identifies one subscription, for [`LifecycleOwner::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Ordered, weakly held subscriber set shared by owners and views.
#[derive(Default)]
pub(crate) struct SubscriberList {
    entries: Vec<(SubscriberId, Weak<dyn LifecycleSubscriber>)>,
}

impl SubscriberList {
    /// Insert a subscriber. Returns its id and whether it was newly added.
    pub(crate) fn insert(
        &mut self,
        subscriber: Weak<dyn LifecycleSubscriber>,
    ) -> (SubscriberId, bool) {
        let ptr = subscriber.as_ptr() as *const ();
        if let Some((id, _)) = self
            .entries
            .iter()
            .find(|(_, existing)| existing.as_ptr() as *const () == ptr)
        {
            return (*id, false);
        }
        let id = SubscriberId(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed));
        self.entries.push((id, subscriber));
        (id, true)
    }

    pub(crate) fn remove(&mut self, id: SubscriberId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub(crate) fn contains_ptr(&self, ptr: *const ()) -> bool {
        self.entries
            .iter()
            .any(|(_, weak)| weak.as_ptr() as *const () == ptr && weak.strong_count() > 0)
    }

    /// Live subscribers in subscription order; dead entries are dropped.
    pub(crate) fn snapshot(&mut self) -> Vec<Arc<dyn LifecycleSubscriber>> {
        let mut live = Vec::with_capacity(self.entries.len());
        self.entries.retain(|(_, weak)| match weak.upgrade() {
            Some(subscriber) => {
                live.push(subscriber);
                true
            }
            None => false,
        });
        live
    }

    pub(crate) fn live_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }
}

struct OwnerState {
    active: bool,
    /// Bumped on every transition; lets a notification loop detect that a
    /// callback already moved the owner on.
    generation: u64,
    subscribers: SubscriberList,
}

struct OwnerInner {
    source: LifecycleSource,
    state: Mutex<OwnerState>,
}

/// Active/inactive state for one node plus its ordered subscribers.
///
/// Cloning yields another handle to the same owner.
#[derive(Clone)]
pub struct LifecycleOwner {
    inner: Arc<OwnerInner>,
}

impl Default for LifecycleOwner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LifecycleOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("LifecycleOwner")
            .field("source", &self.inner.source)
            .field("active", &state.active)
            .field("subscribers", &state.subscribers.live_count())
            .finish()
    }
}

impl LifecycleOwner {
    /// Create a new, inactive, standalone owner.
    pub fn new() -> Self {
        Self::with_source(LifecycleSource::Owner)
    }

    pub(crate) fn with_source(source: LifecycleSource) -> Self {
        Self {
            inner: Arc::new(OwnerInner {
                source,
                state: Mutex::new(OwnerState {
                    active: false,
                    generation: 0,
                    subscribers: SubscriberList::default(),
                }),
            }),
        }
    }

    /// The source reported to subscribers.
    pub fn source(&self) -> LifecycleSource {
        self.inner.source
    }

    /// Whether the owner is currently active.
    pub fn is_active(&self) -> bool {
        self.inner.state.lock().active
    }

    /// Whether two handles refer to the same owner.
    pub fn ptr_eq(&self, other: &LifecycleOwner) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Transition to active.
    ///
    /// Returns `true` if the owner was inactive and subscribers were notified.
    pub fn activate(&self) -> bool {
        self.transition(true)
    }

    /// Transition to inactive.
    ///
    /// Returns `true` if the owner was active and subscribers were notified.
    pub fn deactivate(&self) -> bool {
        self.transition(false)
    }

    fn transition(&self, active: bool) -> bool {
        let (subscribers, generation) = {
            let mut state = self.inner.state.lock();
            if state.active == active {
                return false;
            }
            state.active = active;
            state.generation += 1;
            (state.subscribers.snapshot(), state.generation)
        };

        tracing::trace!(
            target: targets::LIFECYCLE,
            source = ?self.inner.source,
            active,
            subscriber_count = subscribers.len(),
            "lifecycle transition"
        );

        let context = LifecycleContext {
            source: self.inner.source,
            is_active: active,
        };
        for subscriber in subscribers {
            if self.inner.state.lock().generation != generation {
                tracing::trace!(
                    target: targets::LIFECYCLE,
                    source = ?self.inner.source,
                    "transition superseded during notification"
                );
                break;
            }
            if active {
                subscriber.did_become_active(&context);
            } else {
                subscriber.did_become_inactive(&context);
            }
        }
        true
    }

    /// Subscribe to transitions.
    ///
    /// If the owner is already active, the subscriber is immediately told it
    /// became active. Subscribing the same object twice returns the original
    /// id without a second catch-up notification.
    pub fn subscribe<S: LifecycleSubscriber + 'static>(&self, subscriber: &Arc<S>) -> SubscriberId {
        let weak: Weak<dyn LifecycleSubscriber> = Arc::downgrade(subscriber) as Weak<dyn LifecycleSubscriber>;
        self.subscribe_weak(weak)
    }

    /// Subscribe through an already type-erased weak handle.
    pub fn subscribe_weak(&self, subscriber: Weak<dyn LifecycleSubscriber>) -> SubscriberId {
        let (id, added, active) = {
            let mut state = self.inner.state.lock();
            let (id, added) = state.subscribers.insert(subscriber.clone());
            (id, added, state.active)
        };

        if added && active {
            if let Some(subscriber) = subscriber.upgrade() {
                let context = LifecycleContext {
                    source: self.inner.source,
                    is_active: true,
                };
                subscriber.did_become_active(&context);
            }
        }
        id
    }

    /// Remove a subscription. Returns `true` if it existed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.state.lock().subscribers.remove(id)
    }

    /// Whether `subscriber` is currently subscribed.
    pub fn is_subscribed<S: ?Sized>(&self, subscriber: &Arc<S>) -> bool {
        let ptr = Arc::as_ptr(subscriber) as *const ();
        self.inner.state.lock().subscribers.contains_ptr(ptr)
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.live_count()
    }
}

static_assertions::assert_impl_all!(LifecycleOwner: Send, Sync);
