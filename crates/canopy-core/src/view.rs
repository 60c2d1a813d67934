//! View lifecycles.
//!
//! A [`ViewLifecycle`] tracks presentation state separately from business
//! logic:
//!
//! ```text
//! NotLoaded --load--> Loaded --appear--> Appeared <--appear/disappear--> Disappeared
//! ```
//!
//! Subscribers use the same [`LifecycleSubscriber`] capability as scopes:
//! `did_load` on load, `did_become_active` on appear, `did_become_inactive`
//! on disappear. A view can be bound to a [`ScopeLifecycle`] so that its
//! visibility drives the scope's activation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{ViewLifecycleError, ViewResult};
use crate::lifecycle::{
    LifecycleContext, LifecycleSource, LifecycleSubscriber, SubscriberId, SubscriberList,
};
use crate::logging::targets;
use crate::scope::{global_registry, ScopeId, ScopeLifecycle};

/// Identity of a view lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(u64);

impl ViewId {
    fn next() -> Self {
        static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric id.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// Presentation state of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ViewState {
    /// Not loaded yet.
    #[default]
    NotLoaded,
    /// Loaded but never shown.
    Loaded,
    /// On screen.
    Appeared,
    /// Was on screen, now hidden.
    Disappeared,
}

/// An input to the view state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewEvent {
    /// The view finished loading.
    Load,
    /// The view appeared.
    Appear,
    /// The view disappeared.
    Disappear,
}

/// What a legal event does in a given state.
enum Step {
    Ignore,
    Enter(ViewState),
}

impl ViewState {
    fn step(self, event: ViewEvent) -> ViewResult<Step> {
        use ViewEvent::*;
        use ViewState::*;

        match (self, event) {
            (NotLoaded, Load) => Ok(Step::Enter(Loaded)),
            (_, Load) => Ok(Step::Ignore),
            (Loaded | Disappeared, Appear) => Ok(Step::Enter(Appeared)),
            (Appeared, Appear) => Ok(Step::Ignore),
            (Appeared, Disappear) => Ok(Step::Enter(Disappeared)),
            (Disappeared, Disappear) => Ok(Step::Ignore),
            (from, event) => Err(ViewLifecycleError::InvalidTransition { from, event }),
        }
    }

    /// Whether the view has loaded.
    pub fn is_loaded(self) -> bool {
        self != ViewState::NotLoaded
    }

    /// Whether the view is on screen.
    pub fn is_appeared(self) -> bool {
        self == ViewState::Appeared
    }
}

struct ViewData {
    state: ViewState,
    generation: u64,
    subscribers: SubscriberList,
    bound_scope: Option<ScopeId>,
}

struct ViewInner {
    id: ViewId,
    name: String,
    data: Mutex<ViewData>,
}

/// Shared handle to a view's presentation lifecycle.
///
/// Clones refer to the same view. Use [`downgrade`](Self::downgrade) for
/// holders that must not keep it alive.
#[derive(Clone)]
pub struct ViewLifecycle {
    inner: Arc<ViewInner>,
}

impl Default for ViewLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ViewLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.data.lock();
        f.debug_struct("ViewLifecycle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &data.state)
            .field("bound_scope", &data.bound_scope)
            .finish()
    }
}

impl ViewLifecycle {
    /// Create an unnamed view lifecycle in the `NotLoaded` state.
    pub fn new() -> Self {
        Self::named("")
    }

    /// Create a named view lifecycle in the `NotLoaded` state.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ViewInner {
                id: ViewId::next(),
                name: name.into(),
                data: Mutex::new(ViewData {
                    state: ViewState::NotLoaded,
                    generation: 0,
                    subscribers: SubscriberList::default(),
                    bound_scope: None,
                }),
            }),
        }
    }

    /// The view's identity.
    pub fn id(&self) -> ViewId {
        self.inner.id
    }

    /// The view's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current presentation state.
    pub fn state(&self) -> ViewState {
        self.inner.data.lock().state
    }

    /// Whether the view is on screen.
    pub fn is_appeared(&self) -> bool {
        self.state().is_appeared()
    }

    /// Get a non-owning handle.
    pub fn downgrade(&self) -> WeakViewLifecycle {
        WeakViewLifecycle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether two handles refer to the same view.
    pub fn ptr_eq(&self, other: &ViewLifecycle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn context(&self, is_active: bool) -> LifecycleContext {
        LifecycleContext {
            source: LifecycleSource::View(self.inner.id),
            is_active,
        }
    }

    /// Mark the view as loaded. Only the first call notifies.
    pub fn did_load(&self) {
        // Load is legal from every state.
        let _ = self.try_did_load();
    }

    /// Mark the view as loaded, reporting illegal transitions as errors.
    pub fn try_did_load(&self) -> ViewResult<()> {
        self.apply(ViewEvent::Load)
    }

    /// Mark the view as appeared.
    ///
    /// # Panics
    ///
    /// Panics if the view has not loaded.
    #[track_caller]
    pub fn did_appear(&self) {
        if let Err(err) = self.try_did_appear() {
            panic!("view lifecycle contract violation: {err}");
        }
    }

    /// Mark the view as appeared, reporting illegal transitions as errors.
    pub fn try_did_appear(&self) -> ViewResult<()> {
        self.apply(ViewEvent::Appear)
    }

    /// Mark the view as disappeared.
    ///
    /// # Panics
    ///
    /// Panics if the view has never appeared.
    #[track_caller]
    pub fn did_disappear(&self) {
        if let Err(err) = self.try_did_disappear() {
            panic!("view lifecycle contract violation: {err}");
        }
    }

    /// Mark the view as disappeared, reporting illegal transitions as errors.
    pub fn try_did_disappear(&self) -> ViewResult<()> {
        self.apply(ViewEvent::Disappear)
    }

    fn apply(&self, event: ViewEvent) -> ViewResult<()> {
        let (from, to, subscribers, generation, bound_scope) = {
            let mut data = self.inner.data.lock();
            let from = data.state;
            let to = match from.step(event)? {
                Step::Ignore => return Ok(()),
                Step::Enter(to) => to,
            };
            data.state = to;
            data.generation += 1;
            (
                from,
                to,
                data.subscribers.snapshot(),
                data.generation,
                data.bound_scope,
            )
        };

        tracing::debug!(
            target: targets::VIEW,
            view = ?self.inner.id,
            name = %self.inner.name,
            ?from,
            ?to,
            "view transition"
        );

        // Disappearing stops the bound logic before observers hear about it.
        if event == ViewEvent::Disappear {
            self.drive_bound_scope(bound_scope, false);
        }

        let context = self.context(to.is_appeared());
        for subscriber in subscribers {
            if self.inner.data.lock().generation != generation {
                break;
            }
            match event {
                ViewEvent::Load => subscriber.did_load(&context),
                ViewEvent::Appear => subscriber.did_become_active(&context),
                ViewEvent::Disappear => subscriber.did_become_inactive(&context),
            }
        }

        if event == ViewEvent::Appear {
            self.drive_bound_scope(bound_scope, true);
        }
        Ok(())
    }

    fn drive_bound_scope(&self, scope: Option<ScopeId>, active: bool) {
        let Some(scope) = scope else {
            return;
        };
        let result = if active {
            global_registry().activate(scope)
        } else {
            global_registry().deactivate(scope)
        };
        if let Err(err) = result {
            tracing::warn!(
                target: targets::VIEW,
                view = ?self.inner.id,
                %err,
                "dropping stale scope binding"
            );
            let mut data = self.inner.data.lock();
            if data.bound_scope == Some(scope) {
                data.bound_scope = None;
            }
        }
    }

    /// Let this view's visibility gate `scope`.
    ///
    /// The scope is active only while this view has appeared and the scope's
    /// parent is active. Appearing activates it (if the parent allows) and
    /// disappearing deactivates it. The association does not keep the scope
    /// alive. Binding applies the gate immediately.
    pub fn bind(&self, scope: &ScopeLifecycle) {
        let appeared = {
            let mut data = self.inner.data.lock();
            data.bound_scope = Some(scope.id());
            data.state.is_appeared()
        };
        if let Err(err) = global_registry().set_gate(scope.id(), Some(self.downgrade())) {
            tracing::warn!(target: targets::VIEW, view = ?self.inner.id, %err, "gating scope failed");
        }
        tracing::debug!(target: targets::VIEW, view = ?self.inner.id, scope = ?scope.id(), "bound view to scope");
        if appeared {
            scope.activate();
        } else {
            scope.deactivate();
        }
    }

    /// Remove the scope binding. The scope keeps its current state.
    pub fn unbind(&self) -> Option<ScopeId> {
        let scope = self.inner.data.lock().bound_scope.take()?;
        let registry = global_registry();
        let gated_here = registry
            .gate(scope)
            .ok()
            .flatten()
            .and_then(|gate| gate.upgrade())
            .is_some_and(|view| view.ptr_eq(self));
        if gated_here {
            if let Err(err) = registry.set_gate(scope, None) {
                tracing::warn!(target: targets::VIEW, view = ?self.inner.id, %err, "clearing scope gate failed");
            }
        }
        Some(scope)
    }

    /// The scope this view drives, if any.
    pub fn bound_scope(&self) -> Option<ScopeId> {
        self.inner.data.lock().bound_scope
    }

    /// Subscribe to view transitions.
    ///
    /// A subscriber added after load receives `did_load` immediately, and
    /// also `did_become_active` if the view is on screen.
    pub fn subscribe<S: LifecycleSubscriber + 'static>(&self, subscriber: &Arc<S>) -> SubscriberId {
        let weak: Weak<dyn LifecycleSubscriber> = Arc::downgrade(subscriber) as Weak<dyn LifecycleSubscriber>;
        self.subscribe_weak(weak)
    }

    /// Subscribe through an already type-erased weak handle.
    pub fn subscribe_weak(&self, subscriber: Weak<dyn LifecycleSubscriber>) -> SubscriberId {
        let (id, added, state) = {
            let mut data = self.inner.data.lock();
            let (id, added) = data.subscribers.insert(subscriber.clone());
            (id, added, data.state)
        };

        if added && state.is_loaded() {
            if let Some(subscriber) = subscriber.upgrade() {
                let context = self.context(state.is_appeared());
                subscriber.did_load(&context);
                if state.is_appeared() {
                    subscriber.did_become_active(&context);
                }
            }
        }
        id
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.data.lock().subscribers.remove(id)
    }

    /// Whether `subscriber` is subscribed to this view.
    pub fn is_subscribed<S: ?Sized>(&self, subscriber: &Arc<S>) -> bool {
        let ptr = Arc::as_ptr(subscriber) as *const ();
        self.inner.data.lock().subscribers.contains_ptr(ptr)
    }
}

/// Non-owning handle to a [`ViewLifecycle`].
#[derive(Clone, Default)]
pub struct WeakViewLifecycle {
    inner: Weak<ViewInner>,
}

impl WeakViewLifecycle {
    /// Get the view back if it is still alive.
    pub fn upgrade(&self) -> Option<ViewLifecycle> {
        self.inner.upgrade().map(|inner| ViewLifecycle { inner })
    }
}

impl fmt::Debug for WeakViewLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(view) => f.debug_tuple("WeakViewLifecycle").field(&view.id()).finish(),
            None => f.write_str("WeakViewLifecycle(<dropped>)"),
        }
    }
}

static_assertions::assert_impl_all!(ViewLifecycle: Send, Sync, Clone);
