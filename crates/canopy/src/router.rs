//! Routers: the structural half of a unit.
//!
//! A [`Router`] owns one interactor, optionally a view lifecycle, and the
//! routers of its attached children. Attaching a child router parents the
//! child's scope under this router's scope, so the child's business logic
//! runs exactly while this one does. Detaching deactivates the child's
//! subtree and releases this router's reference to it.
//!
//! Routers publish their own hooks on [`Router::events`]:
//!
//! | Event | When |
//! |-------|------|
//! | [`RouterEvent::DidLoad`] | the scope activates for the first time |
//! | [`RouterEvent::DidBecomeActive`] | the scope activates |
//! | [`RouterEvent::DidBecomeInactive`] | the scope deactivates |
//! | [`RouterEvent::ViewDidLoad`] | the view loads |
//! | [`RouterEvent::ViewDidAppear`] | the view appears |
//! | [`RouterEvent::ViewDidDisappear`] | the view disappears |
//!
//! # Example
//!
//! ```
//! use canopy::prelude::*;
//!
//! let root = Router::new(Interactor::new("root"));
//! let child = Router::new(Interactor::new("child"));
//!
//! root.activate_root();
//! root.attach_child(child.clone());
//! assert!(child.is_active());
//!
//! root.detach_child(&(child.clone() as std::sync::Arc<dyn Routing>));
//! assert!(!child.is_active());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use canopy_core::logging::targets;
use canopy_core::{
    ConnectionId, LifecycleContext, LifecycleSubscriber, ScopeLifecycle, Signal, ViewLifecycle,
};
use parking_lot::Mutex;

use crate::error::{RouterError, RouterResult};
use crate::interactor::{Interactable, PresentableInteractable};

/// Hooks published by a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouterEvent {
    /// The scope activated for the first time.
    DidLoad,
    /// The scope activated.
    DidBecomeActive,
    /// The scope deactivated.
    DidBecomeInactive,
    /// The view loaded.
    ViewDidLoad,
    /// The view appeared.
    ViewDidAppear,
    /// The view disappeared.
    ViewDidDisappear,
}

/// Object-safe view of a router, used to store children of any interactor
/// type.
pub trait Routing: Send + Sync {
    /// The router's name (its scope's name).
    fn name(&self) -> String;

    /// The scope lifecycle of the router's interactor.
    fn scope_lifecycle(&self) -> &ScopeLifecycle;

    /// The router's view lifecycle, if it has one.
    fn view_lifecycle(&self) -> Option<&ViewLifecycle>;

    /// Attached child routers, in attachment order.
    fn children(&self) -> Vec<Arc<dyn Routing>>;

    /// Attach a child router, reporting contract violations as errors.
    fn try_attach_child(&self, child: Arc<dyn Routing>) -> RouterResult<()>;

    /// Detach a child router, reporting an unknown child as an error.
    fn try_detach_child(&self, child: &Arc<dyn Routing>) -> RouterResult<()>;

    /// Attach a child router.
    ///
    /// # Panics
    ///
    /// Panics if the child is already attached anywhere.
    #[track_caller]
    fn attach_child(&self, child: Arc<dyn Routing>) {
        if let Err(err) = self.try_attach_child(child) {
            panic!("router contract violation: {err}");
        }
    }

    /// Detach a child router. Does nothing if it is not attached here.
    fn detach_child(&self, child: &Arc<dyn Routing>) {
        if let Err(err) = self.try_detach_child(child) {
            tracing::warn!(target: targets::ROUTER, %err, "ignoring detach of unattached router");
        }
    }

    /// Whether the router's scope is active.
    fn is_active(&self) -> bool {
        self.scope_lifecycle().is_active()
    }
}

/// Compare two routers by identity.
fn same_router(a: &Arc<dyn Routing>, b: &Arc<dyn Routing>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Router owning an interactor `I`, an optional view lifecycle, and its
/// attached children.
pub struct Router<I: Interactable> {
    interactor: Arc<I>,
    view: Option<ViewLifecycle>,
    children: Mutex<Vec<Arc<dyn Routing>>>,
    events: Signal<RouterEvent>,
    loaded: AtomicBool,
}

impl<I: Interactable> Router<I> {
    /// Create a router without a view.
    pub fn new(interactor: I) -> Arc<Self> {
        Self::from_parts(Arc::new(interactor), None)
    }

    /// Create a router around an interactor that is already shared.
    pub fn from_shared(interactor: Arc<I>) -> Arc<Self> {
        Self::from_parts(interactor, None)
    }

    /// Create a router whose hooks also follow `view`.
    pub fn with_view(interactor: I, view: ViewLifecycle) -> Arc<Self> {
        Self::from_parts(Arc::new(interactor), Some(view))
    }

    fn from_parts(interactor: Arc<I>, view: Option<ViewLifecycle>) -> Arc<Self> {
        let router = Arc::new(Self {
            interactor,
            view,
            children: Mutex::new(Vec::new()),
            events: Signal::new(),
            loaded: AtomicBool::new(false),
        });

        let subscriber: Weak<dyn LifecycleSubscriber> =
            Arc::downgrade(&router) as Weak<dyn LifecycleSubscriber>;
        router
            .interactor
            .scope_lifecycle()
            .owner()
            .subscribe_weak(subscriber.clone());
        if let Some(view) = &router.view {
            view.subscribe_weak(subscriber);
        }

        tracing::debug!(
            target: targets::ROUTER,
            name = %router.interactor.scope_lifecycle().name(),
            has_view = router.view.is_some(),
            "created router"
        );
        router
    }

    /// The router's interactor.
    pub fn interactor(&self) -> &Arc<I> {
        &self.interactor
    }

    /// The router's hook stream.
    pub fn events(&self) -> &Signal<RouterEvent> {
        &self.events
    }

    /// Connect a slot to the router's hook stream.
    pub fn on_event<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&RouterEvent) + Send + Sync + 'static,
    {
        self.events.connect(slot)
    }

    /// Whether the scope has activated at least once.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Whether `child` is attached to this router.
    pub fn contains_child(&self, child: &Arc<dyn Routing>) -> bool {
        self.children.lock().iter().any(|c| same_router(c, child))
    }

    fn publish(&self, event: RouterEvent) {
        tracing::trace!(
            target: targets::ROUTER,
            name = %self.interactor.scope_lifecycle().name(),
            ?event,
            "router hook"
        );
        self.events.emit(event);
    }
}

impl<I: PresentableInteractable> Router<I> {
    /// Create a router for an interactor that carries its own view lifecycle.
    pub fn presentable(interactor: I) -> Arc<Self> {
        let view = interactor.view_lifecycle().clone();
        Self::from_parts(Arc::new(interactor), Some(view))
    }
}

impl<I: Interactable> Routing for Router<I> {
    fn name(&self) -> String {
        self.interactor.scope_lifecycle().name()
    }

    fn scope_lifecycle(&self) -> &ScopeLifecycle {
        self.interactor.scope_lifecycle()
    }

    fn view_lifecycle(&self) -> Option<&ViewLifecycle> {
        self.view.as_ref()
    }

    fn children(&self) -> Vec<Arc<dyn Routing>> {
        self.children.lock().clone()
    }

    fn try_attach_child(&self, child: Arc<dyn Routing>) -> RouterResult<()> {
        {
            let mut children = self.children.lock();
            if children.iter().any(|c| same_router(c, &child)) {
                return Err(RouterError::AlreadyAttached {
                    parent: self.name(),
                    child: child.name(),
                });
            }
            children.push(child.clone());
        }

        if let Err(err) = self.scope_lifecycle().try_attach_child(child.scope_lifecycle()) {
            self.children.lock().retain(|c| !same_router(c, &child));
            return Err(err.into());
        }
        if let Some(view) = child.view_lifecycle() {
            child.scope_lifecycle().set_view_lifecycle(view);
        }

        tracing::debug!(
            target: targets::ROUTER,
            parent = %self.name(),
            child = %child.name(),
            "attached child router"
        );
        Ok(())
    }

    fn try_detach_child(&self, child: &Arc<dyn Routing>) -> RouterResult<()> {
        if !self.contains_child(child) {
            return Err(RouterError::NotAttached {
                parent: self.name(),
                child: child.name(),
            });
        }

        let result = self.scope_lifecycle().try_detach_child(child.scope_lifecycle());
        self.children.lock().retain(|c| !same_router(c, child));
        if child.view_lifecycle().is_some() {
            child.scope_lifecycle().clear_view_lifecycle();
        }

        tracing::debug!(
            target: targets::ROUTER,
            parent = %self.name(),
            child = %child.name(),
            "detached child router"
        );
        result.map_err(RouterError::from)
    }
}

impl<I: Interactable> LifecycleSubscriber for Router<I> {
    fn did_load(&self, context: &LifecycleContext) {
        if context.is_view() {
            self.publish(RouterEvent::ViewDidLoad);
        }
    }

    fn did_become_active(&self, context: &LifecycleContext) {
        if context.is_view() {
            self.publish(RouterEvent::ViewDidAppear);
            return;
        }
        if !self.loaded.swap(true, Ordering::SeqCst) {
            self.publish(RouterEvent::DidLoad);
        }
        self.publish(RouterEvent::DidBecomeActive);
    }

    fn did_become_inactive(&self, context: &LifecycleContext) {
        if context.is_view() {
            self.publish(RouterEvent::ViewDidDisappear);
        } else {
            self.publish(RouterEvent::DidBecomeInactive);
        }
    }
}

impl<I: Interactable> Drop for Router<I> {
    fn drop(&mut self) {
        let children = std::mem::take(self.children.get_mut());
        for child in children {
            let scope = self.interactor.scope_lifecycle();
            if let Err(err) = scope.try_detach_child(child.scope_lifecycle()) {
                tracing::debug!(target: targets::ROUTER, %err, "child scope already detached");
            }
        }
    }
}

impl<I: Interactable> fmt::Debug for Router<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("name", &self.name())
            .field("active", &self.is_active())
            .field("view", &self.view.as_ref().map(ViewLifecycle::state))
            .field("children", &self.children.lock().len())
            .finish()
    }
}

static_assertions::assert_obj_safe!(Routing);
static_assertions::assert_impl_all!(Router<crate::interactor::Interactor>: Send, Sync);
