//! Interactors: the business-logic half of a unit.
//!
//! An interactor owns the unit's [`ScopeLifecycle`]. Application logic embeds
//! an [`Interactor`] (or [`PresentableInteractor`]) and implements
//! [`Interactable`] by delegating to it, then subscribes whatever needs
//! lifecycle hooks.

use std::sync::Arc;

use canopy_core::{LifecycleSubscriber, ScopeLifecycle, SubscriberId, ViewLifecycle};

/// A unit with a business-logic lifecycle.
pub trait Interactable: Send + Sync + 'static {
    /// The unit's scope lifecycle.
    fn scope_lifecycle(&self) -> &ScopeLifecycle;
}

/// A unit with both a business-logic and a view lifecycle.
pub trait PresentableInteractable: Interactable {
    /// The unit's view lifecycle.
    fn view_lifecycle(&self) -> &ViewLifecycle;
}

/// Base interactor owning a named scope lifecycle.
#[derive(Debug)]
pub struct Interactor {
    scope: ScopeLifecycle,
}

impl Interactor {
    /// Create an interactor with an inactive, unattached scope.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            scope: ScopeLifecycle::named(name),
        }
    }

    /// Whether the interactor's scope is active.
    pub fn is_active(&self) -> bool {
        self.scope.is_active()
    }

    /// Subscribe to the interactor's scope.
    pub fn subscribe<S: LifecycleSubscriber + 'static>(&self, subscriber: &Arc<S>) -> SubscriberId {
        self.scope.subscribe(subscriber)
    }
}

impl Interactable for Interactor {
    fn scope_lifecycle(&self) -> &ScopeLifecycle {
        &self.scope
    }
}

/// Base interactor that also owns a view lifecycle.
#[derive(Debug)]
pub struct PresentableInteractor {
    interactor: Interactor,
    view: ViewLifecycle,
}

impl PresentableInteractor {
    /// Create an interactor whose scope runs independently of its view.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            view: ViewLifecycle::named(name.clone()),
            interactor: Interactor::new(name),
        }
    }

    /// Create an interactor whose scope only runs while its view is on screen
    /// and its parent scope runs.
    pub fn view_bound(name: impl Into<String>) -> Self {
        let interactor = Self::new(name);
        interactor.view.bind(&interactor.interactor.scope);
        interactor
    }

    /// Whether the interactor's scope is active.
    pub fn is_active(&self) -> bool {
        self.interactor.is_active()
    }

    /// Subscribe to the interactor's scope.
    pub fn subscribe<S: LifecycleSubscriber + 'static>(&self, subscriber: &Arc<S>) -> SubscriberId {
        self.interactor.subscribe(subscriber)
    }
}

impl Interactable for PresentableInteractor {
    fn scope_lifecycle(&self) -> &ScopeLifecycle {
        self.interactor.scope_lifecycle()
    }
}

impl PresentableInteractable for PresentableInteractor {
    fn view_lifecycle(&self) -> &ViewLifecycle {
        &self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interactor_starts_inactive() {
        let interactor = Interactor::new("login");
        assert!(!interactor.is_active());
        assert_eq!(interactor.scope_lifecycle().name(), "login");
    }

    #[test]
    fn test_view_bound_interactor_follows_view() {
        let interactor = PresentableInteractor::view_bound("board");
        let view = interactor.view_lifecycle();
        assert_eq!(view.bound_scope(), Some(interactor.scope_lifecycle().id()));

        view.did_load();
        view.did_appear();
        assert!(interactor.is_active());
        view.did_disappear();
        assert!(!interactor.is_active());
    }

    #[test]
    fn test_unbound_interactor_ignores_view() {
        let interactor = PresentableInteractor::new("settings");
        interactor.view_lifecycle().did_load();
        interactor.view_lifecycle().did_appear();
        assert!(!interactor.is_active());
    }
}
