//! Root activation entry points for application shells.
//!
//! The hosting shell (whatever receives the platform's foreground and
//! background callbacks) implements or holds a [`RootLifecycle`] and calls
//! [`activate_root`](RootLifecycle::activate_root) and
//! [`deactivate_root`](RootLifecycle::deactivate_root) at the right moments.
//! Everything below the root follows through the scope cascade.

use std::sync::Arc;

use canopy_core::{ChildrenChanged, ScopeLifecycle, Signal};

use crate::interactor::Interactable;
use crate::router::Router;

/// The root of an application's lifecycle tree.
pub trait RootLifecycle {
    /// The root scope lifecycle.
    fn root_scope_lifecycle(&self) -> &ScopeLifecycle;

    /// Activate the whole tree.
    #[track_caller]
    fn activate_root(&self) {
        self.root_scope_lifecycle().activate();
    }

    /// Deactivate the whole tree.
    #[track_caller]
    fn deactivate_root(&self) {
        self.root_scope_lifecycle().deactivate();
    }

    /// Whether the root is active.
    fn is_root_active(&self) -> bool {
        self.root_scope_lifecycle().is_active()
    }

    /// Change stream covering every child-set change in the tree, for
    /// monitoring tools and tests.
    fn children_changed(&self) -> Arc<Signal<ChildrenChanged>> {
        self.root_scope_lifecycle().children_changed()
    }
}

impl RootLifecycle for ScopeLifecycle {
    fn root_scope_lifecycle(&self) -> &ScopeLifecycle {
        self
    }
}

impl<I: Interactable> RootLifecycle for Router<I> {
    fn root_scope_lifecycle(&self) -> &ScopeLifecycle {
        self.interactor().scope_lifecycle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interactor::Interactor;
    use crate::router::Routing;

    struct Delegate {
        root: ScopeLifecycle,
    }

    impl RootLifecycle for Delegate {
        fn root_scope_lifecycle(&self) -> &ScopeLifecycle {
            &self.root
        }
    }

    #[test]
    fn test_delegate_drives_root() {
        let delegate = Delegate {
            root: ScopeLifecycle::named("app"),
        };
        assert!(!delegate.is_root_active());

        delegate.activate_root();
        assert!(delegate.is_root_active());

        delegate.deactivate_root();
        assert!(!delegate.is_root_active());
    }

    #[test]
    fn test_router_as_root() {
        let launch = Router::new(Interactor::new("launch"));
        let rx = launch.children_changed().subscribe_channel();
        let child = Router::new(Interactor::new("child"));

        launch.activate_root();
        launch.attach_child(child.clone());

        assert!(child.root_scope_lifecycle().is_active());
        assert_eq!(rx.try_iter().count(), 1);
    }
}
