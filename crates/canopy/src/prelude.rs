//! Prelude module for Canopy.
//!
//! This module re-exports the most commonly used types for convenient importing:
//!
//! ```
//! use canopy::prelude::*;
//! ```

// ============================================================================
// Routing
// ============================================================================

pub use crate::component::Component;
pub use crate::interactor::{Interactable, Interactor, PresentableInteractable, PresentableInteractor};
pub use crate::root::RootLifecycle;
pub use crate::router::{Router, RouterEvent, Routing};

// ============================================================================
// Lifecycles
// ============================================================================

pub use canopy_core::{
    LifecycleContext, LifecycleOwner, LifecycleSubscriber, ScopeLifecycle, ViewLifecycle,
    ViewState,
};

// ============================================================================
// Builders and Shared State
// ============================================================================

pub use canopy_core::{
    AnyBuilder, AnyDynamicBuilder, Cacheable, CachedBuilder, Constructible, CurrentValueRelay,
    DynamicConstructible, LazyValue, PassthroughRelay, Signal, WeakCachedBuilder,
};
