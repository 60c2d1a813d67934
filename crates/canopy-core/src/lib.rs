//! Core systems for Canopy.
//!
//! This crate provides the lifecycle engine underneath Canopy's router tree:
//!
//! - **Lifecycle Owners**: Active/inactive state with weakly held subscribers
//! - **Scope Lifecycles**: A tree of owners where children follow their parent
//! - **View Lifecycles**: Load/appear/disappear state, optionally driving a scope
//! - **Builders**: Plain, cached and weakly cached construction
//! - **Dependency Cache**: Per-scope `shared` and `weak_shared` values
//! - **Signals and Relays**: Change streams and explicit shared state
//!
//! # Scope Tree Example
//!
//! ```
//! use std::sync::Arc;
//! use canopy_core::{LifecycleContext, LifecycleSubscriber, ScopeLifecycle};
//!
//! struct Poller;
//!
//! impl LifecycleSubscriber for Poller {
//!     fn did_become_active(&self, _: &LifecycleContext) {
//!         println!("start polling");
//!     }
//!
//!     fn did_become_inactive(&self, _: &LifecycleContext) {
//!         println!("stop polling");
//!     }
//! }
//!
//! let root = ScopeLifecycle::named("root");
//! let feed = ScopeLifecycle::named("feed");
//! let poller = Arc::new(Poller);
//! feed.subscribe(&poller);
//!
//! root.attach_child(&feed);
//! root.activate();   // prints "start polling"
//! root.deactivate(); // prints "stop polling"
//! ```
//!
//! # View Binding Example
//!
//! ```
//! use canopy_core::{ScopeLifecycle, ViewLifecycle};
//!
//! let scope = ScopeLifecycle::named("camera");
//! let view = ViewLifecycle::named("camera");
//! view.bind(&scope);
//!
//! view.did_load();
//! view.did_appear();
//! assert!(scope.is_active());
//! view.did_disappear();
//! assert!(!scope.is_active());
//! ```

pub mod builder;
pub mod component;
mod error;
pub mod lifecycle;
pub mod logging;
pub mod relay;
pub mod scope;
pub mod signal;
pub mod thread_check;
pub mod view;

pub use builder::{
    AnyBuilder, AnyDynamicBuilder, Cacheable, CachedBuilder, Constructible, DynamicConstructible,
    LazyValue, TryCachedBuilder, WeakCachedBuilder,
};
pub use component::DependencyCache;
pub use error::{CanopyError, Result, ScopeError, ScopeResult, ViewLifecycleError, ViewResult};
pub use lifecycle::{
    LifecycleContext, LifecycleOwner, LifecycleSource, LifecycleSubscriber, SubscriberId,
};
pub use logging::{PerfSpan, ScopeTreeDebug, TreeFormatOptions, TreeStyle};
pub use relay::{CurrentValueRelay, PassthroughRelay, ReplayRelay};
pub use scope::{
    global_registry, ChildChange, ChildrenChanged, ScopeId, ScopeLifecycle, ScopeRegistry,
    SharedScopeRegistry,
};
pub use signal::{ConnectionGuard, ConnectionId, Signal};
pub use thread_check::{are_thread_checks_enabled, set_thread_checks_enabled, ThreadAffinity};
pub use view::{ViewEvent, ViewId, ViewLifecycle, ViewState, WeakViewLifecycle};
