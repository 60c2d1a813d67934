//! Canopy - scoped lifecycles and router trees for application architecture.
//!
//! This is the main crate; it re-exports everything from `canopy_core` and
//! adds the router tree on top:
//!
//! - **Interactors** own a unit's business-logic lifecycle
//! - **Routers** attach and detach child units and publish lifecycle hooks
//! - **Components** scope dependencies and cached values per unit
//! - **Root lifecycle** entry points for the hosting application shell
//!
//! # Example
//!
//! ```
//! use canopy::prelude::*;
//!
//! let root = Router::new(Interactor::new("root"));
//! let logged_in = Router::presentable(PresentableInteractor::new("logged_in"));
//!
//! root.attach_child(logged_in.clone());
//! root.activate_root();
//! assert!(logged_in.is_active());
//!
//! root.deactivate_root();
//! assert!(!logged_in.is_active());
//! ```

pub use canopy_core::*;

pub mod component;
mod error;
pub mod interactor;
pub mod prelude;
pub mod root;
pub mod router;

pub use component::Component;
pub use error::{RouterError, RouterResult};
pub use interactor::{Interactable, Interactor, PresentableInteractable, PresentableInteractor};
pub use root::RootLifecycle;
pub use router::{Router, RouterEvent, Routing};
