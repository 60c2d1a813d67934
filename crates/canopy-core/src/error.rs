//! Error types for Canopy.
//!
//! Most lifecycle contract violations are programming errors and panic from
//! the infallible entry points. The `try_*` variants of those entry points
//! return the errors defined here instead, which is what tests and tooling
//! use to inspect a tree without tearing the process down.

use crate::scope::ScopeId;
use crate::view::{ViewEvent, ViewState};

/// Errors raised by scope lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// The scope ID is invalid or the scope has been dropped.
    #[error("Invalid or dropped scope ID {0:?}")]
    InvalidScopeId(ScopeId),

    /// The child is already attached to a parent.
    #[error("Scope {child:?} is already attached to {parent:?}")]
    AlreadyAttached {
        /// The scope being attached.
        child: ScopeId,
        /// Its current parent.
        parent: ScopeId,
    },

    /// Attaching would make a scope its own ancestor.
    #[error("Cannot attach {child:?} under {parent:?}: it is the same scope or one of its ancestors")]
    CircularAttachment {
        /// The would-be parent.
        parent: ScopeId,
        /// The scope being attached.
        child: ScopeId,
    },

    /// The scope is not a child of the given parent.
    #[error("Scope {child:?} is not attached to {parent:?}")]
    NotAttached {
        /// The parent that was asked to detach.
        parent: ScopeId,
        /// The scope that was not found among its children.
        child: ScopeId,
    },
}

/// Errors raised by the view lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ViewLifecycleError {
    /// The event is not legal in the current state.
    #[error("Invalid view lifecycle transition: {event:?} while {from:?}")]
    InvalidTransition {
        /// State the view was in.
        from: ViewState,
        /// The rejected event.
        event: ViewEvent,
    },
}

/// The umbrella error type for Canopy core operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanopyError {
    /// Scope-related error.
    #[error("Scope error: {0}")]
    Scope(#[from] ScopeError),

    /// View lifecycle error.
    #[error("View lifecycle error: {0}")]
    View(#[from] ViewLifecycleError),
}

/// Result type for scope operations.
pub type ScopeResult<T> = std::result::Result<T, ScopeError>;

/// Result type for view lifecycle operations.
pub type ViewResult<T> = std::result::Result<T, ViewLifecycleError>;

/// A specialized Result type for Canopy core operations.
pub type Result<T> = std::result::Result<T, CanopyError>;
