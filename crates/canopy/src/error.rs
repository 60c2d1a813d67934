//! Error types for router composition.

use canopy_core::ScopeError;

/// Errors raised when attaching or detaching routers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    /// The child router is already attached to this router.
    #[error("Router `{child}` is already attached to `{parent}`")]
    AlreadyAttached {
        /// Name of the attaching router.
        parent: String,
        /// Name of the child router.
        child: String,
    },

    /// The child router is not attached to this router.
    #[error("Router `{child}` is not attached to `{parent}`")]
    NotAttached {
        /// Name of the router asked to detach.
        parent: String,
        /// Name of the child router.
        child: String,
    },

    /// The underlying scope operation failed.
    #[error(transparent)]
    Scope(#[from] ScopeError),
}

/// Result type for router operations.
pub type RouterResult<T> = std::result::Result<T, RouterError>;
