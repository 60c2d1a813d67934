//! Single-scheduler verification for lifecycle trees.
//!
//! Lifecycle transitions of one tree (activate, deactivate, attach, detach)
//! must all originate from one execution context, typically the UI thread.
//! Nothing dispatches onto that context automatically; instead every scope
//! binds a [`ThreadAffinity`] the first time it transitions or adopts a child,
//! and later transitions from another thread are reported.
//!
//! Only the builder caches are documented as safe to call concurrently.
//!
//! # Thread Safety Checks
//!
//! Checks are enabled by default in debug builds and disabled in release
//! builds. Use [`set_thread_checks_enabled`] to override this globally.
//!
//! ```
//! use canopy_core::thread_check::ThreadAffinity;
//!
//! let affinity = ThreadAffinity::current();
//! assert!(affinity.is_same_thread());
//! affinity.check("tree touched from a worker thread");
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;

/// Flag to enable/disable runtime thread checks globally.
static THREAD_CHECKS_ENABLED: AtomicBool = AtomicBool::new(cfg!(debug_assertions));

/// Enable or disable runtime thread checks.
///
/// By default, thread checks are enabled in debug builds and disabled in
/// release builds.
pub fn set_thread_checks_enabled(enabled: bool) {
    THREAD_CHECKS_ENABLED.store(enabled, Ordering::SeqCst);
}

/// Check if runtime thread checks are currently enabled.
#[inline]
pub fn are_thread_checks_enabled() -> bool {
    THREAD_CHECKS_ENABLED.load(Ordering::Relaxed)
}

/// Thread affinity tracker for a lifecycle tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadAffinity {
    thread_id: ThreadId,
}

impl Default for ThreadAffinity {
    fn default() -> Self {
        Self::current()
    }
}

impl ThreadAffinity {
    /// Create a new thread affinity tracker for the current thread.
    #[inline]
    pub fn current() -> Self {
        Self {
            thread_id: std::thread::current().id(),
        }
    }

    /// Get the thread ID this affinity is bound to.
    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Check if the current thread matches this affinity.
    #[inline]
    pub fn is_same_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Assert that we are on the same thread as the affinity.
    ///
    /// # Panics
    ///
    /// Panics with a descriptive message if called from a different thread.
    #[track_caller]
    pub fn assert_same_thread_with_msg(&self, msg: &str) {
        if !self.is_same_thread() {
            self.panic_wrong_thread(msg);
        }
    }

    /// Assertion gated on [`are_thread_checks_enabled`].
    #[inline]
    #[track_caller]
    pub fn check(&self, msg: &str) {
        if are_thread_checks_enabled() {
            self.assert_same_thread_with_msg(msg);
        }
    }

    #[cold]
    #[inline(never)]
    #[track_caller]
    fn panic_wrong_thread(&self, msg: &str) -> ! {
        let current = std::thread::current();
        let current_name = current.name().unwrap_or("<unnamed>");
        let current_id = current.id();
        let location = std::panic::Location::caller();

        panic!(
            "\n\
            ══════════════════════════════════════════════════════════════════════\n\
            LIFECYCLE THREAD AFFINITY VIOLATION\n\
            ══════════════════════════════════════════════════════════════════════\n\
            \n\
            {msg}\n\
            \n\
            Location: {location}\n\
            Tree is bound to thread: {:?}\n\
            Current thread: \"{current_name}\" (ID: {current_id:?})\n\
            \n\
            Activate, deactivate, attach and detach calls for one lifecycle\n\
            tree must all come from the same execution context. Hand the work\n\
            to that context instead of calling in from a worker thread.\n\
            \n\
            ══════════════════════════════════════════════════════════════════════",
            self.thread_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affinity_same_thread() {
        let affinity = ThreadAffinity::current();
        assert!(affinity.is_same_thread());
        affinity.assert_same_thread_with_msg("same thread");
        assert_eq!(affinity.thread_id(), std::thread::current().id());
    }

    #[test]
    fn test_affinity_other_thread() {
        let affinity = ThreadAffinity::current();
        let same = std::thread::spawn(move || affinity.is_same_thread())
            .join()
            .unwrap();
        assert!(!same);
    }

    #[test]
    fn test_affinity_violation_panics() {
        let affinity = ThreadAffinity::current();
        let result = std::thread::spawn(move || {
            affinity.assert_same_thread_with_msg("moved across threads");
        })
        .join();
        assert!(result.is_err());
    }
}
