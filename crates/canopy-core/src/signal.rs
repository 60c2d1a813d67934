//! Broadcast signals for Canopy.
//!
//! A [`Signal`] is the multi-consumer notification stream used throughout the
//! lifecycle engine: scope trees publish child-set changes through it, routers
//! publish their hooks through it, and relays are built on top of it.
//!
//! Delivery is best-effort fan-out to the slots connected at emission time.
//! There is no replay and no backpressure: a slot connected after an emission
//! never sees it, and channel subscribers that have gone away are pruned.
//!
//! # Key Types
//!
//! - [`Signal<Args>`] - The broadcast stream
//! - [`ConnectionId`] - Identifies one connected slot
//! - [`ConnectionGuard`] - RAII guard that disconnects when dropped
//!
//! # Re-entrancy
//!
//! Slots run after the connection table has been snapshotted and unlocked, so
//! a slot may connect, disconnect or emit on the same signal without
//! deadlocking. Connections made during an emission take effect from the next
//! emission.
//!
//! # Example
//!
//! ```
//! use canopy_core::Signal;
//!
//! let changed = Signal::<String>::new();
//! let conn_id = changed.connect(|text| {
//!     println!("changed: {text}");
//! });
//!
//! changed.emit("hello".to_string());
//! changed.disconnect(conn_id);
//! ```

use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use crate::logging::targets;

new_key_type! {
    /// A unique identifier for a signal-slot connection.
    ///
    /// Use this ID to disconnect a specific connection via [`Signal::disconnect`].
    pub struct ConnectionId;
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// A type-safe broadcast signal that can have multiple connected slots.
///
/// `Signal<Args>` is `Send + Sync` whenever `Args` is `Send`, and slots are
/// invoked synchronously on the emitting thread.
///
/// # Related Types
///
/// - [`ConnectionId`] - Returned by [`connect`](Self::connect)
/// - [`ConnectionGuard`] - Auto-disconnecting connection
/// - [`crate::relay::CurrentValueRelay`] - A signal that remembers its last value
pub struct Signal<Args> {
    connections: Mutex<SlotMap<ConnectionId, Slot<Args>>>,
    channels: Mutex<Vec<Sender<Args>>>,
}

impl<Args: Clone + Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args> std::fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("connections", &self.connections.lock().len())
            .field("channels", &self.channels.lock().len())
            .finish()
    }
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
            channels: Mutex::new(Vec::new()),
        }
    }

    /// Connect a slot (closure) to this signal.
    ///
    /// Returns a `ConnectionId` that can be used to disconnect the slot later.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connections.lock().insert(Arc::new(slot))
    }

    /// Subscribe through a channel instead of a callback.
    ///
    /// Every emission is cloned into the returned receiver. Monitoring tools
    /// that live on another thread use this to drain events at their own pace.
    /// Dropping the receiver ends the subscription on the next emission.
    pub fn subscribe_channel(&self) -> Receiver<Args> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.forward_to(tx);
        rx
    }

    /// Forward every emission into an existing channel sender.
    pub fn forward_to(&self, tx: Sender<Args>) {
        self.channels.lock().push(tx);
    }

    /// Disconnect a specific slot by its connection ID.
    ///
    /// Returns `true` if the connection was found and removed, `false` otherwise.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Get the number of connected slots and live channel subscribers.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len() + self.channels.lock().len()
    }

    /// Emit the signal, invoking all connected slots.
    ///
    /// Slots are invoked on the current thread after the connection table
    /// has been released. Channel subscribers receive a clone of `args`.
    #[tracing::instrument(skip_all, target = "canopy_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        let slots: Vec<Slot<Args>> = self.connections.lock().values().cloned().collect();
        tracing::trace!(target: targets::SIGNAL, connection_count = slots.len(), "emitting signal");

        for slot in &slots {
            slot(&args);
        }

        let mut channels = self.channels.lock();
        if !channels.is_empty() {
            channels.retain(|tx| tx.send(args.clone()).is_ok());
        }
    }
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// Connect a slot that is disconnected when the returned guard drops.
    ///
    /// The guard only holds a weak reference to the signal, so it is safe to
    /// outlive it.
    ///
    /// # Example
    ///
    /// ```
    /// use canopy_core::Signal;
    /// use std::sync::atomic::{AtomicI32, Ordering};
    /// use std::sync::Arc;
    ///
    /// let signal = Arc::new(Signal::<i32>::new());
    /// let counter = Arc::new(AtomicI32::new(0));
    /// {
    ///     let counter_clone = counter.clone();
    ///     let _guard = signal.connect_scoped(move |&n| {
    ///         counter_clone.fetch_add(n, Ordering::SeqCst);
    ///     });
    ///     signal.emit(42);
    /// }
    /// signal.emit(43);
    /// assert_eq!(counter.load(Ordering::SeqCst), 42);
    /// ```
    pub fn connect_scoped<F>(self: &Arc<Self>, slot: F) -> ConnectionGuard<Args>
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let id = self.connect(slot);
        ConnectionGuard {
            signal: Arc::downgrade(self),
            id,
        }
    }
}

/// A connection guard that automatically disconnects when dropped.
///
/// Created via [`Signal::connect_scoped`].
pub struct ConnectionGuard<Args: Clone + Send + 'static> {
    signal: Weak<Signal<Args>>,
    id: ConnectionId,
}

impl<Args: Clone + Send + 'static> ConnectionGuard<Args> {
    /// The ID of the guarded connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl<Args: Clone + Send + 'static> Drop for ConnectionGuard<Args> {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.upgrade() {
            signal.disconnect(self.id);
        }
    }
}

static_assertions::assert_impl_all!(Signal<()>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_signal_connect_emit() {
        let signal = Signal::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        signal.connect(move |&value| {
            received_clone.lock().push(value);
        });

        signal.emit(42);
        signal.emit(100);

        assert_eq!(*received.lock(), vec![42, 100]);
    }

    #[test]
    fn test_signal_disconnect() {
        let signal = Signal::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        let conn_id = signal.connect(move |&value| {
            received_clone.lock().push(value);
        });

        signal.emit(1);
        assert!(signal.disconnect(conn_id));
        assert!(!signal.disconnect(conn_id));
        signal.emit(2);

        assert_eq!(*received.lock(), vec![1]);
    }

    #[test]
    fn test_connection_guard() {
        let signal = Arc::new(Signal::<i32>::new());
        let received = Arc::new(Mutex::new(Vec::new()));

        {
            let received_clone = received.clone();
            let _guard = signal.connect_scoped(move |&value| {
                received_clone.lock().push(value);
            });
            signal.emit(1);
        }

        signal.emit(2);
        assert_eq!(*received.lock(), vec![1]);
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn test_guard_outlives_signal() {
        let signal = Arc::new(Signal::<()>::new());
        let guard = signal.connect_scoped(|_| {});
        drop(signal);
        drop(guard);
    }

    #[test]
    fn test_slot_may_reenter_signal() {
        let signal = Arc::new(Signal::<u32>::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&signal);
        let hits_clone = hits.clone();
        signal.connect(move |&depth| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
            if depth == 0 {
                if let Some(signal) = weak.upgrade() {
                    signal.connect(|_| {});
                    signal.emit(1);
                }
            }
        });

        signal.emit(0);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(signal.connection_count(), 2);
    }

    #[test]
    fn test_channel_subscriber() {
        let signal = Signal::<&'static str>::new();
        let rx = signal.subscribe_channel();

        signal.emit("attached");
        signal.emit("detached");

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received, vec!["attached", "detached"]);
    }

    #[test]
    fn test_dropped_channel_is_pruned() {
        let signal = Signal::<u8>::new();
        let rx = signal.subscribe_channel();
        assert_eq!(signal.connection_count(), 1);

        drop(rx);
        signal.emit(7);
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn test_emit_from_multiple_threads() {
        let signal = Arc::new(Signal::<i32>::new());
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        signal.connect(move |&value| {
            received_clone.lock().push(value);
        });

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let signal = signal.clone();
                std::thread::spawn(move || signal.emit(i))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let values = received.lock();
        assert_eq!(values.len(), 10);
        for i in 0..10 {
            assert!(values.contains(&i), "Missing value {}", i);
        }
    }
}
