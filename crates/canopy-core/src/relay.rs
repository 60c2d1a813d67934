//! Relays: signals that carry state.
//!
//! Relays are how units share mutable state without globals. A parent
//! component creates the relay and hands it to its children through their
//! dependencies; each child subscribes or sends as needed.
//!
//! - [`PassthroughRelay`] - plain broadcast, no memory
//! - [`CurrentValueRelay`] - remembers the latest value and replays it
//! - [`ReplayRelay`] - remembers the latest `capacity` values and replays them

use std::collections::VecDeque;
use std::fmt;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use crate::signal::{ConnectionId, Signal};

/// A relay with no memory; identical to [`Signal`].
pub type PassthroughRelay<T> = Signal<T>;

/// A relay that holds a current value.
///
/// New subscribers receive the current value immediately, then every value
/// passed to [`send`](Self::send).
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use canopy_core::CurrentValueRelay;
///
/// let score = CurrentValueRelay::new(0u32);
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let seen_clone = seen.clone();
/// score.connect(move |&value| seen_clone.lock().push(value));
///
/// score.send(3);
/// assert_eq!(*seen.lock(), vec![0, 3]);
/// assert_eq!(score.value(), 3);
/// ```
pub struct CurrentValueRelay<T> {
    value: Mutex<T>,
    signal: Signal<T>,
}

impl<T: Clone + Send + 'static> CurrentValueRelay<T> {
    /// Create a relay holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            value: Mutex::new(initial),
            signal: Signal::new(),
        }
    }

    /// The current value.
    pub fn value(&self) -> T {
        self.value.lock().clone()
    }

    /// Replace the current value and broadcast it.
    pub fn send(&self, value: T) {
        *self.value.lock() = value.clone();
        self.signal.emit(value);
    }

    /// Modify the current value in place and broadcast the result.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        let value = {
            let mut current = self.value.lock();
            f(&mut current);
            current.clone()
        };
        self.signal.emit(value);
    }

    /// Connect a slot; it is called with the current value right away.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        slot(&self.value());
        self.signal.connect(slot)
    }

    /// Subscribe through a channel that starts with the current value.
    pub fn subscribe_channel(&self) -> Receiver<T> {
        let (tx, rx) = crossbeam_channel::unbounded();
        // Receiver is alive, so this cannot fail.
        let _ = tx.send(self.value());
        self.signal.forward_to(tx);
        rx
    }

    /// Disconnect a slot.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.signal.disconnect(id)
    }

    /// Number of subscribers.
    pub fn connection_count(&self) -> usize {
        self.signal.connection_count()
    }
}

impl<T: Default + Clone + Send + 'static> Default for CurrentValueRelay<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for CurrentValueRelay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentValueRelay")
            .field("value", &*self.value.lock())
            .finish_non_exhaustive()
    }
}

/// A relay that replays up to `capacity` recent values to new subscribers.
pub struct ReplayRelay<T> {
    capacity: usize,
    buffer: Mutex<VecDeque<T>>,
    signal: Signal<T>,
}

impl<T: Clone + Send + 'static> ReplayRelay<T> {
    /// Create a relay remembering the last `capacity` values.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            signal: Signal::new(),
        }
    }

    /// Record and broadcast a value.
    pub fn send(&self, value: T) {
        if self.capacity > 0 {
            let mut buffer = self.buffer.lock();
            if buffer.len() == self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(value.clone());
        }
        self.signal.emit(value);
    }

    /// The buffered values, oldest first.
    pub fn buffered(&self) -> Vec<T> {
        self.buffer.lock().iter().cloned().collect()
    }

    /// Connect a slot; the buffered values are replayed to it first.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        for value in self.buffered() {
            slot(&value);
        }
        self.signal.connect(slot)
    }

    /// Disconnect a slot.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.signal.disconnect(id)
    }
}

impl<T> fmt::Debug for ReplayRelay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayRelay")
            .field("capacity", &self.capacity)
            .field("buffered", &self.buffer.lock().len())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(CurrentValueRelay<u32>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_current_value_replays_to_new_subscribers() {
        let relay = CurrentValueRelay::new("idle");
        relay.send("playing");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let id = relay.connect(move |&state| seen_clone.lock().push(state));
        relay.send("won");

        assert_eq!(*seen.lock(), vec!["playing", "won"]);
        assert!(relay.disconnect(id));
        relay.send("idle");
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_update_broadcasts_new_value() {
        let relay = CurrentValueRelay::new(vec![1]);
        let latest = Arc::new(Mutex::new(Vec::new()));
        let latest_clone = latest.clone();
        relay.connect(move |value: &Vec<i32>| *latest_clone.lock() = value.clone());

        relay.update(|scores| scores.push(2));
        assert_eq!(*latest.lock(), vec![1, 2]);
        assert_eq!(relay.value(), vec![1, 2]);
    }

    #[test]
    fn test_channel_starts_with_current_value() {
        let relay = CurrentValueRelay::new(1u8);
        let rx = relay.subscribe_channel();
        relay.send(2);

        let timeout = std::time::Duration::from_secs(1);
        assert_eq!(rx.recv_timeout(timeout), Ok(1));
        assert_eq!(rx.recv_timeout(timeout), Ok(2));
    }

    #[test]
    fn test_replay_relay_keeps_last_values() {
        let relay = ReplayRelay::new(2);
        relay.send(1);
        relay.send(2);
        relay.send(3);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        relay.connect(move |&value| seen_clone.lock().push(value));
        relay.send(4);

        assert_eq!(*seen.lock(), vec![2, 3, 4]);
        assert_eq!(relay.buffered(), vec![3, 4]);
    }
}
