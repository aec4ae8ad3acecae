//! Live price fan-out - bounded per-subscriber queues

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::PriceUpdate;

/// Receiving half handed to a subscriber
pub struct Subscription {
    pub id: u64,
    pub rx: flume::Receiver<PriceUpdate>,
}

/// Set of subscriber queues.
///
/// Broadcasting never blocks: a queue that is full or whose receiver is gone
/// is dropped from the set, and the message still reaches everyone else.
pub struct SubscriberSet {
    queues: Mutex<HashMap<u64, flume::Sender<PriceUpdate>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl SubscriberSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    pub fn register(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = flume::bounded(self.capacity);
        self.queues.lock().insert(id, tx);
        debug!(subscriber = id, "subscriber registered");
        Subscription { id, rx }
    }

    /// Returns whether `id` was registered
    pub fn unregister(&self, id: u64) -> bool {
        self.queues.lock().remove(&id).is_some()
    }

    /// Push `update` to every queue; returns how many accepted it.
    pub fn broadcast(&self, update: &PriceUpdate) -> usize {
        let mut queues = self.queues.lock();
        let mut dead = Vec::new();

        for (id, tx) in queues.iter() {
            match tx.try_send(update.clone()) {
                Ok(()) => {}
                Err(flume::TrySendError::Full(_)) => {
                    warn!(subscriber = *id, "subscriber queue full, dropping subscriber");
                    dead.push(*id);
                }
                Err(flume::TrySendError::Disconnected(_)) => {
                    debug!(subscriber = *id, "subscriber went away");
                    dead.push(*id);
                }
            }
        }

        for id in &dead {
            queues.remove(id);
        }
        queues.len()
    }

    pub fn len(&self) -> usize {
        self.queues.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Symbol;

    fn update(price: f64) -> PriceUpdate {
        PriceUpdate {
            symbol: Symbol::new("BTC/USDT"),
            price,
            ts: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_slow_subscriber_is_dropped() {
        let set = SubscriberSet::new(1);
        let stalled = set.register();
        let live = set.register();

        assert_eq!(set.broadcast(&update(1.0)), 2);
        assert_eq!(live.rx.try_recv().unwrap().price, 1.0);

        // stalled never drains, so this attempt finds its queue full
        assert_eq!(set.broadcast(&update(2.0)), 1);
        assert_eq!(set.len(), 1);
        assert!(!set.unregister(stalled.id));
        assert_eq!(live.rx.try_recv().unwrap().price, 2.0);

        assert_eq!(set.broadcast(&update(3.0)), 1);
        assert_eq!(stalled.rx.len(), 1);
    }

    #[test]
    fn test_disconnected_subscriber_is_dropped() {
        let set = SubscriberSet::new(4);
        let gone = set.register();
        drop(gone.rx);
        assert_eq!(set.broadcast(&update(1.0)), 0);
        assert!(set.is_empty());
    }

    #[test]
    fn test_unregister() {
        let set = SubscriberSet::new(4);
        let sub = set.register();
        assert!(set.unregister(sub.id));
        assert!(!set.unregister(sub.id));
        assert_eq!(set.broadcast(&update(1.0)), 0);
    }
}
