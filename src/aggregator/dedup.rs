//! Dedup window - fingerprint -> last publish time

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks recently published fingerprints.
///
/// A fingerprint is a duplicate if it was recorded within `ttl`. Recording
/// is not refreshed by duplicates, so a feed retransmitting forever still
/// gets one publish per window. Entries older than `ttl` are swept every
/// `sweep_interval`.
#[derive(Debug)]
pub struct DedupWindow {
    ttl: Duration,
    sweep_interval: Duration,
    last_sweep: Instant,
    seen: HashMap<String, Instant>,
}

impl DedupWindow {
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            ttl,
            sweep_interval,
            last_sweep: Instant::now(),
            seen: HashMap::new(),
        }
    }

    /// Returns true when `fingerprint` must be dropped; otherwise records it.
    pub fn is_duplicate(&mut self, fingerprint: &str, now: Instant) -> bool {
        self.maybe_sweep(now);

        if let Some(last_seen) = self.seen.get(fingerprint) {
            if now.saturating_duration_since(*last_seen) <= self.ttl {
                return true;
            }
        }
        self.seen.insert(fingerprint.to_string(), now);
        false
    }

    fn maybe_sweep(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_sweep) < self.sweep_interval {
            return;
        }
        let ttl = self.ttl;
        let before = self.seen.len();
        self.seen.retain(|_, seen| now.saturating_duration_since(*seen) <= ttl);
        self.last_sweep = now;
        if before != self.seen.len() {
            tracing::trace!(evicted = before - self.seen.len(), "swept dedup window");
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_millis(250);

    #[test]
    fn test_duplicate_within_ttl() {
        let mut window = DedupWindow::new(TTL, Duration::from_secs(30));
        let t0 = Instant::now();

        assert!(!window.is_duplicate("stub:BTC/USDT:1", t0));
        assert!(window.is_duplicate("stub:BTC/USDT:1", t0 + Duration::from_millis(10)));
        assert!(window.is_duplicate("stub:BTC/USDT:1", t0 + TTL));
        assert!(!window.is_duplicate("stub:BTC/USDT:2", t0 + Duration::from_millis(10)));
    }

    #[test]
    fn test_republish_after_ttl() {
        let mut window = DedupWindow::new(TTL, Duration::from_secs(30));
        let t0 = Instant::now();

        assert!(!window.is_duplicate("a", t0));
        // duplicates do not extend the window
        assert!(window.is_duplicate("a", t0 + Duration::from_millis(200)));
        assert!(!window.is_duplicate("a", t0 + Duration::from_millis(300)));
    }

    #[test]
    fn test_sweep_bounds_memory() {
        let mut window = DedupWindow::new(TTL, Duration::from_secs(1));
        let t0 = Instant::now();

        for i in 0..100 {
            window.is_duplicate(&format!("stub:BTC/USDT:{}", i), t0);
        }
        assert_eq!(window.len(), 100);

        // next observation after the sweep interval evicts everything stale
        window.is_duplicate("fresh", t0 + Duration::from_secs(2));
        assert_eq!(window.len(), 1);
    }
}
