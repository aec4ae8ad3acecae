//! In-process stream sink - ordered, approximately capped, keyed streams

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::core::{Error, Result, StreamCursor, StreamEntry, StreamFields, StreamSink};

#[derive(Debug, Default)]
struct Stream {
    last_id: u64,
    entries: VecDeque<StreamEntry>,
}

impl Stream {
    fn after(&self, id: u64, count: usize) -> Vec<StreamEntry> {
        self.entries
            .iter()
            .filter(|e| e.id > id)
            .take(count)
            .cloned()
            .collect()
    }
}

/// Memory-backed [`StreamSink`].
///
/// Trimming is approximate: a stream is only cut back to `max_len` once it
/// exceeds it by roughly ten percent, so appends stay amortized O(1).
#[derive(Debug, Default)]
pub struct MemoryStream {
    streams: Mutex<HashMap<String, Stream>>,
    appended: Notify,
    closed: AtomicBool,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries currently retained for `key`
    pub fn len(&self, key: &str) -> usize {
        self.streams.lock().get(key).map(|s| s.entries.len()).unwrap_or(0)
    }

    /// Snapshot of every retained entry for `key`, oldest first
    pub fn entries(&self, key: &str) -> Vec<StreamEntry> {
        self.streams
            .lock()
            .get(key)
            .map(|s| s.entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn last_id(&self, key: &str) -> u64 {
        self.streams.lock().get(key).map(|s| s.last_id).unwrap_or(0)
    }
}

fn trim_slack(max_len: usize) -> usize {
    (max_len / 10).max(1)
}

#[async_trait]
impl StreamSink for MemoryStream {
    async fn append(&self, key: &str, fields: StreamFields, max_len: usize) -> Result<u64> {
        if self.is_closed() {
            return Err(Error::Sink("stream sink is closed".into()));
        }

        let id = {
            let mut streams = self.streams.lock();
            let stream = streams.entry(key.to_string()).or_default();
            stream.last_id += 1;
            let id = stream.last_id;
            stream.entries.push_back(StreamEntry { id, fields });

            if max_len > 0 && stream.entries.len() > max_len + trim_slack(max_len) {
                let excess = stream.entries.len() - max_len;
                stream.entries.drain(..excess);
            }
            id
        };

        self.appended.notify_waiters();
        Ok(id)
    }

    async fn read_since(
        &self,
        key: &str,
        cursor: StreamCursor,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>> {
        let after = match cursor {
            StreamCursor::Latest => self.last_id(key),
            StreamCursor::After(id) => id,
        };
        let deadline = tokio::time::Instant::now() + block;

        loop {
            // register interest before checking so an append in between is not missed
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let ready = self
                .streams
                .lock()
                .get(key)
                .map(|s| s.after(after, count))
                .unwrap_or_default();
            if !ready.is_empty() || block.is_zero() || self.is_closed() {
                return Ok(ready);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn tail(&self, key: &str, count: usize) -> Result<Vec<StreamEntry>> {
        let streams = self.streams.lock();
        Ok(streams
            .get(key)
            .map(|s| {
                let skip = s.entries.len().saturating_sub(count);
                s.entries.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.appended.notify_waiters();
        Ok(())
    }
}
