//! Venue failover chain - LIVE(i) -> FAILOVER -> LIVE(j) | MOCK

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::core::{Error, MarketDataSource, Result, SourceFactory};

/// Where harvester data currently comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum FeedMode {
    /// Using the venue at `index` in the priority list
    Live { index: usize, venue: String },
    /// Probing the next candidate
    Failover,
    /// Every venue exhausted; synthetic data only
    Mock,
}

impl FeedMode {
    pub fn is_mock(&self) -> bool {
        matches!(self, FeedMode::Mock)
    }
}

/// Priority-ordered venues plus the one currently serving.
///
/// Nothing here leaves `Mock` once entered; recovering requires a fresh
/// bootstrap.
pub struct VenueChain {
    priority: Vec<String>,
    active: Option<(usize, Arc<dyn MarketDataSource>)>,
    mode: watch::Sender<FeedMode>,
}

impl VenueChain {
    pub fn new(priority: Vec<String>) -> Result<Self> {
        if priority.is_empty() {
            return Err(Error::Config("venue priority list is empty".into()));
        }
        let (mode, _) = watch::channel(FeedMode::Failover);
        Ok(Self {
            priority,
            active: None,
            mode,
        })
    }

    pub fn priority(&self) -> &[String] {
        &self.priority
    }

    pub fn mode(&self) -> FeedMode {
        self.mode.borrow().clone()
    }

    pub fn subscribe_mode(&self) -> watch::Receiver<FeedMode> {
        self.mode.subscribe()
    }

    /// Current (index, source), or `None` in mock mode
    pub fn active(&self) -> Option<(usize, Arc<dyn MarketDataSource>)> {
        self.active.clone()
    }

    /// Walk the whole priority list from the top.
    pub async fn bootstrap(&mut self, factory: &dyn SourceFactory) -> FeedMode {
        self.probe_from(factory, 0, &mut HashSet::new()).await
    }

    /// Move past the venue at `failed`, which errored during the current call.
    ///
    /// Candidates after `failed` are probed in priority order, wrapping
    /// around and skipping everything in `tried`. If another caller already
    /// moved the chain off `failed`, only the bookkeeping is updated.
    pub async fn fail_over(
        &mut self,
        factory: &dyn SourceFactory,
        failed: usize,
        tried: &mut HashSet<usize>,
    ) -> FeedMode {
        tried.insert(failed);
        match &self.active {
            Some((index, _)) if *index == failed => {}
            _ => return self.mode(),
        }
        self.probe_from(factory, failed + 1, tried).await
    }

    async fn probe_from(
        &mut self,
        factory: &dyn SourceFactory,
        start: usize,
        tried: &mut HashSet<usize>,
    ) -> FeedMode {
        self.active = None;
        self.mode.send_replace(FeedMode::Failover);

        let n = self.priority.len();
        for offset in 0..n {
            let index = (start + offset) % n;
            if !tried.insert(index) {
                continue;
            }
            let venue = &self.priority[index];
            match factory.bootstrap(venue).await {
                Ok(source) => {
                    info!(venue = %venue, index, "market data source live");
                    self.active = Some((index, source));
                    let mode = FeedMode::Live {
                        index,
                        venue: venue.clone(),
                    };
                    self.mode.send_replace(mode.clone());
                    return mode;
                }
                Err(e) => warn!(venue = %venue, "Venue failed to initialize: {}", e),
            }
        }

        warn!("all venues exhausted, switching to synthetic data");
        self.mode.send_replace(FeedMode::Mock);
        FeedMode::Mock
    }
}
