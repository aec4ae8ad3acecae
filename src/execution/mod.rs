//! Execution layer - Venue-keyed order routing

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::{Error, ExchangeInterface, OrderRequest, OrderStatus, Result, Symbol};

/// Order router - dispatches order operations to registered venues.
///
/// `route` holds the submission lock across lookup, connect and submit, so
/// order submissions are serialized process-wide. Registration takes the same
/// lock. `cancel` and `open_orders` never wait on it.
pub struct OrderRouter {
    exchanges: RwLock<HashMap<String, Arc<dyn ExchangeInterface>>>,
    submission: Mutex<()>,
}

impl OrderRouter {
    pub fn new() -> Self {
        Self::with_exchanges(std::iter::empty())
    }

    pub fn with_exchanges<I>(exchanges: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ExchangeInterface>>,
    {
        let table = exchanges
            .into_iter()
            .map(|ex| (ex.name().to_string(), ex))
            .collect();
        Self {
            exchanges: RwLock::new(table),
            submission: Mutex::new(()),
        }
    }

    /// Add or replace a venue under its name
    pub async fn register_exchange(&self, exchange: Arc<dyn ExchangeInterface>) {
        let name = exchange.name().to_string();
        let _submission = self.submission.lock().await;
        if self.exchanges.write().insert(name.clone(), exchange).is_some() {
            debug!(venue = %name, "replaced routed exchange");
        }
        info!(venue = %name, "exchange available for routing");
    }

    /// Submit an order to `venue`, connecting it first if needed
    pub async fn route(&self, request: &OrderRequest, venue: &str) -> Result<OrderStatus> {
        let _submission = self.submission.lock().await;
        let exchange = self.lookup(venue)?;

        if !exchange.is_connected() {
            debug!(venue, "connecting before order submission");
            exchange.connect().await?;
        }

        info!(
            venue,
            "Routing order: {} {} {} @ {:?}",
            request.side, request.quantity, request.symbol, request.price
        );
        let status = exchange.place_order(request).await?;
        debug!(venue, order_id = %status.exchange_order_id, state = ?status.state, "order accepted");
        Ok(status)
    }

    /// Cancel an order on an already-connected venue
    pub async fn cancel(&self, venue: &str, exchange_order_id: &str, symbol: Option<&Symbol>) -> Result<OrderStatus> {
        let exchange = self.lookup(venue)?;
        exchange.cancel_order(exchange_order_id, symbol).await
    }

    /// Open orders on an already-connected venue
    pub async fn open_orders(&self, venue: &str, symbol: Option<&Symbol>) -> Result<Vec<OrderStatus>> {
        let exchange = self.lookup(venue)?;
        exchange.fetch_open_orders(symbol).await
    }

    /// Registered venue names, sorted
    pub fn venues(&self) -> Vec<String> {
        let mut names: Vec<String> = self.exchanges.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn lookup(&self, venue: &str) -> Result<Arc<dyn ExchangeInterface>> {
        self.exchanges
            .read()
            .get(venue)
            .cloned()
            .ok_or_else(|| Error::VenueNotRegistered(venue.to_string()))
    }
}

impl Default for OrderRouter {
    fn default() -> Self {
        Self::new()
    }
}
