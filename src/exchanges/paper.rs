//! Paper venue - in-process exchange adapter for paper mode and tests

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::{
    BalanceSnapshot, ConnectionState, Error, ExchangeInterface, OrderRequest, OrderState,
    OrderStatus, OrderType, Result, Symbol, Ticker, TickerStream,
};

struct TickFeed {
    tx: flume::Sender<Ticker>,
    rx: flume::Receiver<Ticker>,
}

struct RestingOrder {
    symbol: Symbol,
    status: OrderStatus,
}

/// Paper exchange adapter.
///
/// Ticks are injected with [`PaperExchange::push_tick`]. Market orders fill
/// immediately at the last pushed price; every other order type rests until
/// cancelled.
pub struct PaperExchange {
    name: String,
    connection: ConnectionState,
    feeds: RwLock<HashMap<Symbol, TickFeed>>,
    last_prices: RwLock<HashMap<Symbol, Decimal>>,
    open_orders: RwLock<BTreeMap<String, RestingOrder>>,
    balances: RwLock<BTreeMap<String, (Decimal, Decimal)>>,
}

impl PaperExchange {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connection: ConnectionState::new(),
            feeds: RwLock::new(HashMap::new()),
            last_prices: RwLock::new(HashMap::new()),
            open_orders: RwLock::new(BTreeMap::new()),
            balances: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_balance(self, asset: impl Into<String>, free: Decimal) -> Self {
        self.balances.write().insert(asset.into(), (free, Decimal::ZERO));
        self
    }

    /// Feed a tick to the subscribers of its symbol.
    pub fn push_tick(&self, tick: Ticker) -> Result<()> {
        if let Ok(last) = Decimal::try_from(tick.last) {
            self.last_prices.write().insert(tick.symbol.clone(), last);
        }
        let feeds = self.feeds.read();
        let feed = feeds.get(&tick.symbol).ok_or_else(|| {
            Error::InvalidState(format!("{} is not subscribed to {}", self.name, tick.symbol))
        })?;
        feed.tx
            .send(tick)
            .map_err(|_| Error::InvalidState(format!("{} feed closed", self.name)))
    }

    pub fn is_subscribed(&self, symbol: &Symbol) -> bool {
        self.feeds.read().contains_key(symbol)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connection.is_connected() {
            Ok(())
        } else {
            Err(Error::InvalidState(format!("{} is not connected", self.name)))
        }
    }
}

#[async_trait]
impl ExchangeInterface for PaperExchange {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    async fn connect(&self) -> Result<()> {
        if !self.connection.is_connected() {
            info!(venue = %self.name, "paper venue connected");
        }
        self.connection.mark_connected();
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.feeds.write().clear();
        self.connection.mark_disconnected();
        debug!(venue = %self.name, "paper venue disconnected");
        Ok(())
    }

    async fn subscribe_ticker(&self, symbol: &Symbol) -> Result<()> {
        self.ensure_connected()?;
        self.feeds.write().entry(symbol.clone()).or_insert_with(|| {
            let (tx, rx) = flume::unbounded();
            TickFeed { tx, rx }
        });
        Ok(())
    }

    async fn unsubscribe_ticker(&self, symbol: &Symbol) -> Result<()> {
        // dropping the sender ends every stream handed out for this symbol
        self.feeds.write().remove(symbol);
        Ok(())
    }

    fn ticker_stream(&self, symbol: &Symbol) -> Result<TickerStream> {
        let feeds = self.feeds.read();
        let feed = feeds.get(symbol).ok_or_else(|| {
            Error::InvalidState(format!("{} is not subscribed to {}", self.name, symbol))
        })?;
        Ok(feed.rx.clone().into_stream().map(Ok).boxed())
    }

    async fn fetch_balances(&self) -> Result<Vec<BalanceSnapshot>> {
        Ok(self
            .balances
            .read()
            .iter()
            .map(|(asset, (free, locked))| BalanceSnapshot::new(asset.clone(), *free, *locked))
            .collect())
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderStatus> {
        self.ensure_connected()?;
        if request.quantity <= Decimal::ZERO {
            return Err(Error::InvalidOrder(format!("quantity must be positive, got {}", request.quantity)));
        }
        if request.order_type.requires_price() && request.price.is_none() {
            return Err(Error::InvalidOrder(format!("{} order requires a price", request.order_type)));
        }

        info!(
            venue = %self.name,
            "Placing order: {} {} {} @ {:?}",
            request.side, request.quantity, request.symbol, request.price
        );

        let exchange_order_id = format!("paper_{}", Uuid::new_v4());
        let status = match request.order_type {
            OrderType::Market => {
                let fill = request
                    .price
                    .or_else(|| self.last_prices.read().get(&request.symbol).copied())
                    .ok_or_else(|| {
                        Error::Exchange(format!("no market price for {}", request.symbol))
                    })?;
                OrderStatus {
                    exchange_order_id,
                    client_order_id: request.client_order_id.clone(),
                    state: OrderState::Filled,
                    filled_qty: request.quantity,
                    remaining_qty: Decimal::ZERO,
                    avg_price: Some(fill),
                    raw_response: BTreeMap::new(),
                }
            }
            _ => {
                let status = OrderStatus {
                    exchange_order_id: exchange_order_id.clone(),
                    client_order_id: request.client_order_id.clone(),
                    state: OrderState::Open,
                    filled_qty: Decimal::ZERO,
                    remaining_qty: request.quantity,
                    avg_price: None,
                    raw_response: BTreeMap::new(),
                };
                self.open_orders.write().insert(
                    exchange_order_id,
                    RestingOrder {
                        symbol: request.symbol.clone(),
                        status: status.clone(),
                    },
                );
                status
            }
        };
        Ok(status)
    }

    async fn cancel_order(&self, exchange_order_id: &str, symbol: Option<&Symbol>) -> Result<OrderStatus> {
        let mut orders = self.open_orders.write();
        let matches = orders
            .get(exchange_order_id)
            .is_some_and(|o| symbol.is_none_or(|s| *s == o.symbol));
        if !matches {
            return Err(Error::Exchange(format!("unknown order {}", exchange_order_id)));
        }

        debug!(venue = %self.name, "Cancelling order: {}", exchange_order_id);
        let mut status = orders
            .remove(exchange_order_id)
            .map(|o| o.status)
            .ok_or_else(|| Error::Exchange(format!("unknown order {}", exchange_order_id)))?;
        status.state = OrderState::Cancelled;
        Ok(status)
    }

    async fn fetch_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<OrderStatus>> {
        Ok(self
            .open_orders
            .read()
            .values()
            .filter(|o| symbol.is_none_or(|s| *s == o.symbol))
            .map(|o| o.status.clone())
            .collect())
    }
}
