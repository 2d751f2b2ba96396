//! Order lifecycle and the local position table.
//!
//! Every broker-visible action flows through `OrderManager`, which keeps
//! the bot's own view of its positions keyed by broker ticket. States
//! follow Pending -> Open -> Closing -> Closed; a rejected close reverts
//! the position to Open and surfaces the terminal's reason. The table is
//! rebuilt from the gateway every cycle by `reconcile`, so a restart or a
//! manual close in the terminal never leaves a stale entry behind.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::gateway::BrokerGateway;
use crate::models::{Lifecycle, OrderRequest, Position, Side};

use super::TradeConfig;

/// Locally tracked position plus its lifecycle state.
#[derive(Debug, Clone)]
pub struct TrackedPosition {
    pub position: Position,
    pub state: Lifecycle,
}

/// Result of a cancel attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The ticket is not tracked locally; treated as already gone.
    NotFound,
}

pub struct OrderManager {
    gateway: Arc<dyn BrokerGateway>,
    magic: u64,
    deviation: u32,
    comment: String,
    positions: HashMap<u64, TrackedPosition>,
}

impl OrderManager {
    pub fn new(gateway: Arc<dyn BrokerGateway>, trade: &TradeConfig) -> Self {
        Self {
            gateway,
            magic: trade.magic,
            deviation: trade.deviation,
            comment: trade.comment.clone(),
            positions: HashMap::new(),
        }
    }

    pub fn open_count(&self, side: Side) -> usize {
        self.positions
            .values()
            .filter(|t| t.state == Lifecycle::Open && t.position.side == side)
            .count()
    }

    pub fn tickets_on_side(&self, side: Side) -> Vec<u64> {
        self.positions
            .values()
            .filter(|t| t.state == Lifecycle::Open && t.position.side == side)
            .map(|t| t.position.ticket)
            .collect()
    }

    pub fn tracked(&self, ticket: u64) -> Option<&TrackedPosition> {
        self.positions.get(&ticket)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Send an entry order and track the resulting position. The entry is
    /// Pending until the terminal acknowledges it with a ticket, then Open.
    ///
    /// An invisible symbol is selected into Market Watch first; the order
    /// fails without reaching the broker if selection does not take.
    pub async fn place_order(&mut self, request: &OrderRequest) -> Result<u64, EngineError> {
        let gateway = Arc::clone(&self.gateway);

        let spec = gateway.symbol_spec(&request.symbol).await?;
        if !spec.visible {
            let selected = gateway.ensure_symbol_visible(&request.symbol).await?;
            if !selected {
                return Err(EngineError::OrderRejected {
                    retcode: 0,
                    comment: format!("symbol {} not visible", request.symbol),
                });
            }
            info!(symbol = %request.symbol, "symbol added to market watch");
        }

        let mut tracked = TrackedPosition {
            position: Position {
                ticket: 0,
                symbol: request.symbol.clone(),
                side: request.side,
                volume: request.volume,
                open_price: request.price.unwrap_or_default(),
                stop_loss: request.stop_loss,
                take_profit: request.take_profit,
                magic: request.magic,
                opened_at: Utc::now(),
            },
            state: Lifecycle::Pending,
        };

        let ack = gateway.send_order(request).await?;
        if !ack.is_done() {
            warn!(
                retcode = ack.retcode,
                comment = %ack.comment_or_default(),
                "entry order rejected"
            );
            return Err(EngineError::OrderRejected {
                retcode: ack.retcode,
                comment: ack.comment_or_default(),
            });
        }

        let ticket = ack.ticket.ok_or_else(|| EngineError::OrderRejected {
            retcode: ack.retcode,
            comment: "done ack without ticket".to_string(),
        })?;

        tracked.position.ticket = ticket;
        if let Some(price) = ack.price {
            tracked.position.open_price = price;
        }
        tracked.state = Lifecycle::Open;

        info!(
            ticket,
            side = %request.side,
            volume = %request.volume,
            price = %tracked.position.open_price,
            "position opened"
        );
        self.positions.insert(ticket, tracked);
        Ok(ticket)
    }

    /// Close an open position at the counter price: a long is closed by
    /// selling at the bid, a short by buying at the ask. The request is
    /// pre-checked with the terminal before being sent.
    pub async fn close_position(&mut self, ticket: u64) -> Result<(), EngineError> {
        let gateway = Arc::clone(&self.gateway);

        let (symbol, side, volume) = {
            let tracked = self
                .positions
                .get_mut(&ticket)
                .ok_or(EngineError::PositionNotFound { ticket })?;
            tracked.state = Lifecycle::Closing;
            (
                tracked.position.symbol.clone(),
                tracked.position.side,
                tracked.position.volume,
            )
        };

        let close_side = side.opposite();
        let result = async {
            let quote = gateway.quote(&symbol).await?;
            let request = OrderRequest {
                symbol: symbol.clone(),
                side: close_side,
                volume,
                price: Some(quote.entry_price(close_side)),
                stop_loss: None,
                take_profit: None,
                deviation: self.deviation,
                position: Some(ticket),
                magic: self.magic,
                comment: self.comment.clone(),
            };

            let check = gateway.check_order(&request).await?;
            if !check.is_done() {
                return Err(EngineError::OrderRejected {
                    retcode: check.retcode,
                    comment: check.comment_or_default(),
                });
            }

            let ack = gateway.send_order(&request).await?;
            if !ack.is_done() {
                return Err(EngineError::OrderRejected {
                    retcode: ack.retcode,
                    comment: ack.comment_or_default(),
                });
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.positions.remove(&ticket);
                info!(ticket, side = %side, "position closed");
                Ok(())
            }
            Err(err) => {
                // The position is still live at the broker.
                if let Some(tracked) = self.positions.get_mut(&ticket) {
                    tracked.state = Lifecycle::Open;
                }
                warn!(ticket, error = %err, "close failed, position stays open");
                Err(err)
            }
        }
    }

    /// Cancel a tracked pending order. Unknown tickets are a no-op: the
    /// order either never reached the broker or is already gone.
    pub async fn cancel_order(&mut self, ticket: u64) -> Result<CancelOutcome, EngineError> {
        let gateway = Arc::clone(&self.gateway);

        let Some(tracked) = self.positions.get_mut(&ticket) else {
            return Ok(CancelOutcome::NotFound);
        };
        tracked.state = Lifecycle::Closing;

        let ack = gateway.cancel_order(ticket).await?;
        if ack.is_done() {
            self.positions.remove(&ticket);
            info!(ticket, "order cancelled");
            return Ok(CancelOutcome::Cancelled);
        }

        if let Some(tracked) = self.positions.get_mut(&ticket) {
            tracked.state = Lifecycle::Open;
        }
        Err(EngineError::OrderRejected {
            retcode: ack.retcode,
            comment: ack.comment_or_default(),
        })
    }

    /// Replace the local table with the gateway's view, keeping only
    /// positions carrying our magic number. Known tickets keep their
    /// lifecycle state, unknown ones are adopted as Open, and tickets the
    /// gateway no longer reports are dropped.
    pub fn reconcile(&mut self, live: Vec<Position>) {
        let mut next = HashMap::new();
        for position in live {
            if position.magic != self.magic {
                continue;
            }
            let ticket = position.ticket;
            let state = match self.positions.remove(&ticket) {
                Some(existing) => existing.state,
                None => {
                    info!(ticket, side = %position.side, "adopting untracked position");
                    Lifecycle::Open
                }
            };
            next.insert(ticket, TrackedPosition { position, state });
        }

        for (ticket, tracked) in self.positions.drain() {
            warn!(
                ticket,
                state = ?tracked.state,
                "tracked position no longer at broker, dropping"
            );
        }
        self.positions = next;
    }
}
