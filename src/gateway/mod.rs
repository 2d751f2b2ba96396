//! Broker gateway: the engine's only external boundary.
//!
//! The terminal session itself (connect, login, shutdown) lives on the
//! other side of this trait. The live implementation talks JSON to an
//! Expert-Advisor HTTP bridge running inside the terminal; tests inject a
//! fake.

mod bridge;

#[cfg(test)]
pub mod fake;

pub use bridge::BridgeGateway;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{
    AccountSnapshot, Bar, ClosedTrade, OrderAck, OrderRequest, Position, Quote, Side, SymbolSpec,
    Timeframe,
};

/// Gateway-level failures. All of these are transient from the poll loop's
/// point of view: it logs, backs off and retries next cycle.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("bridge unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("bridge returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("terminal error: {0}")]
    Terminal(String),
}

/// Capability surface of the broker terminal.
///
/// Calls are awaited to completion inside a poll cycle; implementations
/// must be safe to share behind an `Arc`.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    async fn account_snapshot(&self) -> Result<AccountSnapshot, GatewayError>;

    /// The most recent `count` bars, oldest first.
    async fn bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>, GatewayError>;

    async fn quote(&self, symbol: &str) -> Result<Quote, GatewayError>;

    async fn symbol_spec(&self, symbol: &str) -> Result<SymbolSpec, GatewayError>;

    /// Open positions for the symbol, all magics included; the order
    /// manager filters to its own tag.
    async fn open_positions(&self, symbol: &str) -> Result<Vec<Position>, GatewayError>;

    /// Closed deals since `since`, ordered oldest to newest.
    async fn closed_trades(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClosedTrade>, GatewayError>;

    /// Margin the broker would reserve for the prospective order, in the
    /// account currency.
    async fn required_margin(
        &self,
        side: Side,
        symbol: &str,
        volume: Decimal,
        price: Decimal,
    ) -> Result<Decimal, GatewayError>;

    async fn send_order(&self, request: &OrderRequest) -> Result<OrderAck, GatewayError>;

    /// Broker-side dry run of a request (funds check), used before closes.
    async fn check_order(&self, request: &OrderRequest) -> Result<OrderAck, GatewayError>;

    async fn cancel_order(&self, ticket: u64) -> Result<OrderAck, GatewayError>;

    /// Select the symbol in Market Watch so it becomes tradable. Returns
    /// whether the symbol is now visible.
    async fn ensure_symbol_visible(&self, symbol: &str) -> Result<bool, GatewayError>;
}
