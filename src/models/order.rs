//! Order requests, broker acknowledgements and trade history entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;

/// The only terminal return code that counts as success.
pub const TRADE_RETCODE_DONE: u32 = 10009;

/// A trading request, constructed per decision and never persisted.
///
/// `price == None` means a market order filled at the current quote;
/// `position` carries the ticket being closed when this request closes an
/// existing position.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub volume: Decimal,
    pub price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,

    /// Allowed slippage from the requested price, in points
    pub deviation: u32,

    /// Ticket of the position this request closes, if any
    pub position: Option<u64>,

    pub magic: u64,
    pub comment: String,
}

/// Broker acknowledgement for a send/check/cancel request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub retcode: u32,

    /// Broker-assigned ticket, present when the order was accepted
    #[serde(default)]
    pub ticket: Option<u64>,

    /// Price the order was actually filled at
    #[serde(default)]
    pub price: Option<Decimal>,

    #[serde(default)]
    pub comment: Option<String>,
}

impl OrderAck {
    pub fn is_done(&self) -> bool {
        self.retcode == TRADE_RETCODE_DONE
    }

    pub fn comment_or_default(&self) -> String {
        self.comment.clone().unwrap_or_else(|| "no comment".to_string())
    }
}

/// A closed deal from the account history. The gateway returns these
/// ordered oldest to newest; entry deals carry zero profit and are
/// filtered out before the martingale sizer looks at the last one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub time: DateTime<Utc>,
    pub profit: Decimal,
    pub volume: Decimal,
}

/// Current bid/ask for a symbol. Buys fill at ask, sells at bid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub bid: Decimal,
    pub ask: Decimal,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub time: DateTime<Utc>,
}

impl Quote {
    /// Side of the book an order on `side` fills against.
    pub fn entry_price(&self, side: Side) -> Decimal {
        match side {
            Side::Long => self.ask,
            Side::Short => self.bid,
        }
    }
}

/// Static symbol properties from the terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSpec {
    /// Smallest price increment; stop distances configured in points are
    /// multiplied by this
    pub point: Decimal,

    #[serde(default)]
    pub digits: u32,

    /// Whether the symbol is selected in Market Watch. Orders on an
    /// invisible symbol are rejected by the terminal.
    pub visible: bool,

    #[serde(default = "default_true")]
    pub trade_allowed: bool,
}

fn default_true() -> bool {
    true
}
