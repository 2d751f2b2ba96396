//! Open positions and their lifecycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a position or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// The side that closes this one.
    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Order action name used by the terminal bridge.
    pub fn as_action(&self) -> &'static str {
        match self {
            Side::Long => "BUY",
            Side::Short => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_action())
    }
}

/// Lifecycle of a tracked position.
///
/// `Pending` covers the window between submitting an order and the broker
/// confirming it; `Closing` covers an in-flight close or cancel, which
/// reverts to `Open` if the broker rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Pending,
    Open,
    Closing,
    Closed,
}

/// A broker-confirmed position. The ticket is broker-assigned and is the
/// key into the order manager's table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub volume: Decimal,
    pub open_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,

    /// Strategy identifier attached to every order, used to tell this
    /// bot's positions apart from others on the same account.
    pub magic: u64,

    pub opened_at: DateTime<Utc>,
}
