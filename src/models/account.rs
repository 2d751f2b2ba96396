//! Account snapshot as reported by the terminal each poll.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time view of the trading account. Refreshed every poll cycle
/// and treated as immutable for the rest of the cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Account balance (realized only)
    pub balance: Decimal,

    /// Balance plus floating P&L of open positions
    pub equity: Decimal,

    /// Margin currently reserved for open positions
    pub margin: Decimal,

    /// Margin still available for new positions
    #[serde(rename = "margin_free")]
    pub free_margin: Decimal,

    /// Account deposit currency (e.g. "USD")
    pub currency: String,

    /// Account leverage (e.g. 100 for 1:100)
    #[serde(default)]
    pub leverage: i64,

    /// Floating profit of all open positions
    #[serde(default)]
    pub profit: Decimal,
}
