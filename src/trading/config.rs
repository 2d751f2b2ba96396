//! Per-trade parameters shared by the sizer, risk checks and order flow.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone)]
pub struct TradeConfig {
    /// Starting lot size and martingale floor.
    pub base_volume: Decimal,
    /// Applied to the volume after a losing trade.
    pub multiplier: Decimal,
    /// Hard cap on simultaneous positions in one direction.
    pub max_positions_per_side: usize,
    /// Stop distance from the entry price, in points.
    pub stop_loss_points: Decimal,
    /// Target distance from the entry price, in points.
    pub take_profit_points: Decimal,
    /// Allowed slippage, in points.
    pub deviation: u32,
    /// Identifies this bot's positions at the broker.
    pub magic: u64,
    pub comment: String,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            base_volume: dec!(0.1),
            multiplier: dec!(2),
            max_positions_per_side: 2,
            stop_loss_points: dec!(200),
            take_profit_points: dec!(500),
            deviation: 20,
            magic: 100922,
            comment: "golddigger".to_string(),
        }
    }
}
