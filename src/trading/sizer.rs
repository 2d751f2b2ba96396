//! Martingale position sizing off the realized trade history.
//!
//! The sizer never mutates in place. Each tick the engine hands it the
//! most recent closed trade and the previous state, and gets back the
//! volume to use plus the next state. A closed trade is only acted on
//! once: the state remembers which closure it last saw and ignores
//! repeats, so polling the same history every tick is harmless.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::models::ClosedTrade;

/// Sizing state carried across ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeState {
    /// Volume the next entry will use.
    pub current: Decimal,
    /// Floor and reset target.
    pub base: Decimal,
    /// Factor applied after a losing trade.
    pub multiplier: Decimal,
    /// Close time and profit of the last trade already folded in.
    last_seen: Option<(DateTime<Utc>, Decimal)>,
}

impl VolumeState {
    pub fn new(base: Decimal, multiplier: Decimal) -> Self {
        Self {
            current: base,
            base,
            multiplier,
            last_seen: None,
        }
    }
}

/// Fold the most recent closed trade into the sizing state.
///
/// Returns the volume for the next entry and the updated state. A loss
/// multiplies the current volume; a win or break-even resets it to base.
/// The same closed trade, identified by its close time and profit, is
/// never applied twice.
pub fn next_volume(
    last_closed: Option<&ClosedTrade>,
    state: &VolumeState,
) -> (Decimal, VolumeState) {
    let Some(trade) = last_closed else {
        // No history in the lookback window counts as non-loss.
        let next = VolumeState {
            current: state.base,
            ..state.clone()
        };
        return (next.current, next);
    };

    let observation = (trade.time, trade.profit);
    if state.last_seen == Some(observation) {
        return (state.current, state.clone());
    }

    let current = if trade.profit < Decimal::ZERO {
        let doubled = state.current * state.multiplier;
        info!(
            profit = %trade.profit,
            from = %state.current,
            to = %doubled,
            "losing trade, scaling volume"
        );
        doubled.max(state.base)
    } else {
        info!(profit = %trade.profit, to = %state.base, "resetting volume to base");
        state.base
    };

    let next = VolumeState {
        current,
        base: state.base,
        multiplier: state.multiplier,
        last_seen: Some(observation),
    };
    (next.current, next)
}
