//! Signal evaluation: pure functions of the bar window.
//!
//! Every rule is a pure function of the bars it is given; no rule keeps
//! state between ticks. Two trigger modes exist and both are supported:
//! edge-trigger rules fire only on the tick where a condition becomes true
//! (MA crossover, Bollinger re-entry), while the RSI rule is
//! level-trigger and fires on the current sample alone as long as the
//! condition holds. The engine is responsible for not stacking entries
//! while a level-trigger condition persists.

use rust_decimal::prelude::ToPrimitive;

use crate::error::EngineError;
use crate::models::Bar;

use super::indicators::{bollinger, rsi, sma};

/// Directional signal for the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    None,
    EnterLong,
    EnterShort,
    ExitLong,
    ExitShort,
}

/// Configurable signal rule. The near-duplicate strategy scripts this bot
/// grew out of are generalized here as variants instead of separate
/// programs.
#[derive(Debug, Clone)]
pub enum SignalRule {
    /// Fast/slow SMA crossover, edge-trigger: fires only when the strict
    /// inequality between the two averages flips between the previous and
    /// current sample.
    MaCrossover { fast: usize, slow: usize },

    /// RSI against a Bollinger band, level-trigger on the current sample:
    /// oversold RSI with price back at or above the lower band enters
    /// long, overbought RSI with price at or below the upper band enters
    /// short.
    RsiBand {
        rsi_period: usize,
        band_period: usize,
        band_std_dev: f64,
        oversold: f64,
        overbought: f64,
    },

    /// Band re-entry, two-sample edge: previous close outside a Bollinger
    /// band and current close back inside it.
    BollingerReentry { period: usize, std_dev: f64 },
}

impl SignalRule {
    /// Number of bars needed before the current one; `evaluate` requires
    /// `lookback() + 1` bars in total.
    pub fn lookback(&self) -> usize {
        match self {
            SignalRule::MaCrossover { slow, .. } => *slow,
            SignalRule::RsiBand {
                rsi_period,
                band_period,
                ..
            } => (*rsi_period).max(*band_period),
            SignalRule::BollingerReentry { period, .. } => *period,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SignalRule::MaCrossover { .. } => "ma-crossover",
            SignalRule::RsiBand { .. } => "rsi-band",
            SignalRule::BollingerReentry { .. } => "bollinger-reentry",
        }
    }

    /// Evaluate the rule over the bar window, oldest bar first.
    pub fn evaluate(&self, bars: &[Bar]) -> Result<Signal, EngineError> {
        let need = self.lookback() + 1;
        if bars.len() < need {
            return Err(EngineError::InsufficientData {
                have: bars.len(),
                need,
            });
        }

        let closes: Vec<f64> = bars
            .iter()
            .map(|b| b.close.to_f64().unwrap_or(0.0))
            .collect();
        let short = |have: usize| EngineError::InsufficientData { have, need };

        match *self {
            SignalRule::MaCrossover { fast, slow } => {
                let n = closes.len();
                let previous = &closes[..n - 1];
                let fast_prev = sma(previous, fast).ok_or_else(|| short(n - 1))?;
                let slow_prev = sma(previous, slow).ok_or_else(|| short(n - 1))?;
                let fast_cur = sma(&closes, fast).ok_or_else(|| short(n))?;
                let slow_cur = sma(&closes, slow).ok_or_else(|| short(n))?;

                if fast_prev < slow_prev && fast_cur > slow_cur {
                    Ok(Signal::EnterLong)
                } else if fast_prev > slow_prev && fast_cur < slow_cur {
                    Ok(Signal::EnterShort)
                } else {
                    Ok(Signal::None)
                }
            }

            SignalRule::RsiBand {
                rsi_period,
                band_period,
                band_std_dev,
                oversold,
                overbought,
            } => {
                let n = closes.len();
                let rsi_cur = rsi(&closes, rsi_period).ok_or_else(|| short(n))?;
                let (lower, upper) =
                    bollinger(&closes, band_period, band_std_dev).ok_or_else(|| short(n))?;
                let close = closes[n - 1];

                if rsi_cur <= oversold && close >= lower {
                    Ok(Signal::EnterLong)
                } else if rsi_cur >= overbought && close <= upper {
                    Ok(Signal::EnterShort)
                } else {
                    Ok(Signal::None)
                }
            }

            SignalRule::BollingerReentry { period, std_dev } => {
                let n = closes.len();
                let (lower, upper) =
                    bollinger(&closes, period, std_dev).ok_or_else(|| short(n))?;
                let previous = closes[n - 2];
                let current = closes[n - 1];

                if previous < lower && current >= lower {
                    Ok(Signal::EnterLong)
                } else if previous > upper && current <= upper {
                    Ok(Signal::EnterShort)
                } else {
                    Ok(Signal::None)
                }
            }
        }
    }
}
