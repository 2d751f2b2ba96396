//! Engine error taxonomy.
//!
//! Every gateway-facing operation returns a typed result; the poll loop in
//! `engine` is the only place that decides between "back off and retry next
//! cycle" and "log and continue". Nothing here is fatal to the process
//! except configuration errors detected at startup.

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::trading::MarginShortfall;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Too few bars to evaluate the signal; the cycle is skipped.
    #[error("insufficient data: have {have} bars, need {need}")]
    InsufficientData { have: usize, need: usize },

    /// Connectivity or terminal failure; backed off and retried next cycle.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The prospective order failed a margin check; no retry this cycle.
    #[error("margin insufficient: {0}")]
    MarginInsufficient(#[from] MarginShortfall),

    /// Broker-side decline, surfaced with the terminal's reason and not
    /// retried automatically within the same cycle.
    #[error("order rejected: retcode={retcode}, {comment}")]
    OrderRejected { retcode: u32, comment: String },

    /// A locally tracked position the gateway does not report; resolved by
    /// reconciliation dropping the local entry.
    #[error("position {ticket} not found")]
    PositionNotFound { ticket: u64 },

    /// Irrecoverable configuration problem detected at startup.
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Whether the poll loop should back off and retry next cycle rather
    /// than continue at the normal cadence.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Gateway(_) | EngineError::InsufficientData { .. }
        )
    }
}
