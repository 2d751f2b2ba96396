//! Trading logic: signal evaluation, position sizing, risk checks and the
//! order-lifecycle state machine.

mod config;
pub mod indicators;
mod orders;
mod risk;
mod signal;
mod sizer;

pub use config::TradeConfig;
pub use orders::{CancelOutcome, OrderManager, TrackedPosition};
pub use risk::{validate_margin, MarginCheck, MarginShortfall};
pub use signal::{Signal, SignalRule};
pub use sizer::{next_volume, VolumeState};
