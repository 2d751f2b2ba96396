//! Data models for account state, bars, quotes, orders and positions.

mod account;
mod bar;
mod order;
mod position;

pub use account::AccountSnapshot;
pub use bar::{Bar, Timeframe};
pub use order::{ClosedTrade, OrderAck, OrderRequest, Quote, SymbolSpec, TRADE_RETCODE_DONE};
pub use position::{Lifecycle, Position, Side};
