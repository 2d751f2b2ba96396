//! Pre-trade margin validation.
//!
//! Three independent checks against the account snapshot, evaluated in
//! order; the first failure is reported. The broker would reject the
//! order anyway, but validating locally keeps the rejection out of the
//! terminal's journal and gives a precise reason in our own logs.

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::models::{AccountSnapshot, OrderRequest};

/// Which account figure fell short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginCheck {
    Balance,
    Equity,
    FreeMargin,
}

impl std::fmt::Display for MarginCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarginCheck::Balance => write!(f, "balance"),
            MarginCheck::Equity => write!(f, "equity"),
            MarginCheck::FreeMargin => write!(f, "free margin"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{check} {available} below required margin {required}")]
pub struct MarginShortfall {
    pub check: MarginCheck,
    pub required: Decimal,
    pub available: Decimal,
}

/// Validate that the account can carry the order's margin requirement.
pub fn validate_margin(
    request: &OrderRequest,
    account: &AccountSnapshot,
    required: Decimal,
) -> Result<(), MarginShortfall> {
    debug!(
        symbol = %request.symbol,
        volume = %request.volume,
        required = %required,
        "margin check"
    );
    let checks = [
        (MarginCheck::Balance, account.balance),
        (MarginCheck::Equity, account.equity),
        (MarginCheck::FreeMargin, account.free_margin),
    ];
    for (check, available) in checks {
        if available < required {
            return Err(MarginShortfall {
                check,
                required,
                available,
            });
        }
    }
    Ok(())
}
