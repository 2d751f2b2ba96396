//! In-memory gateway for tests: scripted responses, recorded requests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::{
    AccountSnapshot, Bar, ClosedTrade, OrderAck, OrderRequest, Position, Quote, Side, SymbolSpec,
    Timeframe, TRADE_RETCODE_DONE,
};

use super::{BrokerGateway, GatewayError};

/// Fake broker terminal. Responses default to success; tests script
/// rejections by pushing acks onto the relevant queue.
pub struct FakeGateway {
    pub account: Mutex<AccountSnapshot>,
    pub bars: Mutex<Vec<Bar>>,
    pub quote: Mutex<Quote>,
    pub spec: Mutex<SymbolSpec>,
    pub positions: Mutex<Vec<Position>>,
    pub closed: Mutex<Vec<ClosedTrade>>,
    pub margin: Mutex<Decimal>,

    /// Every request passed to `send_order`, in call order
    pub sent: Mutex<Vec<OrderRequest>>,
    /// Every ticket passed to `cancel_order`
    pub cancelled: Mutex<Vec<u64>>,

    /// Scripted acks; when empty the call succeeds with a fresh ticket
    pub send_queue: Mutex<VecDeque<OrderAck>>,
    pub check_queue: Mutex<VecDeque<OrderAck>>,
    pub cancel_queue: Mutex<VecDeque<OrderAck>>,

    pub select_result: Mutex<bool>,
    next_ticket: AtomicU64,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            account: Mutex::new(AccountSnapshot {
                balance: dec!(10000),
                equity: dec!(10000),
                margin: Decimal::ZERO,
                free_margin: dec!(10000),
                currency: "USD".to_string(),
                leverage: 100,
                profit: Decimal::ZERO,
            }),
            bars: Mutex::new(Vec::new()),
            quote: Mutex::new(Quote {
                bid: dec!(2326.05),
                ask: dec!(2326.35),
                time: Utc::now(),
            }),
            spec: Mutex::new(SymbolSpec {
                point: dec!(0.01),
                digits: 2,
                visible: true,
                trade_allowed: true,
            }),
            positions: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            margin: Mutex::new(dec!(100)),
            sent: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            send_queue: Mutex::new(VecDeque::new()),
            check_queue: Mutex::new(VecDeque::new()),
            cancel_queue: Mutex::new(VecDeque::new()),
            select_result: Mutex::new(true),
            next_ticket: AtomicU64::new(1000),
        }
    }

    fn done_ack(&self) -> OrderAck {
        OrderAck {
            retcode: TRADE_RETCODE_DONE,
            ticket: Some(self.next_ticket.fetch_add(1, Ordering::SeqCst)),
            price: Some(dec!(2326.35)),
            comment: Some("Request completed".to_string()),
        }
    }

    pub fn reject_ack(retcode: u32, comment: &str) -> OrderAck {
        OrderAck {
            retcode,
            ticket: None,
            price: None,
            comment: Some(comment.to_string()),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

/// Build a bar series from closes, one hour apart, oldest first.
pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let close = Decimal::try_from(close).unwrap();
            Bar {
                time: start + Duration::hours(i as i64),
                open: close,
                high: close + dec!(0.5),
                low: close - dec!(0.5),
                close,
                tick_volume: 100,
            }
        })
        .collect()
}

pub fn open_position(ticket: u64, side: Side, magic: u64) -> Position {
    Position {
        ticket,
        symbol: "XAUUSD".to_string(),
        side,
        volume: dec!(0.1),
        open_price: dec!(2326.35),
        stop_loss: None,
        take_profit: None,
        magic,
        opened_at: Utc::now(),
    }
}

#[async_trait]
impl BrokerGateway for FakeGateway {
    async fn account_snapshot(&self) -> Result<AccountSnapshot, GatewayError> {
        Ok(self.account.lock().unwrap().clone())
    }

    async fn bars(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>, GatewayError> {
        let bars = self.bars.lock().unwrap();
        let skip = bars.len().saturating_sub(count);
        Ok(bars[skip..].to_vec())
    }

    async fn quote(&self, _symbol: &str) -> Result<Quote, GatewayError> {
        Ok(self.quote.lock().unwrap().clone())
    }

    async fn symbol_spec(&self, _symbol: &str) -> Result<SymbolSpec, GatewayError> {
        Ok(self.spec.lock().unwrap().clone())
    }

    async fn open_positions(&self, _symbol: &str) -> Result<Vec<Position>, GatewayError> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn closed_trades(
        &self,
        _symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClosedTrade>, GatewayError> {
        Ok(self
            .closed
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.time >= since)
            .cloned()
            .collect())
    }

    async fn required_margin(
        &self,
        _side: Side,
        _symbol: &str,
        _volume: Decimal,
        _price: Decimal,
    ) -> Result<Decimal, GatewayError> {
        Ok(*self.margin.lock().unwrap())
    }

    async fn send_order(&self, request: &OrderRequest) -> Result<OrderAck, GatewayError> {
        self.sent.lock().unwrap().push(request.clone());
        let scripted = self.send_queue.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| self.done_ack()))
    }

    async fn check_order(&self, _request: &OrderRequest) -> Result<OrderAck, GatewayError> {
        let scripted = self.check_queue.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| self.done_ack()))
    }

    async fn cancel_order(&self, ticket: u64) -> Result<OrderAck, GatewayError> {
        self.cancelled.lock().unwrap().push(ticket);
        let scripted = self.cancel_queue.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| self.done_ack()))
    }

    async fn ensure_symbol_visible(&self, _symbol: &str) -> Result<bool, GatewayError> {
        Ok(*self.select_result.lock().unwrap())
    }
}
