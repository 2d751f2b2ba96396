//! Poll loop: snapshot, reconcile, evaluate, act.
//!
//! One cycle per interval tick. The loop is the only place that decides
//! what an error means: transient failures (connectivity, short history)
//! back off for `backoff_secs` before the next cycle, anything else is
//! logged and the loop continues at the normal cadence. Only a failed
//! startup check stops the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::EngineError;
use crate::gateway::BrokerGateway;
use crate::models::{AccountSnapshot, OrderRequest, Side};
use crate::trading::{
    next_volume, validate_margin, OrderManager, Signal, SignalRule, TradeConfig, VolumeState,
};

/// Session window in broker-local hours. `start == end` means the market
/// is never considered open.
#[derive(Debug, Clone, Copy)]
pub struct TradingHours {
    pub start_hour: u32,
    pub end_hour: u32,
    /// Offset from UTC to the broker's clock, in hours.
    pub utc_offset_hours: i32,
}

impl TradingHours {
    pub fn in_session(&self, now: DateTime<Utc>) -> bool {
        let hour = (now.hour() as i32 + self.utc_offset_hours).rem_euclid(24) as u32;
        if self.start_hour == self.end_hour {
            false
        } else if self.start_hour < self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            // Window wraps past midnight.
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub symbol: String,
    pub timeframe: crate::models::Timeframe,
    /// Bars fetched per cycle; must cover the rule's lookback plus one.
    pub history_bars: usize,
    pub rule: SignalRule,
    pub trade: TradeConfig,
    pub poll_interval_secs: u64,
    pub backoff_secs: u64,
    /// When set, entries are suppressed outside the window. Positions are
    /// still reconciled on every cycle.
    pub trading_hours: Option<TradingHours>,
    /// How far back to scan closed trades for the sizer.
    pub pnl_lookback_days: i64,
}

pub struct Engine {
    config: EngineConfig,
    gateway: Arc<dyn BrokerGateway>,
    orders: OrderManager,
    volume_state: VolumeState,
    shutdown: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(config: EngineConfig, gateway: Arc<dyn BrokerGateway>) -> Self {
        let orders = OrderManager::new(Arc::clone(&gateway), &config.trade);
        let volume_state =
            VolumeState::new(config.trade.base_volume, config.trade.multiplier);
        Self {
            config,
            gateway,
            orders,
            volume_state,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Verify the symbol is tradeable before the first cycle. A symbol the
    /// terminal cannot make visible is the one unrecoverable condition.
    pub async fn startup_check(&self) -> Result<(), EngineError> {
        let spec = self.gateway.symbol_spec(&self.config.symbol).await?;
        if !spec.visible {
            let selected = self
                .gateway
                .ensure_symbol_visible(&self.config.symbol)
                .await?;
            if !selected {
                return Err(EngineError::Config(format!(
                    "symbol {} cannot be selected in the terminal",
                    self.config.symbol
                )));
            }
            info!(symbol = %self.config.symbol, "symbol added to market watch");
        }
        if !spec.trade_allowed {
            warn!(symbol = %self.config.symbol, "trading is disabled for symbol");
        }
        Ok(())
    }

    pub async fn run(&mut self) -> Result<(), EngineError> {
        self.startup_check().await?;
        info!(
            symbol = %self.config.symbol,
            timeframe = %self.config.timeframe,
            rule = self.config.rule.name(),
            interval_secs = self.config.poll_interval_secs,
            "engine started"
        );

        let shutdown = Arc::clone(&self.shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                shutdown.store(true, Ordering::SeqCst);
            }
        });

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if self.shutdown.load(Ordering::SeqCst) {
                info!("engine stopped");
                return Ok(());
            }

            match self.tick().await {
                Ok(()) => {}
                Err(err) if err.is_transient() => {
                    warn!(
                        error = %err,
                        backoff_secs = self.config.backoff_secs,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(Duration::from_secs(self.config.backoff_secs)).await;
                }
                Err(err) => {
                    error!(error = %err, "cycle failed");
                }
            }
        }
    }

    /// One poll cycle.
    pub async fn tick(&mut self) -> Result<(), EngineError> {
        let account = self.gateway.account_snapshot().await?;
        info!(
            balance = %account.balance,
            equity = %account.equity,
            profit = %account.profit,
            "account"
        );

        let live = self.gateway.open_positions(&self.config.symbol).await?;
        self.orders.reconcile(live);

        if let Some(hours) = self.config.trading_hours {
            if !hours.in_session(Utc::now()) {
                info!("outside trading hours, holding");
                return Ok(());
            }
        }

        let bars = self
            .gateway
            .bars(
                &self.config.symbol,
                self.config.timeframe,
                self.config.history_bars,
            )
            .await?;
        let signal = self.config.rule.evaluate(&bars)?;
        self.act_on(signal, &account).await
    }

    async fn act_on(
        &mut self,
        signal: Signal,
        account: &AccountSnapshot,
    ) -> Result<(), EngineError> {
        let side = match signal {
            Signal::None => return Ok(()),
            Signal::EnterLong => Side::Long,
            Signal::EnterShort => Side::Short,
            Signal::ExitLong => return self.close_side(Side::Long).await,
            Signal::ExitShort => return self.close_side(Side::Short).await,
        };
        info!(signal = ?signal, "signal");

        // An entry in one direction first flattens the other.
        self.close_side(side.opposite()).await?;

        if self.orders.open_count(side) >= self.config.trade.max_positions_per_side {
            info!(
                side = %side,
                cap = self.config.trade.max_positions_per_side,
                "position cap reached, skipping entry"
            );
            return Ok(());
        }

        let since = Utc::now() - chrono::Duration::days(self.config.pnl_lookback_days);
        let history = self
            .gateway
            .closed_trades(&self.config.symbol, since)
            .await?;
        // Balance-adjustment deals carry zero profit and say nothing about
        // the last trade's outcome.
        let last_closed = history.iter().filter(|t| !t.profit.is_zero()).next_back();
        let (volume, next_state) = next_volume(last_closed, &self.volume_state);
        self.volume_state = next_state;

        let quote = self.gateway.quote(&self.config.symbol).await?;
        let spec = self.gateway.symbol_spec(&self.config.symbol).await?;
        let price = quote.entry_price(side);
        let stop_distance = self.config.trade.stop_loss_points * spec.point;
        let target_distance = self.config.trade.take_profit_points * spec.point;
        let (stop_loss, take_profit) = match side {
            Side::Long => (price - stop_distance, price + target_distance),
            Side::Short => (price + stop_distance, price - target_distance),
        };

        let request = OrderRequest {
            symbol: self.config.symbol.clone(),
            side,
            volume,
            price: Some(price),
            stop_loss: Some(stop_loss),
            take_profit: Some(take_profit),
            deviation: self.config.trade.deviation,
            position: None,
            magic: self.config.trade.magic,
            comment: self.config.trade.comment.clone(),
        };

        let required = self
            .gateway
            .required_margin(side, &self.config.symbol, volume, price)
            .await?;
        validate_margin(&request, account, required)?;

        self.orders.place_order(&request).await?;
        Ok(())
    }

    async fn close_side(&mut self, side: Side) -> Result<(), EngineError> {
        for ticket in self.orders.tickets_on_side(side) {
            info!(ticket, side = %side, "closing position against new signal");
            self.orders.close_position(ticket).await?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn volume_state(&self) -> &VolumeState {
        &self.volume_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::{bars_from_closes, open_position, FakeGateway};
    use crate::models::{ClosedTrade, Timeframe};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn config() -> EngineConfig {
        EngineConfig {
            symbol: "XAUUSD".to_string(),
            timeframe: Timeframe::H1,
            history_bars: 6,
            rule: SignalRule::MaCrossover { fast: 2, slow: 3 },
            trade: TradeConfig::default(),
            poll_interval_secs: 60,
            backoff_secs: 300,
            trading_hours: None,
            pnl_lookback_days: 30,
        }
    }

    fn crossing_up() -> Vec<crate::models::Bar> {
        bars_from_closes(&[9.0, 6.0, 3.0, 3.0, 9.0])
    }

    #[tokio::test]
    async fn test_cross_up_opens_one_long() {
        let gateway = Arc::new(FakeGateway::new());
        *gateway.bars.lock().unwrap() = crossing_up();
        let mut engine = Engine::new(config(), Arc::clone(&gateway) as Arc<dyn BrokerGateway>);

        engine.tick().await.unwrap();

        let sent = gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let request = &sent[0];
        assert_eq!(request.side, Side::Long);
        assert_eq!(request.volume, dec!(0.1));
        // Long enters at the ask; stops 200 and 500 points away.
        assert_eq!(request.price, Some(dec!(2326.35)));
        assert_eq!(request.stop_loss, Some(dec!(2324.35)));
        assert_eq!(request.take_profit, Some(dec!(2331.35)));
        assert_eq!(request.magic, 100922);
    }

    #[tokio::test]
    async fn test_no_cross_no_order() {
        let gateway = Arc::new(FakeGateway::new());
        *gateway.bars.lock().unwrap() = bars_from_closes(&[9.0, 6.0, 3.0, 3.0, 9.0, 9.0]);
        let mut engine = Engine::new(config(), Arc::clone(&gateway) as Arc<dyn BrokerGateway>);

        engine.tick().await.unwrap();
        assert_eq!(gateway.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_outside_hours_suppresses_entry() {
        let gateway = Arc::new(FakeGateway::new());
        *gateway.bars.lock().unwrap() = crossing_up();
        let mut cfg = config();
        // Empty window: never in session.
        cfg.trading_hours = Some(TradingHours {
            start_hour: 0,
            end_hour: 0,
            utc_offset_hours: 0,
        });
        let mut engine = Engine::new(cfg, Arc::clone(&gateway) as Arc<dyn BrokerGateway>);

        engine.tick().await.unwrap();
        assert_eq!(gateway.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_margin_shortfall_blocks_entry() {
        let gateway = Arc::new(FakeGateway::new());
        *gateway.bars.lock().unwrap() = crossing_up();
        *gateway.margin.lock().unwrap() = dec!(20000);
        let mut engine = Engine::new(config(), Arc::clone(&gateway) as Arc<dyn BrokerGateway>);

        let err = engine.tick().await.unwrap_err();
        assert!(matches!(err, EngineError::MarginInsufficient(_)));
        assert!(!err.is_transient());
        assert_eq!(gateway.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_loss_doubles_next_entry() {
        let gateway = Arc::new(FakeGateway::new());
        *gateway.bars.lock().unwrap() = crossing_up();
        gateway.closed.lock().unwrap().push(ClosedTrade {
            time: Utc.with_ymd_and_hms(2026, 8, 29, 12, 0, 0).unwrap(),
            profit: dec!(-25),
            volume: dec!(0.1),
        });
        let mut engine = Engine::new(config(), Arc::clone(&gateway) as Arc<dyn BrokerGateway>);

        engine.tick().await.unwrap();

        let sent = gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].volume, dec!(0.2));
        assert_eq!(engine.volume_state().current, dec!(0.2));
    }

    #[tokio::test]
    async fn test_cross_up_flattens_short_first() {
        let gateway = Arc::new(FakeGateway::new());
        *gateway.bars.lock().unwrap() = crossing_up();
        *gateway.positions.lock().unwrap() =
            vec![open_position(42, Side::Short, 100922)];
        let mut engine = Engine::new(config(), Arc::clone(&gateway) as Arc<dyn BrokerGateway>);

        engine.tick().await.unwrap();

        let sent = gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        // First the short is bought back, then the long entry goes out.
        assert_eq!(sent[0].side, Side::Long);
        assert_eq!(sent[0].position, Some(42));
        assert_eq!(sent[1].side, Side::Long);
        assert_eq!(sent[1].position, None);
    }

    #[tokio::test]
    async fn test_position_cap_blocks_entry() {
        let gateway = Arc::new(FakeGateway::new());
        *gateway.bars.lock().unwrap() = crossing_up();
        *gateway.positions.lock().unwrap() = vec![
            open_position(1, Side::Long, 100922),
            open_position(2, Side::Long, 100922),
        ];
        let mut engine = Engine::new(config(), Arc::clone(&gateway) as Arc<dyn BrokerGateway>);

        engine.tick().await.unwrap();
        assert_eq!(gateway.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_short_history_is_transient() {
        let gateway = Arc::new(FakeGateway::new());
        *gateway.bars.lock().unwrap() = bars_from_closes(&[1.0, 2.0]);
        let mut engine = Engine::new(config(), Arc::clone(&gateway) as Arc<dyn BrokerGateway>);

        let err = engine.tick().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_startup_check_fails_when_symbol_unselectable() {
        let gateway = Arc::new(FakeGateway::new());
        gateway.spec.lock().unwrap().visible = false;
        *gateway.select_result.lock().unwrap() = false;
        let engine = Engine::new(config(), gateway);

        let err = engine.startup_check().await.unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_trading_hours_window() {
        let hours = TradingHours {
            start_hour: 8,
            end_hour: 21,
            utc_offset_hours: 1,
        };
        let morning = Utc.with_ymd_and_hms(2026, 8, 28, 7, 30, 0).unwrap();
        let night = Utc.with_ymd_and_hms(2026, 8, 28, 22, 0, 0).unwrap();
        // 07:30 UTC is 08:30 broker time, inside; 22:00 UTC is 23:00, not.
        assert!(hours.in_session(morning));
        assert!(!hours.in_session(night));

        let wrapping = TradingHours {
            start_hour: 22,
            end_hour: 4,
            utc_offset_hours: 0,
        };
        assert!(wrapping.in_session(night));
        assert!(!wrapping.in_session(morning));
    }
}
