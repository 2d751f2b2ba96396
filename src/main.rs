//! XAUUSD martingale bot.
//!
//! Polls a MetaTrader 5 terminal through an EA HTTP bridge, evaluates a
//! configurable signal rule on closed bars and manages the resulting
//! positions with martingale sizing and pre-trade margin checks.

mod engine;
mod error;
mod gateway;
mod models;
mod trading;

use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::engine::{Engine, EngineConfig, TradingHours};
use crate::gateway::{BridgeGateway, BrokerGateway};
use crate::models::Timeframe;
use crate::trading::{SignalRule, TradeConfig};

/// Gold trading bot CLI.
#[derive(Parser)]
#[command(name = "golddigger")]
#[command(about = "Martingale signal bot for a MetaTrader 5 terminal", long_about = None)]
struct Cli {
    /// Base URL of the EA HTTP bridge
    #[arg(short, long, env = "BRIDGE_URL", default_value = "http://127.0.0.1:8080")]
    bridge_url: String,

    /// Symbol to trade
    #[arg(short, long, env = "SYMBOL", default_value = "XAUUSD")]
    symbol: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StrategyArgs {
    /// Signal rule (ma-crossover, rsi-band, bollinger-reentry)
    #[arg(long, default_value = "ma-crossover")]
    strategy: String,

    /// Bar timeframe (m1, m5, m15, m30, h1, h4, d1)
    #[arg(short, long, env = "TIMEFRAME", default_value = "h1")]
    timeframe: Timeframe,

    /// Fast SMA period (ma-crossover)
    #[arg(long, default_value = "20")]
    fast: usize,

    /// Slow SMA period (ma-crossover)
    #[arg(long, default_value = "120")]
    slow: usize,

    /// RSI period (rsi-band)
    #[arg(long, default_value = "14")]
    rsi_period: usize,

    /// Bollinger period (rsi-band, bollinger-reentry)
    #[arg(long, default_value = "20")]
    band_period: usize,

    /// Bollinger width in standard deviations
    #[arg(long, default_value = "2.0")]
    band_std_dev: f64,

    /// RSI entry threshold for longs
    #[arg(long, default_value = "40")]
    oversold: f64,

    /// RSI entry threshold for shorts
    #[arg(long, default_value = "60")]
    overbought: f64,
}

impl StrategyArgs {
    fn rule(&self) -> Result<SignalRule> {
        match self.strategy.as_str() {
            "ma-crossover" => Ok(SignalRule::MaCrossover {
                fast: self.fast,
                slow: self.slow,
            }),
            "rsi-band" => Ok(SignalRule::RsiBand {
                rsi_period: self.rsi_period,
                band_period: self.band_period,
                band_std_dev: self.band_std_dev,
                oversold: self.oversold,
                overbought: self.overbought,
            }),
            "bollinger-reentry" => Ok(SignalRule::BollingerReentry {
                period: self.band_period,
                std_dev: self.band_std_dev,
            }),
            other => anyhow::bail!(
                "unknown strategy '{other}' (expected ma-crossover, rsi-band or bollinger-reentry)"
            ),
        }
    }
}

#[derive(Args)]
struct TradeArgs {
    /// Starting lot size
    #[arg(long, default_value = "0.1")]
    base_volume: Decimal,

    /// Volume multiplier after a losing trade
    #[arg(long, default_value = "2")]
    multiplier: Decimal,

    /// Maximum simultaneous positions per direction
    #[arg(long, default_value = "2")]
    max_per_side: usize,

    /// Stop loss distance in points
    #[arg(long, default_value = "200")]
    stop_loss_points: Decimal,

    /// Take profit distance in points
    #[arg(long, default_value = "500")]
    take_profit_points: Decimal,

    /// Allowed slippage in points
    #[arg(long, default_value = "20")]
    deviation: u32,

    /// Magic number identifying this bot's positions
    #[arg(long, env = "MAGIC", default_value = "100922")]
    magic: u64,
}

impl TradeArgs {
    fn trade_config(&self) -> TradeConfig {
        TradeConfig {
            base_volume: self.base_volume,
            multiplier: self.multiplier,
            max_positions_per_side: self.max_per_side,
            stop_loss_points: self.stop_loss_points,
            take_profit_points: self.take_profit_points,
            deviation: self.deviation,
            magic: self.magic,
            ..TradeConfig::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the trading engine
    Run {
        #[command(flatten)]
        strategy: StrategyArgs,

        #[command(flatten)]
        trade: TradeArgs,

        /// Polling interval in seconds
        #[arg(short, long, default_value = "60")]
        interval: u64,

        /// Backoff after a transient failure, in seconds
        #[arg(long, default_value = "300")]
        backoff: u64,

        /// Bars fetched per cycle (defaults to the rule's lookback plus two)
        #[arg(long)]
        history: Option<usize>,

        /// Session start hour in broker time (with --session-end)
        #[arg(long)]
        session_start: Option<u32>,

        /// Session end hour in broker time
        #[arg(long)]
        session_end: Option<u32>,

        /// Broker clock offset from UTC, in hours
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        session_offset: i32,

        /// Closed-trade lookback for the sizer, in days
        #[arg(long, default_value = "30")]
        pnl_lookback_days: i64,
    },

    /// Show the account snapshot
    Account,

    /// List open positions on the symbol
    Positions,

    /// Show the effective trading configuration
    Config {
        #[command(flatten)]
        strategy: StrategyArgs,

        #[command(flatten)]
        trade: TradeArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let gateway = Arc::new(BridgeGateway::new(&cli.bridge_url)?);

    match cli.command {
        Commands::Run {
            strategy,
            trade,
            interval,
            backoff,
            history,
            session_start,
            session_end,
            session_offset,
            pnl_lookback_days,
        } => {
            let rule = strategy.rule()?;
            let history_bars = history.unwrap_or(rule.lookback() + 2);
            let trading_hours = match (session_start, session_end) {
                (Some(start_hour), Some(end_hour)) => Some(TradingHours {
                    start_hour,
                    end_hour,
                    utc_offset_hours: session_offset,
                }),
                (None, None) => None,
                _ => anyhow::bail!("--session-start and --session-end must be given together"),
            };

            let config = EngineConfig {
                symbol: cli.symbol.clone(),
                timeframe: strategy.timeframe,
                history_bars,
                rule,
                trade: trade.trade_config(),
                poll_interval_secs: interval,
                backoff_secs: backoff,
                trading_hours,
                pnl_lookback_days,
            };

            info!(
                symbol = %cli.symbol,
                bridge = %cli.bridge_url,
                interval = interval,
                "starting engine"
            );
            println!("\n=== golddigger ===");
            println!("Symbol:   {}", cli.symbol);
            println!("Strategy: {}", config.rule.name());
            println!("Interval: {}s", interval);
            println!("\nPress Ctrl+C to stop.\n");

            let mut engine = Engine::new(config, gateway);
            if let Err(e) = engine.run().await {
                tracing::error!(error = %e, "engine error");
                return Err(e.into());
            }
        }

        Commands::Account => {
            let account = gateway.account_snapshot().await?;
            println!("\n=== Account ===");
            println!("Balance:      {} {}", account.balance, account.currency);
            println!("Equity:       {} {}", account.equity, account.currency);
            println!("Margin:       {} {}", account.margin, account.currency);
            println!("Free Margin:  {} {}", account.free_margin, account.currency);
            println!("Leverage:     1:{}", account.leverage);
            println!("Open P&L:     {} {}", account.profit, account.currency);
        }

        Commands::Positions => {
            let positions = gateway.open_positions(&cli.symbol).await?;
            if positions.is_empty() {
                println!("No open positions on {}.", cli.symbol);
                return Ok(());
            }

            println!(
                "\n{:<12} {:<8} {:>8} {:>12} {:>12} {:>12} {:>10}",
                "TICKET", "SIDE", "VOLUME", "OPEN", "SL", "TP", "MAGIC"
            );
            println!("{}", "-".repeat(80));
            for pos in positions {
                println!(
                    "{:<12} {:<8} {:>8} {:>12} {:>12} {:>12} {:>10}",
                    pos.ticket,
                    pos.side.to_string(),
                    pos.volume,
                    pos.open_price,
                    pos.stop_loss.map_or("-".to_string(), |v| v.to_string()),
                    pos.take_profit.map_or("-".to_string(), |v| v.to_string()),
                    pos.magic
                );
            }
        }

        Commands::Config { strategy, trade } => {
            let rule = strategy.rule()?;
            let config = trade.trade_config();

            println!("\n=== Strategy ===");
            println!("Rule:         {}", rule.name());
            println!("Timeframe:    {}", strategy.timeframe);
            println!("Lookback:     {} bars", rule.lookback());

            println!("\n=== Sizing ===");
            println!("Base Volume:  {}", config.base_volume);
            println!("Multiplier:   {}", config.multiplier);
            println!("Max Per Side: {}", config.max_positions_per_side);

            println!("\n=== Orders ===");
            println!("Stop Loss:    {} points", config.stop_loss_points);
            println!("Take Profit:  {} points", config.take_profit_points);
            println!("Deviation:    {} points", config.deviation);
            println!("Magic:        {}", config.magic);
        }
    }

    Ok(())
}
