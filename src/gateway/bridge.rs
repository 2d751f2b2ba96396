//! HTTP client for the Expert-Advisor bridge running inside the terminal.
//!
//! The bridge exposes the terminal's trading API as JSON over HTTP:
//! `GET /account`, `GET /bars`, `GET /quote`, `GET /symbol`,
//! `GET /positions`, `GET /history/deals`, `GET /margin`,
//! `POST /order/send`, `POST /order/check`, `POST /order/cancel`,
//! `POST /symbol/select`. Order responses carry the terminal retcode;
//! 10009 (`TRADE_RETCODE_DONE`) is the only success code.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{
    AccountSnapshot, Bar, ClosedTrade, OrderAck, OrderRequest, Position, Quote, Side, SymbolSpec,
    Timeframe,
};

use super::{BrokerGateway, GatewayError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Live gateway over the EA HTTP bridge.
pub struct BridgeGateway {
    client: Client,
    base_url: String,
}

impl BridgeGateway {
    pub fn new(base_url: impl Into<String>) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "bridge GET");

        let response = self.client.get(&url).query(query).send().await?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "bridge POST");

        let response = self.client.post(&url).json(body).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status, body });
        }
        Ok(response.json().await?)
    }
}

/// Wire shape of an open position. The terminal reports the direction as
/// a numeric type (0 = buy, 1 = sell).
#[derive(Debug, Deserialize)]
struct PositionInfo {
    ticket: u64,
    symbol: String,
    #[serde(rename = "type")]
    position_type: u8,
    volume: Decimal,
    price_open: Decimal,
    #[serde(default)]
    sl: Option<Decimal>,
    #[serde(default)]
    tp: Option<Decimal>,
    #[serde(default)]
    magic: u64,
    time: i64,
}

impl From<PositionInfo> for Position {
    fn from(info: PositionInfo) -> Self {
        let side = if info.position_type == 0 {
            Side::Long
        } else {
            Side::Short
        };
        Position {
            ticket: info.ticket,
            symbol: info.symbol,
            side,
            volume: info.volume,
            open_price: info.price_open,
            stop_loss: info.sl.filter(|v| !v.is_zero()),
            take_profit: info.tp.filter(|v| !v.is_zero()),
            magic: info.magic,
            opened_at: Utc
                .timestamp_opt(info.time, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

/// Wire shape of an order send/check request.
#[derive(Debug, Serialize)]
struct OrderBody {
    symbol: String,
    action: &'static str,
    volume: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<Decimal>,
    sl: Decimal,
    tp: Decimal,
    deviation: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<u64>,
    magic: u64,
    comment: String,
}

impl From<&OrderRequest> for OrderBody {
    fn from(request: &OrderRequest) -> Self {
        OrderBody {
            symbol: request.symbol.clone(),
            action: request.side.as_action(),
            volume: request.volume,
            price: request.price,
            sl: request.stop_loss.unwrap_or_default(),
            tp: request.take_profit.unwrap_or_default(),
            deviation: request.deviation,
            position: request.position,
            magic: request.magic,
            comment: request.comment.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CancelBody {
    ticket: u64,
}

#[derive(Debug, Serialize)]
struct SelectBody {
    symbol: String,
    enable: bool,
}

#[derive(Debug, Deserialize)]
struct SelectResponse {
    visible: bool,
}

#[derive(Debug, Deserialize)]
struct MarginResponse {
    margin: Decimal,
}

#[async_trait]
impl BrokerGateway for BridgeGateway {
    async fn account_snapshot(&self) -> Result<AccountSnapshot, GatewayError> {
        self.get_json("/account", &[]).await
    }

    async fn bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>, GatewayError> {
        self.get_json(
            "/bars",
            &[
                ("symbol", symbol.to_string()),
                ("timeframe", timeframe.as_str().to_string()),
                ("count", count.to_string()),
            ],
        )
        .await
    }

    async fn quote(&self, symbol: &str) -> Result<Quote, GatewayError> {
        self.get_json("/quote", &[("symbol", symbol.to_string())])
            .await
    }

    async fn symbol_spec(&self, symbol: &str) -> Result<SymbolSpec, GatewayError> {
        self.get_json("/symbol", &[("symbol", symbol.to_string())])
            .await
    }

    async fn open_positions(&self, symbol: &str) -> Result<Vec<Position>, GatewayError> {
        let infos: Vec<PositionInfo> = self
            .get_json("/positions", &[("symbol", symbol.to_string())])
            .await?;
        Ok(infos.into_iter().map(Position::from).collect())
    }

    async fn closed_trades(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClosedTrade>, GatewayError> {
        self.get_json(
            "/history/deals",
            &[
                ("symbol", symbol.to_string()),
                ("from", since.timestamp().to_string()),
            ],
        )
        .await
    }

    async fn required_margin(
        &self,
        side: Side,
        symbol: &str,
        volume: Decimal,
        price: Decimal,
    ) -> Result<Decimal, GatewayError> {
        let response: MarginResponse = self
            .get_json(
                "/margin",
                &[
                    ("action", side.as_action().to_string()),
                    ("symbol", symbol.to_string()),
                    ("volume", volume.to_string()),
                    ("price", price.to_string()),
                ],
            )
            .await?;
        Ok(response.margin)
    }

    async fn send_order(&self, request: &OrderRequest) -> Result<OrderAck, GatewayError> {
        self.post_json("/order/send", &OrderBody::from(request)).await
    }

    async fn check_order(&self, request: &OrderRequest) -> Result<OrderAck, GatewayError> {
        self.post_json("/order/check", &OrderBody::from(request)).await
    }

    async fn cancel_order(&self, ticket: u64) -> Result<OrderAck, GatewayError> {
        self.post_json("/order/cancel", &CancelBody { ticket }).await
    }

    async fn ensure_symbol_visible(&self, symbol: &str) -> Result<bool, GatewayError> {
        let response: SelectResponse = self
            .post_json(
                "/symbol/select",
                &SelectBody {
                    symbol: symbol.to_string(),
                    enable: true,
                },
            )
            .await?;
        Ok(response.visible)
    }
}
