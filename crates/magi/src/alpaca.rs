//! Alpaca REST client: trading API for account and orders, market data API
//! for quotes and daily bars.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use magi_agents::{Brokerage, CollaboratorError};
use magi_models::{Account, Bar, OrderAck, OrderStatus, Position, Quote, Side};
use reqwest::{Client, RequestBuilder};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct AlpacaCredentials {
    pub key_id: String,
    pub secret_key: String,
}

#[derive(Debug, Clone)]
pub struct AlpacaClient {
    client: Client,
    trading_url: String,
    data_url: String,
    credentials: AlpacaCredentials,
}

impl AlpacaClient {
    pub fn new(
        trading_url: &str,
        data_url: &str,
        credentials: AlpacaCredentials,
        timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            trading_url: trading_url.trim_end_matches('/').to_string(),
            data_url: data_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("APCA-API-KEY-ID", &self.credentials.key_id)
            .header("APCA-API-SECRET-KEY", &self.credentials.secret_key)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CollaboratorError> {
        let response = self.authed(request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| CollaboratorError::Decode(e.to_string()))
    }
}

#[derive(Deserialize)]
struct AccountResponse {
    equity: Decimal,
    cash: Decimal,
    buying_power: Decimal,
}

#[derive(Deserialize)]
struct PositionResponse {
    symbol: String,
    qty: Decimal,
    avg_entry_price: Decimal,
    market_value: Option<Decimal>,
    unrealized_pl: Option<Decimal>,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: Option<String>,
    filled_avg_price: Option<Decimal>,
}

#[derive(Deserialize)]
struct LatestTradeResponse {
    trade: LatestTrade,
}

#[derive(Deserialize)]
struct LatestTrade {
    p: f64,
}

#[derive(Deserialize)]
struct BarsResponse {
    #[serde(default)]
    bars: Option<Vec<WireBar>>,
}

#[derive(Deserialize)]
struct WireBar {
    t: DateTime<Utc>,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

#[async_trait]
impl Brokerage for AlpacaClient {
    #[instrument(skip(self))]
    async fn get_quote(&self, symbol: &str) -> Result<Quote, CollaboratorError> {
        let url = format!("{}/v2/stocks/{symbol}/trades/latest", self.data_url);
        let latest: LatestTradeResponse = self
            .send(self.client.get(&url).query(&[("feed", "iex")]))
            .await?;
        let price = Decimal::from_f64(latest.trade.p)
            .map(|p| p.round_dp(4))
            .ok_or_else(|| CollaboratorError::Decode(format!("bad price {}", latest.trade.p)))?;
        Ok(Quote {
            symbol: symbol.to_string(),
            price,
        })
    }

    async fn get_account(&self) -> Result<Account, CollaboratorError> {
        let url = format!("{}/v2/account", self.trading_url);
        let account: AccountResponse = self.send(self.client.get(&url)).await?;
        Ok(Account {
            equity: account.equity,
            cash: account.cash,
            buying_power: account.buying_power,
        })
    }

    async fn get_positions(&self) -> Result<Vec<Position>, CollaboratorError> {
        let url = format!("{}/v2/positions", self.trading_url);
        let positions: Vec<PositionResponse> = self.send(self.client.get(&url)).await?;
        Ok(positions
            .into_iter()
            .map(|p| Position {
                symbol: p.symbol,
                qty: p.qty,
                avg_entry_price: p.avg_entry_price,
                market_value: p.market_value,
                unrealized_pl: p.unrealized_pl,
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn place_order(
        &self,
        symbol: &str,
        qty: Decimal,
        side: Side,
    ) -> Result<OrderAck, CollaboratorError> {
        let url = format!("{}/v2/orders", self.trading_url);
        let body = json!({
            "symbol": symbol,
            "qty": qty.to_string(),
            "side": side.as_str(),
            "type": "market",
            "time_in_force": "day",
        });
        let order: OrderResponse = self.send(self.client.post(&url).json(&body)).await?;
        debug!(order_id = ?order.id, "Order accepted");
        Ok(OrderAck {
            order_id: order.id,
            filled_price: order.filled_avg_price,
        })
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus, CollaboratorError> {
        let url = format!("{}/v2/orders/{order_id}", self.trading_url);
        let order: OrderResponse = self.send(self.client.get(&url)).await?;
        Ok(OrderStatus {
            filled_price: order.filled_avg_price,
        })
    }

    async fn get_daily_bars(&self, symbol: &str, limit: u32) -> Result<Vec<Bar>, CollaboratorError> {
        let url = format!("{}/v2/stocks/{symbol}/bars", self.data_url);
        // Calendar window wide enough to cover `limit` sessions past weekends and holidays.
        let start = Utc::now() - chrono::Duration::days(i64::from(limit) * 2 + 10);
        let response: BarsResponse = self
            .send(self.client.get(&url).query(&[
                ("timeframe", "1Day".to_string()),
                ("start", start.format("%Y-%m-%d").to_string()),
                ("limit", "10000".to_string()),
                ("adjustment", "raw".to_string()),
                ("feed", "iex".to_string()),
            ]))
            .await?;

        let mut bars: Vec<Bar> = response
            .bars
            .unwrap_or_default()
            .into_iter()
            .map(|b| Bar {
                timestamp: b.t,
                open: b.o,
                high: b.h,
                low: b.l,
                close: b.c,
                volume: b.v,
            })
            .collect();
        bars.sort_by_key(|b| b.timestamp);
        let skip = bars.len().saturating_sub(limit as usize);
        Ok(bars.split_off(skip))
    }
}
