//! Fallback price quotes
//!
//! Square-off prefers the relay's last tick. When a symbol has not ticked
//! since startup, the price comes from a REST quote endpoint returning
//! `{"c": <current>, "pc": <previous close>}`.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use types::numeric::Price;
use types::symbol::Symbol;

#[derive(Error, Debug)]
pub enum QuoteError {
    #[error("Quote request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No usable price for {0}")]
    NoPrice(Symbol),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub current: Option<Price>,
    pub previous_close: Option<Price>,
}

impl Quote {
    /// Current price, else the previous close.
    pub fn best(&self) -> Option<Price> {
        self.current.or(self.previous_close)
    }
}

#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, symbol: &Symbol) -> Result<Quote, QuoteError>;
}

#[derive(Debug, Deserialize)]
struct QuoteBody {
    #[serde(default)]
    c: Option<f64>,
    #[serde(default)]
    pc: Option<f64>,
}

/// Providers report unknown symbols as zero prices.
fn positive(value: Option<f64>) -> Option<Price> {
    value
        .and_then(|raw| raw.to_string().parse::<Decimal>().ok())
        .filter(|price| *price > Decimal::ZERO)
}

#[derive(Debug, Clone)]
pub struct HttpQuoteClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpQuoteClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, QuoteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteClient {
    async fn quote(&self, symbol: &Symbol) -> Result<Quote, QuoteError> {
        let body: QuoteBody = self
            .client
            .get(format!("{}/quote", self.base_url.trim_end_matches('/')))
            .query(&[("symbol", symbol.as_str()), ("token", self.token.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let quote = Quote {
            current: positive(body.c),
            previous_close: positive(body.pc),
        };
        if quote.best().is_none() {
            return Err(QuoteError::NoPrice(symbol.clone()));
        }
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_zero_prices_are_unusable() {
        assert_eq!(positive(Some(0.0)), None);
        assert_eq!(positive(None), None);
        assert_eq!(positive(Some(12.5)), Some(Decimal::new(125, 1)));
    }

    #[test]
    fn test_best_prefers_current() {
        let quote = Quote {
            current: Some(Decimal::from(10)),
            previous_close: Some(Decimal::from(9)),
        };
        assert_eq!(quote.best(), Some(Decimal::from(10)));

        let stale = Quote {
            current: None,
            previous_close: Some(Decimal::from(9)),
        };
        assert_eq!(stale.best(), Some(Decimal::from(9)));
    }

    #[test]
    fn test_quote_body_decodes_provider_shape() {
        let body: QuoteBody =
            serde_json::from_str(r#"{"c":261.74,"d":0.9,"h":263.31,"pc":260.84}"#).unwrap();
        assert_eq!(positive(body.c), Some(Decimal::new(26174, 2)));
        assert_eq!(positive(body.pc), Some(Decimal::new(26084, 2)));
    }

    #[tokio::test]
    async fn test_query_parameters_are_encoded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = stream.read(&mut buf).await.unwrap();
            let head = String::from_utf8_lossy(&buf[..n]).to_string();

            let body = r#"{"c":101.5,"pc":100}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            head.lines().next().unwrap_or_default().to_string()
        });

        let client = HttpQuoteClient::new(format!("http://{addr}/"), "a&b").unwrap();
        let quote = client
            .quote(&Symbol::parse("binance:btcusdt").unwrap())
            .await
            .unwrap();
        assert_eq!(quote.current, Some(Decimal::new(1015, 1)));

        let request_line = server.await.unwrap();
        assert!(request_line.starts_with("GET /quote?"), "{request_line}");
        assert!(request_line.contains("symbol=BINANCE%3ABTCUSDT"), "{request_line}");
        assert!(request_line.contains("token=a%26b"), "{request_line}");
    }
}
