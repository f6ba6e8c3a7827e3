//! Exchange ticker schemas and their normalization

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::shared::errors::FetchError;
use crate::shared::types::PriceObservation;

const SYMBOL: &str = "BTC";

/// Supported price APIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceSource {
    CoinGecko,
    Binance,
    Kraken,
}

impl PriceSource {
    pub const ALL: [PriceSource; 3] = [PriceSource::CoinGecko, PriceSource::Binance, PriceSource::Kraken];

    pub fn name(&self) -> &'static str {
        match self {
            PriceSource::CoinGecko => "coingecko",
            PriceSource::Binance => "binance",
            PriceSource::Kraken => "kraken",
        }
    }

    pub fn url(&self) -> &'static str {
        match self {
            PriceSource::CoinGecko => {
                "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin,ethereum&vs_currencies=usd"
            }
            PriceSource::Binance => "https://api.binance.com/api/v3/ticker/price?symbol=BTCUSDT",
            PriceSource::Kraken => "https://api.kraken.com/0/public/Ticker?pair=XBTUSD",
        }
    }

    /// Normalize a response body into an observation stamped `observed_at`
    pub fn parse(&self, body: &[u8], observed_at: DateTime<Utc>) -> Result<PriceObservation, FetchError> {
        let price = match self {
            PriceSource::CoinGecko => {
                let response: CoinGeckoResponse = self.decode(body)?;
                response.bitcoin.usd
            }
            PriceSource::Binance => {
                let response: BinanceResponse = self.decode(body)?;
                self.parse_price(&response.price)?
            }
            PriceSource::Kraken => {
                let response: KrakenResponse = self.decode(body)?;
                // first element of `c` is the last trade price
                let last = response
                    .result
                    .ticker
                    .c
                    .first()
                    .ok_or_else(|| FetchError::MissingPrice(self.name().to_string()))?;
                self.parse_price(last)?
            }
        };

        Ok(PriceObservation::new(self.name(), SYMBOL, price, observed_at)?)
    }

    fn decode<'a, T: Deserialize<'a>>(&self, body: &'a [u8]) -> Result<T, FetchError> {
        serde_json::from_slice(body).map_err(|e| FetchError::Decode {
            source_name: self.name().to_string(),
            message: e.to_string(),
        })
    }

    fn parse_price(&self, value: &str) -> Result<f64, FetchError> {
        value.parse::<f64>().map_err(|e| FetchError::Decode {
            source_name: self.name().to_string(),
            message: format!("error parsing price {:?}: {}", value, e),
        })
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PriceSource {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PriceSource::ALL
            .into_iter()
            .find(|source| source.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FetchError::UnknownSource(s.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct CoinGeckoResponse {
    bitcoin: CoinGeckoQuote,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoQuote {
    usd: f64,
}

#[derive(Debug, Deserialize)]
struct BinanceResponse {
    price: String,
}

#[derive(Debug, Deserialize)]
struct KrakenResponse {
    result: KrakenResult,
}

#[derive(Debug, Deserialize)]
struct KrakenResult {
    #[serde(rename = "XXBTZUSD")]
    ticker: KrakenTicker,
}

#[derive(Debug, Deserialize)]
struct KrakenTicker {
    c: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coingecko() {
        let body = br#"{"bitcoin":{"usd":64123.5},"ethereum":{"usd":3100.1}}"#;
        let obs = PriceSource::CoinGecko.parse(body, Utc::now()).unwrap();
        assert_eq!(obs.source(), "coingecko");
        assert_eq!(obs.symbol(), "BTC");
        assert_eq!(obs.price(), 64123.5);
    }

    #[test]
    fn test_parse_binance() {
        let body = br#"{"symbol":"BTCUSDT","price":"64000.01000000"}"#;
        let obs = PriceSource::Binance.parse(body, Utc::now()).unwrap();
        assert_eq!(obs.source(), "binance");
        assert_eq!(obs.price(), 64000.01);

        let bad = br#"{"symbol":"BTCUSDT","price":"abc"}"#;
        assert!(matches!(
            PriceSource::Binance.parse(bad, Utc::now()),
            Err(FetchError::Decode { .. })
        ));
    }

    #[test]
    fn test_parse_kraken() {
        let body = br#"{"error":[],"result":{"XXBTZUSD":{"a":["1"],"c":["63999.90000","0.001"]}}}"#;
        let obs = PriceSource::Kraken.parse(body, Utc::now()).unwrap();
        assert_eq!(obs.source(), "kraken");
        assert_eq!(obs.price(), 63999.9);

        let empty = br#"{"error":[],"result":{"XXBTZUSD":{"c":[]}}}"#;
        assert!(matches!(
            PriceSource::Kraken.parse(empty, Utc::now()),
            Err(FetchError::MissingPrice(_))
        ));
    }

    #[test]
    fn test_negative_price_rejected() {
        let body = br#"{"bitcoin":{"usd":-1.0}}"#;
        assert!(matches!(
            PriceSource::CoinGecko.parse(body, Utc::now()),
            Err(FetchError::Observation(_))
        ));
    }

    #[test]
    fn test_source_from_str() {
        assert_eq!("Binance".parse::<PriceSource>().unwrap(), PriceSource::Binance);
        assert_eq!(" kraken ".parse::<PriceSource>().unwrap(), PriceSource::Kraken);
        assert!(matches!(
            "bitstamp".parse::<PriceSource>(),
            Err(FetchError::UnknownSource(_))
        ));
    }
}
