use crate::core::currency::{crypto_id, normalize_code};
use crate::core::error::{RateError, RateResult};
use crate::core::rates::{FetchedRates, RateMap};
use crate::providers::util::get_body;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com";
const PROVIDER: &str = "api.coingecko.com";

#[derive(Debug, Deserialize)]
struct SimplePrice {
    #[serde(default)]
    usd: Option<f64>,
}

type SimplePriceResponse = HashMap<String, SimplePrice>;

/// Batch crypto prices from the CoinGecko simple price endpoint.
#[derive(Clone)]
pub struct CoinGeckoFetcher {
    client: Client,
    base_url: String,
}

impl CoinGeckoFetcher {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetches units per USD for the given codes in one request.
    ///
    /// Codes without a known asset id are skipped. Assets whose price is
    /// missing or not strictly positive are left out and reported as warnings.
    #[instrument(skip(self))]
    pub async fn fetch(&self, codes: &[String]) -> RateResult<FetchedRates> {
        let mut requested: Vec<(String, &'static str)> = Vec::new();
        for code in codes {
            let code = normalize_code(code);
            if let Some(id) = crypto_id(&code) {
                if !requested.iter().any(|(c, _)| *c == code) {
                    requested.push((code, id));
                }
            }
        }

        if requested.is_empty() {
            return Ok(FetchedRates {
                rates: RateMap::new(),
                timestamp: Utc::now(),
                warnings: Vec::new(),
            });
        }

        let ids: Vec<&str> = requested.iter().map(|(_, id)| *id).collect();
        let url = format!(
            "{}/api/v3/simple/price?ids={}&vs_currencies=usd",
            self.base_url,
            ids.join(",")
        );
        let body = get_body(&self.client, &url, PROVIDER).await?;
        let prices: SimplePriceResponse =
            serde_json::from_slice(&body).map_err(|e| RateError::malformed(PROVIDER, e))?;

        let mut rates = RateMap::new();
        let mut warnings = Vec::new();
        for (code, id) in requested {
            match prices.get(id).and_then(|p| p.usd) {
                Some(price) if price > 0.0 => {
                    rates.insert(code, 1.0 / price);
                }
                other => {
                    debug!(code = %code, price = ?other, "Dropping crypto asset without a usable price");
                    warnings.push(format!("no crypto price for {code}"));
                }
            }
        }

        debug!(codes = ?rates.keys().collect::<Vec<_>>(), "Crypto fetch succeeded");
        Ok(FetchedRates {
            rates,
            timestamp: Utc::now(),
            warnings,
        })
    }
}
