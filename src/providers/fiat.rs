//! Fiat rate sources and their response schemas.
//!
//! Every source reports "units of code per 1 USD", so decoding only has to
//! pick the rates object out of the payload.

use crate::core::error::{RateError, RateResult};
use crate::core::rates::RateMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FiatSource {
    ExchangeRateHost,
    Frankfurter,
    OpenErApi,
}

#[derive(Debug, Deserialize)]
struct ExchangeRateHostResponse {
    #[allow(dead_code)]
    base: String,
    #[allow(dead_code)]
    date: String,
    rates: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct FrankfurterResponse {
    #[allow(dead_code)]
    amount: f64,
    #[allow(dead_code)]
    base: String,
    #[allow(dead_code)]
    date: String,
    rates: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct OpenErApiResponse {
    result: String,
    rates: HashMap<String, f64>,
}

impl FiatSource {
    /// Default priority order of the fallback chain.
    pub const ALL: [FiatSource; 3] = [
        FiatSource::ExchangeRateHost,
        FiatSource::Frankfurter,
        FiatSource::OpenErApi,
    ];

    /// Name used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            FiatSource::ExchangeRateHost => "exchange-rate-host",
            FiatSource::Frankfurter => "frankfurter",
            FiatSource::OpenErApi => "open-er-api",
        }
    }

    pub fn host(&self) -> &'static str {
        match self {
            FiatSource::ExchangeRateHost => "api.exchangerate.host",
            FiatSource::Frankfurter => "api.frankfurter.app",
            FiatSource::OpenErApi => "open.er-api.com",
        }
    }

    pub fn default_base_url(&self) -> String {
        format!("https://{}", self.host())
    }

    /// Path and query of the latest USD based rates.
    pub fn endpoint(&self) -> &'static str {
        match self {
            FiatSource::ExchangeRateHost => "/latest?base=USD",
            FiatSource::Frankfurter => "/latest?from=USD",
            FiatSource::OpenErApi => "/v6/latest/USD",
        }
    }

    pub fn parse(&self, raw: &[u8]) -> RateResult<RateMap> {
        let provider = self.host();
        let rates = match self {
            FiatSource::ExchangeRateHost => {
                serde_json::from_slice::<ExchangeRateHostResponse>(raw)
                    .map_err(|e| RateError::malformed(provider, e))?
                    .rates
            }
            FiatSource::Frankfurter => {
                serde_json::from_slice::<FrankfurterResponse>(raw)
                    .map_err(|e| RateError::malformed(provider, e))?
                    .rates
            }
            FiatSource::OpenErApi => {
                let decoded = serde_json::from_slice::<OpenErApiResponse>(raw)
                    .map_err(|e| RateError::malformed(provider, e))?;
                if decoded.result != "success" {
                    return Err(RateError::malformed(
                        provider,
                        format!("result is {}", decoded.result),
                    ));
                }
                decoded.rates
            }
        };

        Ok(rates
            .into_iter()
            .map(|(code, value)| (code.to_uppercase(), value))
            .collect())
    }
}

impl Display for FiatSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.host())
    }
}

impl FromStr for FiatSource {
    type Err = RateError;

    /// Accepts either the configuration name or the provider host.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim().to_lowercase();
        FiatSource::ALL
            .into_iter()
            .find(|source| id == source.host() || id == source.name())
            .ok_or_else(|| RateError::UnsupportedProvider(s.to_string()))
    }
}

/// Decodes a raw payload for the provider named by `provider_id`.
pub fn parse_rates(raw: &[u8], provider_id: &str) -> RateResult<RateMap> {
    provider_id.parse::<FiatSource>()?.parse(raw)
}
