use crate::core::error::{RateError, RateResult};
use crate::core::rates::{FetchedRates, RateMap};
use crate::providers::fiat::FiatSource;
use crate::providers::util::get_body;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// One entry of the fallback chain.
#[derive(Debug, Clone, PartialEq)]
pub struct FiatEndpoint {
    pub source: FiatSource,
    pub base_url: String,
}

impl FiatEndpoint {
    pub fn new(source: FiatSource, base_url: &str) -> Self {
        Self {
            source,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.source.endpoint())
    }
}

impl From<FiatSource> for FiatEndpoint {
    fn from(source: FiatSource) -> Self {
        FiatEndpoint::new(source, &source.default_base_url())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Coverage {
    Complete,
    Partial { missing: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FiatFetch {
    pub rates: RateMap,
    pub timestamp: DateTime<Utc>,
    pub coverage: Coverage,
    /// Failures of providers that were skipped over.
    pub warnings: Vec<String>,
}

impl From<FiatFetch> for FetchedRates {
    fn from(fetch: FiatFetch) -> Self {
        let mut warnings = fetch.warnings;
        if let Coverage::Partial { missing } = fetch.coverage {
            warnings.push(format!("no fiat rate for {}", missing.join(", ")));
        }
        FetchedRates {
            rates: fetch.rates,
            timestamp: fetch.timestamp,
            warnings,
        }
    }
}

/// Tries fiat providers in priority order until the required codes are covered.
#[derive(Clone)]
pub struct FiatChain {
    client: Client,
    endpoints: Vec<FiatEndpoint>,
}

fn missing_codes(required: &HashSet<String>, rates: &RateMap) -> Vec<String> {
    let mut missing: Vec<String> = required
        .iter()
        .filter(|code| !rates.contains_key(*code))
        .cloned()
        .collect();
    missing.sort();
    missing
}

impl FiatChain {
    pub fn new(client: Client, endpoints: Vec<FiatEndpoint>) -> Self {
        Self { client, endpoints }
    }

    async fn fetch_one(&self, endpoint: &FiatEndpoint) -> RateResult<RateMap> {
        let body = get_body(&self.client, &endpoint.url(), endpoint.source.host()).await?;
        endpoint.source.parse(&body)
    }

    /// Fetches fiat rates. An empty `required` set accepts the first success.
    ///
    /// Provider failures are absorbed as long as one provider returns data;
    /// later successes overwrite earlier values for the codes they report.
    #[instrument(skip(self), fields(providers = self.endpoints.len()))]
    pub async fn fetch(&self, required: &HashSet<String>) -> RateResult<FiatFetch> {
        let mut aggregated = RateMap::new();
        let mut timestamp: Option<DateTime<Utc>> = None;
        let mut warnings = Vec::new();
        let mut last_error = None;

        for endpoint in &self.endpoints {
            match self.fetch_one(endpoint).await {
                Ok(parsed) => {
                    debug!(
                        provider = %endpoint.source,
                        rates = parsed.len(),
                        "Fiat provider succeeded"
                    );
                    aggregated.extend(parsed);
                    let now = Utc::now();
                    timestamp = Some(now);

                    let missing = missing_codes(required, &aggregated);
                    if missing.is_empty() {
                        return Ok(FiatFetch {
                            rates: aggregated,
                            timestamp: now,
                            coverage: Coverage::Complete,
                            warnings,
                        });
                    }
                    debug!(missing = ?missing, "Fiat coverage incomplete, trying next provider");
                }
                Err(e) => {
                    warn!(provider = %endpoint.source, error = %e, "Fiat provider failed");
                    warnings.push(format!("{}: {}", endpoint.source, e));
                    last_error = Some(e);
                }
            }
        }

        match timestamp {
            Some(timestamp) => {
                let missing = missing_codes(required, &aggregated);
                info!(missing = ?missing, "Fiat chain exhausted with partial coverage");
                Ok(FiatFetch {
                    rates: aggregated,
                    timestamp,
                    coverage: Coverage::Partial { missing },
                    warnings,
                })
            }
            None => Err(last_error.unwrap_or(RateError::NoProviderReachable)),
        }
    }
}
