//! Concurrent fiat and crypto fetch merged into one snapshot.

use crate::core::config::{ProvidersConfig, RefreshConfig};
use crate::core::currency::{CurrencyKind, USD, kind_of, normalize_code};
use crate::core::error::RateResult;
use crate::core::rates::{FetchedRates, RateFetching, RatesSnapshot};
use crate::providers::coingecko::CoinGeckoFetcher;
use crate::providers::fiat_chain::FiatChain;
use crate::providers::util::http_client;
use async_trait::async_trait;
use futures::future::OptionFuture;
use std::collections::HashSet;
use tracing::{info, instrument};

pub struct RateFetcher {
    fiat: FiatChain,
    crypto: CoinGeckoFetcher,
}

impl RateFetcher {
    pub fn new(fiat: FiatChain, crypto: CoinGeckoFetcher) -> Self {
        Self { fiat, crypto }
    }

    pub fn from_config(providers: &ProvidersConfig, refresh: &RefreshConfig) -> RateResult<Self> {
        let client = http_client(refresh.timeout())?;
        Ok(Self::new(
            FiatChain::new(client.clone(), providers.fiat_endpoints()),
            CoinGeckoFetcher::new(client, providers.coingecko_base_url()),
        ))
    }
}

/// Combines both branch results. Crypto wins on collisions and USD is pinned.
fn merge(
    fiat: FetchedRates,
    crypto: FetchedRates,
    include_fiat: bool,
    include_crypto: bool,
) -> RatesSnapshot {
    let combined_timestamp = fiat.timestamp.max(crypto.timestamp);
    let mut rates = fiat.rates;
    rates.extend(crypto.rates);
    rates.insert(USD.to_string(), 1.0);

    let mut warnings = fiat.warnings;
    warnings.extend(crypto.warnings);

    RatesSnapshot {
        rates,
        fiat_timestamp: include_fiat.then_some(fiat.timestamp),
        crypto_timestamp: include_crypto.then_some(crypto.timestamp),
        combined_timestamp,
        warnings,
    }
}

#[async_trait]
impl RateFetching for RateFetcher {
    #[instrument(skip(self))]
    async fn fetch_all(
        &self,
        codes: &[String],
        include_fiat: bool,
        include_crypto: bool,
    ) -> RateResult<RatesSnapshot> {
        let codes: Vec<String> = codes.iter().map(|c| normalize_code(c)).collect();
        let fiat_required: HashSet<String> = codes
            .iter()
            .filter(|c| c.as_str() != USD && kind_of(c) == CurrencyKind::Fiat)
            .cloned()
            .collect();
        let crypto_codes: Vec<String> = codes
            .iter()
            .filter(|c| kind_of(c) == CurrencyKind::Crypto)
            .cloned()
            .collect();

        let fiat: OptionFuture<_> = include_fiat.then(|| self.fiat.fetch(&fiat_required)).into();
        let crypto: OptionFuture<_> =
            include_crypto.then(|| self.crypto.fetch(&crypto_codes)).into();
        let (fiat, crypto) = tokio::join!(fiat, crypto);

        let fiat = match fiat {
            Some(result) => result?.into(),
            None => FetchedRates::never(),
        };
        let crypto = crypto.transpose()?.unwrap_or_else(FetchedRates::never);

        let snapshot = merge(fiat, crypto, include_fiat, include_crypto);
        info!(
            rates = snapshot.rates.len(),
            warnings = snapshot.warnings.len(),
            timestamp = %snapshot.combined_timestamp,
            "Fetched rates"
        );
        Ok(snapshot)
    }
}
