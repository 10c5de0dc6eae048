use crate::core::currency::{USD, default_selection, normalize_code};
use crate::core::staleness::StalenessConfig;
use crate::providers::coingecko;
use crate::providers::fiat::FiatSource;
use crate::providers::fiat_chain::FiatEndpoint;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FiatProviderConfig {
    pub source: FiatSource,
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CoinGeckoProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProvidersConfig {
    /// Fiat providers in fallback order.
    #[serde(default = "default_fiat_providers")]
    pub fiat: Vec<FiatProviderConfig>,
    pub coingecko: Option<CoinGeckoProviderConfig>,
}

fn default_fiat_providers() -> Vec<FiatProviderConfig> {
    FiatSource::ALL
        .into_iter()
        .map(|source| FiatProviderConfig {
            source,
            base_url: None,
        })
        .collect()
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            fiat: default_fiat_providers(),
            coingecko: Some(CoinGeckoProviderConfig {
                base_url: coingecko::DEFAULT_BASE_URL.to_string(),
            }),
        }
    }
}

impl ProvidersConfig {
    pub fn fiat_endpoints(&self) -> Vec<FiatEndpoint> {
        self.fiat
            .iter()
            .map(|p| match &p.base_url {
                Some(url) => FiatEndpoint::new(p.source, url),
                None => FiatEndpoint::from(p.source),
            })
            .collect()
    }

    pub fn coingecko_base_url(&self) -> &str {
        self.coingecko
            .as_ref()
            .map_or(coingecko::DEFAULT_BASE_URL, |p| &p.base_url)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RefreshConfig {
    /// Foreground ticker period.
    pub interval_secs: u64,
    /// Fetch attempts per refresh cycle.
    pub attempts: usize,
    /// Flat pause between attempts.
    pub backoff_ms: u64,
    /// Per request HTTP timeout.
    pub timeout_secs: u64,
    pub background_interval_secs: u64,
    /// Time a background cycle may run before it is cancelled.
    pub background_deadline_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            attempts: 2,
            backoff_ms: 300,
            timeout_secs: 15,
            background_interval_secs: 15 * 60,
            background_deadline_secs: 25,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn background_interval(&self) -> Duration {
        Duration::from_secs(self.background_interval_secs.max(1))
    }

    pub fn background_deadline(&self) -> Duration {
        Duration::from_secs(self.background_deadline_secs)
    }
}

fn default_base_currency() -> String {
    USD.to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Codes the user follows, in display order.
    #[serde(default = "default_selection")]
    pub currencies: Vec<String>,
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub staleness: StalenessConfig,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            currencies: default_selection(),
            base_currency: default_base_currency(),
            providers: ProvidersConfig::default(),
            refresh: RefreshConfig::default(),
            staleness: StalenessConfig::default(),
            data_path: None,
        }
    }
}

impl AppConfig {
    /// Loads the config from the default location, falling back to defaults
    /// when no file was created yet.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "xcurrency", "xcurrency")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("dev", "xcurrency", "xcurrency")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Selected codes, normalized and without duplicates.
    pub fn selection(&self) -> Vec<String> {
        let mut codes: Vec<String> = Vec::new();
        for code in self.currencies.iter().map(|c| normalize_code(c)) {
            if !code.is_empty() && !codes.contains(&code) {
                codes.push(code);
            }
        }
        codes
    }

    /// The base code, or the first selected code when the base is not selected.
    pub fn base(&self) -> String {
        let selection = self.selection();
        let base = normalize_code(&self.base_currency);
        if selection.contains(&base) {
            base
        } else {
            selection.into_iter().next().unwrap_or_else(default_base_currency)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
currencies: ["usd", "EUR", "BTC", "EUR"]
base_currency: "eur"
providers:
  fiat:
    - source: open-er-api
    - source: frankfurter
      base_url: "http://example.com/frankfurter/"
  coingecko:
    base_url: "http://example.com/coingecko"
refresh:
  interval_secs: 30
staleness:
  crypto_secs: 120
data_path: "/tmp/xcurrency"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.selection(), vec!["USD", "EUR", "BTC"]);
        assert_eq!(config.base(), "EUR");

        let endpoints = config.providers.fiat_endpoints();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].url(), "https://open.er-api.com/v6/latest/USD");
        assert_eq!(
            endpoints[1].url(),
            "http://example.com/frankfurter/latest?from=USD"
        );
        assert_eq!(
            config.providers.coingecko_base_url(),
            "http://example.com/coingecko"
        );

        assert_eq!(config.refresh.interval_secs, 30);
        assert_eq!(config.refresh.attempts, 2);
        assert_eq!(config.refresh.backoff_ms, 300);
        assert_eq!(config.staleness.crypto_secs, 120);
        assert_eq!(config.staleness.fiat_secs, 12 * 60 * 60);
        assert_eq!(
            config.default_data_path().unwrap(),
            PathBuf::from("/tmp/xcurrency")
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.selection(), default_selection());
        assert_eq!(config.base(), "USD");
        assert_eq!(
            config
                .providers
                .fiat_endpoints()
                .iter()
                .map(|e| e.source)
                .collect::<Vec<_>>(),
            FiatSource::ALL.to_vec()
        );
    }

    #[test]
    fn test_unselected_base_falls_back_to_first() {
        let config = AppConfig {
            currencies: vec!["RUB".to_string(), "BTC".to_string()],
            base_currency: "EUR".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.base(), "RUB");
    }

    #[test]
    fn test_unknown_fiat_source_is_rejected() {
        let yaml_str = r#"
providers:
  fiat:
    - source: yahoo
"#;
        assert!(serde_yaml::from_str::<AppConfig>(yaml_str).is_err());
    }
}
