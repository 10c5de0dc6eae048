//! Freshness classification of cached rates

use crate::core::currency::CurrencyKind;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Missing,
}

impl Display for Freshness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Freshness::Fresh => "fresh",
                Freshness::Stale => "stale",
                Freshness::Missing => "missing",
            }
        )
    }
}

/// Age after which a rate is shown as stale. Crypto moves much faster than fiat.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StalenessConfig {
    #[serde(default = "default_fiat_secs")]
    pub fiat_secs: i64,
    #[serde(default = "default_crypto_secs")]
    pub crypto_secs: i64,
}

fn default_fiat_secs() -> i64 {
    12 * 60 * 60
}

fn default_crypto_secs() -> i64 {
    10 * 60
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            fiat_secs: default_fiat_secs(),
            crypto_secs: default_crypto_secs(),
        }
    }
}

impl StalenessConfig {
    pub fn threshold(&self, kind: CurrencyKind) -> Duration {
        match kind {
            CurrencyKind::Fiat => Duration::seconds(self.fiat_secs),
            CurrencyKind::Crypto => Duration::seconds(self.crypto_secs),
        }
    }

    pub fn freshness(
        &self,
        kind: CurrencyKind,
        updated_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Freshness {
        match updated_at {
            None => Freshness::Missing,
            Some(ts) if now - ts > self.threshold(kind) => Freshness::Stale,
            Some(_) => Freshness::Fresh,
        }
    }
}

/// Short human readable age, e.g. "42s", "5m", "3h", "2d".
pub fn format_age(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - updated_at).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_differ_per_kind() {
        let config = StalenessConfig::default();
        let now = Utc::now();
        let an_hour_ago = Some(now - Duration::hours(1));

        assert_eq!(
            config.freshness(CurrencyKind::Fiat, an_hour_ago, now),
            Freshness::Fresh
        );
        assert_eq!(
            config.freshness(CurrencyKind::Crypto, an_hour_ago, now),
            Freshness::Stale
        );
        assert_eq!(
            config.freshness(CurrencyKind::Crypto, None, now),
            Freshness::Missing
        );
    }

    #[test]
    fn test_threshold_boundary_is_fresh() {
        let config = StalenessConfig {
            fiat_secs: 60,
            crypto_secs: 60,
        };
        let now = Utc::now();
        let at_threshold = Some(now - Duration::seconds(60));
        assert_eq!(
            config.freshness(CurrencyKind::Fiat, at_threshold, now),
            Freshness::Fresh
        );
    }

    #[test]
    fn test_format_age() {
        let now = Utc::now();
        assert_eq!(format_age(now - Duration::seconds(42), now), "42s");
        assert_eq!(format_age(now - Duration::minutes(5), now), "5m");
        assert_eq!(format_age(now - Duration::hours(3), now), "3h");
        assert_eq!(format_age(now - Duration::days(2), now), "2d");
        assert_eq!(format_age(now + Duration::seconds(5), now), "0s");
    }
}
