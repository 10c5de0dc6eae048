//! Currency catalog and classification

use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub const USD: &str = "USD";

pub const DEFAULT_SELECTION: [&str; 6] = ["USD", "EUR", "RUB", "BTC", "ETH", "USDT"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyKind {
    Fiat,
    Crypto,
}

impl Display for CurrencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CurrencyKind::Fiat => write!(f, "fiat"),
            CurrencyKind::Crypto => write!(f, "crypto"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Currency {
    pub code: &'static str,
    pub name: &'static str,
    pub kind: CurrencyKind,
}

const fn fiat(code: &'static str, name: &'static str) -> Currency {
    Currency {
        code,
        name,
        kind: CurrencyKind::Fiat,
    }
}

const fn crypto(code: &'static str, name: &'static str) -> Currency {
    Currency {
        code,
        name,
        kind: CurrencyKind::Crypto,
    }
}

static CATALOG: &[Currency] = &[
    fiat("AED", "UAE Dirham"),
    crypto("ADA", "Cardano"),
    crypto("BNB", "BNB"),
    crypto("BTC", "Bitcoin"),
    crypto("BUSD", "Binance USD"),
    fiat("CHF", "Swiss Franc"),
    fiat("CNY", "Chinese Yuan"),
    crypto("DAI", "Dai"),
    crypto("DOGE", "Dogecoin"),
    crypto("ETH", "Ethereum"),
    fiat("EUR", "Euro"),
    crypto("FDUSD", "First Digital USD"),
    fiat("GBP", "British Pound"),
    crypto("GUSD", "Gemini Dollar"),
    fiat("JPY", "Japanese Yen"),
    fiat("KZT", "Kazakhstani Tenge"),
    crypto("LTC", "Litecoin"),
    fiat("PLN", "Polish Zloty"),
    fiat("RUB", "Russian Ruble"),
    crypto("SOL", "Solana"),
    crypto("TON", "Toncoin"),
    fiat("TRY", "Turkish Lira"),
    crypto("TUSD", "TrueUSD"),
    fiat("UAH", "Ukrainian Hryvnia"),
    fiat("USD", "US Dollar"),
    crypto("USDC", "USD Coin"),
    crypto("USDP", "Pax Dollar"),
    crypto("USDT", "Tether"),
    crypto("XRP", "XRP"),
];

/// Provider asset ids used by the crypto price endpoint.
static CRYPTO_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("USDT", "tether"),
    ("USDC", "usd-coin"),
    ("DAI", "dai"),
    ("BUSD", "binance-usd"),
    ("TUSD", "true-usd"),
    ("USDP", "paxos-standard"),
    ("GUSD", "gemini-dollar"),
    ("FDUSD", "first-digital-usd"),
    ("SOL", "solana"),
    ("BNB", "binancecoin"),
    ("DOGE", "dogecoin"),
    ("TON", "the-open-network"),
    ("LTC", "litecoin"),
    ("ADA", "cardano"),
    ("XRP", "ripple"),
];

/// Trims and upper-cases a currency code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub fn all() -> &'static [Currency] {
    CATALOG
}

pub fn lookup(code: &str) -> Option<&'static Currency> {
    let code = normalize_code(code);
    CATALOG.iter().find(|c| c.code == code)
}

pub fn crypto_id(code: &str) -> Option<&'static str> {
    let code = normalize_code(code);
    CRYPTO_IDS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, id)| *id)
}

/// A code is crypto iff the price provider knows an asset id for it.
pub fn kind_of(code: &str) -> CurrencyKind {
    if crypto_id(code).is_some() {
        CurrencyKind::Crypto
    } else {
        CurrencyKind::Fiat
    }
}

pub fn default_selection() -> Vec<String> {
    DEFAULT_SELECTION.iter().map(|c| c.to_string()).collect()
}
