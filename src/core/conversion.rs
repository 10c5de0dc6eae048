use crate::core::currency::{USD, normalize_code};
use crate::core::rates::RateMap;

fn units_per_usd(code: &str, rates: &RateMap) -> Option<f64> {
    if code == USD {
        return Some(1.0);
    }
    rates.get(code).copied().filter(|r| *r > 0.0 && r.is_finite())
}

/// Converts `amount` of `from` into `to` through the USD-normalized rates.
pub fn convert(amount: f64, from: &str, to: &str, rates: &RateMap) -> Option<f64> {
    let from = normalize_code(from);
    let to = normalize_code(to);
    if from == to {
        return Some(amount);
    }
    let amount_usd = amount / units_per_usd(&from, rates)?;
    Some(amount_usd * units_per_usd(&to, rates)?)
}
