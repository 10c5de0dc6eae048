pub mod coingecko;
pub mod fiat;
pub mod fiat_chain;
pub mod util;
