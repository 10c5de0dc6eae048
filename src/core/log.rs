use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, filter::Targets, fmt, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

const CRATE_TARGET: &str = "xcurrency";

/// Filter used when `RUST_LOG` is unset: crate events follow `verbose`,
/// dependencies only report warnings.
fn default_filter(verbose: bool) -> Targets {
    let crate_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    Targets::new()
        .with_default(LevelFilter::WARN)
        .with_target(CRATE_TARGET, crate_level)
}

/// Installs the global subscriber. `RUST_LOG` replaces the default filter
/// entirely. Logs go to stderr so tables on stdout stay clean.
pub fn init_logging(verbose: bool) {
    let registry = tracing_subscriber::registry().with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .without_time()
            .with_target(verbose),
    );

    match EnvFilter::try_from_default_env() {
        Ok(env_filter) => registry.with(env_filter).init(),
        Err(_) => registry.with(default_filter(verbose)).init(),
    }
}
