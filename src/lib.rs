pub mod cli;
pub mod core;
pub mod fetcher;
pub mod providers;
pub mod refresh;
pub mod store;

use crate::core::config::AppConfig;
use crate::fetcher::RateFetcher;
use crate::refresh::{RateRefresher, run_ticker};
use crate::store::RateStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Refresh {
        include_fiat: bool,
        include_crypto: bool,
    },
    Show {
        amount: Option<f64>,
        base: Option<String>,
    },
    Watch,
    Background,
    Clear,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("xcurrency starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let data_path = config.default_data_path()?;
    let store = RateStore::open(&data_path)
        .with_context(|| format!("Failed to open rate cache at {}", data_path.display()))?;
    let fetcher = RateFetcher::from_config(&config.providers, &config.refresh)?;
    let refresher = Arc::new(
        RateRefresher::new(Arc::new(fetcher), store, config.selection(), &config.refresh).await,
    );

    match command {
        AppCommand::Refresh {
            include_fiat,
            include_crypto,
        } => cli::rates::refresh(&refresher, &config, include_fiat, include_crypto).await,
        AppCommand::Show { amount, base } => {
            cli::rates::show(&refresher, &config, amount, base.as_deref()).await
        }
        AppCommand::Watch => {
            run_ticker(Arc::clone(&refresher), &config.refresh, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                }
            })
            .await;
            cli::rates::show(&refresher, &config, None, None).await
        }
        AppCommand::Background => {
            let success = refresher
                .background_cycle(config.refresh.background_deadline())
                .await;
            if !success {
                anyhow::bail!("Background refresh did not complete");
            }
            info!("Background refresh completed");
            Ok(())
        }
        AppCommand::Clear => {
            if !refresher.store().clear_all().await {
                anyhow::bail!("Failed to clear rate cache");
            }
            info!("Cleared rate cache");
            Ok(())
        }
    }
}
