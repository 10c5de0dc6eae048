use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use xcurrency::cli::setup::setup;
use xcurrency::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for xcurrency::AppCommand {
    fn from(cmd: Commands) -> xcurrency::AppCommand {
        match cmd {
            Commands::Refresh {
                fiat_only,
                crypto_only,
            } => xcurrency::AppCommand::Refresh {
                include_fiat: !crypto_only,
                include_crypto: !fiat_only,
            },
            Commands::Show { amount, base } => xcurrency::AppCommand::Show { amount, base },
            Commands::Watch => xcurrency::AppCommand::Watch,
            Commands::Background => xcurrency::AppCommand::Background,
            Commands::Clear => xcurrency::AppCommand::Clear,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch fresh rates and store them
    Refresh {
        /// Only refresh fiat currencies
        #[arg(long, conflicts_with = "crypto_only")]
        fiat_only: bool,
        /// Only refresh crypto currencies
        #[arg(long)]
        crypto_only: bool,
    },
    /// Display cached rates
    Show {
        /// Amount to convert
        #[arg(short, long)]
        amount: Option<f64>,
        /// Currency the amount is given in
        #[arg(short, long)]
        base: Option<String>,
    },
    /// Keep refreshing until interrupted
    Watch,
    /// Run a single deadline-bound background refresh
    Background,
    /// Remove all cached rates
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => xcurrency::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
