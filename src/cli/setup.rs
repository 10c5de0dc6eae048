use super::ui;
use crate::core::config::AppConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

const EXAMPLE_CONFIG: &str = include_str!("../../docs/example_config.yaml");

/// Writes the example configuration to the default location and prints
/// what it selects.
pub fn setup() -> Result<()> {
    let path = AppConfig::default_config_path()?;
    let config = setup_at_path(&path)?;

    println!(
        "{} {}",
        ui::style_text("Created", ui::StyleType::Success),
        path.display()
    );
    println!(
        "{} {} (base {})",
        ui::style_text("Following:", ui::StyleType::Label),
        config.selection().join(", "),
        config.base()
    );
    Ok(())
}

/// Writes the example configuration to `path` and loads it back.
///
/// An existing file is never overwritten. If the written file does not load
/// it is removed again so a later `setup` can retry.
pub fn setup_at_path<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path = path.as_ref();
    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
    }
    fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    match AppConfig::load_from_path(path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "Wrote example configuration");
            Ok(config)
        }
        Err(e) => {
            let _ = fs::remove_file(path);
            Err(e.context("Example configuration is invalid"))
        }
    }
}
