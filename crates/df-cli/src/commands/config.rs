//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use df_core::config::{self, FleetConfig};

/// Config file in effect: `--config` or the default location
pub fn config_path(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

/// Show current configuration
pub fn config_show(path: &Path) -> Result<()> {
    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Showing defaults; run 'deskfleet config init' to write them");
        println!();
        println!("{}", toml::to_string_pretty(&FleetConfig::default())?);
        return Ok(());
    }

    print_info(&format!("Configuration file: {:?}", path));
    println!();

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    println!("{}", content);

    Ok(())
}

/// Get a config value by dotted key (`network.range_start`)
pub fn config_get(path: &Path, key: &str) -> Result<()> {
    let loaded: FleetConfig = config::load_or_default(path)?;
    let mut current = toml::Value::try_from(&loaded)?;

    for part in key.split('.') {
        match current.get(part) {
            Some(v) => current = v.clone(),
            None => {
                print_error(&format!("Key not found: {}", key));
                anyhow::bail!("Key not found: {}", key);
            }
        }
    }

    match current {
        toml::Value::String(s) => println!("{}", s),
        toml::Value::Table(_) => println!("{}", toml::to_string_pretty(&current)?),
        other => println!("{}", other),
    }
    Ok(())
}

/// Write the default configuration
pub fn config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    config::save_config(path, &FleetConfig::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    print_success(&format!("Created configuration file: {:?}", path));
    Ok(())
}
