//! CLI handlers for the `warden config` subcommand.

use anyhow::Result;
use warden_config::Config;
use warden_config::loader::search_paths;
use warden_core::dirs::WardenHome;

/// Show the resolved configuration.
pub(crate) fn show_config(home: &WardenHome, format: &str) -> Result<()> {
    let resolved = Config::load(Some(home.root()))?;

    let output = match format {
        "json" => serde_json::to_string_pretty(&resolved.config)?,
        _ => resolved
            .config
            .to_toml()
            .map_err(|e| anyhow::anyhow!("failed to format config: {e}"))?,
    };
    println!("{output}");

    if !resolved.loaded_files.is_empty() {
        eprintln!("\nLoaded files:");
        for path in &resolved.loaded_files {
            eprintln!("  - {}", path.display());
        }
    }
    Ok(())
}

/// Show all config file paths that are checked.
pub(crate) fn show_paths(home: &WardenHome) -> Result<()> {
    let paths = search_paths(Some(home.root()))?;

    println!("Configuration files checked (in precedence order):\n");
    for (i, path) in paths.iter().enumerate() {
        let status = if path.exists() { "found" } else { "not found" };
        println!("  {}. {}  [{status}]", i.saturating_add(1), path.display());
    }

    println!("\nEnvironment variable fallbacks:");
    println!("  WARDEN_LOG_LEVEL          -> logging.level");
    println!("  WARDEN_LOG_FORMAT         -> logging.format");
    println!("  WARDEN_LOG_TARGET         -> logging.target");
    println!("  WARDEN_CATALOG_USER_AGENT -> catalog.user_agent");
    Ok(())
}
