//! Warden CLI - install and manage sandboxed browser-extension packages.
//!
//! Every command opens the registry and broker against one home directory,
//! does its work, and exits. There is no daemon.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config_bridge;
mod context;
mod theme;

use commands::{catalog, config, install, packages, permissions};
use context::App;
use theme::Theme;

/// Warden - sandboxed extension package manager
#[derive(Parser)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Home directory (defaults to $WARDEN_HOME, then ~/.warden)
    #[arg(long, global = true, env = "WARDEN_HOME")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a package from the catalog by URL or id
    Install {
        /// Catalog detail URL or 32-character package id
        source: String,
        /// Replace an existing installation
        #[arg(long)]
        replace: bool,
        /// Approve any escalation request without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Install a package from a local .crx file or unpacked directory
    InstallLocal {
        /// Path to the container or directory
        path: PathBuf,
        /// Replace an existing installation
        #[arg(long)]
        replace: bool,
    },

    /// List installed packages
    List,

    /// Show details of an installed package
    Info {
        /// Package id
        id: String,
    },

    /// Enable an installed package
    Enable {
        /// Package id
        id: String,
    },

    /// Disable an installed package
    Disable {
        /// Package id
        id: String,
    },

    /// Remove an installed package
    Uninstall {
        /// Package id
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show granted capabilities and open requests for a package
    Permissions {
        /// Package id
        id: String,
    },

    /// Revoke capabilities (all of them when none are named)
    Revoke {
        /// Package id
        id: String,
        /// Capabilities to revoke
        capabilities: Vec<String>,
    },

    /// List pending escalation requests
    Pending,

    /// Approve a pending escalation request
    Approve {
        /// Request id (`req:<uuid>` or bare uuid)
        request_id: String,
    },

    /// Deny a pending escalation request
    Deny {
        /// Request id (`req:<uuid>` or bare uuid)
        request_id: String,
    },

    /// Show catalog metadata for a package
    Metadata {
        /// Catalog detail URL or package id
        source: String,
    },

    /// Browse the catalog
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum CatalogCommands {
    /// List featured packages
    Popular,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the resolved configuration
    Show {
        /// Output format: toml (default) or json
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Show the config files that are checked
    Paths,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        eprintln!("{}", Theme::error(&format!("{e:#}")));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let home = context::resolve_home(cli.home)?;

    let loaded = warden_config::Config::load(Some(home.root()));
    let mut log_config = match &loaded {
        Ok(resolved) => config_bridge::to_log_config(&resolved.config, &home),
        Err(_) => warden_telemetry::LogConfig::new("warn")
            .with_format(warden_telemetry::LogFormat::Compact),
    };
    if cli.verbose {
        "debug".clone_into(&mut log_config.level);
    }
    if let Err(e) = warden_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    // Config and catalog browsing work without a usable home.
    let command = match cli.command {
        Commands::Config { command } => {
            return match command {
                ConfigCommands::Show { format } => config::show_config(&home, &format),
                ConfigCommands::Paths => config::show_paths(&home),
            };
        },
        Commands::Catalog {
            command: CatalogCommands::Popular,
        } => {
            catalog::popular();
            return Ok(());
        },
        other => other,
    };

    let config = loaded?.config;
    let app = App::open(home, &config).await?;

    match command {
        Commands::Install {
            source,
            replace,
            yes,
        } => install::install(&app, &source, replace, yes).await,
        Commands::InstallLocal { path, replace } => {
            install::install_local(&app, &path, replace).await
        },
        Commands::List => packages::list(&app).await,
        Commands::Info { id } => packages::info(&app, &id).await,
        Commands::Enable { id } => packages::set_enabled(&app, &id, true).await,
        Commands::Disable { id } => packages::set_enabled(&app, &id, false).await,
        Commands::Uninstall { id, yes } => packages::uninstall(&app, &id, yes).await,
        Commands::Permissions { id } => permissions::show(&app, &id).await,
        Commands::Revoke { id, capabilities } => {
            permissions::revoke(&app, &id, &capabilities).await
        },
        Commands::Pending => permissions::pending(&app).await,
        Commands::Approve { request_id } => permissions::resolve(&app, &request_id, true).await,
        Commands::Deny { request_id } => permissions::resolve(&app, &request_id, false).await,
        Commands::Metadata { source } => catalog::metadata(&app, &source).await,
        Commands::Catalog { .. } | Commands::Config { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn revoke_collects_capabilities() {
        let cli = Cli::parse_from(["warden", "revoke", "abc", "storage", "tabs"]);
        match cli.command {
            Commands::Revoke { id, capabilities } => {
                assert_eq!(id, "abc");
                assert_eq!(capabilities, ["storage", "tabs"]);
            },
            _ => panic!("expected revoke"),
        }
    }

    #[test]
    fn home_is_global() {
        let cli = Cli::parse_from(["warden", "list", "--home", "/tmp/w"]);
        assert_eq!(cli.home, Some(PathBuf::from("/tmp/w")));
        assert!(matches!(cli.command, Commands::List));
    }
}
