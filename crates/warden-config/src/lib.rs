#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Layered configuration for warden.
//!
//! # Usage
//!
//! ```rust,no_run
//! use warden_config::Config;
//!
//! let resolved = Config::load(None).unwrap();
//! println!("Catalog: {}", resolved.config.catalog.detail_base_url);
//! ```
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **User** (`~/.warden/config.toml`, or `$WARDEN_HOME/config.toml`)
//! 2. **System** (`/etc/warden/config.toml`)
//! 3. **Environment variables** (`WARDEN_*`), fallback only
//! 4. **Embedded defaults** (`defaults.toml` compiled into binary)
//!
//! This crate has no dependencies on other warden crates. Conversion into
//! domain types (`SecurityPolicy`, catalog settings, `LogConfig`) happens in
//! the binary.

mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
mod merge;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::ResolvedConfig;
pub use types::*;

impl Config {
    /// Load configuration with full precedence chain.
    ///
    /// # Errors
    ///
    /// See [`loader::load`].
    pub fn load(warden_home: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(warden_home)
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if a value cannot be represented in TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
