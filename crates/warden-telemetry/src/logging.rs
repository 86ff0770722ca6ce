//! Subscriber configuration and installation.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use crate::error::{TelemetryError, TelemetryResult};

/// Output format of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-oriented.
    Pretty,
    /// Single line, abbreviated.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
    /// Single line with every span field.
    Full,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            "full" => Ok(Self::Full),
            other => Err(TelemetryError::UnknownFormat(other.to_owned())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
            Self::Full => "full",
        })
    }
}

/// Where log lines are written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogTarget {
    /// Standard error (keeps stdout clean for command output).
    #[default]
    Stderr,
    /// Standard output.
    Stdout,
    /// Daily-rolling files named `warden.log.YYYY-MM-DD` in a directory.
    File(PathBuf),
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Base level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Line format.
    pub format: LogFormat,
    /// Destination.
    pub target: LogTarget,
    /// Extra `EnvFilter` directives, e.g. `warden_catalog=trace`.
    pub directives: Vec<String>,
    /// Colorize output (ignored for file targets).
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

impl LogConfig {
    /// Create a config at `level` with compact stderr output.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            directives: Vec::new(),
            ansi: true,
        }
    }

    /// Set the line format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the destination.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Add a filter directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Enable or disable ANSI colors.
    #[must_use]
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Build the filter from the level and directives, ignoring `RUST_LOG`.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidDirective`] for any unparsable entry.
    pub fn build_filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter =
            EnvFilter::try_new(&self.level).map_err(|e| TelemetryError::InvalidDirective {
                directive: self.level.clone(),
                message: e.to_string(),
            })?;
        for directive in &self.directives {
            let parsed = directive
                .parse()
                .map_err(|e: tracing_subscriber::filter::ParseError| {
                    TelemetryError::InvalidDirective {
                        directive: directive.clone(),
                        message: e.to_string(),
                    }
                })?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

/// Install the global subscriber described by `config`.
///
/// `RUST_LOG`, when set and parsable, replaces the configured level and
/// directives entirely.
///
/// # Errors
///
/// Returns an error if the filter is invalid, the log directory cannot be
/// created, or a subscriber is already installed.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => config.build_filter()?,
    };

    match &config.target {
        LogTarget::Stderr => install(config, filter, std::io::stderr, config.ansi),
        LogTarget::Stdout => install(config, filter, std::io::stdout, config.ansi),
        LogTarget::File(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "warden.log");
            install(config, filter, appender, false)
        },
    }
}

fn install<W>(config: &LogConfig, filter: EnvFilter, writer: W, ansi: bool) -> TelemetryResult<()>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);

    let result = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Full => builder.try_init(),
    };
    result.map_err(|e| TelemetryError::InitError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_settings() {
        let config = LogConfig::new("debug")
            .with_format(LogFormat::Json)
            .with_target(LogTarget::Stdout)
            .with_directive("warden_crx=trace")
            .with_directive("reqwest=warn")
            .with_ansi(false);

        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.target, LogTarget::Stdout);
        assert_eq!(config.directives, vec!["warden_crx=trace", "reqwest=warn"]);
        assert!(!config.ansi);
    }

    #[test]
    fn default_is_compact_info_on_stderr() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.target, LogTarget::Stderr);
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("PRETTY".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(TelemetryError::UnknownFormat(_))
        ));
        assert_eq!(LogFormat::Full.to_string(), "full");
    }

    #[test]
    fn build_filter_accepts_valid_directives() {
        let config = LogConfig::new("info").with_directive("warden_registry=debug");
        assert!(config.build_filter().is_ok());
    }

    #[test]
    fn build_filter_rejects_bad_directive() {
        let config = LogConfig::new("info").with_directive("warden_registry=loud");
        let err = config.build_filter().unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidDirective { .. }));
        assert!(err.to_string().contains("warden_registry=loud"));
    }
}
