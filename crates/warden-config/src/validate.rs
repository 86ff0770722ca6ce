//! Post-merge configuration validation.

use std::collections::HashMap;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];
const LOG_FORMATS: &[&str] = &["pretty", "compact", "json", "full"];
const LOG_TARGETS: &[&str] = &["stderr", "stdout", "file"];

/// Upper bound on followed redirects.
const MAX_REDIRECTS_UPPER_BOUND: usize = 20;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_catalog(config)?;
    validate_policy(config)?;
    validate_extract(config)?;
    validate_broker(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_catalog(config: &Config) -> ConfigResult<()> {
    let c = &config.catalog;

    for (field, url) in [
        ("catalog.detail_base_url", &c.detail_base_url),
        ("catalog.download_base_url", &c.download_base_url),
    ] {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(invalid(field, format!("'{url}' is not an http(s) URL")));
        }
    }

    if c.metadata_timeout_secs == 0 {
        return Err(invalid("catalog.metadata_timeout_secs", "must be at least 1"));
    }
    if c.download_timeout_secs == 0 {
        return Err(invalid("catalog.download_timeout_secs", "must be at least 1"));
    }
    if c.max_redirects > MAX_REDIRECTS_UPPER_BOUND {
        return Err(invalid(
            "catalog.max_redirects",
            format!("must be at most {MAX_REDIRECTS_UPPER_BOUND}"),
        ));
    }
    if c.user_agent.trim().is_empty() {
        return Err(invalid("catalog.user_agent", "must not be empty"));
    }
    Ok(())
}

fn validate_policy(config: &Config) -> ConfigResult<()> {
    let p = &config.policy;

    if p.max_package_bytes == 0 {
        return Err(invalid("policy.max_package_bytes", "must be at least 1"));
    }
    if p.max_file_count == 0 {
        return Err(invalid("policy.max_file_count", "must be at least 1"));
    }
    if p.max_manifest_bytes == 0 {
        return Err(invalid("policy.max_manifest_bytes", "must be at least 1"));
    }
    if !p.csp_template.contains("'self'") {
        return Err(invalid(
            "policy.csp_template",
            "must contain 'self' so the package origin can be substituted",
        ));
    }

    // A capability may appear in exactly one list.
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for (list, names) in [
        ("allowed", &p.allowed),
        ("escalation", &p.escalation),
        ("blocked", &p.blocked),
    ] {
        for name in names {
            if name.trim().is_empty() {
                return Err(invalid(
                    &format!("policy.{list}"),
                    "capability names must not be empty",
                ));
            }
            if let Some(previous) = seen.insert(name.as_str(), list) {
                if previous != list {
                    return Err(invalid(
                        &format!("policy.{list}"),
                        format!("'{name}' is also listed in policy.{previous}"),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn validate_extract(config: &Config) -> ConfigResult<()> {
    if config.extract.max_entries == 0 {
        return Err(invalid("extract.max_entries", "must be at least 1"));
    }
    if config.extract.max_total_bytes == 0 {
        return Err(invalid("extract.max_total_bytes", "must be at least 1"));
    }
    Ok(())
}

fn validate_broker(config: &Config) -> ConfigResult<()> {
    if config.broker.request_ttl_secs == 0 {
        return Err(invalid("broker.request_ttl_secs", "must be at least 1"));
    }
    if config.broker.sweep_interval_secs == 0 {
        return Err(invalid("broker.sweep_interval_secs", "must be at least 1"));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if !LOG_LEVELS.contains(&l.level.to_ascii_lowercase().as_str()) {
        return Err(invalid(
            "logging.level",
            format!("unknown level '{}'; expected one of {}", l.level, LOG_LEVELS.join(", ")),
        ));
    }
    if !LOG_FORMATS.contains(&l.format.to_ascii_lowercase().as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unknown format '{}'; expected one of {}",
                l.format,
                LOG_FORMATS.join(", ")
            ),
        ));
    }
    if !LOG_TARGETS.contains(&l.target.to_ascii_lowercase().as_str()) {
        return Err(invalid(
            "logging.target",
            format!(
                "unknown target '{}'; expected one of {}",
                l.target,
                LOG_TARGETS.join(", ")
            ),
        ));
    }
    Ok(())
}
