//! Bridge from `warden_config::Config` to domain types.
//!
//! The config crate depends on no other internal crate; every conversion
//! into pipeline types happens here, once.

use std::io::IsTerminal;
use std::time::Duration;

use warden_catalog::CatalogSettings;
use warden_config::Config;
use warden_core::dirs::WardenHome;
use warden_installer::ExtractLimits;
use warden_policy::{ResourceLimits, SecurityPolicy};
use warden_registry::BrokerSettings;
use warden_telemetry::{LogConfig, LogFormat, LogTarget};

/// Convert config to [`SecurityPolicy`].
#[must_use]
pub(crate) fn to_security_policy(cfg: &Config) -> SecurityPolicy {
    let policy = &cfg.policy;
    SecurityPolicy::new(
        policy.allowed.iter().cloned(),
        policy.escalation.iter().cloned(),
        policy.blocked.iter().cloned(),
    )
    .with_limits(ResourceLimits {
        max_package_bytes: policy.max_package_bytes,
        max_file_count: policy.max_file_count,
        max_manifest_bytes: policy.max_manifest_bytes,
    })
    .with_csp_template(&policy.csp_template)
    .with_suspicious_extensions(policy.suspicious_extensions.iter().cloned())
}

/// Convert config to [`CatalogSettings`].
///
/// The download ceiling is shared with the policy's package ceiling.
#[must_use]
pub(crate) fn to_catalog_settings(cfg: &Config) -> CatalogSettings {
    let catalog = &cfg.catalog;
    CatalogSettings {
        detail_base_url: catalog.detail_base_url.clone(),
        download_base_url: catalog.download_base_url.clone(),
        os: catalog.os.clone(),
        arch: catalog.arch.clone(),
        os_arch: catalog.os_arch.clone(),
        nacl_arch: catalog.nacl_arch.clone(),
        prod_version: catalog.prod_version.clone(),
        lang: catalog.lang.clone(),
        user_agent: catalog.user_agent.clone(),
        metadata_timeout: Duration::from_secs(catalog.metadata_timeout_secs),
        download_timeout: Duration::from_secs(catalog.download_timeout_secs),
        max_redirects: catalog.max_redirects,
        max_package_bytes: cfg.policy.max_package_bytes,
    }
}

/// Convert config to [`BrokerSettings`].
#[must_use]
pub(crate) fn to_broker_settings(cfg: &Config) -> BrokerSettings {
    BrokerSettings {
        request_ttl: Duration::from_secs(cfg.broker.request_ttl_secs),
        sweep_interval: Duration::from_secs(cfg.broker.sweep_interval_secs),
    }
}

/// Convert config to [`ExtractLimits`].
#[must_use]
pub(crate) fn to_extract_limits(cfg: &Config) -> ExtractLimits {
    ExtractLimits {
        max_entries: cfg.extract.max_entries,
        max_total_bytes: cfg.extract.max_total_bytes,
    }
}

/// Convert config to [`LogConfig`]. File logs go to `{home}/logs/`.
#[must_use]
pub(crate) fn to_log_config(cfg: &Config, home: &WardenHome) -> LogConfig {
    let format = cfg.logging.format.parse().unwrap_or(LogFormat::Compact);
    let (target, ansi) = match cfg.logging.target.to_ascii_lowercase().as_str() {
        "file" => (LogTarget::File(home.logs_dir()), false),
        "stdout" => (LogTarget::Stdout, std::io::stdout().is_terminal()),
        _ => (LogTarget::Stderr, std::io::stderr().is_terminal()),
    };
    let mut log_config = LogConfig::new(&cfg.logging.level)
        .with_format(format)
        .with_target(target)
        .with_ansi(ansi);
    for directive in &cfg.logging.directives {
        log_config = log_config.with_directive(directive);
    }
    log_config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_domain_defaults() {
        let cfg = Config::default();
        let policy = to_security_policy(&cfg);
        assert_eq!(policy.limits(), SecurityPolicy::default().limits());
        assert!(policy.requires_escalation("webRequest"));
        assert!(policy.is_suspicious_extension("EXE"));

        let settings = to_catalog_settings(&cfg);
        assert_eq!(settings.download_timeout, Duration::from_secs(30));
        assert_eq!(settings.max_package_bytes, 52_428_800);

        assert_eq!(to_broker_settings(&cfg), BrokerSettings::default());
    }

    #[test]
    fn log_config_carries_directives() {
        let mut cfg = Config::default();
        cfg.logging.format = "json".into();
        cfg.logging.directives = vec!["warden_catalog=trace".into()];
        let log = to_log_config(&cfg, &WardenHome::from_path("/tmp/w"));
        assert_eq!(log.format, LogFormat::Json);
        assert_eq!(log.target, LogTarget::Stderr);
        assert_eq!(log.directives, vec!["warden_catalog=trace"]);
    }

    #[test]
    fn file_target_writes_under_the_home_without_colors() {
        let mut cfg = Config::default();
        cfg.logging.target = "file".into();
        let home = WardenHome::from_path("/tmp/w");
        let log = to_log_config(&cfg, &home);
        assert_eq!(log.target, LogTarget::File(home.logs_dir()));
        assert!(!log.ansi);

        cfg.logging.target = "stdout".into();
        assert_eq!(to_log_config(&cfg, &home).target, LogTarget::Stdout);
    }

    #[test]
    fn extract_limits_follow_config() {
        let mut cfg = Config::default();
        assert_eq!(to_extract_limits(&cfg), ExtractLimits::default());
        cfg.extract.max_entries = 5;
        cfg.extract.max_total_bytes = 1024;
        let limits = to_extract_limits(&cfg);
        assert_eq!(limits.max_entries, 5);
        assert_eq!(limits.max_total_bytes, 1024);
    }
}
