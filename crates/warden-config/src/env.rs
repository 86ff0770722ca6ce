//! Environment variable fallbacks.
//!
//! A variable only applies when no config file set the same field, so files
//! always win over the environment. Defaults lose to both.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

/// `(variable, dotted field path)` pairs.
const ENV_FALLBACKS: &[(&str, &str)] = &[
    ("WARDEN_LOG_LEVEL", "logging.level"),
    ("WARDEN_LOG_FORMAT", "logging.format"),
    ("WARDEN_LOG_TARGET", "logging.target"),
    ("WARDEN_CATALOG_USER_AGENT", "catalog.user_agent"),
];

/// Snapshot the `WARDEN_*` variables of the current process.
pub(crate) fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("WARDEN_"))
        .collect()
}

/// Apply fallbacks to `merged` for fields not in `set_by_files`.
///
/// Returns the number of fields written.
pub(crate) fn apply_env_fallbacks(
    merged: &mut toml::Value,
    set_by_files: &BTreeSet<String>,
    env_vars: &HashMap<String, String>,
) -> usize {
    let mut applied = 0usize;
    for (var, path) in ENV_FALLBACKS {
        if set_by_files.contains(*path) {
            continue;
        }
        let Some(value) = env_vars.get(*var) else {
            continue;
        };
        if set_path(merged, path, toml::Value::String(value.clone())) {
            debug!(var, field = path, "applied environment fallback");
            applied = applied.saturating_add(1);
        }
    }
    applied
}

fn set_path(root: &mut toml::Value, dotted: &str, value: toml::Value) -> bool {
    let mut segments: Vec<&str> = dotted.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return false;
    };
    let mut cursor = root;
    for segment in segments {
        let Some(table) = cursor.as_table_mut() else {
            return false;
        };
        cursor = table
            .entry(segment)
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
    match cursor.as_table_mut() {
        Some(table) => {
            table.insert(leaf.to_owned(), value);
            true
        },
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_applies_when_files_are_silent() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"info\"").unwrap();
        let env = HashMap::from([("WARDEN_LOG_LEVEL".to_owned(), "debug".to_owned())]);

        let n = apply_env_fallbacks(&mut merged, &BTreeSet::new(), &env);
        assert_eq!(n, 1);
        assert_eq!(merged["logging"]["level"].as_str(), Some("debug"));
    }

    #[test]
    fn files_win_over_env() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"warn\"").unwrap();
        let env = HashMap::from([("WARDEN_LOG_LEVEL".to_owned(), "debug".to_owned())]);
        let set = BTreeSet::from(["logging.level".to_owned()]);

        assert_eq!(apply_env_fallbacks(&mut merged, &set, &env), 0);
        assert_eq!(merged["logging"]["level"].as_str(), Some("warn"));
    }

    #[test]
    fn creates_missing_tables() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let env = HashMap::from([(
            "WARDEN_CATALOG_USER_AGENT".to_owned(),
            "test-agent".to_owned(),
        )]);
        apply_env_fallbacks(&mut merged, &BTreeSet::new(), &env);
        assert_eq!(merged["catalog"]["user_agent"].as_str(), Some("test-agent"));
    }
}
