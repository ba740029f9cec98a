// src/config.rs

//! Configuration loading utilities.
//!
//! A missing file means defaults; a file that exists but does not parse or
//! validate is an error. A few deployment-specific values can be overridden
//! from the environment:
//!
//! | Variable                | Field                 |
//! |-------------------------|-----------------------|
//! | `INGESTOR_DATABASE_URL` | `database.url`        |
//! | `INGESTOR_RECORDS_DIR`  | `storage.records_dir` |
//! | `INGESTOR_LOG_LEVEL`    | `logging.level`       |

use std::path::Path;

use crate::error::Result;
use crate::models::Config;

pub const ENV_DATABASE_URL: &str = "INGESTOR_DATABASE_URL";
pub const ENV_RECORDS_DIR: &str = "INGESTOR_RECORDS_DIR";
pub const ENV_LOG_LEVEL: &str = "INGESTOR_LOG_LEVEL";

/// Load, override from the environment, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        Config::load(path)?
    } else {
        log::warn!("Config file {:?} not found. Using defaults.", path);
        Config::default()
    };
    apply_overrides(&mut config, |name| std::env::var(name).ok());
    config.validate()?;
    Ok(config)
}

/// Apply overrides from `lookup`; empty values are ignored.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(url) = get(ENV_DATABASE_URL) {
        config.database.url = url;
    }
    if let Some(dir) = get(ENV_RECORDS_DIR) {
        config.storage.records_dir = dir;
    }
    if let Some(level) = get(ENV_LOG_LEVEL) {
        config.logging.level = level;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.passes.len(), 2);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ingestor.toml");
        std::fs::write(&path, "[ingest]\nmax_new_per_run = 0\n").unwrap();
        assert!(load_config(&path).is_err());

        std::fs::write(&path, "not = [valid").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_DATABASE_URL, "sqlite://other.db"),
            (ENV_RECORDS_DIR, "  "),
        ]);
        let mut config = Config::default();
        apply_overrides(&mut config, |name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.database.url, "sqlite://other.db");
        assert_eq!(config.storage.records_dir, "records");
        assert_eq!(config.logging.level, "info");
    }
}
