//! CLI configuration from environment variables

use std::env;
use std::path::PathBuf;

use record_store::MAX_INSTANCES;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {name} = {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Clone, Debug)]
pub struct CliConfig {
    /// SQLite file holding the record tables
    pub db_path: PathBuf,

    /// Game instance (selects the record table)
    pub instance: usize,

    /// Create the file and table when missing instead of failing
    pub create: bool,
}

impl CliConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = lookup("CHESS_HISTORY_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("chess-history.db"));

        let instance = match lookup("CHESS_HISTORY_INSTANCE") {
            None => 0,
            Some(value) => match value.trim().parse::<usize>() {
                Ok(n) if n < MAX_INSTANCES => n,
                Ok(_) => {
                    return Err(ConfigError::Invalid {
                        name: "CHESS_HISTORY_INSTANCE",
                        value,
                        reason: "instance out of range",
                    })
                }
                Err(_) => {
                    return Err(ConfigError::Invalid {
                        name: "CHESS_HISTORY_INSTANCE",
                        value,
                        reason: "not a number",
                    })
                }
            },
        };

        let create = match lookup("CHESS_HISTORY_CREATE") {
            None => true,
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "CHESS_HISTORY_CREATE",
                        value,
                        reason: "expected true or false",
                    })
                }
            },
        };

        Ok(Self {
            db_path,
            instance,
            create,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<CliConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CliConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("chess-history.db"));
        assert_eq!(config.instance, 0);
        assert!(config.create);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("CHESS_HISTORY_DB", "/tmp/games.db"),
            ("CHESS_HISTORY_INSTANCE", "1"),
            ("CHESS_HISTORY_CREATE", "false"),
        ])
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/games.db"));
        assert_eq!(config.instance, 1);
        assert!(!config.create);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(load(&[("CHESS_HISTORY_INSTANCE", "2")]).is_err());
        assert!(load(&[("CHESS_HISTORY_INSTANCE", "two")]).is_err());
        assert!(load(&[("CHESS_HISTORY_CREATE", "maybe")]).is_err());
    }
}
