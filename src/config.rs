//! Configuration management for tristripe

use crate::error::{Error, Result};
use crate::raid::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `raid.block_size`
pub const ENV_BLOCK_SIZE: &str = "TRISTRIPE_BLOCK_SIZE";

/// Environment variable overriding `storage.member_dir`
pub const ENV_MEMBER_DIR: &str = "TRISTRIPE_MEMBER_DIR";

/// Environment variable overriding `encryption.enabled`
pub const ENV_ENCRYPTION: &str = "TRISTRIPE_ENCRYPTION";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Striping settings
    #[serde(default)]
    pub raid: RaidConfig,

    /// Encryption settings
    #[serde(default)]
    pub encryption: EncryptionConfig,

    /// Where member sets live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Striping configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaidConfig {
    /// Striping unit in bytes; split and merge of a set must agree on it
    pub block_size: usize,
}

impl Default for RaidConfig {
    fn default() -> Self {
        RaidConfig {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Encryption configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Encrypt data before striping when a key is supplied
    pub enabled: bool,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        EncryptionConfig { enabled: true }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding member and metadata files
    pub member_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            member_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tristripe")
                .join("members"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file (YAML or JSON), with environment variable
    /// substitution and overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref).map_err(|e| {
            Error::Config(format!("Failed to read config file: {}", e))
        })?;

        let mut config = Self::parse(&Self::substitute_env_vars(&content)?, is_yaml(path_ref))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(path) if path.as_ref().exists() => Self::load(path),
            _ => Self::from_env(),
        }
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str, yaml: bool) -> Result<Self> {
        if yaml {
            serde_yaml::from_str(content)
                .map_err(|e| Error::Config(format!("Failed to parse YAML config: {}", e)))
        } else {
            serde_json::from_str(content)
                .map_err(|e| Error::Config(format!("Failed to parse JSON config: {}", e)))
        }
    }

    /// Substitute environment variables in config content
    /// Supports ${VAR_NAME} syntax; unset variables are left as written
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| Error::Config(format!("Invalid substitution pattern: {}", e)))?;

        let result = re.replace_all(content, |cap: &Captures| {
            std::env::var(&cap[1]).unwrap_or_else(|_| cap[0].to_string())
        });
        Ok(result.into_owned())
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(block_size) = lookup(ENV_BLOCK_SIZE) {
            if let Ok(size) = block_size.trim().parse::<usize>() {
                self.raid.block_size = size;
            }
        }

        if let Some(dir) = lookup(ENV_MEMBER_DIR) {
            let dir = dir.trim();
            if !dir.is_empty() {
                self.storage.member_dir = PathBuf::from(dir);
            }
        }

        if let Some(enabled) = lookup(ENV_ENCRYPTION) {
            match enabled.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.encryption.enabled = true,
                "0" | "false" | "no" | "off" => self.encryption.enabled = false,
                _ => {}
            }
        }
    }

    /// Save configuration to a file (format determined by extension)
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        let content = if is_yaml(path_ref) {
            serde_yaml::to_string(self).map_err(|e| {
                Error::Config(format!("Failed to serialize config to YAML: {}", e))
            })?
        } else {
            serde_json::to_string_pretty(self).map_err(|e| {
                Error::Config(format!("Failed to serialize config to JSON: {}", e))
            })?
        };

        std::fs::write(path_ref, content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.raid.block_size == 0 {
            return Err(Error::InvalidConfig(
                "Block size must be greater than 0".to_string(),
            ));
        }

        if self.raid.block_size > MAX_BLOCK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "Block size must not exceed {} bytes",
                MAX_BLOCK_SIZE
            )));
        }

        if self.storage.member_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "Member directory must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Ensure the member directory exists
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.storage.member_dir)?;
        Ok(())
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.raid.block_size, DEFAULT_BLOCK_SIZE);
        assert!(config.encryption.enabled);
        assert_eq!(config.logging.level, "info");
        assert!(config.storage.member_dir.ends_with("members"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_block_size() {
        let mut config = Config::default();
        config.raid.block_size = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        config.raid.block_size = MAX_BLOCK_SIZE + 1;
        assert!(config.validate().is_err());

        config.raid.block_size = MAX_BLOCK_SIZE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::parse(r#"{"raid": {"block_size": 512}}"#, false).unwrap();
        assert_eq!(config.raid.block_size, 512);
        assert!(config.encryption.enabled);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = "raid:\n  block_size: 4096\nencryption:\n  enabled: false\n";
        let config = Config::parse(yaml, true).unwrap();
        assert_eq!(config.raid.block_size, 4096);
        assert!(!config.encryption.enabled);
    }

    #[test]
    fn test_save_and_load_both_formats() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.raid.block_size = 2048;
        config.storage.member_dir = dir.path().join("sets");
        config.logging.level = "debug".to_string();

        for name in ["config.json", "config.yaml"] {
            let path = dir.path().join(name);
            config.save(&path).unwrap();
            let content = std::fs::read_to_string(&path).unwrap();
            assert!(content.contains("2048"));

            let parsed = Config::parse(&content, is_yaml(&path)).unwrap();
            assert_eq!(parsed, config);
        }
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.code(), crate::error::code::CONFIG_ERROR);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_env_substitution() {
        std::env::set_var("TRISTRIPE_SUBST_TEST_DIR", "/srv/sets");
        let content = r#"{"storage": {"member_dir": "${TRISTRIPE_SUBST_TEST_DIR}"}, "x": "${TRISTRIPE_SURELY_UNSET}"}"#;
        let result = Config::substitute_env_vars(content).unwrap();
        assert!(result.contains("/srv/sets"));
        assert!(result.contains("${TRISTRIPE_SURELY_UNSET}"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_BLOCK_SIZE, " 256 "),
            (ENV_MEMBER_DIR, "/var/lib/sets"),
            (ENV_ENCRYPTION, "off"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.raid.block_size, 256);
        assert_eq!(config.storage.member_dir, PathBuf::from("/var/lib/sets"));
        assert!(!config.encryption.enabled);
    }

    #[test]
    fn test_invalid_overrides_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            ENV_BLOCK_SIZE => Some("lots".to_string()),
            ENV_ENCRYPTION => Some("maybe".to_string()),
            ENV_MEMBER_DIR => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config, Config::default());
    }
}
