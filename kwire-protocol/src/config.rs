//! Codec configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via KWIRE_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default upper bound on a single frame (100 MiB, the broker's default
/// `socket.request.max.bytes`).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// What the decoder does with tagged fields it has no name for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownTagPolicy {
    /// Keep the raw payloads so a re-encode emits them verbatim.
    #[default]
    Preserve,
    /// Skip over them.
    Discard,
}

impl std::str::FromStr for UnknownTagPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "preserve" => Ok(UnknownTagPolicy::Preserve),
            "discard" => Ok(UnknownTagPolicy::Discard),
            other => Err(ConfigError::ValidationError(format!(
                "unknown tag policy '{}' (expected 'preserve' or 'discard')",
                other
            ))),
        }
    }
}

/// Decoder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Largest frame, in bytes after the length prefix, the reader accepts.
    pub max_frame_size: usize,
    /// Handling of unrecognized tagged fields in flexible versions.
    pub unknown_tags: UnknownTagPolicy,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            unknown_tags: UnknownTagPolicy::Preserve,
        }
    }
}

impl CodecConfig {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("KWIRE_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: CodecConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Sets the maximum accepted frame size.
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Sets the unknown tagged field policy.
    pub fn with_unknown_tags(mut self, policy: UnknownTagPolicy) -> Self {
        self.unknown_tags = policy;
        self
    }

    /// Checks value constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frame_size == 0 || self.max_frame_size > i32::MAX as usize {
            return Err(ConfigError::ValidationError(format!(
                "max_frame_size must be between 1 and {}, got {}",
                i32::MAX,
                self.max_frame_size
            )));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(size) = std::env::var("KWIRE_MAX_FRAME_SIZE") {
            if let Ok(n) = size.parse() {
                self.max_frame_size = n;
            }
        }

        if let Ok(policy) = std::env::var("KWIRE_UNKNOWN_TAGS") {
            match policy.parse() {
                Ok(parsed) => self.unknown_tags = parsed,
                Err(e) => tracing::warn!("ignoring KWIRE_UNKNOWN_TAGS: {}", e),
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "invalid configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(_, e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CodecConfig::default();
        assert_eq!(config.max_frame_size, 100 * 1024 * 1024);
        assert_eq!(config.unknown_tags, UnknownTagPolicy::Preserve);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = CodecConfig::default()
            .with_max_frame_size(4096)
            .with_unknown_tags(UnknownTagPolicy::Discard);
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("discard"));
        let parsed: CodecConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let parsed: CodecConfig = serde_yaml::from_str("unknown_tags: discard\n").unwrap();
        assert_eq!(parsed.unknown_tags, UnknownTagPolicy::Discard);
        assert_eq!(parsed.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kwire.yaml");

        let config = CodecConfig::default().with_max_frame_size(1 << 20);
        config.save(&path).unwrap();

        let loaded = CodecConfig::from_file(&path).unwrap();
        assert_eq!(loaded.max_frame_size, 1 << 20);
    }

    #[test]
    fn test_missing_file() {
        let err = CodecConfig::from_file("/nonexistent/kwire.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_, _)));
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn test_invalid_frame_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kwire.yaml");
        std::fs::write(&path, "max_frame_size: 0\n").unwrap();

        let err = CodecConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "PRESERVE".parse::<UnknownTagPolicy>().unwrap(),
            UnknownTagPolicy::Preserve
        );
        assert_eq!(
            "discard".parse::<UnknownTagPolicy>().unwrap(),
            UnknownTagPolicy::Discard
        );
        assert!("drop".parse::<UnknownTagPolicy>().is_err());
    }
}
