//! Marshaller configuration
//!
//! Loaded from TOML, with environment overrides applied on top:
//!
//! ```toml
//! [filenames]
//! encoding = "latin-1"
//!
//! [callbacks]
//! zero_result_on_error = true
//! pending_free_warn = 64
//!
//! [transfer]
//! warn_on_suspicious = true
//! ```

use crate::error::{ErrorKind, MarshalError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Environment variable overriding the filesystem encoding
pub const FILENAME_ENCODING_ENV: &str = "TYPTHON_FILENAME_ENCODING";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarshalConfig {
    #[serde(default)]
    pub filenames: FilenameConfig,

    #[serde(default)]
    pub callbacks: CallbackConfig,

    #[serde(default)]
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilenameConfig {
    #[serde(default)]
    pub encoding: FilenameEncoding,
}

/// Platform filesystem encoding used by the filename tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilenameEncoding {
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "latin-1")]
    Latin1,
}

impl FilenameEncoding {
    /// Parse an encoding name the way `G_FILENAME_ENCODING` is spelled
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Self::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Some(Self::Latin1),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Zero the native result slot when the host callable fails
    #[serde(default = "default_true")]
    pub zero_result_on_error: bool,

    /// Warn once the pending-free set grows past this many trampolines
    #[serde(default = "default_pending_free_warn")]
    pub pending_free_warn: usize,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            zero_result_on_error: true,
            pending_free_warn: default_pending_free_warn(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Log transfer modes that are accepted but probably wrong
    #[serde(default = "default_true")]
    pub warn_on_suspicious: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self { warn_on_suspicious: true }
    }
}

fn default_true() -> bool {
    true
}

fn default_pending_free_warn() -> usize {
    64
}

impl MarshalConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MarshalError::new(ErrorKind::Config(format!("Failed to read config: {}", e)))
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            MarshalError::new(ErrorKind::Config(format!("Failed to parse config: {}", e)))
        })
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply environment overrides in place
    pub fn apply_env(&mut self) {
        if let Ok(name) = std::env::var(FILENAME_ENCODING_ENV) {
            match FilenameEncoding::from_name(&name) {
                Some(encoding) => self.filenames.encoding = encoding,
                None => tracing::warn!(
                    event = "config_ignored",
                    variable = FILENAME_ENCODING_ENV,
                    value = %name,
                    "unknown filename encoding"
                ),
            }
        }
    }

    /// Serialize back to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            MarshalError::new(ErrorKind::Config(format!("Failed to serialize config: {}", e)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = MarshalConfig::default();
        assert_eq!(config.filenames.encoding, FilenameEncoding::Utf8);
        assert!(config.callbacks.zero_result_on_error);
        assert_eq!(config.callbacks.pending_free_warn, 64);
        assert!(config.transfer.warn_on_suspicious);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[filenames]
encoding = "latin-1"

[callbacks]
zero_result_on_error = false
"#;

        let config = MarshalConfig::parse(toml).unwrap();
        assert_eq!(config.filenames.encoding, FilenameEncoding::Latin1);
        assert!(!config.callbacks.zero_result_on_error);
        assert_eq!(config.callbacks.pending_free_warn, 64);
    }

    #[test]
    fn test_parse_rejects_unknown_encoding() {
        let err = MarshalConfig::parse("[filenames]\nencoding = \"ebcdic\"\n").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[transfer]\nwarn_on_suspicious = false").unwrap();

        let config = MarshalConfig::load(file.path()).unwrap();
        assert!(!config.transfer.warn_on_suspicious);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = MarshalConfig::default();
        config.filenames.encoding = FilenameEncoding::Latin1;
        let text = config.to_toml().unwrap();
        assert_eq!(MarshalConfig::parse(&text).unwrap(), config);
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!(FilenameEncoding::from_name("UTF-8"), Some(FilenameEncoding::Utf8));
        assert_eq!(FilenameEncoding::from_name("ISO-8859-1"), Some(FilenameEncoding::Latin1));
        assert_eq!(FilenameEncoding::from_name("koi8-r"), None);
    }
}
