//! Compiler configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! formats = ["isolated", "embedded"]
//! component_suffix = "Field"
//! module_extension = "hbs"
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::format::Format;

/// Errors that can occur when loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("config lists no formats to compile")]
    NoFormats,
}

/// Options controlling what a compile produces
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Formats compiled for every card, in order
    pub formats: Vec<Format>,

    /// Suffix of generated component import names (`DateField`)
    pub component_suffix: String,

    /// Extension of emitted format modules (`embedded.hbs`)
    pub module_extension: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            formats: Format::ALL.to_vec(),
            component_suffix: "Field".to_string(),
            module_extension: "hbs".to_string(),
        }
    }
}

impl CompilerConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict compilation to the given formats
    pub fn with_formats(mut self, formats: impl IntoIterator<Item = Format>) -> Self {
        self.formats = formats.into_iter().collect();
        self
    }

    /// Set the suffix of generated component names
    pub fn with_component_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.component_suffix = suffix.into();
        self
    }

    /// Set the extension of emitted format modules
    pub fn with_module_extension(mut self, extension: impl Into<String>) -> Self {
        self.module_extension = extension.into();
        self
    }

    /// Local module name of a format's template module
    pub fn format_module(&self, format: Format) -> String {
        format!("{}.{}", format, self.module_extension)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: CompilerConfig = toml::from_str(content)?;
        if config.formats.is_empty() {
            return Err(ConfigError::NoFormats);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert_eq!(config.formats, Format::ALL.to_vec());
        assert_eq!(config.component_suffix, "Field");
        assert_eq!(config.format_module(Format::Embedded), "embedded.hbs");
    }

    #[test]
    fn test_builder_methods() {
        let config = CompilerConfig::new()
            .with_formats([Format::Embedded])
            .with_component_suffix("View")
            .with_module_extension("gjs");
        assert_eq!(config.formats, vec![Format::Embedded]);
        assert_eq!(config.component_suffix, "View");
        assert_eq!(config.format_module(Format::Embedded), "embedded.gjs");
    }

    #[test]
    fn test_from_str_partial() {
        let config = CompilerConfig::from_str(r#"formats = ["isolated", "edit"]"#)
            .expect("Should parse");
        assert_eq!(config.formats, vec![Format::Isolated, Format::Edit]);
        assert_eq!(config.module_extension, "hbs");
    }

    #[test]
    fn test_from_str_unknown_format() {
        let result = CompilerConfig::from_str(r#"formats = ["thumbnail"]"#);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_from_str_empty_formats() {
        let result = CompilerConfig::from_str("formats = []");
        assert!(matches!(result, Err(ConfigError::NoFormats)));
    }
}
