//! Configuration file loading for Gauntlet
//!
//! Handles loading and parsing configuration files using the config crate.

use std::collections::HashSet;
use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};

use crate::config::{Config, ConfigError, Language};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::ReadFile {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }

        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be positive".into()));
        }
        if self.compile_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "compile_timeout_ms must be positive".into(),
            ));
        }

        let mut seen = HashSet::new();
        for toolchain in &self.toolchains {
            let language = toolchain.language;
            if !seen.insert(language) {
                return Err(ConfigError::Invalid(format!(
                    "toolchain for '{language}' is configured more than once"
                )));
            }
            if toolchain
                .compiler_path
                .as_deref()
                .is_some_and(|p| p.trim().is_empty())
            {
                return Err(ConfigError::Invalid(format!(
                    "toolchain '{language}' has empty compiler_path"
                )));
            }
            if toolchain
                .interpreter_path
                .as_deref()
                .is_some_and(|p| p.trim().is_empty())
            {
                return Err(ConfigError::Invalid(format!(
                    "toolchain '{language}' has empty interpreter_path"
                )));
            }
            if language == Language::Cpp && !toolchain.interpreter_args.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "toolchain '{language}' runs native binaries and takes no interpreter_args"
                )));
            }
        }

        Ok(())
    }
}
