use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{
    BuildPlan, DEFAULT_ENTRY_POINT, Language, ToolchainConfig, detect_entry_point,
};

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../gauntlet.example.toml");

/// Fixed ceiling for a single compiler invocation
pub const DEFAULT_COMPILE_TIMEOUT_MS: u64 = 30_000;

/// Default per-case wall clock budget
pub const DEFAULT_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("no toolchain configured for language '{0}'")]
    ToolchainNotFound(Language),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Gauntlet
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory under which per-run working directories are created
    /// (the system temp directory if not specified).
    #[serde(default)]
    pub work_root: Option<PathBuf>,

    /// Default wall clock budget per test case in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Ceiling for a compiler invocation in milliseconds.
    #[serde(default = "default_compile_timeout_ms")]
    pub compile_timeout_ms: u64,

    /// Maximum number of concurrently running programs in parallel modes
    /// (available parallelism if not specified).
    #[serde(default)]
    pub max_parallel: Option<usize>,

    /// Toolchain for each language
    #[serde(default)]
    pub toolchains: Vec<ToolchainConfig>,
}

impl Config {
    /// Create a new config with embedded default toolchains
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no toolchains
    pub fn empty() -> Self {
        Self {
            work_root: None,
            timeout_ms: default_timeout_ms(),
            compile_timeout_ms: default_compile_timeout_ms(),
            max_parallel: None,
            toolchains: Vec::new(),
        }
    }

    /// Get the toolchain for a language
    pub fn toolchain(&self, language: Language) -> Result<&ToolchainConfig, ConfigError> {
        self.toolchains
            .iter()
            .find(|toolchain| toolchain.language == language)
            .ok_or(ConfigError::ToolchainNotFound(language))
    }

    /// Get the directory under which working directories are created
    pub fn work_root(&self) -> PathBuf {
        self.work_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Default per-case timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Compiler ceiling
    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }

    /// Number of programs allowed to run at once in parallel modes
    pub fn parallelism(&self) -> usize {
        self.max_parallel
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_compile_timeout_ms() -> u64 {
    DEFAULT_COMPILE_TIMEOUT_MS
}
