//! Integration tests for gauntlet
//!
//! Most tests drive the engine with `sh` scripts standing in for compilers
//! and interpreters, so they run anywhere with a POSIX shell.
//!
//! Tests that need real g++, python3 and a JDK are behind a feature:
//!    cargo test -p gauntlet --features integration-tests

use std::fs;
use std::path::Path;

use gauntlet::config::{Config, Language, ToolchainConfig};
use gauntlet::runner::ProgramSource;
use tempfile::TempDir;

mod batches;
mod cleanup;
mod config_loading;
mod scenarios;
mod stress;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
#[cfg_attr(not(feature = "integration-tests"), allow(dead_code))]
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Config with no toolchains whose directories live under `work_root`
pub(crate) fn test_config(work_root: &Path) -> Config {
    let mut config = Config::empty();
    config.work_root = Some(work_root.to_path_buf());
    config.max_parallel = Some(4);
    config
}

pub(crate) fn scratch() -> TempDir {
    TempDir::new().expect("Failed to create scratch directory")
}

/// A script run by `sh` through the interpreted-language recipe
pub(crate) fn shell(script: &str) -> ProgramSource {
    ProgramSource::new(
        ToolchainConfig::new(Language::Python).with_interpreter("sh", &[]),
        script,
    )
}

/// A shell script "compiled" by copying it into place as the binary
pub(crate) fn compiled_shell(script: &str) -> ProgramSource {
    ProgramSource::new(
        ToolchainConfig::new(Language::Cpp)
            .with_compiler("sh", &["-c", "cp \"$0\" \"$2\" && chmod +x \"$2\""]),
        format!("#!/bin/sh\n{script}\n"),
    )
}

/// A C++ toolchain whose compiler always rejects the source
pub(crate) fn broken_compiler(message: &str) -> ProgramSource {
    let script = format!("echo '{message}' >&2; exit 1");
    ProgramSource::new(
        ToolchainConfig::new(Language::Cpp).with_compiler("sh", &["-c", &script]),
        "int main() { return 0 }",
    )
}

/// Entries left directly under a work root
pub(crate) fn leftovers(work_root: &Path) -> usize {
    fs::read_dir(work_root)
        .expect("Failed to read work root")
        .count()
}
