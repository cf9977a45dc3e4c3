use std::path::Path;

use gauntlet::config::{Config, ConfigError, EXAMPLE_CONFIG, Language};

use super::FIXTURES_PATH;

fn config_path(name: &str) -> String {
    format!("{FIXTURES_PATH}/configs/{name}")
}

#[test]
fn test_load_valid_config() {
    let config = Config::from_file(config_path("valid_full.toml")).expect("Failed to load config");

    assert_eq!(config.work_root(), Path::new("/tmp/gauntlet-tests"));
    assert_eq!(config.timeout_ms, 1500);
    assert_eq!(config.compile_timeout_ms, 20000);
    assert_eq!(config.parallelism(), 3);

    let cpp = config.toolchain(Language::Cpp).expect("cpp not found");
    assert_eq!(cpp.compiler(), "g++");
    assert_eq!(cpp.compiler_flags, ["-std=c++17", "-O2"]);
    assert!(cpp.transclude_enabled);
    assert!(cpp.template_text.contains("{{solution}}"));

    let python = config.toolchain(Language::Python).expect("python not found");
    assert_eq!(python.interpreter_args, ["-u"]);

    let java = config.toolchain(Language::Java).expect("java not found");
    assert_eq!(java.compiler(), "javac");
    assert_eq!(java.interpreter(), "java");
}

#[test]
fn test_load_minimal_config() {
    let config =
        Config::from_file(config_path("valid_minimal.toml")).expect("Failed to load config");

    assert_eq!(config.timeout_ms, 2000);
    assert_eq!(config.compile_timeout_ms, 30000);
    assert!(config.toolchain(Language::Python).is_ok());
    assert!(matches!(
        config.toolchain(Language::Cpp),
        Err(ConfigError::ToolchainNotFound(Language::Cpp))
    ));
}

#[test]
fn test_load_invalid_duplicate_language() {
    let result = Config::from_file(config_path("invalid_duplicate_language.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_zero_timeout() {
    let result = Config::from_file(config_path("invalid_zero_timeout.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_empty_compiler() {
    let result = Config::from_file(config_path("invalid_empty_compiler.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_unknown_language() {
    let result = Config::from_file(config_path("invalid_unknown_language.toml"));
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_load_missing_file() {
    let result = Config::from_file(config_path("does_not_exist.toml"));
    assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
}

#[test]
fn test_example_config_matches_default() {
    let parsed = Config::parse_toml(EXAMPLE_CONFIG).expect("Example config should parse");
    let default = Config::default();

    assert_eq!(parsed.timeout_ms, default.timeout_ms);
    assert_eq!(parsed.toolchains.len(), Language::ALL.len());
    for language in Language::ALL {
        assert!(default.toolchain(language).is_ok());
    }
}
