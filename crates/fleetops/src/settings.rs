use crate::config::{AppSource, FleetConfig};
use globset::Glob;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

mod errors;
pub use errors::ConfigError;

pub const CONFIG_ENV: &str = "FLEETOPS_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/Library/Application Support/fleetops/fleetops.toml";

/// Where the config comes from. An explicit location must exist; the default
/// location silently falls back to built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Default(PathBuf),
}

pub fn resolve_config_source(flag: Option<String>) -> ConfigSource {
    match flag
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .filter(|s| !s.trim().is_empty())
    {
        Some(p) => ConfigSource::Explicit(PathBuf::from(p)),
        None => ConfigSource::Default(PathBuf::from(DEFAULT_CONFIG_PATH)),
    }
}

pub fn load_config(source: &ConfigSource) -> Result<FleetConfig, ConfigError> {
    let path = match source {
        ConfigSource::Explicit(p) => {
            if !p.is_file() {
                return Err(ConfigError::NotFound(p.clone()));
            }
            p
        }
        ConfigSource::Default(p) => {
            if !p.is_file() {
                return Ok(FleetConfig::default());
            }
            p
        }
    };
    load_config_file(path)
}

pub fn load_config_file(path: &Path) -> Result<FleetConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let cfg: FleetConfig = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    validate_config(&cfg)?;
    Ok(cfg)
}

pub fn validate_config(cfg: &FleetConfig) -> Result<(), ConfigError> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for app in &cfg.apps {
        let name = app.name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidApp {
                message: "app name must be non-empty".to_string(),
            });
        }
        if name.contains('/') {
            return Err(ConfigError::InvalidApp {
                message: format!("app name must not contain '/': {name}"),
            });
        }
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(ConfigError::DuplicateApp {
                name: name.to_string(),
            });
        }
        let paths = match &app.source {
            AppSource::Bundle { paths, .. } | AppSource::Command { paths, .. } => paths,
        };
        if paths.iter().all(|p| p.trim().is_empty()) {
            return Err(ConfigError::InvalidApp {
                message: format!("app {name} has no source paths"),
            });
        }
    }

    for (field, patterns) in [
        ("autopkg.noise_patterns", &cfg.autopkg.noise_patterns),
        ("autopkg.error_patterns", &cfg.autopkg.error_patterns),
    ] {
        for p in patterns {
            Regex::new(p).map_err(|e| ConfigError::InvalidPattern {
                field: field.to_string(),
                pattern: p.clone(),
                message: e.to_string(),
            })?;
        }
    }

    for g in &cfg.cleanup.exclude_globs {
        Glob::new(g).map_err(|e| ConfigError::InvalidGlob {
            pattern: g.clone(),
            message: e.to_string(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_default_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = ConfigSource::Default(dir.path().join("absent.toml"));
        let cfg = load_config(&source).expect("defaults");
        assert!(cfg.apps.is_empty());
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = ConfigSource::Explicit(dir.path().join("absent.toml"));
        let err = load_config(&source).expect_err("must fail");
        assert_eq!(err.code(), "config.not_found");
    }

    #[test]
    fn parse_errors_carry_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fleetops.toml");
        fs::write(&path, "[paths\n").expect("write");
        let err = load_config_file(&path).expect_err("must fail");
        assert_eq!(err.code(), "config.parse_failed");
        assert!(err.to_string().contains("fleetops.toml"));
    }

    #[test]
    fn duplicate_apps_rejected_case_insensitively() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fleetops.toml");
        fs::write(
            &path,
            r#"
[[apps]]
name = "Zoom"
source = { kind = "bundle", paths = ["/Applications/zoom.us.app"] }

[[apps]]
name = "zoom"
source = { kind = "bundle", paths = ["/Applications/zoom.us.app"] }
"#,
        )
        .expect("write");
        let err = load_config_file(&path).expect_err("must fail");
        assert_eq!(err.code(), "config.duplicate_app");
    }

    #[test]
    fn invalid_patterns_rejected() {
        let mut cfg = FleetConfig::default();
        cfg.autopkg.error_patterns.push("(unclosed".to_string());
        let err = validate_config(&cfg).expect_err("must fail");
        assert_eq!(err.code(), "config.invalid_pattern");

        let mut cfg = FleetConfig::default();
        cfg.cleanup.exclude_globs.push("a{b".to_string());
        let err = validate_config(&cfg).expect_err("must fail");
        assert_eq!(err.code(), "config.invalid_glob");
    }

    #[test]
    fn explicit_flag_wins_over_default() {
        let source = resolve_config_source(Some("/tmp/x.toml".to_string()));
        assert_eq!(source, ConfigSource::Explicit(PathBuf::from("/tmp/x.toml")));
    }
}
