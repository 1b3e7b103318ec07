use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0} (fix: pass --config <path>, set FLEETOPS_CONFIG, or remove the override to use defaults)")]
    NotFound(PathBuf),
    #[error("failed to read config: {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid app entry: {message}")]
    InvalidApp { message: String },
    #[error("duplicate app name: {name}")]
    DuplicateApp { name: String },
    #[error("invalid {field} regex {pattern:?}: {message}")]
    InvalidPattern {
        field: String,
        pattern: String,
        message: String,
    },
    #[error("invalid cleanup exclude glob {pattern:?}: {message}")]
    InvalidGlob { pattern: String, message: String },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "config.not_found",
            ConfigError::Read { .. } => "config.read_failed",
            ConfigError::Parse { .. } => "config.parse_failed",
            ConfigError::InvalidApp { .. } => "config.invalid_app",
            ConfigError::DuplicateApp { .. } => "config.duplicate_app",
            ConfigError::InvalidPattern { .. } => "config.invalid_pattern",
            ConfigError::InvalidGlob { .. } => "config.invalid_glob",
        }
    }
}
