use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("server preferences not found: {0} (fix: run `fleetops prefs --url <url> --client-id <id> --client-secret <secret>`)")]
    Missing(PathBuf),
    #[error("failed to read server preferences: {path}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("server preferences are not a dictionary: {0}")]
    NotADictionary(PathBuf),
    #[error("server preferences missing {key}: {path}")]
    MissingKey { path: PathBuf, key: &'static str },
    #[error("failed to write server preferences: {path}: {message}")]
    Write { path: PathBuf, message: String },
}

impl PrefsError {
    pub fn code(&self) -> &'static str {
        match self {
            PrefsError::Missing(_) => "prefs.missing",
            PrefsError::Read { .. } => "prefs.read_failed",
            PrefsError::NotADictionary(_) => "prefs.invalid",
            PrefsError::MissingKey { .. } => "prefs.missing_key",
            PrefsError::Write { .. } => "prefs.write_failed",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid server url {url:?}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },
    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },
    #[error("not authenticated; call authenticate() first")]
    NotAuthenticated,
    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: reqwest::Method,
        url: String,
        status: u16,
        body: String,
    },
    #[error("invalid XML from {url}: {message}")]
    Xml { url: String, message: String },
}

impl ServerError {
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::InvalidUrl { .. } => "server.invalid_url",
            ServerError::Http { .. } => "server.http_failed",
            ServerError::Auth { .. } | ServerError::NotAuthenticated => "server.auth_failed",
            ServerError::Status { .. } => "server.unexpected_status",
            ServerError::Xml { .. } => "server.invalid_xml",
        }
    }
}
