use super::errors::PrefsError;
use crate::api::{ApiError, PrefsOutput};
use std::io::Write;
use std::path::Path;

pub const URL_KEY: &str = "JSS_URL";
pub const CLIENT_ID_KEY: &str = "CLIENT_ID";
pub const CLIENT_SECRET_KEY: &str = "CLIENT_SECRET";

#[derive(Clone, PartialEq, Eq)]
pub struct ServerPrefs {
    pub url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ServerPrefs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerPrefs")
            .field("url", &self.url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PrefsUpdate {
    pub url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl PrefsUpdate {
    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.client_id.is_none() && self.client_secret.is_none()
    }
}

fn normalize_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn read_dictionary(path: &Path) -> Result<plist::Dictionary, PrefsError> {
    let value = plist::Value::from_file(path).map_err(|e| PrefsError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    value
        .into_dictionary()
        .ok_or_else(|| PrefsError::NotADictionary(path.to_path_buf()))
}

fn required(
    dict: &plist::Dictionary,
    path: &Path,
    key: &'static str,
) -> Result<String, PrefsError> {
    dict.get(key)
        .and_then(plist::Value::as_string)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| PrefsError::MissingKey {
            path: path.to_path_buf(),
            key,
        })
}

pub fn read_prefs(path: &Path) -> Result<ServerPrefs, PrefsError> {
    if !path.is_file() {
        return Err(PrefsError::Missing(path.to_path_buf()));
    }
    let dict = read_dictionary(path)?;
    Ok(ServerPrefs {
        url: normalize_url(&required(&dict, path, URL_KEY)?),
        client_id: required(&dict, path, CLIENT_ID_KEY)?,
        client_secret: required(&dict, path, CLIENT_SECRET_KEY)?,
    })
}

/// Merges `update` into the preference file, keeping unrelated keys.
/// Returns the dictionary as written.
pub fn write_prefs(path: &Path, update: &PrefsUpdate) -> Result<plist::Dictionary, PrefsError> {
    let mut dict = if path.is_file() {
        read_dictionary(path)?
    } else {
        plist::Dictionary::new()
    };
    let pairs = [
        (URL_KEY, update.url.as_deref().map(normalize_url)),
        (CLIENT_ID_KEY, update.client_id.as_deref().map(|s| s.trim().to_string())),
        (
            CLIENT_SECRET_KEY,
            update.client_secret.as_deref().map(|s| s.trim().to_string()),
        ),
    ];
    for (key, value) in pairs {
        if let Some(v) = value {
            dict.insert(key.to_string(), plist::Value::String(v));
        }
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PrefsError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    }
    let write_err = |message: String| PrefsError::Write {
        path: path.to_path_buf(),
        message,
    };
    let tmp = path.with_file_name(format!(
        ".{}.tmp",
        path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    ));
    let mut out = std::io::BufWriter::new(open_private(&tmp).map_err(|e| write_err(e.to_string()))?);
    let written = plist::Value::Dictionary(dict.clone())
        .to_writer_xml(&mut out)
        .map_err(|e| write_err(e.to_string()))
        .and_then(|()| out.flush().map_err(|e| write_err(e.to_string())))
        .and_then(|()| std::fs::rename(&tmp, path).map_err(|e| write_err(e.to_string())));
    if written.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    written?;
    Ok(dict)
}

/// The file holds the client secret: owner read/write only.
#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on create; a stale temp file keeps its old bits
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::File::create(path)
}

fn has_value(dict: &plist::Dictionary, key: &str) -> bool {
    dict.get(key)
        .and_then(plist::Value::as_string)
        .is_some_and(|s| !s.trim().is_empty())
}

/// Backs the `prefs` command: writes `update` when it carries values, then
/// reports what is stored. The secret itself is never reported.
pub fn prefs_report(path: &Path, update: &PrefsUpdate) -> PrefsOutput {
    let mut out = PrefsOutput {
        ok: true,
        error: None,
        path: path.display().to_string(),
        url: None,
        client_id_set: false,
        client_secret_set: false,
        written: false,
    };
    let dict = if update.is_empty() {
        if !path.is_file() {
            let e = PrefsError::Missing(path.to_path_buf());
            out.ok = false;
            out.error = Some(ApiError::new(e.code(), e.to_string()));
            return out;
        }
        read_dictionary(path)
    } else {
        write_prefs(path, update).inspect(|_| out.written = true)
    };
    match dict {
        Ok(dict) => {
            out.url = dict
                .get(URL_KEY)
                .and_then(plist::Value::as_string)
                .map(ToString::to_string);
            out.client_id_set = has_value(&dict, CLIENT_ID_KEY);
            out.client_secret_set = has_value(&dict, CLIENT_SECRET_KEY);
            if out.written {
                tracing::info!(path = %out.path, "server preferences written");
            }
        }
        Err(e) => {
            out.ok = false;
            out.error = Some(ApiError::new(e.code(), e.to_string()));
        }
    }
    out
}
