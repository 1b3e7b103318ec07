use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("failed to prepare status dir {path}: {source}")]
    Dir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to remove stale status file {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write status file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StatusError {
    pub fn code(&self) -> &'static str {
        match self {
            StatusError::Dir { .. } => "status.dir_failed",
            StatusError::Remove { .. } => "status.remove_failed",
            StatusError::Write { .. } => "status.write_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub name: String,
    pub status: String,
    pub installed_version: String,
    pub latest_version: String,
    pub install_trigger: String,
    pub date: String,
}

fn file_component(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

pub fn status_file_name(app: &str, version: &str) -> String {
    // the version part never carries '-', so the app prefix stays unambiguous
    format!(
        "{}-{}.json",
        file_component(app),
        file_component(version).replace('-', "_")
    )
}

fn is_status_file_for(file_name: &str, app: &str) -> bool {
    let prefix = format!("{}-", file_component(app));
    file_name.starts_with(&prefix)
        && file_name.ends_with(".json")
        // "Foo-Bar-1.0.json" must not be claimed by app "Foo"
        && !file_name[prefix.len()..file_name.len() - ".json".len()].contains('-')
}

/// Removes every `<app>-*.json` file. Returns the removed paths.
pub fn clear(dir: &Path, app: &str) -> Result<Vec<PathBuf>, StatusError> {
    let mut removed = vec![];
    if !dir.is_dir() {
        return Ok(removed);
    }
    let entries = fs::read_dir(dir).map_err(|e| StatusError::Dir {
        path: dir.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| StatusError::Dir {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !is_status_file_for(&name, app) {
            continue;
        }
        fs::remove_file(&path).map_err(|e| StatusError::Remove {
            path: path.clone(),
            source: e,
        })?;
        removed.push(path);
    }
    removed.sort();
    Ok(removed)
}

/// Replaces the app's status file. Nothing is written unless the record says
/// "needs update" with a known installed version; prior files are always cleared.
pub fn record(
    dir: &Path,
    record: &StatusRecord,
    emit: bool,
) -> Result<Option<PathBuf>, StatusError> {
    clear(dir, &record.name)?;
    if !emit {
        return Ok(None);
    }
    fs::create_dir_all(dir).map_err(|e| StatusError::Dir {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let path = dir.join(status_file_name(&record.name, &record.latest_version));
    let body = serde_json::to_string_pretty(record).map_err(|e| StatusError::Write {
        path: path.clone(),
        source: std::io::Error::other(e),
    })?;
    fs::write(&path, format!("{body}\n")).map_err(|e| StatusError::Write {
        path: path.clone(),
        source: e,
    })?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, latest: &str) -> StatusRecord {
        StatusRecord {
            name: name.to_string(),
            status: "Needs update".to_string(),
            installed_version: "1.0".to_string(),
            latest_version: latest.to_string(),
            install_trigger: "install-app".to_string(),
            date: "2024-01-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn record_writes_named_file_with_all_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = record(dir.path(), &sample("Firefox", "128.0"), true)
            .expect("record")
            .expect("path");
        assert_eq!(path.file_name().unwrap(), "Firefox-128.0.json");

        let raw = fs::read_to_string(&path).expect("read");
        let v: serde_json::Value = serde_json::from_str(&raw).expect("json");
        for key in [
            "name",
            "status",
            "installed_version",
            "latest_version",
            "install_trigger",
            "date",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn at_most_one_file_per_app() {
        let dir = tempfile::tempdir().expect("tempdir");
        record(dir.path(), &sample("Firefox", "127.0"), true).expect("first");
        record(dir.path(), &sample("Firefox", "128.0"), true).expect("second");
        let names: Vec<String> = fs::read_dir(dir.path())
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["Firefox-128.0.json".to_string()]);
    }

    #[test]
    fn record_without_emit_only_clears() {
        let dir = tempfile::tempdir().expect("tempdir");
        record(dir.path(), &sample("Zoom", "6.0"), true).expect("first");
        let out = record(dir.path(), &sample("Zoom", "6.0"), false).expect("clear");
        assert!(out.is_none());
        assert_eq!(fs::read_dir(dir.path()).expect("read_dir").count(), 0);
    }

    #[test]
    fn clear_leaves_other_apps_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        record(dir.path(), &sample("Foo", "1.0"), true).expect("foo");
        record(dir.path(), &sample("Foo-Bar", "2.0"), true).expect("foo-bar");
        let removed = clear(dir.path(), "Foo").expect("clear");
        assert_eq!(removed.len(), 1);
        assert!(dir.path().join("Foo-Bar-2.0.json").is_file());
    }

    #[test]
    fn clear_on_missing_dir_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(clear(&dir.path().join("absent"), "Foo").expect("clear").is_empty());
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(status_file_name("AC/DC", "1:2"), "AC_DC-1_2.json");
        assert_eq!(status_file_name("Foo", "2.0-beta"), "Foo-2.0_beta.json");
    }
}
