use crate::config::AppSource;
use crate::runner::{RunSpec, run_with_timeout};
use crate::version::extract_version;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid location pattern {pattern:?}: {message}")]
    Pattern { pattern: String, message: String },
    #[error("failed to read {path}: {message}")]
    Plist { path: PathBuf, message: String },
    #[error("failed to run {path}: {source}")]
    Run {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ProbeError {
    pub fn code(&self) -> &'static str {
        match self {
            ProbeError::Pattern { .. } => "probe.invalid_pattern",
            ProbeError::Plist { .. } => "probe.plist_unreadable",
            ProbeError::Run { .. } => "probe.run_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    NotFound,
    Found {
        path: PathBuf,
        version: Option<String>,
    },
}

/// First existing match, in pattern order. Matches within one pattern are sorted.
pub fn locate(patterns: &[String]) -> Result<Option<PathBuf>, ProbeError> {
    for pattern in patterns.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        let entries = glob::glob(pattern).map_err(|e| ProbeError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        let mut matches: Vec<PathBuf> = entries.filter_map(Result::ok).collect();
        matches.sort();
        if let Some(found) = matches.into_iter().find(|p| p.exists()) {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

pub fn bundle_version(bundle: &Path, key: &str) -> Result<Option<String>, ProbeError> {
    let info = bundle.join("Contents/Info.plist");
    if !info.is_file() {
        return Ok(None);
    }
    let value = plist::Value::from_file(&info).map_err(|e| ProbeError::Plist {
        path: info.clone(),
        message: e.to_string(),
    })?;
    Ok(value
        .as_dictionary()
        .and_then(|d| d.get(key))
        .and_then(plist::Value::as_string)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string))
}

pub async fn command_version(
    binary: &Path,
    args: &[String],
    timeout: Duration,
) -> Result<Option<String>, ProbeError> {
    let spec = RunSpec::new(binary, args.to_vec(), timeout);
    let outcome = run_with_timeout(&spec).await.map_err(|e| ProbeError::Run {
        path: binary.to_path_buf(),
        source: e,
    })?;
    if outcome.timed_out {
        tracing::warn!(binary = %binary.display(), "version command timed out");
        return Ok(None);
    }
    // some tools print their version on stderr
    Ok(extract_version(&outcome.stdout).or_else(|| extract_version(&outcome.stderr)))
}

pub async fn installed_version(source: &AppSource) -> Result<Probe, ProbeError> {
    match source {
        AppSource::Bundle { paths, key } => {
            let Some(path) = locate(paths)? else {
                return Ok(Probe::NotFound);
            };
            let version = bundle_version(&path, key)?;
            Ok(Probe::Found { path, version })
        }
        AppSource::Command {
            paths,
            args,
            timeout_secs,
        } => {
            let Some(path) = locate(paths)? else {
                return Ok(Probe::NotFound);
            };
            let version =
                command_version(&path, args, Duration::from_secs((*timeout_secs).max(1))).await?;
            Ok(Probe::Found { path, version })
        }
    }
}
