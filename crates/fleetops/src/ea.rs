//! Extension Attribute check: "is this app up to date on this Mac".

use crate::config::AppConfig;
use crate::probe::{Probe, ProbeError, installed_version};
use crate::status::{self, StatusError, StatusRecord};
use crate::template::has_placeholder;
use crate::timestamp::now_stamp;
use crate::version::is_outdated;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    NotInstalled,
    NeedsUpdate,
    UpToDate,
    UnknownVersion,
}

impl Status {
    /// Value reported to the server; advanced searches match on it.
    pub fn label(self) -> &'static str {
        match self {
            Status::NotInstalled => "Not installed",
            Status::NeedsUpdate => "Needs update",
            Status::UpToDate => "Up to date",
            Status::UnknownVersion => "Unknown version",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub app: String,
    pub status: Status,
    pub path: Option<PathBuf>,
    pub installed_version: Option<String>,
    pub latest_version: Option<String>,
    pub install_trigger: String,
}

impl Evaluation {
    /// Only a known-outdated install produces a status file.
    pub fn emits_status_file(&self) -> bool {
        self.status == Status::NeedsUpdate && self.installed_version.is_some()
    }

    pub fn to_record(&self, date: String) -> StatusRecord {
        StatusRecord {
            name: self.app.clone(),
            status: self.status.label().to_string(),
            installed_version: self.installed_version.clone().unwrap_or_default(),
            latest_version: self.latest_version.clone().unwrap_or_default(),
            install_trigger: self.install_trigger.clone(),
            date,
        }
    }
}

pub fn result_line(status: Status) -> String {
    format!("<result>{}</result>", status.label())
}

fn usable_latest(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty() && !has_placeholder(s))
        .map(ToString::to_string)
}

pub fn classify(probe: Probe, latest: Option<&str>) -> (Status, Option<PathBuf>, Option<String>) {
    match probe {
        Probe::NotFound => (Status::NotInstalled, None, None),
        Probe::Found { path, version } => {
            let status = match (version.as_deref(), latest) {
                (Some(installed), Some(latest)) if is_outdated(installed, latest) => {
                    Status::NeedsUpdate
                }
                (Some(_), Some(_)) => Status::UpToDate,
                _ => Status::UnknownVersion,
            };
            (status, Some(path), version)
        }
    }
}

pub async fn evaluate(app: &AppConfig, latest_override: Option<&str>) -> Result<Evaluation, ProbeError> {
    let latest = usable_latest(latest_override.or(app.latest_version.as_deref()));
    let probe = installed_version(&app.source).await?;
    let (status, path, installed_version) = classify(probe, latest.as_deref());
    Ok(Evaluation {
        app: app.name.clone(),
        status,
        path,
        installed_version,
        latest_version: latest,
        install_trigger: app.install_trigger(),
    })
}

/// Evaluates the app, refreshes its status file, and returns the result line.
pub async fn run_ea(
    app: &AppConfig,
    latest_override: Option<&str>,
    status_dir: &Path,
) -> Result<(Evaluation, Option<PathBuf>), EaError> {
    let evaluation = evaluate(app, latest_override).await?;
    let written = status::record(
        status_dir,
        &evaluation.to_record(now_stamp()),
        evaluation.emits_status_file(),
    )?;
    tracing::info!(
        app = %evaluation.app,
        status = evaluation.status.label(),
        installed = evaluation.installed_version.as_deref().unwrap_or("-"),
        latest = evaluation.latest_version.as_deref().unwrap_or("-"),
        "extension attribute evaluated"
    );
    Ok((evaluation, written))
}

#[derive(Debug, thiserror::Error)]
pub enum EaError {
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Status(#[from] StatusError),
}

impl EaError {
    pub fn code(&self) -> &'static str {
        match self {
            EaError::Probe(e) => e.code(),
            EaError::Status(e) => e.code(),
        }
    }
}
