use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// A single item that failed while the run carried on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub item: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovedPackage {
    pub path: String,
    pub bytes: u64,
    pub age_days: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupOutput {
    pub ok: bool,
    pub error: Option<ApiError>,
    pub dry_run: bool,
    pub scanned: usize,
    pub kept: usize,
    pub removed: Vec<RemovedPackage>,
    pub bytes_freed: u64,
    pub skipped_dirs: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeOutcome {
    Succeeded,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeReport {
    pub recipe: String,
    pub outcome: RecipeOutcome,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub downloaded: bool,
    pub built: bool,
    pub error_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub ok: bool,
    pub timed_out: bool,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub trusted: usize,
    pub untrusted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub downloaded: usize,
    pub built: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NightlyOutput {
    pub ok: bool,
    pub error: Option<ApiError>,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub network_attempts: u32,
    pub repo_update: Option<StepReport>,
    pub untrusted: Vec<String>,
    pub recipes: Vec<RecipeReport>,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ExtensionAttribute,
    AdvancedSearch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Create,
    Update,
    Unchanged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncItem {
    pub app: String,
    pub resource: ResourceKind,
    pub name: String,
    /// `None` when the server lookup failed before a plan could be made.
    pub action: Option<SyncAction>,
    pub applied: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutput {
    pub ok: bool,
    pub error: Option<ApiError>,
    pub dry_run: bool,
    pub recipes_found: usize,
    pub validated: Vec<String>,
    /// Apps with recipes on disk but no `[[apps]]` entry.
    pub skipped: Vec<String>,
    pub items: Vec<SyncItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefsOutput {
    pub ok: bool,
    pub error: Option<ApiError>,
    pub path: String,
    pub url: Option<String>,
    pub client_id_set: bool,
    pub client_secret_set: bool,
    pub written: bool,
}
