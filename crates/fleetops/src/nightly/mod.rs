//! Nightly packaging run: network wait, repo update, trust checks, recipes.

use crate::api::{
    ApiError, NightlyOutput, RecipeOutcome, RecipeReport, RunSummary, StepReport,
};
use crate::config::{AutopkgConfig, FleetConfig};
use crate::logging::TruncatedLog;
use crate::runner::{RunOutcome, RunSpec, run_with_timeout};
use crate::timestamp::now_stamp;
use fs4::fs_std::FileExt;
use std::fs;
use std::path::Path;
use std::time::Duration;

mod network;
mod recipes;

pub use network::wait_for_network;
pub use recipes::{LineClass, LineFilter, OutputMarkers, parse_recipe_list, scan_markers};

pub const RUN_LOG: &str = "autopkg.log";
pub const ERROR_LOG: &str = "autopkg-errors.log";
const LOCK_FILE: &str = "nightly.lock";

struct RunLock {
    _file: fs::File,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self._file);
    }
}

fn acquire_run_lock(log_dir: &Path) -> Result<RunLock, ApiError> {
    let lock_path = log_dir.join(LOCK_FILE);
    let file = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock_path)
        .map_err(|e| {
            ApiError::new(
                "nightly.precondition_failed",
                format!("failed to open lock file {}: {e}", lock_path.display()),
            )
        })?;
    file.try_lock_exclusive().map_err(|e| {
        ApiError::new(
            "nightly.already_running",
            format!("another nightly run holds {} ({e})", lock_path.display()),
        )
    })?;
    Ok(RunLock { _file: file })
}

fn check_preconditions(cfg: &FleetConfig) -> Result<Vec<String>, ApiError> {
    let binary = &cfg.autopkg.binary;
    if !binary.is_file() {
        return Err(ApiError::new(
            "nightly.precondition_failed",
            format!("packaging tool not found: {}", binary.display()),
        ));
    }
    let list = &cfg.autopkg.recipe_list;
    let raw = fs::read_to_string(list).map_err(|e| {
        ApiError::new(
            "nightly.precondition_failed",
            format!("recipe list unreadable: {}: {e}", list.display()),
        )
    })?;
    let recipes = parse_recipe_list(&raw);
    if recipes.is_empty() {
        return Err(ApiError::new(
            "nightly.precondition_failed",
            format!("recipe list is empty: {}", list.display()),
        ));
    }
    fs::create_dir_all(&cfg.paths.log_dir).map_err(|e| {
        ApiError::new(
            "nightly.precondition_failed",
            format!("log dir unusable: {}: {e}", cfg.paths.log_dir.display()),
        )
    })?;
    Ok(recipes)
}

fn step_report(outcome: &RunOutcome) -> StepReport {
    StepReport {
        ok: outcome.success(),
        timed_out: outcome.timed_out,
        exit_code: outcome.exit_code,
        duration_ms: outcome.duration_ms,
        message: None,
    }
}

fn spec(ap: &AutopkgConfig, args: Vec<String>, timeout_secs: u64) -> RunSpec {
    RunSpec::new(&ap.binary, args, Duration::from_secs(timeout_secs.max(1)))
}

async fn update_repos(ap: &AutopkgConfig) -> StepReport {
    let spec = spec(
        ap,
        vec!["repo-update".to_string(), "all".to_string()],
        ap.repo_update_timeout_secs,
    );
    match run_with_timeout(&spec).await {
        Ok(outcome) => {
            let report = step_report(&outcome);
            if report.ok {
                tracing::info!(duration_ms = report.duration_ms, "recipe repos updated");
            } else {
                tracing::warn!(
                    exit_code = ?report.exit_code,
                    timed_out = report.timed_out,
                    stderr = %outcome.stderr.trim(),
                    "repo update failed; continuing with existing recipes"
                );
            }
            report
        }
        Err(e) => {
            tracing::error!(error = %e, "repo update could not start");
            StepReport {
                ok: false,
                timed_out: false,
                exit_code: None,
                duration_ms: 0,
                message: Some(e.to_string()),
            }
        }
    }
}

async fn verify_trust(ap: &AutopkgConfig, recipe: &str) -> bool {
    let spec = spec(
        ap,
        vec!["verify-trust-info".to_string(), recipe.to_string()],
        ap.trust_timeout_secs,
    );
    match run_with_timeout(&spec).await {
        Ok(outcome) if outcome.success() => true,
        Ok(outcome) => {
            tracing::warn!(
                recipe,
                exit_code = ?outcome.exit_code,
                timed_out = outcome.timed_out,
                detail = %outcome.stderr.trim(),
                "recipe trust verification failed"
            );
            false
        }
        Err(e) => {
            tracing::error!(recipe, error = %e, "trust verification could not start");
            false
        }
    }
}

fn write_line(log: &mut TruncatedLog, recipe: &str, line: &str) {
    if let Err(e) = log.line(recipe, line) {
        tracing::warn!(recipe, log = %log.path().display(), error = %e, "failed to write log line");
    }
}

/// Routes each output line into the run or error partition and returns the
/// number of error lines. The streams are captured separately, so all stdout
/// lines land before all stderr lines; their original interleaving is lost.
fn partition_output(
    recipe: &str,
    outcome: &RunOutcome,
    filter: &LineFilter,
    run_log: &mut TruncatedLog,
    error_log: &mut TruncatedLog,
) -> usize {
    let mut error_lines = 0usize;
    for line in outcome.stdout.lines().chain(outcome.stderr.lines()) {
        match filter.classify(line) {
            LineClass::Noise => {}
            LineClass::Error => {
                error_lines += 1;
                write_line(error_log, recipe, line);
            }
            LineClass::Keep => write_line(run_log, recipe, line),
        }
    }
    error_lines
}

pub fn classify_recipe(outcome: &RunOutcome, markers: OutputMarkers) -> RecipeOutcome {
    if outcome.timed_out {
        RecipeOutcome::TimedOut
    } else if outcome.success() && !markers.failed {
        RecipeOutcome::Succeeded
    } else {
        RecipeOutcome::Failed
    }
}

async fn run_recipe(
    ap: &AutopkgConfig,
    recipe: &str,
    filter: &LineFilter,
    run_log: &mut TruncatedLog,
    error_log: &mut TruncatedLog,
) -> RecipeReport {
    let mut args = ap.run_args.clone();
    args.push(recipe.to_string());
    let spec = spec(ap, args, ap.recipe_timeout_secs);

    let outcome = match run_with_timeout(&spec).await {
        Ok(o) => o,
        Err(e) => {
            tracing::error!(recipe, error = %e, "recipe could not start");
            write_line(error_log, recipe, &format!("failed to start: {e}"));
            return RecipeReport {
                recipe: recipe.to_string(),
                outcome: RecipeOutcome::Failed,
                exit_code: None,
                duration_ms: 0,
                downloaded: false,
                built: false,
                error_lines: 1,
            };
        }
    };

    let markers = scan_markers(&outcome.stdout);
    let mut error_lines = partition_output(recipe, &outcome, filter, run_log, error_log);
    let result = classify_recipe(&outcome, markers);
    if result == RecipeOutcome::TimedOut {
        error_lines += 1;
        write_line(
            error_log,
            recipe,
            &format!("timed out after {}s", ap.recipe_timeout_secs),
        );
    }

    tracing::info!(
        recipe,
        outcome = ?result,
        exit_code = ?outcome.exit_code,
        duration_ms = outcome.duration_ms,
        downloaded = markers.downloaded,
        built = markers.built,
        "recipe finished"
    );

    RecipeReport {
        recipe: recipe.to_string(),
        outcome: result,
        exit_code: outcome.exit_code,
        duration_ms: outcome.duration_ms,
        downloaded: markers.downloaded,
        built: markers.built,
        error_lines,
    }
}

pub fn summarize(total: usize, untrusted: usize, reports: &[RecipeReport]) -> RunSummary {
    let count = |o: RecipeOutcome| reports.iter().filter(|r| r.outcome == o).count();
    RunSummary {
        total,
        trusted: total - untrusted,
        untrusted,
        succeeded: count(RecipeOutcome::Succeeded),
        failed: count(RecipeOutcome::Failed),
        timed_out: count(RecipeOutcome::TimedOut),
        downloaded: reports.iter().filter(|r| r.downloaded).count(),
        built: reports.iter().filter(|r| r.built).count(),
    }
}

fn abort(mut out: NightlyOutput, error: ApiError) -> NightlyOutput {
    tracing::error!(code = %error.code, "{}", error.message);
    out.ok = false;
    out.error = Some(error);
    out.finished_at = Some(now_stamp());
    out
}

pub async fn nightly(cfg: &FleetConfig) -> NightlyOutput {
    let mut out = NightlyOutput {
        ok: true,
        error: None,
        started_at: now_stamp(),
        finished_at: None,
        network_attempts: 0,
        repo_update: None,
        untrusted: vec![],
        recipes: vec![],
        summary: RunSummary::default(),
    };
    let ap = &cfg.autopkg;

    let recipes = match check_preconditions(cfg) {
        Ok(r) => r,
        Err(e) => return abort(out, e),
    };
    let _lock = match acquire_run_lock(&cfg.paths.log_dir) {
        Ok(l) => l,
        Err(e) => return abort(out, e),
    };
    let filter = match LineFilter::new(&ap.noise_patterns, &ap.error_patterns) {
        Ok(f) => f,
        Err(e) => {
            return abort(
                out,
                ApiError::new("config.invalid_pattern", e.to_string()),
            );
        }
    };
    let opened = TruncatedLog::create(&cfg.paths.log_dir.join(RUN_LOG)).and_then(|run_log| {
        TruncatedLog::create(&cfg.paths.log_dir.join(ERROR_LOG)).map(|error_log| (run_log, error_log))
    });
    let (mut run_log, mut error_log) = match opened {
        Ok(pair) => pair,
        Err(e) => {
            return abort(
                out,
                ApiError::new(
                    "nightly.precondition_failed",
                    format!("failed to create run logs: {e}"),
                ),
            );
        }
    };
    tracing::info!(recipes = recipes.len(), "nightly run starting");

    match wait_for_network(&cfg.network).await {
        Ok(n) => out.network_attempts = n,
        Err(n) => {
            out.network_attempts = n;
            return abort(
                out,
                ApiError::new(
                    "nightly.network_unreachable",
                    format!(
                        "{}:{} unreachable after {n} attempts",
                        cfg.network.host, cfg.network.port
                    ),
                ),
            );
        }
    }

    out.repo_update = Some(update_repos(ap).await);

    let mut trusted = vec![];
    for recipe in &recipes {
        if verify_trust(ap, recipe).await {
            trusted.push(recipe.clone());
        } else {
            write_line(&mut error_log, recipe, "trust verification failed; recipe skipped");
            out.untrusted.push(recipe.clone());
        }
    }

    for recipe in &trusted {
        let report = run_recipe(ap, recipe, &filter, &mut run_log, &mut error_log).await;
        out.recipes.push(report);
    }

    out.summary = summarize(recipes.len(), out.untrusted.len(), &out.recipes);
    out.finished_at = Some(now_stamp());
    let s = &out.summary;
    tracing::info!(
        total = s.total,
        trusted = s.trusted,
        untrusted = s.untrusted,
        succeeded = s.succeeded,
        failed = s.failed,
        timed_out = s.timed_out,
        downloaded = s.downloaded,
        built = s.built,
        "nightly run finished"
    );
    out
}
