//! Removes stale installer packages from download caches.

use crate::api::{ApiError, CleanupOutput, ItemFailure, RemovedPackage};
use crate::config::CleanupConfig;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug)]
struct PackageMeta {
    path: PathBuf,
    modified: SystemTime,
    size: u64,
    is_dir: bool,
}

fn build_globset(globs: &[String]) -> Result<GlobSet, String> {
    let mut b = GlobSetBuilder::new();
    for p in globs {
        let g = Glob::new(p).map_err(|e| format!("invalid glob {:?}: {e}", p))?;
        b.add(g);
    }
    b.build()
        .map_err(|e| format!("failed to build globset: {e}"))
}

fn has_package_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|e| extensions.iter().any(|x| x.trim_start_matches('.').eq_ignore_ascii_case(&e)))
}

fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Packages grouped by containing directory. Flat `.pkg` bundles are
/// directories and are collected whole.
fn collect_packages(
    root: &Path,
    extensions: &[String],
    exclude: Option<&GlobSet>,
    failures: &mut Vec<ItemFailure>,
) -> BTreeMap<PathBuf, Vec<PackageMeta>> {
    let mut groups: BTreeMap<PathBuf, Vec<PackageMeta>> = BTreeMap::new();
    let mut it = WalkDir::new(root).follow_links(false).into_iter();
    while let Some(entry) = it.next() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                failures.push(ItemFailure {
                    item: e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.display().to_string()),
                    message: e.to_string(),
                });
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        let path = entry.path();
        let is_dir = entry.file_type().is_dir();
        if !has_package_extension(path, extensions) {
            continue;
        }
        if is_dir {
            it.skip_current_dir();
        } else if !entry.file_type().is_file() {
            continue;
        }
        if exclude.is_some_and(|set| set.is_match(path)) {
            continue;
        }
        let md = match entry.metadata() {
            Ok(md) => md,
            Err(e) => {
                failures.push(ItemFailure {
                    item: path.display().to_string(),
                    message: e.to_string(),
                });
                continue;
            }
        };
        let size = if is_dir { dir_size(path) } else { md.len() };
        let parent = path.parent().unwrap_or(root).to_path_buf();
        groups.entry(parent).or_default().push(PackageMeta {
            path: path.to_path_buf(),
            modified: md.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            size,
            is_dir,
        });
    }
    groups
}

fn age_days(now: SystemTime, modified: SystemTime) -> u64 {
    now.duration_since(modified)
        .map(|d| d.as_secs() / DAY.as_secs())
        .unwrap_or(0)
}

pub fn cleanup(cfg: &CleanupConfig, dry_run: bool) -> CleanupOutput {
    cleanup_at(cfg, dry_run, SystemTime::now())
}

pub fn cleanup_at(cfg: &CleanupConfig, dry_run: bool, now: SystemTime) -> CleanupOutput {
    let mut out = CleanupOutput {
        ok: true,
        error: None,
        dry_run,
        scanned: 0,
        kept: 0,
        removed: vec![],
        bytes_freed: 0,
        skipped_dirs: vec![],
        failures: vec![],
    };

    let exclude = if cfg.exclude_globs.is_empty() {
        None
    } else {
        match build_globset(&cfg.exclude_globs) {
            Ok(set) => Some(set),
            Err(message) => {
                out.ok = false;
                out.error = Some(ApiError::new("cleanup.invalid_glob", message));
                return out;
            }
        }
    };
    let max_age = DAY * u32::try_from(cfg.max_age_days).unwrap_or(u32::MAX);

    for root in &cfg.directories {
        if !root.is_dir() {
            tracing::warn!(dir = %root.display(), "cleanup directory missing; skipping");
            out.skipped_dirs.push(root.display().to_string());
            continue;
        }
        let groups = collect_packages(root, &cfg.extensions, exclude.as_ref(), &mut out.failures);
        for (_dir, mut packages) in groups {
            out.scanned += packages.len();
            packages.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.path.cmp(&b.path)));
            for (idx, pkg) in packages.into_iter().enumerate() {
                let stale = now
                    .duration_since(pkg.modified)
                    .map(|d| d > max_age)
                    .unwrap_or(false);
                if idx < cfg.keep_newest || !stale {
                    out.kept += 1;
                    continue;
                }
                let age = age_days(now, pkg.modified);
                if !dry_run {
                    let res = if pkg.is_dir {
                        std::fs::remove_dir_all(&pkg.path)
                    } else {
                        std::fs::remove_file(&pkg.path)
                    };
                    if let Err(e) = res {
                        tracing::error!(path = %pkg.path.display(), error = %e, "failed to remove package");
                        out.failures.push(ItemFailure {
                            item: pkg.path.display().to_string(),
                            message: e.to_string(),
                        });
                        continue;
                    }
                }
                tracing::info!(
                    path = %pkg.path.display(),
                    bytes = pkg.size,
                    age_days = age,
                    dry_run,
                    "removed stale package"
                );
                out.bytes_freed += pkg.size;
                out.removed.push(RemovedPackage {
                    path: pkg.path.display().to_string(),
                    bytes: pkg.size,
                    age_days: age,
                });
            }
        }
    }

    tracing::info!(
        scanned = out.scanned,
        kept = out.kept,
        removed = out.removed.len(),
        bytes_freed = out.bytes_freed,
        failures = out.failures.len(),
        dry_run,
        "cleanup finished"
    );
    out
}
