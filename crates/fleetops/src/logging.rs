use crate::timestamp::now_stamp;
use std::fs::{self, File};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Keeps the file writer flushing until the process exits.
#[must_use]
pub struct LogGuard {
    _guard: Option<WorkerGuard>,
    pub path: Option<PathBuf>,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn log_file_path(log_dir: &Path, command: &str) -> PathBuf {
    log_dir.join(format!("{command}.log"))
}

/// Installs stderr + file logging. The command's log file is truncated first.
pub fn init_logging(log_dir: &Path, command: &str) -> Result<LogGuard, std::io::Error> {
    fs::create_dir_all(log_dir)?;
    let path = log_file_path(log_dir, command);
    let file = File::create(&path)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .compact(),
        )
        .try_init()
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    Ok(LogGuard {
        _guard: Some(guard),
        path: Some(path),
    })
}

/// Fallback when the log directory is not writable (e.g. run unprivileged).
pub fn init_stderr_logging() -> LogGuard {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .ok();
    LogGuard {
        _guard: None,
        path: None,
    }
}

/// Plain-text, newline-delimited log truncated when opened.
#[derive(Debug)]
pub struct TruncatedLog {
    path: PathBuf,
    out: LineWriter<File>,
    lines: usize,
}

impl TruncatedLog {
    pub fn create(path: &Path) -> Result<Self, std::io::Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            out: LineWriter::new(file),
            lines: 0,
        })
    }

    pub fn line(&mut self, tag: &str, text: &str) -> Result<(), std::io::Error> {
        writeln!(self.out, "{} [{tag}] {}", now_stamp(), text.trim_end())?;
        self.lines += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> usize {
        self.lines
    }
}
