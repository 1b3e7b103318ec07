use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;

const DEFAULT_MAX_CAPTURE_BYTES: usize = 4 * 1024 * 1024;
const TERM_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RunSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub max_capture_bytes: usize,
}

impl RunSpec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            max_capture_bytes: DEFAULT_MAX_CAPTURE_BYTES,
        }
    }

    pub fn display(&self) -> String {
        let mut s = self.program.display().to_string();
        for a in &self.args {
            s.push(' ');
            s.push_str(a);
        }
        s
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration_ms: u64,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

#[derive(Debug, Default)]
struct TailBuffer {
    max: usize,
    buf: Vec<u8>,
}

impl TailBuffer {
    fn new(max: usize) -> Self {
        Self { max, buf: vec![] }
    }

    fn push(&mut self, chunk: &[u8]) {
        if self.max == 0 {
            return;
        }
        if chunk.len() >= self.max {
            self.buf.clear();
            self.buf
                .extend_from_slice(&chunk[chunk.len().saturating_sub(self.max)..]);
            return;
        }
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > self.max {
            let excess = self.buf.len() - self.max;
            self.buf.drain(0..excess);
        }
    }

    fn into_string(self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

async fn read_stream<R: tokio::io::AsyncRead + Unpin>(
    mut r: R,
    max_bytes: usize,
) -> std::io::Result<String> {
    let mut tail = TailBuffer::new(max_bytes);
    let mut buf = vec![0u8; 8 * 1024];
    loop {
        let n = r.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        tail.push(&buf[..n]);
    }
    Ok(tail.into_string())
}

async fn finalize_capture_task(
    task: &mut tokio::task::JoinHandle<std::io::Result<String>>,
    stream_name: &str,
    timed_out: bool,
) -> std::io::Result<String> {
    let joined = if timed_out {
        match tokio::time::timeout(Duration::from_millis(250), &mut *task).await {
            Ok(joined) => Some(joined),
            Err(_) => {
                task.abort();
                None
            }
        }
    } else {
        Some(task.await)
    };

    match joined {
        Some(Ok(Ok(captured))) => Ok(captured),
        Some(Ok(Err(err))) => Err(err),
        Some(Err(_join_err)) => Ok(format!("<{stream_name} join error>")),
        None => Ok(format!("<{stream_name} capture aborted after timeout>")),
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;
    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        tracing::debug!(pid, ?signal, error = %e, "killpg failed");
    }
}

/// Signals the child's whole process group: SIGTERM, a grace period, then SIGKILL.
async fn terminate_tree(child: &mut tokio::process::Child) -> std::io::Result<std::process::ExitStatus> {
    #[cfg(unix)]
    {
        use nix::sys::signal::Signal;
        if let Some(pid) = child.id() {
            signal_group(pid, Signal::SIGTERM);
            if let Ok(res) = tokio::time::timeout(TERM_GRACE, child.wait()).await {
                signal_group(pid, Signal::SIGKILL);
                return res;
            }
            signal_group(pid, Signal::SIGKILL);
        }
    }
    let _ = child.start_kill();
    child.wait().await
}

/// Runs a child process; if it outlives `spec.timeout`, it and its
/// descendants are signalled and the outcome is marked as timed out.
pub async fn run_with_timeout(spec: &RunSpec) -> Result<RunOutcome, std::io::Error> {
    let start = Instant::now();
    let mut cmd = tokio::process::Command::new(&spec.program);
    cmd.args(&spec.args);
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("stdout is not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("stderr is not captured"))?;

    let mut stdout_task = tokio::spawn(read_stream(stdout, spec.max_capture_bytes));
    let mut stderr_task = tokio::spawn(read_stream(stderr, spec.max_capture_bytes));

    let mut timed_out = false;
    let status = match tokio::time::timeout(spec.timeout, child.wait()).await {
        Ok(res) => res?,
        Err(_) => {
            timed_out = true;
            tracing::warn!(
                command = %spec.display(),
                timeout_secs = spec.timeout.as_secs(),
                "command timed out; terminating process group"
            );
            terminate_tree(&mut child).await?
        }
    };

    let stdout = finalize_capture_task(&mut stdout_task, "stdout", timed_out).await?;
    let stderr = finalize_capture_task(&mut stderr_task, "stderr", timed_out).await?;

    Ok(RunOutcome {
        exit_code: status.code(),
        timed_out,
        duration_ms: start.elapsed().as_millis() as u64,
        stdout,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn read_stream_keeps_tail_within_limit() {
        let payload = b"abcdef".to_vec();
        let (mut tx, rx) = tokio::io::duplex(64);
        tokio::spawn(async move {
            tx.write_all(&payload).await.expect("write payload");
        });

        let captured = read_stream(rx, 3).await.expect("capture stream");
        assert_eq!(captured, "def");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_stderr_and_exit_code() {
        let spec = RunSpec::new(
            "sh",
            vec![
                "-c".to_string(),
                "echo out; echo err >&2; exit 3".to_string(),
            ],
            Duration::from_secs(10),
        );
        let outcome = run_with_timeout(&spec).await.expect("outcome");
        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.timed_out);
        assert!(!outcome.success());
        assert_eq!(outcome.stdout, "out\n");
        assert_eq!(outcome.stderr, "err\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_returns_even_if_descendants_keep_pipes_open() {
        let spec = RunSpec::new(
            "sh",
            vec![
                "-c".to_string(),
                "(sleep 30) & while true; do sleep 1; done".to_string(),
            ],
            Duration::from_millis(200),
        );

        let outcome = tokio::time::timeout(Duration::from_secs(8), run_with_timeout(&spec))
            .await
            .expect("runner must return promptly on timeout")
            .expect("outcome");

        assert!(outcome.timed_out);
        assert!(!outcome.success());
    }

    /// Gone, or a zombie waiting for its new parent to reap it.
    #[cfg(target_os = "linux")]
    fn process_is_dead(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/status")) {
            Ok(status) => status
                .lines()
                .find_map(|l| l.strip_prefix("State:"))
                .is_some_and(|state| state.trim_start().starts_with('Z')),
            Err(_) => true,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn timeout_kills_grandchildren() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pidfile = dir.path().join("grandchild.pid");
        let spec = RunSpec::new(
            "sh",
            vec![
                "-c".to_string(),
                format!("sleep 300 & echo $! > '{}'; wait", pidfile.display()),
            ],
            Duration::from_millis(500),
        );

        let outcome = run_with_timeout(&spec).await.expect("outcome");
        assert!(outcome.timed_out);

        let pid = std::fs::read_to_string(&pidfile).expect("pidfile");
        let pid = pid.trim();
        assert!(!pid.is_empty());
        let deadline = Instant::now() + Duration::from_secs(3);
        while !process_is_dead(pid) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(process_is_dead(pid), "grandchild {pid} survived the timeout");
    }

    #[tokio::test]
    async fn missing_program_is_an_io_error() {
        let spec = RunSpec::new(
            "/nonexistent/fleetops-test-binary",
            vec![],
            Duration::from_secs(1),
        );
        let err = run_with_timeout(&spec).await.expect_err("spawn must fail");
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
