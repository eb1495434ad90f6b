use std::fmt;
use std::io::Read;
use std::path::{ Path, PathBuf };
use std::process::{ Command, Stdio };
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::thread;
use std::time::{ Duration, Instant };

/// Default per-command execution timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Bounded output buffer; anything past this is an explicit error condition.
pub const MAX_OUTPUT_BYTES: usize = 8 * 1024 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub enum ExecError {
    /// The program could not be started at all.
    SpawnFailed(String),
    /// The command exceeded its execution timeout and was killed.
    Timeout(Duration),
    /// The command produced more output than the bounded buffer allows.
    OutputOverflow(usize),
    /// The given project root is not a resolvable directory.
    InvalidPath(String),
    Io(String),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::SpawnFailed(msg) => write!(f, "failed to start command: {}", msg),
            ExecError::Timeout(limit) => {
                write!(f, "command exceeded timeout of {}s and was killed", limit.as_secs())
            }
            ExecError::OutputOverflow(limit) => {
                write!(f, "command output exceeded the {} byte limit", limit)
            }
            ExecError::InvalidPath(msg) => write!(f, "invalid project path: {}", msg),
            ExecError::Io(msg) => write!(f, "i/o error: {}", msg),
        }
    }
}

impl std::error::Error for ExecError {}

pub struct CommandOutput {
    pub stdout: String,
    pub success: bool,
}

/// Resolve a project root safely before any command execution: the path must
/// canonicalize to an existing directory.
pub fn resolve_project_root(raw: &str) -> Result<PathBuf, ExecError> {
    let path = Path::new(raw);
    let canonical = path
        .canonicalize()
        .map_err(|e| ExecError::InvalidPath(format!("{}: {}", raw, e)))?;
    if !canonical.is_dir() {
        return Err(ExecError::InvalidPath(format!("{} is not a directory", raw)));
    }
    Ok(canonical)
}

/// Resolve a report artifact below the project root. Returns None when the
/// artifact does not exist or escapes the root (symlink traversal).
pub fn resolve_inside(root: &Path, relative: &str) -> Option<PathBuf> {
    let candidate = root.join(relative);
    let canonical = candidate.canonicalize().ok()?;
    if !canonical.starts_with(root) || !canonical.is_file() {
        return None;
    }
    Some(canonical)
}

/// Run a command with a bounded timeout and a bounded stdout buffer.
///
/// A non-zero exit is NOT an error here; callers decide whether a failed
/// build-tool invocation still left a usable report behind. Timeout and
/// overflow kill the child and surface as errors.
pub fn run_command(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration
) -> Result<CommandOutput, ExecError> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ExecError::SpawnFailed(format!("{}: {}", program, e)))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| ExecError::Io("could not capture stdout".to_string()))?;

    // The reader keeps draining past the cap so the child never blocks on a
    // full pipe; the overflow flag lets the polling loop kill it promptly.
    let overflowed = Arc::new(AtomicBool::new(false));
    let overflow_flag = Arc::clone(&overflowed);
    let reader = thread::spawn(move || {
        let mut buffer: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            match stdout.read(&mut chunk) {
                Ok(0) => {
                    break;
                }
                Ok(n) => {
                    if buffer.len() + n > MAX_OUTPUT_BYTES {
                        overflow_flag.store(true, Ordering::SeqCst);
                        // Keep draining, discard the rest.
                    } else {
                        buffer.extend_from_slice(&chunk[..n]);
                    }
                }
                Err(_) => {
                    break;
                }
            }
        }
        buffer
    });

    let deadline = Instant::now() + timeout;
    loop {
        if overflowed.load(Ordering::SeqCst) {
            let _ = child.kill();
            let _ = child.wait();
            let _ = reader.join();
            return Err(ExecError::OutputOverflow(MAX_OUTPUT_BYTES));
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                let buffer = reader
                    .join()
                    .map_err(|_| ExecError::Io("output reader panicked".to_string()))?;
                if overflowed.load(Ordering::SeqCst) {
                    return Err(ExecError::OutputOverflow(MAX_OUTPUT_BYTES));
                }
                return Ok(CommandOutput {
                    stdout: String::from_utf8_lossy(&buffer).into_owned(),
                    success: status.success(),
                });
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = reader.join();
                    return Err(ExecError::Timeout(timeout));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                let _ = reader.join();
                return Err(ExecError::Io(e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_project_root_rejects_missing_path() {
        assert!(resolve_project_root("/definitely/not/a/real/path").is_err());
    }

    #[test]
    fn test_resolve_project_root_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("pom.xml");
        std::fs::write(&file, "<project/>").unwrap();
        assert!(resolve_project_root(file.to_str().unwrap()).is_err());
        assert!(resolve_project_root(dir.path().to_str().unwrap()).is_ok());
    }

    #[test]
    fn test_resolve_inside_finds_nested_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let nested = root.join("target/generated-sources/license");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("THIRD-PARTY.txt"), "content").unwrap();

        let found = resolve_inside(&root, "target/generated-sources/license/THIRD-PARTY.txt");
        assert!(found.is_some());
        assert!(resolve_inside(&root, "target/missing.txt").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_inside_rejects_escaping_symlink() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            root.join("report.txt")
        ).unwrap();

        assert!(resolve_inside(&root, "report.txt").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_command(
            "sh",
            &["-c", "printf hello"],
            dir.path(),
            Duration::from_secs(5)
        ).unwrap();
        assert_eq!(output.stdout, "hello");
        assert!(output.success);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_reports_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_command(
            "sh",
            &["-c", "exit 3"],
            dir.path(),
            Duration::from_secs(5)
        ).unwrap();
        assert!(!output.success);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_command(
            "sh",
            &["-c", "sleep 10"],
            dir.path(),
            Duration::from_millis(200)
        );
        assert!(matches!(result, Err(ExecError::Timeout(_))));
    }

    #[test]
    fn test_spawn_failure_is_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_command(
            "definitely-not-a-real-binary-name",
            &[],
            dir.path(),
            Duration::from_secs(1)
        );
        assert!(matches!(result, Err(ExecError::SpawnFailed(_))));
    }
}
