//! Running the external database tools.
//!
//! stdout is discarded (pg_dump writes to --file, psql output is noise),
//! stderr is drained on a helper thread so a chatty tool cannot block on a
//! full pipe while we wait for it.

use std::ffi::OsString;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use crate::error::{Result, SnapshotError};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

// diagnostics stay one line, long stderr is cut
const MAX_STDERR_CHARS: usize = 500;

pub struct ToolOutput {
    pub status: ExitStatus,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn status_text(&self) -> String {
        self.status.to_string()
    }

    /// stderr folded onto one line for diagnostics.
    pub fn stderr_summary(&self) -> String {
        summarize(&self.stderr)
    }
}

pub fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

/// Run `program` with `env` added to the inherited environment, killing it
/// if `timeout` elapses.
///
/// A missing executable is `ToolNotFound`, an expired deadline is
/// `ToolTimedOut`. A non-zero exit is not an error here; callers decide what
/// it means.
pub fn run(
    program: &Path,
    args: &[OsString],
    env: &[(&str, &str)],
    timeout: Option<Duration>,
) -> Result<ToolOutput> {
    let tool = tool_name(program);
    debug!("{tool}: spawning with {} argument(s)", args.len());

    let mut child = match Command::new(program)
        .args(args)
        .envs(env.iter().copied())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(SnapshotError::ToolNotFound { tool });
        }
        Err(e) => {
            return Err(SnapshotError::io(format!("failed to spawn {tool}"), e));
        }
    };

    let stderr_reader = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    });

    let start = Instant::now();

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if let Some(limit) = timeout {
                    if start.elapsed() > limit {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(SnapshotError::ToolTimedOut { tool, after: limit });
                    }
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                return Err(SnapshotError::io(format!("failed to wait for {tool}"), e));
            }
        }
    };

    let stderr = stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    debug!(
        "{tool}: exited with {status} after {:.2}s",
        start.elapsed().as_secs_f64()
    );

    Ok(ToolOutput { status, stderr })
}

fn summarize(stderr: &str) -> String {
    let joined = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" | ");

    if joined.is_empty() {
        return "no error output".to_string();
    }

    match joined.char_indices().nth(MAX_STDERR_CHARS) {
        Some((cut, _)) => format!("{}...", &joined[..cut]),
        None => joined,
    }
}
