//! Maintenance script execution
//!
//! The actual library logic - database rebuilds, tag cleaning, ReplayGain,
//! mobile sync - lives in external shell scripts. This module is the
//! process boundary: resolve a script by name, launch it asynchronously,
//! surface its stdout line-by-line as it arrives, collect stderr in bulk,
//! and classify the exit code. At most one operation runs at a time; a
//! concurrent launch is rejected immediately, never queued.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::events::{EventBus, MusiclibEvent, ScriptOutcome};

/// Exit code the scripts use for "request accepted but queued" (busy
/// database). Tuned to the script suite; a policy constant, not a
/// contract.
pub const DEFERRED_EXIT_CODE: i32 = 3;

/// Grace period between the polite SIGTERM and the forceful kill
pub const CANCEL_GRACE: Duration = Duration::from_secs(3);

/// Environment override prepended to the script search path
pub const SCRIPT_PATH_ENV: &str = "MUSICLIB_SCRIPT_PATH";

/// Installed script location
const INSTALL_SCRIPT_DIR: &str = "/usr/lib/musiclib/bin";

/// Structured error payload a failing script may print to stderr as JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptErrorPayload {
    pub error: String,
    pub script: String,
    pub code: i32,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub context: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Try to decode stderr as a structured error payload; callers fall back
/// to the raw text when this returns None
pub fn parse_error_payload(stderr: &str) -> Option<ScriptErrorPayload> {
    let trimmed = stderr.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Script search path, in priority order:
/// 1. `$MUSICLIB_SCRIPT_PATH` (env override)
/// 2. `/usr/lib/musiclib/bin` (installed)
/// 3. `~/musiclib/bin` (development - changes take effect without install)
/// 4. `./bin` and `.`
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(env_path) = std::env::var(SCRIPT_PATH_ENV) {
        if !env_path.is_empty() {
            paths.push(PathBuf::from(env_path));
        }
    }
    paths.push(PathBuf::from(INSTALL_SCRIPT_DIR));
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join("musiclib").join("bin"));
    }
    paths.push(PathBuf::from("./bin"));
    paths.push(PathBuf::from("."));
    paths
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Resolve a script name against a search path list
pub fn resolve_script_in(name: &str, paths: &[PathBuf]) -> Option<PathBuf> {
    for dir in paths {
        let candidate = dir.join(name);
        if candidate.is_file() && is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Classify a script exit into the three-way outcome
///
/// `exit_code` is None when the process was killed by a signal.
pub fn classify_exit(exit_code: Option<i32>, stderr: &str) -> ScriptOutcome {
    match exit_code {
        Some(0) => ScriptOutcome::Success,
        Some(DEFERRED_EXIT_CODE) => ScriptOutcome::Deferred,
        Some(code) => {
            let trimmed = stderr.trim();
            let message = if trimmed.is_empty() {
                format!("Script exited with code {code}")
            } else {
                trimmed.to_string()
            };
            ScriptOutcome::Failed {
                exit_code: Some(code),
                message,
            }
        }
        None => ScriptOutcome::Failed {
            exit_code: None,
            message: "Process terminated by signal".to_string(),
        },
    }
}

struct RunningOperation {
    operation: String,
    cancel: CancellationToken,
}

/// Handle to a launched script
///
/// Output arrives on the event bus; `wait` resolves to the classified
/// outcome after exit.
pub struct ScriptHandle {
    operation: String,
    cancel: CancellationToken,
    done: tokio::task::JoinHandle<ScriptOutcome>,
}

impl ScriptHandle {
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Request cooperative cancellation: SIGTERM first, SIGKILL after the
    /// grace period
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the script to finish and return the classified outcome
    pub async fn wait(self) -> ScriptOutcome {
        self.done.await.unwrap_or(ScriptOutcome::Failed {
            exit_code: None,
            message: "Script supervisor task failed".to_string(),
        })
    }
}

/// Launches maintenance scripts, one at a time
#[derive(Clone)]
pub struct ScriptRunner {
    search_paths: Vec<PathBuf>,
    events: EventBus,
    running: Arc<Mutex<Option<RunningOperation>>>,
}

impl ScriptRunner {
    pub fn new(events: EventBus) -> Self {
        Self::with_search_paths(events, search_paths())
    }

    pub fn with_search_paths(events: EventBus, search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            events,
            running: Arc::new(Mutex::new(None)),
        }
    }

    /// Resolve a script name against this runner's search path
    pub fn resolve_script(&self, name: &str) -> Result<PathBuf> {
        resolve_script_in(name, &self.search_paths).ok_or_else(|| {
            tracing::warn!(script = name, searched = ?self.search_paths, "script not found");
            Error::ScriptNotFound(name.to_string())
        })
    }

    /// Name of the running operation, if any
    pub fn running_operation(&self) -> Option<String> {
        self.running
            .lock()
            .expect("runner lock poisoned")
            .as_ref()
            .map(|op| op.operation.clone())
    }

    /// Cancel the running operation, if any. Returns false when idle.
    pub fn cancel(&self) -> bool {
        match &*self.running.lock().expect("runner lock poisoned") {
            Some(op) => {
                op.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Launch a script
    ///
    /// Rejects immediately with [`Error::ScriptBusy`] when another
    /// operation is active, or [`Error::ScriptNotFound`] when the script
    /// is on no search path. `stdin_payload`, when given, is written to
    /// the child's stdin and the pipe closed (scripts that pause for
    /// confirmation read one line).
    pub fn run(
        &self,
        operation: &str,
        script_name: &str,
        args: &[String],
        stdin_payload: Option<&str>,
    ) -> Result<ScriptHandle> {
        let script_path = self.resolve_script(script_name)?;
        let cancel = CancellationToken::new();

        {
            let mut slot = self.running.lock().expect("runner lock poisoned");
            if let Some(active) = &*slot {
                return Err(Error::ScriptBusy(active.operation.clone()));
            }
            *slot = Some(RunningOperation {
                operation: operation.to_string(),
                cancel: cancel.clone(),
            });
        }

        match self.spawn_supervised(operation, script_name, &script_path, args, stdin_payload, cancel)
        {
            Ok(handle) => Ok(handle),
            Err(e) => {
                // Launch failed before the supervisor took over the slot
                *self.running.lock().expect("runner lock poisoned") = None;
                Err(e)
            }
        }
    }

    fn spawn_supervised(
        &self,
        operation: &str,
        script_name: &str,
        script_path: &Path,
        args: &[String],
        stdin_payload: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<ScriptHandle> {
        let mut cmd = Command::new(script_path);
        cmd.args(args)
            .stdin(if stdin_payload.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        tracing::info!(operation, script = script_name, "script started");
        self.events.emit(MusiclibEvent::ScriptStarted {
            operation: operation.to_string(),
            script: script_name.to_string(),
            timestamp: chrono::Utc::now(),
        });

        if let Some(payload) = stdin_payload {
            if let Some(mut stdin) = child.stdin.take() {
                let payload = payload.to_string();
                tokio::spawn(async move {
                    // Best-effort; the script may not read stdin at all
                    let _ = stdin.write_all(payload.as_bytes()).await;
                });
            }
        }

        // Incremental stdout: one event per line, as it arrives
        let stdout_task = {
            let events = self.events.clone();
            let operation = operation.to_string();
            let stdout = child.stdout.take();
            tokio::spawn(async move {
                if let Some(stdout) = stdout {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        events.emit(MusiclibEvent::ScriptOutput {
                            operation: operation.clone(),
                            line,
                            timestamp: chrono::Utc::now(),
                        });
                    }
                }
            })
        };

        // Bulk stderr, surfaced at exit
        let stderr_task = {
            let stderr = child.stderr.take();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                if let Some(mut stderr) = stderr {
                    let _ = stderr.read_to_end(&mut buf).await;
                }
                String::from_utf8_lossy(&buf).into_owned()
            })
        };

        let events = self.events.clone();
        let running = Arc::clone(&self.running);
        let operation_name = operation.to_string();
        let supervisor_cancel = cancel.clone();

        let done = tokio::spawn(async move {
            let (exit_code, cancelled) = wait_with_cancel(&mut child, &supervisor_cancel).await;

            let _ = stdout_task.await;
            let stderr = stderr_task.await.unwrap_or_default();

            let outcome = if cancelled {
                ScriptOutcome::Failed {
                    exit_code,
                    message: "Operation cancelled".to_string(),
                }
            } else {
                classify_exit(exit_code, &stderr)
            };

            *running.lock().expect("runner lock poisoned") = None;

            tracing::info!(operation = %operation_name, ?outcome, "script finished");
            events.emit(MusiclibEvent::ScriptFinished {
                operation: operation_name,
                outcome: outcome.clone(),
                timestamp: chrono::Utc::now(),
            });
            outcome
        });

        Ok(ScriptHandle {
            operation: operation.to_string(),
            cancel,
            done,
        })
    }
}

/// Wait for the child, honoring cooperative cancellation: polite SIGTERM
/// first, SIGKILL after [`CANCEL_GRACE`] if the process has not exited
async fn wait_with_cancel(child: &mut Child, cancel: &CancellationToken) -> (Option<i32>, bool) {
    tokio::select! {
        status = child.wait() => {
            (status.ok().and_then(|s| s.code()), false)
        }
        _ = cancel.cancelled() => {
            if let Some(pid) = child.id() {
                // SIGTERM gives the script a chance to clean up temp files
                let _ = Command::new("kill")
                    .args(["-TERM", &pid.to_string()])
                    .status()
                    .await;
            }
            match tokio::time::timeout(CANCEL_GRACE, child.wait()).await {
                Ok(status) => (status.ok().and_then(|s| s.code()), true),
                Err(_) => {
                    let _ = child.kill().await;
                    (None, true)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success() {
        assert_eq!(classify_exit(Some(0), ""), ScriptOutcome::Success);
        // stderr chatter on success is ignored
        assert_eq!(classify_exit(Some(0), "warning: slow"), ScriptOutcome::Success);
    }

    #[test]
    fn test_classify_deferred() {
        assert_eq!(classify_exit(Some(DEFERRED_EXIT_CODE), ""), ScriptOutcome::Deferred);
    }

    #[test]
    fn test_classify_failure_carries_stderr() {
        match classify_exit(Some(7), "disk full\n") {
            ScriptOutcome::Failed { exit_code, message } => {
                assert_eq!(exit_code, Some(7));
                assert_eq!(message, "disk full");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_classify_failure_without_stderr_names_the_code() {
        match classify_exit(Some(12), "  ") {
            ScriptOutcome::Failed { message, .. } => {
                assert_eq!(message, "Script exited with code 12");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_classify_signal_death() {
        match classify_exit(None, "") {
            ScriptOutcome::Failed { exit_code, .. } => assert_eq!(exit_code, None),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_error_payload_parses_full_object() {
        let stderr = r#"{"error": "Database is locked", "script": "musiclib_rate.sh",
                         "code": 5, "timestamp": "2026-01-10T08:00:00Z",
                         "context": {"filepath": "/mnt/music/a.mp3"}}"#;
        let payload = parse_error_payload(stderr).unwrap();
        assert_eq!(payload.error, "Database is locked");
        assert_eq!(payload.script, "musiclib_rate.sh");
        assert_eq!(payload.code, 5);
        assert_eq!(
            payload.context.unwrap()["filepath"],
            serde_json::json!("/mnt/music/a.mp3")
        );
    }

    #[test]
    fn test_error_payload_minimal_fields() {
        let payload = parse_error_payload(r#"{"error":"e","script":"s","code":1}"#).unwrap();
        assert!(payload.timestamp.is_none());
        assert!(payload.context.is_none());
    }

    #[test]
    fn test_error_payload_rejects_plain_text_and_malformed_json() {
        assert!(parse_error_payload("plain error text").is_none());
        assert!(parse_error_payload("{not json").is_none());
        assert!(parse_error_payload("").is_none());
    }

    #[test]
    fn test_resolve_prefers_earlier_search_path() {
        use std::os::unix::fs::PermissionsExt;

        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        for dir in [&first, &second] {
            let p = dir.path().join("musiclib_rate.sh");
            std::fs::write(&p, "#!/bin/sh\nexit 0\n").unwrap();
            std::fs::set_permissions(&p, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let paths = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let resolved = resolve_script_in("musiclib_rate.sh", &paths).unwrap();
        assert!(resolved.starts_with(first.path()));
    }

    #[test]
    fn test_resolve_skips_non_executable_files() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("musiclib_rate.sh");
        std::fs::write(&p, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&p, std::fs::Permissions::from_mode(0o644)).unwrap();

        assert!(resolve_script_in("musiclib_rate.sh", &[dir.path().to_path_buf()]).is_none());
    }
}
