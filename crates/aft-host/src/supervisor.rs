//! Worker process supervision.
//!
//! Owns the single analytics worker: resolves its platform-specific
//! executable path, spawns it with captured stdio, observes its exit, and
//! terminates it on request. The design assumes one supervised worker per
//! host lifetime; a second `start()` while one is running is a logged
//! no-op.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Lifecycle state of the supervised worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    NotStarted,
    Running { pid: u32 },
    Exited { code: Option<i32> },
}

struct Inner {
    state: WorkerState,
    kill_tx: Option<oneshot::Sender<()>>,
}

/// Spawns, observes, and terminates the analytics worker.
pub struct ProcessSupervisor {
    worker_dir: Option<PathBuf>,
    inner: Arc<Mutex<Inner>>,
}

impl ProcessSupervisor {
    /// `worker_dir` is a development override; when `None` the executable
    /// is resolved by the platform convention relative to the host binary.
    pub fn new(worker_dir: Option<PathBuf>) -> Self {
        Self {
            worker_dir,
            inner: Arc::new(Mutex::new(Inner {
                state: WorkerState::NotStarted,
                kill_tx: None,
            })),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.inner.lock().expect("supervisor lock poisoned").state
    }

    /// Spawn the worker with stdout/stderr captured and exit observation
    /// registered.
    ///
    /// A spawn failure is logged and otherwise swallowed — the host keeps
    /// running and the telemetry channel simply never connects. Calling
    /// `start()` while a worker is already running is a no-op.
    pub fn start(&self) {
        {
            let inner = self.inner.lock().expect("supervisor lock poisoned");
            if let WorkerState::Running { pid } = inner.state {
                warn!(pid, "worker already running, start ignored");
                return;
            }
        }

        let path = self.resolve_worker_path();
        info!(path = %path.display(), "starting analytics worker");

        let mut child = match Command::new(&path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!(path = %path.display(), error = %e, "worker spawn failed");
                return;
            }
        };

        let pid = child.id().unwrap_or_default();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, true));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().expect("supervisor lock poisoned");
            inner.state = WorkerState::Running { pid };
            inner.kill_tx = Some(kill_tx);
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            supervise(child, pid, kill_rx, inner).await;
        });

        info!(pid, "worker running");
    }

    /// Request worker termination. Idempotent and fire-and-forget: a second
    /// call, or a call with no worker running, is a no-op, and the caller
    /// never waits for exit confirmation.
    pub fn stop(&self) {
        let kill_tx = {
            let mut inner = self.inner.lock().expect("supervisor lock poisoned");
            inner.kill_tx.take()
        };

        match kill_tx {
            Some(tx) => {
                info!("stopping analytics worker");
                let _ = tx.send(());
            }
            None => {
                debug!("no worker running, stop is a no-op");
            }
        }
    }

    fn resolve_worker_path(&self) -> PathBuf {
        if let Some(dir) = &self.worker_dir {
            return dir.join(worker_binary_name());
        }

        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        platform_worker_path(&exe_dir)
    }
}

/// Exit observer: waits for the child to exit on its own, or for a stop
/// request, and records the outcome. The handle is cleared either way so a
/// later `start()` is legal.
async fn supervise(
    mut child: Child,
    pid: u32,
    kill_rx: oneshot::Receiver<()>,
    inner: Arc<Mutex<Inner>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
            terminate(&mut child, pid);
            // Reap after the kill; stop() has already returned.
            child.wait().await
        }
    };

    let code = match status {
        Ok(status) => {
            info!(pid, code = ?status.code(), "worker exited");
            status.code()
        }
        Err(e) => {
            error!(pid, error = %e, "failed to observe worker exit");
            None
        }
    };

    let mut inner = inner.lock().expect("supervisor lock poisoned");
    inner.state = WorkerState::Exited { code };
    inner.kill_tx = None;
}

/// Windows has no POSIX signal delivery: force-kill the whole process tree
/// by pid.
#[cfg(windows)]
fn terminate(_child: &mut Child, pid: u32) {
    match std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .spawn()
    {
        Ok(_) => debug!(pid, "taskkill issued"),
        Err(e) => warn!(pid, error = %e, "taskkill failed"),
    }
}

/// Elsewhere, signal the process directly.
#[cfg(not(windows))]
fn terminate(child: &mut Child, pid: u32) {
    if let Err(e) = child.start_kill() {
        warn!(pid, error = %e, "failed to signal worker");
    }
}

/// Forward one captured stream to diagnostic logging, line by line.
async fn forward_lines(stream: impl AsyncRead + Unpin, is_stderr: bool) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            warn!(target: "worker", "{line}");
        } else {
            info!(target: "worker", "{line}");
        }
    }
}

fn worker_binary_name() -> &'static str {
    if cfg!(windows) {
        "aft-worker.exe"
    } else {
        "aft-worker"
    }
}

/// The three recognized platform layouts, relative to the host executable:
/// macOS app bundles keep the worker under `../Resources`, Windows installs
/// it under `resources\worker`, and everything else uses a sibling
/// `worker/` directory.
fn platform_worker_path(exe_dir: &Path) -> PathBuf {
    if cfg!(target_os = "macos") {
        exe_dir
            .join("..")
            .join("Resources")
            .join("worker")
            .join(worker_binary_name())
    } else if cfg!(windows) {
        exe_dir
            .join("resources")
            .join("worker")
            .join(worker_binary_name())
    } else {
        exe_dir.join("worker").join(worker_binary_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn stop_without_worker_is_a_noop() {
        let supervisor = ProcessSupervisor::new(None);
        assert_eq!(supervisor.state(), WorkerState::NotStarted);

        supervisor.stop();
        supervisor.stop();
        assert_eq!(supervisor.state(), WorkerState::NotStarted);
    }

    #[tokio::test]
    async fn spawn_failure_is_nonfatal() {
        let dir = tempfile::tempdir().unwrap();
        // Empty directory: no worker binary to spawn.
        let supervisor = ProcessSupervisor::new(Some(dir.path().to_path_buf()));

        supervisor.start();
        assert_eq!(supervisor.state(), WorkerState::NotStarted);

        // And stop afterwards is still a clean no-op.
        supervisor.stop();
    }

    #[test]
    fn platform_path_has_three_branches() {
        let path = platform_worker_path(Path::new("/opt/aft/bin"));
        let s = path.to_string_lossy();

        if cfg!(target_os = "macos") {
            assert!(s.contains("Resources"));
        } else if cfg!(windows) {
            assert!(s.contains("resources"));
            assert!(s.ends_with("aft-worker.exe"));
        } else {
            assert!(s.ends_with("worker/aft-worker"));
        }
    }

    #[cfg(unix)]
    async fn wait_for_exit(supervisor: &ProcessSupervisor) -> WorkerState {
        for _ in 0..100 {
            if let state @ WorkerState::Exited { .. } = supervisor.state() {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("worker never exited: {:?}", supervisor.state());
    }

    /// Drop a fake worker script into a temp dir (unix only — test workers
    /// are shell scripts).
    #[cfg(unix)]
    fn fake_worker(dir: &Path, script: &str) {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("aft-worker");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn observes_worker_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        fake_worker(dir.path(), "exit 7");

        let supervisor = ProcessSupervisor::new(Some(dir.path().to_path_buf()));
        supervisor.start();

        let state = wait_for_exit(&supervisor).await;
        assert_eq!(state, WorkerState::Exited { code: Some(7) });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_terminates_running_worker() {
        let dir = tempfile::tempdir().unwrap();
        fake_worker(dir.path(), "sleep 30");

        let supervisor = ProcessSupervisor::new(Some(dir.path().to_path_buf()));
        supervisor.start();
        assert!(matches!(supervisor.state(), WorkerState::Running { .. }));

        supervisor.stop();
        let state = wait_for_exit(&supervisor).await;
        assert!(matches!(state, WorkerState::Exited { .. }));

        // Second stop after exit: no-op, state unchanged.
        supervisor.stop();
        assert_eq!(supervisor.state(), state);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn start_while_running_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fake_worker(dir.path(), "sleep 30");

        let supervisor = ProcessSupervisor::new(Some(dir.path().to_path_buf()));
        supervisor.start();
        let pid = match supervisor.state() {
            WorkerState::Running { pid } => pid,
            other => panic!("expected running worker: {other:?}"),
        };

        supervisor.start();
        assert_eq!(supervisor.state(), WorkerState::Running { pid });

        supervisor.stop();
        wait_for_exit(&supervisor).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn restart_after_exit_is_legal() {
        let dir = tempfile::tempdir().unwrap();
        fake_worker(dir.path(), "exit 0");

        let supervisor = ProcessSupervisor::new(Some(dir.path().to_path_buf()));
        supervisor.start();
        wait_for_exit(&supervisor).await;

        supervisor.start();
        // Either still running or already exited again, but not rejected.
        assert!(!matches!(supervisor.state(), WorkerState::NotStarted));
        supervisor.stop();
    }
}
