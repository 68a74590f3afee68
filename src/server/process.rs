//! Inference server child process
//!
//! Spawns the server, forwards its stdout/stderr into the log and terminates
//! it exactly once: SIGTERM on POSIX (SIGKILL if it does not exit within the
//! grace period), a process-tree `taskkill` on Windows.

use crate::config::Config;
use crate::errors::{BridgeError, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

/// How long a terminated server gets to exit before being killed outright
const TERMINATE_GRACE: Duration = Duration::from_secs(3);

/// Command line used to start the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            working_dir: None,
        }
    }

    /// `<python> <script> --port <port>`
    pub fn python_server(config: &Config) -> Self {
        let script = config.script_path();
        Self {
            program: config.server.python.clone(),
            args: vec![
                script.display().to_string(),
                "--port".to_string(),
                config.server.port.to_string(),
            ],
            working_dir: script.parent().map(|p| p.to_path_buf()),
        }
    }

    /// The script argument, when the program is an interpreter
    pub fn script(&self) -> Option<PathBuf> {
        self.args.first().map(PathBuf::from)
    }

    fn display(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

/// A running (or already terminated) server process
#[derive(Debug)]
pub struct ServerProcess {
    child: Option<Child>,
    pid: Option<u32>,
    terminations: u32,
}

impl ServerProcess {
    /// Spawn the server. Must be called from within a tokio runtime.
    pub fn spawn(spec: &LaunchSpec) -> Result<Self> {
        tracing::info!(command = %spec.display(), "spawning inference server");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| BridgeError::Process(format!("Failed to spawn '{}': {}", spec.program, e)))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr, "stderr"));
        }

        let pid = child.id();
        tracing::info!(pid = ?pid, "inference server started");

        Ok(Self {
            child: Some(child),
            pid,
            terminations: 0,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Number of termination requests actually issued (0 or 1)
    pub fn terminations(&self) -> u32 {
        self.terminations
    }

    /// Whether the child is still running
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Terminate the server. Returns `true` if a termination was issued by
    /// this call; later calls are no-ops.
    pub async fn terminate(&mut self) -> Result<bool> {
        let Some(mut child) = self.child.take() else {
            return Ok(false);
        };

        if !matches!(child.try_wait(), Ok(None)) {
            tracing::debug!(pid = ?self.pid, "inference server already exited");
            return Ok(false);
        }

        self.terminations += 1;
        tracing::info!(pid = ?self.pid, "terminating inference server");
        terminate_child(&mut child, self.pid).await
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if matches!(child.try_wait(), Ok(None)) {
                self.terminations += 1;
                tracing::info!(pid = ?self.pid, "terminating inference server on drop");
                signal_blocking(&mut child, self.pid);
            }
        }
    }
}

#[cfg(unix)]
async fn terminate_child(child: &mut Child, pid: Option<u32>) -> Result<bool> {
    if let Some(pid) = pid {
        // SAFETY: plain kill(2) on a pid we spawned and have not reaped.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::info!(pid, %status, "inference server exited");
                    return Ok(true);
                }
                Ok(Err(e)) => return Err(BridgeError::Process(format!("wait failed: {}", e))),
                Err(_) => tracing::warn!(pid, "inference server ignored SIGTERM, killing"),
            }
        }
    }

    child
        .kill()
        .await
        .map_err(|e| BridgeError::Process(format!("kill failed: {}", e)))?;
    Ok(true)
}

#[cfg(windows)]
async fn terminate_child(child: &mut Child, pid: Option<u32>) -> Result<bool> {
    if let Some(pid) = pid {
        let output = Command::new("taskkill")
            .args(["/pid", &pid.to_string(), "/T", "/F"])
            .output()
            .await;
        match output {
            Ok(out) if out.status.success() => {
                let _ = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await;
                return Ok(true);
            }
            Ok(out) => tracing::warn!(pid, stderr = %String::from_utf8_lossy(&out.stderr), "taskkill failed"),
            Err(e) => tracing::warn!(pid, error = %e, "taskkill unavailable"),
        }
    }

    child
        .kill()
        .await
        .map_err(|e| BridgeError::Process(format!("kill failed: {}", e)))?;
    Ok(true)
}

#[cfg(unix)]
fn signal_blocking(child: &mut Child, pid: Option<u32>) {
    match pid {
        // SAFETY: see terminate_child.
        Some(pid) => unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        },
        None => {
            let _ = child.start_kill();
        }
    }
}

#[cfg(windows)]
fn signal_blocking(child: &mut Child, pid: Option<u32>) {
    let killed = pid
        .map(|pid| {
            std::process::Command::new("taskkill")
                .args(["/pid", &pid.to_string(), "/T", "/F"])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        })
        .unwrap_or(false);
    if !killed {
        let _ = child.start_kill();
    }
}

async fn forward_output<R>(reader: R, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if !line.trim().is_empty() => {
                tracing::info!(target: "cellscope::server", stream, "{}", line);
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(stream, error = %e, "server output closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_launch_spec() {
        let mut config = Config::default();
        config.server.python = "python3".to_string();
        config.server.port = 5123;
        config.paths.runtime_dir = "/srv/cellscope".to_string();

        let spec = LaunchSpec::python_server(&config);
        assert_eq!(spec.program, "python3");
        assert_eq!(spec.script(), Some(PathBuf::from("/srv/cellscope/model_server.py")));
        assert_eq!(spec.args, vec!["/srv/cellscope/model_server.py", "--port", "5123"]);
        assert_eq!(spec.working_dir, Some(PathBuf::from("/srv/cellscope")));
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let spec = LaunchSpec::new("/definitely/not/a/python", &[]);
        assert!(matches!(ServerProcess::spawn(&spec), Err(BridgeError::Process(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_exactly_once() {
        let spec = LaunchSpec::new("sleep", &["30"]);
        let mut process = ServerProcess::spawn(&spec).unwrap();
        assert!(process.is_running());

        assert!(process.terminate().await.unwrap());
        assert!(!process.terminate().await.unwrap());
        assert_eq!(process.terminations(), 1);
        assert!(!process.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_after_exit_is_noop() {
        let spec = LaunchSpec::new("true", &[]);
        let mut process = ServerProcess::spawn(&spec).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!process.terminate().await.unwrap());
        assert_eq!(process.terminations(), 0);
    }
}
