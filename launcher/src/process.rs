//! Supervision of the single server process.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::{Child, Command};

/// Owns the spawned server. On Unix the child leads its own process group, so
/// signals reach workers it forks; dropping the guard kills the whole group.
pub struct ServerProcess {
    child: Option<Child>,
    pid: Option<u32>,
}

impl ServerProcess {
    pub fn spawn(mut command: Command) -> io::Result<Self> {
        #[cfg(unix)]
        set_new_session(&mut command);
        command.kill_on_drop(true);
        let child = command.spawn()?;
        let pid = child.id();
        Ok(Self {
            child: Some(child),
            pid,
        })
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the server to exit on its own.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        let Some(child) = self.child.as_mut() else {
            return Err(io::Error::other("server process already reaped"));
        };
        let status = child.wait().await?;
        self.child = None;
        Ok(status)
    }

    /// SIGTERM the group, give it `grace` to exit, then SIGKILL.
    pub async fn terminate(&mut self, grace: Duration) -> io::Result<ExitStatus> {
        let Some(child) = self.child.as_mut() else {
            return Err(io::Error::other("server process already reaped"));
        };
        signal_group(self.pid, GroupSignal::Terminate, child);
        let status = if let Ok(waited) = tokio::time::timeout(grace, child.wait()).await {
            waited?
        } else {
            tracing::warn!(
                pid = ?self.pid,
                grace_secs = grace.as_secs(),
                "Server ignored SIGTERM; killing"
            );
            signal_group(self.pid, GroupSignal::Kill, child);
            child.wait().await?
        };
        self.child = None;
        Ok(status)
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            signal_group(self.pid, GroupSignal::Kill, child);
            let _ = child.try_wait();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: GroupSignal, child: &mut Child) {
    let signo = match signal {
        GroupSignal::Terminate => libc::SIGTERM,
        GroupSignal::Kill => libc::SIGKILL,
    };
    if let Some(pid) = pid {
        // SAFETY: killpg has no memory-safety preconditions.
        let sent = unsafe { libc::killpg(pid as i32, signo) };
        if sent == 0 {
            return;
        }
    }
    if matches!(signal, GroupSignal::Kill) {
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: Option<u32>, _signal: GroupSignal, child: &mut Child) {
    let _ = child.start_kill();
}

/// Put the child in its own session so the process group can be signalled
/// as a unit. On Linux the child also dies with the launcher.
#[cfg(unix)]
fn set_new_session(cmd: &mut Command) {
    // SAFETY: only async-signal-safe calls run between fork and exec.
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            #[cfg(target_os = "linux")]
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use tokio::process::Command;

    use super::ServerProcess;

    #[tokio::test]
    async fn terminate_stops_sleeping_child() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 30"]);
        let mut process = ServerProcess::spawn(cmd).unwrap();

        let status = process.terminate(Duration::from_secs(5)).await.unwrap();
        assert!(!status.success());
        assert!(process.wait().await.is_err());
    }

    #[tokio::test]
    async fn wait_reports_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 3"]);
        let mut process = ServerProcess::spawn(cmd).unwrap();
        assert_eq!(process.wait().await.unwrap().code(), Some(3));
    }
}
