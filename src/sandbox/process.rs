use std::io;
use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::core::traits::sandbox::{SandboxPipes, SandboxProcess};

/// Command with all three standard streams piped, started as the leader of
/// a process group of its own. The child is killed if its handle is dropped
/// while it still runs.
pub fn piped_command<P: AsRef<Path>>(program: P) -> Command {
    let mut cmd = Command::new(program.as_ref());
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

/// A child spawned from [`piped_command`], together with everything it
/// started in its process group.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    group: Option<u32>,
}

impl ChildProcess {
    pub fn new(child: Child) -> Self {
        let group = child.id();
        Self { child, group }
    }

    /// Kills the whole group, which is how background processes left behind
    /// by the program go away too.
    pub fn kill_group(&self) {
        let Some(group) = self.group else {
            return;
        };

        #[cfg(unix)]
        {
            // SAFETY: kill(2) takes no pointers; a negative pid names the group.
            let ret = unsafe { libc::kill(-(group as libc::pid_t), libc::SIGKILL) };
            if ret != 0 {
                let e = io::Error::last_os_error();
                if e.raw_os_error() != Some(libc::ESRCH) {
                    tracing::warn!(group, error = %e, "Failed to kill process group");
                }
            }
        }
        #[cfg(not(unix))]
        let _ = group;
    }
}

#[async_trait::async_trait]
impl SandboxProcess for ChildProcess {
    fn take_pipes(&mut self) -> Option<SandboxPipes> {
        let stdin = self.child.stdin.take()?;
        let stdout = self.child.stdout.take()?;
        let stderr = self.child.stderr.take()?;

        Some(SandboxPipes {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        })
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.child.wait().await?.code())
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.kill_group();
        // Already reaped: the group kill above was all that was left to do.
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        // SIGKILL on unix, then waits for the child so no zombie is left.
        self.child.kill().await
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        // A reaped leader's group id may already belong to someone else.
        if let Ok(None) = self.child.try_wait() {
            self.kill_group();
        }
    }
}
