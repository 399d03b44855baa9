use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{Duration, Instant, timeout, timeout_at};

use crate::{
    constants::{OUTPUT_DRAIN_MS, RUNTIME_ERROR_MSG},
    core::{
        domain::{ExecutionLimits, ExecutionOutcome, Language},
        traits::{
            runner::{RunError, Runner},
            sandbox::{LaunchRequest, Sandbox},
        },
    },
    sandbox::workspace::Workspace,
};

/// Runs one program against one input in a [`Sandbox`], inside a
/// workspace of its own that is gone by the time `run` returns.
#[derive(Debug)]
pub struct SandboxRunner {
    sandbox: Arc<dyn Sandbox>,
    workspace_root: PathBuf,
}

impl SandboxRunner {
    pub fn new<T: AsRef<Path>>(sandbox: Arc<dyn Sandbox>, workspace_root: T) -> Self {
        Self {
            sandbox,
            workspace_root: workspace_root.as_ref().into(),
        }
    }

    async fn run_in(
        &self,
        workspace: &Workspace,
        language: Language,
        source: &str,
        stdin: &str,
        limits: &ExecutionLimits,
    ) -> Result<ExecutionOutcome, RunError> {
        workspace
            .write_source(language, source)
            .await
            .map_err(RunError::Workspace)?;

        let request = LaunchRequest {
            image: language.image(),
            workspace: workspace.path(),
            limits,
        };
        let mut process = self.sandbox.launch(&request).await?;
        let Some(pipes) = process.take_pipes() else {
            if let Err(e) = process.kill().await {
                tracing::warn!(error = %e, "Failed to kill process without pipes");
            }
            return Err(RunError::Launch {
                msg: "Sandbox process has no standard streams".to_string(),
            });
        };

        let started = Instant::now();
        let deadline = started + Duration::from_millis(limits.time_ms);
        let cap = limits.output_size_bytes;
        let mut stdout = CapturedOutput::default();
        let mut stderr = CapturedOutput::default();

        let status = {
            let exchange = async {
                tokio::join!(
                    feed_stdin(pipes.stdin, stdin),
                    read_capped(pipes.stdout, cap, &mut stdout),
                    read_capped(pipes.stderr, cap, &mut stderr),
                )
            };
            tokio::pin!(exchange);

            // Exit and deadline race exactly once. The pipes are pumped
            // meanwhile so a chatty program never blocks on a full buffer.
            let exited = timeout_at(deadline, async {
                tokio::select! {
                    status = process.wait() => (status, None),
                    streams = &mut exchange => (process.wait().await, Some(streams)),
                }
            })
            .await;

            let (status, streams) = match exited {
                Ok(exited) => exited,
                Err(_) => {
                    tracing::debug!(
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Time limit exceeded, killing process"
                    );
                    if let Err(e) = process.kill().await {
                        tracing::warn!(error = %e, "Failed to kill timed out process");
                    }
                    return Ok(ExecutionOutcome::TimedOut);
                }
            };
            let status = status?;

            let streams = match streams {
                Some(streams) => Some(streams),
                None => timeout(Duration::from_millis(OUTPUT_DRAIN_MS), &mut exchange)
                    .await
                    .ok(),
            };
            match streams {
                Some((fed, out, err)) => {
                    fed?;
                    out?;
                    err?;
                }
                None => {
                    // Something the program started still holds the pipes.
                    tracing::debug!("Pipes still open after exit, killing leftovers");
                    if let Err(e) = process.kill().await {
                        tracing::warn!(error = %e, "Failed to kill leftover processes");
                    }
                }
            }
            status
        };
        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            ?status,
            "Process finished"
        );

        if stdout.truncated {
            tracing::warn!(limit = cap, "Stdout exceeded the output limit and was truncated");
        }

        match status {
            Some(0) => Ok(ExecutionOutcome::Succeeded {
                stdout: String::from_utf8_lossy(&stdout.bytes).to_string(),
            }),
            _ => {
                let stderr = String::from_utf8_lossy(&stderr.bytes).to_string();
                let reason = if stderr.trim().is_empty() {
                    RUNTIME_ERROR_MSG.to_string()
                } else {
                    stderr
                };
                Ok(ExecutionOutcome::RuntimeFailed { reason })
            }
        }
    }
}

#[async_trait::async_trait]
impl Runner for SandboxRunner {
    #[tracing::instrument(skip(self, source, stdin, limits))]
    async fn run(
        &self,
        language: Language,
        source: &str,
        stdin: &str,
        limits: &ExecutionLimits,
    ) -> Result<ExecutionOutcome, RunError> {
        let workspace = Workspace::create(&self.workspace_root)
            .await
            .map_err(RunError::Workspace)?;

        let outcome = self.run_in(&workspace, language, source, stdin, limits).await;
        workspace.close().await;

        outcome
    }
}

/// Writes the whole input and closes the pipe. A program that exits
/// without reading its input is not an error.
async fn feed_stdin<W: AsyncWrite + Unpin>(mut pipe: W, input: &str) -> io::Result<()> {
    match pipe.write_all(input.as_bytes()).await {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

#[derive(Debug, Default)]
struct CapturedOutput {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Keeps the first `cap` bytes in `out` and drains the rest, so a chatty
/// program never blocks on a full pipe. What was read stays in `out` even
/// if the future is dropped early.
async fn read_capped<R: AsyncRead + Unpin>(
    mut reader: R,
    cap: u64,
    out: &mut CapturedOutput,
) -> io::Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        let room = cap.saturating_sub(out.bytes.len() as u64);
        let keep = n.min(usize::try_from(room).unwrap_or(usize::MAX));
        out.bytes.extend_from_slice(&chunk[..keep]);
        if keep < n {
            out.truncated = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{docker::DockerSandbox, local::LocalSandbox};

    // `sh` stands in for the interpreter so the tests need no images.
    fn shell_runner(root: &Path) -> SandboxRunner {
        let sandbox =
            LocalSandbox::empty().with_command(Language::Python.image(), "sh", &["main.py"]);
        SandboxRunner::new(Arc::new(sandbox), root)
    }

    fn limits(time_ms: u64) -> ExecutionLimits {
        ExecutionLimits {
            time_ms,
            ..Default::default()
        }
    }

    fn workspaces_left(root: &Path) -> usize {
        std::fs::read_dir(root).map(|dir| dir.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_echoes_stdin() {
        let root = tempfile::tempdir().unwrap();
        let runner = shell_runner(root.path());

        let outcome = runner
            .run(Language::Python, "read line; echo \"$line\"", "hi\n", &limits(5000))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ExecutionOutcome::Succeeded {
                stdout: "hi\n".to_string()
            }
        );
        assert_eq!(workspaces_left(root.path()), 0);
    }

    #[tokio::test]
    async fn test_empty_stdin_is_closed() {
        let root = tempfile::tempdir().unwrap();
        let runner = shell_runner(root.path());

        // `cat` only returns once it sees end of input.
        let outcome = runner
            .run(Language::Python, "cat", "", &limits(5000))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ExecutionOutcome::Succeeded {
                stdout: String::new()
            }
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let root = tempfile::tempdir().unwrap();
        let runner = shell_runner(root.path());

        let outcome = runner
            .run(
                Language::Python,
                "echo partial; echo oops >&2; exit 1",
                "",
                &limits(5000),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ExecutionOutcome::RuntimeFailed {
                reason: "oops\n".to_string()
            }
        );
        assert_eq!(workspaces_left(root.path()), 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_stderr_uses_generic_reason() {
        let root = tempfile::tempdir().unwrap();
        let runner = shell_runner(root.path());

        let outcome = runner
            .run(Language::Python, "exit 3", "", &limits(5000))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ExecutionOutcome::RuntimeFailed {
                reason: RUNTIME_ERROR_MSG.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_busy_loop_times_out_and_is_killed() {
        let root = tempfile::tempdir().unwrap();
        let runner = shell_runner(root.path());
        let started = std::time::Instant::now();

        let outcome = runner
            .run(Language::Python, "while :; do :; done", "", &limits(200))
            .await
            .unwrap();

        assert_eq!(outcome, ExecutionOutcome::TimedOut);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(workspaces_left(root.path()), 0);
    }

    #[tokio::test]
    async fn test_exit_decides_even_if_background_job_holds_stdout() {
        let root = tempfile::tempdir().unwrap();
        let markers = tempfile::tempdir().unwrap();
        let marker = markers.path().join("leaked");
        let runner = shell_runner(root.path());
        let started = std::time::Instant::now();

        let source = format!("(sleep 1; touch {}) & echo done; exit 0", marker.display());
        let outcome = runner
            .run(Language::Python, &source, "", &limits(3000))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ExecutionOutcome::Succeeded {
                stdout: "done\n".to_string()
            }
        );
        assert!(started.elapsed() < std::time::Duration::from_millis(900));
        assert_eq!(workspaces_left(root.path()), 0);

        // The background job was killed with the program's process group.
        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_cancelled_run_cleans_up_and_kills_program() {
        let root = tempfile::tempdir().unwrap();
        let markers = tempfile::tempdir().unwrap();
        let marker = markers.path().join("finished");
        let runner = shell_runner(root.path());

        let source = format!("sleep 1; touch {}", marker.display());
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            runner.run(Language::Python, &source, "", &limits(5000)),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(workspaces_left(root.path()), 0);

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_output_over_limit_is_truncated() {
        let root = tempfile::tempdir().unwrap();
        let runner = shell_runner(root.path());
        let limits = ExecutionLimits {
            time_ms: 5000,
            output_size_bytes: 100,
            ..Default::default()
        };

        let outcome = runner
            .run(
                Language::Python,
                "i=0; while [ $i -lt 2000 ]; do echo 0123456789; i=$((i+1)); done",
                "",
                &limits,
            )
            .await
            .unwrap();

        match outcome {
            ExecutionOutcome::Succeeded { stdout } => {
                assert_eq!(stdout.len(), 100);
                assert!(stdout.starts_with("0123456789\n"));
            }
            other => panic!("Expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_program_ignoring_large_stdin() {
        let root = tempfile::tempdir().unwrap();
        let runner = shell_runner(root.path());
        let input = "x".repeat(1024 * 1024);

        let outcome = runner
            .run(Language::Python, "exit 0", &input, &limits(5000))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ExecutionOutcome::Succeeded {
                stdout: String::new()
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_image_is_launch_error_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let runner = SandboxRunner::new(Arc::new(LocalSandbox::empty()), root.path());

        let result = runner
            .run(Language::C, "int main(){}", "", &limits(1000))
            .await;

        assert!(matches!(result, Err(RunError::Launch { .. })));
        assert_eq!(workspaces_left(root.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::empty().with_command(Language::Python.image(), "/aboba", &[]);
        let runner = SandboxRunner::new(Arc::new(sandbox), root.path());

        let result = runner
            .run(Language::Python, "print(1)", "", &limits(1000))
            .await;

        assert!(matches!(result, Err(RunError::Launch { .. })));
        assert_eq!(workspaces_left(root.path()), 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_get_separate_workspaces() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(shell_runner(root.path()));

        let runs = (0..4).map(|_| {
            let runner = runner.clone();
            async move {
                runner
                    .run(Language::Python, "pwd; ls", "", &limits(5000))
                    .await
                    .unwrap()
            }
        });
        let outputs: Vec<_> = futures::future::join_all(runs)
            .await
            .into_iter()
            .map(|outcome| match outcome {
                ExecutionOutcome::Succeeded { stdout } => stdout,
                other => panic!("Expected success, got {:?}", other),
            })
            .collect();

        for (i, output) in outputs.iter().enumerate() {
            let mut lines = output.lines();
            let dir = lines.next().unwrap();
            assert_eq!(lines.collect::<Vec<_>>(), vec!["main.py"]);
            for other in &outputs[i + 1..] {
                assert_ne!(other.lines().next().unwrap(), dir);
            }
        }
        assert_eq!(workspaces_left(root.path()), 0);
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon and the runner-py image"]
    async fn test_docker_python_echo() {
        let root = tempfile::tempdir().unwrap();
        let runner = SandboxRunner::new(Arc::new(DockerSandbox::new("docker")), root.path());

        let outcome = runner
            .run(
                Language::Python,
                "print(input())",
                "hi\n",
                &ExecutionLimits::default(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ExecutionOutcome::Succeeded {
                stdout: "hi\n".to_string()
            }
        );
        assert_eq!(workspaces_left(root.path()), 0);
    }
}
