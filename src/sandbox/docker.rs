use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio::time::{Duration, timeout};
use uuid::Uuid;

use crate::{
    constants::{CONTAINER_PREFIX, CONTAINER_REMOVAL_TIMEOUT_MS, SANDBOX_WORKDIR},
    core::traits::{
        runner::RunError,
        sandbox::{LaunchRequest, Sandbox, SandboxPipes, SandboxProcess},
    },
    sandbox::process::{ChildProcess, piped_command},
};

/// Runs every program in a fresh, throwaway container through the docker
/// CLI.
#[derive(Clone, Debug)]
pub struct DockerSandbox {
    docker_path: PathBuf,
}

impl DockerSandbox {
    pub fn new<T: AsRef<Path>>(docker_path: T) -> Self {
        Self {
            docker_path: docker_path.as_ref().into(),
        }
    }

    fn run_args(container: &str, request: &LaunchRequest<'_>) -> Vec<String> {
        let limits = request.limits;
        vec![
            "run".to_string(),
            "--rm".to_string(),
            "-i".to_string(),
            format!("--name={}", container),
            format!("--memory={}", limits.memory_bytes),
            format!("--memory-swap={}", limits.memory_bytes),
            format!("--cpus={}", limits.cpus),
            "--network=none".to_string(),
            format!("--pids-limit={}", limits.pids_count),
            "-v".to_string(),
            format!("{}:{}", request.workspace.display(), SANDBOX_WORKDIR),
            "-w".to_string(),
            SANDBOX_WORKDIR.to_string(),
            request.image.to_string(),
        ]
    }
}

#[async_trait::async_trait]
impl Sandbox for DockerSandbox {
    async fn launch(
        &self,
        request: &LaunchRequest<'_>,
    ) -> Result<Box<dyn SandboxProcess>, RunError> {
        let container = format!("{}{}", CONTAINER_PREFIX, Uuid::new_v4());
        let child = piped_command(&self.docker_path)
            .args(Self::run_args(&container, request))
            .spawn()
            .map_err(|e| RunError::Launch {
                msg: format!("Failed to spawn {}: {}", self.docker_path.display(), e),
            })?;

        tracing::debug!(container = %container, image = request.image, "Container started");
        Ok(Box::new(ContainerProcess {
            client: ChildProcess::new(child),
            docker_path: self.docker_path.clone(),
            container,
            finished: false,
        }))
    }
}

/// The `docker run` client attached to one container.
///
/// The container outlives its client: killing or dropping the client alone
/// would leave the program running. Unless the client saw the container
/// exit, the container is force-removed on `kill` and on drop.
#[derive(Debug)]
struct ContainerProcess {
    client: ChildProcess,
    docker_path: PathBuf,
    container: String,
    finished: bool,
}

#[async_trait::async_trait]
impl SandboxProcess for ContainerProcess {
    fn take_pipes(&mut self) -> Option<SandboxPipes> {
        self.client.take_pipes()
    }

    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        let status = self.client.wait().await?;
        // `--rm` takes care of a container that exited on its own.
        self.finished = true;
        Ok(status)
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        // Reaping the client first means it cannot start the container
        // after the removal below.
        let killed = self.client.kill().await;
        remove_container(&self.docker_path, &self.container).await;
        self.finished = true;
        killed
    }
}

impl Drop for ContainerProcess {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let docker_path = self.docker_path.clone();
        let container = std::mem::take(&mut self.container);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { remove_container(&docker_path, &container).await });
            }
            Err(_) => tracing::warn!(
                container = %container,
                "No runtime to remove abandoned container"
            ),
        }
    }
}

/// `docker rm --force`, bounded in time. Failures are logged only.
async fn remove_container(docker_path: &Path, container: &str) {
    let removal = Command::new(docker_path)
        .args(["rm", "--force", container])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    match timeout(Duration::from_millis(CONTAINER_REMOVAL_TIMEOUT_MS), removal).await {
        Ok(Ok(status)) if status.success() => {
            tracing::debug!(container = %container, "Container removed")
        }
        Ok(Ok(status)) => tracing::warn!(
            container = %container,
            ?status,
            "docker rm did not succeed"
        ),
        Ok(Err(e)) => tracing::warn!(
            container = %container,
            error = %e,
            "Failed to run docker rm"
        ),
        Err(_) => tracing::warn!(container = %container, "docker rm timed out"),
    }
}
