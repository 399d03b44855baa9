use std::path::Path;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::core::{domain::ExecutionLimits, traits::runner::RunError};

#[derive(Debug, Clone, Copy)]
pub struct LaunchRequest<'a> {
    pub image: &'a str,
    pub workspace: &'a Path,
    pub limits: &'a ExecutionLimits,
}

pub struct SandboxPipes {
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    pub stderr: Box<dyn AsyncRead + Send + Unpin>,
}

/// A program started by a [`Sandbox`].
#[async_trait::async_trait]
pub trait SandboxProcess: Send {
    /// Hands out the standard streams. Returns `None` after the first call.
    fn take_pipes(&mut self) -> Option<SandboxPipes>;

    /// Waits for the program to exit. `None` means it was ended by a signal.
    async fn wait(&mut self) -> std::io::Result<Option<i32>>;

    /// Terminates the program without giving it a chance to react, and
    /// reaps it.
    async fn kill(&mut self) -> std::io::Result<()>;
}

/// Isolation backend: starts an image with the workspace as its working
/// directory under the given limits.
#[async_trait::async_trait]
pub trait Sandbox: std::fmt::Debug + Send + Sync {
    async fn launch(
        &self,
        request: &LaunchRequest<'_>,
    ) -> Result<Box<dyn SandboxProcess>, RunError>;
}
