use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::{
    core::{
        domain::Language,
        traits::{
            runner::RunError,
            sandbox::{LaunchRequest, Sandbox, SandboxProcess},
        },
    },
    sandbox::process::{ChildProcess, piped_command},
};

#[derive(Clone, Debug)]
struct LocalCommand {
    program: PathBuf,
    args: Vec<String>,
}

/// Runs programs as plain host subprocesses inside the workspace, with an
/// emptied environment.
///
/// Only the wall-clock and output limits hold here: memory, CPU, process
/// count and network are left to the host. Meant for development and tests,
/// not for untrusted code.
#[derive(Clone, Debug, Default)]
pub struct LocalSandbox {
    commands: HashMap<String, LocalCommand>,
}

impl LocalSandbox {
    /// Host interpreters for every supported language.
    pub fn new() -> Self {
        tracing::warn!("Local sandbox does not enforce memory, CPU, pids or network limits");
        Self::empty()
            .with_command(Language::Python.image(), "python3", &["main.py"])
            .with_command(Language::JavaScript.image(), "node", &["main.js"])
            .with_command(
                Language::C.image(),
                "sh",
                &["-c", "cc -O2 -o main main.c && exec ./main"],
            )
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Serves `image` by running `program args..` in the workspace.
    pub fn with_command<P: AsRef<Path>>(mut self, image: &str, program: P, args: &[&str]) -> Self {
        self.commands.insert(
            image.to_string(),
            LocalCommand {
                program: program.as_ref().into(),
                args: args.iter().map(|arg| arg.to_string()).collect(),
            },
        );
        self
    }
}

#[async_trait::async_trait]
impl Sandbox for LocalSandbox {
    async fn launch(
        &self,
        request: &LaunchRequest<'_>,
    ) -> Result<Box<dyn SandboxProcess>, RunError> {
        let command = self
            .commands
            .get(request.image)
            .ok_or_else(|| RunError::Launch {
                msg: format!("No local command for image {}", request.image),
            })?;

        let mut cmd = piped_command(&command.program);
        cmd.args(&command.args)
            .current_dir(request.workspace)
            .env_clear();
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }

        let child = cmd.spawn().map_err(|e| RunError::Launch {
            msg: format!("Failed to spawn {}: {}", command.program.display(), e),
        })?;

        Ok(Box::new(ChildProcess::new(child)))
    }
}
