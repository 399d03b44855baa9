use crate::core::domain::{ExecutionLimits, ExecutionOutcome, Language};

/// Failures of the judging infrastructure itself. Anything the submitted
/// program does, including crashing or hanging, is an [`ExecutionOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Workspace error: {0}")]
    Workspace(#[source] std::io::Error),
    #[error("Failed to launch sandbox: {msg}")]
    Launch { msg: String },
    #[error("I/O error while running sandbox: {0}")]
    Io(#[from] std::io::Error),
}

#[mockall::automock]
#[async_trait::async_trait]
pub trait Runner: std::fmt::Debug + Send + Sync {
    async fn run(
        &self,
        language: Language,
        source: &str,
        stdin: &str,
        limits: &ExecutionLimits,
    ) -> Result<ExecutionOutcome, RunError>;
}
