use std::time::Duration;

use crate::core::{
    domain::{ExecutionLimits, ExecutionOutcome, Language},
    traits::runner::{RunError, Runner},
};

/// Answers every run with the same outcome after a fixed delay.
#[derive(Debug, Clone)]
pub struct RunnerStub {
    outcome: ExecutionOutcome,
    delay: Duration,
}

impl RunnerStub {
    pub fn new(outcome: ExecutionOutcome, delay: Duration) -> Self {
        Self { outcome, delay }
    }
}

#[async_trait::async_trait]
impl Runner for RunnerStub {
    #[tracing::instrument(skip(self, source, limits))]
    async fn run(
        &self,
        language: Language,
        source: &str,
        stdin: &str,
        limits: &ExecutionLimits,
    ) -> Result<ExecutionOutcome, RunError> {
        tracing::debug!(
            "Start execution: source_len={}, limits={:?}",
            source.len(),
            limits
        );
        tokio::time::sleep(self.delay).await;
        tracing::debug!("Execution result: {:?}", self.outcome);

        Ok(self.outcome.clone())
    }
}
