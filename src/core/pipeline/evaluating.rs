use std::sync::Arc;

use crate::core::{
    domain::{ExecutionLimits, ExecutionOutcome, Submission, Verdict},
    matcher::outputs_match,
    traits::runner::{RunError, Runner},
};

#[derive(Debug, thiserror::Error)]
#[error("Test case {testcase} could not be run: {source}")]
pub struct EvaluationError {
    pub testcase: usize,
    #[source]
    pub source: RunError,
}

/// Runs a submission's test cases one after another and stops at the first
/// one that does not pass.
#[derive(Debug, Clone)]
pub struct TestSuiteEvaluator {
    runner: Arc<dyn Runner>,
    limits: ExecutionLimits,
}

impl TestSuiteEvaluator {
    pub fn new(runner: Arc<dyn Runner>, limits: ExecutionLimits) -> Self {
        Self { runner, limits }
    }

    /// A submission without test cases is accepted.
    #[tracing::instrument(
        skip_all,
        fields(language = %submission.language, tests = submission.test_cases.len())
    )]
    pub async fn evaluate(&self, submission: &Submission) -> Result<Verdict, EvaluationError> {
        for (idx, test_case) in submission.test_cases.iter().enumerate() {
            let testcase = idx + 1;
            tracing::debug!(testcase, "Running test case");

            let outcome = self
                .runner
                .run(
                    submission.language,
                    &submission.code,
                    &test_case.input,
                    &self.limits,
                )
                .await
                .map_err(|source| {
                    tracing::error!(testcase, error = %source, "Test case could not be run");
                    EvaluationError { testcase, source }
                })?;

            match outcome {
                ExecutionOutcome::Succeeded { stdout } => {
                    if !outputs_match(&stdout, &test_case.expected_output) {
                        tracing::debug!(testcase, "Wrong output");
                        return Ok(Verdict::WrongOutput {
                            testcase,
                            actual_output: stdout,
                        });
                    }
                }
                ExecutionOutcome::RuntimeFailed { reason } => {
                    tracing::debug!(testcase, reason = %reason, "Runtime failure");
                    return Ok(Verdict::RuntimeError { testcase });
                }
                ExecutionOutcome::TimedOut => {
                    tracing::debug!(testcase, "Time limit exceeded");
                    return Ok(Verdict::RuntimeError { testcase });
                }
            }
        }

        Ok(Verdict::Accepted)
    }
}
