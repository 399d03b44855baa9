use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::{
    domain::{Language, Submission, Verdict},
    limiter::{AdmissionError, ExecutionLimiter},
    pipeline::evaluating::{EvaluationError, TestSuiteEvaluator},
    traits::{runner::RunError, store::ChallengeStore},
};

#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("Unknown challenge: {0}")]
    UnknownChallenge(String),
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    #[error("Test case {testcase} could not be run: {source}")]
    Infrastructure {
        testcase: usize,
        #[source]
        source: RunError,
    },
}

impl From<EvaluationError> for JudgeError {
    fn from(error: EvaluationError) -> Self {
        JudgeError::Infrastructure {
            testcase: error.testcase,
            source: error.source,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Judgement {
    pub id: Uuid,
    pub challenge_id: String,
    pub language: Language,
    pub verdict: Verdict,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Entry point for callers: judges submitted code against a stored
/// challenge, at most `limiter.max()` submissions at a time.
#[derive(Clone, Debug)]
pub struct JudgeService {
    store: Arc<dyn ChallengeStore>,
    limiter: Arc<ExecutionLimiter>,
    evaluator: Arc<TestSuiteEvaluator>,
}

impl JudgeService {
    pub fn new(
        store: Arc<dyn ChallengeStore>,
        limiter: Arc<ExecutionLimiter>,
        evaluator: Arc<TestSuiteEvaluator>,
    ) -> Self {
        Self {
            store,
            limiter,
            evaluator,
        }
    }

    #[tracing::instrument(skip(self, code))]
    pub async fn judge(&self, challenge_id: &str, code: &str) -> Result<Judgement, JudgeError> {
        let started_at = Utc::now();
        let challenge = self
            .store
            .challenge(challenge_id)
            .await
            .ok_or_else(|| JudgeError::UnknownChallenge(challenge_id.to_string()))?;

        let submission = Submission {
            language: challenge.language,
            code: code.to_string(),
            test_cases: challenge.test_cases,
        };

        // One slot covers every test case of the submission.
        let verdict = self
            .limiter
            .admit(|| self.evaluator.evaluate(&submission))
            .await??;

        let judgement = Judgement {
            id: Uuid::new_v4(),
            challenge_id: challenge_id.to_string(),
            language: submission.language,
            verdict,
            started_at,
            finished_at: Utc::now(),
        };
        tracing::info!(
            id = %judgement.id,
            verdict = ?judgement.verdict,
            elapsed_ms = (judgement.finished_at - judgement.started_at).num_milliseconds(),
            "Submission judged"
        );

        Ok(judgement)
    }
}
