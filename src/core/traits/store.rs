use crate::core::domain::Challenge;

/// Read-only source of challenge definitions.
#[async_trait::async_trait]
pub trait ChallengeStore: std::fmt::Debug + Send + Sync {
    async fn challenge(&self, id: &str) -> Option<Challenge>;
}
