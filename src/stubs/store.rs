use dashmap::DashMap;

use crate::core::{domain::Challenge, traits::store::ChallengeStore};

#[derive(Debug, Default)]
pub struct InMemoryChallengeStore {
    challenges: DashMap<String, Challenge>,
}

impl InMemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the challenge under its id.
    pub fn insert(&self, challenge: Challenge) {
        self.challenges.insert(challenge.id.clone(), challenge);
    }
}

#[async_trait::async_trait]
impl ChallengeStore for InMemoryChallengeStore {
    async fn challenge(&self, id: &str) -> Option<Challenge> {
        self.challenges.get(id).map(|entry| entry.value().clone())
    }
}
