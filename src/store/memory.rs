//! In-memory `DraftBackend` for tests and dry runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::DatabaseError;
use crate::onboarding::model::{DraftAnswers, DraftValue};
use crate::onboarding::state::OnboardingState;
use crate::store::traits::DraftBackend;

#[derive(Default)]
struct UserDraft {
    answers: DraftAnswers,
    flow: Option<OnboardingState>,
}

/// Drafts held in a map; nothing survives the process.
#[derive(Default)]
pub struct MemoryBackend {
    users: RwLock<HashMap<String, UserDraft>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DraftBackend for MemoryBackend {
    async fn load_answers(&self, user_id: &str) -> Result<DraftAnswers, DatabaseError> {
        let users = self.users.read().await;
        Ok(users
            .get(user_id)
            .map(|u| u.answers.clone())
            .unwrap_or_default())
    }

    async fn upsert_answers(
        &self,
        user_id: &str,
        answers: &[(String, DraftValue)],
    ) -> Result<(), DatabaseError> {
        let mut users = self.users.write().await;
        let draft = users.entry(user_id.to_string()).or_default();
        draft.answers.extend(answers.iter().cloned());
        Ok(())
    }

    async fn clear_answers(&self, user_id: &str) -> Result<usize, DatabaseError> {
        let mut users = self.users.write().await;
        Ok(users
            .get_mut(user_id)
            .map(|u| std::mem::take(&mut u.answers).len())
            .unwrap_or(0))
    }

    async fn load_flow(&self, user_id: &str) -> Result<Option<OnboardingState>, DatabaseError> {
        let users = self.users.read().await;
        Ok(users.get(user_id).and_then(|u| u.flow.clone()))
    }

    async fn save_flow(
        &self,
        user_id: &str,
        state: &OnboardingState,
    ) -> Result<(), DatabaseError> {
        let mut users = self.users.write().await;
        users.entry(user_id.to_string()).or_default().flow = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::state::OnboardingStep;

    #[tokio::test]
    async fn clear_keeps_flow_position() {
        let store = MemoryBackend::new();
        store
            .upsert_answers("u", &[("cycle_length".into(), DraftValue::Number(28.0))])
            .await
            .unwrap();
        store
            .save_flow(
                "u",
                &OnboardingState {
                    step: OnboardingStep::Step3,
                    last_error: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(store.clear_answers("u").await.unwrap(), 1);
        assert!(store.load_answers("u").await.unwrap().is_empty());
        assert_eq!(
            store.load_flow("u").await.unwrap().map(|s| s.step),
            Some(OnboardingStep::Step3)
        );
        assert_eq!(store.clear_answers("nobody").await.unwrap(), 0);
    }
}
