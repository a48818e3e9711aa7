//! `DraftBackend` trait: the persistence seam under the draft store.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::onboarding::model::{DraftAnswers, DraftValue};
use crate::onboarding::state::OnboardingState;

/// Durable storage for one user's onboarding draft and flow position.
///
/// Answers are kept per field. Every call is durable once it returns `Ok`.
#[async_trait]
pub trait DraftBackend: Send + Sync {
    /// Every stored answer for `user_id`; empty when there is no draft.
    async fn load_answers(&self, user_id: &str) -> Result<DraftAnswers, DatabaseError>;

    /// Insert or overwrite `answers` as one unit: either all of them are
    /// stored or none is.
    async fn upsert_answers(
        &self,
        user_id: &str,
        answers: &[(String, DraftValue)],
    ) -> Result<(), DatabaseError>;

    /// Drop the whole draft. Returns how many answers were removed.
    async fn clear_answers(&self, user_id: &str) -> Result<usize, DatabaseError>;

    async fn load_flow(&self, user_id: &str) -> Result<Option<OnboardingState>, DatabaseError>;

    async fn save_flow(&self, user_id: &str, state: &OnboardingState)
    -> Result<(), DatabaseError>;
}
