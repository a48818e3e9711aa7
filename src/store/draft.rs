//! Draft store: holds the partially entered onboarding answers until a
//! submission is confirmed.
//!
//! Every `write` reaches the backend before it returns, so an answer that
//! was acknowledged survives a crash or reload. `clear` removes the whole
//! draft.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::onboarding::model::{DraftAnswers, DraftValue};
use crate::onboarding::state::OnboardingState;
use crate::store::traits::DraftBackend;

/// Owner of the draft on a single-user client.
pub const DEFAULT_USER: &str = "default";

/// Durable-until-submit holder of onboarding answers.
pub struct DraftStore {
    backend: Arc<dyn DraftBackend>,
    user_id: String,
    /// Mirror of what the backend holds. The lock also serializes writers.
    answers: Mutex<DraftAnswers>,
}

impl DraftStore {
    /// Load the draft for the default user from `backend`.
    pub async fn open(backend: Arc<dyn DraftBackend>) -> Result<Self, DatabaseError> {
        Self::open_for(backend, DEFAULT_USER).await
    }

    /// Load the draft for `user_id` from `backend`.
    pub async fn open_for(
        backend: Arc<dyn DraftBackend>,
        user_id: &str,
    ) -> Result<Self, DatabaseError> {
        let answers = backend.load_answers(user_id).await?;
        debug!(user_id, fields = answers.len(), "Draft store opened");
        Ok(Self {
            backend,
            user_id: user_id.to_string(),
            answers: Mutex::new(answers),
        })
    }

    /// Store `value` under `field`, overwriting any earlier answer.
    ///
    /// If persisting fails the previous draft is left untouched.
    pub async fn write(
        &self,
        field: impl Into<String>,
        value: DraftValue,
    ) -> Result<(), DatabaseError> {
        let field = field.into();
        debug!(user_id = %self.user_id, field = %field, "Writing draft answer");
        self.write_all([(field, value)]).await
    }

    /// Write several answers as one persisted update.
    pub async fn write_all<I>(&self, values: I) -> Result<(), DatabaseError>
    where
        I: IntoIterator<Item = (String, DraftValue)>,
    {
        let values: Vec<(String, DraftValue)> = values.into_iter().collect();
        if values.is_empty() {
            return Ok(());
        }
        for (field, value) in &values {
            ensure_storable(field, value)?;
        }

        let mut answers = self.answers.lock().await;
        self.backend.upsert_answers(&self.user_id, &values).await?;

        let count = values.len();
        answers.extend(values);
        debug!(user_id = %self.user_id, count, "Draft answers written");
        Ok(())
    }

    /// The current full mapping.
    pub async fn read_all(&self) -> DraftAnswers {
        self.answers.lock().await.clone()
    }

    /// Remove every entry, in memory and on disk.
    pub async fn clear(&self) -> Result<(), DatabaseError> {
        let mut answers = self.answers.lock().await;
        let removed = self.backend.clear_answers(&self.user_id).await?;
        answers.clear();
        info!(user_id = %self.user_id, removed, "Draft cleared");
        Ok(())
    }

    /// Load the persisted flow position, if one was saved.
    pub async fn load_state(&self) -> Result<Option<OnboardingState>, DatabaseError> {
        self.backend.load_flow(&self.user_id).await
    }

    /// Persist the flow position.
    pub async fn save_state(&self, state: &OnboardingState) -> Result<(), DatabaseError> {
        self.backend.save_flow(&self.user_id, state).await
    }
}

/// JSON has no NaN or infinity; such a number would come back as `null`
/// and make the draft unreadable.
fn ensure_storable(field: &str, value: &DraftValue) -> Result<(), DatabaseError> {
    match value {
        DraftValue::Number(n) if !n.is_finite() => Err(DatabaseError::Serialization(format!(
            "draft field {field}: {n} is not a finite number"
        ))),
        _ => Ok(()),
    }
}
