//! libSQL backend: the draft kept in a local database file.
//!
//! Answers are stored one row per field so a multi-field step is written in
//! a single transaction and a clear is one `DELETE` per user.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::onboarding::model::{DraftAnswers, DraftValue};
use crate::onboarding::state::{OnboardingState, OnboardingStep};
use crate::store::migrations;
use crate::store::traits::DraftBackend;

const UPSERT_ANSWER: &str = "INSERT INTO draft_answers (user_id, field, value, updated_at)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT (user_id, field) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

const UPSERT_FLOW: &str = "INSERT INTO onboarding_flow (user_id, step, last_error, updated_at)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT (user_id) DO UPDATE SET
         step = excluded.step, last_error = excluded.last_error, updated_at = excluded.updated_at";

/// Draft database on libSQL.
pub struct LibSqlBackend {
    /// Held for as long as the connection is in use.
    _db: Database,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open the draft file at `path`, creating it and its directory on
    /// first use.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| DatabaseError::Pool(format!("creating {}: {e}", parent.display())))?;
        }
        let backend = Self::open(path).await?;
        info!(path = %path.display(), "Draft database opened");
        Ok(backend)
    }

    /// A throwaway in-memory draft database.
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        Self::open(Path::new(":memory:")).await
    }

    async fn open(path: &Path) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("opening {}: {e}", path.display())))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("connecting to {}: {e}", path.display())))?;

        migrations::upgrade(&conn).await?;
        Ok(Self { _db: db, conn })
    }
}

#[async_trait]
impl DraftBackend for LibSqlBackend {
    async fn load_answers(&self, user_id: &str) -> Result<DraftAnswers, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT field, value FROM draft_answers WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_answers: {e}")))?;

        let mut answers = DraftAnswers::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load_answers: {e}")))?
        {
            let field: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("load_answers: {e}")))?;
            let raw: String = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("load_answers: {e}")))?;
            let value: DraftValue = serde_json::from_str(&raw)
                .map_err(|e| DatabaseError::Serialization(format!("draft field {field}: {e}")))?;
            answers.insert(field, value);
        }
        Ok(answers)
    }

    async fn upsert_answers(
        &self,
        user_id: &str,
        answers: &[(String, DraftValue)],
    ) -> Result<(), DatabaseError> {
        // Encode before the transaction opens.
        let encoded = answers
            .iter()
            .map(|(field, value)| {
                serde_json::to_string(value)
                    .map(|json| (field.as_str(), json))
                    .map_err(|e| DatabaseError::Serialization(format!("draft field {field}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let now = Utc::now().to_rfc3339();
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("begin draft write: {e}")))?;

        for (field, json) in encoded {
            if let Err(e) = tx
                .execute(UPSERT_ANSWER, params![user_id, field, json, now.as_str()])
                .await
            {
                tx.rollback()
                    .await
                    .map_err(|e| DatabaseError::Query(format!("rollback draft write: {e}")))?;
                return Err(DatabaseError::Query(format!("writing draft field {field}: {e}")));
            }
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("commit draft write: {e}")))?;
        debug!(user_id, count = answers.len(), "Draft answers stored");
        Ok(())
    }

    async fn clear_answers(&self, user_id: &str) -> Result<usize, DatabaseError> {
        let removed = self
            .conn
            .execute("DELETE FROM draft_answers WHERE user_id = ?1", params![user_id])
            .await
            .map_err(|e| DatabaseError::Query(format!("clear_answers: {e}")))?;
        Ok(removed as usize)
    }

    async fn load_flow(&self, user_id: &str) -> Result<Option<OnboardingState>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT step, last_error FROM onboarding_flow WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_flow: {e}")))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load_flow: {e}")))?
        else {
            return Ok(None);
        };

        let step: String = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("load_flow: {e}")))?;
        let last_error: Option<String> = row
            .get(1)
            .map_err(|e| DatabaseError::Query(format!("load_flow: {e}")))?;
        let step: OnboardingStep = serde_json::from_value(serde_json::Value::String(step))
            .map_err(|e| DatabaseError::Serialization(format!("onboarding step: {e}")))?;

        Ok(Some(OnboardingState { step, last_error }))
    }

    async fn save_flow(
        &self,
        user_id: &str,
        state: &OnboardingState,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                UPSERT_FLOW,
                params![
                    user_id,
                    state.step.to_string(),
                    state.last_error.clone(),
                    now
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_flow: {e}")))?;
        Ok(())
    }
}
