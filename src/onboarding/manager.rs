//! OnboardingManager: coordinates step validation, the draft store,
//! profile assembly and submission.
//!
//! Every way of advancing the flow goes through `answer` and `finish`, so a
//! step whose input fails validation can never be left, whoever the caller
//! is.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::api::{SubmissionClient, SubmissionOutcome};
use crate::config::{OnboardingConfig, fields};
use crate::error::{AssemblyError, Error, OnboardingError};
use crate::store::DraftStore;

use super::assembler::assemble;
use super::model::StepInput;
use super::state::{OnboardingState, OnboardingStep};
use super::validator::validate_step;

/// Snapshot of the flow for display.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OnboardingStatus {
    pub step: OnboardingStep,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Fields answered so far.
    pub answered: Vec<String>,
}

/// Drives the onboarding questionnaire from Step1 to submission.
pub struct OnboardingManager {
    config: OnboardingConfig,
    draft: Arc<DraftStore>,
    submission: Arc<SubmissionClient>,
    state: RwLock<OnboardingState>,
    /// Where Rejected / TransportFailure send the user.
    return_step: OnboardingStep,
}

impl OnboardingManager {
    /// Create a manager, resuming the persisted step when there is one.
    pub async fn resume(
        config: OnboardingConfig,
        draft: Arc<DraftStore>,
        submission: Arc<SubmissionClient>,
    ) -> Self {
        let mut state = match draft.load_state().await {
            Ok(Some(state)) => state,
            Ok(None) => OnboardingState::default(),
            Err(e) => {
                warn!("Failed to load onboarding state, starting over: {}", e);
                OnboardingState::default()
            }
        };

        // A crash mid-request leaves "submitting" behind. Nothing is in
        // flight any more, so hand the user back the last step.
        if state.step == OnboardingStep::Submitting {
            state.step = OnboardingStep::Step4;
        }

        info!(step = %state.step, "Onboarding resumed");
        Self {
            config,
            draft,
            submission,
            state: RwLock::new(state),
            return_step: OnboardingStep::Step4,
        }
    }

    /// Choose the step a failed submission returns to. Non-input steps are
    /// ignored.
    pub fn with_return_step(mut self, step: OnboardingStep) -> Self {
        if step.is_input() {
            self.return_step = step;
        }
        self
    }

    pub fn config(&self) -> &OnboardingConfig {
        &self.config
    }

    pub async fn current_step(&self) -> OnboardingStep {
        self.state.read().await.step
    }

    pub async fn is_complete(&self) -> bool {
        self.state.read().await.step.is_terminal()
    }

    pub async fn status(&self) -> OnboardingStatus {
        let state = self.state.read().await.clone();
        OnboardingStatus {
            step: state.step,
            completed: state.step.is_terminal(),
            last_error: state.last_error,
            answered: self.draft.read_all().await.into_keys().collect(),
        }
    }

    /// Submit one step's raw input.
    ///
    /// On success the values are persisted and the flow advances; Step4
    /// stays put until `finish`. On a validation failure nothing is
    /// written and the step does not change.
    pub async fn answer(
        &self,
        step: OnboardingStep,
        input: &StepInput,
        today: NaiveDate,
    ) -> Result<OnboardingStep, Error> {
        let current = self.current_step().await;
        if current != step {
            return Err(wrong_step(current, step).into());
        }

        let values = validate_step(step, input, &self.config, today).inspect_err(|failure| {
            debug!(step = %step, field = %failure.field, reason = %failure.reason, "Step input refused");
        })?;

        self.draft.write_all(values).await?;

        if step == OnboardingStep::Step4 {
            self.set_error(None).await;
            return Ok(step);
        }

        let next = {
            let mut state = self.state.write().await;
            let next = state
                .advance()
                .map_err(|_| transition_error(step, "next step"))?;
            state.last_error = None;
            next
        };
        self.persist_state().await;
        Ok(next)
    }

    /// Step back to the previous input step to revise it.
    pub async fn go_back(&self) -> Result<OnboardingStep, Error> {
        let previous = {
            let mut state = self.state.write().await;
            let from = state.step;
            let previous = from
                .previous()
                .ok_or_else(|| transition_error(from, "previous step"))?;
            state
                .transition(previous)
                .map_err(|_| transition_error(from, previous))?;
            previous
        };
        self.persist_state().await;
        Ok(previous)
    }

    /// Assemble the draft and submit it.
    ///
    /// Assembly errors return the flow to the step owning the offending
    /// field and are reported as `Err`. Backend outcomes are reported as
    /// `Ok(outcome)`; only `Submitted` ends onboarding.
    pub async fn finish(&self, today: NaiveDate) -> Result<SubmissionOutcome, Error> {
        {
            let mut state = self.state.write().await;
            match state.step {
                OnboardingStep::Step4 => {
                    state
                        .transition(OnboardingStep::Submitting)
                        .map_err(|_| {
                            transition_error(OnboardingStep::Step4, OnboardingStep::Submitting)
                        })?;
                }
                OnboardingStep::Submitting => return Ok(SubmissionOutcome::AlreadyInFlight),
                OnboardingStep::Submitted => return Err(OnboardingError::AlreadyComplete.into()),
                other => return Err(wrong_step(other, OnboardingStep::Step4).into()),
            }
        }
        self.persist_state().await;

        let draft = self.draft.read_all().await;
        let profile = match assemble(&draft, &self.config, today) {
            Ok(profile) => profile,
            Err(e) => {
                let back_to = self.step_for_assembly_error(&e);
                warn!(error = %e, step = %back_to, "Profile assembly failed");
                self.move_to(back_to, Some(e.to_string())).await;
                return Err(e.into());
            }
        };

        let outcome = self.submission.submit(&profile).await;
        match &outcome {
            SubmissionOutcome::Submitted { .. } => {
                self.move_to(OnboardingStep::Submitted, None).await;
                info!("Onboarding complete");
            }
            SubmissionOutcome::Rejected { reason } => {
                self.fail_to(OnboardingStep::Rejected, reason.clone()).await;
            }
            SubmissionOutcome::TransportFailure { reason } => {
                self.fail_to(OnboardingStep::TransportFailure, reason.clone()).await;
            }
            SubmissionOutcome::Unauthorized => {
                self.fail_to(OnboardingStep::TransportFailure, "session expired".to_string())
                    .await;
            }
            SubmissionOutcome::AlreadyInFlight => {
                self.move_to(self.return_step, None).await;
            }
        }
        Ok(outcome)
    }

    fn step_for_assembly_error(&self, error: &AssemblyError) -> OnboardingStep {
        let field = match error {
            AssemblyError::MissingRequired { field } | AssemblyError::InvalidValue { field } => {
                field.as_str()
            }
            AssemblyError::InvalidDateRange { .. } => fields::PERIOD_START,
        };
        self.config
            .step_for_field(field)
            .unwrap_or(OnboardingStep::Step2)
    }

    /// Record a failed outcome, then hand control back to the return step.
    async fn fail_to(&self, failed: OnboardingStep, reason: String) {
        {
            let mut state = self.state.write().await;
            if let Err(e) = state.transition(failed) {
                warn!("{}", e);
            }
            if let Err(e) = state.transition(self.return_step) {
                warn!("{}", e);
            }
            state.last_error = Some(reason);
        }
        self.persist_state().await;
    }

    async fn move_to(&self, step: OnboardingStep, error: Option<String>) {
        {
            let mut state = self.state.write().await;
            if let Err(e) = state.transition(step) {
                warn!("{}", e);
                state.step = step;
            }
            state.last_error = error;
        }
        self.persist_state().await;
    }

    async fn set_error(&self, error: Option<String>) {
        self.state.write().await.last_error = error;
        self.persist_state().await;
    }

    /// Persist the current OnboardingState beside the draft.
    async fn persist_state(&self) {
        let state = self.state.read().await.clone();
        if let Err(e) = self.draft.save_state(&state).await {
            warn!("Failed to persist onboarding state: {}", e);
        }
    }
}

fn wrong_step(current: OnboardingStep, attempted: OnboardingStep) -> OnboardingError {
    OnboardingError::WrongStep {
        current: current.to_string(),
        attempted: attempted.to_string(),
    }
}

fn transition_error(from: OnboardingStep, to: impl ToString) -> OnboardingError {
    OnboardingError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}
