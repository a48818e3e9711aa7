//! Onboarding state machine: tracks which step the user is on.

use serde::{Deserialize, Serialize};

/// The states of the onboarding flow.
///
/// Forward progression: Step1 → Step2 → Step3 → Step4 → Submitting →
/// {Submitted, Rejected, TransportFailure}. Rejected and TransportFailure
/// hand control back to an input step without touching the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    Step1,
    Step2,
    Step3,
    Step4,
    Submitting,
    Submitted,
    Rejected,
    TransportFailure,
}

impl OnboardingStep {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: OnboardingStep) -> bool {
        use OnboardingStep::*;
        match (self, target) {
            (Step1, Step2) | (Step2, Step3) | (Step3, Step4) | (Step4, Submitting) => true,
            // Revisiting an earlier step.
            (Step2, Step1) | (Step3, Step1 | Step2) | (Step4, Step1 | Step2 | Step3) => true,
            (Submitting, Submitted | Rejected | TransportFailure) => true,
            // An assembly error can bounce the flow back before any request.
            (Submitting, Step1 | Step2 | Step3 | Step4) => true,
            (Rejected | TransportFailure, to) => to.is_input(),
            _ => false,
        }
    }

    /// Whether this state is terminal (onboarding is done).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Submitted)
    }

    /// Whether this state collects user input.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Step1 | Self::Step2 | Self::Step3 | Self::Step4)
    }

    /// Next state in the forward progression, if any.
    pub fn next(&self) -> Option<OnboardingStep> {
        use OnboardingStep::*;
        match self {
            Step1 => Some(Step2),
            Step2 => Some(Step3),
            Step3 => Some(Step4),
            Step4 => Some(Submitting),
            Submitting | Submitted | Rejected | TransportFailure => None,
        }
    }

    /// Previous input step, if any.
    pub fn previous(&self) -> Option<OnboardingStep> {
        use OnboardingStep::*;
        match self {
            Step2 => Some(Step1),
            Step3 => Some(Step2),
            Step4 => Some(Step3),
            _ => None,
        }
    }
}

impl Default for OnboardingStep {
    fn default() -> Self {
        Self::Step1
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Step1 => "step1",
            Self::Step2 => "step2",
            Self::Step3 => "step3",
            Self::Step4 => "step4",
            Self::Submitting => "submitting",
            Self::Submitted => "submitted",
            Self::Rejected => "rejected",
            Self::TransportFailure => "transport_failure",
        };
        write!(f, "{s}")
    }
}

/// Persisted flow position.
///
/// Stored next to the draft so a reload resumes on the same step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingState {
    /// Current state.
    pub step: OnboardingStep,
    /// Message from the last failed submission, shown on the step the user
    /// was returned to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl OnboardingState {
    /// Move to `target`, rejecting transitions the state machine forbids.
    pub fn transition(&mut self, target: OnboardingStep) -> Result<OnboardingStep, String> {
        if !self.step.can_transition_to(target) {
            return Err(format!("Cannot transition from {} to {}", self.step, target));
        }
        self.step = target;
        Ok(target)
    }

    /// Advance to the next step. Returns an error when there is none.
    pub fn advance(&mut self) -> Result<OnboardingStep, String> {
        let next = self
            .step
            .next()
            .ok_or_else(|| format!("No step after {}", self.step))?;
        self.transition(next)
    }
}
